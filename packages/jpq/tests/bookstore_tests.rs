//! End-to-end scenarios over the classic bookstore document

use jpq::{compile, query, replace_with_callback, replace_with_value, ResultOptions};
use serde_json::{json, Value};

fn bookstore() -> Value {
    json!({"store": {"book": [
        {"category": "reference", "author": "Nigel Rees", "title": "Sayings of the Century", "price": 8.95},
        {"category": "fiction", "author": "Evelyn Waugh", "title": "Sword of Honour", "price": 12.99},
        {"category": "fiction", "author": "Herman Melville", "title": "Moby Dick", "isbn": "0-553-21311-3", "price": 8.99},
        {"category": "fiction", "author": "J. R. R. Tolkien", "title": "The Lord of the Rings", "isbn": "0-395-19395-8", "price": 22.99}
    ], "bicycle": {"color": "red", "price": 19.95}}})
}

fn values(source: &str) -> Value {
    query(&bookstore(), source, ResultOptions::VALUE).expect("expression compiles")
}

mod classic_query_tests {
    use super::*;

    #[test]
    fn test_authors_of_all_books() {
        assert_eq!(
            values("$.store.book[*].author"),
            json!(["Nigel Rees", "Evelyn Waugh", "Herman Melville", "J. R. R. Tolkien"])
        );
    }

    #[test]
    fn test_all_authors_recursively() {
        assert_eq!(
            values("$..author"),
            json!(["Nigel Rees", "Evelyn Waugh", "Herman Melville", "J. R. R. Tolkien"])
        );
    }

    #[test]
    fn test_books_cheaper_than_ten() {
        assert_eq!(
            values("$.store.book[?(@.price < 10)].title"),
            json!(["Sayings of the Century", "Moby Dick"])
        );
    }

    #[test]
    fn test_books_with_isbn() {
        assert_eq!(
            values("$.store.book[?(@.isbn)].title"),
            json!(["Moby Dick", "The Lord of the Rings"])
        );
    }

    #[test]
    fn test_last_book_by_slice() {
        assert_eq!(values("$.store.book[-1:].title"), json!(["The Lord of the Rings"]));
    }

    #[test]
    fn test_most_expensive_book() {
        assert_eq!(
            values("$..book[?(@.price == max($..book[*].price))].title"),
            json!(["The Lord of the Rings"])
        );
    }

    #[test]
    fn test_sorted_distinct_price_paths() {
        let result = query(
            &bookstore(),
            "$..price",
            ResultOptions::SORT | ResultOptions::NODUPS | ResultOptions::PATH,
        )
        .expect("expression compiles");
        assert_eq!(
            result,
            json!([
                "$['store']['bicycle']['price']",
                "$['store']['book'][0]['price']",
                "$['store']['book'][1]['price']",
                "$['store']['book'][2]['price']",
                "$['store']['book'][3]['price']"
            ])
        );
    }

    #[test]
    fn test_everything_in_the_store() {
        let result = values("$.store.*");
        let items = result.as_array().expect("array result");
        assert_eq!(items.len(), 2);
        assert!(items[0].is_array(), "books come first");
        assert!(items[1].is_object(), "then the bicycle");
    }

    #[test]
    fn test_third_book_title() {
        assert_eq!(values("$.store.book[2].title"), json!(["Moby Dick"]));
    }
}

mod whole_document_tests {
    use super::*;

    #[test]
    fn test_root_yields_whole_document() {
        let doc = bookstore();
        let result = query(&doc, "$", ResultOptions::VALUE).expect("expression compiles");
        assert_eq!(result, json!([doc]));
    }

    #[test]
    fn test_descendants_enumerated_once() {
        let doc = bookstore();
        let result = query(&doc, "$..*", ResultOptions::NODUPS).expect("expression compiles");
        let items = result.as_array().expect("array result");
        // store, book, bicycle, 4 books, 4+4+5+5 book members, 2 bicycle members
        assert_eq!(items.len(), 27);

        let plain = query(&doc, "$..*", ResultOptions::VALUE).expect("expression compiles");
        assert_eq!(plain.as_array().map(|a| a.len()), Some(27));
    }

    #[test]
    fn test_emitted_paths_resolve_to_emitted_values() {
        let doc = bookstore();
        let expr = compile("$..*").expect("expression compiles");
        for (path, value) in expr.select_nodes(&doc, ResultOptions::VALUE) {
            let addressed = path.try_select(&doc).expect("path resolves");
            assert_eq!(addressed, &value, "path {path} disagrees");
        }
    }
}

mod replace_tests {
    use super::*;

    #[test]
    fn test_identity_replacement_preserves_document() {
        let mut doc = bookstore();
        let original = doc.clone();
        replace_with_callback(&mut doc, "$.store.book[*].price", |value| value.clone())
            .expect("expression compiles");
        assert_eq!(doc, original);
    }

    #[test]
    fn test_replace_with_value() {
        let mut doc = bookstore();
        replace_with_value(&mut doc, "$.store.bicycle.color", json!("black"))
            .expect("expression compiles");
        assert_eq!(doc["store"]["bicycle"]["color"], json!("black"));
    }

    #[test]
    fn test_replace_with_computed_value() {
        let mut doc = json!({"prices": [10.0, 20.0]});
        replace_with_callback(&mut doc, "$.prices[*]", |value| {
            value.as_f64().map_or(Value::Null, |f| json!(f * 2.0))
        })
        .expect("expression compiles");
        assert_eq!(doc, json!({"prices": [20.0, 40.0]}));
    }

    #[test]
    fn test_replace_filtered_matches_only() {
        let mut doc = bookstore();
        replace_with_value(&mut doc, "$.store.book[?(@.price > 20)].category", json!("epic"))
            .expect("expression compiles");
        assert_eq!(doc["store"]["book"][3]["category"], json!("epic"));
        assert_eq!(doc["store"]["book"][0]["category"], json!("reference"));
    }
}
