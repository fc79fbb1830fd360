//! Result-option tests: path output, sorting, de-duplication, callbacks,
//! and determinism

use jpq::{compile, query, ResultOptions};
use serde_json::{json, Value};

fn doc() -> Value {
    json!({"a": {"x": 1}, "b": [{"x": 2}, {"x": 3}]})
}

mod path_output_tests {
    use super::*;

    #[test]
    fn test_path_option_emits_normalized_paths() {
        let result = query(&doc(), "$..x", ResultOptions::PATH).expect("compiles");
        assert_eq!(
            result,
            json!(["$['a']['x']", "$['b'][0]['x']", "$['b'][1]['x']"])
        );
    }

    #[test]
    fn test_root_path() {
        let result = query(&doc(), "$", ResultOptions::PATH).expect("compiles");
        assert_eq!(result, json!(["$"]));
    }

    #[test]
    fn test_select_paths_navigate_back_to_values() {
        let document = doc();
        let expr = compile("$..x").expect("compiles");
        let nodes = expr.select_nodes(&document, ResultOptions::VALUE);
        assert_eq!(nodes.len(), 3);
        for (path, value) in nodes {
            let addressed = path
                .try_select(&document)
                .expect("every emitted path resolves");
            assert_eq!(addressed, &value);
        }
    }

    #[test]
    fn test_select_returns_bare_values() {
        let expr = compile("$.b[*].x").expect("compiles");
        assert_eq!(expr.select(&doc(), ResultOptions::VALUE), vec![json!(2), json!(3)]);
    }

    #[test]
    fn test_json_pointer_rendition() {
        let expr = compile("$.b[1].x").expect("compiles");
        let paths = expr.select_paths(&doc(), ResultOptions::VALUE);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].as_str(), "$['b'][1]['x']");
        assert_eq!(paths[0].to_json_pointer(), "/b/1/x");
    }
}

mod dedup_and_sort_tests {
    use super::*;

    #[test]
    fn test_union_duplicates_survive_by_default() {
        let document = json!({"a": [10, 20]});
        let result = query(&document, "$.a[0,0,1]", ResultOptions::VALUE).expect("compiles");
        assert_eq!(result, json!([10, 10, 20]));
    }

    #[test]
    fn test_nodups_keeps_first_occurrence_order() {
        let document = json!({"a": [10, 20]});
        let result = query(&document, "$.a[1,0,1]", ResultOptions::NODUPS).expect("compiles");
        assert_eq!(result, json!([20, 10]));
    }

    #[test]
    fn test_sort_orders_by_path() {
        let document = json!({"a": [10, 20]});
        let result = query(&document, "$.a[1,0]", ResultOptions::SORT).expect("compiles");
        assert_eq!(result, json!([10, 20]));
    }

    #[test]
    fn test_sort_with_paths() {
        let result = query(
            &doc(),
            "$..x",
            ResultOptions::SORT | ResultOptions::NODUPS | ResultOptions::PATH,
        )
        .expect("compiles");
        assert_eq!(
            result,
            json!(["$['a']['x']", "$['b'][0]['x']", "$['b'][1]['x']"])
        );
    }

    #[test]
    fn test_sort_and_nodups_combined() {
        let document = json!({"a": [10, 20]});
        let result = query(
            &document,
            "$.a[1,0,1,0]",
            ResultOptions::SORT | ResultOptions::NODUPS,
        )
        .expect("compiles");
        assert_eq!(result, json!([10, 20]));
    }
}

mod callback_tests {
    use super::*;

    #[test]
    fn test_callback_receives_paths_and_values() {
        let document = doc();
        let expr = compile("$.b[*].x").expect("compiles");
        let mut seen = Vec::new();
        expr.evaluate_with_callback(&document, ResultOptions::VALUE, |path, value| {
            seen.push((path.as_str().to_string(), value.clone()));
        });
        assert_eq!(
            seen,
            vec![
                ("$['b'][0]['x']".to_string(), json!(2)),
                ("$['b'][1]['x']".to_string(), json!(3)),
            ]
        );
    }
}

mod determinism_tests {
    use super::*;

    #[test]
    fn test_repeated_evaluation_is_identical() {
        let document = doc();
        let expr = compile("$..x").expect("compiles");
        let first = expr.evaluate(&document, ResultOptions::VALUE);
        let second = expr.evaluate(&document, ResultOptions::VALUE);
        assert_eq!(first, second);

        let first_paths = expr.evaluate(&document, ResultOptions::PATH);
        let second_paths = expr.evaluate(&document, ResultOptions::PATH);
        assert_eq!(first_paths, second_paths);
    }

    #[test]
    fn test_compiled_expression_is_reusable_across_documents() {
        let expr = compile("$.v").expect("compiles");
        assert_eq!(expr.evaluate(&json!({"v": 1}), ResultOptions::VALUE), json!([1]));
        assert_eq!(expr.evaluate(&json!({"v": 2}), ResultOptions::VALUE), json!([2]));
        assert_eq!(expr.evaluate(&json!({}), ResultOptions::VALUE), json!([]));
    }
}
