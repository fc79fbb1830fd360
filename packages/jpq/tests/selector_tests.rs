//! Selector execution tests: identifiers, indices, wildcards, slices,
//! recursive descent, and unions

use jpq::{compile, query, ResultOptions};
use serde_json::{json, Value};

fn values(doc: &Value, source: &str) -> Value {
    query(doc, source, ResultOptions::VALUE).expect("expression compiles")
}

mod identifier_tests {
    use super::*;

    #[test]
    fn test_member_lookup() {
        let doc = json!({"a": {"b": 42}});
        assert_eq!(values(&doc, "$.a.b"), json!([42]));
        assert_eq!(values(&doc, "$['a']['b']"), json!([42]));
    }

    #[test]
    fn test_missing_member_emits_nothing() {
        let doc = json!({"a": 1});
        assert_eq!(values(&doc, "$.missing"), json!([]));
        assert_eq!(values(&doc, "$.a.b.c"), json!([]));
    }

    #[test]
    fn test_numeric_identifier_indexes_arrays() {
        let doc = json!({"a": [10, 20, 30]});
        assert_eq!(values(&doc, "$.a.1"), json!([20]));
    }

    #[test]
    fn test_quoted_names_with_specials() {
        let doc = json!({"odd key": 1, "it's": 2});
        assert_eq!(values(&doc, "$['odd key']"), json!([1]));
        assert_eq!(values(&doc, "$['it\\'s']"), json!([2]));
    }

    #[test]
    fn test_length_of_string_counts_code_points() {
        let doc = json!({"name": "café"});
        assert_eq!(values(&doc, "$.name.length"), json!([4]));
    }

    #[test]
    fn test_length_of_array() {
        let doc = json!({"a": [1, 2, 3]});
        assert_eq!(values(&doc, "$.a.length"), json!([3]));
    }

    #[test]
    fn test_length_of_empty_array_emits_nothing() {
        let doc = json!({"a": []});
        assert_eq!(values(&doc, "$.a.length"), json!([]));
    }

    #[test]
    fn test_length_on_object_is_member_lookup() {
        let doc = json!({"a": {"length": 7}, "b": {"x": 1}});
        assert_eq!(values(&doc, "$.a.length"), json!([7]));
        assert_eq!(values(&doc, "$.b.length"), json!([]));
    }
}

mod index_tests {
    use super::*;

    #[test]
    fn test_positive_and_negative_indices() {
        let doc = json!({"a": [10, 20, 30]});
        assert_eq!(values(&doc, "$.a[0]"), json!([10]));
        assert_eq!(values(&doc, "$.a[2]"), json!([30]));
        assert_eq!(values(&doc, "$.a[-1]"), json!([30]));
        assert_eq!(values(&doc, "$.a[-3]"), json!([10]));
    }

    #[test]
    fn test_out_of_range_emits_nothing() {
        let doc = json!({"a": [10, 20, 30]});
        assert_eq!(values(&doc, "$.a[3]"), json!([]));
        assert_eq!(values(&doc, "$.a[-4]"), json!([]));
        assert_eq!(values(&doc, "$.a[100]"), json!([]));
    }

    #[test]
    fn test_index_on_non_array_emits_nothing() {
        let doc = json!({"a": {"0": "x"}});
        assert_eq!(values(&doc, "$.a[0]"), json!([]));
    }
}

mod wildcard_tests {
    use super::*;

    #[test]
    fn test_array_order() {
        let doc = json!({"a": [1, 2, 3]});
        assert_eq!(values(&doc, "$.a[*]"), json!([1, 2, 3]));
    }

    #[test]
    fn test_object_insertion_order() {
        let doc = json!({"z": 1, "a": 2, "m": 3});
        assert_eq!(values(&doc, "$.*"), json!([1, 2, 3]));
    }

    #[test]
    fn test_wildcard_on_scalar_emits_nothing() {
        let doc = json!({"a": 5});
        assert_eq!(values(&doc, "$.a[*]"), json!([]));
    }
}

mod slice_tests {
    use super::*;

    #[test]
    fn test_half_open_ranges() {
        let doc = json!({"a": [0, 1, 2, 3, 4]});
        assert_eq!(values(&doc, "$.a[1:3]"), json!([1, 2]));
        assert_eq!(values(&doc, "$.a[:2]"), json!([0, 1]));
        assert_eq!(values(&doc, "$.a[3:]"), json!([3, 4]));
    }

    #[test]
    fn test_negative_bounds() {
        let doc = json!({"a": [0, 1, 2, 3, 4]});
        assert_eq!(values(&doc, "$.a[-2:]"), json!([3, 4]));
        assert_eq!(values(&doc, "$.a[:-3]"), json!([0, 1]));
        // start at -len clamps to the front
        assert_eq!(values(&doc, "$.a[-5:]"), json!([0, 1, 2, 3, 4]));
        // far out-of-range bounds clamp rather than wrap
        assert_eq!(values(&doc, "$.a[2:100]"), json!([2, 3, 4]));
    }

    #[test]
    fn test_step() {
        let doc = json!({"a": [0, 1, 2, 3, 4]});
        assert_eq!(values(&doc, "$.a[::2]"), json!([0, 2, 4]));
        assert_eq!(values(&doc, "$.a[1::2]"), json!([1, 3]));
    }

    #[test]
    fn test_reverse_step() {
        let doc = json!({"a": [0, 1, 2, 3, 4]});
        assert_eq!(values(&doc, "$.a[::-1]"), json!([4, 3, 2, 1, 0]));
        assert_eq!(values(&doc, "$.a[3:0:-2]"), json!([3, 1]));
    }

    #[test]
    fn test_slice_of_empty_array() {
        let doc = json!({"a": []});
        assert_eq!(values(&doc, "$.a[:]"), json!([]));
        assert_eq!(values(&doc, "$.a[::-1]"), json!([]));
    }
}

mod recursive_descent_tests {
    use super::*;

    #[test]
    fn test_collects_at_every_depth() {
        let doc = json!({"a": {"x": 1, "b": {"x": 2, "c": {"x": 3}}}});
        assert_eq!(values(&doc, "$..x"), json!([1, 2, 3]));
    }

    #[test]
    fn test_through_arrays() {
        let doc = json!({"items": [{"id": 1}, {"id": 2}, {"nested": [{"id": 3}]}]});
        assert_eq!(values(&doc, "$..id"), json!([1, 2, 3]));
    }

    #[test]
    fn test_descendant_wildcard_counts() {
        let doc = json!({"a": {"b": 1}, "c": [2, 3]});
        // a, {b:1}'s b, c, c[0], c[1]
        let result = values(&doc, "$..*");
        let items = result.as_array().expect("array result");
        assert_eq!(items.len(), 5);
    }

    #[test]
    fn test_recursive_with_bracket() {
        let doc = json!({"a": [[10, 11], {"b": [20, 21]}]});
        assert_eq!(values(&doc, "$..[0]"), json!([[10, 11], 10, 20]));
    }
}

mod union_tests {
    use super::*;

    #[test]
    fn test_index_union_declaration_order() {
        let doc = json!({"a": [10, 20, 30]});
        assert_eq!(values(&doc, "$.a[2,0]"), json!([30, 10]));
        assert_eq!(values(&doc, "$.a[0,0]"), json!([10, 10]));
    }

    #[test]
    fn test_name_union() {
        let doc = json!({"a": 1, "b": 2, "c": 3});
        assert_eq!(values(&doc, "$['c','a']"), json!([3, 1]));
    }

    #[test]
    fn test_mixed_union_with_slice() {
        let doc = json!({"a": [0, 1, 2, 3]});
        assert_eq!(values(&doc, "$.a[0,2:4]"), json!([0, 2, 3]));
    }

    #[test]
    fn test_union_tail_applies_to_all_branches() {
        let doc = json!({"a": {"v": 1}, "b": {"v": 2}});
        assert_eq!(values(&doc, "$['a','b'].v"), json!([1, 2]));
    }

    #[test]
    fn test_union_of_filters() {
        let doc = json!({"books": [
            {"category": "memoir", "title": "m1"},
            {"category": "fiction", "title": "f1", "price": 30},
            {"category": "fiction", "title": "f2", "price": 5}
        ]});
        let result = values(&doc, "$.books[?@.category=='memoir',?@.price > 23].title");
        assert_eq!(result, json!(["m1", "f1"]));
    }
}

mod computed_index_tests {
    use super::*;

    #[test]
    fn test_length_minus_one() {
        let doc = json!({"a": [10, 20, 30]});
        assert_eq!(values(&doc, "$.a[(@.length - 1)]"), json!([30]));
    }

    #[test]
    fn test_string_result_selects_member() {
        let doc = json!({"which": "b", "a": 1, "b": 2});
        assert_eq!(values(&doc, "$[($.which)]"), json!([2]));
    }

    #[test]
    fn test_non_integer_result_emits_nothing() {
        let doc = json!({"a": [10, 20, 30]});
        assert_eq!(values(&doc, "$.a[(@.missing)]"), json!([]));
    }
}
