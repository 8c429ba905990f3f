//! Property-based tests for pipeline stage laws.

use aggrelite_core::Pipeline;
use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::BTreeSet;

fn run(pipeline: Value, docs: &[Value]) -> Vec<Value> {
    Pipeline::from_json(&pipeline).unwrap().run(docs).unwrap()
}

fn numbered(values: &[i64]) -> Vec<Value> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| json!({"seq": i, "k": v}))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn limit_at_or_above_len_is_identity(
        values in prop::collection::vec(any::<i64>(), 0..32),
        extra in 0usize..8,
    ) {
        let docs = numbered(&values);
        let out = run(json!([{"$limit": docs.len() + extra}]), &docs);
        prop_assert_eq!(out, docs);
    }

    #[test]
    fn opposite_sorts_reverse_on_distinct_keys(
        keys in prop::collection::btree_set(-1000i64..1000, 0..32),
    ) {
        // Shuffle deterministically so input order differs from key order
        let mut values: Vec<i64> = keys.into_iter().collect();
        values.reverse();
        let pivot = values.len() / 3;
        values.rotate_left(pivot);
        let docs = numbered(&values);

        let ascending = run(json!([{"$sort": {"k": 1}}]), &docs);
        let mut descending = run(json!([{"$sort": {"k": -1}}]), &docs);
        descending.reverse();
        prop_assert_eq!(ascending, descending);
    }

    #[test]
    fn unwind_then_count_sees_every_element(
        arrays in prop::collection::vec(prop::collection::vec(0u8..10, 0..6), 0..16),
    ) {
        let docs: Vec<Value> = arrays
            .iter()
            .enumerate()
            .map(|(i, items)| json!({"_id": i, "items": items}))
            .collect();
        let total: usize = arrays.iter().map(Vec::len).sum();

        let out = run(
            json!([
                {"$unwind": "$items"},
                {"$group": {"_id": null, "count": {"$sum": 1}}}
            ]),
            &docs,
        );
        if total == 0 {
            prop_assert!(out.is_empty());
        } else {
            prop_assert_eq!(out, vec![json!({"_id": null, "count": total})]);
        }
    }

    #[test]
    fn grouping_partitions_the_input(
        values in prop::collection::vec(0i64..6, 0..48),
    ) {
        let docs = numbered(&values);
        let out = run(json!([{"$group": {"_id": "$k", "n": {"$sum": 1}}}]), &docs);

        let counted: i64 = out.iter().map(|g| g["n"].as_i64().unwrap()).sum();
        prop_assert_eq!(counted as usize, docs.len());

        let distinct: BTreeSet<i64> = values.iter().copied().collect();
        prop_assert_eq!(out.len(), distinct.len());
    }

    #[test]
    fn add_to_set_has_no_duplicates(
        values in prop::collection::vec(0i64..5, 1..32),
    ) {
        let docs = numbered(&values);
        let out = run(json!([{"$group": {"_id": null, "ks": {"$addToSet": "$k"}}}]), &docs);
        let set = out[0]["ks"].as_array().unwrap();

        let distinct: BTreeSet<i64> = values.iter().copied().collect();
        prop_assert_eq!(set.len(), distinct.len());
        // First-seen order
        prop_assert_eq!(&set[0], &json!(values[0]));
    }
}
