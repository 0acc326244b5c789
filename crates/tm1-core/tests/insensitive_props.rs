//! Integration tests: insensitive_props.

use proptest::prelude::*;
use tm1_core::{insensitive::normalize, InsensitiveTupleMap};

fn coordinates() -> impl Strategy<Value = Vec<(Vec<String>, i64)>> {
    prop::collection::vec(
        (prop::collection::vec("[A-Ca-c ]{1,3}", 2), any::<i64>()),
        0..40,
    )
}

proptest! {
    #[test]
    fn one_entry_per_normalized_key(pairs in coordinates()) {
        let map: InsensitiveTupleMap<i64> = pairs.iter().cloned().collect();
        let mut seen = std::collections::HashSet::new();
        for key in map.keys() {
            let normalized: Vec<String> = key.iter().map(|k| normalize(k)).collect();
            prop_assert!(seen.insert(normalized));
        }
    }

    #[test]
    fn last_write_wins(pairs in coordinates()) {
        let map: InsensitiveTupleMap<i64> = pairs.iter().cloned().collect();
        for (key, _) in &pairs {
            let expected = pairs
                .iter()
                .rev()
                .find(|(other, _)| {
                    other
                        .iter()
                        .map(|k| normalize(k))
                        .eq(key.iter().map(|k| normalize(k)))
                })
                .map(|(_, value)| *value);
            prop_assert_eq!(map.get(key).copied(), expected);
        }
    }

    #[test]
    fn first_insertion_fixes_position(pairs in coordinates()) {
        let map: InsensitiveTupleMap<i64> = pairs.iter().cloned().collect();
        let mut first_seen: Vec<Vec<String>> = Vec::new();
        for (key, _) in &pairs {
            let normalized: Vec<String> = key.iter().map(|k| normalize(k)).collect();
            if !first_seen.contains(&normalized) {
                first_seen.push(normalized);
            }
        }
        let order: Vec<Vec<String>> = map
            .keys()
            .map(|key| key.iter().map(|k| normalize(k)).collect())
            .collect();
        prop_assert_eq!(order, first_seen);
    }
}
