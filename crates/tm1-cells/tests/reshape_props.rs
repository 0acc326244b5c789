//! Integration tests: reshape_props.

use proptest::prelude::*;
use tm1_cells::{
    batch::partition,
    extract::{split_rows, ui_array, RawCellset},
    statements::batch_statements,
    CellError,
};
use serde_json::{json, Value};
use tm1_core::{
    constants::MAX_STATEMENTS, insensitive::normalize, CellValue, InsensitiveTupleMap,
};

fn cells() -> impl Strategy<Value = InsensitiveTupleMap<u32>> {
    prop::collection::vec((prop::collection::vec("[a-z]{1,4}", 2), any::<u32>()), 0..60)
        .prop_map(|pairs| pairs.into_iter().collect())
}

fn axis(ordinal: usize, prefix: &str, count: usize) -> Value {
    let tuples: Vec<Value> = (0..count)
        .map(|i| json!({"Members": [{"Name": format!("{prefix}{i}")}]}))
        .collect();
    json!({"Ordinal": ordinal, "Tuples": tuples})
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn ui_array_places_every_ordinal(
        columns in 1usize..5,
        rows in 1usize..5,
        pages in 1usize..4,
        kept in prop::collection::vec(any::<bool>(), 64),
    ) {
        let cells: Vec<Value> = (0..columns * rows * pages)
            .filter(|ordinal| kept[*ordinal])
            .map(|ordinal| json!({"Ordinal": ordinal, "Value": ordinal}))
            .collect();
        let raw: RawCellset = serde_json::from_value(json!({
            "Axes": [axis(0, "c", columns), axis(1, "r", rows), axis(2, "p", pages)],
            "Cells": cells,
        }))
        .unwrap();

        let array = ui_array(&raw, None);
        prop_assert_eq!(array.cells.len(), pages);
        for (page, page_rows) in &array.cells {
            let z: usize = page[1..].parse().unwrap();
            prop_assert_eq!(page_rows.len(), rows);
            for (row, values) in page_rows {
                let y: usize = row[1..].parse().unwrap();
                prop_assert_eq!(values.len(), columns);
                for (x, value) in values.iter().enumerate() {
                    let ordinal = x + columns * (y + rows * z);
                    let expected = if kept[ordinal] {
                        CellValue::from(i32::try_from(ordinal).unwrap())
                    } else {
                        CellValue::Null
                    };
                    prop_assert_eq!(value, &expected);
                }
            }
        }
    }

    #[test]
    fn partition_reconstructs_the_map(map in cells(), slice_size in 1usize..8) {
        let n = map.len();
        let chunks = partition(map.clone(), slice_size).unwrap();
        prop_assert_eq!(chunks.len(), n.div_ceil(slice_size));
        prop_assert!(chunks.iter().all(|chunk| !chunk.is_empty() && chunk.len() <= slice_size));

        let mut seen = std::collections::HashSet::new();
        for chunk in &chunks {
            for key in chunk.keys() {
                let normalized: Vec<String> = key.iter().map(|k| normalize(k)).collect();
                prop_assert!(seen.insert(normalized));
            }
        }
        let rebuilt: InsensitiveTupleMap<u32> = chunks.into_iter().flatten().collect();
        prop_assert_eq!(rebuilt.as_slice(), map.as_slice());
    }

    #[test]
    fn batching_keeps_every_statement(
        count in prop_oneof![0usize..4, (MAX_STATEMENTS - 1)..(MAX_STATEMENTS + 2), (2 * MAX_STATEMENTS - 1)..(2 * MAX_STATEMENTS + 3)]
    ) {
        let statements: Vec<String> = (0..count).map(|i| format!("s{i};")).collect();
        let units = batch_statements(&statements, "");
        prop_assert_eq!(units.len(), count.div_ceil(2 * MAX_STATEMENTS));
        let replayed: Vec<String> = units
            .iter()
            .flat_map(|unit| [unit.prolog(), unit.epilog()])
            .filter(|section| !section.is_empty())
            .flat_map(|section| section.split('\r'))
            .map(str::to_string)
            .collect();
        prop_assert_eq!(replayed, statements);
    }
}

#[test]
fn split_rows_round_trips() {
    for rows in [0usize, 1, 5] {
        for columns in [0usize, 1, 5] {
            let tuples: Vec<Vec<String>> = (0..rows).map(|r| vec![format!("r{r}")]).collect();
            let values: Vec<usize> = (0..rows * columns).collect();
            let split = split_rows(tuples, values.clone()).unwrap();
            assert_eq!(split.len(), rows);
            assert!(split.values().all(|run| run.len() == columns));
            let flattened: Vec<usize> = split.into_iter().flat_map(|(_, run)| run).collect();
            assert_eq!(flattened, values);
        }
    }
}

#[test]
fn uneven_values_are_malformed() {
    let tuples = vec![vec!["a".to_string()], vec!["b".to_string()]];
    let err = split_rows(tuples, vec![1, 2, 3]).unwrap_err();
    assert!(matches!(err, CellError::MalformedCellset { cells: 3, rows: 2 }));
}
