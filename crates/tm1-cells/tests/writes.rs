//! Integration tests: writes.

use std::sync::Arc;

use serde_json::{json, Value};
use tm1_cells::prelude::*;
use tm1_core::{CellValue, ElementType, InsensitiveDict, InsensitiveTupleMap};
use tm1_rest::{mock::MockTransport, Method};

fn two_cells() -> InsensitiveTupleMap<CellValue> {
    let mut cells = InsensitiveTupleMap::new();
    cells.insert(
        vec!["A".to_string(), "B".to_string()],
        CellValue::Number(10.0),
    );
    cells.insert(
        vec!["A".to_string(), "C".to_string()],
        CellValue::Number(20.0),
    );
    cells
}

fn script_metadata(mock: &MockTransport) {
    mock.on(
        Method::Get,
        "Cubes('c')/Dimensions",
        json!({"value": [{"Name": "d1"}, {"Name": "d2"}]}),
    )
    .on(
        Method::Get,
        "Dimensions('d2')?$expand=Hierarchies",
        json!({"Hierarchies": [{"Elements": [
            {"Name": "B", "Type": "Numeric"},
            {"Name": "C", "Type": "Numeric"}
        ]}]}),
    );
}

fn prologs(mock: &MockTransport) -> Vec<String> {
    mock.calls_matching(Method::Post, "ExecuteProcessWithReturn")
        .into_iter()
        .filter_map(|call| call.body)
        .map(|body| body["Process"]["PrologProcedure"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[test]
fn batched_write_submits_every_coordinate_once() -> CellResult<()> {
    let mock = Arc::new(MockTransport::new());
    script_metadata(&mock);
    mock.on(
        Method::Post,
        "ExecuteProcessWithReturn",
        json!({"ProcessExecuteStatusCode": "CompletedSuccessfully", "ErrorLogFile": null}),
    );
    let cells = CellService::new(mock.clone());
    cells.write_async("c", two_cells(), 1, 2, &WriteOptions::default())?;

    let prologs = prologs(&mock);
    assert_eq!(prologs.len(), 2);
    let b = prologs.iter().filter(|p| p.contains("'c','A','B'")).count();
    let c = prologs.iter().filter(|p| p.contains("'c','A','C'")).count();
    assert_eq!((b, c), (1, 1));
    assert!(prologs.iter().all(|p| p.starts_with("ServerActiveSandboxSet('');")));
    // metadata is resolved once for the whole batch
    let lookups = mock.calls_matching(Method::Get, "Cubes('c')/Dimensions");
    assert_eq!(lookups.len(), 1);
    Ok(())
}

#[test]
fn one_failed_chunk_is_reported_once() {
    let mock = Arc::new(MockTransport::new());
    script_metadata(&mock);
    mock.on_body(
        Method::Post,
        "ExecuteProcessWithReturn",
        "'c','A','C'",
        json!({"ProcessExecuteStatusCode": "Aborted", "ErrorLogFile": {"Filename": "TM1ProcessError_x.log"}}),
    )
    .on(
        Method::Post,
        "ExecuteProcessWithReturn",
        json!({"ProcessExecuteStatusCode": "CompletedSuccessfully"}),
    );
    let cells = CellService::new(mock.clone());
    let err = cells
        .write_async("c", two_cells(), 1, 2, &WriteOptions::default())
        .unwrap_err();
    match err {
        CellError::PartialWriteFailure {
            statuses,
            error_log_files,
            attempts,
        } => {
            assert_eq!(statuses, vec!["Aborted"]);
            assert_eq!(error_log_files, vec!["TM1ProcessError_x.log"]);
            assert_eq!(attempts, 2);
        }
        other => panic!("unexpected {other:?}"),
    }
    let prologs = prologs(&mock);
    assert_eq!(prologs.len(), 2);
    assert!(prologs.iter().any(|p| p.contains("'c','A','B'")));
}

#[test]
fn unbound_write_with_only_failures_is_total() {
    let mock = Arc::new(MockTransport::new());
    mock.on(
        Method::Post,
        "ExecuteProcessWithReturn",
        json!({"ProcessExecuteStatusCode": "Aborted"}),
    );
    let mut types = InsensitiveDict::new();
    types.insert("B".to_string(), ElementType::Numeric);
    let options = WriteOptions {
        use_ti: true,
        measure_element_types: Some(types),
        dimensions: Some(vec!["d1".to_string(), "d2".to_string()]),
        ..WriteOptions::default()
    };
    let err = CellService::new(mock)
        .write("c", &two_cells(), &options)
        .unwrap_err();
    assert!(matches!(err, CellError::TotalWriteFailure { .. }));
}

#[test]
fn minor_errors_are_partial() {
    let mock = Arc::new(MockTransport::new());
    mock.on(
        Method::Post,
        "ExecuteProcessWithReturn",
        json!({"ProcessExecuteStatusCode": "HasMinorErrors"}),
    );
    let options = WriteOptions {
        measure_element_types: Some(InsensitiveDict::new()),
        ..WriteOptions::default()
    };
    let err = CellService::new(mock)
        .write_through_unbound_process("c", &two_cells(), &options)
        .unwrap_err();
    assert!(matches!(err, CellError::PartialWriteFailure { attempts: 1, .. }));
}

#[test]
fn cellset_write_patches_ordinals_and_cleans_up() -> CellResult<()> {
    let mock = Arc::new(MockTransport::new());
    mock.on(Method::Post, "ExecuteMDX", json!({"ID": "cs1"}))
        .on(
            Method::Get,
            "Cellsets('cs1')?$expand=Cells",
            json!({"Cells": [{"Value": 5}, {"Value": null}]}),
        )
        .on_empty(Method::Patch, "Cellsets('cs1')/Cells")
        .on_empty(Method::Delete, "Cellsets('cs1')");
    let options = WriteOptions {
        increment: true,
        ..WriteOptions::default()
    }
    .with_dimensions(vec!["d1".to_string(), "d2".to_string()])
    .with_sandbox("sb");
    let changeset = CellService::new(mock.clone()).write("c", &two_cells(), &options)?;
    assert_eq!(changeset, None);

    let mdx = mock.calls_matching(Method::Post, "ExecuteMDX")[0]
        .body
        .clone()
        .unwrap_or(Value::Null);
    assert_eq!(
        mdx["MDX"],
        "SELECT\r\n{([d1].[d1].[A],[d2].[d2].[B]),([d1].[d1].[A],[d2].[d2].[C])} ON 0\r\nFROM [c]"
    );
    let patch = &mock.calls_matching(Method::Patch, "Cells")[0];
    assert_eq!(patch.url, "/api/v1/Cellsets('cs1')/Cells?!sandbox=sb");
    assert_eq!(
        patch.body,
        Some(json!([{"Ordinal": 0, "Value": 15.0}, {"Ordinal": 1, "Value": 20.0}]))
    );
    let deletes = mock.calls_matching(Method::Delete, "Cellsets('cs1')");
    assert_eq!(deletes.len(), 1);
    Ok(())
}

#[test]
fn failed_update_still_deletes_cellset() {
    let mock = Arc::new(MockTransport::new());
    mock.on(Method::Post, "ExecuteMDX", json!({"ID": "cs2"}))
        .fail(Method::Patch, "Cellsets('cs2')/Cells", 400)
        .fail(Method::Delete, "Cellsets('cs2')", 404);
    let err = CellService::new(mock.clone())
        .write_values_through_cellset(
            "SELECT {[d].[d].[x]} ON 0 FROM [c]",
            &[CellValue::Number(1.0)],
            &WriteOptions::default(),
        )
        .unwrap_err();
    assert_eq!(err.status_code(), Some(400));
    let deletes = mock.calls_matching(Method::Delete, "Cellsets('cs2')");
    assert_eq!(deletes.len(), 1);
}

#[test]
fn direct_write_in_changeset() -> CellResult<()> {
    let mock = Arc::new(MockTransport::new());
    mock.on(Method::Post, "BeginChangeSet", json!({"value": "cs-9"}))
        .on_empty(Method::Post, "EndChangeSet")
        .on_empty(Method::Post, "Cubes('c')/tm1.Update");
    let options = WriteOptions {
        use_changeset: true,
        ..WriteOptions::default()
    }
    .with_dimensions(vec!["d1".to_string(), "d2".to_string()]);
    let mut cells = two_cells();
    cells.insert(
        vec!["A".to_string(), "C".to_string()],
        CellValue::Number(0.0),
    );
    let changeset = CellService::new(mock.clone()).write_values("c", &cells, &options)?;
    assert_eq!(changeset.as_deref(), Some("cs-9"));

    let update = &mock.calls_matching(Method::Post, "tm1.Update")[0];
    assert_eq!(update.url, "/api/v1/Cubes('c')/tm1.Update?!ChangeSet=cs-9");
    assert_eq!(
        update.body,
        Some(json!([
            {"Cells": [{"Tuple@odata.bind": [
                "Dimensions('d1')/Hierarchies('d1')/Elements('A')",
                "Dimensions('d2')/Hierarchies('d2')/Elements('B')"
            ]}], "Value": 10.0},
            {"Cells": [{"Tuple@odata.bind": [
                "Dimensions('d1')/Hierarchies('d1')/Elements('A')",
                "Dimensions('d2')/Hierarchies('d2')/Elements('C')"
            ]}], "Value": ""}
        ]))
    );
    assert_eq!(mock.calls_matching(Method::Post, "EndChangeSet").len(), 1);
    Ok(())
}

#[test]
fn transaction_log_is_reactivated_after_failure() {
    let mock = Arc::new(MockTransport::new());
    mock.on_empty(Method::Post, "Cubes('}CubeProperties')/tm1.Update")
        .fail(Method::Post, "Cubes('c')/tm1.Update", 500);
    let options = WriteOptions {
        deactivate_transaction_log: true,
        reactivate_transaction_log: true,
        ..WriteOptions::default()
    }
    .with_dimensions(vec!["d1".to_string(), "d2".to_string()]);
    let err = CellService::new(mock.clone())
        .write_values("c", &two_cells(), &options)
        .unwrap_err();
    assert_eq!(err.status_code(), Some(500));

    let toggles: Vec<Value> = mock
        .calls_matching(Method::Post, "}CubeProperties")
        .into_iter()
        .filter_map(|call| call.body)
        .map(|body| body["Value"].clone())
        .collect();
    assert_eq!(toggles, vec![json!("NO"), json!("YES")]);
}

#[test]
fn non_updateable_cells_are_dropped() -> CellResult<()> {
    let mock = Arc::new(MockTransport::new());
    mock.on_once(
        Method::Post,
        "ExecuteMDX",
        json!({"ID": "probe"}),
    )
    .on(
        Method::Get,
        "Cellsets('probe')?$expand=Cube",
        json!({
            "Cube": {"Name": "c", "Dimensions": [{"Name": "d1"}, {"Name": "d2"}]},
            "Axes": [{"Ordinal": 0, "Tuples": [
                {"Ordinal": 0, "Members": [{"UniqueName": "[d1].[d1].[A]"}, {"UniqueName": "[d2].[d2].[B]"}]},
                {"Ordinal": 1, "Members": [{"UniqueName": "[d1].[d1].[A]"}, {"UniqueName": "[d2].[d2].[C]"}]}
            ]}],
            "Cells": [
                {"Ordinal": 0, "Value": 1, "Updateable": 256},
                {"Ordinal": 1, "Value": 2, "Updateable": 268435712}
            ]
        }),
    )
    .on_empty(Method::Delete, "Cellsets(");
    let cells = CellService::new(mock);
    let dimensions = vec!["d1".to_string(), "d2".to_string()];
    let kept = cells.drop_non_updateable_cells(&two_cells(), "c", &dimensions)?;
    assert_eq!(kept.len(), 1);
    assert!(kept.contains_key(&vec!["a".to_string(), "b".to_string()]));
    Ok(())
}

#[test]
fn proportional_spread_payload() -> CellResult<()> {
    let mock = Arc::new(MockTransport::new());
    mock.on(Method::Post, "ExecuteMDX", json!({"ID": "sp"}))
        .on_empty(Method::Post, "Cellsets('sp')/tm1.Update")
        .on_empty(Method::Delete, "Cellsets('sp')");
    CellService::new(mock.clone()).relative_proportional_spread(
        12.0,
        "c",
        &["[d1].[A]".to_string(), "[d2].[B]".to_string()],
        &["[d1].[d1].[Total]".to_string(), "[d2].[B]".to_string()],
        None,
        None,
    )?;
    let mdx = mock.calls_matching(Method::Post, "ExecuteMDX")[0].body.clone();
    assert_eq!(
        mdx,
        Some(json!({"MDX": "SELECT { [d1].[A]}*{[d2].[B] } ON 0 FROM [c]"}))
    );
    let update = mock.calls_matching(Method::Post, "tm1.Update")[0].body.clone();
    assert_eq!(
        update,
        Some(json!({
            "BeginOrdinal": 0,
            "Value": "RP12",
            "ReferenceCell@odata.bind": [
                "Dimensions('d1')/Hierarchies('d1')/Elements('Total')",
                "Dimensions('d2')/Hierarchies('d2')/Elements('B')"
            ],
            "ReferenceCube@odata.bind": "Cubes('c')"
        }))
    );
    Ok(())
}

#[test]
fn clear_removes_temporary_view_after_failure() {
    let mock = Arc::new(MockTransport::new());
    mock.on(
        Method::Get,
        "Cubes('Sales')/Dimensions",
        json!({"value": [{"Name": "Region"}, {"Name": "Measure"}]}),
    )
    .on_empty(Method::Post, "Cubes('Sales')/Views")
    .on(
        Method::Post,
        "ExecuteProcessWithReturn",
        json!({"ProcessExecuteStatusCode": "Aborted"}),
    )
    .on(Method::Get, "Cubes('Sales')/Views(", json!({"Name": "tmp"}))
    .on_empty(Method::Delete, "Cubes('Sales')/Views(");
    let mut expressions = InsensitiveDict::new();
    expressions.insert("region".to_string(), "[Region].[North]".to_string());

    let err = CellService::new(mock.clone())
        .clear("Sales", &expressions, None)
        .unwrap_err();
    assert!(matches!(err, CellError::ClearFailed { .. }));

    let view = mock.calls_matching(Method::Post, "Cubes('Sales')/Views")[0]
        .body
        .clone()
        .unwrap_or(Value::Null);
    assert_eq!(
        view["MDX"],
        "SELECT NON EMPTY {[Region].[North]} * {TM1FILTERBYLEVEL({TM1SUBSETALL([Measure].[Measure])},0)} ON 0 FROM [Sales]"
    );
    let name = view["Name"].as_str().unwrap_or_default().to_string();
    assert!(name.starts_with("}tm1rs_"));
    let process = mock.calls_matching(Method::Post, "ExecuteProcessWithReturn")[0]
        .body
        .clone()
        .unwrap_or(Value::Null);
    assert_eq!(
        process["Process"]["EpilogProcedure"],
        format!("ViewZeroOut('Sales','{name}');")
    );
    let deletes = mock.calls_matching(Method::Delete, "Views(");
    assert_eq!(deletes.len(), 1);
    assert!(deletes[0].url.contains(&name));
}
