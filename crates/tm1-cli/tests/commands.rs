//! Integration tests: commands.

use std::{error::Error, path::PathBuf, sync::Arc};

use serde_json::json;
use tm1_cells::prelude::*;
use tm1_cli::cli::{execute, Command};
use tm1_rest::{mock::MockTransport, Method};

fn temp_file(name: &str, contents: &str) -> std::io::Result<PathBuf> {
    let path = std::env::temp_dir().join(format!("tm1-cli-{}-{name}", std::process::id()));
    std::fs::write(&path, contents)?;
    Ok(path)
}

#[test]
fn count_prints_the_cell_count() -> Result<(), Box<dyn Error>> {
    let mock = Arc::new(MockTransport::new());
    mock.on(Method::Post, "ExecuteMDX", json!({"ID": "cc"}))
        .on_text(Method::Get, "Cellsets('cc')/Cells/$count", "42")
        .on_empty(Method::Delete, "Cellsets('cc')");
    let mut out = Vec::new();

    execute(
        Command::Count {
            mdx: "SELECT FROM [c]".into(),
            sandbox: Some("sb".into()),
        },
        &CellService::new(mock.clone()),
        &mut out,
    )?;
    assert_eq!(String::from_utf8(out)?, "42\n");
    assert!(mock.calls()[0].url.ends_with("ExecuteMDX?!sandbox=sb"));
    let deletes = mock.calls_matching(Method::Delete, "Cellsets('cc')");
    assert_eq!(deletes.len(), 1);
    Ok(())
}

#[test]
fn mdx_prints_records() -> Result<(), Box<dyn Error>> {
    let mock = Arc::new(MockTransport::new());
    mock.on(Method::Post, "ExecuteMDX", json!({"ID": "m"}))
        .on(
            Method::Get,
            "Cellsets('m')?$expand=Cube",
            json!({
                "Cube": {"Name": "c", "Dimensions": [{"Name": "d1"}, {"Name": "d2"}]},
                "Axes": [
                    {"Ordinal": 0, "Tuples": [{"Members": [{"UniqueName": "[d2].[d2].[B]"}]}]},
                    {"Ordinal": 1, "Tuples": [{"Members": [{"UniqueName": "[d1].[d1].[A]"}]}]}
                ],
                "Cells": [{"Ordinal": 0, "Value": 7}]
            }),
        )
        .on_empty(Method::Delete, "Cellsets('m')");
    let mut out = Vec::new();

    execute(
        Command::Mdx {
            mdx: "SELECT ...".into(),
            csv: false,
            sandbox: None,
            skip_zeros: false,
        },
        &CellService::new(mock),
        &mut out,
    )?;
    let printed: serde_json::Value = serde_json::from_slice(&out)?;
    assert_eq!(printed, json!([{"coordinates": ["A", "B"], "value": 7.0}]));
    Ok(())
}

#[test]
fn write_submits_the_cell_file() -> Result<(), Box<dyn Error>> {
    let path = temp_file(
        "cells.json",
        r#"[{"coordinates": ["A", "B"], "value": 5}, {"coordinates": ["A", "C"], "value": "x"}]"#,
    )?;
    let mock = Arc::new(MockTransport::new());
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
            {"Name": "C", "Type": "String"}
        ]}]}),
    )
    .on(
        Method::Post,
        "ExecuteProcessWithReturn",
        json!({"ProcessExecuteStatusCode": "CompletedSuccessfully", "ErrorLogFile": null}),
    );
    let mut out = Vec::new();

    let result = execute(
        Command::Write {
            cube: "c".into(),
            file: path.clone(),
            slice_size: 1,
            workers: 2,
            precision: 8,
            increment: false,
            sandbox: None,
        },
        &CellService::new(mock.clone()),
        &mut out,
    );
    std::fs::remove_file(&path)?;
    result?;

    assert_eq!(String::from_utf8(out)?, "wrote 2 cells to c\n");
    let processes = mock.calls_matching(Method::Post, "ExecuteProcessWithReturn");
    assert_eq!(processes.len(), 2);
    Ok(())
}

#[test]
fn write_reports_a_missing_file() {
    let mock = Arc::new(MockTransport::new());
    let result = execute(
        Command::Write {
            cube: "c".into(),
            file: PathBuf::from("/nonexistent/tm1-cells.json"),
            slice_size: 10,
            workers: 1,
            precision: 8,
            increment: false,
            sandbox: None,
        },
        &CellService::new(mock.clone()),
        &mut Vec::new(),
    );
    assert!(result.is_err());
    assert!(mock.calls().is_empty());
}
