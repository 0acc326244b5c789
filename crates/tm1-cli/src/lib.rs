//! Command-line front end for a TM1 server: run MDX, count cells and
//! batch-write a JSON cell file.

use std::io::Read;

use serde::{Deserialize, Serialize};
use tm1_core::{CellValue, ElementTuple, InsensitiveTupleMap};

pub mod cli;

/// One cell of a cell file, also the shape `tm1 mdx` prints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellRecord {
    /// Element names in cube dimension order.
    pub coordinates: ElementTuple,
    /// Number or string stored at `coordinates`.
    pub value: CellValue,
}

/// Reads a JSON array of [`CellRecord`]s.
///
/// Coordinates repeated up to case and whitespace keep the last value.
pub fn read_cells<R: Read>(reader: R) -> serde_json::Result<InsensitiveTupleMap<CellValue>> {
    let records: Vec<CellRecord> = serde_json::from_reader(reader)?;
    Ok(records
        .into_iter()
        .map(|record| (record.coordinates, record.value))
        .collect())
}
