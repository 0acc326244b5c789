//! Deserialized cellset payloads and the pure functions reshaping them.

use csv::{Terminator, WriterBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tm1_core::{
    insensitive::insensitive_eq,
    mdx::{dimension_name_from_unique_name, element_name_from_unique_name},
    CellValue, ElementTuple, InsensitiveDict, InsensitiveSet, InsensitiveTupleMap,
};

use crate::{CellError, CellResult};

/// Cellset as returned by `GET Cellsets('id')` with its expansions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawCellset {
    /// Cellset ID, when selected.
    #[serde(rename = "ID", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Cube the cellset was read from, when expanded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cube: Option<RawCube>,
    /// Columns, rows and titles, in that order when ordinals are missing.
    #[serde(default)]
    pub axes: Vec<RawAxis>,
    /// Cells in ordinal order.
    #[serde(default)]
    pub cells: Vec<RawCell>,
}

/// Name and dimensions of the cube behind a cellset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawCube {
    /// Cube name.
    pub name: String,
    /// Dimensions in cube order.
    #[serde(default)]
    pub dimensions: Vec<RawNamed>,
}

/// Any object selected by name only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawNamed {
    /// Object name.
    pub name: String,
}

/// One axis of a cellset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawAxis {
    /// 0 for columns, 1 for rows, 2 for titles.
    #[serde(default)]
    pub ordinal: Option<usize>,
    /// Number of tuples on the axis.
    #[serde(default)]
    pub cardinality: Option<usize>,
    /// Hierarchies laid out on the axis.
    #[serde(default)]
    pub hierarchies: Vec<RawHierarchy>,
    /// Tuples in display order.
    #[serde(default)]
    pub tuples: Vec<RawTuple>,
}

/// Hierarchy of an axis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawHierarchy {
    /// Hierarchy name.
    #[serde(default)]
    pub name: Option<String>,
    /// `[dimension].[hierarchy]`
    #[serde(default)]
    pub unique_name: Option<String>,
    /// Owning dimension, when expanded.
    #[serde(default)]
    pub dimension: Option<RawNamed>,
}

/// One tuple of an axis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawTuple {
    /// Position on the axis.
    #[serde(default)]
    pub ordinal: Option<usize>,
    /// One member per hierarchy of the axis.
    #[serde(default)]
    pub members: Vec<RawMember>,
}

/// Member of a tuple with whatever properties were selected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawMember {
    /// Member name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// `[dimension].[hierarchy].[element]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_name: Option<String>,
    /// Underlying element, when expanded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<RawElement>,
    /// Remaining selected properties.
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

impl RawMember {
    /// Plain name of the member or of its element.
    pub fn name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .or_else(|| self.element.as_ref().and_then(|e| e.name.as_deref()))
    }

    /// Unique name of the member or of its element.
    pub fn unique_name(&self) -> Option<&str> {
        self.unique_name
            .as_deref()
            .or_else(|| self.element.as_ref().and_then(|e| e.unique_name.as_deref()))
    }
}

/// Element behind a member.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawElement {
    /// Element name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// `[dimension].[hierarchy].[element]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_name: Option<String>,
    /// Remaining selected properties, such as `Attributes`.
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

/// One cell with whatever properties were selected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawCell {
    /// Position in the cellset; the list position when not selected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ordinal: Option<usize>,
    /// Cell value, null when not selected.
    #[serde(default)]
    pub value: CellValue,
    /// Remaining selected properties.
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

impl RawCell {
    /// Selected property `name`, such as `RuleDerived`.
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// The `Updateable` bit field, when it was selected.
    pub fn updateable(&self) -> Option<u64> {
        self.property("Updateable").and_then(Value::as_u64)
    }
}

impl RawCellset {
    /// Axis with ordinal `n`, or the `n`-th axis when ordinals were not returned.
    pub fn axis(&self, n: usize) -> Option<&RawAxis> {
        if self.axes.iter().any(|axis| axis.ordinal.is_some()) {
            self.axes.iter().find(|axis| axis.ordinal == Some(n))
        } else {
            self.axes.get(n)
        }
    }

    fn tuples(&self, n: usize) -> &[RawTuple] {
        self.axis(n).map_or(&[], |axis| axis.tuples.as_slice())
    }

    /// Dimension names of the expanded cube, in cube order.
    pub fn cube_dimensions(&self) -> Vec<&str> {
        self.cube
            .as_ref()
            .map(|cube| cube.dimensions.iter().map(|d| d.name.as_str()).collect())
            .unwrap_or_default()
    }

    /// Cell values in cellset order.
    pub fn values(&self) -> Vec<CellValue> {
        self.cells.iter().map(|cell| cell.value.clone()).collect()
    }
}

/// Position of every axis member of `ordinal` as `(axis1 tuple, axis0 tuple)`.
fn tuple_indices(ordinal: usize, columns: usize, rows: usize) -> (Option<usize>, Option<usize>) {
    let column = (columns > 0).then(|| ordinal % columns);
    let row = (rows > 0).then(|| {
        if columns > 0 {
            (ordinal / columns) % rows
        } else {
            ordinal % rows
        }
    });
    (row, column)
}

/// Splits `values` into consecutive runs, one per row tuple.
///
/// No rows yields an empty map. A value count that is not a multiple of the
/// row count is a malformed cellset.
pub fn split_rows<V>(
    rows: Vec<ElementTuple>,
    values: Vec<V>,
) -> CellResult<InsensitiveTupleMap<Vec<V>>> {
    let mut result = InsensitiveTupleMap::with_capacity(rows.len());
    if rows.is_empty() {
        return Ok(result);
    }
    if values.len() % rows.len() != 0 {
        return Err(CellError::MalformedCellset {
            cells: values.len(),
            rows: rows.len(),
        });
    }
    let columns = values.len() / rows.len();
    let mut values = values.into_iter();
    for row in rows {
        result.insert(row, values.by_ref().take(columns).collect());
    }
    Ok(result)
}

/// Row tuples and their value runs from a rows-and-values read.
///
/// Row members are element unique names or plain names, whichever the read selected.
pub fn rows_and_values(
    raw: &RawCellset,
    element_unique_names: bool,
) -> CellResult<InsensitiveTupleMap<Vec<CellValue>>> {
    let tuples = raw
        .axes
        .first()
        .map_or(&[][..], |axis| axis.tuples.as_slice());
    let rows = tuples
        .iter()
        .map(|tuple| {
            tuple
                .members
                .iter()
                .map(|member| {
                    let name = if element_unique_names {
                        member.unique_name()
                    } else {
                        member.name()
                    };
                    name.unwrap_or_default().to_string()
                })
                .collect()
        })
        .collect();
    split_rows(rows, raw.values())
}

/// Row element names plus the string values found in the cells.
pub fn string_set(
    rows_and_values: &InsensitiveTupleMap<Vec<CellValue>>,
    exclude_empty: bool,
) -> InsensitiveSet {
    let mut set = InsensitiveSet::new();
    for (row, values) in rows_and_values {
        set.extend(row.iter().cloned());
        for value in values {
            if let CellValue::String(s) = value {
                if !(exclude_empty && s.is_empty()) {
                    set.insert(s.clone());
                }
            }
        }
    }
    set
}

/// Element part of a unique name; names that are not bracketed pass through.
fn element_name(coordinate: &str) -> String {
    element_name_from_unique_name(coordinate).unwrap_or_else(|_| coordinate.to_string())
}

/// Orders unique names by the position of their dimension in the cube.
fn sort_by_cube_dimensions(cube_dimensions: &[&str], unique_names: &mut [String]) {
    let position = |unique_name: &String| {
        dimension_name_from_unique_name(unique_name)
            .ok()
            .and_then(|dimension| {
                cube_dimensions
                    .iter()
                    .position(|d| insensitive_eq(d, &dimension))
            })
            .unwrap_or(usize::MAX)
    };
    unique_names.sort_by_key(position);
}

/// Every cell keyed by its full coordinates in cube dimension order.
pub fn cells_by_coordinates(
    raw: &RawCellset,
    element_unique_names: bool,
) -> CellResult<InsensitiveTupleMap<RawCell>> {
    let columns = raw.tuples(0);
    let rows = raw.tuples(1);
    let titles = raw.tuples(2).first();
    let cube_dimensions = raw.cube_dimensions();

    let mut content = InsensitiveTupleMap::with_capacity(raw.cells.len());
    for (position, cell) in raw.cells.iter().enumerate() {
        let ordinal = cell.ordinal.unwrap_or(position);
        let (row, column) = tuple_indices(ordinal, columns.len(), rows.len());
        let mut members: Vec<&RawMember> = Vec::new();
        if let Some(column) = column {
            members.extend(&columns[column].members);
        }
        if let Some(row) = row {
            members.extend(&rows[row].members);
        }
        if let Some(titles) = titles {
            members.extend(&titles.members);
        }
        let mut unique_names = members
            .iter()
            .map(|member| member.unique_name().or(member.name()).unwrap_or_default().to_string())
            .collect::<Vec<_>>();
        sort_by_cube_dimensions(&cube_dimensions, &mut unique_names);
        if !element_unique_names {
            for coordinate in &mut unique_names {
                *coordinate = element_name(coordinate);
            }
        }
        content.insert(unique_names, cell.clone());
    }
    Ok(content)
}

/// [`cells_by_coordinates`] without the cell properties.
pub fn values_by_coordinates(
    raw: &RawCellset,
    element_unique_names: bool,
) -> CellResult<InsensitiveTupleMap<CellValue>> {
    Ok(cells_by_coordinates(raw, element_unique_names)?
        .into_iter()
        .map(|(coordinates, cell)| (coordinates, cell.value))
        .collect())
}

/// Hierarchies laid out on the axes of a cellset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CellsetComposition {
    /// Cube name.
    pub cube: String,
    /// Hierarchy unique names of the title axis.
    pub titles: Vec<String>,
    /// Hierarchy unique names of the row axis.
    pub rows: Vec<String>,
    /// Hierarchy unique names of the column axis.
    pub columns: Vec<String>,
}

fn hierarchy_unique_names(axis: Option<&RawAxis>) -> Vec<String> {
    axis.map(|axis| {
        axis.hierarchies
            .iter()
            .filter_map(|h| h.unique_name.clone())
            .collect()
    })
    .unwrap_or_default()
}

/// Columns are axis 0, rows axis 1 and titles axis 2.
pub fn composition(raw: &RawCellset) -> CellsetComposition {
    CellsetComposition {
        cube: raw
            .cube
            .as_ref()
            .map(|c| c.name.clone())
            .unwrap_or_default(),
        titles: hierarchy_unique_names(raw.axes.get(2)),
        rows: hierarchy_unique_names(raw.axes.get(1)),
        columns: hierarchy_unique_names(raw.axes.first()),
    }
}

/// Member names of one tuple and their `" / "`-joined label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UiHeader {
    /// Label used to address the tuple in [`UiArray::cells`].
    pub name: String,
    /// Plain names of the tuple members.
    pub members: Vec<String>,
}

impl UiHeader {
    fn from_tuple(tuple: &RawTuple) -> Self {
        let members: Vec<String> = tuple
            .members
            .iter()
            .map(|m| m.name().unwrap_or_default().to_string())
            .collect();
        Self {
            name: members.join(" / "),
            members,
        }
    }
}

/// Cellset pivoted for grids and charts: one array of column values per row and page.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UiArray {
    /// Members of the axes beyond the page axis.
    pub titles: Vec<UiHeader>,
    /// Column, row and page headers, in display order.
    pub headers: [Vec<UiHeader>; 3],
    /// `page -> row -> column values`.
    pub cells: InsensitiveDict<InsensitiveDict<Vec<CellValue>>>,
}

fn round_to(value: &CellValue, precision: Option<usize>) -> CellValue {
    match (value, precision) {
        (CellValue::Number(n), Some(precision)) => CellValue::Number(
            format!("{n:.precision$}").parse().unwrap_or(*n),
        ),
        _ => value.clone(),
    }
}

/// Pivots a cellset into pages of rows of column values.
///
/// Axis 0 supplies the columns, axis 1 the rows and axis 2 the pages. A missing axis
/// contributes a single header with an empty name. Numbers are rounded to `precision`
/// decimals when given, and cells the server did not return are null.
pub fn ui_array(raw: &RawCellset, precision: Option<usize>) -> UiArray {
    let headers: [Vec<UiHeader>; 3] = std::array::from_fn(|n| {
        let tuples = raw.tuples(n);
        if tuples.is_empty() {
            vec![UiHeader::default()]
        } else {
            tuples.iter().map(UiHeader::from_tuple).collect()
        }
    });
    let titles = raw
        .axes
        .iter()
        .skip(3)
        .filter_map(|axis| axis.tuples.first())
        .map(UiHeader::from_tuple)
        .collect();

    let [columns, rows, pages] = headers.each_ref().map(Vec::len);
    let mut values = vec![CellValue::Null; columns * rows * pages];
    for (position, cell) in raw.cells.iter().enumerate() {
        if let Some(slot) = values.get_mut(cell.ordinal.unwrap_or(position)) {
            *slot = round_to(&cell.value, precision);
        }
    }

    let mut values = values.into_iter();
    let mut cells = InsensitiveDict::with_capacity(pages);
    for page in &headers[2] {
        let mut page_rows = InsensitiveDict::with_capacity(rows);
        for row in &headers[1] {
            page_rows.insert(row.name.clone(), values.by_ref().take(columns).collect());
        }
        cells.insert(page.name.clone(), page_rows);
    }
    UiArray {
        titles,
        headers,
        cells,
    }
}

/// Delimiter and line terminator of CSV output.
#[derive(Debug, Clone, Copy)]
pub struct CsvOptions {
    /// Value separator.
    pub delimiter: u8,
    /// Record terminator.
    pub terminator: Terminator,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            terminator: Terminator::CRLF,
        }
    }
}

impl CsvOptions {
    /// Accepts a single ASCII value separator and either `\r\n` or a single
    /// ASCII line separator.
    pub fn new(value_separator: &str, line_separator: &str) -> CellResult<Self> {
        let delimiter = single_ascii_byte(value_separator)?;
        let terminator = if line_separator == "\r\n" {
            Terminator::CRLF
        } else {
            Terminator::Any(single_ascii_byte(line_separator)?)
        };
        Ok(Self {
            delimiter,
            terminator,
        })
    }
}

fn single_ascii_byte(separator: &str) -> CellResult<u8> {
    match separator.as_bytes() {
        [byte] if byte.is_ascii() => Ok(*byte),
        _ => Err(CellError::InvalidArgument(format!(
            "separator must be a single ASCII character: {separator:?}"
        ))),
    }
}

/// Row member names, column member names and the value of every cell.
pub fn csv_records(raw: &RawCellset) -> Vec<Vec<String>> {
    let columns = raw.tuples(0);
    let rows = raw.tuples(1);
    let names = |tuple: &RawTuple| -> Vec<String> {
        tuple
            .members
            .iter()
            .map(|m| m.name().unwrap_or_default().to_string())
            .collect()
    };
    raw.cells
        .iter()
        .enumerate()
        .map(|(position, cell)| {
            let ordinal = cell.ordinal.unwrap_or(position);
            let (row, column) = tuple_indices(ordinal, columns.len(), rows.len());
            let mut record = Vec::new();
            if let Some(row) = row {
                record.extend(names(&rows[row]));
            }
            if let Some(column) = column {
                record.extend(names(&columns[column]));
            }
            record.push(cell.value.to_string());
            record
        })
        .collect()
}

fn dimension_names(hierarchies: &[String]) -> CellResult<Vec<String>> {
    hierarchies
        .iter()
        .map(|h| Ok(dimension_name_from_unique_name(h)?))
        .collect()
}

/// Renders a cellset read with plain member names as CSV.
///
/// The header lists the row dimensions, the column dimensions and `Value`.
/// A cellset without cells renders as an empty string.
pub fn cellset_to_csv(
    rows: &[String],
    columns: &[String],
    raw: &RawCellset,
    options: &CsvOptions,
) -> CellResult<String> {
    if raw.cells.is_empty() {
        return Ok(String::new());
    }
    let mut header = dimension_names(rows)?;
    header.extend(dimension_names(columns)?);
    header.push("Value".to_string());

    let mut writer = WriterBuilder::new()
        .delimiter(options.delimiter)
        .terminator(options.terminator)
        .flexible(true)
        .from_writer(Vec::new());
    writer.write_record(&header)?;
    for record in csv_records(raw) {
        writer.write_record(&record)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| CellError::Csv(e.into_error().into()))?;
    String::from_utf8(bytes).map_err(|e| CellError::UnexpectedResponse(e.to_string()))
}

/// `"e1|e2|e3" -> value` for every cell, using member names.
pub fn elements_value_dict(raw: &RawCellset, separator: &str) -> InsensitiveDict<CellValue> {
    let columns = raw.tuples(0);
    let rows = raw.tuples(1);
    let mut result = InsensitiveDict::with_capacity(raw.cells.len());
    for (position, cell) in raw.cells.iter().enumerate() {
        let ordinal = cell.ordinal.unwrap_or(position);
        let (row, column) = tuple_indices(ordinal, columns.len(), rows.len());
        let mut names: Vec<&str> = Vec::new();
        for tuple in [row.map(|r| &rows[r]), column.map(|c| &columns[c])]
            .into_iter()
            .flatten()
        {
            names.extend(tuple.members.iter().map(|m| m.name().unwrap_or_default()));
        }
        result.insert(names.join(separator), cell.value.clone());
    }
    result
}
