//! Write paths: `tm1.Update`, cellset updates, unbound processes, spreads and clears.

use serde_json::{json, Value};
use tm1_core::{
    cell::cell_is_updateable,
    mdx::{
        build_mdx_and_values, build_mdx_from_coordinates, cube_from_mdx,
        dimension_hierarchy_element_from_unique_name, escape_identifier, leaves_of_hierarchy,
        wrap_in_curly_braces,
    },
    url::{add_url_parameters, format_url},
    CellValue, ElementType, InsensitiveDict, InsensitiveTupleMap,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    cellset::{Cellset, CellsetSource},
    process::UnboundProcess,
    query::{cellset_url, CellsetQuery},
    service::CellService,
    statements::{
        attribute_update_statements, batch_statements, cell_update_statements, is_attribute_cube,
        StatementOptions,
    },
    CellError, CellResult,
};

const ELEMENT_BIND: &str = "Dimensions('{}')/Hierarchies('{}')/Elements('{}')";
const TEMPORARY_VIEW_PREFIX: &str = "}tm1rs_";

/// Options shared by the write paths.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOptions {
    /// Dimension names in cube order; looked up when absent.
    pub dimensions: Option<Vec<String>>,
    /// Add to the stored values instead of replacing them.
    pub increment: bool,
    /// Write into this sandbox.
    pub sandbox: Option<String>,
    /// Write through unbound processes instead of a cellset.
    pub use_ti: bool,
    /// Group the write under a fresh changeset.
    pub use_changeset: bool,
    /// Decimal places written for numeric values.
    pub precision: usize,
    /// Guard every statement so rule-calculated and consolidated cells are skipped.
    pub skip_non_updateable: bool,
    /// Types of the measure (or attribute) elements; looked up when absent.
    pub measure_element_types: Option<InsensitiveDict<ElementType>>,
    /// Detected from the cube name when absent.
    pub is_attribute_cube: Option<bool>,
    /// Turn the transaction log off for the duration of the write.
    pub deactivate_transaction_log: bool,
    /// Turn the transaction log back on afterwards.
    pub reactivate_transaction_log: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            dimensions: None,
            increment: false,
            sandbox: None,
            use_ti: false,
            use_changeset: false,
            precision: StatementOptions::default().precision,
            skip_non_updateable: false,
            measure_element_types: None,
            is_attribute_cube: None,
            deactivate_transaction_log: false,
            reactivate_transaction_log: false,
        }
    }
}

impl WriteOptions {
    /// The subset that shapes generated statements.
    pub fn statement_options(&self) -> StatementOptions {
        StatementOptions {
            increment: self.increment,
            precision: self.precision,
            skip_non_updateable: self.skip_non_updateable,
        }
    }

    /// Skips the dimension lookup.
    #[must_use]
    pub fn with_dimensions(mut self, dimensions: Vec<String>) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    /// Writes into `sandbox`.
    #[must_use]
    pub fn with_sandbox(mut self, sandbox: impl Into<String>) -> Self {
        self.sandbox = Some(sandbox.into());
        self
    }

    /// Chooses the unbound-process path.
    #[must_use]
    pub fn with_ti(mut self, use_ti: bool) -> Self {
        self.use_ti = use_ti;
        self
    }
}

/// `Tuple@odata.bind` entries addressing `coordinates` in the default hierarchies.
fn tuple_bind<S: AsRef<str>>(dimensions: &[S], coordinates: &[String]) -> Vec<String> {
    dimensions
        .iter()
        .zip(coordinates)
        .map(|(dimension, element)| {
            let dimension = dimension.as_ref();
            format_url(ELEMENT_BIND, &[dimension, dimension, element.as_str()])
        })
        .collect()
}

/// Falsy values (zero, empty string, null) are sent as an empty string.
fn update_value(value: &CellValue) -> Value {
    match value {
        v if v.is_empty() => json!(""),
        CellValue::Number(n) => json!(n),
        CellValue::String(s) => json!(s),
        CellValue::Null => json!(""),
    }
}

fn update_body<S: AsRef<str>>(
    dimensions: &[S],
    coordinates: &[String],
    value: &CellValue,
) -> Value {
    json!({
        "Cells": [{"Tuple@odata.bind": tuple_bind(dimensions, coordinates)}],
        "Value": update_value(value),
    })
}

impl CellService {
    pub(crate) fn dimensions_or_lookup(
        &self,
        cube: &str,
        dimensions: Option<&[String]>,
    ) -> CellResult<Vec<String>> {
        match dimensions {
            Some(dimensions) if !dimensions.is_empty() => Ok(dimensions.to_vec()),
            _ => self.dimension_names_for_writing(cube),
        }
    }

    pub(crate) fn last_dimension_element_types(
        &self,
        cube: &str,
        dimensions: &[String],
    ) -> CellResult<InsensitiveDict<ElementType>> {
        let measure = dimensions
            .last()
            .ok_or_else(|| CellError::InvalidArgument(format!("cube '{cube}' has no dimensions")))?;
        self.element_types_from_all_hierarchies(measure, false)
    }

    /// Writes one value with `tm1.Update`.
    pub fn write_value(
        &self,
        value: &CellValue,
        cube: &str,
        coordinates: &[String],
        dimensions: Option<&[String]>,
        sandbox: Option<&str>,
    ) -> CellResult<()> {
        let dimensions = self.dimensions_or_lookup(cube, dimensions)?;
        let url = format_url("/api/v1/Cubes('{}')/tm1.Update", &[cube]);
        let url = Self::sandbox_url(&url, sandbox);
        self.post_json(&url, &update_body(&dimensions, coordinates, value))
    }

    /// Writes every cell in one `tm1.Update` request.
    ///
    /// Returns the changeset the write was grouped under, if one was requested.
    pub fn write_values(
        &self,
        cube: &str,
        cells: &InsensitiveTupleMap<CellValue>,
        options: &WriteOptions,
    ) -> CellResult<Option<String>> {
        let write = |changeset: Option<&str>| {
            self.with_transaction_log(
                cube,
                options.deactivate_transaction_log,
                options.reactivate_transaction_log,
                || {
                    let dimensions =
                        self.dimensions_or_lookup(cube, options.dimensions.as_deref())?;
                    let url = add_url_parameters(
                        &format_url("/api/v1/Cubes('{}')/tm1.Update", &[cube]),
                        &[
                            ("!sandbox", options.sandbox.as_deref()),
                            ("!ChangeSet", changeset),
                        ],
                    );
                    let updates: Vec<Value> = cells
                        .iter()
                        .map(|(coordinates, value)| update_body(&dimensions, coordinates, value))
                        .collect();
                    self.post_json(&url, &Value::Array(updates))
                },
            )
        };
        if options.use_changeset {
            self.with_changeset(|changeset| {
                write(Some(changeset))?;
                Ok(Some(changeset.to_string()))
            })
        } else {
            write(None)?;
            Ok(None)
        }
    }

    /// Writes `values` into an open cellset by ordinal.
    pub fn update_cellset(
        &self,
        cellset: &Cellset,
        values: &[CellValue],
        changeset: Option<&str>,
    ) -> CellResult<()> {
        let url = add_url_parameters(
            &format!("{}/Cells", cellset_url(cellset.id())),
            &[("!sandbox", cellset.sandbox()), ("!ChangeSet", changeset)],
        );
        let body: Vec<Value> = values
            .iter()
            .enumerate()
            .map(|(ordinal, value)| json!({"Ordinal": ordinal, "Value": value}))
            .collect();
        self.transport().patch(&url, &Value::Array(body))?;
        Ok(())
    }

    /// Writes `values` into the cells of `mdx`, in ordinal order.
    pub fn write_values_through_cellset(
        &self,
        mdx: &str,
        values: &[CellValue],
        options: &WriteOptions,
    ) -> CellResult<Option<String>> {
        let write = |changeset: Option<&str>| -> CellResult<()> {
            let cellset = self.create_cellset(mdx, options.sandbox.as_deref())?;
            let result = if options.increment {
                self.extract_cellset_values(&cellset, &CellsetQuery::new())
                    .and_then(|current| {
                        let incremented: Vec<CellValue> = values
                            .iter()
                            .zip(&current)
                            .map(|(value, current)| value.increment_by(current))
                            .collect();
                        self.update_cellset(&cellset, &incremented, changeset)
                    })
            } else {
                self.update_cellset(&cellset, values, changeset)
            };
            cellset.finish(result)
        };
        let bracketed = |changeset: Option<&str>| -> CellResult<()> {
            if !(options.deactivate_transaction_log || options.reactivate_transaction_log) {
                return write(changeset);
            }
            let cube = cube_from_mdx(mdx)
                .ok_or_else(|| CellError::InvalidArgument(format!("no cube in mdx: {mdx}")))?;
            self.with_transaction_log(
                &cube,
                options.deactivate_transaction_log,
                options.reactivate_transaction_log,
                || write(changeset),
            )
        };
        if options.use_changeset {
            self.with_changeset(|changeset| {
                bracketed(Some(changeset))?;
                Ok(Some(changeset.to_string()))
            })
        } else {
            bracketed(None)?;
            Ok(None)
        }
    }

    /// Writes cells through unbound processes (`use_ti`) or through a cellset.
    pub fn write(
        &self,
        cube: &str,
        cells: &InsensitiveTupleMap<CellValue>,
        options: &WriteOptions,
    ) -> CellResult<Option<String>> {
        if options.use_ti {
            self.write_through_unbound_process(cube, cells, options)?;
            return Ok(None);
        }
        self.write_through_cellset(cube, cells, options)
    }

    /// Writes `cells` by opening a cellset over their coordinates and patching its cells.
    pub fn write_through_cellset(
        &self,
        cube: &str,
        cells: &InsensitiveTupleMap<CellValue>,
        options: &WriteOptions,
    ) -> CellResult<Option<String>> {
        let dimensions = self.dimensions_or_lookup(cube, options.dimensions.as_deref())?;
        let updateable;
        let cells = if options.skip_non_updateable {
            updateable = self.drop_non_updateable_cells(cells, cube, &dimensions)?;
            &updateable
        } else {
            cells
        };
        if cells.is_empty() {
            return Ok(None);
        }
        let (mdx, values) = build_mdx_and_values(cube, &dimensions, cells);
        self.write_values_through_cellset(&mdx, &values, options)
    }

    /// Keeps only the cells the server reports as updateable.
    pub fn drop_non_updateable_cells(
        &self,
        cells: &InsensitiveTupleMap<CellValue>,
        cube: &str,
        dimensions: &[String],
    ) -> CellResult<InsensitiveTupleMap<CellValue>> {
        let mdx = build_mdx_from_coordinates(cube, dimensions, cells.keys());
        let query = CellsetQuery::new()
            .cell_properties(["Updateable", "Value"])
            .skip_consolidated_cells(true)
            .skip_rule_derived_cells(true);
        let flagged = self.execute(CellsetSource::Mdx(&mdx), &query, false)?;
        let mut updateable = InsensitiveTupleMap::with_capacity(flagged.len());
        for (elements, cell) in flagged {
            // a sandboxed read carries the sandbox element first
            let elements = if elements.len() > dimensions.len() {
                elements[elements.len() - dimensions.len()..].to_vec()
            } else {
                elements
            };
            let writable = cell.updateable().is_some_and(cell_is_updateable);
            if writable {
                if let Some((key, value)) = cells.get_key_value(&elements) {
                    updateable.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(updateable)
    }

    /// Generates TI statements for `cells` and runs them in as many unbound
    /// processes as needed.
    pub fn write_through_unbound_process(
        &self,
        cube: &str,
        cells: &InsensitiveTupleMap<CellValue>,
        options: &WriteOptions,
    ) -> CellResult<()> {
        self.with_transaction_log(
            cube,
            options.deactivate_transaction_log,
            options.reactivate_transaction_log,
            || self.run_write_statements(cube, cells, options),
        )
    }

    fn run_write_statements(
        &self,
        cube: &str,
        cells: &InsensitiveTupleMap<CellValue>,
        options: &WriteOptions,
    ) -> CellResult<()> {
        if cells.is_empty() {
            return Ok(());
        }
        let attribute_cube = options
            .is_attribute_cube
            .unwrap_or_else(|| is_attribute_cube(cube));
        let enable_sandbox = self.enable_sandbox_ti(options.sandbox.as_deref())?;
        let looked_up;
        let element_types = match &options.measure_element_types {
            Some(types) => types,
            None => {
                let dimensions = self.dimensions_or_lookup(cube, options.dimensions.as_deref())?;
                looked_up = self.last_dimension_element_types(cube, &dimensions)?;
                &looked_up
            }
        };
        let statements = if attribute_cube {
            attribute_update_statements(cube, cells, element_types, options.statement_options())
        } else {
            cell_update_statements(cube, cells, element_types, options.statement_options())
        };
        let units = batch_statements(&statements, &enable_sandbox);
        let attempts = units.len();
        let mut succeeded = 0;
        let mut statuses = Vec::new();
        let mut error_log_files = Vec::new();
        for unit in &units {
            let execution = self.execute_unbound_process(unit)?;
            if execution.success() {
                succeeded += 1;
            } else {
                statuses.push(execution.status.to_string());
                error_log_files.push(execution.error_log_file.unwrap_or_default());
            }
        }
        info!(
            cube,
            statements = statements.len(),
            units = attempts,
            failed = attempts - succeeded,
            "wrote through unbound processes"
        );
        if succeeded == attempts {
            Ok(())
        } else if succeeded == 0 && !statuses.iter().any(|s| s == "HasMinorErrors") {
            Err(CellError::TotalWriteFailure {
                statuses,
                error_log_files,
            })
        } else {
            Err(CellError::PartialWriteFailure {
                statuses,
                error_log_files,
                attempts,
            })
        }
    }

    fn post_against_cellset(&self, cellset: Cellset, payload: &Value) -> CellResult<()> {
        let url = CellService::sandbox_url(
            &format!("{}/tm1.Update", cellset_url(cellset.id())),
            cellset.sandbox(),
        );
        let result = self.post_json(&url, payload);
        cellset.finish(result)
    }

    fn spread_cellset(
        &self,
        cube: &str,
        unique_element_names: &[String],
        sandbox: Option<&str>,
    ) -> CellResult<Cellset> {
        let mdx = format!(
            "SELECT {{ {} }} ON 0 FROM [{}]",
            unique_element_names.join("}*{"),
            escape_identifier(cube)
        );
        self.create_cellset(&mdx, sandbox)
    }

    fn reference_binds(unique_element_names: &[String]) -> CellResult<Vec<String>> {
        unique_element_names
            .iter()
            .map(|unique_name| {
                let (dimension, hierarchy, element) =
                    dimension_hierarchy_element_from_unique_name(unique_name)?;
                Ok(format_url(ELEMENT_BIND, &[&dimension, &hierarchy, &element]))
            })
            .collect()
    }

    /// Spreads `value` over the target cell proportionally to a reference cell.
    pub fn relative_proportional_spread(
        &self,
        value: f64,
        cube: &str,
        unique_element_names: &[String],
        reference_unique_element_names: &[String],
        reference_cube: Option<&str>,
        sandbox: Option<&str>,
    ) -> CellResult<()> {
        let references = Self::reference_binds(reference_unique_element_names)?;
        let cellset = self.spread_cellset(cube, unique_element_names, sandbox)?;
        let payload = json!({
            "BeginOrdinal": 0,
            "Value": format!("RP{value}"),
            "ReferenceCell@odata.bind": references,
            "ReferenceCube@odata.bind": format_url("Cubes('{}')", &[reference_cube.unwrap_or(cube)]),
        });
        self.post_against_cellset(cellset, &payload)
    }

    /// Clears the leaves under the target cell.
    pub fn clear_spread(
        &self,
        cube: &str,
        unique_element_names: &[String],
        sandbox: Option<&str>,
    ) -> CellResult<()> {
        let references = Self::reference_binds(unique_element_names)?;
        let cellset = self.spread_cellset(cube, unique_element_names, sandbox)?;
        let payload = json!({
            "BeginOrdinal": 0,
            "Value": "C",
            "ReferenceCell@odata.bind": references,
        });
        self.post_against_cellset(cellset, &payload)
    }

    /// Zeroes out the cells of `mdx` with `ViewZeroOut` on a temporary view.
    ///
    /// The view is removed whether or not the process succeeds.
    pub fn clear_with_mdx(&self, cube: &str, mdx: &str, sandbox: Option<&str>) -> CellResult<()> {
        let enable_sandbox = self.enable_sandbox_ti(sandbox)?;
        let view = format!("{TEMPORARY_VIEW_PREFIX}{}", Uuid::new_v4());
        let views_url = format_url("/api/v1/Cubes('{}')/Views", &[cube]);
        self.post_json(
            &views_url,
            &json!({
                "@odata.type": "ibm.tm1.api.v1.MDXView",
                "Name": view,
                "MDX": mdx,
            }),
        )?;

        let process = UnboundProcess::new()
            .with_prolog(enable_sandbox)
            .with_epilog(format!(
                "ViewZeroOut('{}','{}');",
                cube.replace('\'', "''"),
                view
            ));
        let result = self.execute_unbound_process(&process).and_then(|execution| {
            if execution.success() {
                Ok(())
            } else {
                Err(CellError::ClearFailed {
                    cube: cube.to_string(),
                    mdx: mdx.to_string(),
                })
            }
        });

        let view_url = format_url("/api/v1/Cubes('{}')/Views('{}')", &[cube, &view]);
        let cleanup = match self.transport().exists(&view_url) {
            Ok(true) => self.transport().delete(&view_url).map(|_| ()),
            Ok(false) => Ok(()),
            Err(e) => Err(e),
        };
        match (result, cleanup) {
            (Err(e), Err(cleanup)) => {
                warn!(cube, %view, error = %cleanup, "failed to remove temporary view");
                Err(e)
            }
            (result, Ok(())) => result,
            (Ok(()), Err(e)) => Err(e.into()),
        }
    }

    /// Clears the slice selected by `expressions` (dimension name to MDX set).
    ///
    /// Dimensions without an expression default to their leaves.
    pub fn clear(
        &self,
        cube: &str,
        expressions: &InsensitiveDict<String>,
        sandbox: Option<&str>,
    ) -> CellResult<()> {
        let dimensions = self.dimension_names_for_writing(cube)?;
        let sets = dimensions
            .iter()
            .map(|dimension| match expressions.get(dimension.as_str()) {
                Some(expression) => wrap_in_curly_braces(expression),
                None => leaves_of_hierarchy(dimension, dimension),
            })
            .collect::<Vec<_>>();
        let mdx = format!(
            "SELECT NON EMPTY {} ON 0 FROM [{}]",
            sets.join(" * "),
            escape_identifier(cube)
        );
        self.clear_with_mdx(cube, &mdx, sandbox)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falsy_values_become_empty() {
        assert_eq!(update_value(&CellValue::Number(0.0)), json!(""));
        assert_eq!(update_value(&CellValue::Null), json!(""));
        assert_eq!(update_value(&CellValue::Number(2.5)), json!(2.5));
        assert_eq!(update_value(&CellValue::from("x")), json!("x"));
    }

    #[test]
    fn binds_use_default_hierarchies() {
        let binds = tuple_bind(
            &["Region", "Measure"],
            &["North".to_string(), "It's".to_string()],
        );
        assert_eq!(
            binds,
            vec![
                "Dimensions('Region')/Hierarchies('Region')/Elements('North')",
                "Dimensions('Measure')/Hierarchies('Measure')/Elements('It''s')",
            ]
        );
    }
}
