//! The cell service: cellset reads, direct writes, changesets and the transaction log.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tm1_core::{
    constants::{CUBE_PROPERTIES_CUBE, SANDBOX_DIMENSION},
    insensitive::insensitive_eq,
    mdx::mdx_from_element_string,
    url::{add_url_parameters, format_url},
    CellValue, ElementType, InsensitiveDict, InsensitiveSet, InsensitiveTupleMap,
};
use tm1_rest::{ODataCollection, Transport};
use tracing::{debug, warn};

use crate::{
    cellset::{delete_cellset, Cellset, CellsetSource},
    extract::{self, CellsetComposition, CsvOptions, RawCell, RawCellset, UiArray},
    query::{cellcount_url, composition_url, rows_and_values_url, values_url, CellsetQuery},
    CellError, CellResult,
};

#[derive(Deserialize)]
struct CreatedCellset {
    #[serde(rename = "ID")]
    id: String,
}

#[derive(Deserialize)]
struct Named {
    #[serde(rename = "Name")]
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TypedElement {
    name: String,
    #[serde(rename = "Type")]
    element_type: ElementType,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HierarchyElements {
    #[serde(default)]
    elements: Vec<TypedElement>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DimensionHierarchies {
    #[serde(default)]
    hierarchies: Vec<HierarchyElements>,
}

#[derive(Deserialize)]
struct ChangesetValue {
    value: String,
}

/// Cell reads and writes against one server.
///
/// Cheap to clone; clones share the transport.
#[derive(Clone)]
pub struct CellService {
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for CellService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CellService").finish_non_exhaustive()
    }
}

impl CellService {
    /// Cell operations over `transport`.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// The underlying transport.
    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub(crate) fn shared_transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    /// Materializes `source` on the server.
    pub fn open(&self, source: CellsetSource<'_>, sandbox: Option<&str>) -> CellResult<Cellset> {
        let url = source.create_url(sandbox);
        let response = match source {
            CellsetSource::Mdx(mdx) => self.transport.post(&url, Some(&json!({ "MDX": mdx })))?,
            CellsetSource::View { .. } => self.transport.post(&url, None)?,
        };
        let created: CreatedCellset = response.json()?;
        debug!(cellset = %created.id, "created cellset");
        Ok(Cellset::new(self.shared_transport(), created.id, sandbox))
    }

    /// Materializes `mdx`.
    pub fn create_cellset(&self, mdx: &str, sandbox: Option<&str>) -> CellResult<Cellset> {
        self.open(CellsetSource::Mdx(mdx), sandbox)
    }

    /// Materializes a saved view of `cube`.
    pub fn create_cellset_from_view(
        &self,
        cube: &str,
        view: &str,
        private: bool,
        sandbox: Option<&str>,
    ) -> CellResult<Cellset> {
        self.open(
            CellsetSource::View {
                cube,
                view,
                private,
            },
            sandbox,
        )
    }

    /// Deletes a cellset by ID; a missing cellset counts as deleted.
    pub fn delete_cellset(&self, cellset_id: &str, sandbox: Option<&str>) -> CellResult<()> {
        delete_cellset(self.transport.as_ref(), cellset_id, sandbox)
    }

    /// Opens `source`, runs `read` and always releases the cellset.
    pub fn with_cellset<T>(
        &self,
        source: CellsetSource<'_>,
        sandbox: Option<&str>,
        read: impl FnOnce(&Cellset) -> CellResult<T>,
    ) -> CellResult<T> {
        let cellset = self.open(source, sandbox)?;
        let result = read(&cellset);
        cellset.finish(result)
    }

    /// The cellset as the server returns it, shaped by `query`.
    pub fn extract_cellset_raw(
        &self,
        cellset: &Cellset,
        query: &CellsetQuery,
    ) -> CellResult<RawCellset> {
        let url = query.clone().sandbox(cellset.sandbox()).url(cellset.id());
        Ok(self.transport.get(&url)?.json()?)
    }

    /// Opens `source`, reads it raw and releases it.
    pub fn execute_raw(
        &self,
        source: CellsetSource<'_>,
        query: &CellsetQuery,
    ) -> CellResult<RawCellset> {
        self.with_cellset(source, query.get_sandbox(), |cellset| {
            self.extract_cellset_raw(cellset, query)
        })
    }

    /// Cells keyed by coordinates in cube dimension order.
    ///
    /// Members are always read by unique name; `element_unique_names = false`
    /// reduces the keys to plain element names.
    pub fn extract_cellset(
        &self,
        cellset: &Cellset,
        query: &CellsetQuery,
        element_unique_names: bool,
    ) -> CellResult<InsensitiveTupleMap<RawCell>> {
        let query = query
            .clone()
            .element_properties(["UniqueName"])
            .member_properties(["UniqueName"])
            .include_hierarchies(false);
        let raw = self.extract_cellset_raw(cellset, &query)?;
        extract::cells_by_coordinates(&raw, element_unique_names)
    }

    /// Opens `source`, extracts its cells by coordinates and releases it.
    pub fn execute(
        &self,
        source: CellsetSource<'_>,
        query: &CellsetQuery,
        element_unique_names: bool,
    ) -> CellResult<InsensitiveTupleMap<RawCell>> {
        self.with_cellset(source, query.get_sandbox(), |cellset| {
            self.extract_cellset(cellset, query, element_unique_names)
        })
    }

    /// [`CellService::execute`] with bare values instead of cell properties.
    pub fn execute_value_map(
        &self,
        source: CellsetSource<'_>,
        query: &CellsetQuery,
        element_unique_names: bool,
    ) -> CellResult<InsensitiveTupleMap<CellValue>> {
        Ok(self
            .execute(source, query, element_unique_names)?
            .into_iter()
            .map(|(coordinates, cell)| (coordinates, cell.value))
            .collect())
    }

    /// Values in ordinal order. Only the query's cell filters apply.
    pub fn extract_cellset_values(
        &self,
        cellset: &Cellset,
        query: &CellsetQuery,
    ) -> CellResult<Vec<CellValue>> {
        let url = values_url(
            cellset.id(),
            query.skip_zeros,
            query.skip_consolidated_cells,
            query.skip_rule_derived_cells,
            cellset.sandbox(),
        );
        let raw: RawCellset = self.transport.get(&url)?.json()?;
        Ok(raw.values())
    }

    /// Values of `source` in ordinal order.
    pub fn execute_values(
        &self,
        source: CellsetSource<'_>,
        query: &CellsetQuery,
    ) -> CellResult<Vec<CellValue>> {
        self.with_cellset(source, query.get_sandbox(), |cellset| {
            self.extract_cellset_values(cellset, query)
        })
    }

    /// Row element tuples mapped to the values across each row.
    pub fn extract_cellset_rows_and_values(
        &self,
        cellset: &Cellset,
        element_unique_names: bool,
    ) -> CellResult<InsensitiveTupleMap<Vec<CellValue>>> {
        let url = rows_and_values_url(cellset.id(), element_unique_names, cellset.sandbox());
        let raw: RawCellset = self.transport.get(&url)?.json()?;
        extract::rows_and_values(&raw, element_unique_names)
    }

    /// Rows and values of `source`; the cellset is released afterwards.
    pub fn execute_rows_and_values(
        &self,
        source: CellsetSource<'_>,
        element_unique_names: bool,
        sandbox: Option<&str>,
    ) -> CellResult<InsensitiveTupleMap<Vec<CellValue>>> {
        self.with_cellset(source, sandbox, |cellset| {
            self.extract_cellset_rows_and_values(cellset, element_unique_names)
        })
    }

    /// Row element names and string cell values of `source`.
    pub fn execute_rows_and_values_string_set(
        &self,
        source: CellsetSource<'_>,
        exclude_empty_cells: bool,
        sandbox: Option<&str>,
    ) -> CellResult<InsensitiveSet> {
        let rows_and_values = self.execute_rows_and_values(source, false, sandbox)?;
        Ok(extract::string_set(&rows_and_values, exclude_empty_cells))
    }

    /// Cube name and the hierarchies on every axis.
    pub fn extract_cellset_composition(&self, cellset: &Cellset) -> CellResult<CellsetComposition> {
        let url = composition_url(cellset.id(), cellset.sandbox());
        let raw: RawCellset = self.transport.get(&url)?.json()?;
        Ok(extract::composition(&raw))
    }

    /// Number of cells in `cellset`.
    pub fn extract_cellset_cellcount(&self, cellset: &Cellset) -> CellResult<usize> {
        let url = cellcount_url(cellset.id(), cellset.sandbox());
        let response = self.transport.get(&url)?;
        response
            .text()
            .trim()
            .parse()
            .map_err(|_| CellError::UnexpectedResponse(format!("cell count: {}", response.text())))
    }

    /// Number of cells `source` returns.
    pub fn execute_cellcount(
        &self,
        source: CellsetSource<'_>,
        sandbox: Option<&str>,
    ) -> CellResult<usize> {
        self.with_cellset(source, sandbox, |cellset| {
            self.extract_cellset_cellcount(cellset)
        })
    }

    fn plain_name_query(query: &CellsetQuery) -> CellsetQuery {
        query
            .clone()
            .cell_properties(["Value"])
            .element_properties(["Name"])
            .member_properties(["Name"])
            .skip_contexts(true)
    }

    /// Cellset as CSV. See [`CellsetQuery::for_csv`] for the usual query.
    pub fn extract_cellset_csv(
        &self,
        cellset: &Cellset,
        query: &CellsetQuery,
        options: &CsvOptions,
    ) -> CellResult<String> {
        let shape = self.extract_cellset_composition(cellset)?;
        let raw = self.extract_cellset_raw(cellset, &Self::plain_name_query(query))?;
        extract::cellset_to_csv(&shape.rows, &shape.columns, &raw, options)
    }

    /// CSV of `source`.
    pub fn execute_csv(
        &self,
        source: CellsetSource<'_>,
        query: &CellsetQuery,
        options: &CsvOptions,
    ) -> CellResult<String> {
        self.with_cellset(source, query.get_sandbox(), |cellset| {
            self.extract_cellset_csv(cellset, query, options)
        })
    }

    /// Cellset pivoted into pages of rows of column values, numbers rounded
    /// to `precision` decimals when given.
    pub fn extract_cellset_ui_array(
        &self,
        cellset: &Cellset,
        query: &CellsetQuery,
        precision: Option<usize>,
    ) -> CellResult<UiArray> {
        let raw = self.extract_cellset_raw(cellset, &Self::plain_name_query(query))?;
        Ok(extract::ui_array(&raw, precision))
    }

    /// Runs [`Self::extract_cellset_ui_array`] on a temporary cellset.
    pub fn execute_ui_array(
        &self,
        source: CellsetSource<'_>,
        query: &CellsetQuery,
        precision: Option<usize>,
    ) -> CellResult<UiArray> {
        self.with_cellset(source, query.get_sandbox(), |cellset| {
            self.extract_cellset_ui_array(cellset, query, precision)
        })
    }

    /// `"e1|e2|e3" -> value` for every cell, `separator` joining the member names.
    pub fn execute_elements_value_dict(
        &self,
        source: CellsetSource<'_>,
        query: &CellsetQuery,
        separator: &str,
    ) -> CellResult<InsensitiveDict<CellValue>> {
        self.with_cellset(source, query.get_sandbox(), |cellset| {
            let raw = self.extract_cellset_raw(cellset, &Self::plain_name_query(query))?;
            Ok(extract::elements_value_dict(&raw, separator))
        })
    }

    /// Value of the single cell addressed by `element_string`, such as
    /// `"Hier1::Elem1 && Hier2::Elem4, Elem9, Elem2"`.
    pub fn get_value(
        &self,
        cube: &str,
        element_string: &str,
        dimensions: Option<&[String]>,
        sandbox: Option<&str>,
    ) -> CellResult<CellValue> {
        let dimensions = match dimensions {
            Some(dimensions) => dimensions.to_vec(),
            None => self.dimension_names_for_writing(cube)?,
        };
        let mdx = mdx_from_element_string(cube, &dimensions, element_string)?;
        let cells = self.execute(
            CellsetSource::Mdx(&mdx),
            &CellsetQuery::new().sandbox(sandbox),
            true,
        )?;
        Ok(cells
            .into_iter()
            .next()
            .map(|(_, cell)| cell.value)
            .unwrap_or_default())
    }

    /// Dimensions of `cube` in order, without the sandbox dimension.
    pub fn dimension_names_for_writing(&self, cube: &str) -> CellResult<Vec<String>> {
        let url = format_url("/api/v1/Cubes('{}')/Dimensions?$select=Name", &[cube]);
        let dimensions: ODataCollection<Named> = self.transport.get(&url)?.json()?;
        Ok(dimensions
            .value
            .into_iter()
            .map(|d| d.name)
            .filter(|name| !insensitive_eq(name, SANDBOX_DIMENSION))
            .collect())
    }

    /// Element types across every hierarchy of `dimension`.
    pub fn element_types_from_all_hierarchies(
        &self,
        dimension: &str,
        skip_consolidations: bool,
    ) -> CellResult<InsensitiveDict<ElementType>> {
        let filter = if skip_consolidations {
            ";$filter=Type ne 3"
        } else {
            ""
        };
        let url = format!(
            "{}?$expand=Hierarchies($select=Elements;$expand=Elements($select=Name,Type{filter}))",
            format_url("/api/v1/Dimensions('{}')", &[dimension])
        );
        let dimension: DimensionHierarchies = self.transport.get(&url)?.json()?;
        Ok(dimension
            .hierarchies
            .into_iter()
            .flat_map(|h| h.elements)
            .map(|e| (e.name, e.element_type))
            .collect())
    }

    /// Element types of the last dimension of `cube`.
    pub fn measure_element_types(&self, cube: &str) -> CellResult<InsensitiveDict<ElementType>> {
        let dimensions = self.dimension_names_for_writing(cube)?;
        let measure = dimensions.last().ok_or_else(|| {
            CellError::UnexpectedResponse(format!("cube '{cube}' has no dimensions"))
        })?;
        self.element_types_from_all_hierarchies(measure, false)
    }

    /// `true` when the server knows a sandbox named `sandbox`.
    pub fn sandbox_exists(&self, sandbox: &str) -> CellResult<bool> {
        let url = format_url("/api/v1/Sandboxes('{}')", &[sandbox]);
        Ok(self.transport.exists(&url)?)
    }

    /// Prolog lines selecting the sandbox for an unbound process.
    ///
    /// Empty when the server runs without sandboxes. A named sandbox must exist.
    pub fn enable_sandbox_ti(&self, sandbox: Option<&str>) -> CellResult<String> {
        if self.transport.sandboxing_disabled() {
            return Ok(String::new());
        }
        match sandbox {
            Some(sandbox) if !sandbox.is_empty() => {
                if !self.sandbox_exists(sandbox)? {
                    return Err(CellError::SandboxNotFound(sandbox.to_string()));
                }
                Ok(format!(
                    "ServerActiveSandboxSet('{}');SetUseActiveSandboxProperty(1);",
                    sandbox.replace('\'', "''")
                ))
            }
            _ => Ok("ServerActiveSandboxSet('');SetUseActiveSandboxProperty(0);".to_string()),
        }
    }

    /// Starts a changeset and returns its ID.
    pub fn begin_changeset(&self) -> CellResult<String> {
        let changeset: ChangesetValue = self
            .transport
            .post("/api/v1/BeginChangeSet", None)?
            .json()?;
        debug!(changeset = %changeset.value, "began changeset");
        Ok(changeset.value)
    }

    /// Closes `changeset`.
    pub fn end_changeset(&self, changeset: &str) -> CellResult<()> {
        let body = json!({ "ChangeSetID": changeset });
        self.transport.post("/api/v1/EndChangeSet", Some(&body))?;
        Ok(())
    }

    /// Rolls back every write made under `changeset`.
    pub fn undo_changeset(&self, changeset: &str) -> CellResult<()> {
        let body = json!({ "ChangeSetID": changeset });
        self.transport.post("/api/v1/UndoChangeSet", Some(&body))?;
        Ok(())
    }

    /// Runs `f` inside a fresh changeset that is ended on every exit path.
    pub fn with_changeset<T>(&self, f: impl FnOnce(&str) -> CellResult<T>) -> CellResult<T> {
        let changeset = self.begin_changeset()?;
        let result = f(&changeset);
        let ended = self.end_changeset(&changeset);
        match (result, ended) {
            (Err(e), Err(cleanup)) => {
                warn!(%changeset, error = %cleanup, "failed to end changeset");
                Err(e)
            }
            (result, Ok(())) => result,
            (Ok(_), Err(e)) => Err(e),
        }
    }

    fn set_transaction_log(&self, cube: &str, value: &str) -> CellResult<()> {
        let dimensions = ["}Cubes".to_string(), "}CubeProperties".to_string()];
        self.write_value(
            &CellValue::from(value),
            CUBE_PROPERTIES_CUBE,
            &[cube.to_string(), "Logging".to_string()],
            Some(&dimensions),
            None,
        )
    }

    /// Turns transaction logging on for `cube`.
    pub fn activate_transaction_log(&self, cube: &str) -> CellResult<()> {
        self.set_transaction_log(cube, "YES")
    }

    /// Turns transaction logging off for `cube`.
    pub fn deactivate_transaction_log(&self, cube: &str) -> CellResult<()> {
        self.set_transaction_log(cube, "NO")
    }

    /// Reads the `LOGGING` cube property of `cube`.
    pub fn transaction_log_is_active(&self, cube: &str) -> CellResult<bool> {
        let mdx = format!(
            "SELECT {{[}}Cubes].[{}]}} ON 0, {{[}}CubeProperties].[LOGGING]}} ON 1 FROM [}}CubeProperties]",
            cube.replace(']', "]]")
        );
        let values = self.execute_values(CellsetSource::Mdx(&mdx), &CellsetQuery::new())?;
        Ok(values
            .first()
            .and_then(CellValue::as_str)
            .is_some_and(|value| insensitive_eq(value, "YES")))
    }

    /// Runs `f` with the transaction log of `cube` switched off first and/or
    /// back on afterwards. Reactivation happens on every exit path.
    pub fn with_transaction_log<T>(
        &self,
        cube: &str,
        deactivate: bool,
        reactivate: bool,
        f: impl FnOnce() -> CellResult<T>,
    ) -> CellResult<T> {
        let result = if deactivate {
            self.deactivate_transaction_log(cube).and_then(|()| f())
        } else {
            f()
        };
        if !reactivate {
            return result;
        }
        match (result, self.activate_transaction_log(cube)) {
            (Err(e), Err(cleanup)) => {
                warn!(cube, error = %cleanup, "failed to reactivate transaction log");
                Err(e)
            }
            (result, Ok(())) => result,
            (Ok(_), Err(e)) => Err(e),
        }
    }

    pub(crate) fn post_json(&self, url: &str, body: &Value) -> CellResult<()> {
        self.transport.post(url, Some(body))?;
        Ok(())
    }

    pub(crate) fn sandbox_url(url: &str, sandbox: Option<&str>) -> String {
        add_url_parameters(url, &[("!sandbox", sandbox)])
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tm1_rest::{mock::MockTransport, Method};

    use super::*;

    fn service(mock: &Arc<MockTransport>) -> CellService {
        CellService::new(mock.clone())
    }

    #[test]
    fn dimension_names_skip_sandbox_dimension() {
        let mock = Arc::new(MockTransport::new());
        mock.on(
            Method::Get,
            "Cubes('Sales')/Dimensions",
            json!({"value": [{"Name": "}Sandboxes"}, {"Name": "Region"}, {"Name": "Measure"}]}),
        );
        let names = service(&mock).dimension_names_for_writing("Sales").unwrap();
        assert_eq!(names, vec!["Region", "Measure"]);
    }

    #[test]
    fn sandbox_prolog() {
        let mock = Arc::new(MockTransport::new());
        mock.on(Method::Get, "Sandboxes('mine')", json!({"Name": "mine"}))
            .fail(Method::Get, "Sandboxes('other')", 404);
        let cells = service(&mock);
        assert_eq!(
            cells.enable_sandbox_ti(None).unwrap(),
            "ServerActiveSandboxSet('');SetUseActiveSandboxProperty(0);"
        );
        assert_eq!(
            cells.enable_sandbox_ti(Some("mine")).unwrap(),
            "ServerActiveSandboxSet('mine');SetUseActiveSandboxProperty(1);"
        );
        assert!(matches!(
            cells.enable_sandbox_ti(Some("other")),
            Err(CellError::SandboxNotFound(_))
        ));
        let disabled = MockTransport::new().with_sandboxing_disabled(true);
        let disabled = CellService::new(Arc::new(disabled));
        assert_eq!(disabled.enable_sandbox_ti(Some("mine")).unwrap(), "");
    }

    #[test]
    fn changeset_is_ended_after_failure() {
        let mock = Arc::new(MockTransport::new());
        mock.on(Method::Post, "BeginChangeSet", json!({"value": "cs1"}))
            .on_empty(Method::Post, "EndChangeSet");
        let result: CellResult<()> = service(&mock)
            .with_changeset(|_| Err(CellError::InvalidArgument("boom".into())));
        assert!(result.is_err());
        let ends = mock.calls_matching(Method::Post, "EndChangeSet");
        assert_eq!(ends.len(), 1);
        assert_eq!(ends[0].body, Some(json!({"ChangeSetID": "cs1"})));
    }

    #[test]
    fn element_types_merge_hierarchies() {
        let mock = Arc::new(MockTransport::new());
        mock.on(
            Method::Get,
            "Dimensions('Measure')?$expand=Hierarchies",
            json!({"Hierarchies": [
                {"Elements": [{"Name": "Units", "Type": "Numeric"}, {"Name": "Comment", "Type": "String"}]},
                {"Elements": [{"Name": "Total", "Type": 3}]}
            ]}),
        );
        let types = service(&mock)
            .element_types_from_all_hierarchies("Measure", false)
            .unwrap();
        assert_eq!(types.get("comment"), Some(&ElementType::String));
        assert_eq!(types.get("Total"), Some(&ElementType::Consolidated));
    }
}
