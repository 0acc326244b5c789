//! Cellset read URLs.

use tm1_core::url::{add_url_parameters, format_url};

const DEFAULT_CELL_PROPERTY: &str = "Value";
const DEFAULT_MEMBER_PROPERTY: &str = "Name";

/// Options of a full cellset read (`Cube`, `Axes` and `Cells` in one request).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CellsetQuery {
    cell_properties: Vec<String>,
    element_properties: Vec<String>,
    member_properties: Vec<String>,
    top: Option<usize>,
    skip: Option<usize>,
    skip_contexts: bool,
    pub(crate) skip_zeros: bool,
    pub(crate) skip_consolidated_cells: bool,
    pub(crate) skip_rule_derived_cells: bool,
    include_hierarchies: bool,
    sandbox: Option<String>,
}

impl CellsetQuery {
    /// All cell properties, no paging, zeros included.
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero-suppressed read, the usual choice for CSV and value dictionaries.
    pub fn for_csv() -> Self {
        Self::default().skip_zeros(true)
    }

    /// Cell properties to select; `Value` and `Ordinal` are always added.
    #[must_use]
    pub fn cell_properties<S: Into<String>>(
        mut self,
        properties: impl IntoIterator<Item = S>,
    ) -> Self {
        self.cell_properties = properties.into_iter().map(Into::into).collect();
        self
    }

    /// Element properties to expand on every member.
    #[must_use]
    pub fn element_properties<S: Into<String>>(
        mut self,
        properties: impl IntoIterator<Item = S>,
    ) -> Self {
        self.element_properties = properties.into_iter().map(Into::into).collect();
        self
    }

    /// Member properties to select.
    #[must_use]
    pub fn member_properties<S: Into<String>>(
        mut self,
        properties: impl IntoIterator<Item = S>,
    ) -> Self {
        self.member_properties = properties.into_iter().map(Into::into).collect();
        self
    }

    /// Return at most `top` cells.
    #[must_use]
    pub fn top(mut self, top: usize) -> Self {
        self.top = Some(top);
        self
    }

    /// Skip the first `skip` cells.
    #[must_use]
    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Leave out the title axis.
    #[must_use]
    pub fn skip_contexts(mut self, skip: bool) -> Self {
        self.skip_contexts = skip;
        self
    }

    /// Leave out zero, null and empty cells.
    #[must_use]
    pub fn skip_zeros(mut self, skip: bool) -> Self {
        self.skip_zeros = skip;
        self
    }

    /// Leave out consolidated cells.
    #[must_use]
    pub fn skip_consolidated_cells(mut self, skip: bool) -> Self {
        self.skip_consolidated_cells = skip;
        self
    }

    /// Leave out rule-derived cells.
    #[must_use]
    pub fn skip_rule_derived_cells(mut self, skip: bool) -> Self {
        self.skip_rule_derived_cells = skip;
        self
    }

    /// Expand the hierarchies of every axis.
    #[must_use]
    pub fn include_hierarchies(mut self, include: bool) -> Self {
        self.include_hierarchies = include;
        self
    }

    /// Read from `sandbox` instead of the base data.
    #[must_use]
    pub fn sandbox(mut self, sandbox: Option<&str>) -> Self {
        self.sandbox = sandbox.map(str::to_string);
        self
    }

    /// Sandbox the query reads from.
    pub fn get_sandbox(&self) -> Option<&str> {
        self.sandbox.as_deref()
    }

    /// Cell properties actually requested.
    ///
    /// `RuleDerived` travels with `Updateable` since some server versions
    /// misreport the former when it is selected alone. `Ordinal` is added
    /// whenever cells may be filtered or skipped, so positions stay known.
    pub fn resolved_cell_properties(&self) -> Vec<String> {
        let mut properties = if self.cell_properties.is_empty() {
            vec![DEFAULT_CELL_PROPERTY.to_string()]
        } else {
            self.cell_properties.clone()
        };
        let mut add = |property: &str| {
            if !properties.iter().any(|p| p == property) {
                properties.push(property.to_string());
            }
        };
        if self.skip_rule_derived_cells {
            add("RuleDerived");
            add("Updateable");
        }
        if self.skip_consolidated_cells {
            add("Consolidated");
        }
        if self.skip.is_some() || self.cells_filtered() {
            add("Ordinal");
        }
        properties
    }

    fn cells_filtered(&self) -> bool {
        self.skip_zeros || self.skip_consolidated_cells || self.skip_rule_derived_cells
    }

    /// The `$filter` expression on cells, if any.
    pub fn cell_filter(&self) -> Option<String> {
        cell_filter(
            self.skip_zeros,
            self.skip_consolidated_cells,
            self.skip_rule_derived_cells,
        )
    }

    /// GET URL of the full read of `cellset_id`.
    pub fn url(&self, cellset_id: &str) -> String {
        let member_properties = if self.member_properties.is_empty() {
            DEFAULT_MEMBER_PROPERTY.to_string()
        } else {
            self.member_properties.join(",")
        };
        let expand_element = if self.element_properties.is_empty() {
            String::new()
        } else {
            format!(
                ";$expand=Element($select={})",
                self.element_properties.join(",")
            )
        };
        let filter_axis = if self.skip_contexts {
            "$filter=Ordinal ne 2;"
        } else {
            ""
        };
        let hierarchies = if self.include_hierarchies {
            "Hierarchies($select=Name;$expand=Dimension($select=Name)),"
        } else {
            ""
        };
        let top_rows = match (self.top, self.skip) {
            (Some(top), None) if top > 0 => format!(";$top={top}"),
            _ => String::new(),
        };
        let top_cells = match self.top {
            Some(top) if top > 0 => format!(";$top={top}"),
            _ => String::new(),
        };
        let skip_cells = match self.skip {
            Some(skip) if skip > 0 => format!(";$skip={skip}"),
            _ => String::new(),
        };
        let filter_cells = self
            .cell_filter()
            .map(|filter| format!(";$filter={filter}"))
            .unwrap_or_default();
        let url = format!(
            "{}?$expand=Cube($select=Name;$expand=Dimensions($select=Name)),\
             Axes({filter_axis}$expand={hierarchies}Tuples($expand=Members($select={member_properties}{expand_element}{top_rows}))),\
             Cells($select={}{top_cells}{skip_cells}{filter_cells})",
            cellset_url(cellset_id),
            self.resolved_cell_properties().join(","),
        );
        add_url_parameters(&url, &[("!sandbox", self.sandbox.as_deref())])
    }
}

/// Conjunction of the requested cell filters.
pub fn cell_filter(
    skip_zeros: bool,
    skip_consolidated_cells: bool,
    skip_rule_derived_cells: bool,
) -> Option<String> {
    let mut filters = Vec::new();
    if skip_zeros {
        filters.push("Value ne 0 and Value ne null and Value ne ''");
    }
    if skip_consolidated_cells {
        filters.push("Consolidated eq false");
    }
    if skip_rule_derived_cells {
        filters.push("RuleDerived eq false");
    }
    (!filters.is_empty()).then(|| filters.join(" and "))
}

/// `/api/v1/Cellsets('{id}')`
pub fn cellset_url(cellset_id: &str) -> String {
    format_url("/api/v1/Cellsets('{}')", &[cellset_id])
}

/// Values only, in ordinal order.
pub fn values_url(
    cellset_id: &str,
    skip_zeros: bool,
    skip_consolidated_cells: bool,
    skip_rule_derived_cells: bool,
    sandbox: Option<&str>,
) -> String {
    let filter = cell_filter(skip_zeros, skip_consolidated_cells, skip_rule_derived_cells)
        .map(|filter| format!(";$filter={filter}"))
        .unwrap_or_default();
    let url = format!(
        "{}?$expand=Cells($select=Value{filter})",
        cellset_url(cellset_id)
    );
    add_url_parameters(&url, &[("!sandbox", sandbox)])
}

/// Row axis tuples plus the values.
pub fn rows_and_values_url(
    cellset_id: &str,
    element_unique_names: bool,
    sandbox: Option<&str>,
) -> String {
    let property = if element_unique_names {
        "UniqueName"
    } else {
        "Name"
    };
    let url = format!(
        "{}?$expand=Axes($filter=Ordinal eq 1;$expand=Tuples($expand=Members($select=Element;$expand=Element($select={property})))),Cells($select=Value)",
        cellset_url(cellset_id)
    );
    add_url_parameters(&url, &[("!sandbox", sandbox)])
}

/// Cube name and the hierarchies on every axis.
pub fn composition_url(cellset_id: &str, sandbox: Option<&str>) -> String {
    let url = format!(
        "{}?$expand=Cube($select=Name),Axes($expand=Hierarchies($select=UniqueName))",
        cellset_url(cellset_id)
    );
    add_url_parameters(&url, &[("!sandbox", sandbox)])
}

/// Number of cells in the cellset.
pub fn cellcount_url(cellset_id: &str, sandbox: Option<&str>) -> String {
    let url = format!("{}/Cells/$count", cellset_url(cellset_id));
    add_url_parameters(&url, &[("!sandbox", sandbox)])
}
