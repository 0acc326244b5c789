//! Single elements, element listings, attributes and set queries.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Map, Value};
use tm1_cells::{cellset::CellsetSource, service::CellService};
use tm1_core::{
    constants::{DEFAULT_COMPONENT_DEPTH, ELEMENT_ATTRIBUTES_PREFIX},
    mdx::{element_unique_name, escape_identifier, hierarchy_unique_name},
    url::format_url,
    CellValue, ElementType, InsensitiveDict, InsensitiveSet, InsensitiveTupleMap,
};
use tm1_rest::{ODataCollection, Transport};
use tracing::debug;

use crate::{
    models::{AttributeType, Edge, Element, ElementAttribute},
    tree::{components_url, ComponentNode},
    ElementError, ElementResult,
};

const ELEMENTS_URL: &str = "/api/v1/Dimensions('{}')/Hierarchies('{}')/Elements";
const ELEMENT_URL: &str = "/api/v1/Dimensions('{}')/Hierarchies('{}')/Elements('{}')";

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Named {
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TypedName {
    name: String,
    #[serde(rename = "Type")]
    element_type: ElementType,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SetTuples {
    #[serde(default)]
    tuples: Vec<SetTuple>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SetTuple {
    #[serde(default)]
    members: Vec<Map<String, Value>>,
}

/// Elements picked either by an MDX set expression or by name.
#[derive(Debug, Clone, Copy)]
pub enum ElementSet<'a> {
    /// Elements of an MDX set expression.
    Mdx(&'a str),
    /// Elements named explicitly.
    Names(&'a [String]),
}

impl ElementSet<'_> {
    fn mdx(&self, dimension: &str, hierarchy: &str) -> String {
        match self {
            Self::Mdx(mdx) => (*mdx).to_string(),
            Self::Names(names) => names
                .iter()
                .map(|name| element_unique_name(dimension, hierarchy, name))
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

/// Properties returned by [`ElementService::execute_set_mdx`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetMdxQuery {
    /// Return at most this many tuples.
    pub top: Option<usize>,
    /// Member properties to select.
    pub member_properties: Vec<String>,
    /// Parent properties to expand; none when empty.
    pub parent_properties: Vec<String>,
    /// Element properties to expand; none when empty.
    pub element_properties: Vec<String>,
}

impl Default for SetMdxQuery {
    fn default() -> Self {
        Self {
            top: None,
            member_properties: vec!["Name".into(), "Weight".into()],
            parent_properties: vec!["Name".into(), "UniqueName".into()],
            element_properties: vec!["Type".into(), "Level".into()],
        }
    }
}

impl SetMdxQuery {
    /// Member names only.
    pub fn names() -> Self {
        Self {
            top: None,
            member_properties: vec!["Name".into()],
            parent_properties: vec![],
            element_properties: vec![],
        }
    }

    fn select(properties: &[String]) -> String {
        properties
            .iter()
            .map(|p| {
                if p.starts_with("Attributes/") {
                    p.replace(' ', "")
                } else {
                    p.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    /// `ExecuteMDXSetExpression` URL selecting the configured properties.
    pub fn url(&self) -> String {
        let top = self.top.map(|t| format!("$top={t};")).unwrap_or_default();
        let members = if self.member_properties.is_empty() {
            "Name".to_string()
        } else {
            Self::select(&self.member_properties)
        };
        let mut expand = Vec::new();
        if !self.parent_properties.is_empty() {
            expand.push(format!("Parent($select={})", Self::select(&self.parent_properties)));
        }
        if !self.element_properties.is_empty() {
            expand.push(format!(
                "Element($select={})",
                Self::select(&self.element_properties)
            ));
        }
        let expand = if expand.is_empty() {
            String::new()
        } else {
            format!(";$expand={}", expand.join(","))
        };
        format!("/api/v1/ExecuteMDXSetExpression?$expand=Tuples({top}$expand=Members($select={members}{expand}))")
    }
}

fn attribute_cube(dimension: &str) -> String {
    format!("{ELEMENT_ATTRIBUTES_PREFIX}{dimension}")
}

/// Elements, edges and element attributes of one server.
#[derive(Clone)]
pub struct ElementService {
    transport: Arc<dyn Transport>,
    cells: CellService,
}

impl std::fmt::Debug for ElementService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementService").finish_non_exhaustive()
    }
}

impl ElementService {
    /// Element operations over `transport`.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            cells: CellService::new(Arc::clone(&transport)),
            transport,
        }
    }

    /// The cell service attribute queries run through.
    pub fn cells(&self) -> &CellService {
        &self.cells
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> ElementResult<T> {
        Ok(self.transport.get(url)?.json()?)
    }

    fn get_count(&self, url: &str) -> ElementResult<usize> {
        let response = self.transport.get(url)?;
        response
            .text()
            .trim()
            .parse()
            .map_err(|_| ElementError::UnexpectedResponse(format!("count: {}", response.text())))
    }

    fn names(&self, url: &str) -> ElementResult<Vec<String>> {
        let names: ODataCollection<Named> = self.get_json(url)?;
        Ok(names.value.into_iter().map(|n| n.name).collect())
    }

    /// One element with every property expanded.
    pub fn get(&self, dimension: &str, hierarchy: &str, element: &str) -> ElementResult<Element> {
        let url = format_url(ELEMENT_URL, &[dimension, hierarchy, element]);
        let url = format!("{url}?$expand=*");
        self.get_json(&url)
    }

    /// Creates `element`.
    pub fn create(&self, dimension: &str, hierarchy: &str, element: &Element) -> ElementResult<()> {
        let url = format_url(ELEMENTS_URL, &[dimension, hierarchy]);
        self.transport.post(&url, Some(&element.body()))?;
        Ok(())
    }

    /// Renames or retypes `element`.
    pub fn update(&self, dimension: &str, hierarchy: &str, element: &Element) -> ElementResult<()> {
        let url = format_url(ELEMENT_URL, &[dimension, hierarchy, &element.name]);
        self.transport.patch(&url, &element.body())?;
        Ok(())
    }

    /// `true` when the element exists.
    pub fn exists(&self, dimension: &str, hierarchy: &str, element: &str) -> ElementResult<bool> {
        Ok(self
            .transport
            .exists(&format_url(ELEMENT_URL, &[dimension, hierarchy, element]))?)
    }

    /// Deletes the element.
    pub fn delete(&self, dimension: &str, hierarchy: &str, element: &str) -> ElementResult<()> {
        self.transport
            .delete(&format_url(ELEMENT_URL, &[dimension, hierarchy, element]))?;
        Ok(())
    }

    /// Every element of the hierarchy.
    pub fn get_elements(&self, dimension: &str, hierarchy: &str) -> ElementResult<Vec<Element>> {
        let url = format!(
            "{}?$select=Name,UniqueName,Type,Level,Index",
            format_url(ELEMENTS_URL, &[dimension, hierarchy])
        );
        let elements: ODataCollection<Element> = self.get_json(&url)?;
        Ok(elements.value)
    }

    /// Edges keyed by `[parent, component]`.
    pub fn get_edges(
        &self,
        dimension: &str,
        hierarchy: &str,
    ) -> ElementResult<InsensitiveTupleMap<f64>> {
        let url = format_url(
            "/api/v1/Dimensions('{}')/Hierarchies('{}')/Edges?$select=ParentName,ComponentName,Weight",
            &[dimension, hierarchy],
        );
        let edges: ODataCollection<Edge> = self.get_json(&url)?;
        Ok(edges
            .value
            .into_iter()
            .map(|e| (vec![e.parent, e.component], e.weight))
            .collect())
    }

    /// Numeric and string elements.
    pub fn get_leaf_elements(
        &self,
        dimension: &str,
        hierarchy: &str,
    ) -> ElementResult<Vec<Element>> {
        let url = format!(
            "{}?$expand=*&$filter=Type ne 3",
            format_url(ELEMENTS_URL, &[dimension, hierarchy])
        );
        let elements: ODataCollection<Element> = self.get_json(&url)?;
        Ok(elements.value)
    }

    /// Names of the numeric and string elements.
    pub fn get_leaf_element_names(
        &self,
        dimension: &str,
        hierarchy: &str,
    ) -> ElementResult<Vec<String>> {
        self.names(&format!(
            "{}?$select=Name&$filter=Type ne 3",
            format_url(ELEMENTS_URL, &[dimension, hierarchy])
        ))
    }

    /// Names of every element.
    pub fn get_element_names(
        &self,
        dimension: &str,
        hierarchy: &str,
    ) -> ElementResult<Vec<String>> {
        let url = format_url(ELEMENTS_URL, &[dimension, hierarchy]);
        self.names(&format!("{url}?$select=Name"))
    }

    /// Element count.
    pub fn number_of_elements(&self, dimension: &str, hierarchy: &str) -> ElementResult<usize> {
        let url = format_url(ELEMENTS_URL, &[dimension, hierarchy]);
        self.get_count(&format!("{url}/$count"))
    }

    /// Consolidated element count.
    pub fn number_of_consolidated_elements(
        &self,
        dimension: &str,
        hierarchy: &str,
    ) -> ElementResult<usize> {
        self.get_count(&format!(
            "{}/$count?$filter=Type eq 3",
            format_url(ELEMENTS_URL, &[dimension, hierarchy])
        ))
    }

    /// Leaf element count.
    pub fn number_of_leaf_elements(
        &self,
        dimension: &str,
        hierarchy: &str,
    ) -> ElementResult<usize> {
        self.get_count(&format!(
            "{}/$count?$filter=Type ne 3",
            format_url(ELEMENTS_URL, &[dimension, hierarchy])
        ))
    }

    /// Names of the elements on `level`.
    pub fn elements_by_level(
        &self,
        dimension: &str,
        hierarchy: &str,
        level: u32,
    ) -> ElementResult<Vec<String>> {
        self.names(&format!(
            "{}?$select=Name&$filter=Level eq {level}",
            format_url(ELEMENTS_URL, &[dimension, hierarchy])
        ))
    }

    /// Names containing `wildcard`, ignoring case and spaces, optionally on one level.
    pub fn elements_filtered_by_wildcard(
        &self,
        dimension: &str,
        hierarchy: &str,
        wildcard: &str,
        level: Option<u32>,
    ) -> ElementResult<Vec<String>> {
        let mut filter = format_url(
            "contains(tolower(replace(Name,' ','')),tolower(replace('{}',' ', '')))",
            &[wildcard],
        );
        if let Some(level) = level {
            filter.push_str(&format!(" and Level eq {level}"));
        }
        self.names(&format!(
            "{}?$select=Name&$filter={filter}",
            format_url(ELEMENTS_URL, &[dimension, hierarchy])
        ))
    }

    /// Level names, top level first when `descending`.
    pub fn level_names(
        &self,
        dimension: &str,
        hierarchy: &str,
        descending: bool,
    ) -> ElementResult<Vec<String>> {
        let mut names = self.names(&format_url(
            "/api/v1/Dimensions('{}')/Hierarchies('{}')/Levels?$select=Name",
            &[dimension, hierarchy],
        ))?;
        if descending {
            names.reverse();
        }
        Ok(names)
    }

    /// Number of levels.
    pub fn levels_count(&self, dimension: &str, hierarchy: &str) -> ElementResult<usize> {
        self.get_count(&format_url(
            "/api/v1/Dimensions('{}')/Hierarchies('{}')/Levels/$count",
            &[dimension, hierarchy],
        ))
    }

    /// Element types by name, leaves only when `skip_consolidations`.
    pub fn element_types(
        &self,
        dimension: &str,
        hierarchy: &str,
        skip_consolidations: bool,
    ) -> ElementResult<InsensitiveDict<ElementType>> {
        let filter = if skip_consolidations {
            "&$filter=Type ne 3"
        } else {
            ""
        };
        let url = format!(
            "{}?$select=Name,Type{filter}",
            format_url(ELEMENTS_URL, &[dimension, hierarchy])
        );
        let elements: ODataCollection<TypedName> = self.get_json(&url)?;
        Ok(elements
            .value
            .into_iter()
            .map(|e| (e.name, e.element_type))
            .collect())
    }

    /// Types of every element in any hierarchy of `dimension`.
    pub fn element_types_from_all_hierarchies(
        &self,
        dimension: &str,
        skip_consolidations: bool,
    ) -> ElementResult<InsensitiveDict<ElementType>> {
        Ok(self
            .cells
            .element_types_from_all_hierarchies(dimension, skip_consolidations)?)
    }

    /// Attributes defined on the hierarchy.
    pub fn element_attributes(
        &self,
        dimension: &str,
        hierarchy: &str,
    ) -> ElementResult<Vec<ElementAttribute>> {
        let attributes: ODataCollection<ElementAttribute> = self.get_json(&format_url(
            "/api/v1/Dimensions('{}')/Hierarchies('{}')/ElementAttributes",
            &[dimension, hierarchy],
        ))?;
        Ok(attributes.value)
    }

    /// Names of the attributes defined on the hierarchy.
    pub fn element_attribute_names(
        &self,
        dimension: &str,
        hierarchy: &str,
    ) -> ElementResult<Vec<String>> {
        self.names(&format_url(
            "/api/v1/Dimensions('{}')/Hierarchies('{}')/ElementAttributes?$select=Name",
            &[dimension, hierarchy],
        ))
    }

    /// Names of the alias attributes.
    pub fn alias_element_attributes(
        &self,
        dimension: &str,
        hierarchy: &str,
    ) -> ElementResult<Vec<String>> {
        Ok(self
            .element_attributes(dimension, hierarchy)?
            .into_iter()
            .filter(|a| a.attribute_type == AttributeType::Alias)
            .map(|a| a.name)
            .collect())
    }

    /// Adds `attribute` to the hierarchy.
    pub fn create_element_attribute(
        &self,
        dimension: &str,
        hierarchy: &str,
        attribute: &ElementAttribute,
    ) -> ElementResult<()> {
        let url = format_url(
            "/api/v1/Dimensions('{}')/Hierarchies('{}')/ElementAttributes",
            &[dimension, hierarchy],
        );
        self.transport.post(&url, Some(&attribute.body()))?;
        Ok(())
    }

    /// Removes an attribute; a missing attribute or attribute hierarchy is not an error.
    pub fn delete_element_attribute(
        &self,
        dimension: &str,
        hierarchy: &str,
        attribute: &str,
    ) -> ElementResult<()> {
        let url = format_url(
            "/api/v1/Dimensions('}ElementAttributes_{}')/Hierarchies('}ElementAttributes_{}')/Elements('{}')",
            &[dimension, hierarchy, attribute],
        );
        match self.transport.delete(&url) {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!(dimension, attribute, "element attribute already absent");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// `true` once `dimension` has an element attributes cube.
    pub fn attribute_cube_exists(&self, dimension: &str) -> ElementResult<bool> {
        let url = format_url("/api/v1/Cubes('{}')", &[&attribute_cube(dimension)]);
        Ok(self.transport.exists(&url)?)
    }

    /// Members below `consolidation`, in pre-order.
    ///
    /// `max_depth` limits how many levels the server expands (99 when absent).
    pub fn members_under_consolidation(
        &self,
        dimension: &str,
        hierarchy: &str,
        consolidation: &str,
        max_depth: Option<usize>,
        leaves_only: bool,
    ) -> ElementResult<Vec<String>> {
        let depth = match max_depth {
            Some(depth) if depth > 0 => depth - 1,
            _ => DEFAULT_COMPONENT_DEPTH,
        };
        let url = components_url(dimension, hierarchy, consolidation, depth);
        let tree = ComponentNode::from_json(self.transport.get(&url)?.text())?;
        Ok(tree.members(leaves_only))
    }

    /// Leaves below `consolidation`, in pre-order.
    pub fn leaves_under_consolidation(
        &self,
        dimension: &str,
        hierarchy: &str,
        consolidation: &str,
        max_depth: Option<usize>,
    ) -> ElementResult<Vec<String>> {
        self.members_under_consolidation(dimension, hierarchy, consolidation, max_depth, true)
    }

    /// Evaluates a set expression; one list of member property maps per tuple.
    pub fn execute_set_mdx(
        &self,
        mdx: &str,
        query: &SetMdxQuery,
    ) -> ElementResult<Vec<Vec<Map<String, Value>>>> {
        let body = json!({ "MDX": mdx });
        let response = self.transport.post(&query.url(), Some(&body))?;
        let tuples: SetTuples = response.json()?;
        Ok(tuples.tuples.into_iter().map(|t| t.members).collect())
    }

    /// Adds edges; fails if any already exists.
    pub fn add_edges(
        &self,
        dimension: &str,
        hierarchy: Option<&str>,
        edges: &[Edge],
    ) -> ElementResult<()> {
        let url = format_url(
            "/api/v1/Dimensions('{}')/Hierarchies('{}')/Edges",
            &[dimension, hierarchy.unwrap_or(dimension)],
        );
        let body = Value::Array(edges.iter().map(Edge::body).collect());
        self.transport.post(&url, Some(&body))?;
        Ok(())
    }

    /// Adds elements; fails if any already exists.
    pub fn add_elements(
        &self,
        dimension: &str,
        hierarchy: &str,
        elements: &[Element],
    ) -> ElementResult<()> {
        let url = format_url(ELEMENTS_URL, &[dimension, hierarchy]);
        let body = Value::Array(elements.iter().map(Element::body).collect());
        self.transport.post(&url, Some(&body))?;
        Ok(())
    }

    /// Adds several attributes in one request.
    pub fn add_element_attributes(
        &self,
        dimension: &str,
        hierarchy: &str,
        attributes: &[ElementAttribute],
    ) -> ElementResult<()> {
        let url = format_url(
            "/api/v1/Dimensions('{}')/Hierarchies('{}')/ElementAttributes",
            &[dimension, hierarchy],
        );
        let body = Value::Array(attributes.iter().map(ElementAttribute::body).collect());
        self.transport.post(&url, Some(&body))?;
        Ok(())
    }

    fn attribute_query(dimension: &str, rows: &str, columns: &str) -> String {
        format!(
            "SELECT {{ {rows} }} ON ROWS, {{ {columns} }} ON COLUMNS FROM [{}]",
            escape_identifier(&attribute_cube(dimension))
        )
    }

    /// Attribute value of each element, keyed by element name.
    ///
    /// All elements of the hierarchy are read when `elements` is `None`.
    pub fn attribute_of_elements(
        &self,
        dimension: &str,
        hierarchy: &str,
        attribute: &str,
        elements: Option<ElementSet<'_>>,
        exclude_empty_cells: bool,
        element_unique_names: bool,
    ) -> ElementResult<InsensitiveDict<CellValue>> {
        let names;
        let elements = match elements {
            Some(elements) => elements,
            None => {
                names = self.get_element_names(dimension, hierarchy)?;
                ElementSet::Names(&names)
            }
        };
        let attributes_dimension = attribute_cube(dimension);
        let mdx = Self::attribute_query(
            dimension,
            &elements.mdx(dimension, hierarchy),
            &format!(
                "[{}].[{}]",
                escape_identifier(&attributes_dimension),
                escape_identifier(attribute)
            ),
        );
        let rows_and_values =
            self.cells
                .execute_rows_and_values(CellsetSource::Mdx(&mdx), element_unique_names, None)?;
        let mut result = InsensitiveDict::new();
        for (row, values) in rows_and_values {
            for element in row {
                for value in &values {
                    if !(exclude_empty_cells && value.is_empty()) {
                        result.insert(element.clone(), value.clone());
                    }
                }
            }
        }
        Ok(result)
    }

    /// Element names plus their alias values for a set of elements.
    pub fn element_identifiers(
        &self,
        dimension: &str,
        hierarchy: &str,
        elements: ElementSet<'_>,
    ) -> ElementResult<InsensitiveSet> {
        let aliases = self.alias_element_attributes(dimension, hierarchy)?;
        let selection = elements.mdx(dimension, hierarchy);
        if aliases.is_empty() {
            let members = self.execute_set_mdx(&format!("{{{selection}}}"), &SetMdxQuery::names())?;
            return Ok(members
                .iter()
                .filter_map(|tuple| tuple.first()?.get("Name")?.as_str().map(str::to_string))
                .collect());
        }
        let attributes_dimension = attribute_cube(dimension);
        let columns = aliases
            .iter()
            .map(|alias| element_unique_name(&attributes_dimension, &attributes_dimension, alias))
            .collect::<Vec<_>>()
            .join(",");
        let mdx = Self::attribute_query(dimension, &selection, &columns);
        Ok(self
            .cells
            .execute_rows_and_values_string_set(CellsetSource::Mdx(&mdx), true, None)?)
    }

    /// Names and alias values of every element.
    pub fn all_element_identifiers(
        &self,
        dimension: &str,
        hierarchy: &str,
    ) -> ElementResult<InsensitiveSet> {
        let hierarchy_name = hierarchy_unique_name(dimension, hierarchy);
        let mdx = format!("{{ TM1SUBSETALL({hierarchy_name}) }}");
        self.element_identifiers(dimension, hierarchy, ElementSet::Mdx(&mdx))
    }

    /// Names and alias values of the level zero elements.
    pub fn all_leaf_element_identifiers(
        &self,
        dimension: &str,
        hierarchy: &str,
    ) -> ElementResult<InsensitiveSet> {
        let mdx = format!(
            "{{ TM1FILTERBYLEVEL({{ TM1SUBSETALL({}) }}, 0) }}",
            hierarchy_unique_name(dimension, hierarchy)
        );
        self.element_identifiers(dimension, hierarchy, ElementSet::Mdx(&mdx))
    }

    /// Names of the elements whose `attribute` equals `value`.
    pub fn elements_filtered_by_attribute(
        &self,
        dimension: &str,
        hierarchy: &str,
        attribute: &str,
        value: &CellValue,
    ) -> ElementResult<Vec<String>> {
        let attributes_dimension = attribute_cube(dimension);
        if !self.exists(&attributes_dimension, &attributes_dimension, attribute)? {
            return Err(ElementError::AttributeNotFound {
                dimension: dimension.to_string(),
                attribute: attribute.to_string(),
            });
        }
        let operand = match value {
            CellValue::String(s) => format!("\"{}\"", s.replace('"', "\"\"")),
            other => other.to_string(),
        };
        let mdx = format!(
            "{{FILTER({{TM1SUBSETALL({hierarchy_name})}},{hierarchy_name}.[{}] = {operand})}}",
            escape_identifier(attribute),
            hierarchy_name = hierarchy_unique_name(dimension, hierarchy),
        );
        let members = self.execute_set_mdx(&mdx, &SetMdxQuery::names())?;
        Ok(members
            .iter()
            .filter_map(|tuple| tuple.first()?.get("Name")?.as_str().map(str::to_string))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_mdx_urls() {
        assert_eq!(
            SetMdxQuery::default().url(),
            "/api/v1/ExecuteMDXSetExpression?$expand=Tuples($expand=Members($select=Name,Weight;\
             $expand=Parent($select=Name,UniqueName),Element($select=Type,Level)))"
        );
        let query = SetMdxQuery {
            top: Some(5),
            member_properties: vec!["Name".into(), "Attributes/Long Name".into()],
            ..SetMdxQuery::names()
        };
        assert_eq!(
            query.url(),
            "/api/v1/ExecuteMDXSetExpression?$expand=Tuples($top=5;$expand=Members($select=Name,Attributes/LongName))"
        );
    }

    #[test]
    fn element_sets() {
        let names = vec!["a".to_string(), "b]".to_string()];
        assert_eq!(
            ElementSet::Names(&names).mdx("d", "h"),
            "[d].[h].[a],[d].[h].[b]]]"
        );
        assert_eq!(ElementSet::Mdx("{[d].[x]}").mdx("d", "h"), "{[d].[x]}");
    }
}
