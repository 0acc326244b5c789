//! Whole-hierarchy reads and writes.

use std::sync::Arc;

use serde::Deserialize;
use tm1_core::{
    constants::HIERARCHY_PROPERTIES_CUBE, insensitive::insensitive_eq, url::format_url, CellValue,
    InsensitiveSet,
};
use tm1_rest::{ODataCollection, Transport};
use tracing::{debug, info};

use crate::{
    models::{Edge, Element, ElementAttribute, Hierarchy, RawHierarchy},
    service::ElementService,
    ElementError, ElementResult,
};

const HIERARCHY_URL: &str = "/api/v1/Dimensions('{}')/Hierarchies('{}')";

/// Member counts of one hierarchy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct HierarchySummary {
    /// Elements.
    #[serde(rename = "Elements@odata.count", default)]
    pub elements: usize,
    /// Parent to component links.
    #[serde(rename = "Edges@odata.count", default)]
    pub edges: usize,
    /// Attributes defined on the elements.
    #[serde(rename = "ElementAttributes@odata.count", default)]
    pub element_attributes: usize,
    /// Members.
    #[serde(rename = "Members@odata.count", default)]
    pub members: usize,
    /// Levels.
    #[serde(rename = "Levels@odata.count", default)]
    pub levels: usize,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Named {
    name: String,
}

/// Reads and writes whole hierarchies.
#[derive(Clone)]
pub struct HierarchyService {
    transport: Arc<dyn Transport>,
    elements: ElementService,
}

impl std::fmt::Debug for HierarchyService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HierarchyService").finish_non_exhaustive()
    }
}

impl HierarchyService {
    /// Hierarchy operations over `transport`.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            elements: ElementService::new(Arc::clone(&transport)),
            transport,
        }
    }

    /// The element service sharing this transport.
    pub fn elements(&self) -> &ElementService {
        &self.elements
    }

    fn url(hierarchy: &Hierarchy) -> String {
        format_url(HIERARCHY_URL, &[&hierarchy.dimension_name, &hierarchy.name])
    }

    /// Creates the hierarchy, then its element attributes.
    pub fn create(&self, hierarchy: &Hierarchy) -> ElementResult<()> {
        let url = format_url(
            "/api/v1/Dimensions('{}')/Hierarchies",
            &[&hierarchy.dimension_name],
        );
        self.transport.post(&url, Some(&hierarchy.body()))?;
        self.update_element_attributes(hierarchy)
    }

    /// Elements, edges, element attributes and default member of one hierarchy.
    pub fn get(&self, dimension: &str, hierarchy: &str) -> ElementResult<Hierarchy> {
        let url = format!(
            "{}?$expand=Edges,Elements,ElementAttributes,Subsets,DefaultMember",
            format_url(HIERARCHY_URL, &[dimension, hierarchy])
        );
        let raw: RawHierarchy = self.transport.get(&url)?.json()?;
        Ok(Hierarchy::from_raw(dimension, raw))
    }

    /// Names of every hierarchy in `dimension`.
    pub fn get_all_names(&self, dimension: &str) -> ElementResult<Vec<String>> {
        let url = format_url(
            "/api/v1/Dimensions('{}')/Hierarchies?$select=Name",
            &[dimension],
        );
        let names: ODataCollection<Named> = self.transport.get(&url)?.json()?;
        Ok(names.value.into_iter().map(|n| n.name).collect())
    }

    /// Replaces elements and edges, then reconciles element attributes.
    pub fn update(&self, hierarchy: &Hierarchy) -> ElementResult<()> {
        self.transport
            .patch(&Self::url(hierarchy), &hierarchy.body())?;
        self.update_element_attributes(hierarchy)
    }

    /// Updates `hierarchy` when it exists, creates it otherwise.
    pub fn update_or_create(&self, hierarchy: &Hierarchy) -> ElementResult<()> {
        if self.exists(&hierarchy.dimension_name, &hierarchy.name)? {
            self.update(hierarchy)
        } else {
            self.create(hierarchy)
        }
    }

    /// `true` when the hierarchy exists.
    pub fn exists(&self, dimension: &str, hierarchy: &str) -> ElementResult<bool> {
        Ok(self
            .transport
            .exists(&format_url(HIERARCHY_URL, &[dimension, hierarchy]))?)
    }

    /// Deletes the hierarchy.
    pub fn delete(&self, dimension: &str, hierarchy: &str) -> ElementResult<()> {
        self.transport
            .delete(&format_url(HIERARCHY_URL, &[dimension, hierarchy]))?;
        Ok(())
    }

    /// Counts of elements, edges, attributes, members and levels.
    pub fn hierarchy_summary(
        &self,
        dimension: &str,
        hierarchy: &str,
    ) -> ElementResult<HierarchySummary> {
        let url = format!(
            "{}?$expand=Edges/$count,Elements/$count,ElementAttributes/$count,Members/$count,Levels/$count\
             &$select=Cardinality",
            format_url(HIERARCHY_URL, &[dimension, hierarchy])
        );
        Ok(self.transport.get(&url)?.json()?)
    }

    /// Brings the server's element attributes in line with `hierarchy`.
    ///
    /// Missing attributes are created, surplus ones deleted and retyped ones
    /// recreated.
    pub fn update_element_attributes(&self, hierarchy: &Hierarchy) -> ElementResult<()> {
        let (dimension, name) = (hierarchy.dimension_name.as_str(), hierarchy.name.as_str());
        let existing = self.elements.element_attributes(dimension, name)?;

        for wanted in &hierarchy.element_attributes {
            let found = existing
                .iter()
                .find(|e| insensitive_eq(&e.name, &wanted.name));
            match found {
                None => {
                    self.elements
                        .create_element_attribute(dimension, name, wanted)?;
                }
                Some(current) if current.attribute_type != wanted.attribute_type => {
                    debug!(
                        attribute = %wanted.name,
                        from = %current.attribute_type,
                        to = %wanted.attribute_type,
                        "retyping element attribute"
                    );
                    self.elements
                        .delete_element_attribute(dimension, name, &current.name)?;
                    self.elements
                        .create_element_attribute(dimension, name, wanted)?;
                }
                Some(_) => {}
            }
        }
        for current in &existing {
            let kept = hierarchy
                .element_attributes
                .iter()
                .any(|a| insensitive_eq(&a.name, &current.name));
            if !kept {
                self.elements
                    .delete_element_attribute(dimension, name, &current.name)?;
            }
        }
        Ok(())
    }

    /// Name of the default member; `None` when the server reports none.
    pub fn default_member(
        &self,
        dimension: &str,
        hierarchy: &str,
    ) -> ElementResult<Option<String>> {
        let url = format!(
            "{}/DefaultMember?$select=Name",
            format_url(HIERARCHY_URL, &[dimension, hierarchy])
        );
        let response = self.transport.get(&url)?;
        if response.is_empty() {
            return Ok(None);
        }
        let member: Named = response.json()?;
        Ok(Some(member.name))
    }

    /// Stores `member` as default member and refreshes the hierarchy.
    ///
    /// An empty `member` resets the default to the server's choice.
    pub fn update_default_member(
        &self,
        dimension: &str,
        hierarchy: Option<&str>,
        member: &str,
    ) -> ElementResult<()> {
        let hierarchy = hierarchy.unwrap_or(dimension);
        let property_element = if insensitive_eq(dimension, hierarchy) {
            dimension.to_string()
        } else {
            format!("{dimension}:{hierarchy}")
        };
        let dimensions =
            ["}Dimensions", "}Hierarchies", HIERARCHY_PROPERTIES_CUBE].map(String::from);
        let coordinates = [
            property_element,
            "hierarchy0".to_string(),
            "defaultMember".to_string(),
        ];
        self.elements.cells().write_value(
            &CellValue::from(member),
            HIERARCHY_PROPERTIES_CUBE,
            &coordinates,
            Some(dimensions.as_slice()),
            None,
        )?;

        let refresh = format!("RefreshMdxHierarchy('{}');", dimension.replace('\'', "''"));
        let execution = self.elements.cells().execute_ti_code(&[refresh])?;
        if !execution.success() {
            return Err(ElementError::UnexpectedResponse(format!(
                "hierarchy refresh ended with status {}",
                execution.status
            )));
        }
        info!(dimension, hierarchy, member, "default member updated");
        Ok(())
    }

    /// Flattens the hierarchy.
    pub fn remove_all_edges(&self, dimension: &str, hierarchy: &str) -> ElementResult<()> {
        self.transport.patch(
            &format_url(HIERARCHY_URL, &[dimension, hierarchy]),
            &serde_json::json!({ "Edges": [] }),
        )?;
        Ok(())
    }

    /// Drops every edge between members of `consolidation`, the consolidation included.
    pub fn remove_edges_under_consolidation(
        &self,
        dimension: &str,
        hierarchy: &str,
        consolidation: &str,
    ) -> ElementResult<()> {
        let mut current = self.get(dimension, hierarchy)?;
        let mut members: InsensitiveSet = self
            .elements
            .members_under_consolidation(dimension, hierarchy, consolidation, None, false)?
            .into_iter()
            .collect();
        members.insert(consolidation);
        let before = current.edges.len();
        current.remove_edges_within(&members);
        debug!(
            removed = before - current.edges.len(),
            consolidation,
            "edges removed"
        );
        self.update(&current)
    }

    /// See [`ElementService::add_edges`].
    pub fn add_edges(&self, dimension: &str, hierarchy: &str, edges: &[Edge]) -> ElementResult<()> {
        self.elements.add_edges(dimension, Some(hierarchy), edges)
    }

    /// See [`ElementService::add_elements`].
    pub fn add_elements(
        &self,
        dimension: &str,
        hierarchy: &str,
        elements: &[Element],
    ) -> ElementResult<()> {
        self.elements.add_elements(dimension, hierarchy, elements)
    }

    /// See [`ElementService::add_element_attributes`].
    pub fn add_element_attributes(
        &self,
        dimension: &str,
        hierarchy: &str,
        attributes: &[ElementAttribute],
    ) -> ElementResult<()> {
        self.elements
            .add_element_attributes(dimension, hierarchy, attributes)
    }

    /// `true` when every leaf sits on level zero.
    pub fn is_balanced(&self, dimension: &str, hierarchy: &str) -> ElementResult<bool> {
        let url = format_url(HIERARCHY_URL, &[dimension, hierarchy]);
        let url = format!("{url}/Structure/$value");
        let response = self.transport.get(&url)?;
        match response.text().trim() {
            "0" => Ok(true),
            "2" => Ok(false),
            other => Err(ElementError::UnexpectedResponse(format!(
                "hierarchy structure '{other}'"
            ))),
        }
    }
}
