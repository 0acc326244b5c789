//! Element, edge, attribute and hierarchy payloads.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use strum::{AsRefStr, Display, EnumString};
use tm1_core::{insensitive::insensitive_eq, ElementType, InsensitiveSet};

/// A dimension element as returned by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Element {
    /// Element name.
    pub name: String,
    /// `[dimension].[hierarchy].[element]`, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_name: Option<String>,
    /// Numeric, string or consolidated.
    #[serde(rename = "Type", default)]
    pub element_type: ElementType,
    /// Distance from the leaves, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,
    /// Position in the hierarchy, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    /// Attribute values by attribute name, when expanded.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
}

impl Element {
    /// An element with no optional properties.
    pub fn new(name: impl Into<String>, element_type: ElementType) -> Self {
        Self {
            name: name.into(),
            element_type,
            ..Self::default()
        }
    }

    /// Create and update body.
    pub fn body(&self) -> Value {
        json!({"Name": self.name, "Type": self.element_type.as_str()})
    }
}

/// Value kind of an element attribute.
#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
pub enum AttributeType {
    /// Numbers.
    Numeric,
    /// Free text.
    #[default]
    String,
    /// Alternative element names, unique across the dimension.
    Alias,
}

/// An attribute defined on the elements of a dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ElementAttribute {
    /// Attribute name.
    pub name: String,
    /// Value kind.
    #[serde(rename = "Type")]
    pub attribute_type: AttributeType,
}

impl ElementAttribute {
    /// Attribute `name` of kind `attribute_type`.
    pub fn new(name: impl Into<String>, attribute_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attribute_type,
        }
    }

    /// Create body.
    pub fn body(&self) -> Value {
        json!({"Name": self.name, "Type": self.attribute_type.as_ref()})
    }
}

/// Parent to component link with its weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Consolidated parent element.
    #[serde(rename = "ParentName")]
    pub parent: String,
    /// Child element.
    #[serde(rename = "ComponentName")]
    pub component: String,
    /// Contribution of the child to the parent.
    #[serde(rename = "Weight", default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

impl Edge {
    /// Links `component` under `parent`.
    pub fn new(parent: impl Into<String>, component: impl Into<String>, weight: f64) -> Self {
        Self {
            parent: parent.into(),
            component: component.into(),
            weight,
        }
    }

    /// Body of an `Edges` entry.
    pub fn body(&self) -> Value {
        json!({"ParentName": self.parent, "ComponentName": self.component, "Weight": self.weight})
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NamedMember {
    name: String,
}

/// Hierarchy payload of `GET Dimensions(..)/Hierarchies(..)` with its expansions.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct RawHierarchy {
    name: String,
    #[serde(default)]
    elements: Vec<Element>,
    #[serde(default)]
    edges: Vec<Edge>,
    #[serde(default)]
    element_attributes: Vec<ElementAttribute>,
    #[serde(default)]
    default_member: Option<NamedMember>,
}

/// A hierarchy with its elements, edges and element attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Hierarchy {
    /// Owning dimension.
    pub dimension_name: String,
    /// Hierarchy name.
    pub name: String,
    /// Every element, in server order.
    pub elements: Vec<Element>,
    /// Parent to component links.
    pub edges: Vec<Edge>,
    /// Attributes defined on the elements.
    pub element_attributes: Vec<ElementAttribute>,
    /// Member the hierarchy resolves to when not named explicitly.
    pub default_member: Option<String>,
}

impl Hierarchy {
    /// An empty hierarchy.
    pub fn new(dimension_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            dimension_name: dimension_name.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub(crate) fn from_raw(dimension_name: &str, raw: RawHierarchy) -> Self {
        Self {
            dimension_name: dimension_name.to_string(),
            name: raw.name,
            elements: raw.elements,
            edges: raw.edges,
            element_attributes: raw.element_attributes,
            default_member: raw.default_member.map(|m| m.name),
        }
    }

    /// Create and update body. Element attributes travel separately.
    pub fn body(&self) -> Value {
        json!({
            "Name": self.name,
            "Elements": self.elements.iter().map(Element::body).collect::<Vec<_>>(),
            "Edges": self.edges.iter().map(Edge::body).collect::<Vec<_>>(),
        })
    }

    /// `true` when an element matches `name` case and whitespace insensitively.
    pub fn contains_element(&self, name: &str) -> bool {
        self.elements.iter().any(|e| insensitive_eq(&e.name, name))
    }

    /// Appends the element unless one with the same name exists.
    pub fn add_element(&mut self, name: impl Into<String>, element_type: ElementType) {
        let name = name.into();
        if !self.contains_element(&name) {
            self.elements.push(Element::new(name, element_type));
        }
    }

    /// Adds or reweights the edge from `parent` to `component`.
    pub fn add_edge(
        &mut self,
        parent: impl Into<String>,
        component: impl Into<String>,
        weight: f64,
    ) {
        let (parent, component) = (parent.into(), component.into());
        match self
            .edges
            .iter_mut()
            .find(|e| {
                insensitive_eq(&e.parent, &parent) && insensitive_eq(&e.component, &component)
            })
        {
            Some(edge) => edge.weight = weight,
            None => self.edges.push(Edge::new(parent, component, weight)),
        }
    }

    /// Drops every edge whose parent and component are both in `members`.
    pub fn remove_edges_within(&mut self, members: &InsensitiveSet) {
        self.edges
            .retain(|e| !(members.contains(&e.parent) && members.contains(&e.component)));
    }
}
