//! Consolidation trees as returned by nested `Components` expansions.

use serde::Deserialize;
use tm1_core::{url::format_url, ElementType};

/// One element of a consolidation tree and its expanded components.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ComponentNode {
    /// Element name.
    pub name: String,
    /// Element type.
    #[serde(rename = "Type")]
    pub element_type: ElementType,
    /// Direct components, empty for leaves and unexpanded levels.
    #[serde(default)]
    pub components: Vec<ComponentNode>,
}

impl ComponentNode {
    /// Parses a nested `Components` expansion of any depth.
    ///
    /// The nesting is bounded by the depth requested in [`components_url`], so the
    /// parser's recursion limit is lifted.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        let mut deserializer = serde_json::Deserializer::from_str(text);
        deserializer.disable_recursion_limit();
        let node = Self::deserialize(&mut deserializer)?;
        deserializer.end()?;
        Ok(node)
    }

    /// Members below this node in pre-order.
    ///
    /// Leaves are always listed. Consolidated descendants are listed unless
    /// `leaves_only`; the node itself only when it is a leaf. String elements
    /// are skipped.
    pub fn members(&self, leaves_only: bool) -> Vec<String> {
        let mut members = Vec::new();
        let mut stack: Vec<(&ComponentNode, bool)> = vec![(self, true)];
        while let Some((node, is_root)) = stack.pop() {
            match node.element_type {
                ElementType::Numeric => members.push(node.name.clone()),
                ElementType::Consolidated => {
                    if !is_root && !leaves_only {
                        members.push(node.name.clone());
                    }
                    stack.extend(node.components.iter().rev().map(|c| (c, false)));
                }
                ElementType::String => {}
            }
        }
        members
    }

    /// Longest root to leaf path, counting the root as 1.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self, 1)];
        while let Some((node, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            stack.extend(node.components.iter().map(|c| (c, depth + 1)));
        }
        deepest
    }
}

/// GET URL expanding `Components` of `consolidation` to `depth` nested levels.
///
/// Depth zero still expands the direct components.
pub fn components_url(
    dimension: &str,
    hierarchy: &str,
    consolidation: &str,
    depth: usize,
) -> String {
    let mut url = format_url(
        "/api/v1/Dimensions('{}')/Hierarchies('{}')/Elements('{}')?$select=Name,Type&$expand=Components",
        &[dimension, hierarchy, consolidation],
    );
    url.push_str(&"($select=Name,Type;$expand=Components".repeat(depth));
    url.push_str(&")".repeat(depth));
    url
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sample() -> ComponentNode {
        serde_json::from_value(json!({
            "Name": "Total", "Type": "Consolidated", "Components": [
                {"Name": "Europe", "Type": "Consolidated", "Components": [
                    {"Name": "France", "Type": "Numeric"},
                    {"Name": "Germany", "Type": "Numeric"}
                ]},
                {"Name": "Note", "Type": "String"},
                {"Name": "Asia", "Type": "Consolidated", "Components": [
                    {"Name": "Japan", "Type": "Numeric"}
                ]},
                {"Name": "Other", "Type": "Numeric"}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn pre_order_members() {
        let tree = sample();
        assert_eq!(
            tree.members(false),
            vec!["Europe", "France", "Germany", "Asia", "Japan", "Other"]
        );
        assert_eq!(
            tree.members(true),
            vec!["France", "Germany", "Japan", "Other"]
        );
        assert_eq!(tree.depth(), 3);
    }

    #[test]
    fn leaf_root_lists_itself() {
        let leaf = ComponentNode {
            name: "x".into(),
            element_type: ElementType::Numeric,
            components: vec![],
        };
        assert_eq!(leaf.members(false), vec!["x"]);
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        assert!(ComponentNode::from_json(r#"{"Name": "x", "Type": "Numeric"} ]"#).is_err());
    }

    #[test]
    fn url_nesting() {
        assert_eq!(
            components_url("d", "h", "c", 0),
            "/api/v1/Dimensions('d')/Hierarchies('h')/Elements('c')?$select=Name,Type&$expand=Components"
        );
        assert_eq!(
            components_url("d", "h", "c", 2),
            "/api/v1/Dimensions('d')/Hierarchies('h')/Elements('c')?$select=Name,Type&$expand=Components\
             ($select=Name,Type;$expand=Components($select=Name,Type;$expand=Components))"
        );
    }
}
