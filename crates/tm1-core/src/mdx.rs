//! Helpers for reading and assembling MDX.

use lazy_static::lazy_static;
use regex::Regex;

use crate::{
    errors::{ElementSelectionError, UniqueNameError},
    insensitive::InsensitiveTupleMap,
};

lazy_static! {
    static ref MDX_SHAPE: Regex =
        Regex::new(r"(?is)^\s*(WITH\s.*?)?SELECT\s.*\sFROM\s").expect("valid MDX shape pattern");
    static ref FROM_CUBE: Regex = Regex::new(r"(?is)\bFROM\s*(\[(?:[^\]]|\]\])*\]|[^\s\[\]]+)")
        .expect("valid FROM clause pattern");
}

/// Escapes one part of a bracketed MDX identifier.
pub fn escape_identifier(name: &str) -> String {
    name.replace(']', "]]")
}

/// `[dimension].[hierarchy].[element]`
pub fn element_unique_name(dimension: &str, hierarchy: &str, element: &str) -> String {
    format!(
        "[{}].[{}].[{}]",
        escape_identifier(dimension),
        escape_identifier(hierarchy),
        escape_identifier(element)
    )
}

/// `[dimension].[hierarchy]`
pub fn hierarchy_unique_name(dimension: &str, hierarchy: &str) -> String {
    format!(
        "[{}].[{}]",
        escape_identifier(dimension),
        escape_identifier(hierarchy)
    )
}

/// Splits a bracketed unique name into its unescaped parts.
pub fn split_unique_name(unique_name: &str) -> Result<Vec<String>, UniqueNameError> {
    let error = || UniqueNameError(unique_name.to_string());
    let mut parts = Vec::new();
    let mut chars = unique_name.trim().chars().peekable();
    loop {
        if chars.next() != Some('[') {
            return Err(error());
        }
        let mut part = String::new();
        loop {
            match chars.next() {
                Some(']') if chars.peek() == Some(&']') => {
                    chars.next();
                    part.push(']');
                }
                Some(']') => break,
                Some(c) => part.push(c),
                None => return Err(error()),
            }
        }
        parts.push(part);
        match chars.next() {
            None => return Ok(parts),
            Some('.') => {}
            Some(_) => return Err(error()),
        }
    }
}

/// Dimension part of a unique name.
pub fn dimension_name_from_unique_name(unique_name: &str) -> Result<String, UniqueNameError> {
    split_unique_name(unique_name)?
        .into_iter()
        .next()
        .ok_or_else(|| UniqueNameError(unique_name.to_string()))
}

/// Element part of a two or three part unique name.
pub fn element_name_from_unique_name(unique_name: &str) -> Result<String, UniqueNameError> {
    let mut parts = split_unique_name(unique_name)?;
    match parts.len() {
        2 | 3 => parts
            .pop()
            .ok_or_else(|| UniqueNameError(unique_name.to_string())),
        _ => Err(UniqueNameError(unique_name.to_string())),
    }
}

/// Resolves `[d].[e]` to `(d, d, e)` and `[d].[h].[e]` to `(d, h, e)`.
pub fn dimension_hierarchy_element_from_unique_name(
    unique_name: &str,
) -> Result<(String, String, String), UniqueNameError> {
    let mut parts = split_unique_name(unique_name)?.into_iter();
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(dimension), Some(element), None, None) => {
            Ok((dimension.clone(), dimension, element))
        }
        (Some(dimension), Some(hierarchy), Some(element), None) => {
            Ok((dimension, hierarchy, element))
        }
        _ => Err(UniqueNameError(unique_name.to_string())),
    }
}

/// Hierarchy part of a unique name; the dimension for two part names.
pub fn hierarchy_name_from_unique_name(unique_name: &str) -> Result<String, UniqueNameError> {
    dimension_hierarchy_element_from_unique_name(unique_name).map(|(_, h, _)| h)
}

/// Wraps a set expression in `{}` unless it already is.
pub fn wrap_in_curly_braces(expression: &str) -> String {
    let trimmed = expression.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        trimmed.to_string()
    } else {
        format!("{{{trimmed}}}")
    }
}

/// Cheap check that `text` is a SELECT query rather than an object name.
pub fn resembles_mdx(text: &str) -> bool {
    MDX_SHAPE.is_match(text)
}

/// Cube named in the FROM clause of a query.
pub fn cube_from_mdx(mdx: &str) -> Option<String> {
    let captures = FROM_CUBE.captures(mdx)?;
    let raw = captures.get(1)?.as_str();
    let name = match raw.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
        Some(inner) => inner.replace("]]", "]"),
        None => raw.to_string(),
    };
    Some(name.trim().to_string())
}

/// All leaves of a hierarchy as a set expression.
pub fn leaves_of_hierarchy(dimension: &str, hierarchy: &str) -> String {
    format!(
        "{{TM1FILTERBYLEVEL({{TM1SUBSETALL({})}},0)}}",
        hierarchy_unique_name(dimension, hierarchy)
    )
}

fn coordinate_tuple<S: AsRef<str>>(dimensions: &[S], elements: &[String]) -> String {
    let members = dimensions
        .iter()
        .zip(elements)
        .map(|(dimension, element)| {
            let dimension = dimension.as_ref();
            element_unique_name(dimension, dimension, element)
        })
        .collect::<Vec<_>>()
        .join(",");
    format!("({members})")
}

/// Query with one column tuple per coordinate, in map order.
pub fn build_mdx_from_coordinates<'a, S, I>(cube: &str, dimensions: &[S], coordinates: I) -> String
where
    S: AsRef<str>,
    I: IntoIterator<Item = &'a Vec<String>>,
{
    let tuples = coordinates
        .into_iter()
        .map(|elements| coordinate_tuple(dimensions, elements))
        .collect::<Vec<_>>()
        .join(",");
    format!(
        "SELECT\r\n{{{tuples}}} ON 0\r\nFROM [{}]",
        escape_identifier(cube)
    )
}

/// Query addressing every cell of `cells` plus the values in matching ordinal order.
pub fn build_mdx_and_values<S: AsRef<str>, V: Clone>(
    cube: &str,
    dimensions: &[S],
    cells: &InsensitiveTupleMap<V>,
) -> (String, Vec<V>) {
    let mdx = build_mdx_from_coordinates(cube, dimensions, cells.keys());
    let values = cells.values().cloned().collect();
    (mdx, values)
}

fn parse_selection(dimension: &str, selection: &str) -> Result<Vec<String>, ElementSelectionError> {
    let selection = selection.trim();
    if selection.contains("&&") {
        selection
            .split("&&")
            .map(|part| {
                let (hierarchy, element) = part
                    .trim()
                    .split_once("::")
                    .ok_or_else(|| ElementSelectionError::MissingHierarchy(part.to_string()))?;
                Ok(format!(
                    "{{{}}}",
                    element_unique_name(dimension, hierarchy.trim(), element.trim())
                ))
            })
            .collect()
    } else {
        let (hierarchy, element) = selection
            .split_once("::")
            .map_or((dimension, selection), |(h, e)| (h.trim(), e.trim()));
        Ok(vec![format!(
            "{{{}}}",
            element_unique_name(dimension, hierarchy, element)
        )])
    }
}

/// Builds the single-cell query behind an element string such as
/// `"Hier1::Elem1 && Hier2::Elem4, Elem9, Elem2"`.
///
/// Selections map to dimensions by position. The last one goes on columns and
/// every other one is cross-joined on rows.
pub fn mdx_from_element_string<S: AsRef<str>>(
    cube: &str,
    dimensions: &[S],
    element_string: &str,
) -> Result<String, ElementSelectionError> {
    let selections: Vec<&str> = element_string.split(',').collect();
    if dimensions.is_empty() || selections.len() != dimensions.len() {
        return Err(ElementSelectionError::Arity {
            selections: selections.len(),
            dimensions: dimensions.len(),
        });
    }
    let last = dimensions.len() - 1;
    let mut rows = Vec::new();
    for (dimension, selection) in dimensions[..last].iter().zip(&selections[..last]) {
        rows.extend(parse_selection(dimension.as_ref(), selection)?);
    }
    let columns = parse_selection(dimensions[last].as_ref(), selections[last])?;
    Ok(format!(
        "SELECT {} ON ROWS, {} ON COLUMNS FROM [{}]",
        rows.join("*"),
        columns.join("*"),
        escape_identifier(cube)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_names() {
        assert_eq!(element_unique_name("d", "h", "a]b"), "[d].[h].[a]]b]");
        assert_eq!(
            dimension_hierarchy_element_from_unique_name("[d].[a]]b]"),
            Ok(("d".into(), "d".into(), "a]b".into()))
        );
        assert_eq!(
            dimension_hierarchy_element_from_unique_name("[d].[h].[e]"),
            Ok(("d".into(), "h".into(), "e".into()))
        );
        assert!(split_unique_name("[d].e").is_err());
        assert_eq!(
            dimension_name_from_unique_name("[Region].[Europe]"),
            Ok("Region".into())
        );
        assert_eq!(
            element_name_from_unique_name("[Region].[Alt].[Europe]"),
            Ok("Europe".into())
        );
    }

    #[test]
    fn cube_names() {
        let cases = [
            "SELECT {[dim3].[e2]} ON COLUMNS, {[dim4].[e5]} ON ROWS FROM [cube] WHERE([dim5]. [e4] )",
            "SELECT {[dim3].[e2]} ON COLUMNS, {[dim4].[e5]} ON ROWS FROM cube WHERE([dim5]. [e4] )",
            "SELECT {[dim3from].[e2where]} ON COLUMNS, {[dim4from].[wheree5]} ON ROWS FROM cube WHERE([dim5]. [e4] )",
            "SELECT {[dim3].[e2]} ON COLUMNS FROM [cube] WHERE([dim5]. [e4] )",
            "SELECT \n{[dim3].[e2]} ON      COLUMNS, \n{[dim4].[e5]} \nON \nROWS \n    FROM    [cube ]\n",
            "SELECT {[dim3from].[e2]} ON COLUMNS, {[dim4where].[e5]} ON ROWS FROM [cube]",
        ];
        for mdx in cases {
            assert_eq!(cube_from_mdx(mdx).as_deref(), Some("cube"), "{mdx}");
        }
    }

    #[test]
    fn mdx_detection() {
        assert!(resembles_mdx("SELECT {[d].[e]} ON COLUMNS, {[d2].[e]} ON ROWS FROM [cube]"));
        assert!(resembles_mdx("select {[d].[e]} on columns from [cube]"));
        assert!(resembles_mdx(
            "WITH MEMBER [d].[e3] AS 1\nSELECT {[d].[e2], [d].[e3]} ON COLUMNS FROM [cube]"
        ));
        assert!(!resembles_mdx("not mdx"));
        assert!(!resembles_mdx("Sales"));
    }

    #[test]
    fn braces() {
        assert_eq!(wrap_in_curly_braces("[d].[e]"), "{[d].[e]}");
        assert_eq!(wrap_in_curly_braces(" {[d].[e]} "), "{[d].[e]}");
    }

    #[test]
    fn coordinates_query() {
        let mut cells = InsensitiveTupleMap::new();
        cells.insert(vec!["A".to_string(), "B".to_string()], 1.0);
        cells.insert(vec!["A".to_string(), "C]".to_string()], 2.0);
        let (mdx, values) = build_mdx_and_values("c", &["d1", "d2"], &cells);
        assert_eq!(
            mdx,
            "SELECT\r\n{([d1].[d1].[A],[d2].[d2].[B]),([d1].[d1].[A],[d2].[d2].[C]]])} ON 0\r\nFROM [c]"
        );
        assert_eq!(values, vec![1.0, 2.0]);
    }

    #[test]
    fn element_string_query() {
        let mdx =
            mdx_from_element_string("c", &["d1", "d2", "d3"], "h1::a && h2::b, e, f").unwrap();
        assert_eq!(
            mdx,
            "SELECT {[d1].[h1].[a]}*{[d1].[h2].[b]}*{[d2].[d2].[e]} ON ROWS, {[d3].[d3].[f]} ON COLUMNS FROM [c]"
        );
        assert!(mdx_from_element_string("c", &["d1"], "a, b").is_err());
    }
}
