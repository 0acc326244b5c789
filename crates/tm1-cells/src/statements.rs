//! TurboIntegrator statements writing cells, and their packing into processes.

use tm1_core::{
    constants::{DEFAULT_PRECISION, ELEMENT_ATTRIBUTES_PREFIX, MAX_STATEMENTS},
    CellValue, ElementType, InsensitiveDict, InsensitiveTupleMap,
};

use crate::process::UnboundProcess;

/// How generated statements write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatementOptions {
    /// `CellIncrementN` instead of `CellPutN` for numeric cells.
    pub increment: bool,
    /// Decimals written for numeric values.
    pub precision: usize,
    /// Guard every statement with `CellIsUpdateable`.
    pub skip_non_updateable: bool,
}

impl Default for StatementOptions {
    fn default() -> Self {
        Self {
            increment: false,
            precision: DEFAULT_PRECISION,
            skip_non_updateable: false,
        }
    }
}

/// `true` for `}ElementAttributes_` cubes, in any case.
pub fn is_attribute_cube(cube: &str) -> bool {
    cube.to_lowercase()
        .starts_with(&ELEMENT_ATTRIBUTES_PREFIX.to_lowercase())
}

/// `'name'` with embedded quotes doubled.
fn quote(name: &str) -> String {
    format!("'{}'", name.replace('\'', "''"))
}

/// String literal for `CellPutS` and `ElementAttrPutS`; line breaks are dropped.
pub fn string_literal(value: &CellValue) -> String {
    let text = value.to_string().replace(['\r', '\n'], "");
    quote(&text)
}

/// Fixed-point numeral with `precision` decimals.
///
/// Numeric strings are re-formatted, other strings pass through untouched so
/// the process reports them. Nulls write zero.
pub fn numeric_literal(value: &CellValue, precision: usize) -> String {
    match value {
        CellValue::Number(n) => format!("{n:.precision$}"),
        CellValue::String(s) => match s.trim().parse::<f64>() {
            Ok(n) => format!("{n:.precision$}"),
            Err(_) => s.clone(),
        },
        CellValue::Null => "0".to_string(),
    }
}

/// Looks `name` up, retrying with the part after `:` for `hierarchy:element` names.
fn lookup_type<'a>(
    types: &InsensitiveDict<ElementType>,
    name: &'a str,
) -> (Option<ElementType>, &'a str) {
    if let Some(element_type) = types.get(name) {
        return (Some(*element_type), name);
    }
    match name.split(':').nth(1) {
        Some(element) => (types.get(element).copied(), element),
        None => (None, name),
    }
}

fn guarded(statement: String, guard: Option<String>) -> String {
    match guard {
        Some(guard) => format!("IF(CellIsUpdateable({guard})=1,{statement},0);"),
        None => format!("{statement};"),
    }
}

/// `CellPutN`, `CellIncrementN` or `CellPutS` per cell.
///
/// The measure (last coordinate) decides: `String` measures are written as
/// strings, everything else, including unknown measures, as numbers.
pub fn cell_update_statements(
    cube: &str,
    cells: &InsensitiveTupleMap<CellValue>,
    element_types: &InsensitiveDict<ElementType>,
    options: StatementOptions,
) -> Vec<String> {
    let cube_arg = quote(cube);
    cells
        .iter()
        .map(|(coordinates, value)| {
            let measure = coordinates.last().map_or("", String::as_str);
            let (measure_type, _) = lookup_type(element_types, measure);
            let elements = coordinates
                .iter()
                .map(|e| quote(e))
                .collect::<Vec<_>>()
                .join(",");
            let statement = if measure_type == Some(ElementType::String) {
                format!("CellPutS({},{cube_arg},{elements})", string_literal(value))
            } else {
                let function = if options.increment {
                    "CellIncrementN"
                } else {
                    "CellPutN"
                };
                format!(
                    "{function}({},{cube_arg},{elements})",
                    numeric_literal(value, options.precision)
                )
            };
            let guard = options
                .skip_non_updateable
                .then(|| format!("{cube_arg}, {elements}"));
            guarded(statement, guard)
        })
        .collect()
}

/// `ElementAttrPutN` or `ElementAttrPutS` per cell of an `}ElementAttributes_` cube.
///
/// The first coordinate is the element, optionally `hierarchy:element`; the
/// last is the attribute. Attributes are strings unless typed `Numeric`.
pub fn attribute_update_statements(
    cube: &str,
    cells: &InsensitiveTupleMap<CellValue>,
    attribute_types: &InsensitiveDict<ElementType>,
    options: StatementOptions,
) -> Vec<String> {
    let dimension = cube
        .get(ELEMENT_ATTRIBUTES_PREFIX.len()..)
        .unwrap_or_default();
    cells
        .iter()
        .map(|(coordinates, value)| {
            let raw_element = coordinates.first().map_or("", String::as_str);
            let (hierarchy, element) = raw_element
                .split_once(':')
                .unwrap_or((dimension, raw_element));
            let raw_attribute = coordinates.last().map_or("", String::as_str);
            let (attribute_type, attribute) = lookup_type(attribute_types, raw_attribute);
            let arguments = [dimension, hierarchy, element, attribute]
                .iter()
                .map(|a| quote(a))
                .collect::<Vec<_>>()
                .join(",");
            let statement = if attribute_type == Some(ElementType::Numeric) {
                format!(
                    "ElementAttrPutN({},{arguments})",
                    numeric_literal(value, options.precision)
                )
            } else {
                format!("ElementAttrPutS({},{arguments})", string_literal(value))
            };
            let guard = options.skip_non_updateable.then(|| {
                format!(
                    "{}, {}, {}",
                    quote(cube),
                    quote(raw_element),
                    quote(attribute)
                )
            });
            guarded(statement, guard)
        })
        .collect()
}

/// Packs statements into processes of at most `2 * MAX_STATEMENTS` statements:
/// the first `MAX_STATEMENTS` after `enable_sandbox` in the prolog, the rest
/// in the epilog. Order is preserved and nothing is dropped.
pub fn batch_statements(statements: &[String], enable_sandbox: &str) -> Vec<UnboundProcess> {
    statements
        .chunks(2 * MAX_STATEMENTS)
        .map(|unit| {
            let split = unit.len().min(MAX_STATEMENTS);
            let (prolog, epilog) = unit.split_at(split);
            UnboundProcess::new()
                .with_prolog(format!("{enable_sandbox}{}", prolog.join("\r")))
                .with_epilog(epilog.join("\r"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(entries: &[(&[&str], CellValue)]) -> InsensitiveTupleMap<CellValue> {
        entries
            .iter()
            .map(|(coordinates, value)| {
                (
                    coordinates.iter().map(|c| c.to_string()).collect(),
                    value.clone(),
                )
            })
            .collect()
    }

    #[test]
    fn numeric_formatting() {
        assert_eq!(numeric_literal(&CellValue::Number(123.456789), 2), "123.46");
        assert_eq!(numeric_literal(&CellValue::from("1.5"), 3), "1.500");
        assert_eq!(numeric_literal(&CellValue::from("abc"), 3), "abc");
        assert_eq!(numeric_literal(&CellValue::Null, 3), "0");
    }

    #[test]
    fn cell_statements() {
        let mut types = InsensitiveDict::new();
        types.insert("Comment".to_string(), ElementType::String);
        let cells = cells(&[
            (&["e1", "Units"], CellValue::Number(2.0)),
            (&["e'2", "h:Comment"], CellValue::from("it's\r\nfine")),
        ]);
        let options = StatementOptions {
            precision: 1,
            ..StatementOptions::default()
        };
        let statements = cell_update_statements("c", &cells, &types, options);
        assert_eq!(statements[0], "CellPutN(2.0,'c','e1','Units');");
        assert_eq!(
            statements[1],
            "CellPutS('it''sfine','c','e''2','h:Comment');"
        );

        let options = StatementOptions {
            increment: true,
            skip_non_updateable: true,
            precision: 0,
        };
        let statements = cell_update_statements("c", &cells, &types, options);
        assert_eq!(
            statements[0],
            "IF(CellIsUpdateable('c', 'e1','Units')=1,CellIncrementN(2,'c','e1','Units'),0);"
        );
    }

    #[test]
    fn attribute_statements() {
        let mut types = InsensitiveDict::new();
        types.insert("Size".to_string(), ElementType::Numeric);
        let cells = cells(&[
            (&["alt:e1", "Size"], CellValue::Number(3.0)),
            (&["e2", "Color"], CellValue::from("red")),
        ]);
        let statements = attribute_update_statements(
            "}ElementAttributes_Product",
            &cells,
            &types,
            StatementOptions {
                precision: 0,
                ..StatementOptions::default()
            },
        );
        assert_eq!(
            statements,
            vec![
                "ElementAttrPutN(3,'Product','alt','e1','Size');",
                "ElementAttrPutS('red','Product','Product','e2','Color');",
            ]
        );
        assert!(is_attribute_cube("}elementattributes_Product"));
        assert!(!is_attribute_cube("Sales"));
    }

    #[test]
    fn batches_split_prolog_and_epilog() {
        let statements: Vec<String> = (0..2 * MAX_STATEMENTS + 3)
            .map(|i| format!("s{i};"))
            .collect();
        let units = batch_statements(&statements, "sb;");
        assert_eq!(units.len(), 2);
        assert!(units[0].prolog().starts_with("sb;s0;\r"));
        assert_eq!(units[0].prolog().matches('\r').count(), MAX_STATEMENTS - 1);
        assert_eq!(units[0].epilog().split('\r').count(), MAX_STATEMENTS);
        let tail = statements[2 * MAX_STATEMENTS..].join("\r");
        assert_eq!(units[1].prolog(), format!("sb;{tail}"));
        assert_eq!(units[1].epilog(), "");
        assert!(batch_statements(&[], "").is_empty());
    }
}
