//! Cell values and the `Updateable` flags of cells.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Value of a single cube cell as exchanged with the server.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    /// Numeric cell.
    Number(f64),
    /// String cell.
    String(String),
    /// Empty cell, or a value the server left out.
    #[default]
    Null,
}

impl CellValue {
    /// The number of a numeric value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The text of a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// `true` for [`CellValue::Null`] only; see [`CellValue::is_empty`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// `true` for string values, including empty ones.
    pub fn is_string(&self) -> bool {
        matches!(self, Self::String(_))
    }

    /// `true` for nulls, zeros and empty strings, the cells a zero-suppressed query skips.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Number(n) => *n == 0.0,
            Self::String(s) => s.is_empty(),
            Self::Null => true,
        }
    }

    /// Adds `current` to a numeric value, as used for incremental writes.
    ///
    /// Nulls count as zero. String values are written as given.
    #[must_use]
    pub fn increment_by(&self, current: &CellValue) -> CellValue {
        match (self, current) {
            (Self::Number(a), Self::Number(b)) => Self::Number(a + b),
            (Self::Null, Self::Number(b)) => Self::Number(*b),
            _ => self.clone(),
        }
    }
}

impl Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Null => Ok(()),
        }
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for CellValue {
    #[allow(clippy::cast_precision_loss)]
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<i32> for CellValue {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Flags packed into the `Updateable` cell property.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CellUpdateableProperty {
    /// A rule calculates the cell.
    RuleIsApplied,
    /// The cell rejects writes.
    CellIsNotUpdateable,
}

impl CellUpdateableProperty {
    /// Bit position of the flag.
    pub fn bit(&self) -> u32 {
        match self {
            Self::RuleIsApplied => 2,
            Self::CellIsNotUpdateable => 28,
        }
    }
}

/// Tests one flag of the `Updateable` bit field.
pub fn extract_cell_updateable_property(flags: u64, property: CellUpdateableProperty) -> bool {
    (flags >> property.bit()) & 1 == 1
}

/// Whether a cell with the given `Updateable` flags accepts writes.
pub fn cell_is_updateable(flags: u64) -> bool {
    !extract_cell_updateable_property(flags, CellUpdateableProperty::CellIsNotUpdateable)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn updateable_flags() {
        assert!(extract_cell_updateable_property(
            268_435_716,
            CellUpdateableProperty::RuleIsApplied
        ));
        assert!(!extract_cell_updateable_property(
            258,
            CellUpdateableProperty::RuleIsApplied
        ));
        assert!(cell_is_updateable(258));
        assert!(!cell_is_updateable(268_435_716));
    }

    #[test]
    fn untagged_json() {
        let values: Vec<CellValue> = serde_json::from_str(r#"[1.5, "a", null, 3]"#).unwrap();
        assert_eq!(
            values,
            vec![
                CellValue::Number(1.5),
                CellValue::from("a"),
                CellValue::Null,
                CellValue::Number(3.0)
            ]
        );
    }

    #[test]
    fn increment() {
        let delta = CellValue::from(2.0);
        assert_eq!(
            delta.increment_by(&CellValue::from(3.0)),
            CellValue::from(5.0)
        );
        assert_eq!(delta.increment_by(&CellValue::Null), CellValue::from(2.0));
        assert_eq!(
            CellValue::from("x").increment_by(&CellValue::from(1.0)),
            CellValue::from("x")
        );
    }
}
