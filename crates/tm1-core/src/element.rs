//! Element types and their textual and numeric identifiers.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum::EnumIter;

use crate::errors::ParseElementTypeError;

/// Kind of a dimension element.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, EnumIter)]
pub enum ElementType {
    /// Leaf holding numbers.
    #[default]
    Numeric,
    /// Leaf holding text.
    String,
    /// Aggregate of weighted components.
    Consolidated,
}

impl ElementType {
    /// Parses the textual type (`Numeric`, `String`, `Consolidated`) or its numeric code (1, 2, 3).
    pub fn from_identifier(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "numeric" | "1" => Some(Self::Numeric),
            "string" | "2" => Some(Self::String),
            "consolidated" | "3" => Some(Self::Consolidated),
            _ => None,
        }
    }

    /// Type for the numeric code the server reports (1, 2 or 3).
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Numeric),
            2 => Some(Self::String),
            3 => Some(Self::Consolidated),
            _ => None,
        }
    }

    /// Textual type as the server spells it.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Numeric => "Numeric",
            Self::String => "String",
            Self::Consolidated => "Consolidated",
        }
    }

    /// Numeric code of the type.
    pub fn code(&self) -> i64 {
        match self {
            Self::Numeric => 1,
            Self::String => 2,
            Self::Consolidated => 3,
        }
    }

    /// `true` for [`ElementType::Consolidated`].
    pub fn is_consolidated(&self) -> bool {
        matches!(self, Self::Consolidated)
    }
}

impl Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ElementType {
    type Err = ParseElementTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_identifier(s).ok_or_else(|| ParseElementTypeError(s.to_string()))
    }
}

impl Serialize for ElementType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// The server answers with either the name or the numeric code depending on the endpoint.
impl<'de> Deserialize<'de> for ElementType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Code(i64),
            Name(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Code(code) => Self::from_code(code)
                .ok_or_else(|| serde::de::Error::custom(ParseElementTypeError(code.to_string()))),
            Raw::Name(name) => name.parse().map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn names_and_codes_agree() {
        for element_type in ElementType::iter() {
            assert_eq!(
                ElementType::from_code(element_type.code()),
                Some(element_type)
            );
            assert_eq!(
                element_type.as_str().parse::<ElementType>(),
                Ok(element_type)
            );
        }
    }

    #[test]
    fn deserializes_both_representations() {
        let by_name: ElementType = serde_json::from_str("\"Consolidated\"").unwrap();
        let by_code: ElementType = serde_json::from_str("2").unwrap();
        assert_eq!(by_name, ElementType::Consolidated);
        assert_eq!(by_code, ElementType::String);
        assert!(serde_json::from_str::<ElementType>("7").is_err());
    }
}
