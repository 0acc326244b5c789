//! Errors raised by the shared parsers.

use thiserror::Error;

/// Raised when a textual or numeric element type is not recognized.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown element type: {0}")]
pub struct ParseElementTypeError(pub String);

/// Raised when a string is not a bracketed `[dimension].[hierarchy].[element]` name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid unique element name: {0}")]
pub struct UniqueNameError(pub String);

/// Raised when an element selection does not line up with the cube's dimensions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ElementSelectionError {
    /// More comma separated selections than dimensions, or none at all.
    #[error("{selections} element selections for {dimensions} dimensions")]
    Arity {
        /// Number of comma separated selections.
        selections: usize,
        /// Number of dimensions of the cube.
        dimensions: usize,
    },
    /// A `&&` separated part is missing its `Hierarchy::` qualifier.
    #[error("hierarchy missing in element selection: {0}")]
    MissingHierarchy(String),
}
