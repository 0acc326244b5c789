//! Dimension elements, edges, element attributes and hierarchies.
//!
//! [`service::ElementService`] covers single elements and element-level
//! queries, [`hierarchy::HierarchyService`] whole hierarchies. Consolidation
//! trees are walked iteratively by [`tree`].

use thiserror::Error;
use tm1_cells::CellError;
use tm1_rest::RestError;

pub mod hierarchy;
pub mod models;
pub mod service;
pub mod tree;

/// Shorthand for results whose error is [`ElementError`].
pub type ElementResult<T> = Result<T, ElementError>;

/// Failures of element and hierarchy operations.
#[derive(Error, Debug)]
pub enum ElementError {
    /// The server or the transport failed.
    #[error("{0}")]
    Rest(#[from] RestError),
    /// A response body did not have the expected shape.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    /// Failure of a cellset read or write issued on behalf of an element query.
    #[error("{0}")]
    Cell(#[from] CellError),
    /// A filter named an element attribute the dimension lacks.
    #[error("attribute '{attribute}' does not exist in dimension '{dimension}'")]
    AttributeNotFound {
        /// Dimension searched.
        dimension: String,
        /// Attribute asked for.
        attribute: String,
    },
    /// The server answered with something the client cannot interpret.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl ElementError {
    /// HTTP status of the underlying server failure, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Rest(e) => e.status_code(),
            Self::Cell(e) => e.status_code(),
            _ => None,
        }
    }
}

/// The types most callers need, in one import.
pub mod prelude {
    pub use crate::{
        hierarchy::{HierarchyService, HierarchySummary},
        models::{AttributeType, Edge, Element, ElementAttribute, Hierarchy},
        service::{ElementService, ElementSet, SetMdxQuery},
        tree::ComponentNode,
        ElementError, ElementResult,
    };
}
