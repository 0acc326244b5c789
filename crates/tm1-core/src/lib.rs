//! Shared vocabulary for the TM1 REST client crates: cell values, element types,
//! case and whitespace insensitive collections, OData URL helpers and MDX helpers.

pub mod cell;
pub mod constants;
pub mod element;
pub mod errors;
pub mod insensitive;
pub mod mdx;
pub mod url;

pub use cell::CellValue;
pub use element::ElementType;
pub use insensitive::{InsensitiveDict, InsensitiveMap, InsensitiveSet, InsensitiveTupleMap};

/// Ordered element names addressing one cell, one entry per dimension.
pub type ElementTuple = Vec<String>;

/// Opaque server-side identifier of a cellset.
pub type CellsetId = String;

/// Re-exports for the most common types.
pub mod prelude {
    pub use crate::{
        cell::{cell_is_updateable, CellValue},
        element::ElementType,
        insensitive::{InsensitiveDict, InsensitiveMap, InsensitiveSet, InsensitiveTupleMap},
        url::{add_url_parameters, format_url},
        CellsetId, ElementTuple,
    };
}
