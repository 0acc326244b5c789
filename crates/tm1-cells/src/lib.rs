//! Reading and writing cube cells over the TM1 REST API.
//!
//! [`service::CellService`] owns the cellset lifecycle and every read shape,
//! the direct `tm1.Update` write paths, changesets, the transaction log and the
//! unbound-process write path. [`batch`] fans large writes out over a worker
//! pool. The shape extractors in [`extract`] and the statement generators in
//! [`statements`] are pure and usable without a server.

use thiserror::Error;
use tm1_core::errors::{ElementSelectionError, UniqueNameError};
use tm1_rest::RestError;

pub mod batch;
pub mod cellset;
pub mod extract;
pub mod process;
pub mod query;
pub mod service;
pub mod statements;
pub mod write;

/// Shorthand for results whose error is [`CellError`].
pub type CellResult<T> = Result<T, CellError>;

/// Everything that can go wrong reading or writing cells.
#[derive(Error, Debug)]
pub enum CellError {
    /// The server or the transport failed.
    #[error("{0}")]
    Rest(#[from] RestError),
    /// A response body did not have the expected shape.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    /// CSV rendering failed.
    #[error("{0}")]
    Csv(#[from] csv::Error),
    /// A member unique name could not be split.
    #[error("{0}")]
    UniqueName(#[from] UniqueNameError),
    /// An element selection string did not fit the cube.
    #[error("{0}")]
    ElementSelection(#[from] ElementSelectionError),
    /// The cell count is not a multiple of the row count.
    #[error("cellset with {cells} cells cannot be split into {rows} rows")]
    MalformedCellset {
        /// Cells returned.
        cells: usize,
        /// Rows on the row axis.
        rows: usize,
    },
    /// No unbound process completed successfully.
    #[error("write failed: statuses {statuses:?}, error logs {error_log_files:?}")]
    TotalWriteFailure {
        /// Status of every failed process.
        statuses: Vec<String>,
        /// Error log files the failed processes left behind.
        error_log_files: Vec<String>,
    },
    /// Some of the submitted units (or chunks) failed.
    #[error(
        "write partially failed after {attempts} attempts: statuses {statuses:?}, error logs {error_log_files:?}"
    )]
    PartialWriteFailure {
        /// Status of every failed process.
        statuses: Vec<String>,
        /// Error log files the failed processes left behind.
        error_log_files: Vec<String>,
        /// Units or chunks submitted in total.
        attempts: usize,
    },
    /// The named sandbox does not exist on the server.
    #[error("sandbox not found: {0}")]
    SandboxNotFound(String),
    /// Zeroing out a cube region did not complete.
    #[error("failed to clear cube '{cube}' with mdx: {mdx}")]
    ClearFailed {
        /// Cube being cleared.
        cube: String,
        /// Query selecting the cleared region.
        mdx: String,
    },
    /// A caller supplied argument cannot be used.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The server answered with something the client cannot interpret.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
    /// The worker pool for batched writes could not be built.
    #[error("{0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl CellError {
    /// `true` for the two write failure kinds, which carry process statuses.
    pub fn is_write_failure(&self) -> bool {
        matches!(
            self,
            Self::TotalWriteFailure { .. } | Self::PartialWriteFailure { .. }
        )
    }

    /// HTTP status of a transport failure, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Rest(e) => e.status_code(),
            _ => None,
        }
    }
}

/// The types most callers need, in one import.
pub mod prelude {
    pub use crate::{
        batch::{partition, write_batched},
        cellset::{Cellset, CellsetSource},
        extract::{CellsetComposition, CsvOptions, RawCellset, UiArray, UiHeader},
        process::{ProcessExecuteStatus, ProcessExecution, UnboundProcess},
        query::CellsetQuery,
        service::CellService,
        statements::StatementOptions,
        write::WriteOptions,
        CellError, CellResult,
    };
}
