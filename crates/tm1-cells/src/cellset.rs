//! Server-side cellsets as scoped resources.

use std::sync::Arc;

use tm1_core::url::{add_url_parameters, format_url};
use tm1_rest::Transport;
use tracing::{debug, warn};

use crate::{query::cellset_url, CellResult};

/// Where a cellset comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellsetSource<'a> {
    /// An MDX query.
    Mdx(&'a str),
    /// A saved cube view.
    View {
        /// Cube the view belongs to.
        cube: &'a str,
        /// View name.
        view: &'a str,
        /// Look the view up among the user's private views.
        private: bool,
    },
}

impl CellsetSource<'_> {
    /// POST URL that materializes the cellset.
    pub fn create_url(&self, sandbox: Option<&str>) -> String {
        let url = match self {
            Self::Mdx(_) => "/api/v1/ExecuteMDX".to_string(),
            Self::View {
                cube,
                view,
                private,
            } => {
                let collection = if *private { "PrivateViews" } else { "Views" };
                format_url(
                    &format!("/api/v1/Cubes('{{}}')/{collection}('{{}}')/tm1.Execute"),
                    &[cube, view],
                )
            }
        };
        add_url_parameters(&url, &[("!sandbox", sandbox)])
    }
}

/// Deletes a cellset, treating an already removed one as deleted.
pub fn delete_cellset(
    transport: &dyn Transport,
    cellset_id: &str,
    sandbox: Option<&str>,
) -> CellResult<()> {
    let url = add_url_parameters(&cellset_url(cellset_id), &[("!sandbox", sandbox)]);
    match transport.delete(&url) {
        Ok(_) => {
            debug!(cellset = cellset_id, "deleted cellset");
            Ok(())
        }
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// An open cellset on the server.
///
/// The cellset is deleted by [`Cellset::finish`], or by `Drop` on any path
/// that does not finish it. [`Cellset::keep`] hands the ID to the caller
/// instead.
pub struct Cellset {
    transport: Arc<dyn Transport>,
    id: String,
    sandbox: Option<String>,
    released: bool,
}

impl std::fmt::Debug for Cellset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cellset")
            .field("id", &self.id)
            .field("sandbox", &self.sandbox)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl Cellset {
    /// Takes ownership of the server-side cellset `id`.
    pub fn new(
        transport: Arc<dyn Transport>,
        id: impl Into<String>,
        sandbox: Option<&str>,
    ) -> Self {
        Self {
            transport,
            id: id.into(),
            sandbox: sandbox.map(str::to_string),
            released: false,
        }
    }

    /// Server-side cellset ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Sandbox the cellset was created in, if any.
    pub fn sandbox(&self) -> Option<&str> {
        self.sandbox.as_deref()
    }

    /// Deletes the cellset and passes `result` through.
    ///
    /// A failed delete only surfaces when `result` itself succeeded.
    pub fn finish<T>(mut self, result: CellResult<T>) -> CellResult<T> {
        self.released = true;
        let deleted = delete_cellset(self.transport.as_ref(), &self.id, self.sandbox());
        match (result, deleted) {
            (Err(e), Err(cleanup)) => {
                warn!(cellset = %self.id, error = %cleanup, "failed to delete cellset");
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Ok(_), Err(e)) => Err(e),
            (Ok(value), Ok(())) => Ok(value),
        }
    }

    /// Leaves the cellset on the server and returns its ID.
    pub fn keep(mut self) -> String {
        self.released = true;
        std::mem::take(&mut self.id)
    }
}

impl Drop for Cellset {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = delete_cellset(self.transport.as_ref(), &self.id, self.sandbox()) {
            warn!(cellset = %self.id, error = %e, "failed to delete cellset");
        }
    }
}
