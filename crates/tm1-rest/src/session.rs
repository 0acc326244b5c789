//! Named connections shared across callers.

use std::sync::Arc;

use dashmap::{mapref::entry::Entry, DashMap};
use tracing::info;

/// Live connections keyed by workspace name.
///
/// A connection is created on first use and lives until [`SessionRegistry::close`]
/// or [`SessionRegistry::close_all`]; nothing is evicted implicitly.
pub struct SessionRegistry<T> {
    sessions: DashMap<String, Arc<T>>,
}

impl<T> Default for SessionRegistry<T> {
    fn default() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }
}

impl<T> SessionRegistry<T> {
    /// Registry without sessions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the session for `name`, calling `connect` only if none exists.
    ///
    /// Concurrent callers for the same name wait for a single `connect`.
    pub fn get_or_connect<F, E>(&self, name: &str, connect: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        match self.sessions.entry(name.to_string()) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let session = Arc::new(connect()?);
                entry.insert(Arc::clone(&session));
                info!(workspace = name, "opened session");
                Ok(session)
            }
        }
    }

    /// The live session for `name`, without connecting.
    pub fn get(&self, name: &str) -> Option<Arc<T>> {
        self.sessions
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Tears down the session for `name`, returning it if it existed.
    pub fn close(&self, name: &str) -> Option<Arc<T>> {
        let removed = self.sessions.remove(name).map(|(_, session)| session);
        if removed.is_some() {
            info!(workspace = name, "closed session");
        }
        removed
    }

    /// Tears down every session.
    pub fn close_all(&self) {
        self.sessions.clear();
    }

    /// Workspace names with a live session, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// `true` without live sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
