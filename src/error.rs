//! Error types surfaced by loaders and the storage layer.

/// The error half of a per-key load result.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LoadError<E> {
    /// The batch function reported a failure for this key, either isolated to the key or shared
    /// by the whole batch.
    #[error("fetch failed: {0}")]
    Fetch(E),

    /// The owning request was cancelled.
    #[error("load cancelled")]
    Cancelled,

    /// The loader's worker stopped without being cancelled, e.g. after its `BatchFunction`
    /// returned a result list that did not line up with its keys. Every later load on the same
    /// loader fails the same way.
    #[error("loader worker stopped unexpectedly")]
    WorkerFailed,
}

impl<E> LoadError<E> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, LoadError::Cancelled)
    }

    /// Returns the fetch error, if any.
    pub fn fetch_error(&self) -> Option<&E> {
        match self {
            LoadError::Fetch(e) => Some(e),
            LoadError::Cancelled | LoadError::WorkerFailed => None,
        }
    }
}

/// Failures of the relational store behind the loaders.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached at all.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store rejected or failed the query.
    #[error("query failed: {0}")]
    Query(String),
}
