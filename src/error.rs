use thiserror::Error;

/// Failure taxonomy for chapter fetching and job management.
///
/// A challenge page that never resolves is deliberately absent here: the
/// wait loop degrades to best effort instead of failing (see
/// [`crate::fetcher`]).
#[derive(Debug, Error)]
pub enum Error {
    #[error("rendering {url} timed out after {timeout_secs}s")]
    RenderTimeout { url: String, timeout_secs: u64 },

    #[error("no usable content found at {url}")]
    ExtractionFailed { url: String },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
