//! Error taxonomy shared by the graph model, the search engine and the bindings.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, HybridError>;

#[derive(Error, Debug)]
pub enum HybridError {
    /// Wrong owning graph, deleted handle, or malformed input tree.
    #[error("Structural error: {0}")]
    Structural(String),

    /// The search was aborted through its cancellation token.
    #[error("Search cancelled")]
    Cancelled,

    /// A single search task failed; the other tasks kept running.
    #[error("Worker {task} failed: {reason}")]
    WorkerFailure { task: usize, reason: String },

    /// Every search task failed, so no result can be trusted.
    #[error("All {count} search workers failed, first failure: {reason}")]
    AllWorkersFailed { count: usize, reason: String },

    #[error("Failed to parse Newick tree: {0}")]
    Parse(String),

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HybridError {
    pub(crate) fn structural(msg: impl Into<String>) -> Self {
        HybridError::Structural(msg.into())
    }
}
