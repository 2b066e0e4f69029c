/// Unified error type for codegraph.
#[derive(Debug, thiserror::Error)]
pub enum CodegraphError {
    /// Malformed or unreadable source. The file is skipped, the batch goes on.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A reference matched several candidates. Counted, never escalated.
    #[error("Ambiguous reference: {0}")]
    ResolutionAmbiguity(String),

    /// The backing store could not be reached.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// The store detected a concurrent modification.
    #[error("Store conflict: {0}")]
    StoreConflict(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid node kind: {0}")]
    InvalidNodeKind(String),

    #[error("Invalid relationship type: {0}")]
    InvalidRelationshipType(String),

    #[error("Invalid confidence: {0}")]
    InvalidConfidence(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CodegraphError {
    /// Whether the failed operation may succeed if attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::StoreConflict(_))
    }

    /// Whether the error must be surfaced immediately instead of retried or skipped.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}
