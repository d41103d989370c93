//! Error taxonomy for the hub store event handler.

/// Errors the core surfaces to its callers. The core never retries: every
/// failure is returned as one of these typed variants.
#[derive(Debug, thiserror::Error)]
pub enum HubStoreError {
    /// Unknown store kind, unknown event kind, ID overflow, or malformed
    /// range bounds.
    #[error("invalid param: {0}")]
    InvalidParam(String),

    /// Any KV-level error encountered during commit, read, or prune.
    #[error("storage failure: {0}")]
    StorageFailure(String),

    /// The commit slot's queue overflowed or the acquire timed out.
    #[error("too busy")]
    TooBusy,

    /// `get_event` was called for an ID that has no corresponding entry.
    #[error("event not found")]
    NotFound,
}

/// Convenience alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, HubStoreError>;
