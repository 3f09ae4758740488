use thiserror::Error;

/// Failures surfaced by any store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The record a mutation targets does not exist.
    #[error("no record for {0}")]
    NotFound(String),

    /// A record was created twice under the same id.
    #[error("record {0} already exists")]
    Duplicate(String),

    #[error("store backend failed: {0}")]
    Backend(String),

    #[error("record encoding failed: {0}")]
    Serialization(String),
}
