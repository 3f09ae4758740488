use presence_store::StoreError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompositionError {
    #[error("no factors supplied")]
    NoFactors,

    #[error("factor {index} is empty")]
    EmptyFactor { index: usize },

    #[error("factor {index} contains the reserved separator byte")]
    ReservedSeparator { index: usize },

    #[error("factor {index} is not a 64-character hex digest")]
    NotADigest { index: usize },
}

#[derive(Debug, Error)]
pub enum CommitError {
    #[error("composition failed: {0}")]
    Composition(#[from] CompositionError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
