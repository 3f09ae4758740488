use presence_crypto::{DecodeError, RandomError};
use presence_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("challenge is not valid base64url: {0}")]
    MalformedChallenge(DecodeError),

    #[error("unblock requires a named operator")]
    MissingOperator,

    #[error("random source failed: {0}")]
    Random(#[from] RandomError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
