//! RPC error types and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use presence_identity::{CommitError, CompositionError};
use presence_ledger::{LedgerError, RejectionKind};
use presence_recovery::RecoveryError;
use presence_store::StoreError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Proof refused by the anti-replay ledger. Always reported as fraud.
    #[error("proof refused: {}", .0.as_str())]
    Fraud(RejectionKind),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("expired: {0}")]
    Gone(String),

    #[error("busy: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl RpcError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Fraud(_) | Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Gone(_) => StatusCode::GONE,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::Fraud(kind) => json!({ "error": fraud_message(*kind), "fraud": true }),
            Self::Internal(detail) => {
                tracing::error!("request failed: {detail}");
                json!({ "error": "internal error" })
            }
            other => json!({ "error": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

fn fraud_message(kind: RejectionKind) -> &'static str {
    match kind {
        RejectionKind::Blocked => "source blocked",
        RejectionKind::MissingSession => "no session",
        RejectionKind::MalformedProof => "malformed proof",
        RejectionKind::ChallengeMismatch => "challenge mismatch or expired",
        RejectionKind::Replay => "replay detected",
    }
}

impl From<StoreError> for RpcError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(key) => RpcError::NotFound(key),
            other => RpcError::Internal(other.to_string()),
        }
    }
}

impl From<LedgerError> for RpcError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::MalformedChallenge(_) | LedgerError::MissingOperator => {
                RpcError::InvalidRequest(e.to_string())
            }
            LedgerError::Store(s) => s.into(),
            LedgerError::Random(_) => RpcError::Internal(e.to_string()),
        }
    }
}

impl From<CompositionError> for RpcError {
    fn from(e: CompositionError) -> Self {
        RpcError::InvalidRequest(e.to_string())
    }
}

impl From<CommitError> for RpcError {
    fn from(e: CommitError) -> Self {
        match e {
            CommitError::Composition(c) => c.into(),
            CommitError::Store(s) => RpcError::Internal(s.to_string()),
        }
    }
}

impl From<RecoveryError> for RpcError {
    fn from(e: RecoveryError) -> Self {
        match e {
            RecoveryError::NotFound(_) | RecoveryError::UnknownSubject(_) => {
                RpcError::NotFound(e.to_string())
            }
            RecoveryError::InsufficientGuardians { .. } => RpcError::InvalidRequest(e.to_string()),
            RecoveryError::NotAGuardian(_) => RpcError::Forbidden(e.to_string()),
            RecoveryError::AlreadyResolved(_)
            | RecoveryError::NotApproved(_)
            | RecoveryError::PresenceReused(_) => RpcError::Conflict(e.to_string()),
            RecoveryError::Expired => RpcError::Gone(e.to_string()),
            RecoveryError::Contended(_) => RpcError::Unavailable(e.to_string()),
            RecoveryError::Random(_) => RpcError::Internal(e.to_string()),
            RecoveryError::Store(s) => s.into(),
        }
    }
}
