use presence_crypto::RandomError;
use thiserror::Error;

/// Invalid executor input. Capture outcomes are never errors; they are
/// reported on the finished attempt.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("a handshake needs at least one phase")]
    NoPhases,

    #[error("handshake deadline must be greater than zero")]
    ZeroDeadline,

    #[error("could not generate handshake id: {0}")]
    Random(#[from] RandomError),
}
