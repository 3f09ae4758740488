use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("ledger error: {0}")]
    Ledger(#[from] presence_ledger::LedgerError),

    #[error("recovery error: {0}")]
    Recovery(#[from] presence_recovery::RecoveryError),

    #[error("handshake error: {0}")]
    Handshake(#[from] presence_handshake::HandshakeError),

    #[error("handshake {0}, no presence proof to admit")]
    NotGranted(presence_types::HandshakeStatus),

    #[error("store error: {0}")]
    Store(#[from] presence_store::StoreError),

    #[error("LMDB error: {0}")]
    Lmdb(#[from] presence_store_lmdb::LmdbError),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("shutdown timeout")]
    ShutdownTimeout,

    #[error("{0}")]
    Other(String),
}
