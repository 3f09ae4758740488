//! Anti-replay ledger.
//!
//! Issues per-session one-time challenges, burns one-time handshake nonces,
//! and blocks source addresses that present forged or replayed proofs. A
//! presence proof only counts once it has passed [`AntiReplayLedger::admit`].

pub mod admission;
pub mod client_data;
pub mod config;
pub mod error;
pub mod fraud;
pub mod ledger;
pub mod pruner;

pub use admission::{
    Admission, AdmissionRequest, AdmittedPresence, AdmittedProof, ProofAdmission, Rejection,
    RejectionKind,
};
pub use client_data::decode_client_data_challenge;
pub use config::LedgerConfig;
pub use error::LedgerError;
pub use fraud::FraudReason;
pub use ledger::AntiReplayLedger;
pub use pruner::spawn_pruner;
