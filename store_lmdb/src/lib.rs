//! LMDB storage backend for the presence protocol.
//!
//! Implements all storage traits from `presence-store` using the `heed` LMDB bindings.
//! Each logical store maps to one LMDB database within a single environment.
//! LMDB allows one write transaction at a time, so every read-modify-write
//! done inside a single write transaction is atomic with respect to other
//! writers, in this process or another.

pub mod attestation;
pub mod challenge;
pub mod environment;
pub mod error;
pub mod fraud;
pub mod identity;
pub mod nonce;
pub mod recovery;

pub use environment::LmdbEnvironment;
pub use error::LmdbError;
