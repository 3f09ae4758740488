//! Cryptographic primitives for the presence protocol.
//!
//! - **SHA-256** for root identity composition and identity-anchor hashing
//! - **Blake2b** for short log fingerprints of sensitive values
//! - OS randomness for challenges and identifiers
//! - Lenient base64url decoding of challenges and constant-time comparison

pub mod compare;
pub mod encoding;
pub mod hash;
pub mod random;

pub use compare::constant_time_eq;
pub use encoding::{decode_base64url, encode_base64url, DecodeError};
pub use hash::{blake2b_256, fingerprint, sha256, sha256_hex, sha256_multi};
pub use random::{random_hex, OsRandom, RandomError, RandomSource};
