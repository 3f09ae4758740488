//! Root identity composer.
//!
//! A root identity is the SHA-256 of an ordered list of factor hashes joined
//! with the ASCII unit separator. The factors themselves are held only as
//! long as it takes to commit the root.

pub mod committer;
pub mod compose;
pub mod error;
pub mod holder;

pub use committer::RootCommitter;
pub use compose::{compose_root, identity_anchor_hash, is_hex_digest, FACTOR_SEPARATOR};
pub use error::{CommitError, CompositionError};
pub use holder::FactorHolder;
