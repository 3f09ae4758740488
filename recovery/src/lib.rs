//! Guardian quorum recovery.
//!
//! A recovery request moves from `PENDING` to exactly one of `APPROVED`,
//! `DENIED` or `EXPIRED`. Transitions are pure functions over the stored
//! record ([`state_machine`]); the [`RecoveryCoordinator`] applies them with
//! a compare-and-swap loop so concurrent guardians never over-count.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod progress;
pub mod state_machine;

pub use config::RecoveryConfig;
pub use coordinator::{ApprovalReceipt, RecoveryCoordinator};
pub use error::RecoveryError;
pub use progress::RecoveryProgress;
pub use state_machine::{ApprovalOutcome, DenialOutcome};
