//! HTTP API for the presence node.
//!
//! Provides endpoints for:
//! - Issuing session challenges
//! - Admitting presence proofs and attesting addresses
//! - Committing root identities
//! - Guardian recovery requests, approvals and denials
//! - Fraud-block administration
//! - Prometheus metrics

pub mod client;
pub mod error;
pub mod handlers;
pub mod pagination;
pub mod server;
pub mod state;

pub use client::{ClientContext, SESSION_COOKIE};
pub use error::RpcError;
pub use server::{router, serve, RpcServer};
pub use state::{NoopObserver, RpcObserver, RpcState};
