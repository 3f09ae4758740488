//! Presence node: wires the protocol components to one store.
//!
//! The node is the central coordinator that:
//! - Runs capture phases through the handshake executor
//! - Owns the anti-replay ledger and prunes expired challenges
//! - Commits composed root identities
//! - Coordinates guardian recovery and sweeps overdue requests
//! - Serves the HTTP API and pushes events over WebSocket
//! - Keeps Prometheus metrics for all of the above

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod metrics;
pub mod node;
pub mod observer;
pub mod shutdown;

pub use config::{NodeConfig, StoreBackend};
pub use error::NodeError;
pub use events::{EventBus, PresenceEvent};
pub use logging::{init_logging, LogFormat};
pub use metrics::NodeMetrics;
pub use node::PresenceNode;
pub use observer::NodeObserver;
pub use shutdown::ShutdownController;
