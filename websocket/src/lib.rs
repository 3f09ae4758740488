//! WebSocket server for real-time updates.
//!
//! Clients can subscribe to:
//! - Recovery progress (approval counts, status changes)
//! - Fraud alerts and operator unblocks
//! - Admitted presences

pub mod error;
pub mod server;
pub mod subscriptions;

pub use error::WsError;
pub use server::{WebSocketServer, WsState};
pub use subscriptions::{
    ClientMessage, ClientSubscriptions, ServerMessage, SubscriptionEvent, SubscriptionFilter,
    SubscriptionTopic,
};
