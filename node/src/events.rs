//! Events emitted by the presence components for subscribers.

use presence_ledger::RejectionKind;
use presence_types::{HandshakeId, HandshakeStatus, IdentityAnchor, SourceAddress};

/// Node-level events that observers can subscribe to via the [`EventBus`].
#[derive(Clone, Debug)]
pub enum PresenceEvent {
    /// A handshake attempt finished.
    HandshakeFinished {
        handshake_id: HandshakeId,
        status: HandshakeStatus,
        elapsed_ms: u64,
    },
    /// A proof passed the anti-replay ledger.
    Admitted {
        source: SourceAddress,
        handshake_id: HandshakeId,
    },
    /// A proof was refused and reported as fraud.
    FraudAlert {
        source: SourceAddress,
        kind: RejectionKind,
        newly_blocked: bool,
    },
    /// An operator lifted a block.
    SourceUnblocked {
        source: SourceAddress,
        operator: String,
    },
    /// A root identity was committed for an anchor.
    RootCommitted { anchor: IdentityAnchor },
}

/// Synchronous fan-out event bus for presence events.
///
/// Listeners are invoked inline on the emitting thread; keep handlers fast to
/// avoid stalling request handling.
pub struct EventBus {
    listeners: Vec<Box<dyn Fn(&PresenceEvent) + Send + Sync>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, listener: Box<dyn Fn(&PresenceEvent) + Send + Sync>) {
        self.listeners.push(listener);
    }

    pub fn emit(&self, event: &PresenceEvent) {
        for listener in &self.listeners {
            listener(event);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    #[test]
    fn emit_calls_all_listeners() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut bus = EventBus::new();

        let c1 = Arc::clone(&counter);
        bus.subscribe(Box::new(move |_| {
            c1.fetch_add(1, Ordering::SeqCst);
        }));

        let c2 = Arc::clone(&counter);
        bus.subscribe(Box::new(move |_| {
            c2.fetch_add(10, Ordering::SeqCst);
        }));

        bus.emit(&PresenceEvent::RootCommitted {
            anchor: IdentityAnchor::new("+15550100"),
        });

        assert_eq!(counter.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn listener_receives_correct_event_variant() {
        let frauds = Arc::new(AtomicUsize::new(0));
        let mut bus = EventBus::new();

        let f = Arc::clone(&frauds);
        bus.subscribe(Box::new(move |event| {
            if let PresenceEvent::FraudAlert { newly_blocked: true, .. } = event {
                f.fetch_add(1, Ordering::SeqCst);
            }
        }));

        bus.emit(&PresenceEvent::Admitted {
            source: SourceAddress::new("10.0.0.1"),
            handshake_id: HandshakeId::new("HS-1"),
        });
        bus.emit(&PresenceEvent::FraudAlert {
            source: SourceAddress::new("10.0.0.1"),
            kind: RejectionKind::Replay,
            newly_blocked: true,
        });

        assert_eq!(frauds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn default_creates_empty_bus() {
        let bus = EventBus::default();
        assert!(bus.listeners.is_empty());
    }
}
