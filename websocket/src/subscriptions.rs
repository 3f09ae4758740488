//! Subscription management for WebSocket clients.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Available subscription topics.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTopic {
    /// Guardian recovery progress.
    Recovery,
    /// Fraud blocks and audited unblocks.
    Fraud,
    /// Presences admitted by the anti-replay ledger.
    Admission,
}

impl SubscriptionTopic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recovery => "recovery",
            Self::Fraud => "fraud",
            Self::Admission => "admission",
        }
    }
}

impl fmt::Display for SubscriptionTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional filter for subscriptions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionFilter {
    /// Only receive recovery events for these request ids.
    #[serde(default)]
    pub request_ids: Option<Vec<String>>,
    /// Only receive fraud or admission events for these source addresses.
    #[serde(default)]
    pub sources: Option<Vec<String>>,
}

/// Messages a client may send.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe {
        topic: SubscriptionTopic,
        #[serde(default)]
        filter: Option<SubscriptionFilter>,
    },
    Unsubscribe {
        topic: SubscriptionTopic,
    },
    Ping,
}

/// Control messages sent to the client (events are sent as [`SubscriptionEvent`]).
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Ack {
        action: String,
        topic: SubscriptionTopic,
    },
    Error {
        message: String,
    },
    Pong,
}

impl ServerMessage {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"type":"error","message":"encoding failed"}"#.to_owned())
    }
}

/// An event sent to subscribed clients.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubscriptionEvent {
    pub topic: String,
    pub data: serde_json::Value,
    /// Unix milliseconds at publish time.
    pub timestamp: u64,
}

/// The set of topics one client is subscribed to, with their filters.
#[derive(Debug, Default)]
pub struct ClientSubscriptions {
    topics: HashMap<SubscriptionTopic, Option<SubscriptionFilter>>,
}

impl ClientSubscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe, replacing any existing filter for the topic.
    pub fn subscribe(&mut self, topic: SubscriptionTopic, filter: Option<SubscriptionFilter>) {
        self.topics.insert(topic, filter);
    }

    /// Returns whether the client was subscribed.
    pub fn unsubscribe(&mut self, topic: &SubscriptionTopic) -> bool {
        self.topics.remove(topic).is_some()
    }

    pub fn is_subscribed(&self, topic: &SubscriptionTopic) -> bool {
        self.topics.contains_key(topic)
    }

    /// Whether `event` passes the client's filter for `topic`.
    pub fn matches_filter(&self, topic: &SubscriptionTopic, event: &SubscriptionEvent) -> bool {
        let Some(filter) = self.topics.get(topic) else {
            return false;
        };
        let Some(filter) = filter else {
            return true;
        };
        let (wanted, field) = match topic {
            SubscriptionTopic::Recovery => (&filter.request_ids, "request_id"),
            SubscriptionTopic::Fraud | SubscriptionTopic::Admission => (&filter.sources, "source"),
        };
        match wanted {
            None => true,
            Some(list) => event
                .data
                .get(field)
                .and_then(|v| v.as_str())
                .is_some_and(|value| list.iter().any(|w| w == value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn recovery_event(id: &str) -> SubscriptionEvent {
        SubscriptionEvent {
            topic: "recovery".into(),
            data: json!({ "request_id": id, "current": 1 }),
            timestamp: 0,
        }
    }

    #[test]
    fn parses_client_messages() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"action":"subscribe","topic":"recovery","filter":{"request_ids":["RR-1-a"]}}"#,
        )
        .unwrap();
        assert!(matches!(
            msg,
            ClientMessage::Subscribe { topic: SubscriptionTopic::Recovery, filter: Some(_) }
        ));
        let msg: ClientMessage = serde_json::from_str(r#"{"action":"ping"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Ping));
    }

    #[test]
    fn request_id_filter() {
        let mut subs = ClientSubscriptions::new();
        subs.subscribe(
            SubscriptionTopic::Recovery,
            Some(SubscriptionFilter {
                request_ids: Some(vec!["RR-1-a".into()]),
                sources: None,
            }),
        );
        assert!(subs.matches_filter(&SubscriptionTopic::Recovery, &recovery_event("RR-1-a")));
        assert!(!subs.matches_filter(&SubscriptionTopic::Recovery, &recovery_event("RR-2-b")));
        assert!(!subs.matches_filter(&SubscriptionTopic::Fraud, &recovery_event("RR-1-a")));
    }

    #[test]
    fn unfiltered_subscription_sees_everything() {
        let mut subs = ClientSubscriptions::new();
        subs.subscribe(SubscriptionTopic::Recovery, None);
        assert!(subs.matches_filter(&SubscriptionTopic::Recovery, &recovery_event("any")));
        assert!(subs.unsubscribe(&SubscriptionTopic::Recovery));
        assert!(!subs.unsubscribe(&SubscriptionTopic::Recovery));
        assert!(!subs.is_subscribed(&SubscriptionTopic::Recovery));
    }

    #[test]
    fn source_filter_applies_to_fraud() {
        let mut subs = ClientSubscriptions::new();
        subs.subscribe(
            SubscriptionTopic::Fraud,
            Some(SubscriptionFilter {
                request_ids: None,
                sources: Some(vec!["10.0.0.1".into()]),
            }),
        );
        let event = SubscriptionEvent {
            topic: "fraud".into(),
            data: json!({ "source": "10.0.0.2", "reason": "replay detected" }),
            timestamp: 0,
        };
        assert!(!subs.matches_filter(&SubscriptionTopic::Fraud, &event));
    }
}
