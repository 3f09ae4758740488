//! String identifiers exchanged with the transport and the identity store.
//!
//! All of these are opaque to the protocol: they are compared, hashed and
//! stored, never parsed. Distinct newtypes keep a guardian id from being
//! passed where a device id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            /// Return the raw identifier string.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Whether the identifier is empty or whitespace only.
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Transport-supplied session identifier (for example a cookie value).
    SessionId
);

string_id!(
    /// Client network address used for fraud blocking.
    SourceAddress
);

string_id!(
    /// One-time identifier of a completed handshake; burned as a nonce.
    HandshakeId
);

string_id!(
    /// A registered guardian who may approve recovery for another identity.
    GuardianId
);

string_id!(
    /// Stable identifier a root hash and recovery requests are keyed against
    /// (phone number or device identifier).
    IdentityAnchor
);

string_id!(
    /// Hardware device identifier.
    DeviceId
);

string_id!(
    /// Identifier of the device-bound key that signed the root commit.
    KeyId
);

string_id!(
    /// Identifier of a guardian recovery request.
    RequestId
);

impl HandshakeId {
    /// Build an id in the `HS-<unix_ms>-<suffix>` form.
    pub fn from_parts(started_ms: u64, suffix: &str) -> Self {
        Self(format!("HS-{started_ms}-{suffix}"))
    }
}

impl RequestId {
    /// Build an id in the `RR-<unix_ms>-<suffix>` form.
    pub fn from_parts(created_ms: u64, suffix: &str) -> Self {
        Self(format!("RR-{created_ms}-{suffix}"))
    }
}

impl SourceAddress {
    /// Placeholder used when the transport cannot determine the client address.
    pub fn unknown() -> Self {
        Self("unknown".to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_id_format() {
        let id = HandshakeId::from_parts(1_700_000_000_000, "ab12cd");
        assert_eq!(id.as_str(), "HS-1700000000000-ab12cd");
    }

    #[test]
    fn blank_detection_ignores_whitespace() {
        assert!(GuardianId::new("  ").is_blank());
        assert!(!GuardianId::new(" g1 ").is_blank());
    }

    #[test]
    fn ids_serialize_transparently() {
        let json = serde_json::to_string(&DeviceId::new("dev-1")).unwrap();
        assert_eq!(json, "\"dev-1\"");
    }
}
