//! The committed root identity hash.

use crate::error::TypeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A 32-byte SHA-256 root identity hash.
///
/// Rendered and serialized as 64 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RootHash([u8; 32]);

impl RootHash {
    pub const LEN: usize = 32;

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Parse a 64-character hex string (either case).
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let s = s.trim();
        if s.len() != Self::LEN * 2 {
            return Err(TypeError::InvalidLength {
                expected: Self::LEN * 2,
                actual: s.len(),
            });
        }
        let mut out = [0u8; 32];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let hi = hex::nibble(chunk[0]).ok_or_else(|| TypeError::InvalidHex(s.to_owned()))?;
            let lo = hex::nibble(chunk[1]).ok_or_else(|| TypeError::InvalidHex(s.to_owned()))?;
            out[i] = (hi << 4) | lo;
        }
        Ok(Self(out))
    }
}

impl fmt::Debug for RootHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RootHash({})", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for RootHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

impl Serialize for RootHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for RootHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

// Inline hex encoding to avoid adding the `hex` crate as a dependency of types.
mod hex {
    pub fn encode(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    pub fn nibble(c: u8) -> Option<u8> {
        match c {
            b'0'..=b'9' => Some(c - b'0'),
            b'a'..=b'f' => Some(c - b'a' + 10),
            b'A'..=b'F' => Some(c - b'A' + 10),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        let hash = RootHash::new([0xAB; 32]);
        assert_eq!(RootHash::from_hex(&hash.to_hex()).unwrap(), hash);
    }

    #[test]
    fn uppercase_hex_is_accepted() {
        let lower = "ab".repeat(32);
        let upper = lower.to_uppercase();
        assert_eq!(RootHash::from_hex(&lower), RootHash::from_hex(&upper));
    }

    #[test]
    fn rejects_wrong_length_and_bad_chars() {
        assert!(matches!(
            RootHash::from_hex("abcd"),
            Err(TypeError::InvalidLength { expected: 64, actual: 4 })
        ));
        let bad = format!("{}zz", "0".repeat(62));
        assert!(matches!(RootHash::from_hex(&bad), Err(TypeError::InvalidHex(_))));
    }

    #[test]
    fn debug_shows_only_a_prefix() {
        let hash = RootHash::new([0x11; 32]);
        assert_eq!(format!("{hash:?}"), "RootHash(11111111)");
    }
}
