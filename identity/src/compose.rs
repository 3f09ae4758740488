//! Deterministic root composition.

use presence_crypto::sha256_multi;
use presence_types::RootHash;

use crate::error::CompositionError;

/// ASCII unit separator placed between factors.
pub const FACTOR_SEPARATOR: u8 = 0x1f;

/// Compose a root identity from ordered factors.
///
/// Each factor is trimmed; empty factors and factors containing
/// [`FACTOR_SEPARATOR`] are rejected before anything is hashed. The order of
/// `factors` is significant.
pub fn compose_root<S: AsRef<str>>(factors: &[S]) -> Result<RootHash, CompositionError> {
    if factors.is_empty() {
        return Err(CompositionError::NoFactors);
    }

    let mut trimmed = Vec::with_capacity(factors.len());
    for (index, factor) in factors.iter().enumerate() {
        let factor = factor.as_ref().trim();
        if factor.is_empty() {
            return Err(CompositionError::EmptyFactor { index });
        }
        if factor.as_bytes().contains(&FACTOR_SEPARATOR) {
            return Err(CompositionError::ReservedSeparator { index });
        }
        trimmed.push(factor.as_bytes());
    }

    let separator = [FACTOR_SEPARATOR];
    let mut parts: Vec<&[u8]> = Vec::with_capacity(trimmed.len() * 2);
    for (i, factor) in trimmed.into_iter().enumerate() {
        if i > 0 {
            parts.push(&separator);
        }
        parts.push(factor);
    }
    Ok(RootHash::new(sha256_multi(&parts)))
}

/// Hex SHA-256 of `phone ␟ device_id`, binding a root to the enrolling device.
pub fn identity_anchor_hash(phone: &str, device_id: &str) -> Result<String, CompositionError> {
    let root = compose_root(&[phone, device_id])?;
    Ok(root.to_hex())
}

/// `true` for a 64-character hex string (either case) after trimming.
pub fn is_hex_digest(value: &str) -> bool {
    let value = value.trim();
    value.len() == 64 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use presence_crypto::sha256_hex;

    #[test]
    fn known_vector() {
        // sha256("a\x1fb")
        let root = compose_root(&["a", "b"]).unwrap();
        assert_eq!(root.to_hex(), sha256_hex(b"a\x1fb"));
    }

    #[test]
    fn factors_are_trimmed() {
        assert_eq!(
            compose_root(&[" face ", "palm\n"]).unwrap(),
            compose_root(&["face", "palm"]).unwrap()
        );
    }

    #[test]
    fn order_matters() {
        assert_ne!(
            compose_root(&["face", "palm", "anchor"]).unwrap(),
            compose_root(&["palm", "face", "anchor"]).unwrap()
        );
    }

    #[test]
    fn separator_prevents_boundary_shifts() {
        assert_ne!(
            compose_root(&["ab", "c"]).unwrap(),
            compose_root(&["a", "bc"]).unwrap()
        );
    }

    #[test]
    fn rejects_bad_input() {
        let none: [&str; 0] = [];
        assert_eq!(compose_root(&none), Err(CompositionError::NoFactors));
        assert_eq!(
            compose_root(&["face", "   "]),
            Err(CompositionError::EmptyFactor { index: 1 })
        );
        assert_eq!(
            compose_root(&["fa\u{1f}ce"]),
            Err(CompositionError::ReservedSeparator { index: 0 })
        );
    }

    #[test]
    fn anchor_hash_matches_composition() {
        let anchor = identity_anchor_hash("+15550100", "pixel-8").unwrap();
        assert_eq!(anchor, sha256_hex(b"+15550100\x1fpixel-8"));
        assert!(is_hex_digest(&anchor));
        assert!(identity_anchor_hash("", "pixel-8").is_err());
    }

    #[test]
    fn hex_digest_check() {
        assert!(is_hex_digest(&"Ab".repeat(32)));
        assert!(!is_hex_digest(&"ab".repeat(31)));
        assert!(!is_hex_digest(&"zz".repeat(32)));
    }
}
