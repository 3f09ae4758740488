//! Randomness for challenges and identifiers.

use thiserror::Error;

#[derive(Debug, Error)]
#[error("random source unavailable: {0}")]
pub struct RandomError(pub String);

/// Source of unpredictable bytes.
///
/// [`OsRandom`] is used in production; tests inject a deterministic source.
pub trait RandomSource: Send + Sync {
    fn fill(&self, buf: &mut [u8]) -> Result<(), RandomError>;
}

/// Operating-system CSPRNG via `getrandom`.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill(&self, buf: &mut [u8]) -> Result<(), RandomError> {
        getrandom::getrandom(buf).map_err(|e| RandomError(e.to_string()))
    }
}

/// `len` random bytes rendered as lowercase hex.
pub fn random_hex(source: &dyn RandomSource, len: usize) -> Result<String, RandomError> {
    let mut buf = vec![0u8; len];
    source.fill(&mut buf)?;
    Ok(buf.iter().map(|b| format!("{:02x}", b)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn os_random_fills_distinct_buffers() {
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        OsRandom.fill(&mut a).unwrap();
        OsRandom.fill(&mut b).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn random_hex_length() {
        let hex = random_hex(&OsRandom, 6).unwrap();
        assert_eq!(hex.len(), 12);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
