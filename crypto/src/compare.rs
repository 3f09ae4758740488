//! Constant-time byte comparison for challenge matching.

use subtle::ConstantTimeEq;

/// Compare two byte strings without leaking the position of the first mismatch.
///
/// Length is not secret; unequal lengths return `false` immediately.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}
