//! Challenge text encoding.
//!
//! Challenges travel as base64url text, but clients are inconsistent: some
//! send the standard alphabet, some pad, some don't. Decoding normalizes all
//! of those to the same bytes so matching can happen on byte values.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty input")]
    Empty,

    #[error("invalid base64: {0}")]
    Invalid(String),
}

/// URL-safe alphabet, no padding on encode, padding optional on decode, and
/// non-zero trailing bits tolerated.
const LENIENT_URL_SAFE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Encode bytes as unpadded base64url.
pub fn encode_base64url(bytes: &[u8]) -> String {
    LENIENT_URL_SAFE.encode(bytes)
}

/// Decode base64url or standard base64 text, padded or not.
pub fn decode_base64url(text: &str) -> Result<Vec<u8>, DecodeError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(DecodeError::Empty);
    }
    let normalized: String = trimmed
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();
    LENIENT_URL_SAFE
        .decode(normalized.as_bytes())
        .map_err(|e| DecodeError::Invalid(e.to_string()))
}
