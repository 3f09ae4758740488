//! Extraction of the echoed challenge from WebAuthn-style client data.

use presence_crypto::decode_base64url;
use serde::Deserialize;

#[derive(Deserialize)]
struct ClientData {
    challenge: Option<String>,
}

/// Decode base64url client-data JSON and return its `challenge` field.
///
/// Any decoding problem, a missing field, or an empty challenge yields `None`;
/// callers treat that as a malformed proof.
pub fn decode_client_data_challenge(client_data_b64: &str) -> Option<String> {
    let bytes = decode_base64url(client_data_b64).ok()?;
    let data: ClientData = serde_json::from_slice(&bytes).ok()?;
    data.challenge.filter(|c| !c.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use presence_crypto::encode_base64url;

    #[test]
    fn extracts_challenge() {
        let json = br#"{"type":"webauthn.get","challenge":"abc123","origin":"https://x"}"#;
        assert_eq!(
            decode_client_data_challenge(&encode_base64url(json)).as_deref(),
            Some("abc123")
        );
    }

    #[test]
    fn rejects_missing_or_empty_challenge() {
        assert!(decode_client_data_challenge(&encode_base64url(br#"{"type":"x"}"#)).is_none());
        assert!(decode_client_data_challenge(&encode_base64url(br#"{"challenge":""}"#)).is_none());
        assert!(decode_client_data_challenge(&encode_base64url(b"not json")).is_none());
        assert!(decode_client_data_challenge("%%%").is_none());
    }
}
