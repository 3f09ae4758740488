#![no_main]

use libfuzzer_sys::fuzz_target;
use presence_crypto::{decode_base64url, encode_base64url};

// Arbitrary text must never panic the decoder, and whatever it accepts must
// re-encode to a string that decodes to the same bytes.
fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        match decode_base64url(text) {
            Ok(bytes) if !bytes.is_empty() => {
                let again = decode_base64url(&encode_base64url(&bytes));
                assert_eq!(again.as_deref(), Ok(bytes.as_slice()));
            }
            _ => {}
        }
    }

    if !data.is_empty() {
        let encoded = encode_base64url(data);
        assert!(!encoded.contains(['+', '/', '=']));
        assert_eq!(decode_base64url(&encoded).as_deref(), Ok(data));
    }
});
