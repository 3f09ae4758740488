#![no_main]

use libfuzzer_sys::fuzz_target;
use presence_crypto::encode_base64url;
use presence_ledger::decode_client_data_challenge;

// Client data arrives from untrusted browsers: both the raw field and the
// base64url-wrapped JSON inside it must parse without panicking.
fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = decode_client_data_challenge(text);
    }
    let _ = decode_client_data_challenge(&encode_base64url(data));
});
