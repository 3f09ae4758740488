#![no_main]

use libfuzzer_sys::fuzz_target;
use presence_identity::{compose_root, FACTOR_SEPARATOR};

// Split the input into factors on NUL and compose them. Composition must
// never panic, must be deterministic, and must reject any factor carrying
// the separator byte.
fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    let factors: Vec<&str> = text.split('\0').collect();

    let first = compose_root(&factors);
    let second = compose_root(&factors);
    assert_eq!(first, second);

    if factors
        .iter()
        .any(|f| f.trim().as_bytes().contains(&FACTOR_SEPARATOR))
    {
        assert!(first.is_err());
    }
});
