#![no_main]

use libfuzzer_sys::fuzz_target;

use shadowfix::security::logging::{diagnostic_snippet, MAX_DIAGNOSTIC_CHARS};

fuzz_target!(|data: &str| {
    // Remote bodies go through these patterns; libFuzzer's per-input timeout
    // catches catastrophic backtracking.
    let snippet = diagnostic_snippet(data);
    assert!(snippet.chars().count() <= MAX_DIAGNOSTIC_CHARS + 1);
});
