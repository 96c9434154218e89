#![no_main]

use libfuzzer_sys::fuzz_target;

use shadowfix::security::sanitize_credential;

fuzz_target!(|data: &str| {
    let once = sanitize_credential(data);
    assert!(!once.chars().any(|c| c.is_whitespace() || c == '"' || c == '\''));
    assert_eq!(sanitize_credential(&once), once);
});
