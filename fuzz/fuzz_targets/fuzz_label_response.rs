#![no_main]

use libfuzzer_sys::fuzz_target;

use shadowfix::media::{parse_label_scores, LabelResolver};

fuzz_target!(|data: &[u8]| {
    // Arbitrary response bodies must either parse into in-range scores or be
    // rejected; never panic.
    let Ok(scores) = parse_label_scores(data) else {
        return;
    };
    assert!(!scores.is_empty());
    assert!(scores.iter().all(|s| (0.0..=1.0).contains(&s.score)));

    let p = LabelResolver::default()
        .resolve(&scores)
        .expect("non-empty scores always resolve");
    assert!((0.0..=1.0).contains(&p));
});
