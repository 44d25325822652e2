#![no_main]

use libfuzzer_sys::fuzz_target;
use planbridge_core::case_ids::extract_case_ids;
use planbridge_core::text::{scrub_file_name, strip_ansi};

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    let ids = extract_case_ids(&raw);
    for id in &ids {
        assert!(!id.is_empty());
        assert!(id.chars().all(|ch| ch.is_ascii_digit()));
    }
    if !raw.contains('[') {
        assert!(ids.is_empty());
    }

    let stripped = strip_ansi(&raw);
    assert!(stripped.len() <= raw.len());

    let scrubbed = scrub_file_name(&raw);
    assert!(!scrubbed.contains("__"));
});
