#![no_main]
use libfuzzer_sys::fuzz_target;
use repo_records::{validate_record, Collection, RecordUri};

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        // Uri parsing must never panic.
        let _ = s.parse::<RecordUri>();

        if let Ok(payload) = serde_json::from_str::<serde_json::Value>(s) {
            for collection in Collection::ALL {
                let _ = validate_record(collection, &payload);
            }
        }
    }
});
