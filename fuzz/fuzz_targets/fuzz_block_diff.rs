#![no_main]
use libfuzzer_sys::fuzz_target;
use topic_consensus::{diff_blocks, split_blocks};

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let mid = s
            .char_indices()
            .nth(s.chars().count() / 2)
            .map_or(s.len(), |(i, _)| i);
        let (old, new) = s.split_at(mid);
        let stats = diff_blocks(old, new);
        assert!(stats.chars_added as usize <= new.chars().count());
        assert!(stats.chars_deleted as usize <= old.chars().count());

        let same = diff_blocks(new, new);
        assert_eq!((same.chars_added, same.chars_deleted), (0, 0));
        let _ = split_blocks(s);
    }
});
