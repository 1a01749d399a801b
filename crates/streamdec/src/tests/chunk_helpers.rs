use alloc::vec;

use crate::{produce_chunks, split_at_schedule};

#[test]
fn produce_chunks_example() {
    let payload = b"[\"foo\",\"bar\"]";
    let chunks = produce_chunks(payload, 5);
    assert_eq!(chunks, vec![&b"[\"f"[..], b"oo\"", b",\"b", b"ar\"", b"]"]);
    assert_eq!(chunks.concat(), payload);
}

#[test]
fn schedule_covers_everything() {
    let payload = b"abcdefgh";
    assert_eq!(
        split_at_schedule(payload, &[0, 1, 100]),
        vec![&b"a"[..], b"bc", b"d", b"efgh"]
    );
    assert_eq!(split_at_schedule(payload, &[]), vec![&b"abcdefgh"[..]]);
    assert!(split_at_schedule(b"", &[3]).is_empty());
}
