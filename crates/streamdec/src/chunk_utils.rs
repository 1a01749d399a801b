use alloc::vec::Vec;

/// Split `payload` into approximately equal-sized chunks.
///
/// # Panics
///
/// Panics if `parts` is zero.
#[must_use]
pub fn produce_chunks(payload: &[u8], parts: usize) -> Vec<&[u8]> {
    assert!(parts > 0);
    let chunk_size = payload.len().div_ceil(parts).max(1);
    payload.chunks(chunk_size).collect()
}

/// Split `payload` into consecutive non-empty chunks whose sizes follow
/// `schedule`, cycling through it; whatever is left after one full pass goes
/// in a final chunk. Schedule entries are reduced modulo the remaining length.
#[must_use]
pub fn split_at_schedule<'a>(payload: &'a [u8], schedule: &[usize]) -> Vec<&'a [u8]> {
    let mut chunks = Vec::new();
    let mut rest = payload;
    for &s in schedule {
        if rest.is_empty() {
            break;
        }
        let (head, tail) = rest.split_at(1 + s % rest.len());
        chunks.push(head);
        rest = tail;
    }
    if !rest.is_empty() {
        chunks.push(rest);
    }
    chunks
}
