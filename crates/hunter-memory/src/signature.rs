//! Task signatures: display-safe prefixes of an error description.

/// Maximum signature length, in code points.
pub const SIGNATURE_MAX_CHARS: usize = 50;

/// Return the first `max_chars` code points of `text`.
///
/// The cut always lands on a `char` boundary, so multi-byte text (CJK,
/// emoji) is never split mid-character. Text at or under the limit is
/// returned unchanged.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Signature for an error pattern, using [`SIGNATURE_MAX_CHARS`].
pub fn task_signature(pattern: &str) -> String {
    truncate_chars(pattern, SIGNATURE_MAX_CHARS).to_string()
}
