/// Longest prefix of `value` that fits in `max_bytes` without splitting a
/// UTF-8 sequence. A budget of zero means "no budget" and returns the value
/// unchanged, as does a value that already fits.
pub fn truncate_to_bytes(value: &str, max_bytes: usize) -> &str {
    if max_bytes == 0 || value.len() <= max_bytes {
        return value;
    }
    let mut end = max_bytes;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}
