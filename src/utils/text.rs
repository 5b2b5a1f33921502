pub fn truncate_utf8_prefix(value: &str, max_bytes: usize) -> String {
    if max_bytes == 0 {
        return String::new();
    }
    if value.len() <= max_bytes {
        return value.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !value.is_char_boundary(end) {
        end -= 1;
    }
    value[..end].to_string()
}

/// Collapses runs of whitespace to a single space and lowercases, so
/// `"Show   IP interface brief"` and `"show ip interface brief"` compare equal.
pub fn normalize_command_key(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Decodes device output lossily and drops carriage returns that CLI
/// sessions emit before every newline.
pub fn decode_device_output(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).replace("\r\n", "\n")
}
