/// Remove ANSI escape sequences (colors, cursor movement) from runner output.
pub fn strip_ansi(text: &str) -> String {
    strip_ansi_escapes::strip_str(text)
}

/// Truncate `text` to `max_chars` characters, marking the cut.
pub fn truncate_for_error(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated = text.chars().take(max_chars).collect::<String>();
    truncated.push_str("...");
    truncated
}

/// Collapse every run of non-alphanumeric characters into a single `_`.
pub fn scrub_file_name(raw: &str) -> String {
    let mut scrubbed = String::with_capacity(raw.len());
    let mut in_gap = false;
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() {
            scrubbed.push(ch);
            in_gap = false;
        } else if !in_gap {
            scrubbed.push('_');
            in_gap = true;
        }
    }
    scrubbed
}
