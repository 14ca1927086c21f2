use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static LIST_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s,;]+").unwrap());
static UNSAFE_FILE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_.]").unwrap());

pub fn split_list(text: &str) -> Vec<String> {
    LIST_SEPARATORS
        .split(text)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

/// Percent-encodes every byte outside `[A-Za-z0-9_.]`, so distinct inputs
/// never share a file name and `-` is free to use as a separator.
pub fn file_safe(text: &str) -> String {
    UNSAFE_FILE_CHARS
        .replace_all(text, |caps: &Captures| {
            caps[0]
                .bytes()
                .map(|b| format!("%{:02X}", b))
                .collect::<String>()
        })
        .to_string()
}

/// Absent and blank values are treated the same.
pub fn non_blank(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}
