//! Token estimation and budget-bounded truncation.

use std::borrow::Cow;

/// Characters per token used for size estimates.
pub const CHARS_PER_TOKEN: u64 = 4;

/// Estimate the token count of `text` (ceiling of bytes / 4).
pub fn estimate_tokens(text: &str) -> u64 {
    (text.len() as u64).div_ceil(CHARS_PER_TOKEN)
}

/// Cut `text` down to roughly `max_tokens`.
///
/// Keeps the first quarter and the last three quarters of the allowed bytes,
/// since CI logs put the failure near the end. Returns the text and whether
/// anything was removed.
pub fn truncate_to_tokens(text: &str, max_tokens: u64) -> (Cow<'_, str>, bool) {
    let max_bytes = max_tokens.saturating_mul(CHARS_PER_TOKEN) as usize;
    if text.len() <= max_bytes {
        return (Cow::Borrowed(text), false);
    }

    let head_len = floor_char_boundary(text, max_bytes / 4);
    let tail_start = ceil_char_boundary(text, text.len() - (max_bytes - max_bytes / 4));
    let removed = tail_start.saturating_sub(head_len);

    let mut out = String::with_capacity(max_bytes + 48);
    out.push_str(&text[..head_len]);
    out.push_str(&format!("\n[... truncated {removed} bytes ...]\n"));
    out.push_str(&text[tail_start..]);
    (Cow::Owned(out), true)
}

fn floor_char_boundary(text: &str, mut idx: usize) -> usize {
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_char_boundary(text: &str, mut idx: usize) -> usize {
    while idx < text.len() && !text.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_truncate_keeps_short_text() {
        let (out, truncated) = truncate_to_tokens("short log", 100);
        assert_eq!(out, "short log");
        assert!(!truncated);
    }

    #[test]
    fn test_truncate_keeps_head_and_tail() {
        let text = format!("{}{}{}", "H".repeat(100), "m".repeat(1000), "T".repeat(100));
        let (out, truncated) = truncate_to_tokens(&text, 50);
        assert!(truncated);
        assert!(out.starts_with("HHHH"));
        assert!(out.ends_with("TTTT"));
        assert!(out.contains("truncated"));
        assert!(out.len() < text.len());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let text = "é".repeat(500);
        let (out, truncated) = truncate_to_tokens(&text, 10);
        assert!(truncated);
        assert!(out.contains("truncated"));
    }
}
