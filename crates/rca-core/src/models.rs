//! Known model context windows.
//!
//! Used to size the budget when no window is configured explicitly.

use tracing::{info, warn};

/// Window assumed for models missing from [`MODEL_WINDOWS`].
pub const DEFAULT_CONTEXT_WINDOW: u64 = 128_000;

/// Maximum input tokens per model, keyed by bare or `provider/` name.
pub const MODEL_WINDOWS: &[(&str, u64)] = &[
    ("openai/gpt-4o", 128_000),
    ("gpt-4o", 128_000),
    ("gpt-4o-mini", 128_000),
    ("gpt-4.1", 1_047_576),
    ("gpt-4.1-mini", 1_047_576),
    ("gpt-4-turbo", 128_000),
    ("gpt-4", 8_192),
    ("gpt-3.5-turbo", 16_385),
    ("o1", 200_000),
    ("o3-mini", 200_000),
    ("anthropic/claude-3-5-sonnet-20241022", 200_000),
    ("claude-3-5-sonnet-20241022", 200_000),
    ("claude-3-5-haiku-20241022", 200_000),
    ("claude-3-opus-20240229", 200_000),
    ("gemini/gemini-1.5-pro", 2_097_152),
    ("gemini-1.5-pro", 2_097_152),
    ("gemini-1.5-flash", 1_048_576),
    ("gemini-2.0-flash", 1_048_576),
    ("mistral/mistral-large-latest", 128_000),
    ("groq/llama3-70b-8192", 8_192),
];

/// Find the table entry for `model`, which may carry a `provider/` prefix.
///
/// Tries the name as given, then the bare model name, then any entry that
/// contains the bare name or is contained in it. Among substring matches
/// the longest key wins, first in table order on ties.
pub fn lookup(model: &str) -> Option<(&'static str, u64)> {
    let model = model.trim();
    if model.is_empty() {
        return None;
    }
    let exact = |name: &str| MODEL_WINDOWS.iter().copied().find(|(key, _)| *key == name);

    if let Some(found) = exact(model) {
        return Some(found);
    }
    let bare = model.rsplit_once('/').map_or(model, |(_, bare)| bare);
    if bare.is_empty() {
        return None;
    }
    if let Some(found) = exact(bare) {
        return Some(found);
    }

    MODEL_WINDOWS
        .iter()
        .copied()
        .filter(|(key, _)| key.contains(bare) || bare.contains(key))
        .fold(None, |best: Option<(&str, u64)>, entry| match best {
            Some(b) if b.0.len() >= entry.0.len() => Some(b),
            _ => Some(entry),
        })
}

/// Context window for `model`, or [`DEFAULT_CONTEXT_WINDOW`] when unknown.
pub fn context_window_for(model: &str) -> u64 {
    match lookup(model) {
        Some((key, window)) => {
            info!(model = %model, matched = key, window, "detected model context window");
            window
        }
        None => {
            warn!(model = %model, window = DEFAULT_CONTEXT_WINDOW, "model not in window table, using default");
            DEFAULT_CONTEXT_WINDOW
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_qualified_name_wins() {
        assert_eq!(lookup("gemini/gemini-1.5-pro"), Some(("gemini/gemini-1.5-pro", 2_097_152)));
        assert_eq!(lookup("openai/gpt-4o"), Some(("openai/gpt-4o", 128_000)));
    }

    #[test]
    fn test_unknown_provider_falls_back_to_bare_name() {
        assert_eq!(lookup("azure/gpt-4"), Some(("gpt-4", 8_192)));
        assert_eq!(lookup("gpt-3.5-turbo"), Some(("gpt-3.5-turbo", 16_385)));
    }

    #[test]
    fn test_substring_match_prefers_longest_key() {
        // Dated snapshot: contains both "gpt-4" and "gpt-4o".
        assert_eq!(lookup("gpt-4o-2024-08-06"), Some(("gpt-4o", 128_000)));
        // Short alias contained in a dated key.
        assert_eq!(
            lookup("claude-3-opus"),
            Some(("claude-3-opus-20240229", 200_000))
        );
    }

    #[test]
    fn test_unknown_model_uses_default() {
        assert_eq!(lookup("granite-34b-code"), None);
        assert_eq!(lookup(""), None);
        assert_eq!(lookup("openai/"), None);
        assert_eq!(context_window_for("granite-34b-code"), DEFAULT_CONTEXT_WINDOW);
        assert_eq!(context_window_for("gpt-4.1-mini"), 1_047_576);
    }
}
