//! Credential masking and error-body sanitation
//!
//! Backend error bodies are surfaced in logs and API responses, so they are
//! scrubbed of credentials and host paths and capped in length first.

use regex::Regex;
use std::sync::LazyLock;

/// Maximum length of a surfaced error body
const MAX_ERROR_LEN: usize = 300;

/// Minimum token length to display partially
const MIN_TOKEN_LEN_FOR_PARTIAL: usize = 8;

static SECRET_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(bearer\s+|api[_-]?key[=:]\s*|token[=:]\s*|sk-)[A-Za-z0-9._\-]+")
        .expect("SECRET_REGEX is a compile-time constant")
});

/// Mask a credential for safe display in logs
///
/// Shows the first and last 4 characters for tokens longer than 8 characters.
#[must_use]
pub fn mask_token(token: &str) -> String {
    if token.chars().count() <= MIN_TOKEN_LEN_FOR_PARTIAL {
        return "****".to_string();
    }
    let head: String = token.chars().take(4).collect();
    let tail: String = token
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("{}...{}", head, tail)
}

/// Truncate to at most `max` characters without splitting a code point
#[must_use]
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Sanitize a backend error body before it leaves the transport
#[must_use]
pub fn sanitize_api_error(error: &str) -> String {
    let lower = error.to_lowercase();

    if lower.contains("/home") || lower.contains("/root") || lower.contains("\\users\\") {
        return "An internal error occurred on the agent backend.".to_string();
    }

    if lower.contains("connection refused") || lower.contains("failed to connect") {
        return "Failed to connect to the agent backend.".to_string();
    }

    let scrubbed = SECRET_REGEX.replace_all(error, "[REDACTED]");

    if scrubbed.chars().count() > MAX_ERROR_LEN {
        format!("{}...(truncated)", truncate_chars(&scrubbed, MAX_ERROR_LEN))
    } else {
        scrubbed.into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_token() {
        assert_eq!(mask_token("sk-1234567890abcdef"), "sk-1...cdef");
        assert_eq!(mask_token("short"), "****");
    }

    #[test]
    fn test_sanitize_paths() {
        let sanitized = sanitize_api_error("failed to load /home/user/.ollama/models/x");
        assert!(!sanitized.contains("/home"));
    }

    #[test]
    fn test_sanitize_redacts_credentials() {
        let sanitized = sanitize_api_error("invalid header: Bearer abc123secret");
        assert!(!sanitized.contains("abc123secret"));
        assert!(sanitized.contains("[REDACTED]"));
    }

    #[test]
    fn test_sanitize_truncates() {
        let long = "x".repeat(1000);
        let sanitized = sanitize_api_error(&long);
        assert!(sanitized.ends_with("...(truncated)"));
        assert!(sanitized.len() < 400);
    }

    #[test]
    fn test_truncate_chars_multibyte() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }
}
