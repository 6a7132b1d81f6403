//! Shared utility functions for the autofix crate.

/// Maximum length for error body content in error messages
const MAX_ERROR_BODY_LEN: usize = 200;

/// Truncate `text` to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// The last `max_chars` characters of `text`.
pub fn tail_chars(text: &str, max_chars: usize) -> &str {
    let total = text.chars().count();
    if total <= max_chars {
        return text;
    }
    match text.char_indices().nth(total - max_chars) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

/// Sanitize an API error body before it ends up in an error message or log.
/// Truncates long responses and redacts anything that looks like a credential.
pub fn sanitize_error_body(body: &str) -> String {
    const SECRET_PATTERNS: &[&str] = &[
        "token",
        "secret",
        "password",
        "credential",
        "bearer",
        "ghp_",
        "ghs_",
        "github_pat_",
        "sk-",
    ];

    let lower = body.to_lowercase();
    if SECRET_PATTERNS.iter().any(|p| lower.contains(p)) {
        return "(error details redacted)".to_string();
    }

    if body.chars().count() > MAX_ERROR_BODY_LEN {
        format!("{}... (truncated)", truncate_chars(body, MAX_ERROR_BODY_LEN))
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn test_tail_chars() {
        assert_eq!(tail_chars("abcdef", 2), "ef");
        assert_eq!(tail_chars("añb", 2), "ñb");
        assert_eq!(tail_chars("ab", 5), "ab");
    }

    #[test]
    fn test_sanitize_error_body_truncates() {
        let long = "x".repeat(500);
        let sanitized = sanitize_error_body(&long);
        assert!(sanitized.ends_with("... (truncated)"));
        assert!(sanitized.len() < 250);
    }

    #[test]
    fn test_sanitize_error_body_redacts_secrets() {
        assert_eq!(
            sanitize_error_body("Bad credentials for token ghp_abc"),
            "(error details redacted)"
        );
        assert_eq!(sanitize_error_body("Not Found"), "Not Found");
    }
}
