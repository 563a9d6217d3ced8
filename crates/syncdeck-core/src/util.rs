//! Shared utility functions used across multiple modules.

/// Normalize optional text by trimming whitespace and removing empties.
///
/// Returns `None` when the input is `None` or the trimmed value is empty.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Truncate text to at most 180 characters for log lines.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

/// Current Unix timestamp in milliseconds.
pub fn unix_millis_now() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Interpret common truthy spellings (`1`, `true`, `yes`, `on`).
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Turn a connection name into something the daemon and SSH accept as an
/// identifier: every character outside `[A-Za-z0-9-]` becomes `-`.
pub fn sanitize_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_option_rejects_empty() {
        assert_eq!(normalize_text_option(None), None);
        assert_eq!(normalize_text_option(Some("   ".to_string())), None);
    }

    #[test]
    fn normalize_text_option_trims_value() {
        assert_eq!(
            normalize_text_option(Some(" /home/me/.ssh/id_ed25519 ".to_string())),
            Some("/home/me/.ssh/id_ed25519".to_string())
        );
    }

    #[test]
    fn sanitize_name_replaces_spaces_and_underscores() {
        assert_eq!(sanitize_name("my web_app"), "my-web-app");
        assert_eq!(sanitize_name("proj (Copy) 2"), "proj--Copy--2");
        assert_eq!(sanitize_name("already-fine-1"), "already-fine-1");
    }

    #[test]
    fn parse_flag_accepts_common_spellings() {
        assert!(parse_flag("yes"));
        assert!(parse_flag(" TRUE "));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("off"));
    }
}
