//! General utilities.

use std::time::{SystemTime, UNIX_EPOCH};

/// Format a Unix timestamp as ISO 8601 string (e.g., "2025-01-01T00:00:00Z").
///
/// If the timestamp is out of range for chrono's date handling, returns an
/// explicit placeholder string rather than a misleading value.
pub fn format_timestamp_iso8601(timestamp: u64) -> String {
    let Ok(timestamp) = i64::try_from(timestamp) else {
        return format!("invalid-timestamp({timestamp})");
    };

    chrono::DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| format!("invalid-timestamp({timestamp})"))
}

/// Format the current time as ISO 8601 string.
pub fn now_iso8601() -> String {
    format_timestamp_iso8601(get_now())
}

/// Get current Unix timestamp in seconds.
///
/// When `MCP_TASKS_TEST_EPOCH` is set (by tests), returns that value instead
/// of the actual current time, so stored timestamps are deterministic.
///
/// All code that needs timestamps for storage should use this function
/// rather than `SystemTime::now()` directly.
pub fn get_now() -> u64 {
    std::env::var("MCP_TASKS_TEST_EPOCH")
        .ok()
        .and_then(|val| val.parse::<u64>().ok())
        .unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("system clock before Unix epoch")
                .as_secs()
        })
}

/// Maximum title length carried into a commit message.
pub const COMMIT_TITLE_MAX: usize = 50;

/// Truncate a task title for use in a commit message.
///
/// Titles longer than 50 characters are cut to 47 characters plus `…`.
/// Measured in characters, not bytes, so multi-byte titles don't get split
/// mid-codepoint.
pub fn truncate_title(title: &str) -> String {
    if title.chars().count() <= COMMIT_TITLE_MAX {
        return title.to_string();
    }
    let mut out: String = title.chars().take(COMMIT_TITLE_MAX - 3).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_now_returns_reasonable_timestamp() {
        let now = get_now();
        // Should be after 2020-01-01
        assert!(now > 1577836800, "get_now() should return current time");
    }

    #[test]
    fn test_format_timestamp_iso8601_u64_overflow() {
        let too_large = (i64::MAX as u64) + 1;
        let formatted = format_timestamp_iso8601(too_large);
        assert!(formatted.starts_with("invalid-timestamp("));
    }

    #[test]
    fn test_truncate_title_at_boundary() {
        let exactly_50 = "a".repeat(50);
        assert_eq!(truncate_title(&exactly_50), exactly_50);

        let fifty_one = "a".repeat(51);
        let truncated = truncate_title(&fifty_one);
        assert_eq!(truncated.chars().count(), 48);
        assert_eq!(truncated, format!("{}…", "a".repeat(47)));
    }

    #[test]
    fn test_truncate_title_multibyte() {
        let title = "ß".repeat(60);
        let truncated = truncate_title(&title);
        assert_eq!(truncated.chars().count(), 48);
        assert!(truncated.ends_with('…'));
    }
}
