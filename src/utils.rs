//! Shared formatting helpers for the devsuite CLI.

use std::borrow::Cow;

/// Formats a duration in seconds into a human-readable string.
///
/// # Examples
///
/// ```ignore
/// use devsuite::utils::format_duration;
///
/// assert_eq!(format_duration(3661), "1h 1m 1s");
/// assert_eq!(format_duration(61), "1m 1s");
/// assert_eq!(format_duration(30), "30s");
/// ```
pub fn format_duration(seconds: i64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    match (hours, minutes) {
        (0, 0) => format!("{}s", secs),
        (0, _) => format!("{}m {}s", minutes, secs),
        _ => format!("{}h {}m {}s", hours, minutes, secs),
    }
}

/// Time between two instants of a run, e.g. `2m 5s`.
pub fn format_span(start: chrono::DateTime<chrono::Utc>, end: chrono::DateTime<chrono::Utc>) -> String {
    format_duration((end - start).num_seconds().max(0))
}

/// Formats a byte count using binary units with one decimal place.
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Truncates to at most `max_chars` characters, appending "..." when cut.
///
/// Counts characters rather than bytes, so multi-byte tool output never
/// splits inside a code point.
pub fn truncate(s: &str, max_chars: usize) -> Cow<'_, str> {
    if s.chars().count() <= max_chars {
        return Cow::Borrowed(s);
    }
    if max_chars <= 3 {
        return Cow::Owned(s.chars().take(max_chars).collect());
    }

    let head: String = s.chars().take(max_chars - 3).collect();
    Cow::Owned(format!("{}...", head))
}

/// First line of a multi-line message, for one-line status displays.
pub fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or_default()
}
