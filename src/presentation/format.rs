use crate::types::{Level, LogEntry};
use chrono::{DateTime, Utc};
use std::borrow::Cow;

const SERVICE_WIDTH: usize = 16;
const ELLIPSIS: char = '…';

/// `Mar 01 12:00:00.123`
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%b %d %H:%M:%S%.3f").to_string()
}

pub fn level_label(level: Level) -> &'static str {
    match level {
        Level::Debug => "DEBUG",
        Level::Info => "INFO",
        Level::Warn => "WARN",
        Level::Error => "ERROR",
        Level::Unknown => "?",
    }
}

/// Cut `text` to at most `max_chars` characters, ending with an ellipsis when
/// anything was removed. Line breaks and tabs become spaces.
pub fn truncate_message(text: &str, max_chars: usize) -> Cow<'_, str> {
    let needs_flattening = text.contains(&['\n', '\r', '\t'][..]);
    let char_count = text.chars().count();
    if !needs_flattening && char_count <= max_chars {
        return Cow::Borrowed(text);
    }
    let flat = text.chars().map(|c| if c.is_control() { ' ' } else { c });
    if char_count <= max_chars {
        return Cow::Owned(flat.collect());
    }
    if max_chars == 0 {
        return Cow::Owned(String::new());
    }
    let mut out: String = flat.take(max_chars - 1).collect();
    out.push(ELLIPSIS);
    Cow::Owned(out)
}

/// One table row, fitted to `width` columns.
pub fn format_entry_line(entry: &LogEntry, width: usize) -> String {
    let service = truncate_message(&entry.service, SERVICE_WIDTH);
    let prefix = format!(
        "{} {:<5} {:<width$} ",
        format_timestamp(&entry.timestamp),
        level_label(entry.level),
        service,
        width = SERVICE_WIDTH
    );
    let remaining = width.saturating_sub(prefix.chars().count());
    format!("{}{}", prefix, truncate_message(&entry.message, remaining))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(message: &str) -> LogEntry {
        let ts = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap() + chrono::Duration::milliseconds(123);
        LogEntry::new(ts, "svc-a", Level::Error, message)
    }

    #[test]
    fn test_timestamp_format() {
        assert_eq!(format_timestamp(&sample("x").timestamp), "Mar 01 12:00:00.123");
    }

    #[test]
    fn test_short_message_is_borrowed() {
        assert!(matches!(truncate_message("short", 10), Cow::Borrowed("short")));
    }

    #[test]
    fn test_long_message_is_cut_with_ellipsis() {
        assert_eq!(truncate_message("abcdefghij", 5), "abcd…");
        assert_eq!(truncate_message("héllo wörld", 6), "héllo…");
        assert_eq!(truncate_message("abc", 0), "");
    }

    #[test]
    fn test_line_breaks_are_flattened() {
        assert_eq!(truncate_message("a\nb\tc", 10), "a b c");
    }

    #[test]
    fn test_entry_line_fits_width() {
        let line = format_entry_line(&sample(&"x".repeat(500)), 80);
        assert_eq!(line.chars().count(), 80);
        assert!(line.starts_with("Mar 01 12:00:00.123 ERROR svc-a "));
        assert!(line.ends_with('…'));
    }

    #[test]
    fn test_entry_keeps_full_message() {
        let entry = sample(&"y".repeat(500));
        let _ = format_entry_line(&entry, 40);
        assert_eq!(entry.message.len(), 500);
    }
}
