//! Text formatting for counter rows.
//!
//! Every front end formats rows through this module so the name column and
//! the counter text line up the same way everywhere.

use crate::MAX_NAME_CHARS;

/// Cut a string to at most `max` characters (not bytes).
///
/// # Examples
/// ```
/// use lapcounter_types::formatting::truncate_chars;
/// assert_eq!(truncate_chars("Alice", 3), "Ali");
/// assert_eq!(truncate_chars("Åsa", 10), "Åsa");
/// ```
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Format a stage/lap pair for display.
///
/// # Examples
/// ```
/// use lapcounter_types::formatting::format_counter;
/// assert_eq!(format_counter(2, 1), "Stage 2 - Lap 1");
/// ```
pub fn format_counter(stage: u32, lap: u32) -> String {
    format!("Stage {} - Lap {}", stage, lap)
}

/// Left-align `s` in a column `width` characters wide.
#[inline]
fn pad_column(s: &str, width: usize) -> String {
    let len = s.chars().count();
    let mut out = String::with_capacity(s.len() + width.saturating_sub(len));
    out.push_str(s);
    for _ in len..width {
        out.push(' ');
    }
    out
}

/// Format one display row: name column, counter, and the last punch time if any.
///
/// # Examples
/// ```
/// use lapcounter_types::formatting::format_row;
/// let row = format_row("Alice", 1, 2, Some("12:00:05"));
/// assert!(row.starts_with("Alice "));
/// assert!(row.ends_with("| Stage 1 - Lap 2 | Time: 12:00:05"));
/// ```
pub fn format_row(name: &str, stage: u32, lap: u32, last_punch: Option<&str>) -> String {
    let name = pad_column(truncate_chars(name, MAX_NAME_CHARS), MAX_NAME_CHARS);
    let counter = format_counter(stage, lap);
    match last_punch {
        Some(time) => format!("{} | {} | Time: {}", name, counter, time),
        None => format!("{} | {}", name, counter),
    }
}
