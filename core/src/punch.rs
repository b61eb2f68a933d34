//! Punch line parsing.
//!
//! Reader lines are semicolon separated with at least 8 fields:
//!
//! ```text
//! field0;CardId;ControlCode;field3;field4;field5;field6;Timestamp;...
//! ```
//!
//! Anything shorter is a header or noise and produces no event.

const MIN_FIELDS: usize = 8;
const CARD_FIELD: usize = 1;
const CODE_FIELD: usize = 2;
const TIME_FIELD: usize = 7;

/// One control-point scan by a card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PunchEvent<'a> {
    pub card_id: &'a str,
    pub control_code: &'a str,
    pub timestamp: &'a str,
    pub raw: &'a str,
}

/// Parse a single log line. Trailing `\n` / `\r\n` is accepted.
pub fn parse_line(line: &str) -> Option<PunchEvent<'_>> {
    let raw = line.trim_end_matches(['\r', '\n']);

    let mut card_id = "";
    let mut control_code = "";
    let mut timestamp = "";
    let mut count = 0usize;

    for (idx, field) in raw.split(';').enumerate() {
        match idx {
            CARD_FIELD => card_id = field.trim(),
            CODE_FIELD => control_code = field.trim(),
            TIME_FIELD => timestamp = field.trim(),
            _ => {}
        }
        count = idx + 1;
        if count >= MIN_FIELDS {
            break;
        }
    }

    if count < MIN_FIELDS {
        return None;
    }

    Some(PunchEvent {
        card_id,
        control_code,
        timestamp,
        raw,
    })
}
