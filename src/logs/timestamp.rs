//! Access-log timestamp normalization

use anyhow::{anyhow, Result};
use chrono::{FixedOffset, NaiveDateTime};

/// Layout of the bracketed Apache/Nginx date and time once rejoined
const ACCESS_LOG_LAYOUT: &str = "%d/%b/%Y:%H:%M:%S";

/// Largest offset magnitude accepted, in seconds (18 hours)
const MAX_OFFSET_SECS: i32 = 18 * 3600;

/// Convert `dd/Mon/yyyy`, `HH:mm:ss` and `+HHMM` into an ISO-8601 date-time.
///
/// A zero offset renders as `Z`, any other as `+HH:MM` (with `:SS` when the
/// offset has seconds). When date and time do not form a valid date-time the
/// pieces are concatenated verbatim as `date + "T" + time + offset`.
///
/// Fails when the date-time is valid but the offset is not (`+2500`, `+123`),
/// so the caller can reject the whole line.
pub fn normalize(date: &str, time: &str, offset: &str) -> Result<String> {
    let combined = format!("{}:{}", date, time);
    let Ok(local) = NaiveDateTime::parse_from_str(&combined, ACCESS_LOG_LAYOUT) else {
        return Ok(format!("{}T{}{}", date, time, offset));
    };

    let offset = parse_offset(offset)?;
    Ok(format!(
        "{}{}",
        local.format("%Y-%m-%dT%H:%M:%S"),
        render_offset(&offset)
    ))
}

/// Parse `±h`, `±hh`, `±hhmm` or `±hhmmss` into a fixed offset
pub fn parse_offset(offset: &str) -> Result<FixedOffset> {
    let invalid = || anyhow!("Invalid UTC offset: {}", offset);

    let (sign, digits) = match offset.as_bytes().first() {
        Some(b'+') => (1, &offset[1..]),
        Some(b'-') => (-1, &offset[1..]),
        _ => return Err(invalid()),
    };
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    let field = |range: std::ops::Range<usize>| -> Result<i32> {
        digits[range].parse::<i32>().map_err(|_| invalid())
    };
    let (hours, minutes, seconds) = match digits.len() {
        1 | 2 => (field(0..digits.len())?, 0, 0),
        4 => (field(0..2)?, field(2..4)?, 0),
        6 => (field(0..2)?, field(2..4)?, field(4..6)?),
        _ => return Err(invalid()),
    };
    if hours > 18 || minutes > 59 || seconds > 59 {
        return Err(invalid());
    }

    let total = hours * 3600 + minutes * 60 + seconds;
    if total > MAX_OFFSET_SECS {
        return Err(invalid());
    }
    FixedOffset::east_opt(sign * total).ok_or_else(invalid)
}

fn render_offset(offset: &FixedOffset) -> String {
    let total = offset.local_minus_utc();
    if total == 0 {
        return "Z".to_string();
    }

    let sign = if total < 0 { '-' } else { '+' };
    let abs = total.abs();
    let (hours, minutes, seconds) = (abs / 3600, abs / 60 % 60, abs % 60);
    if seconds == 0 {
        format!("{}{:02}:{:02}", sign, hours, minutes)
    } else {
        format!("{}{:02}:{:02}:{:02}", sign, hours, minutes, seconds)
    }
}
