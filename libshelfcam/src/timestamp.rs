//! Timezone-aware instants and the helpers used to build uniform timelines.
//!
//! Timestamps are stored on disk as text in the form
//! `YYYY-MM-DD HH:MM:SS[.ffffff][±HH:MM]`. When the zone is missing, the
//! configured default offset is assumed.
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{Duration, OffsetDateTime, PrimitiveDateTime, UtcOffset};

use super::error::TimestampError;

pub type Timestamp = OffsetDateTime;

const DATETIME_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
const DATETIME_OUTPUT_FORMAT: &[FormatItem<'static>] = format_description!(
    "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:6][offset_hour sign:mandatory]:[offset_minute]"
);
const OFFSET_FORMAT: &[FormatItem<'static>] =
    format_description!("[offset_hour sign:mandatory]:[offset_minute]");
/// Length of `YYYY-MM-DD HH:MM:SS`
const DATETIME_PREFIX_LEN: usize = 19;
const NANOS_PER_SECOND: i128 = 1_000_000_000;

/// Parse a UTC offset such as `-08:00`, `+0530` or `Z`
pub fn parse_offset(text: &str) -> Result<UtcOffset, TimestampError> {
    let text = text.trim();
    if text == "Z" || text == "z" {
        return Ok(UtcOffset::UTC);
    }
    if !text.is_ascii() {
        return Err(TimestampError::BadFormat(text.to_string()));
    }
    let normalized = if text.len() == 5 && !text.contains(':') {
        format!("{}:{}", &text[..3], &text[3..])
    } else {
        text.to_string()
    };
    UtcOffset::parse(&normalized, OFFSET_FORMAT)
        .map_err(|_| TimestampError::BadFormat(text.to_string()))
}

/// Parse a timestamp string, applying `default_offset` if it carries no zone.
pub fn parse_timestamp(text: &str, default_offset: UtcOffset) -> Result<Timestamp, TimestampError> {
    let text = text.trim();
    let bad_format = || TimestampError::BadFormat(text.to_string());
    let prefix = text.get(..DATETIME_PREFIX_LEN).ok_or_else(bad_format)?;
    let prefix = prefix.replacen('T', " ", 1);
    let datetime = PrimitiveDateTime::parse(&prefix, DATETIME_FORMAT)?;

    let mut rest = &text[DATETIME_PREFIX_LEN..];
    let mut nanos: u32 = 0;
    if let Some(fraction) = rest.strip_prefix('.') {
        let n_digits = fraction
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(fraction.len());
        if n_digits == 0 {
            return Err(bad_format());
        }
        // Anything past nanosecond precision is dropped
        let digits: String = fraction[..n_digits]
            .chars()
            .chain(std::iter::repeat('0'))
            .take(9)
            .collect();
        nanos = digits.parse().map_err(|_| bad_format())?;
        rest = &fraction[n_digits..];
    }
    let datetime = datetime.replace_nanosecond(nanos)?;

    let offset = if rest.is_empty() {
        default_offset
    } else {
        parse_offset(rest)?
    };
    Ok(datetime.assume_offset(offset))
}

/// Format a timestamp in the on-disk text form (always with microseconds and offset)
pub fn format_timestamp(timestamp: &Timestamp) -> Result<String, TimestampError> {
    Ok(timestamp.format(DATETIME_OUTPUT_FORMAT)?)
}

/// Seconds elapsed from `reference` to `timestamp` (negative if `timestamp` is earlier)
pub fn seconds_since(timestamp: &Timestamp, reference: &Timestamp) -> f64 {
    (*timestamp - *reference).as_seconds_f64()
}

/// Convert a whole sequence to seconds relative to `reference`
pub fn to_seconds(timestamps: &[Timestamp], reference: &Timestamp) -> Vec<f64> {
    timestamps
        .iter()
        .map(|t| seconds_since(t, reference))
        .collect()
}

/// The period of a frame rate, exact to the nanosecond.
pub fn frame_offset(index: usize, fps: u32) -> Result<Duration, TimestampError> {
    if fps == 0 {
        return Err(TimestampError::ZeroStep(fps));
    }
    let nanos = (index as i128 * NANOS_PER_SECOND) / fps as i128;
    Ok(Duration::nanoseconds(nanos as i64))
}

/// Half-open range `[start, end)` sampled at `fps`.
///
/// Entry `i` is computed as `start + i/fps` rather than by repeated addition, so
/// the spacing does not drift over long experiments.
pub fn time_range(start: Timestamp, end: Timestamp, fps: u32) -> Result<Vec<Timestamp>, TimestampError> {
    let mut range = Vec::new();
    let mut index = 0;
    loop {
        let t = start + frame_offset(index, fps)?;
        if t >= end {
            break;
        }
        range.push(t);
        index += 1;
    }
    Ok(range)
}

/// `n` entries starting at `start`, sampled at `fps`
pub fn timeline_from_start(start: Timestamp, fps: u32, n: usize) -> Result<Vec<Timestamp>, TimestampError> {
    (0..n)
        .map(|index| Ok(start + frame_offset(index, fps)?))
        .collect()
}

/// Label an elapsed time for a plot axis, e.g. `00:03`, `-00:01.500000`, `1:02:03`.
///
/// Hours are dropped when zero, and microseconds are only shown when non-zero.
pub fn elapsed_label(seconds: f64) -> String {
    let is_negative = seconds < 0.0;
    let total_micros = (seconds.abs() * 1e6).round() as u64;
    let micros = total_micros % 1_000_000;
    let total_seconds = total_micros / 1_000_000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds / 60) % 60;
    let secs = total_seconds % 60;

    let mut label = if hours == 0 {
        format!("{minutes:02}:{secs:02}")
    } else {
        format!("{hours}:{minutes:02}:{secs:02}")
    };
    if micros != 0 {
        label.push_str(&format!(".{micros:06}"));
    }
    if is_negative && total_micros != 0 {
        label.insert(0, '-');
    }
    label
}
