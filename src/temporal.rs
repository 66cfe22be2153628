// ⏰ Time Normalizer
// Turns the date and clock strings found in bank exports into canonical
// UTC instants and 24-hour buckets.

use chrono::{DateTime, Datelike, NaiveDate, SecondsFormat, Utc};
use thiserror::Error;

/// Only accepted calendar date layout.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Years whose instants store as fixed-width `YYYY` text.
pub const MIN_YEAR: i32 = 1;
pub const MAX_YEAR: i32 = 9999;

// ============================================================================
// ERRORS
// ============================================================================

/// A date string that could not be parsed.
///
/// Still carries a usable instant ("now" at parse time) so callers that want to
/// degrade gracefully can, but the error itself must be looked at first.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid date '{input}': expected YYYY-MM-DD")]
pub struct DateParseError {
    input: String,
    fallback: DateTime<Utc>,
}

impl DateParseError {
    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn fallback(&self) -> DateTime<Utc> {
        self.fallback
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClockTimeError {
    #[error("clock time '{0}' is missing an AM/PM marker")]
    MissingMeridiem(String),

    #[error("clock time '{0}' has an unknown AM/PM marker")]
    UnknownMeridiem(String),

    #[error("clock time '{0}' has a non-numeric hour")]
    InvalidHour(String),

    #[error("clock time '{0}' has an hour outside 1..=12")]
    HourOutOfRange(String),
}

// ============================================================================
// DATES
// ============================================================================

/// Parse a `YYYY-MM-DD` date into midnight UTC.
///
/// Empty input yields the current instant and is not an error.
pub fn parse_date(text: &str) -> Result<DateTime<Utc>, DateParseError> {
    parse_date_at(text, Utc::now())
}

/// Same as [`parse_date`] with an explicit "now".
pub fn parse_date_at(text: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, DateParseError> {
    let text = text.trim();
    if text.is_empty() {
        tracing::debug!("blank date, defaulting to {}", now);
        return Ok(now);
    }

    // chrono's %Y also takes signed, short and over-long years
    if !has_date_shape(text) {
        return Err(DateParseError {
            input: text.to_string(),
            fallback: now,
        });
    }

    NaiveDate::parse_from_str(text, DATE_FORMAT)
        .ok()
        .filter(|date| year_in_range(date.year()))
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| DateParseError {
            input: text.to_string(),
            fallback: now,
        })
}

/// Resolve the `occurred_at` of an incoming record.
///
/// Accepts full RFC 3339 timestamps (as produced by our own listing output) in
/// addition to plain dates; everything else goes through [`parse_date_at`].
pub fn normalize_occurred_at(
    text: &str,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, DateParseError> {
    let trimmed = text.trim();
    if trimmed.len() > 10 {
        if let Ok(instant) = DateTime::parse_from_rfc3339(trimmed) {
            let instant = instant.with_timezone(&Utc);
            if year_in_range(instant.year()) {
                return Ok(instant);
            }
        }
    }
    parse_date_at(trimmed, now)
}

/// Exactly `dddd-dd-dd`, zero-padded.
fn has_date_shape(text: &str) -> bool {
    let bytes = text.as_bytes();
    bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        })
}

fn year_in_range(year: i32) -> bool {
    (MIN_YEAR..=MAX_YEAR).contains(&year)
}

/// Canonical text form used in identity digests (second precision).
pub fn render_instant(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Fixed-width storage form; lexical order equals chronological order.
pub fn storage_instant(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// The calendar month before `(year, month)`, wrapping January to December.
pub fn previous_month(year: i32, month: u32) -> (i32, u32) {
    if month <= 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}

// ============================================================================
// CLOCK TIMES
// ============================================================================

/// Convert a 12-hour clock string (`H:MM AM` / `HH:MM PM`) to an hour 0..=23.
///
/// 12 AM is midnight (0), 12 PM is noon (12), other PM hours gain 12.
pub fn hour_of_day(clock_time: &str) -> Result<u32, ClockTimeError> {
    let mut parts = clock_time.split_whitespace();
    let hour_minute = parts
        .next()
        .ok_or_else(|| ClockTimeError::InvalidHour(clock_time.to_string()))?;
    let meridiem = parts
        .next()
        .ok_or_else(|| ClockTimeError::MissingMeridiem(clock_time.to_string()))?;

    let hour: u32 = hour_minute
        .split(':')
        .next()
        .and_then(|h| h.parse().ok())
        .ok_or_else(|| ClockTimeError::InvalidHour(clock_time.to_string()))?;

    if !(1..=12).contains(&hour) {
        return Err(ClockTimeError::HourOutOfRange(clock_time.to_string()));
    }

    match meridiem.to_ascii_uppercase().as_str() {
        "AM" => Ok(if hour == 12 { 0 } else { hour }),
        "PM" => Ok(if hour == 12 { 12 } else { hour + 12 }),
        _ => Err(ClockTimeError::UnknownMeridiem(clock_time.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike};

    #[test]
    fn test_hour_of_day_conversion_rule() {
        assert_eq!(hour_of_day("12:00 AM").unwrap(), 0);
        assert_eq!(hour_of_day("12:00 PM").unwrap(), 12);
        assert_eq!(hour_of_day("1:05 AM").unwrap(), 1);
        assert_eq!(hour_of_day("1:05 PM").unwrap(), 13);
        assert_eq!(hour_of_day("11:59 PM").unwrap(), 23);
        assert_eq!(hour_of_day("09:30 am").unwrap(), 9);
    }

    #[test]
    fn test_hour_of_day_rejects_malformed_input() {
        assert_eq!(
            hour_of_day("13:00"),
            Err(ClockTimeError::MissingMeridiem("13:00".into()))
        );
        assert_eq!(
            hour_of_day("ab:00 PM"),
            Err(ClockTimeError::InvalidHour("ab:00 PM".into()))
        );
        assert_eq!(
            hour_of_day("13:00 PM"),
            Err(ClockTimeError::HourOutOfRange("13:00 PM".into()))
        );
        assert_eq!(
            hour_of_day("1:00 XM"),
            Err(ClockTimeError::UnknownMeridiem("1:00 XM".into()))
        );
        assert!(hour_of_day("").is_err());
    }

    #[test]
    fn test_parse_date_blank_is_now() {
        let before = Utc::now();
        let parsed = parse_date("").unwrap();
        let after = Utc::now();
        assert!(parsed >= before && parsed <= after);
    }

    #[test]
    fn test_parse_date_valid_is_midnight_utc() {
        let parsed = parse_date("2024-03-05").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap());
        assert_eq!(parsed.hour(), 0);
    }

    #[test]
    fn test_parse_date_invalid_month_carries_fallback() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 8, 30, 0).unwrap();
        let err = parse_date_at("2024-13-01", now).unwrap_err();
        assert_eq!(err.input(), "2024-13-01");
        assert_eq!(err.fallback(), now);

        let err = parse_date("2024-13-01").unwrap_err();
        assert!(err.fallback().year() >= 2024);
    }

    #[test]
    fn test_normalize_accepts_rfc3339() {
        let now = Utc::now();
        let parsed = normalize_occurred_at("2024-03-05T14:10:00+02:00", now).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 3, 5, 12, 10, 0).unwrap());

        let plain = normalize_occurred_at("2024-03-05", now).unwrap();
        assert_eq!(plain, Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap());

        assert!(normalize_occurred_at("05/03/2024", now).is_err());
    }

    #[test]
    fn test_parse_date_requires_zero_padded_shape() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 8, 30, 0).unwrap();
        for input in ["2024-3-5", "24-03-05", "2024-03-5", "2024/03/05", "2024-03-05x"] {
            let err = parse_date_at(input, now).unwrap_err();
            assert_eq!(err.input(), input);
            assert_eq!(err.fallback(), now);
        }
    }

    #[test]
    fn test_parse_date_rejects_years_outside_four_digits() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 8, 30, 0).unwrap();
        for input in ["+10000-01-01", "-0001-01-01", "+2024-01-01", "0000-01-01"] {
            let err = parse_date_at(input, now).unwrap_err();
            assert_eq!(err.fallback(), now);
        }

        assert_eq!(
            parse_date_at("0001-01-01", now).unwrap(),
            Utc.with_ymd_and_hms(1, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_date_at("9999-12-31", now).unwrap(),
            Utc.with_ymd_and_hms(9999, 12, 31, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_normalize_rejects_rfc3339_outside_four_digit_years() {
        let now = Utc::now();
        // Shifts into year 10000 once converted to UTC
        assert!(normalize_occurred_at("9999-12-31T23:00:00-05:00", now).is_err());
        assert!(normalize_occurred_at("0000-06-01T00:00:00Z", now).is_err());

        let edge = normalize_occurred_at("9999-12-31T23:00:00Z", now).unwrap();
        assert_eq!(edge.year(), 9999);
        assert_eq!(storage_instant(&edge), "9999-12-31T23:00:00.000Z");
    }

    #[test]
    fn test_previous_month_wraps_year() {
        assert_eq!(previous_month(2024, 1), (2023, 12));
        assert_eq!(previous_month(2024, 3), (2024, 2));
        assert_eq!(previous_month(2024, 12), (2024, 11));
    }

    #[test]
    fn test_instant_renderings() {
        let instant = Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap();
        assert_eq!(render_instant(&instant), "2024-03-05T00:00:00Z");
        assert_eq!(storage_instant(&instant), "2024-03-05T00:00:00.000Z");
    }
}
