use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Longest accepted location name, in characters.
pub const MAX_LOCATION_LEN: usize = 64;
/// Longest accepted user identifier, in bytes.
pub const MAX_USER_ID_LEN: usize = 128;

/// Canonical on-disk timestamp layout: minute precision, always UTC.
///
/// Fixed width, so lexicographic order of the strings is chronological order.
const CANONICAL_FORMAT: &str = "%Y-%m-%dT%H:%M:00Z";
/// Last year that still formats as four digits.
const MAX_YEAR: i32 = 9999;

/// A grouping key under which users wait and events are scheduled.
///
/// Letters, digits, `_`, `-`, `.` and inner spaces are accepted
/// (e.g. `"berlin"`, `"hq-2nd floor"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Location(String);

impl Location {
    pub fn parse(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        let reject = |reason: &str| ValidationError::Location {
            value: value.clone(),
            reason: reason.to_string(),
        };

        if value.trim().is_empty() {
            return Err(reject("must not be empty"));
        }
        if value.trim() != value {
            return Err(reject("must not start or end with whitespace"));
        }
        if value.chars().count() > MAX_LOCATION_LEN {
            return Err(reject("too long"));
        }
        if let Some(c) = value
            .chars()
            .find(|c| !(c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ' ')))
        {
            return Err(reject(&format!("unexpected character {c:?}")));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Location {
    type Error = ValidationError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Location> for String {
    fn from(value: Location) -> Self {
        value.0
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Location {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Opaque chat-platform user identifier (e.g. a Slack member ID).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    pub fn parse(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        let reject = |reason: &str| ValidationError::User {
            value: value.clone(),
            reason: reason.to_string(),
        };

        if value.is_empty() {
            return Err(reject("must not be empty"));
        }
        if value.len() > MAX_USER_ID_LEN {
            return Err(reject("too long"));
        }
        if value.chars().any(|c| c.is_control() || c.is_whitespace()) {
            return Err(reject("must not contain whitespace or control characters"));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for UserId {
    type Error = ValidationError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<UserId> for String {
    fn from(value: UserId) -> Self {
        value.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for UserId {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A minute-precision UTC instant stored as `YYYY-MM-DDTHH:MM:00Z`.
///
/// Every timestamp that reaches storage goes through [`Timestamp::parse`],
/// so two spellings of the same minute always compare equal. Years are
/// limited to 0000-9999 so the text is fixed-width and sorts chronologically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timestamp {
    canonical: String,
    instant: DateTime<Utc>,
}

impl Timestamp {
    /// Parse and canonicalise a caller-supplied timestamp.
    ///
    /// Accepted inputs:
    ///   - RFC 3339 with any offset (`2026-10-19T13:30:00+02:00`)
    ///   - naive date-time, taken as UTC (`2026-10-19T11:30`, `2026-10-19 11:30:15`)
    ///   - bare date, midnight UTC (`2026-10-19`)
    ///
    /// Seconds and below are truncated.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        let trimmed = value.trim();
        let reject = |reason: &str| ValidationError::Timestamp {
            value: value.to_string(),
            reason: reason.to_string(),
        };
        let parsed = parse_utc(trimmed)
            .ok_or_else(|| reject("expected an ISO-8601 date or date-time"))?;
        Self::from_datetime(parsed).map_err(|_| reject("year must be between 0000 and 9999"))
    }

    /// Truncate `dt` to the minute. Fails outside years 0000-9999.
    pub fn from_datetime(dt: DateTime<Utc>) -> Result<Self, ValidationError> {
        if !(0..=MAX_YEAR).contains(&dt.year()) {
            return Err(ValidationError::Timestamp {
                value: dt.to_rfc3339(),
                reason: "year must be between 0000 and 9999".to_string(),
            });
        }
        Ok(Self::truncated(dt))
    }

    /// The current minute.
    pub fn now() -> Self {
        // The system clock is always inside the accepted year range.
        Self::truncated(Utc::now())
    }

    fn truncated(dt: DateTime<Utc>) -> Self {
        let instant = dt
            .with_second(0)
            .and_then(|d| d.with_nanosecond(0))
            .unwrap_or(dt);
        Self {
            canonical: instant.format(CANONICAL_FORMAT).to_string(),
            instant,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    /// Calendar day part, `YYYY-MM-DD`.
    pub fn date(&self) -> &str {
        &self.canonical[..10]
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        self.instant
    }
}

fn parse_utc(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
}

impl TryFrom<String> for Timestamp {
    type Error = ValidationError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Timestamp> for String {
    fn from(value: Timestamp) -> Self {
        value.canonical
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl std::str::FromStr for Timestamp {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_accepts_office_names() {
        assert!(Location::parse("berlin").is_ok());
        assert!(Location::parse("hq-2nd floor").is_ok());
        assert!(Location::parse("new_york.east").is_ok());
    }

    #[test]
    fn location_rejects_bad_names() {
        assert!(Location::parse("").is_err());
        assert!(Location::parse("   ").is_err());
        assert!(Location::parse(" hq").is_err());
        assert!(Location::parse("hq#1").is_err());
        assert!(Location::parse("x".repeat(MAX_LOCATION_LEN + 1)).is_err());
    }

    #[test]
    fn user_id_rejects_whitespace() {
        assert!(UserId::parse("U024BE7LH").is_ok());
        assert!(UserId::parse("").is_err());
        assert!(UserId::parse("a b").is_err());
    }

    #[test]
    fn timestamp_canonicalises_equivalent_spellings() {
        let a = Timestamp::parse("2026-10-19T11:30").unwrap();
        let b = Timestamp::parse("2026-10-19T11:30:42.123Z").unwrap();
        let c = Timestamp::parse("2026-10-19T13:30:00+02:00").unwrap();
        let d = Timestamp::parse("2026-10-19 11:30:00").unwrap();
        assert_eq!(a.as_str(), "2026-10-19T11:30:00Z");
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a, d);
    }

    #[test]
    fn timestamp_bare_date_is_midnight() {
        let t = Timestamp::parse("2026-12-24").unwrap();
        assert_eq!(t.as_str(), "2026-12-24T00:00:00Z");
        assert_eq!(t.date(), "2026-12-24");
    }

    #[test]
    fn timestamp_rejects_garbage() {
        assert!(Timestamp::parse("next monday").is_err());
        assert!(Timestamp::parse("2026-13-01").is_err());
        assert!(Timestamp::parse("").is_err());
    }

    #[test]
    fn timestamp_rejects_years_outside_four_digits() {
        for input in ["+12345-01-01T00:00", "-0001-01-01T00:00", "9999-12-31T23:30:00-05:00"] {
            let err = Timestamp::parse(input).unwrap_err();
            assert!(matches!(err, ValidationError::Timestamp { .. }), "{input}");
        }
        let last = Timestamp::parse("9999-12-31T23:59").unwrap();
        assert_eq!(last.date(), "9999-12-31");
        let first = Timestamp::parse("0000-01-01").unwrap();
        assert_eq!(first.as_str(), "0000-01-01T00:00:00Z");
        assert!(first < Timestamp::parse("2026-10-16").unwrap());
    }

    #[test]
    fn timestamp_round_trips_through_datetime() {
        let t = Timestamp::parse("2030-01-07T11:30:59Z").unwrap();
        assert_eq!(t.to_datetime().to_rfc3339(), "2030-01-07T11:30:00+00:00");
        assert_eq!(Timestamp::from_datetime(t.to_datetime()).unwrap(), t);
    }

    #[test]
    fn timestamp_order_is_chronological() {
        let earlier = Timestamp::parse("2026-09-30T23:59").unwrap();
        let later = Timestamp::parse("2026-10-01T00:00").unwrap();
        assert!(earlier < later);
        assert!(earlier.as_str() < later.as_str());
    }

    #[test]
    fn timestamp_serde_validates() {
        let ok: Timestamp = serde_json::from_str("\"2026-10-19T11:30\"").unwrap();
        assert_eq!(ok.as_str(), "2026-10-19T11:30:00Z");
        assert!(serde_json::from_str::<Timestamp>("\"soon\"").is_err());
    }
}
