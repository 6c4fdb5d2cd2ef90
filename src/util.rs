use crate::error::PulseError;
use chrono::{DateTime, Datelike, FixedOffset, Local, NaiveDate, NaiveDateTime, Timelike};
use std::str::FromStr;

/// Zone used when bucketing commits into days and weekday/hour cells.
/// Raw commit timestamps are never rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayZone {
    #[default]
    Local,
    Utc,
    Fixed(FixedOffset),
}

impl DisplayZone {
    pub fn localize(&self, at: &DateTime<FixedOffset>) -> NaiveDateTime {
        match self {
            DisplayZone::Local => at.with_timezone(&Local).naive_local(),
            DisplayZone::Utc => at.naive_utc(),
            DisplayZone::Fixed(offset) => at.with_timezone(offset).naive_local(),
        }
    }

    pub fn day_of(&self, at: &DateTime<FixedOffset>) -> NaiveDate {
        self.localize(at).date()
    }

    /// (weekday with Monday = 0, hour)
    pub fn weekday_hour(&self, at: &DateTime<FixedOffset>) -> (usize, usize) {
        let local = self.localize(at);
        (
            local.weekday().num_days_from_monday() as usize,
            local.hour() as usize,
        )
    }
}

impl FromStr for DisplayZone {
    type Err = PulseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "local" => return Ok(DisplayZone::Local),
            "utc" | "z" => return Ok(DisplayZone::Utc),
            _ => {}
        }

        let invalid = || PulseError::InvalidTimezone(input.to_string());
        let (sign, rest) = match trimmed.as_bytes().first() {
            Some(b'+') => (1, &trimmed[1..]),
            Some(b'-') => (-1, &trimmed[1..]),
            _ => return Err(invalid()),
        };
        if !rest.bytes().all(|b| b.is_ascii_digit() || b == b':') {
            return Err(invalid());
        }
        let (hours, minutes) = match rest.split_once(':') {
            Some((h, m)) => (h, m),
            None if rest.len() == 4 => (
                rest.get(..2).ok_or_else(invalid)?,
                rest.get(2..).ok_or_else(invalid)?,
            ),
            None => (rest, "0"),
        };
        let hours: i32 = hours.parse().map_err(|_| invalid())?;
        let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
        if hours > 23 || minutes > 59 {
            return Err(invalid());
        }
        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
            .map(DisplayZone::Fixed)
            .ok_or_else(invalid)
    }
}

/// Top-level path segment of a repository path, `.` for root files.
pub fn top_dir(path: &str) -> &str {
    let path = path.trim_start_matches("./");
    match path.split_once('/') {
        Some((first, _)) if !first.is_empty() => first,
        _ => ".",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_dir_uses_first_segment() {
        assert_eq!(top_dir("src/git/parser.rs"), "src");
        assert_eq!(top_dir("README.md"), ".");
        assert_eq!(top_dir("./docs/a.md"), "docs");
    }

    #[test]
    fn parses_zones() {
        assert_eq!("UTC".parse::<DisplayZone>().unwrap(), DisplayZone::Utc);
        assert_eq!("local".parse::<DisplayZone>().unwrap(), DisplayZone::Local);
        assert_eq!(
            "+05:30".parse::<DisplayZone>().unwrap(),
            DisplayZone::Fixed(FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap())
        );
        assert_eq!(
            "-0800".parse::<DisplayZone>().unwrap(),
            DisplayZone::Fixed(FixedOffset::west_opt(8 * 3600).unwrap())
        );
        assert!("mars".parse::<DisplayZone>().is_err());
    }

    #[test]
    fn rejects_malformed_offsets_without_panicking() {
        for input in ["+1é1", "-é", "+", "++5", "+05:3x", "+24:00", "+12:60"] {
            assert!(
                matches!(input.parse::<DisplayZone>(), Err(PulseError::InvalidTimezone(_))),
                "{input} should be rejected"
            );
        }
    }

    #[test]
    fn buckets_in_display_zone() {
        let at = DateTime::parse_from_rfc3339("2024-01-01T23:30:00+00:00").unwrap();
        let tokyo: DisplayZone = "+09:00".parse().unwrap();
        assert_eq!(tokyo.day_of(&at), NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        // 2024-01-02 is a Tuesday
        assert_eq!(tokyo.weekday_hour(&at), (1, 8));
        assert_eq!(DisplayZone::Utc.weekday_hour(&at), (0, 23));
    }
}
