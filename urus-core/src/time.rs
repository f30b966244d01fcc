//! Wall-clock helpers for schedule entries.

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};

use crate::error::{UrusError, UrusResult};

/// Today's date in the local timezone.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Parse a 24h "HH:MM" string.
pub fn parse_hhmm(s: &str) -> UrusResult<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M").map_err(|_| UrusError::InvalidTime(s.to_string()))
}

/// Resolve an "HH:MM" range on `day`. An end at or before the start runs past midnight.
pub fn time_range_on(
    day: NaiveDate,
    start: &str,
    end: &str,
) -> UrusResult<(NaiveDateTime, NaiveDateTime)> {
    let start = day.and_time(parse_hhmm(start)?);
    let mut end = day.and_time(parse_hhmm(end)?);
    if end <= start {
        end += TimeDelta::days(1);
    }
    Ok((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 20).unwrap()
    }

    #[test]
    fn test_parse_hhmm() {
        assert_eq!(
            parse_hhmm("07:30").unwrap(),
            NaiveTime::from_hms_opt(7, 30, 0).unwrap()
        );
        assert!(parse_hhmm("7.30").is_err());
        assert!(parse_hhmm("25:00").is_err());
    }

    #[test]
    fn test_range_same_day() {
        let (start, end) = time_range_on(day(), "09:00", "10:15").unwrap();
        assert_eq!(start.date(), day());
        assert_eq!(end - start, TimeDelta::minutes(75));
    }

    #[test]
    fn test_range_overnight() {
        let (start, end) = time_range_on(day(), "23:00", "01:00").unwrap();
        assert_eq!(end.date(), day().succ_opt().unwrap());
        assert_eq!(end - start, TimeDelta::hours(2));
    }
}
