// Presale countdown math. The configured end date is interpreted in a
// fixed UTC offset; the pack ships no timezone database and the alert only
// needs day/hour/minute resolution.

use crate::error::CoreError;
use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
    pub ended: bool,
}

/// Parse a `YYYY-MM-DD HH:MM:SS` end date in the given UTC offset.
pub fn parse_end_date(s: &str, utc_offset_hours: i8) -> Result<DateTime<Utc>, CoreError> {
    let naive = NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S")
        .map_err(|e| CoreError::Validation(format!("invalid presale_end_date {:?}: {}", s, e)))?;
    let offset = FixedOffset::east_opt(utc_offset_hours as i32 * 3600)
        .ok_or_else(|| CoreError::Validation(format!("invalid utc_offset_hours {}", utc_offset_hours)))?;
    let local = naive
        .and_local_timezone(offset)
        .single()
        .ok_or_else(|| CoreError::Validation(format!("ambiguous presale_end_date {:?}", s)))?;
    Ok(local.with_timezone(&Utc))
}

/// Time remaining until `end`, split for display.
pub fn countdown_to(end: DateTime<Utc>, now: DateTime<Utc>) -> Countdown {
    let remaining = end - now;
    let total_seconds = remaining.num_seconds();
    if total_seconds <= 0 {
        return Countdown {
            days: 0,
            hours: 0,
            minutes: 0,
            seconds: 0,
            ended: true,
        };
    }
    Countdown {
        days: total_seconds / 86_400,
        hours: (total_seconds % 86_400) / 3_600,
        minutes: (total_seconds % 3_600) / 60,
        seconds: total_seconds % 60,
        ended: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_utc_end_date() {
        let end = parse_end_date("2025-09-06 23:59:59", 0).unwrap();
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 9, 6, 23, 59, 59).unwrap());
    }

    #[test]
    fn offset_shifts_the_instant() {
        // 23:59:59 at UTC+2 is 21:59:59 UTC.
        let end = parse_end_date("2025-09-06 23:59:59", 2).unwrap();
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 9, 6, 21, 59, 59).unwrap());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_end_date("next tuesday", 0).is_err());
        assert!(parse_end_date("2025-09-06", 0).is_err());
    }

    #[test]
    fn splits_remaining_time() {
        let end = Utc.with_ymd_and_hms(2025, 9, 6, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 9, 3, 21, 29, 45).unwrap();
        let c = countdown_to(end, now);
        assert!(!c.ended);
        assert_eq!(c.days, 2);
        assert_eq!(c.hours, 2);
        assert_eq!(c.minutes, 30);
        assert_eq!(c.seconds, 15);
    }

    #[test]
    fn past_end_is_ended() {
        let end = Utc.with_ymd_and_hms(2025, 9, 6, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 9, 7, 0, 0, 0).unwrap();
        let c = countdown_to(end, now);
        assert!(c.ended);
        assert_eq!(c.days, 0);
        assert_eq!(c.hours, 0);
    }

    #[test]
    fn exact_end_counts_as_ended() {
        let end = Utc.with_ymd_and_hms(2025, 9, 6, 0, 0, 0).unwrap();
        assert!(countdown_to(end, end).ended);
    }
}
