// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! PLC date/time decoding and time zone conversion.
//!
//! The controller exposes date/times as seven UTC integer parts
//! `(year, month, day, hour, minute, second, millisecond)`. They are turned
//! into a zoned timestamp according to a [`TimeZonePolicy`]. The default is
//! Central European time with EU daylight saving rules, which is what the
//! machine floor displays.

use chrono::{
    DateTime, Datelike, Duration as ChronoDuration, FixedOffset, NaiveDate, Offset, TimeZone, Utc,
};
use serde::{Deserialize, Serialize};

use crate::error::ConversionError;

/// A timestamp shifted into the configured zone.
pub type LocalTimestamp = DateTime<FixedOffset>;

/// Number of integer parts in a PLC date/time.
pub const TIMESTAMP_PARTS: usize = 7;

// =============================================================================
// TimeZonePolicy
// =============================================================================

/// Target zone for PLC timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimeZonePolicy {
    /// CET/CEST ("W. Europe Standard Time").
    #[default]
    CentralEuropean,
    /// Keep UTC.
    Utc,
    /// A fixed offset east of UTC.
    FixedOffset {
        /// Offset in minutes.
        minutes: i32,
    },
}

impl TimeZonePolicy {
    /// Offset in effect at `instant`.
    pub fn offset_at(&self, instant: DateTime<Utc>) -> FixedOffset {
        let seconds = match self {
            Self::CentralEuropean => {
                if is_eu_summer_time(instant) {
                    2 * 3600
                } else {
                    3600
                }
            }
            Self::Utc => 0,
            Self::FixedOffset { minutes } => minutes * 60,
        };
        // Offsets outside +-24h fall back to UTC.
        FixedOffset::east_opt(seconds).unwrap_or_else(|| Utc.fix())
    }

    /// Converts a UTC instant into this zone.
    pub fn convert(&self, instant: DateTime<Utc>) -> LocalTimestamp {
        instant.with_timezone(&self.offset_at(instant))
    }
}

/// Summer time runs from the last Sunday of March 01:00 UTC to the last
/// Sunday of October 01:00 UTC.
fn is_eu_summer_time(instant: DateTime<Utc>) -> bool {
    let year = instant.year();
    match (transition(year, 3), transition(year, 10)) {
        (Some(start), Some(end)) => instant >= start && instant < end,
        _ => false,
    }
}

fn transition(year: i32, month: u32) -> Option<DateTime<Utc>> {
    let day = last_sunday(year, month)?;
    Some(Utc.from_utc_datetime(&day.and_hms_opt(1, 0, 0)?))
}

fn last_sunday(year: i32, month: u32) -> Option<NaiveDate> {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    let last = first_of_next.pred_opt()?;
    let back = i64::from(last.weekday().num_days_from_sunday());
    Some(last - ChronoDuration::days(back))
}

// =============================================================================
// Parts decoding
// =============================================================================

/// Builds a UTC instant from `(year, month, day, hour, minute, second, ms)`.
pub fn utc_from_parts(parts: &[i32; TIMESTAMP_PARTS]) -> Result<DateTime<Utc>, ConversionError> {
    let [year, month, day, hour, minute, second, millis] = *parts;
    let unsigned = |v: i32, name: &str| {
        u32::try_from(v).map_err(|_| ConversionError::invalid_timestamp(format!("{} {} is negative", name, v)))
    };

    let date = NaiveDate::from_ymd_opt(year, unsigned(month, "month")?, unsigned(day, "day")?)
        .ok_or_else(|| {
            ConversionError::invalid_timestamp(format!("{:04}-{:02}-{:02} is not a date", year, month, day))
        })?;
    let time = date
        .and_hms_milli_opt(
            unsigned(hour, "hour")?,
            unsigned(minute, "minute")?,
            unsigned(second, "second")?,
            unsigned(millis, "millisecond")?,
        )
        .ok_or_else(|| {
            ConversionError::invalid_timestamp(format!(
                "{:02}:{:02}:{:02}.{:03} is not a time of day",
                hour, minute, second, millis
            ))
        })?;

    Ok(Utc.from_utc_datetime(&time))
}

/// Decodes PLC parts and converts them into `policy`'s zone.
pub fn local_from_parts(
    parts: &[i32; TIMESTAMP_PARTS],
    policy: TimeZonePolicy,
) -> Result<LocalTimestamp, ConversionError> {
    utc_from_parts(parts).map(|utc| policy.convert(utc))
}

/// Formats whole seconds as `hh:mm:ss`, the hour wrapping at 24.
pub fn format_elapsed(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!(
        "{:02}:{:02}:{:02}",
        (seconds / 3600) % 24,
        (seconds / 60) % 60,
        seconds % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_sunday() {
        assert_eq!(last_sunday(2025, 3), NaiveDate::from_ymd_opt(2025, 3, 30));
        assert_eq!(last_sunday(2025, 10), NaiveDate::from_ymd_opt(2025, 10, 26));
        assert_eq!(last_sunday(2024, 3), NaiveDate::from_ymd_opt(2024, 3, 31));
        assert_eq!(last_sunday(2026, 12), NaiveDate::from_ymd_opt(2026, 12, 27));
    }

    #[test]
    fn test_central_european_winter_and_summer() {
        let policy = TimeZonePolicy::CentralEuropean;

        let winter = local_from_parts(&[2025, 1, 15, 12, 0, 0, 0], policy).unwrap();
        assert_eq!(winter.offset().local_minus_utc(), 3600);
        assert_eq!(winter.format("%H:%M:%S").to_string(), "13:00:00");

        let summer = local_from_parts(&[2025, 7, 1, 12, 30, 15, 250], policy).unwrap();
        assert_eq!(summer.offset().local_minus_utc(), 7200);
        assert_eq!(summer.format("%H:%M:%S%.3f").to_string(), "14:30:15.250");
    }

    #[test]
    fn test_dst_boundaries() {
        let policy = TimeZonePolicy::CentralEuropean;
        let before = Utc.with_ymd_and_hms(2025, 3, 30, 0, 59, 59).unwrap();
        let after = Utc.with_ymd_and_hms(2025, 3, 30, 1, 0, 0).unwrap();
        assert_eq!(policy.offset_at(before).local_minus_utc(), 3600);
        assert_eq!(policy.offset_at(after).local_minus_utc(), 7200);

        let before = Utc.with_ymd_and_hms(2025, 10, 26, 0, 59, 59).unwrap();
        let after = Utc.with_ymd_and_hms(2025, 10, 26, 1, 0, 0).unwrap();
        assert_eq!(policy.offset_at(before).local_minus_utc(), 7200);
        assert_eq!(policy.offset_at(after).local_minus_utc(), 3600);
    }

    #[test]
    fn test_other_policies() {
        let utc = local_from_parts(&[2025, 7, 1, 12, 0, 0, 0], TimeZonePolicy::Utc).unwrap();
        assert_eq!(utc.offset().local_minus_utc(), 0);

        let fixed = TimeZonePolicy::FixedOffset { minutes: -300 };
        let ts = local_from_parts(&[2025, 7, 1, 12, 0, 0, 0], fixed).unwrap();
        assert_eq!(ts.format("%H").to_string(), "07");
    }

    #[test]
    fn test_invalid_parts() {
        assert!(utc_from_parts(&[0, 0, 0, 0, 0, 0, 0]).is_err());
        assert!(utc_from_parts(&[2025, 2, 30, 0, 0, 0, 0]).is_err());
        assert!(utc_from_parts(&[2025, 1, 1, 24, 0, 0, 0]).is_err());
        assert!(utc_from_parts(&[2025, -1, 1, 0, 0, 0, 0]).is_err());
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(0), "00:00:00");
        assert_eq!(format_elapsed(3725), "01:02:05");
        assert_eq!(format_elapsed(90_000), "01:00:00");
        assert_eq!(format_elapsed(-5), "00:00:00");
    }
}
