//! CF time decoding and calendar harmonisation.
//!
//! Model archives encode time as `<unit> since <epoch>` offsets in a
//! variety of calendars. Decoding yields calendar-agnostic [`CfDate`]s which
//! are then truncated to the first of the month so that monthly series from
//! different calendars share the same labels.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use crate::error::{CmipError, CmipResult};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Guards against `floor` landing one day early on values like 30.999999999.
const DAY_EPSILON: f64 = 1e-9;

/// Largest accepted offset from the epoch, about ten million years.
/// Anything larger is a fill value that slipped through unmasked.
pub const MAX_OFFSET_DAYS: f64 = 3.652_425e9;

/// Unit of a CF time offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    /// Length of one unit in days.
    pub fn in_days(&self) -> f64 {
        match self {
            TimeUnit::Seconds => 1.0 / SECONDS_PER_DAY,
            TimeUnit::Minutes => 1.0 / 1440.0,
            TimeUnit::Hours => 1.0 / 24.0,
            TimeUnit::Days => 1.0,
        }
    }
}

impl FromStr for TimeUnit {
    type Err = CmipError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "seconds" | "second" | "secs" | "sec" | "s" => Ok(TimeUnit::Seconds),
            "minutes" | "minute" | "mins" | "min" => Ok(TimeUnit::Minutes),
            "hours" | "hour" | "hrs" | "hr" | "h" => Ok(TimeUnit::Hours),
            "days" | "day" | "d" => Ok(TimeUnit::Days),
            _ => Err(CmipError::InvalidTimeUnits(format!("unknown unit '{}'", s))),
        }
    }
}

/// CF calendars found across the archives.
///
/// `standard`/`gregorian` are treated as proleptic Gregorian; the archives
/// start well after the 1582 switch-over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Calendar {
    #[default]
    Standard,
    ProlepticGregorian,
    Julian,
    NoLeap,
    AllLeap,
    Day360,
}

impl Calendar {
    pub fn is_leap(&self, year: i32) -> bool {
        match self {
            Calendar::Standard | Calendar::ProlepticGregorian => {
                (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
            }
            Calendar::Julian => year.rem_euclid(4) == 0,
            Calendar::NoLeap | Calendar::Day360 => false,
            Calendar::AllLeap => true,
        }
    }

    pub fn days_in_month(&self, year: i32, month: u32) -> u32 {
        if *self == Calendar::Day360 {
            return 30;
        }
        match month {
            1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
            4 | 6 | 9 | 11 => 30,
            _ if self.is_leap(year) => 29,
            _ => 28,
        }
    }

    pub fn days_in_year(&self, year: i32) -> i64 {
        match self {
            Calendar::Day360 => 360,
            _ if self.is_leap(year) => 366,
            _ => 365,
        }
    }

    /// Length of the leap-year cycle as (years, days).
    fn cycle(&self) -> (i64, i64) {
        match self {
            Calendar::Standard | Calendar::ProlepticGregorian => (400, 146_097),
            Calendar::Julian => (4, 1_461),
            Calendar::NoLeap => (1, 365),
            Calendar::AllLeap => (1, 366),
            Calendar::Day360 => (1, 360),
        }
    }
}

impl FromStr for Calendar {
    type Err = CmipError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "standard" | "gregorian" => Ok(Calendar::Standard),
            "proleptic_gregorian" => Ok(Calendar::ProlepticGregorian),
            "julian" => Ok(Calendar::Julian),
            "noleap" | "365_day" => Ok(Calendar::NoLeap),
            "all_leap" | "366_day" => Ok(Calendar::AllLeap),
            "360_day" => Ok(Calendar::Day360),
            other => Err(CmipError::UnsupportedCalendar(other.to_string())),
        }
    }
}

/// A calendar date that need not exist in the Gregorian calendar
/// (e.g. 30 February in a 360-day calendar).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CfDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl CfDate {
    pub fn new(year: i32, month: u32, day: u32) -> Self {
        Self { year, month, day }
    }

    /// Zero-based day of the year in `calendar`.
    fn ordinal0(&self, calendar: Calendar) -> i64 {
        let before: u32 = (1..self.month)
            .map(|m| calendar.days_in_month(self.year, m))
            .sum();
        before as i64 + self.day as i64 - 1
    }

    /// Move `days` forward (or backward when negative) in `calendar`.
    ///
    /// `None` when the resulting year does not fit in an `i32`.
    pub fn add_days(&self, calendar: Calendar, days: i64) -> Option<CfDate> {
        let (cycle_years, cycle_days) = calendar.cycle();
        let mut remaining = self.ordinal0(calendar).checked_add(days)?;
        let cycles = remaining.div_euclid(cycle_days);
        remaining -= cycles * cycle_days;
        let year = i64::from(self.year).checked_add(cycles.checked_mul(cycle_years)?)?;
        let mut year = i32::try_from(year).ok()?;

        while remaining >= calendar.days_in_year(year) {
            remaining -= calendar.days_in_year(year);
            year = year.checked_add(1)?;
        }

        let mut month = 1;
        loop {
            let len = calendar.days_in_month(year, month) as i64;
            if remaining < len {
                break;
            }
            remaining -= len;
            month += 1;
        }

        Some(CfDate::new(year, month, remaining as u32 + 1))
    }
}

impl fmt::Display for CfDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// Parsed `<unit> since <epoch>` attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct CfTimeUnits {
    pub unit: TimeUnit,
    pub epoch: CfDate,
    /// Time of day of the epoch, in seconds.
    pub epoch_seconds: f64,
}

impl CfTimeUnits {
    /// Parse strings such as `days since 1850-01-01`,
    /// `hours since 1850-1-1 00:00:00` or `days since 0001-01-01T12:00:00Z`.
    pub fn parse(units: &str) -> CmipResult<Self> {
        let invalid = || CmipError::InvalidTimeUnits(units.to_string());

        let (unit, rest) = units.split_once(" since ").ok_or_else(invalid)?;
        let unit: TimeUnit = unit.trim().parse()?;

        let rest = rest.trim().replacen('T', " ", 1);
        let mut tokens = rest.split_whitespace();
        let date = tokens.next().ok_or_else(invalid)?;

        let mut fields = date.splitn(3, '-');
        let year: i32 = fields
            .next()
            .and_then(|v| v.parse().ok())
            .ok_or_else(invalid)?;
        let month: u32 = fields.next().map_or(Some(1), |v| v.parse().ok()).ok_or_else(invalid)?;
        let day: u32 = fields.next().map_or(Some(1), |v| v.parse().ok()).ok_or_else(invalid)?;
        if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
            return Err(invalid());
        }

        let epoch_seconds = match tokens.next() {
            Some(clock) => parse_clock(clock.trim_end_matches('Z')).ok_or_else(invalid)?,
            None => 0.0,
        };

        Ok(Self {
            unit,
            epoch: CfDate::new(year, month, day),
            epoch_seconds,
        })
    }
}

fn parse_clock(clock: &str) -> Option<f64> {
    let mut parts = clock.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next().map_or(Some(0.0), |v| v.parse().ok())?;
    let seconds: f64 = parts.next().map_or(Some(0.0), |v| v.parse().ok())?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Decode raw CF offsets into calendar dates (time of day is dropped).
pub fn decode_cf_times(
    values: &[f64],
    units: &str,
    calendar: Option<&str>,
) -> CmipResult<Vec<CfDate>> {
    let units = CfTimeUnits::parse(units)?;
    let calendar: Calendar = match calendar {
        Some(name) => name.parse()?,
        None => Calendar::default(),
    };

    values
        .iter()
        .enumerate()
        .map(|(idx, &value)| {
            if !value.is_finite() {
                return Err(CmipError::NonFiniteTime(idx));
            }
            let days = value * units.unit.in_days() + units.epoch_seconds / SECONDS_PER_DAY;
            let out_of_range = || CmipError::TimeOffsetOutOfRange { index: idx, value };
            if days.abs() > MAX_OFFSET_DAYS {
                return Err(out_of_range());
            }
            units
                .epoch
                .add_days(calendar, (days + DAY_EPSILON).floor() as i64)
                .ok_or_else(out_of_range)
        })
        .collect()
}

/// Replace the year, month and/or day of every date.
///
/// Fields left as `None` are kept. Fails if a resulting date does not exist
/// in the Gregorian calendar.
pub fn replace_dates(
    dates: &[CfDate],
    year: Option<i32>,
    month: Option<u32>,
    day: Option<u32>,
) -> CmipResult<Vec<NaiveDate>> {
    dates
        .iter()
        .map(|d| {
            let y = year.unwrap_or(d.year);
            let m = month.unwrap_or(d.month);
            let dd = day.unwrap_or(d.day);
            NaiveDate::from_ymd_opt(y, m, dd).ok_or(CmipError::InvalidDate {
                year: y,
                month: m,
                day: dd,
            })
        })
        .collect()
}

/// Force every date to the first day of its month.
pub fn truncate_to_month(dates: &[CfDate]) -> CmipResult<Vec<NaiveDate>> {
    replace_dates(dates, None, None, Some(1))
}

/// Inclusive date range used to subset a time axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeSlice {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl TimeSlice {
    pub fn new(start: NaiveDate, end: NaiveDate) -> CmipResult<Self> {
        if start > end {
            return Err(CmipError::InvalidTimeSlice(format!(
                "start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: &NaiveDate) -> bool {
        *date >= self.start && *date <= self.end
    }

    /// Index range of `times` falling inside the slice.
    ///
    /// `times` must be sorted ascending; an empty selection is an error.
    pub fn select(&self, times: &[NaiveDate]) -> CmipResult<Range<usize>> {
        if times.windows(2).any(|w| w[0] > w[1]) {
            return Err(CmipError::UnsortedTimeAxis(self.to_string()));
        }

        let lo = times.partition_point(|t| *t < self.start);
        let hi = times.partition_point(|t| *t <= self.end);
        if lo >= hi {
            return Err(CmipError::EmptyTimeSelection(self.to_string()));
        }
        Ok(lo..hi)
    }
}

/// Parse `YYYY`, `YYYY-MM` or `YYYY-MM-DD`; partial dates expand to the
/// first (`upper == false`) or last (`upper == true`) day they cover.
fn parse_partial_date(s: &str, upper: bool) -> Option<NaiveDate> {
    let parts: Vec<&str> = s.trim().split('-').collect();
    let year: i32 = parts.first()?.parse().ok()?;
    match parts.len() {
        1 => {
            if upper {
                NaiveDate::from_ymd_opt(year, 12, 31)
            } else {
                NaiveDate::from_ymd_opt(year, 1, 1)
            }
        }
        2 => {
            let month: u32 = parts[1].parse().ok()?;
            let first = NaiveDate::from_ymd_opt(year, month, 1)?;
            if upper {
                let days = Calendar::Standard.days_in_month(year, month);
                first.with_day(days)
            } else {
                Some(first)
            }
        }
        3 => NaiveDate::from_ymd_opt(year, parts[1].parse().ok()?, parts[2].parse().ok()?),
        _ => None,
    }
}

impl FromStr for TimeSlice {
    type Err = CmipError;

    /// Parse `START/END`, e.g. `1950-01/2014-12`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once('/')
            .ok_or_else(|| CmipError::InvalidTimeSlice(s.to_string()))?;
        let start = parse_partial_date(start, false)
            .ok_or_else(|| CmipError::InvalidTimeSlice(s.to_string()))?;
        let end = parse_partial_date(end, true)
            .ok_or_else(|| CmipError::InvalidTimeSlice(s.to_string()))?;
        TimeSlice::new(start, end)
    }
}

impl TryFrom<String> for TimeSlice {
    type Error = CmipError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeSlice> for String {
    fn from(slice: TimeSlice) -> Self {
        slice.to_string()
    }
}

impl fmt::Display for TimeSlice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_units() {
        let u = CfTimeUnits::parse("days since 1850-01-01").unwrap();
        assert_eq!(u.unit, TimeUnit::Days);
        assert_eq!(u.epoch, CfDate::new(1850, 1, 1));
        assert_eq!(u.epoch_seconds, 0.0);

        let u = CfTimeUnits::parse("hours since 1900-1-1 12:00:00").unwrap();
        assert_eq!(u.unit, TimeUnit::Hours);
        assert_eq!(u.epoch, CfDate::new(1900, 1, 1));
        assert_eq!(u.epoch_seconds, 43_200.0);

        let u = CfTimeUnits::parse("days since 0001-01-01T00:00:00Z").unwrap();
        assert_eq!(u.epoch.year, 1);
    }

    #[test]
    fn test_parse_units_rejects_garbage() {
        assert!(CfTimeUnits::parse("days after 1850-01-01").is_err());
        assert!(CfTimeUnits::parse("fortnights since 1850-01-01").is_err());
        assert!(CfTimeUnits::parse("days since 1850-13-01").is_err());
    }

    #[test]
    fn test_noleap_skips_feb_29() {
        // 1852 is a leap year in the Gregorian calendar but not in noleap.
        let start = CfDate::new(1852, 2, 28);
        assert_eq!(start.add_days(Calendar::NoLeap, 1), Some(CfDate::new(1852, 3, 1)));
        assert_eq!(
            start.add_days(Calendar::ProlepticGregorian, 1), Some(CfDate::new(1852, 2, 29))
        );
    }

    #[test]
    fn test_360_day_months() {
        let start = CfDate::new(1850, 1, 1);
        assert_eq!(start.add_days(Calendar::Day360, 30), Some(CfDate::new(1850, 2, 1)));
        assert_eq!(start.add_days(Calendar::Day360, 59), Some(CfDate::new(1850, 2, 30)));
        assert_eq!(start.add_days(Calendar::Day360, 360), Some(CfDate::new(1851, 1, 1)));
    }

    #[test]
    fn test_negative_offsets() {
        let start = CfDate::new(1850, 1, 1);
        assert_eq!(start.add_days(Calendar::Standard, -1), Some(CfDate::new(1849, 12, 31)));
    }

    #[test]
    fn test_add_days_across_many_cycles() {
        let start = CfDate::new(1850, 1, 1);
        assert_eq!(start.add_days(Calendar::Standard, 146_097), Some(CfDate::new(2250, 1, 1)));
        assert_eq!(start.add_days(Calendar::Julian, -1_461 * 1_000), Some(CfDate::new(-2150, 1, 1)));
        assert_eq!(start.add_days(Calendar::NoLeap, 365 * 1_000_000), Some(CfDate::new(1_001_850, 1, 1)));
        assert_eq!(CfDate::new(i32::MAX, 1, 1).add_days(Calendar::NoLeap, 365), None);
    }

    #[test]
    fn test_decode_rejects_fill_like_offsets() {
        let err = decode_cf_times(&[1.0e20], "days since 1850-01-01", Some("noleap")).unwrap_err();
        assert!(matches!(err, CmipError::TimeOffsetOutOfRange { index: 0, .. }));
        assert!(decode_cf_times(&[0.0, -1.0e20], "seconds since 1850-01-01", None).is_err());
        assert!(decode_cf_times(&[15.5, 1.0e12], "days since 1850-01-01", Some("360_day")).is_err());
    }

    #[test]
    fn test_julian_leap_century() {
        assert!(Calendar::Julian.is_leap(1900));
        assert!(!Calendar::Standard.is_leap(1900));
        assert!(Calendar::Standard.is_leap(2000));
    }

    #[test]
    fn test_decode_mid_month_values() {
        let dates = decode_cf_times(&[15.5, 45.0], "days since 1850-01-01", Some("noleap")).unwrap();
        assert_eq!(dates, vec![CfDate::new(1850, 1, 16), CfDate::new(1850, 2, 15)]);
    }

    #[test]
    fn test_decode_rejects_nan() {
        let err = decode_cf_times(&[0.0, f64::NAN], "days since 1850-01-01", None).unwrap_err();
        assert!(matches!(err, CmipError::NonFiniteTime(1)));
    }

    #[test]
    fn test_decode_unknown_calendar() {
        let err = decode_cf_times(&[0.0], "days since 1850-01-01", Some("lunar")).unwrap_err();
        assert!(matches!(err, CmipError::UnsupportedCalendar(_)));
    }

    #[test]
    fn test_truncate_handles_360_day_feb_30() {
        let dates = vec![CfDate::new(1850, 2, 30)];
        let out = truncate_to_month(&dates).unwrap();
        assert_eq!(out, vec![NaiveDate::from_ymd_opt(1850, 2, 1).unwrap()]);
    }

    #[test]
    fn test_replace_year_and_month() {
        let dates = vec![CfDate::new(1850, 7, 16)];
        let out = replace_dates(&dates, Some(2000), Some(1), None).unwrap();
        assert_eq!(out, vec![NaiveDate::from_ymd_opt(2000, 1, 16).unwrap()]);

        let bad = replace_dates(&dates, None, Some(2), Some(30));
        assert!(bad.is_err());
    }

    #[test]
    fn test_time_slice_parse() {
        let slice: TimeSlice = "1950-01/2014-12".parse().unwrap();
        assert_eq!(slice.start, NaiveDate::from_ymd_opt(1950, 1, 1).unwrap());
        assert_eq!(slice.end, NaiveDate::from_ymd_opt(2014, 12, 31).unwrap());

        let slice: TimeSlice = "1980/1981".parse().unwrap();
        assert_eq!(slice.end, NaiveDate::from_ymd_opt(1981, 12, 31).unwrap());

        assert!("2000-01/1999-01".parse::<TimeSlice>().is_err());
        assert!("2000-01".parse::<TimeSlice>().is_err());
    }
}
