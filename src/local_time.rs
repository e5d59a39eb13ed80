/// Local time conversion for activity timestamps
///
/// Devices record every timestamp in UTC. Reports are read in local civil
/// time, so each timestamp goes through a `LocalTimeConverter` while parsing.
///
/// The built-in converter is a simplified Central European rule:
/// - UTC+1 outside daylight saving
/// - UTC+2 from the last Sunday of March 00:00 up to (not including)
///   the last Sunday of October 00:00
///
/// The window is computed from the timestamp's own year, so historical
/// files convert the same way no matter when they are processed.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, TimeZone};

pub trait LocalTimeConverter {
    fn to_local(&self, utc: NaiveDateTime) -> DateTime<FixedOffset>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CentralEuropeanTime;

const STANDARD_OFFSET_SECS: i32 = 3600;
const DST_OFFSET_SECS: i32 = 7200;

impl CentralEuropeanTime {
    /// Start (inclusive) and end (exclusive) of daylight saving for `year`
    pub fn dst_window(year: i32) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let start = last_sunday(year, 3)?.and_hms_opt(0, 0, 0)?;
        let end = last_sunday(year, 10)?.and_hms_opt(0, 0, 0)?;
        Some((start, end))
    }

    /// UTC offset in seconds for a UTC clock reading
    pub fn offset_secs(utc: NaiveDateTime) -> i32 {
        let in_dst = Self::dst_window(utc.year())
            .map(|(start, end)| start <= utc && utc < end)
            .unwrap_or(false);

        if in_dst { DST_OFFSET_SECS } else { STANDARD_OFFSET_SECS }
    }
}

impl LocalTimeConverter for CentralEuropeanTime {
    fn to_local(&self, utc: NaiveDateTime) -> DateTime<FixedOffset> {
        match FixedOffset::east_opt(Self::offset_secs(utc)) {
            Some(offset) => offset.from_utc_datetime(&utc),
            None => utc.and_utc().fixed_offset(),
        }
    }
}

/// Last Sunday of the given month
pub fn last_sunday(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    let first_of_next = NaiveDate::from_ymd_opt(next_year, next_month, 1)?;
    // Monday = 0 ... Sunday = 6, step back to the Sunday before the 1st
    let back = first_of_next.weekday().num_days_from_monday() as i64 + 1;
    Some(first_of_next - Duration::days(back))
}
