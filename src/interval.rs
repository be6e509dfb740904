//! Interval keys for bucket timestamps.
//!
//! Bucket keys arrive as epoch milliseconds and are collapsed onto
//! human-readable calendar labels: `29-Apr-2019` for day and week
//! intervals, `Apr-2019` for months and `2019` for years.

use crate::models::Interval;
use chrono::{DateTime, Datelike, Local, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use std::fmt;
use std::str::FromStr;

/// English month abbreviations, January first.
pub const MONTH_ABBREVIATIONS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Abbreviation for a 1-based month number.
pub fn month_abbrev(month: u32) -> &'static str {
    match month {
        1..=12 => MONTH_ABBREVIATIONS[(month - 1) as usize],
        _ => "Month",
    }
}

/// 1-based month number for an abbreviation; unknown names map to 0.
pub fn month_ordinal(name: &str) -> u32 {
    MONTH_ABBREVIATIONS
        .iter()
        .position(|m| *m == name)
        .map(|i| i as u32 + 1)
        .unwrap_or(0)
}

/// Time zone in which timestamps are turned into calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Zone {
    /// Host time zone.
    #[default]
    Local,
    Utc,
    Named(Tz),
}

impl FromStr for Zone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "local" | "Local" => Ok(Zone::Local),
            "utc" | "UTC" | "Utc" => Ok(Zone::Utc),
            name => name
                .parse::<Tz>()
                .map(Zone::Named)
                .map_err(|e| format!("unknown time zone {:?}: {}", name, e)),
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Zone::Local => write!(f, "local"),
            Zone::Utc => write!(f, "UTC"),
            Zone::Named(tz) => write!(f, "{}", tz.name()),
        }
    }
}

/// Turns raw bucket timestamps into interval keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntervalKeyResolver {
    zone: Zone,
}

impl IntervalKeyResolver {
    pub fn new(zone: Zone) -> Self {
        Self { zone }
    }

    /// Key for `raw` at the given granularity.
    ///
    /// A timestamp that is not an integer, or falls outside the calendar
    /// range, is returned unchanged.
    pub fn resolve(&self, raw: &str, interval: Interval) -> String {
        let Some(date) = raw
            .parse::<i64>()
            .ok()
            .and_then(|millis| self.calendar_date(millis))
        else {
            return raw.to_string();
        };

        let month = month_abbrev(date.month());
        match interval {
            Interval::Day | Interval::Week => format!("{}-{}-{}", date.day(), month, date.year()),
            Interval::Month => format!("{}-{}", month, date.year()),
            Interval::Year => date.year().to_string(),
        }
    }

    fn calendar_date(&self, millis: i64) -> Option<NaiveDate> {
        let utc: DateTime<Utc> = Utc.timestamp_millis_opt(millis).single()?;
        let date = match self.zone {
            Zone::Local => utc.with_timezone(&Local).date_naive(),
            Zone::Utc => utc.date_naive(),
            Zone::Named(tz) => utc.with_timezone(&tz).date_naive(),
        };
        Some(date)
    }
}
