//! Calendar keys used to bucket transactions
//!
//! `MonthKey` and `WeekKey` order chronologically by construction (year first),
//! so any `BTreeMap` keyed by them iterates in calendar order. Week keys follow
//! ISO-8601 week numbering, whose year can differ from the calendar year around
//! New Year.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, Weekday};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A calendar month, displayed as `YYYY-MM`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// First day of the month
    pub fn start(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    /// Shift by a (possibly negative) number of months
    pub fn add_months(&self, months: i32) -> Self {
        let index = self.year * 12 + (self.month as i32 - 1) + months;
        Self {
            year: index.div_euclid(12),
            month: index.rem_euclid(12) as u32 + 1,
        }
    }

    pub fn days_in_month(&self) -> u32 {
        let next = self.add_months(1).start();
        (next - self.start()).num_days() as u32
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .split_once('-')
            .ok_or_else(|| format!("Invalid month key: {}", s))?;
        let year: i32 = year
            .parse()
            .map_err(|_| format!("Invalid month key: {}", s))?;
        let month: u32 = month
            .parse()
            .map_err(|_| format!("Invalid month key: {}", s))?;
        MonthKey::new(year, month).ok_or_else(|| format!("Invalid month key: {}", s))
    }
}

/// An ISO-8601 week, displayed as `YYYY-Www`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WeekKey {
    iso_year: i32,
    week: u32,
}

impl WeekKey {
    pub fn new(iso_year: i32, week: u32) -> Option<Self> {
        NaiveDate::from_isoywd_opt(iso_year, week, Weekday::Mon).map(|_| Self { iso_year, week })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        let iso = date.iso_week();
        Self {
            iso_year: iso.year(),
            week: iso.week(),
        }
    }

    pub fn iso_year(&self) -> i32 {
        self.iso_year
    }

    pub fn week(&self) -> u32 {
        self.week
    }

    /// Monday of this ISO week
    pub fn start(&self) -> NaiveDate {
        NaiveDate::from_isoywd_opt(self.iso_year, self.week, Weekday::Mon).unwrap_or(NaiveDate::MIN)
    }
}

impl fmt::Display for WeekKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-W{:02}", self.iso_year, self.week)
    }
}

impl FromStr for WeekKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, week) = s
            .split_once("-W")
            .ok_or_else(|| format!("Invalid week key: {}", s))?;
        let year: i32 = year.parse().map_err(|_| format!("Invalid week key: {}", s))?;
        let week: u32 = week.parse().map_err(|_| format!("Invalid week key: {}", s))?;
        WeekKey::new(year, week).ok_or_else(|| format!("Invalid week key: {}", s))
    }
}

macro_rules! string_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

string_serde!(MonthKey);
string_serde!(WeekKey);

/// Parse an ISO-8601 timestamp
///
/// Accepts RFC 3339 (a trailing `Z` means UTC), naive date-times with a `T`
/// or space separator, and bare dates (midnight). Naive values are read as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    let normalized = match value.strip_suffix('Z') {
        Some(stripped) => format!("{}+00:00", stripped),
        None => value.to_string(),
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(dt);
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%:z", "%Y-%m-%dT%H:%M%:z", "%Y-%m-%d %H:%M:%S%:z"] {
        if let Ok(dt) = DateTime::parse_from_str(&normalized, fmt) {
            return Some(dt);
        }
    }

    let naive = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&normalized, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(&normalized, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;

    Some(naive.and_utc().fixed_offset())
}

/// `latest` minus `days`, or `None` when the span falls outside chrono's range
pub fn days_before(latest: DateTime<FixedOffset>, days: i64) -> Option<DateTime<FixedOffset>> {
    Duration::try_days(days).and_then(|span| latest.checked_sub_signed(span))
}

/// Monday on or before the given date
pub fn start_of_week(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// Short weekday label, Monday first
pub fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Mon",
        Weekday::Tue => "Tue",
        Weekday::Wed => "Wed",
        Weekday::Thu => "Thu",
        Weekday::Fri => "Fri",
        Weekday::Sat => "Sat",
        Weekday::Sun => "Sun",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_month_key_orders_across_years() {
        let mut months: Vec<MonthKey> = ["2025-01", "2024-11", "2024-12", "2023-06"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        months.sort();
        let rendered: Vec<String> = months.iter().map(|m| m.to_string()).collect();
        assert_eq!(rendered, vec!["2023-06", "2024-11", "2024-12", "2025-01"]);
    }

    #[test]
    fn test_month_key_arithmetic() {
        let jan: MonthKey = "2025-01".parse().unwrap();
        assert_eq!(jan.add_months(-1).to_string(), "2024-12");
        assert_eq!(jan.add_months(-12).to_string(), "2024-01");
        assert_eq!(jan.add_months(13).to_string(), "2026-02");
        assert_eq!(jan.days_in_month(), 31);
        assert_eq!("2024-02".parse::<MonthKey>().unwrap().days_in_month(), 29);
        assert_eq!("2025-02".parse::<MonthKey>().unwrap().days_in_month(), 28);
    }

    #[test]
    fn test_month_key_rejects_garbage() {
        assert!("2025-13".parse::<MonthKey>().is_err());
        assert!("202501".parse::<MonthKey>().is_err());
    }

    #[test]
    fn test_week_key_iso_year_boundary() {
        // 2024-12-30 is a Monday belonging to ISO week 1 of 2025
        let date = NaiveDate::from_ymd_opt(2024, 12, 30).unwrap();
        let week = WeekKey::from_date(date);
        assert_eq!(week.to_string(), "2025-W01");
        assert_eq!(week.start(), date);

        // 2021-01-03 (Sunday) still belongs to 2020-W53
        let date = NaiveDate::from_ymd_opt(2021, 1, 3).unwrap();
        assert_eq!(WeekKey::from_date(date).to_string(), "2020-W53");
    }

    #[test]
    fn test_week_key_parse_and_order() {
        let a: WeekKey = "2024-W52".parse().unwrap();
        let b: WeekKey = "2025-W01".parse().unwrap();
        assert!(a < b);
        assert!("2024-W54".parse::<WeekKey>().is_err());
    }

    #[test]
    fn test_keys_serialize_as_strings() {
        let month: MonthKey = "2024-03".parse().unwrap();
        assert_eq!(serde_json::to_string(&month).unwrap(), "\"2024-03\"");

        let mut map = std::collections::BTreeMap::new();
        map.insert(WeekKey::new(2024, 5).unwrap(), 1.0);
        assert_eq!(serde_json::to_string(&map).unwrap(), r#"{"2024-W05":1.0}"#);
    }

    #[test]
    fn test_parse_timestamp_variants() {
        use chrono::Timelike;

        let utc = parse_timestamp("2024-11-03T09:15:00Z").unwrap();
        assert_eq!(utc.offset().local_minus_utc(), 0);
        assert_eq!(utc.hour(), 9);

        let offset = parse_timestamp("2024-11-03T23:30:00+01:00").unwrap();
        assert_eq!(offset.hour(), 23);
        assert_eq!(offset.offset().local_minus_utc(), 3600);

        let naive = parse_timestamp("2024-11-03 18:42:10").unwrap();
        assert_eq!(naive.hour(), 18);

        let date_only = parse_timestamp("2024-11-03").unwrap();
        assert_eq!(date_only.hour(), 0);
        assert_eq!(date_only.date_naive(), NaiveDate::from_ymd_opt(2024, 11, 3).unwrap());

        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn test_start_of_week() {
        let thursday = NaiveDate::from_ymd_opt(2024, 3, 14).unwrap();
        assert_eq!(
            start_of_week(thursday),
            NaiveDate::from_ymd_opt(2024, 3, 11).unwrap()
        );
    }
}
