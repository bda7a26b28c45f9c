//! Calendar periods — the time axis for report data.
//!
//! A period is either a single day or a whole month, canonicalized to the
//! string keys `YYYY-MM-DD` / `YYYY-MM` used as document identifiers.
//! Periods are totally ordered and enumerable over a closed range; a month
//! decomposes into its days for gap arithmetic.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate};

/// A calendar day or calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Period {
    Day(NaiveDate),
    Month { year: i32, month: u32 },
}

impl Period {
    /// Convenience constructor, symmetric with [`Period::month`].
    #[allow(dead_code)] // Used pervasively in tests
    pub fn day(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Period::Day)
    }

    pub fn month(year: i32, month: u32) -> Option<Self> {
        // Validate by constructing the first day
        NaiveDate::from_ymd_opt(year, month, 1).map(|_| Period::Month { year, month })
    }

    /// Canonical string key: `YYYY-MM-DD` for days, `YYYY-MM` for months.
    pub fn key(&self) -> String {
        match self {
            Period::Day(d) => d.format("%Y-%m-%d").to_string(),
            Period::Month { year, month } => format!("{:04}-{:02}", year, month),
        }
    }

    /// First calendar day covered by this period.
    pub fn first_day(&self) -> NaiveDate {
        match self {
            Period::Day(d) => *d,
            Period::Month { year, month } => NaiveDate::from_ymd_opt(*year, *month, 1)
                .expect("month periods are validated at construction"),
        }
    }

    /// Last calendar day covered by this period.
    pub fn last_day(&self) -> NaiveDate {
        match self {
            Period::Day(d) => *d,
            Period::Month { year, month } => {
                let (ny, nm) = if *month == 12 {
                    (year + 1, 1)
                } else {
                    (*year, month + 1)
                };
                NaiveDate::from_ymd_opt(ny, nm, 1)
                    .expect("month periods are validated at construction")
                    .pred_opt()
                    .expect("first of a month always has a predecessor")
            }
        }
    }

    /// The period immediately after this one, at the same granularity.
    pub fn succ(&self) -> Period {
        match self {
            Period::Day(d) => Period::Day(*d + Duration::days(1)),
            Period::Month { year, month } => {
                if *month == 12 {
                    Period::Month {
                        year: year + 1,
                        month: 1,
                    }
                } else {
                    Period::Month {
                        year: *year,
                        month: month + 1,
                    }
                }
            }
        }
    }

    /// Decompose a month into its constituent day periods. A day decomposes
    /// into itself.
    pub fn days(&self) -> Vec<Period> {
        match self {
            Period::Day(_) => vec![*self],
            Period::Month { .. } => {
                let mut out = Vec::new();
                let mut cur = self.first_day();
                let last = self.last_day();
                while cur <= last {
                    out.push(Period::Day(cur));
                    cur = cur + Duration::days(1);
                }
                out
            }
        }
    }

    /// The month period containing this period.
    pub fn containing_month(&self) -> Period {
        match self {
            Period::Day(d) => Period::Month {
                year: d.year(),
                month: d.month(),
            },
            Period::Month { .. } => *self,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Parse a canonical period key. `YYYY-MM-DD` yields a day, `YYYY-MM` a month.
impl FromStr for Period {
    type Err = PeriodParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Ok(Period::Day(date));
        }
        if let Some((y, m)) = s.split_once('-') {
            if let (Ok(year), Ok(month)) = (y.parse::<i32>(), m.parse::<u32>()) {
                if y.len() == 4 && m.len() == 2 {
                    return Period::month(year, month)
                        .ok_or_else(|| PeriodParseError(s.to_string()));
                }
            }
        }
        Err(PeriodParseError(s.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("cannot parse '{0}' as a period (expected YYYY-MM-DD or YYYY-MM)")]
pub struct PeriodParseError(String);

/// A closed, inclusive range of periods at one granularity.
#[derive(Debug, Clone, Copy)]
pub struct PeriodRange {
    pub start: Period,
    pub end: Period,
}

impl PeriodRange {
    /// Build a range; both ends must share a granularity and be ordered.
    pub fn new(start: Period, end: Period) -> Result<Self, RangeError> {
        match (start, end) {
            (Period::Day(_), Period::Month { .. }) | (Period::Month { .. }, Period::Day(_)) => {
                Err(RangeError::MixedGranularity)
            }
            _ if end < start => Err(RangeError::EndBeforeStart { start, end }),
            _ => Ok(Self { start, end }),
        }
    }

    /// Enumerate every period in the range, ascending.
    pub fn periods(&self) -> Vec<Period> {
        let mut out = Vec::new();
        let mut cur = self.start;
        while cur <= self.end {
            out.push(cur);
            cur = cur.succ();
        }
        out
    }

}

#[derive(Debug, thiserror::Error)]
pub enum RangeError {
    #[error("period range mixes day and month granularity")]
    MixedGranularity,
    #[error("period range end {end} is before start {start}")]
    EndBeforeStart { start: Period, end: Period },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_key_format() {
        let p = Period::day(2025, 7, 3).unwrap();
        assert_eq!(p.key(), "2025-07-03");
    }

    #[test]
    fn test_month_key_format() {
        let p = Period::month(2025, 7).unwrap();
        assert_eq!(p.key(), "2025-07");
    }

    #[test]
    fn test_parse_round_trip() {
        for key in ["2025-01-31", "2025-12"] {
            let p: Period = key.parse().unwrap();
            assert_eq!(p.key(), key);
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("not-a-date".parse::<Period>().is_err());
        assert!("2025".parse::<Period>().is_err());
        assert!("2025-13".parse::<Period>().is_err());
        assert!("2025-02-30".parse::<Period>().is_err());
    }

    #[test]
    fn test_month_first_and_last_day() {
        let feb = Period::month(2025, 2).unwrap();
        assert_eq!(feb.first_day(), NaiveDate::from_ymd_opt(2025, 2, 1).unwrap());
        assert_eq!(feb.last_day(), NaiveDate::from_ymd_opt(2025, 2, 28).unwrap());

        let feb_leap = Period::month(2024, 2).unwrap();
        assert_eq!(
            feb_leap.last_day(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );

        let dec = Period::month(2025, 12).unwrap();
        assert_eq!(dec.last_day(), NaiveDate::from_ymd_opt(2025, 12, 31).unwrap());
    }

    #[test]
    fn test_month_decomposes_into_days() {
        let days = Period::month(2025, 9).unwrap().days();
        assert_eq!(days.len(), 30);
        assert_eq!(days[0].key(), "2025-09-01");
        assert_eq!(days[29].key(), "2025-09-30");
    }

    #[test]
    fn test_day_range_enumeration() {
        let range = PeriodRange::new(
            Period::day(2025, 1, 30).unwrap(),
            Period::day(2025, 2, 2).unwrap(),
        )
        .unwrap();
        let keys: Vec<String> = range.periods().iter().map(|p| p.key()).collect();
        assert_eq!(keys, ["2025-01-30", "2025-01-31", "2025-02-01", "2025-02-02"]);
    }

    #[test]
    fn test_month_range_crosses_year() {
        let range = PeriodRange::new(
            Period::month(2024, 11).unwrap(),
            Period::month(2025, 2).unwrap(),
        )
        .unwrap();
        let keys: Vec<String> = range.periods().iter().map(|p| p.key()).collect();
        assert_eq!(keys, ["2024-11", "2024-12", "2025-01", "2025-02"]);
    }

    #[test]
    fn test_range_rejects_mixed_granularity() {
        let result = PeriodRange::new(
            Period::day(2025, 1, 1).unwrap(),
            Period::month(2025, 2).unwrap(),
        );
        assert!(matches!(result, Err(RangeError::MixedGranularity)));
    }

    #[test]
    fn test_range_rejects_reversed_ends() {
        let result = PeriodRange::new(
            Period::day(2025, 3, 2).unwrap(),
            Period::day(2025, 3, 1).unwrap(),
        );
        assert!(matches!(result, Err(RangeError::EndBeforeStart { .. })));
    }

    #[test]
    fn test_periods_are_totally_ordered() {
        let a = Period::day(2025, 1, 1).unwrap();
        let b = Period::day(2025, 1, 2).unwrap();
        assert!(a < b);
        let m1 = Period::month(2025, 1).unwrap();
        let m2 = Period::month(2025, 2).unwrap();
        assert!(m1 < m2);
    }

    #[test]
    fn test_containing_month() {
        let d = Period::day(2025, 7, 15).unwrap();
        assert_eq!(d.containing_month().key(), "2025-07");
    }
}
