//! Period resolution: maps calendar months and named relative periods to
//! concrete date intervals.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PracticeError;
use crate::types::MonthKey;

/// Inclusive date-time interval. `end` is 23:59:59 on the last day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateInterval {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl DateInterval {
    /// Interval covering whole days from `first` through `last`.
    pub fn from_days(first: NaiveDate, last: NaiveDate) -> Self {
        Self {
            start: first.and_time(NaiveTime::MIN),
            end: last.and_time(end_of_day()),
        }
    }

    /// Interval covering whole months from `first` through `last`.
    pub fn spanning(first: MonthKey, last: MonthKey) -> Self {
        Self::from_days(first.first_day(), last.last_day())
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        let at = date.and_time(NaiveTime::MIN);
        at >= self.start && at <= self.end
    }

    pub fn first_day(&self) -> NaiveDate {
        self.start.date()
    }

    pub fn last_day(&self) -> NaiveDate {
        self.end.date()
    }

    pub fn days(&self) -> i64 {
        (self.last_day() - self.first_day()).num_days() + 1
    }

    /// Every calendar month touched by the interval, ascending.
    pub fn months(&self) -> Vec<MonthKey> {
        let last = MonthKey::from_date(self.last_day());
        let mut key = MonthKey::from_date(self.first_day());
        let mut out = Vec::new();
        while key <= last {
            out.push(key);
            key = key.next();
        }
        out
    }
}

fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN)
}

/// Full calendar month for a zero-based `month0`. Out-of-range months roll
/// into adjacent years.
pub fn month_interval(month0: i32, year: i32) -> DateInterval {
    let key = MonthKey::new(month0, year);
    DateInterval::spanning(key, key)
}

/// Longest rolling window accepted for `last-N-months` (a century).
pub const MAX_ROLLING_MONTHS: u32 = 1200;

/// Relative reporting period, resolved against a reference date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum NamedPeriod {
    ThisMonth,
    LastMonth,
    ThisQuarter,
    LastQuarter,
    ThisYear,
    LastYear,
    /// Rolling window of whole months ending with the current month. Windows
    /// are clamped to `1..=MAX_ROLLING_MONTHS` when resolved.
    LastMonths(u32),
}

impl NamedPeriod {
    pub fn resolve(&self, today: NaiveDate) -> DateInterval {
        let current = MonthKey::from_date(today);
        match self {
            Self::ThisMonth => DateInterval::spanning(current, current),
            Self::LastMonth => {
                let prev = current.prev();
                DateInterval::spanning(prev, prev)
            }
            Self::ThisQuarter => quarter_of(current),
            Self::LastQuarter => quarter_of(current.offset(-3)),
            Self::ThisYear => year_of(current.year),
            Self::LastYear => year_of(current.year - 1),
            Self::LastMonths(n) => {
                let back = (*n).clamp(1, MAX_ROLLING_MONTHS) as i32 - 1;
                DateInterval::spanning(current.offset(-back), current)
            }
        }
    }

    /// Resolve against today's UTC date.
    pub fn resolve_now(&self) -> DateInterval {
        self.resolve(Utc::now().date_naive())
    }
}

fn quarter_of(key: MonthKey) -> DateInterval {
    let first = MonthKey::new((key.month0 / 3 * 3) as i32, key.year);
    DateInterval::spanning(first, first.offset(2))
}

fn year_of(year: i32) -> DateInterval {
    DateInterval::spanning(MonthKey::new(0, year), MonthKey::new(11, year))
}

impl fmt::Display for NamedPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ThisMonth => f.write_str("this-month"),
            Self::LastMonth => f.write_str("last-month"),
            Self::ThisQuarter => f.write_str("this-quarter"),
            Self::LastQuarter => f.write_str("last-quarter"),
            Self::ThisYear => f.write_str("this-year"),
            Self::LastYear => f.write_str("last-year"),
            Self::LastMonths(n) => write!(f, "last-{n}-months"),
        }
    }
}

impl FromStr for NamedPeriod {
    type Err = PracticeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "this-month" => Ok(Self::ThisMonth),
            "last-month" => Ok(Self::LastMonth),
            "this-quarter" => Ok(Self::ThisQuarter),
            "last-quarter" => Ok(Self::LastQuarter),
            "this-year" => Ok(Self::ThisYear),
            "last-year" => Ok(Self::LastYear),
            other => other
                .strip_prefix("last-")
                .and_then(|rest| rest.strip_suffix("-months"))
                .and_then(|n| n.parse::<u32>().ok())
                .filter(|n| (1..=MAX_ROLLING_MONTHS).contains(n))
                .map(Self::LastMonths)
                .ok_or_else(|| PracticeError::UnknownPeriod(other.to_string())),
        }
    }
}

impl TryFrom<String> for NamedPeriod {
    type Error = PracticeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NamedPeriod> for String {
    fn from(period: NamedPeriod) -> Self {
        period.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_month_interval_covers_whole_month() {
        let interval = month_interval(1, 2024);
        assert_eq!(interval.start, date(2024, 2, 1).and_hms_opt(0, 0, 0).unwrap());
        assert_eq!(interval.end, date(2024, 2, 29).and_hms_opt(23, 59, 59).unwrap());
        assert!(interval.contains(date(2024, 2, 29)));
        assert!(!interval.contains(date(2024, 3, 1)));
        assert!(!interval.contains(date(2024, 1, 31)));
    }

    #[test]
    fn test_month_interval_rolls_over_years() {
        let interval = month_interval(12, 2023);
        assert_eq!(interval.first_day(), date(2024, 1, 1));
        assert_eq!(interval.last_day(), date(2024, 1, 31));

        let interval = month_interval(-1, 2024);
        assert_eq!(interval.first_day(), date(2023, 12, 1));
    }

    #[test]
    fn test_quarters_and_years() {
        let today = date(2024, 5, 17);
        let q = NamedPeriod::ThisQuarter.resolve(today);
        assert_eq!((q.first_day(), q.last_day()), (date(2024, 4, 1), date(2024, 6, 30)));

        let lq = NamedPeriod::LastQuarter.resolve(date(2024, 2, 3));
        assert_eq!((lq.first_day(), lq.last_day()), (date(2023, 10, 1), date(2023, 12, 31)));

        let ly = NamedPeriod::LastYear.resolve(today);
        assert_eq!(ly.days(), 365);
        assert_eq!(ly.first_day(), date(2023, 1, 1));
    }

    #[test]
    fn test_rolling_months_include_current() {
        let interval = NamedPeriod::LastMonths(12).resolve(date(2024, 3, 9));
        assert_eq!(interval.first_day(), date(2023, 4, 1));
        assert_eq!(interval.last_day(), date(2024, 3, 31));
        assert_eq!(interval.months().len(), 12);
    }

    #[test]
    fn test_named_period_parsing() {
        assert_eq!("last-12-months".parse::<NamedPeriod>().unwrap(), NamedPeriod::LastMonths(12));
        assert_eq!("this-quarter".parse::<NamedPeriod>().unwrap(), NamedPeriod::ThisQuarter);
        assert_eq!(NamedPeriod::LastMonths(6).to_string(), "last-6-months");
        assert!("last-0-months".parse::<NamedPeriod>().is_err());
        assert!("fortnight".parse::<NamedPeriod>().is_err());
    }

    #[test]
    fn test_rolling_window_is_capped() {
        assert_eq!("last-1200-months".parse::<NamedPeriod>().unwrap(), NamedPeriod::LastMonths(1200));
        assert!("last-1201-months".parse::<NamedPeriod>().is_err());
        assert!("last-2147483648-months".parse::<NamedPeriod>().is_err());

        let today = date(2024, 3, 9);
        let huge = NamedPeriod::LastMonths(u32::MAX).resolve(today);
        assert_eq!(huge, NamedPeriod::LastMonths(MAX_ROLLING_MONTHS).resolve(today));
        assert_eq!(huge.months().len(), MAX_ROLLING_MONTHS as usize);
        assert_eq!(huge.last_day(), date(2024, 3, 31));
    }
}
