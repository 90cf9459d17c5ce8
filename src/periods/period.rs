//! Defines `Period`, a dated half-open interval with a granularity tag.

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PeriodError {
    #[error("{granularity} period must start on the first day of a month, got {start}")]
    Misaligned { granularity: Granularity, start: NaiveDate },
    #[error("Cannot parse period '{0}'")]
    Parse(String),
    #[error("Period arithmetic overflowed from {0}")]
    OutOfRange(NaiveDate),
}

/// The size of a period. Ordered from finest to coarsest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Instant,
    Month,
    Year,
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Granularity::Instant => "instant",
            Granularity::Month => "month",
            Granularity::Year => "year",
        };
        f.write_str(s)
    }
}

/// A half-open interval `[start, end)`. The end is derived from the start and
/// the granularity; an instant covers a single day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Period {
    start: NaiveDate,
    granularity: Granularity,
}

impl Period {
    pub fn new(granularity: Granularity, start: NaiveDate) -> Result<Self, PeriodError> {
        if granularity != Granularity::Instant && start.day() != 1 {
            return Err(PeriodError::Misaligned { granularity, start });
        }
        Ok(Self { start, granularity })
    }

    pub fn instant(date: NaiveDate) -> Self {
        Self { start: date, granularity: Granularity::Instant }
    }

    pub fn month(year: i32, month: u32) -> Result<Self, PeriodError> {
        let start = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| PeriodError::Parse(format!("{year}-{month:02}")))?;
        Ok(Self { start, granularity: Granularity::Month })
    }

    pub fn year(year: i32) -> Result<Self, PeriodError> {
        let start = NaiveDate::from_ymd_opt(year, 1, 1)
            .ok_or_else(|| PeriodError::Parse(year.to_string()))?;
        Ok(Self { start, granularity: Granularity::Year })
    }

    pub fn start(&self) -> NaiveDate { self.start }
    pub fn granularity(&self) -> Granularity { self.granularity }

    /// Exclusive end of the interval.
    pub fn end(&self) -> NaiveDate {
        let next = match self.granularity {
            Granularity::Instant => self.start.succ_opt(),
            Granularity::Month => self.start.checked_add_months(Months::new(1)),
            Granularity::Year => self.start.checked_add_months(Months::new(12)),
        };
        next.unwrap_or(NaiveDate::MAX)
    }

    /// Last day covered by the period (inclusive).
    pub fn last_day(&self) -> NaiveDate {
        self.end().pred_opt().unwrap_or(self.start)
    }

    pub fn contains_date(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end()
    }

    /// True when `other` lies entirely within this period.
    pub fn contains(&self, other: &Period) -> bool {
        self.start <= other.start && other.end() <= self.end()
    }

    pub fn overlaps(&self, other: &Period) -> bool {
        self.start < other.end() && other.start < self.end()
    }

    pub fn first_month(&self) -> Period {
        Period {
            start: self.start.with_day(1).unwrap_or(self.start),
            granularity: Granularity::Month,
        }
    }

    /// The calendar year containing the period's start.
    pub fn this_year(&self) -> Period {
        let start = NaiveDate::from_ymd_opt(self.start.year(), 1, 1).unwrap_or(self.start);
        Period { start, granularity: Granularity::Year }
    }

    /// The period of the given granularity that contains this period's start.
    /// Years are calendar years.
    pub fn containing(&self, granularity: Granularity) -> Period {
        match granularity {
            Granularity::Instant => Period::instant(self.start),
            Granularity::Month => self.first_month(),
            Granularity::Year => self.this_year(),
        }
    }

    /// Same-sized period shifted by `n` steps (negative for the past).
    pub fn offset(&self, n: i32) -> Result<Period, PeriodError> {
        let overflow = || PeriodError::OutOfRange(self.start);
        let start = match self.granularity {
            Granularity::Instant => self
                .start
                .checked_add_signed(chrono::Duration::days(i64::from(n)))
                .ok_or_else(overflow)?,
            Granularity::Month | Granularity::Year => {
                let step = if self.granularity == Granularity::Month { 1 } else { 12 };
                let months = Months::new(n.unsigned_abs() * step);
                if n >= 0 {
                    self.start.checked_add_months(months)
                } else {
                    self.start.checked_sub_months(months)
                }
                .ok_or_else(overflow)?
            }
        };
        Ok(Period { start, granularity: self.granularity })
    }

    /// Contiguous sub-periods of the given (finer) granularity, in order.
    /// Returns `[self]` when the granularity is not finer.
    pub fn subperiods(&self, granularity: Granularity) -> Vec<Period> {
        if granularity >= self.granularity {
            return vec![*self];
        }
        let end = self.end();
        let mut out = Vec::new();
        let mut cursor = Period { start: self.start, granularity };
        while cursor.start < end {
            out.push(cursor);
            match cursor.offset(1) {
                Ok(next) => cursor = next,
                Err(_) => break,
            }
        }
        out
    }

    /// The 12 months of a year period, or the period itself for a month.
    pub fn months(&self) -> Vec<Period> {
        self.subperiods(Granularity::Month)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.granularity {
            Granularity::Instant => write!(f, "{}", self.start.format("%Y-%m-%d")),
            Granularity::Month => write!(f, "{}", self.start.format("%Y-%m")),
            Granularity::Year if self.start.month() == 1 => write!(f, "{}", self.start.year()),
            Granularity::Year => write!(f, "year:{}", self.start.format("%Y-%m")),
        }
    }
}

impl FromStr for Period {
    type Err = PeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || PeriodError::Parse(s.to_string());
        let text = s.trim();

        if let Some(rest) = text.strip_prefix("year:") {
            let start = NaiveDate::parse_from_str(&format!("{rest}-01"), "%Y-%m-%d").map_err(|_| err())?;
            return Period::new(Granularity::Year, start);
        }

        match text.split('-').count() {
            1 => Period::year(text.parse::<i32>().map_err(|_| err())?),
            2 => {
                let start = NaiveDate::parse_from_str(&format!("{text}-01"), "%Y-%m-%d").map_err(|_| err())?;
                Period::new(Granularity::Month, start)
            }
            3 => Ok(Period::instant(NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|_| err())?)),
            _ => Err(err()),
        }
    }
}

impl Serialize for Period {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
