//! Time-series shard keys
//!
//! A shard key names the period of fact data a node serves:
//! - `yyyymmdd`: a single day
//! - `yyyymmX[1-3]`: a ten-day period (days 1-10, 11-20, 21-31)
//! - `yyyymm`: a calendar month (days 01-31)
//! - `yyyyQ[1-4]`: a quarter
//!
//! Month ends are always `31`; the row source only holds real dates, so the
//! range bound does not need to be a valid calendar date.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use minicube_common::error::{Error, Result};
use minicube_storage::source::DateRange;

/// Length of the period a shard key covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShardSpan {
    Day,
    /// Ten-day period, 1 to 3
    Xun(u8),
    Month,
    /// Quarter, 1 to 4
    Quarter(u8),
}

/// Validated shard key with its date range
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShardKey {
    key: String,
    span: ShardSpan,
    range: DateRange,
}

impl ShardKey {
    pub fn parse(key: &str) -> Result<Self> {
        key.parse()
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }

    pub fn span(&self) -> ShardSpan {
        self.span
    }

    /// Inclusive `yyyymmdd` range of rows belonging to this shard
    pub fn date_range(&self) -> DateRange {
        self.range
    }
}

impl FromStr for ShardKey {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        let key = raw.trim().to_uppercase();
        let invalid = || Error::InvalidArgument(format!("Unsupported shard key: {:?}", raw));
        if !key.is_ascii() {
            return Err(invalid());
        }

        let (span, range) = match key.len() {
            8 if key.contains('X') => {
                let (month, xun) = key.split_once('X').ok_or_else(invalid)?;
                let base = year_month(month).ok_or_else(invalid)?;
                let xun = digit(xun, 1..=3).ok_or_else(invalid)?;
                let start = u32::from(xun - 1) * 10 + 1;
                let end = match xun {
                    1 => 10,
                    2 => 20,
                    _ => 31,
                };
                (ShardSpan::Xun(xun), DateRange::new(base * 100 + start, base * 100 + end))
            }
            8 => {
                let base = year_month(&key[..6]).ok_or_else(invalid)?;
                let day = digit_pair(&key[6..]).ok_or_else(invalid)?;
                let year = i32::try_from(base / 100).map_err(|_| invalid())?;
                NaiveDate::from_ymd_opt(year, base % 100, day).ok_or_else(invalid)?;
                let date = base * 100 + day;
                (ShardSpan::Day, DateRange::new(date, date))
            }
            6 if key.contains('Q') => {
                let (year, quarter) = key.split_once('Q').ok_or_else(invalid)?;
                let year = year_digits(year).ok_or_else(invalid)?;
                let quarter = digit(quarter, 1..=4).ok_or_else(invalid)?;
                let first_month = u32::from(quarter - 1) * 3 + 1;
                let last_month = u32::from(quarter) * 3;
                (
                    ShardSpan::Quarter(quarter),
                    DateRange::new(
                        (year * 100 + first_month) * 100 + 1,
                        (year * 100 + last_month) * 100 + 31,
                    ),
                )
            }
            6 => {
                let base = year_month(&key).ok_or_else(invalid)?;
                (ShardSpan::Month, DateRange::new(base * 100 + 1, base * 100 + 31))
            }
            _ => return Err(invalid()),
        };

        Ok(Self { key, span, range })
    }
}

impl fmt::Display for ShardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

fn year_digits(text: &str) -> Option<u32> {
    if text.len() == 4 && text.bytes().all(|b| b.is_ascii_digit()) {
        text.parse().ok()
    } else {
        None
    }
}

/// `yyyymm` with a month of 01 to 12
fn year_month(text: &str) -> Option<u32> {
    if text.len() != 6 {
        return None;
    }
    let year = year_digits(&text[..4])?;
    let month = digit_pair(&text[4..])?;
    (1..=12).contains(&month).then_some(year * 100 + month)
}

fn digit_pair(text: &str) -> Option<u32> {
    if text.len() == 2 && text.bytes().all(|b| b.is_ascii_digit()) {
        text.parse().ok()
    } else {
        None
    }
}

fn digit(text: &str, allowed: std::ops::RangeInclusive<u8>) -> Option<u8> {
    let mut bytes = text.bytes();
    match (bytes.next(), bytes.next()) {
        (Some(b), None) if b.is_ascii_digit() => Some(b - b'0').filter(|d| allowed.contains(d)),
        _ => None,
    }
}
