//! Calendar-month dates
//!
//! Subscriptions are billed at month granularity. `MonthDate` holds a year
//! and month, travels on the wire as `"MM-YYYY"` and is stored as a `DATE`
//! fixed to the first day of the month.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::{PgArgumentBuffer, PgTypeInfo, PgValueRef, Postgres};
use sqlx::{Decode, Encode, Type, TypeInfo, ValueRef};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when text is not a valid `"MM-YYYY"` month
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid month {input:?}: expected MM-YYYY")]
pub struct MonthParseError {
    /// The rejected input
    pub input: String,
}

/// A calendar month (year + month), day-of-month is always the 1st
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthDate(NaiveDate);

impl MonthDate {
    /// Build a month from its year and 1-based month number
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(Self)
    }

    /// Truncate any calendar date to its month
    pub fn from_date(date: NaiveDate) -> Self {
        Self(date.with_day(1).unwrap_or(date))
    }

    /// Calendar year
    pub fn year(&self) -> i32 {
        self.0.year()
    }

    /// Month number, 1 through 12
    pub fn month(&self) -> u32 {
        self.0.month()
    }

    /// The first day of the month, as stored in the database
    pub fn first_day(&self) -> NaiveDate {
        self.0
    }

    /// Signed number of whole months from `self` to `other`
    ///
    /// Equals `years * 12 + months` of `AGE(other, self)` in PostgreSQL,
    /// since both ends sit on the first of their month.
    pub fn months_until(&self, other: MonthDate) -> i64 {
        i64::from(other.year() - self.year()) * 12
            + (i64::from(other.month()) - i64::from(self.month()))
    }
}

impl FromStr for MonthDate {
    type Err = MonthParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || MonthParseError {
            input: s.to_string(),
        };

        let (month, year) = s.split_once('-').ok_or_else(err)?;
        if month.len() != 2
            || year.len() != 4
            || !month.bytes().all(|b| b.is_ascii_digit())
            || !year.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(err());
        }

        let month: u32 = month.parse().map_err(|_| err())?;
        let year: i32 = year.parse().map_err(|_| err())?;
        MonthDate::new(year, month).ok_or_else(err)
    }
}

impl fmt::Display for MonthDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}-{:04}", self.month(), self.year())
    }
}

impl From<NaiveDate> for MonthDate {
    fn from(date: NaiveDate) -> Self {
        Self::from_date(date)
    }
}

impl Serialize for MonthDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MonthDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

impl Type<Postgres> for MonthDate {
    fn type_info() -> PgTypeInfo {
        <NaiveDate as Type<Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        <NaiveDate as Type<Postgres>>::compatible(ty)
            || <NaiveDateTime as Type<Postgres>>::compatible(ty)
            || <DateTime<Utc> as Type<Postgres>>::compatible(ty)
            || <String as Type<Postgres>>::compatible(ty)
    }
}

impl Encode<'_, Postgres> for MonthDate {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        <NaiveDate as Encode<Postgres>>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> Decode<'r, Postgres> for MonthDate {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let ty = value.type_info().into_owned();
        match ty.name() {
            "DATE" => Ok(Self::from_date(<NaiveDate as Decode<Postgres>>::decode(value)?)),
            "TIMESTAMP" => {
                let ts = <NaiveDateTime as Decode<Postgres>>::decode(value)?;
                Ok(Self::from_date(ts.date()))
            }
            // Truncated in UTC, not the session time zone; schema columns are DATE
            "TIMESTAMPTZ" => {
                let ts = <DateTime<Utc> as Decode<Postgres>>::decode(value)?;
                Ok(Self::from_date(ts.date_naive()))
            }
            _ => {
                let text = <&str as Decode<Postgres>>::decode(value)?;
                Ok(text.trim().parse()?)
            }
        }
    }
}
