use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension};
use rust_decimal::Decimal;
use weft_core::DocumentSeries;
use weft_ledger::LedgerError;

use crate::{BooksError, BooksResult};

pub(crate) fn decimal(value: &str) -> BooksResult<Decimal> {
    Decimal::from_str(value).map_err(|err| {
        LedgerError::Serialization(format!("invalid decimal {value}: {err}")).into()
    })
}

pub(crate) fn date(value: &str) -> BooksResult<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|err| LedgerError::Serialization(format!("invalid date {value}: {err}")).into())
}

pub(crate) fn timestamp(value: &str) -> BooksResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| {
            LedgerError::Serialization(format!("invalid timestamp {value}: {err}")).into()
        })
}

pub(crate) fn enum_value<T>(value: &str) -> BooksResult<T>
where
    T: FromStr<Err = String>,
{
    T::from_str(value).map_err(|err| LedgerError::Serialization(err).into())
}

/// Add two quantities or amounts, reporting overflow as a validation error.
pub(crate) fn checked_sum(left: Decimal, right: Decimal, what: &str) -> BooksResult<Decimal> {
    left.checked_add(right)
        .ok_or_else(|| BooksError::Validation(format!("{what} is out of range")))
}

pub(crate) fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Allocate the next document number of `series` inside the caller's
/// transaction. A rolled-back unit gives its number back.
pub(crate) fn next_number(conn: &Connection, series: DocumentSeries) -> BooksResult<String> {
    conn.execute(
        "INSERT INTO document_sequences (series, last_value) VALUES (?1, 1)
         ON CONFLICT(series) DO UPDATE SET last_value = last_value + 1",
        [series.as_str()],
    )?;
    let value: i64 = conn.query_row(
        "SELECT last_value FROM document_sequences WHERE series = ?1",
        [series.as_str()],
        |row| row.get(0),
    )?;
    Ok(series.format(value as u64))
}

pub(crate) fn peek_number(conn: &Connection, series: DocumentSeries) -> BooksResult<String> {
    let value: Option<i64> = conn
        .query_row(
            "SELECT last_value FROM document_sequences WHERE series = ?1",
            [series.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(series.format(value.unwrap_or(0) as u64 + 1))
}
