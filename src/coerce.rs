//! Cell coercion: raw cell text to the canonical text form of a declared [`FieldType`].
//!
//! Rules:
//!
//! - An empty cell is always accepted unchanged, whatever the declared type.
//! - `STRING` passes through. The identifier column (position 1) additionally loses one
//!   trailing `.0`, left behind when a numeric spreadsheet cell is rendered as a float.
//! - `INTEGER` must parse as a base-10 `i64` and is rewritten to its decimal form.
//! - `FLOAT` and `BOOLEAN` must parse; the text is kept as-is. Finite literals that overflow
//!   `f64` are rejected.
//! - `DATE` and `TIMESTAMP` must match `M/D/YYYY h:mm:ss AM|PM` (two-digit minutes and seconds,
//!   four-digit year, upper-case meridiem), read as US Central civil time, and are rewritten to `YYYY-MM-DD` / `YYYY-MM-DD HH:MM:SS`. Values already in that
//!   canonical form are accepted too, so coercion is idempotent.

use std::borrow::Cow;
use std::num::{ParseFloatError, ParseIntError};

use chrono::{LocalResult, NaiveDate, NaiveDateTime, TimeDelta, TimeZone};
use chrono_tz::America::Chicago;
use chrono_tz::Tz;
use thiserror::Error;

use crate::types::{Field, FieldType};

/// Input pattern of date and time cells in workbook exports.
pub const WORKBOOK_DATETIME_FORMAT: &str = "%m/%d/%Y %I:%M:%S %p";
/// Canonical `DATE` output.
pub const DATE_FORMAT: &str = "%Y-%m-%d";
/// Canonical `TIMESTAMP` output.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Schema position of the accession/identifier column.
pub const IDENTIFIER_COLUMN: usize = 1;

const CIVIL_ZONE: Tz = Chicago;

/// Why a cell could not be coerced.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoercionFailure {
    #[error(transparent)]
    Integer(#[from] ParseIntError),
    #[error(transparent)]
    Float(#[from] ParseFloatError),
    #[error("number out of range")]
    FloatRange,
    #[error("invalid boolean literal")]
    Boolean,
    #[error("expected 'M/D/YYYY h:mm:ss AM|PM': {0}")]
    DateTime(#[from] chrono::ParseError),
    #[error("expected 'M/D/YYYY h:mm:ss AM|PM'")]
    DateTimeLayout,
    #[error("unknown type {0}")]
    UnknownType(String),
}

/// A cell that failed coercion, with the column it was checked against.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot convert value '{raw}' in column '{}' to {}: {cause}", .field.name, .field.field_type)]
pub struct FieldError {
    pub field: Field,
    pub raw: String,
    #[source]
    pub cause: CoercionFailure,
}

/// Coerce `raw` to the canonical form of `field_type`.
///
/// Returns [`Cow::Borrowed`] when the canonical form is the input itself.
pub fn coerce<'a>(raw: &'a str, field_type: &FieldType) -> Result<Cow<'a, str>, CoercionFailure> {
    if raw.is_empty() {
        return Ok(Cow::Borrowed(raw));
    }

    match field_type {
        FieldType::String => Ok(Cow::Borrowed(raw)),
        FieldType::Integer => {
            let parsed: i64 = raw.parse()?;
            Ok(keep_if_same(raw, parsed.to_string()))
        }
        FieldType::Float => {
            let parsed: f64 = raw.parse()?;
            if parsed.is_infinite() && !is_infinity_literal(raw) {
                return Err(CoercionFailure::FloatRange);
            }
            Ok(Cow::Borrowed(raw))
        }
        FieldType::Boolean => {
            parse_bool(raw)?;
            Ok(Cow::Borrowed(raw))
        }
        FieldType::Date => {
            let date = match parse_workbook_datetime(raw) {
                Ok(dt) => dt.date(),
                Err(err) => NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|_| err)?,
            };
            Ok(keep_if_same(raw, date.format(DATE_FORMAT).to_string()))
        }
        FieldType::Timestamp => {
            let dt = match parse_workbook_datetime(raw) {
                Ok(dt) => dt,
                Err(err) => {
                    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT).map_err(|_| err)?
                }
            };
            Ok(keep_if_same(raw, dt.format(TIMESTAMP_FORMAT).to_string()))
        }
        FieldType::Unsupported(name) => Err(CoercionFailure::UnknownType(name.clone())),
    }
}

/// Coerce the cell at schema position `column` against `field`.
///
/// Returns [`Cow::Owned`] whenever the cell text changes.
///
/// Applies the identifier-column rule by position only: the column is not recognized by
/// name, so a reordered schema moves the rule with it.
pub fn coerce_cell<'a>(raw: &'a str, field: &Field, column: usize) -> Result<Cow<'a, str>, FieldError> {
    if column == IDENTIFIER_COLUMN && field.field_type == FieldType::String {
        return Ok(match raw.strip_suffix(".0") {
            Some(stripped) => Cow::Owned(stripped.to_string()),
            None => Cow::Borrowed(raw),
        });
    }

    coerce(raw, &field.field_type).map_err(|cause| FieldError {
        field: field.clone(),
        raw: raw.to_string(),
        cause,
    })
}

fn keep_if_same(raw: &str, canonical: String) -> Cow<'_, str> {
    if canonical == raw {
        Cow::Borrowed(raw)
    } else {
        Cow::Owned(canonical)
    }
}

fn parse_bool(s: &str) -> Result<bool, CoercionFailure> {
    match s {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
        _ => Err(CoercionFailure::Boolean),
    }
}

fn is_infinity_literal(raw: &str) -> bool {
    let unsigned = raw.strip_prefix(['+', '-']).unwrap_or(raw);
    unsigned.eq_ignore_ascii_case("inf") || unsigned.eq_ignore_ascii_case("infinity")
}

/// Parse a workbook date-time and pin it to US Central wall-clock time.
fn parse_workbook_datetime(raw: &str) -> Result<NaiveDateTime, CoercionFailure> {
    let naive = NaiveDateTime::parse_from_str(raw, WORKBOOK_DATETIME_FORMAT)?;
    if !has_workbook_layout(raw) {
        return Err(CoercionFailure::DateTimeLayout);
    }
    Ok(localize(naive))
}

/// chrono's `%M`, `%S` and `%p` accept single digits and lower case; exports never do.
fn has_workbook_layout(raw: &str) -> bool {
    let digits = |part: &str, min: usize, max: usize| {
        (min..=max).contains(&part.len()) && part.bytes().all(|b| b.is_ascii_digit())
    };
    let mut words = raw.split(' ');
    let (Some(date), Some(time), Some(meridiem), None) =
        (words.next(), words.next(), words.next(), words.next())
    else {
        return false;
    };
    let date: Vec<&str> = date.split('/').collect();
    let time: Vec<&str> = time.split(':').collect();
    matches!(meridiem, "AM" | "PM")
        && matches!(date[..], [m, d, y] if digits(m, 1, 2) && digits(d, 1, 2) && digits(y, 4, 4))
        && matches!(time[..], [h, mm, ss] if digits(h, 1, 2) && digits(mm, 2, 2) && digits(ss, 2, 2))
}

/// Ambiguous fall-back times resolve to the earlier instant; times inside the spring-forward
/// gap move forward by the gap.
fn localize(naive: NaiveDateTime) -> NaiveDateTime {
    match CIVIL_ZONE.from_local_datetime(&naive) {
        LocalResult::Single(t) => t.naive_local(),
        LocalResult::Ambiguous(earliest, _) => earliest.naive_local(),
        LocalResult::None => {
            let shifted = naive + TimeDelta::hours(1);
            CIVIL_ZONE
                .from_local_datetime(&shifted)
                .earliest()
                .map(|t| t.naive_local())
                .unwrap_or(shifted)
        }
    }
}
