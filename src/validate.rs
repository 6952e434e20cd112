//! Row validation against a destination [`Schema`].

use std::borrow::Cow;

use thiserror::Error;

use crate::coerce::{coerce_cell, FieldError};
use crate::types::{Field, Row, Schema};

/// Why a data row was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RowError {
    /// The row has fewer cells than the schema has columns.
    #[error("missing value for column {}", .field.name)]
    MissingColumn { field: Field },

    /// A cell could not be coerced to its column type.
    #[error(transparent)]
    Field(#[from] FieldError),
}

impl RowError {
    /// The column the error is about.
    pub fn field(&self) -> &Field {
        match self {
            RowError::MissingColumn { field } => field,
            RowError::Field(err) => &err.field,
        }
    }
}

/// Validate and coerce `row` against `schema`, returning the coerced row.
///
/// With no schema the row is returned unchanged.
pub fn validate_row(mut row: Row, schema: Option<&Schema>) -> Result<Row, RowError> {
    validate_row_in_place(&mut row, schema)?;
    Ok(row)
}

/// In-place variant of [`validate_row`].
///
/// - A row shorter than the schema fails on the first missing column before any cell is
///   coerced.
/// - Cells are coerced in schema order; the first failure stops the walk.
/// - Cells past the end of the schema are left untouched.
///
/// On error the row may be partially coerced and should be discarded.
pub fn validate_row_in_place(row: &mut Row, schema: Option<&Schema>) -> Result<(), RowError> {
    let Some(schema) = schema else {
        return Ok(());
    };

    if let Some(field) = schema.fields.get(row.len()) {
        return Err(RowError::MissingColumn {
            field: field.clone(),
        });
    }

    for (column, (field, cell)) in schema.fields.iter().zip(row.iter_mut()).enumerate() {
        let rewritten = match coerce_cell(cell, field, column)? {
            Cow::Owned(canonical) => Some(canonical),
            Cow::Borrowed(_) => None,
        };
        if let Some(canonical) = rewritten {
            *cell = canonical;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coerce::CoercionFailure;
    use crate::types::FieldType;

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("AppointmentID", FieldType::Integer),
            Field::new("Accession", FieldType::String),
            Field::new("AppointmentDate", FieldType::Date),
            Field::new("Active", FieldType::Boolean),
        ])
    }

    fn row(cells: &[&str]) -> Row {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn coerces_each_column_in_place() {
        let out = validate_row(
            row(&["007", "12345.0", "3/4/2024 5:06:07 PM", "true"]),
            Some(&schema()),
        )
        .unwrap();
        assert_eq!(out, row(&["7", "12345", "2024-03-04", "true"]));
    }

    #[test]
    fn validation_is_idempotent() {
        let schema = schema();
        let once = validate_row(
            row(&["42", "A-1.0", "12/1/2023 9:00:00 AM", ""]),
            Some(&schema),
        )
        .unwrap();
        let twice = validate_row(once.clone(), Some(&schema)).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn without_schema_rows_pass_unchanged() {
        let input = row(&["abc", "12345.0", "not a date"]);
        assert_eq!(validate_row(input.clone(), None).unwrap(), input);
    }

    #[test]
    fn short_row_names_first_missing_column() {
        let err = validate_row(row(&["abc", "1"]), Some(&schema())).unwrap_err();
        // The bad integer in column 0 is not reported: length is checked first.
        assert_eq!(
            err,
            RowError::MissingColumn {
                field: Field::new("AppointmentDate", FieldType::Date)
            }
        );
        assert_eq!(err.to_string(), "missing value for column AppointmentDate");
    }

    #[test]
    fn first_failing_column_wins() {
        let err = validate_row(row(&["1", "x", "bad date", "maybe"]), Some(&schema())).unwrap_err();
        match err {
            RowError::Field(e) => {
                assert_eq!(e.field.name, "AppointmentDate");
                assert_eq!(e.raw, "bad date");
                assert!(matches!(e.cause, CoercionFailure::DateTime(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn extra_cells_are_preserved_unexamined() {
        let out = validate_row(
            row(&["1", "x", "", "", "not-checked", "12345.0"]),
            Some(&schema()),
        )
        .unwrap();
        assert_eq!(out[4], "not-checked");
        assert_eq!(out[5], "12345.0");
    }

    #[test]
    fn zero_column_schema_accepts_anything() {
        let input = row(&["whatever"]);
        assert_eq!(validate_row(input.clone(), Some(&Schema::default())).unwrap(), input);
    }
}
