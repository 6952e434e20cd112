//! In-process workbook conversion (`.xlsx`, `.xlsm`, `.xlsb`, `.ods`, and `.xls` when
//! configured) using `calamine`.

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, DataType, Reader};
use chrono::{NaiveDateTime, NaiveTime, SubsecRound};

use crate::error::{StagingError, StagingResult};
use crate::types::Row;

use super::csv::write_rows;
use super::unified::SheetConverter;

/// Date cells are rendered in the same pattern the coercer expects from exported sheets.
const RENDERED_DATETIME_FORMAT: &str = "%-m/%-d/%Y %-I:%M:%S %p";

/// Converts the first sheet of a workbook to CSV without leaving the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct CalamineConverter;

impl SheetConverter for CalamineConverter {
    fn convert(&self, input: &[u8], _file_name: &str) -> StagingResult<Vec<u8>> {
        let rows = read_first_sheet(input)?;
        write_rows(&rows)
    }
}

/// Read every row of the workbook's first sheet as cell text.
///
/// The format is sniffed from the bytes, not the file name. Rows span the sheet's used
/// range, so every row has the same number of cells.
pub fn read_first_sheet(input: &[u8]) -> StagingResult<Vec<Row>> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(input))?;
    let range = match workbook.worksheet_range_at(0) {
        Some(range) => range?,
        None => {
            return Err(StagingError::Conversion {
                message: "workbook has no sheets".to_string(),
            });
        }
    };

    Ok(range
        .rows()
        .map(|cells| cells.iter().map(render_cell).collect())
        .collect())
}

fn render_cell(c: &Data) -> String {
    match c {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < 1e15 {
                (*f as i64).to_string()
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) if dt.is_duration() => dt.as_f64().to_string(),
        Data::DateTime(dt) => date_cell(c).unwrap_or_else(|| dt.as_f64().to_string()),
        Data::DateTimeIso(s) => date_cell(c).unwrap_or_else(|| s.clone()),
        Data::DurationIso(s) => s.clone(),
        Data::Error(e) => e.to_string(),
    }
}

/// Serial dates (either epoch) and ISO date cells, rounded to the second.
fn date_cell(c: &Data) -> Option<String> {
    c.as_datetime()
        .or_else(|| c.as_date().map(|d| d.and_time(NaiveTime::MIN)))
        .map(|dt: NaiveDateTime| dt.round_subsecs(0).format(RENDERED_DATETIME_FORMAT).to_string())
}
