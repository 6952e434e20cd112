//! Delimited-text reading and writing.
//!
//! Staged buffers are plain CSV: comma separated, quoted where a cell contains a delimiter,
//! quote or newline. Rows keep their own length; short rows are not padded.

use crate::error::{StagingError, StagingResult};
use crate::types::{is_blank_row, Row};

/// Read delimited text into rows, dropping blank rows.
///
/// The first row is returned like any other; callers decide whether it is a header.
pub fn read_rows(delimited: &[u8]) -> StagingResult<Vec<Row>> {
    let mut rdr = ::csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(delimited);

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let row: Row = record.iter().map(str::to_string).collect();
        if !is_blank_row(&row) {
            rows.push(row);
        }
    }
    Ok(rows)
}

/// Encode rows as CSV.
pub fn write_rows<'a, I>(rows: I) -> StagingResult<Vec<u8>>
where
    I: IntoIterator<Item = &'a Row>,
{
    let mut wtr = ::csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());
    for row in rows {
        wtr.write_record(row)?;
    }
    wtr.into_inner()
        .map_err(|e| StagingError::internal(format!("flushing csv buffer: {}", e.error())))
}

/// Read back at most `max_rows` rows (header included) from a staged buffer.
pub fn preview(buffer: &[u8], max_rows: usize) -> StagingResult<Vec<Row>> {
    let mut rdr = ::csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(buffer);

    rdr.records()
        .take(max_rows)
        .map(|result| -> StagingResult<Row> {
            let record = result?;
            Ok(record.iter().map(str::to_string).collect())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Row {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn read_drops_blank_rows_and_keeps_ragged_rows() {
        let input = b"a,b,c\n , ,\n1,2\n\n,,\n3,4,5,6\n";
        let rows = read_rows(input).unwrap();
        assert_eq!(rows, vec![row(&["a", "b", "c"]), row(&["1", "2"]), row(&["3", "4", "5", "6"])]);
    }

    #[test]
    fn write_quotes_embedded_delimiters_and_newlines() {
        let rows = vec![row(&["name", "note"]), row(&["Smith, Ann", "line1\nline2"]), row(&["x"])];
        let out = write_rows(&rows).unwrap();
        assert_eq!(
            String::from_utf8(out.clone()).unwrap(),
            "name,note\n\"Smith, Ann\",\"line1\nline2\"\nx\n"
        );
        assert_eq!(read_rows(&out).unwrap(), rows);
    }

    #[test]
    fn preview_is_bounded() {
        let rows: Vec<Row> = (0..30).map(|i| row(&[&i.to_string()])).collect();
        let buffer = write_rows(&rows).unwrap();
        let preview = preview(&buffer, 10).unwrap();
        assert_eq!(preview.len(), 10);
        assert_eq!(preview[9], row(&["9"]));
        assert_eq!(super::preview(&buffer, 100).unwrap().len(), 30);
    }
}
