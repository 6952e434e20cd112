use std::sync::Arc;

use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};

use sheet_staging::commit::{CommitDispatcher, CommitOptions};
use sheet_staging::ingestion::WorkbookConverter;
use sheet_staging::pipeline::{IngestionPipeline, PipelineOptions};
use sheet_staging::schema::{appointment_schema, SchemaRegistry};
use sheet_staging::service::StagingService;
use sheet_staging::session::SessionStore;
use sheet_staging::storage::MemorySink;
use sheet_staging::validate::RowError;
use sheet_staging::{ErrorClass, StagingError};

fn header() -> Vec<String> {
    appointment_schema()
        .field_names()
        .map(str::to_string)
        .collect()
}

/// A data row in the shape the schedulers export, as cell text.
fn appointment_row(id: &str) -> Vec<String> {
    let mut row: Vec<String> = header().iter().map(|name| format!("{name} value")).collect();
    row[0] = id.to_string();
    row[1] = "12345.0".to_string();
    row[2] = "3/4/2024 5:06:07 PM".to_string();
    row[17] = "3/4/2024 5:30:00 PM".to_string();
    row[18] = "17".to_string();
    row
}

fn workbook_with_rows(rows: &[Vec<String>]) -> Vec<u8> {
    let mut wb = Workbook::new();
    let ws = wb.add_worksheet();
    ws.set_name("Appointments").unwrap();
    for (r, row) in rows.iter().enumerate() {
        for (c, cell) in row.iter().enumerate() {
            ws.write_string(r as u32, c as u16, cell).unwrap();
        }
    }
    wb.save_to_buffer().unwrap()
}

fn service() -> (StagingService, Arc<MemorySink>) {
    let sessions = Arc::new(SessionStore::default());
    let sink = Arc::new(MemorySink::new());
    let pipeline = IngestionPipeline::new(
        WorkbookConverter::in_process(),
        Arc::new(SchemaRegistry::builtin()),
        PipelineOptions {
            num_threads: Some(2),
            chunk_size: 4,
        },
    )
    .unwrap();
    let dispatcher = CommitDispatcher::new(sessions.clone(), sink.clone(), CommitOptions::default());
    (StagingService::new(pipeline, sessions, dispatcher), sink)
}

fn staged_rows(service: &StagingService, token: &str) -> Vec<Vec<String>> {
    let upload = service.sessions().get(token).unwrap();
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(&upload.buffer[..])
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect()
}

#[test]
fn upload_coerces_cells_and_keeps_header_verbatim() {
    let (service, _sink) = service();
    let bytes = workbook_with_rows(&[header(), appointment_row("007")]);

    let receipt = service
        .upload(&bytes, "appointments.xlsx", Some("North Campus"))
        .unwrap();
    assert_eq!(receipt.data_rows, 1);

    let rows = staged_rows(&service, &receipt.token);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0], header());
    assert_eq!(rows[1][0], "7");
    assert_eq!(rows[1][1], "12345");
    assert_eq!(rows[1][2], "2024-03-04");
    assert_eq!(rows[1][17], "2024-03-04 17:30:00");
    assert_eq!(rows[1][18], "17");
    assert_eq!(rows[1][3], "Location value");

    assert_eq!(receipt.preview, rows);
}

#[test]
fn invalid_cell_rejects_the_whole_upload() {
    let (service, _sink) = service();
    let bytes = workbook_with_rows(&[
        header(),
        appointment_row("1"),
        appointment_row("2"),
        appointment_row("abc"),
        appointment_row("xyz"),
    ]);

    let err = service
        .upload(&bytes, "appointments.xlsx", Some("south_campus"))
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::Validation);
    let message = err.to_string();
    assert!(message.contains("'abc'"), "{message}");
    assert!(message.contains("'AppointmentID'"), "{message}");
    assert!(message.contains("INTEGER"), "{message}");
    match err {
        StagingError::Validation { row, source } => {
            assert_eq!(row, 4);
            assert!(matches!(source, RowError::Field(_)));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(service.sessions().is_empty());
}

#[test]
fn short_rows_are_padded_to_the_sheet_width() {
    let (service, _sink) = service();
    let mut short = appointment_row("1");
    short.truncate(5);
    let bytes = workbook_with_rows(&[header(), short]);

    // The sheet's used range pads short rows with empty cells, so they validate as empty.
    let receipt = service
        .upload(&bytes, "appointments.xlsx", Some("North Campus"))
        .unwrap();
    assert_eq!(receipt.data_rows, 1);
}

#[test]
fn blank_rows_are_dropped_before_validation() {
    let (service, _sink) = service();
    let blank: Vec<String> = vec!["  ".to_string(); 23];
    let bytes = workbook_with_rows(&[
        header(),
        blank.clone(),
        appointment_row("1"),
        blank,
        appointment_row("2"),
    ]);

    let receipt = service
        .upload(&bytes, "appointments.xlsx", Some("Lakeview Imaging"))
        .unwrap();
    assert_eq!(receipt.data_rows, 2);
    let ids: Vec<String> = staged_rows(&service, &receipt.token)
        .into_iter()
        .skip(1)
        .map(|row| row[0].clone())
        .collect();
    assert_eq!(ids, vec!["1", "2"]);
}

#[test]
fn site_without_schema_stages_rows_unchanged() {
    let (service, _sink) = service();
    let bytes = workbook_with_rows(&[header(), appointment_row("not a number")]);

    let receipt = service
        .upload(&bytes, "appointments.xlsx", Some("Downtown Medical"))
        .unwrap();
    let rows = staged_rows(&service, &receipt.token);
    assert_eq!(rows[1][0], "not a number");
    assert_eq!(rows[1][1], "12345.0");
}

#[test]
fn upload_without_site_skips_validation() {
    let (service, _sink) = service();
    let bytes = workbook_with_rows(&[header(), appointment_row("abc")]);
    let receipt = service.upload(&bytes, "appointments.xlsx", None).unwrap();
    assert_eq!(receipt.data_rows, 1);
}

#[test]
fn numeric_and_date_cells_are_rendered_before_coercion() {
    let (service, _sink) = service();

    let mut wb = Workbook::new();
    let ws = wb.add_worksheet();
    for (c, name) in header().iter().enumerate() {
        ws.write_string(0, c as u16, name).unwrap();
    }
    let date_format = Format::new().set_num_format("m/d/yyyy h:mm:ss AM/PM");
    let seen = ExcelDateTime::from_ymd(2024, 3, 4)
        .unwrap()
        .and_hms(17, 6, 7)
        .unwrap();
    ws.write_number(1, 0, 42).unwrap();
    ws.write_number(1, 1, 12345).unwrap();
    ws.write_datetime_with_format(1, 2, &seen, &date_format).unwrap();
    ws.write_string(1, 22, "last").unwrap();
    let bytes = wb.save_to_buffer().unwrap();

    let receipt = service
        .upload(&bytes, "appointments.xlsx", Some("Riverside Clinic"))
        .unwrap();
    let rows = staged_rows(&service, &receipt.token);
    assert_eq!(rows[1][0], "42");
    assert_eq!(rows[1][1], "12345");
    assert_eq!(rows[1][2], "2024-03-04");
    assert_eq!(rows[1][22], "last");
}

#[test]
fn preview_is_bounded() {
    let (service, _sink) = service();
    let mut rows = vec![header()];
    rows.extend((1..=30).map(|i| appointment_row(&i.to_string())));
    let bytes = workbook_with_rows(&rows);

    let receipt = service
        .with_preview_rows(5)
        .upload(&bytes, "appointments.xlsx", Some("North Campus"))
        .unwrap();
    assert_eq!(receipt.data_rows, 30);
    assert_eq!(receipt.preview.len(), 5);
    assert_eq!(receipt.preview[0], header());
}

#[test]
fn client_errors_are_reported_before_reading_the_workbook() {
    let (service, sink) = service();

    let err = service
        .upload(b"whatever", "appointments.csv", Some("North Campus"))
        .unwrap_err();
    assert!(matches!(err, StagingError::UnsupportedExtension { .. }));
    assert!(err.to_string().contains("appointments.csv"));

    let err = service
        .upload(b"whatever", "appointments.xlsx", Some("Mars Base"))
        .unwrap_err();
    assert!(matches!(err, StagingError::UnknownSite { ref site } if site == "Mars Base"));
    assert_eq!(err.class(), ErrorClass::Client);

    let err = service.upload(b"not a zip", "appointments.xlsx", None).unwrap_err();
    assert!(matches!(err, StagingError::Excel(_)), "{err:?}");

    assert!(service.sessions().is_empty());
    assert!(sink.is_empty());
}
