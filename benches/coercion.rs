use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sheet_staging::coerce::coerce;
use sheet_staging::ingestion::{SheetConverter, WorkbookConverter};
use sheet_staging::pipeline::{IngestionPipeline, PipelineOptions};
use sheet_staging::schema::{appointment_schema, SchemaRegistry};
use sheet_staging::types::{FieldType, Row, Site};
use sheet_staging::validate::validate_row;
use sheet_staging::StagingResult;

fn appointment_row(i: usize) -> Row {
    let mut row: Row = appointment_schema()
        .field_names()
        .map(|name| format!("{name} {i}"))
        .collect();
    row[0] = format!("{i:06}");
    row[1] = format!("{}.0", 10_000 + i);
    row[2] = "3/4/2024 5:06:07 PM".to_string();
    row[17] = "11/3/2024 1:30:00 AM".to_string();
    row[18] = "1".to_string();
    row
}

fn bench_coerce(c: &mut Criterion) {
    c.bench_function("coerce_integer", |b| {
        b.iter(|| coerce(black_box("000123456"), &FieldType::Integer))
    });
    c.bench_function("coerce_date", |b| {
        b.iter(|| coerce(black_box("3/4/2024 5:06:07 PM"), &FieldType::Date))
    });
    c.bench_function("coerce_timestamp_canonical", |b| {
        b.iter(|| coerce(black_box("2024-03-04 17:06:07"), &FieldType::Timestamp))
    });
}

fn bench_validate_row(c: &mut Criterion) {
    let schema = appointment_schema();
    let row = appointment_row(42);
    c.bench_function("validate_appointment_row", |b| {
        b.iter(|| validate_row(black_box(row.clone()), Some(&schema)))
    });
}

/// Serves pre-rendered CSV so the benchmark measures validation, not workbook parsing.
struct PreRendered(Vec<u8>);

impl SheetConverter for PreRendered {
    fn convert(&self, _input: &[u8], _file_name: &str) -> StagingResult<Vec<u8>> {
        Ok(self.0.clone())
    }
}

fn bench_pipeline(c: &mut Criterion) {
    let mut rows: Vec<Row> = vec![appointment_schema().field_names().map(str::to_string).collect()];
    rows.extend((0..20_000).map(appointment_row));
    let mut wtr = csv::Writer::from_writer(Vec::new());
    for row in &rows {
        wtr.write_record(row).unwrap();
    }
    let csv_bytes = wtr.into_inner().unwrap();

    let mut group = c.benchmark_group("pipeline_20k_rows");
    for threads in [1usize, 4] {
        let fixed: Arc<dyn SheetConverter> = Arc::new(PreRendered(csv_bytes.clone()));
        let pipeline = IngestionPipeline::new(
            WorkbookConverter::new(Arc::clone(&fixed), fixed),
            Arc::new(SchemaRegistry::builtin()),
            PipelineOptions {
                num_threads: Some(threads),
                chunk_size: 1_024,
            },
        )
        .unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(threads), &pipeline, |b, p| {
            b.iter(|| p.run(b"", "bench.xlsx", Some(Site::NorthCampus)).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_coerce, bench_validate_row, bench_pipeline);
criterion_main!(benches);
