//! Ingestion pipeline: convert a workbook, validate every data row against the site's schema,
//! and produce the finished CSV buffer.
//!
//! Runs move through `Start → Converted → Validating → Done`, or end in `Failed` from
//! either of the middle stages. A failed run produces no output at all.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::{StagingError, StagingResult};
use crate::ingestion::csv::write_rows;
use crate::ingestion::unified::WorkbookConverter;
use crate::schema::SchemaRegistry;
use crate::types::Site;
use crate::validate::{validate_row_in_place, RowError};

/// Stage of a pipeline run, as reported in trace events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Start,
    Converted,
    Validating,
    Done,
    Failed,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Start => "start",
            Self::Converted => "converted",
            Self::Validating => "validating",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Configuration for the [`IngestionPipeline`].
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Number of validation threads.
    ///
    /// If `None`, uses the platform's available parallelism.
    pub num_threads: Option<usize>,
    /// Number of data rows validated per task.
    pub chunk_size: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            num_threads: None,
            chunk_size: 1_024,
        }
    }
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionOutput {
    /// CSV content: the header row verbatim, then every coerced data row.
    pub buffer: Vec<u8>,
    /// Data rows written, header excluded.
    pub data_rows: usize,
    /// Site whose schema was applied, if any.
    pub site: Option<Site>,
}

pub struct IngestionPipeline {
    converter: WorkbookConverter,
    registry: Arc<SchemaRegistry>,
    pool: ThreadPool,
    opts: PipelineOptions,
}

impl fmt::Debug for IngestionPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestionPipeline")
            .field("opts", &self.opts)
            .field("threads", &self.pool.current_num_threads())
            .finish_non_exhaustive()
    }
}

impl IngestionPipeline {
    /// Create a pipeline with its own validation thread pool.
    pub fn new(
        converter: WorkbookConverter,
        registry: Arc<SchemaRegistry>,
        opts: PipelineOptions,
    ) -> StagingResult<Self> {
        if opts.chunk_size == 0 {
            return Err(StagingError::Config("pipeline chunk_size must be > 0".to_string()));
        }
        if opts.num_threads == Some(0) {
            return Err(StagingError::Config("pipeline num_threads must be > 0 when set".to_string()));
        }

        let n_threads = opts
            .num_threads
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
            .max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .thread_name(|i| format!("row-validate-{i}"))
            .build()
            .map_err(|e| StagingError::internal(format!("failed to build validation pool: {e}")))?;

        Ok(Self {
            converter,
            registry,
            pool,
            opts,
        })
    }

    /// Convert `input` and validate its rows for `site`.
    ///
    /// Without a site, or for a site with no registered schema, rows pass through unchanged.
    /// Errors carry the 1-based row number of the first failing row, counting the header.
    pub fn run(&self, input: &[u8], file_name: &str, site: Option<Site>) -> StagingResult<IngestionOutput> {
        let span = tracing::info_span!(
            "pipeline_run",
            file_name,
            site = site.map(Site::key).as_deref().unwrap_or("-")
        );
        let _entered = span.enter();
        let started = Instant::now();
        tracing::debug!(stage = %PipelineStage::Start, bytes = input.len());

        let result = self.run_stages(input, file_name, site);
        match &result {
            Ok(out) => tracing::debug!(
                stage = %PipelineStage::Done,
                rows = out.data_rows,
                bytes = out.buffer.len(),
                elapsed_ms = started.elapsed().as_millis() as u64
            ),
            Err(e) => tracing::debug!(stage = %PipelineStage::Failed, error = %e),
        }
        result
    }

    fn run_stages(&self, input: &[u8], file_name: &str, site: Option<Site>) -> StagingResult<IngestionOutput> {
        let mut rows = self.converter.to_rows(input, file_name)?;
        tracing::debug!(stage = %PipelineStage::Converted, rows = rows.len());

        let schema = site.and_then(|s| self.registry.schema_for(s));
        if site.is_some() && schema.is_none() {
            tracing::debug!("no schema registered for site, rows pass through");
        }

        // Row 0 is the header and is never validated.
        if let Some((_header, data)) = rows.split_first_mut() {
            tracing::debug!(stage = %PipelineStage::Validating, data_rows = data.len());
            let chunk_size = self.opts.chunk_size;
            let first_failure: Option<(usize, RowError)> = self.pool.install(|| {
                data.par_chunks_mut(chunk_size)
                    .enumerate()
                    .find_map_first(|(chunk_idx, chunk)| {
                        let base = chunk_idx * chunk_size;
                        chunk.iter_mut().enumerate().find_map(|(i, row)| {
                            validate_row_in_place(row, schema).err().map(|e| (base + i, e))
                        })
                    })
            });
            if let Some((data_idx, source)) = first_failure {
                return Err(StagingError::Validation {
                    row: data_idx + 2,
                    source,
                });
            }
        }

        let buffer = write_rows(&rows)?;
        Ok(IngestionOutput {
            buffer,
            data_rows: rows.len().saturating_sub(1),
            site,
        })
    }
}
