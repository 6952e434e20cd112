//! Upload and commit entry points, free of any transport.

use std::sync::Arc;

use crate::commit::{CommitDispatcher, CommitReceipt};
use crate::config::StagingConfig;
use crate::error::{StagingError, StagingResult};
use crate::ingestion::csv::preview;
use crate::observability::{OperationContext, Reporter, StagingStats};
use crate::pipeline::IngestionPipeline;
use crate::session::{SessionStore, StagedUpload};
use crate::storage::ObjectSink;
use crate::types::{Row, Site};

/// Rows shown back to the caller after an upload, header included.
pub const DEFAULT_PREVIEW_ROWS: usize = 10;

/// What the caller gets back from a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Token to pass to [`StagingService::commit`].
    pub token: String,
    /// First rows of the staged buffer.
    pub preview: Vec<Row>,
    /// Data rows staged, header excluded.
    pub data_rows: usize,
}

/// Ties the pipeline, the session store and the commit dispatcher together.
pub struct StagingService {
    pipeline: IngestionPipeline,
    sessions: Arc<SessionStore>,
    dispatcher: CommitDispatcher,
    preview_rows: usize,
    reporter: Reporter,
}

impl StagingService {
    /// `dispatcher` must have been built over the same `sessions`.
    pub fn new(pipeline: IngestionPipeline, sessions: Arc<SessionStore>, dispatcher: CommitDispatcher) -> Self {
        Self {
            pipeline,
            sessions,
            dispatcher,
            preview_rows: DEFAULT_PREVIEW_ROWS,
            reporter: Reporter::default(),
        }
    }

    /// Build every component from `config`, storing committed objects in `sink`.
    pub fn from_config(config: &StagingConfig, sink: Arc<dyn ObjectSink>) -> StagingResult<Self> {
        let reporter = config.reporter();
        let pipeline = IngestionPipeline::new(
            config.converter(),
            Arc::new(config.registry.clone()),
            config.pipeline.clone(),
        )?;
        let sessions = Arc::new(SessionStore::new(config.sessions));
        let dispatcher = CommitDispatcher::new(Arc::clone(&sessions), sink, config.commit_options())
            .with_reporter(reporter.clone());

        Ok(Self::new(pipeline, sessions, dispatcher)
            .with_preview_rows(config.preview_rows)
            .with_reporter(reporter))
    }

    pub fn with_preview_rows(mut self, preview_rows: usize) -> Self {
        self.preview_rows = preview_rows;
        self
    }

    /// Report upload outcomes through `reporter`. Commit outcomes are reported by the dispatcher.
    pub fn with_reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Validate an uploaded workbook and stage it.
    ///
    /// `site` is optional; when absent or blank no schema is applied. An unrecognized site is
    /// rejected before the workbook is read. Nothing is staged unless every row validates.
    pub fn upload(&self, input: &[u8], file_name: &str, site: Option<&str>) -> StagingResult<UploadReceipt> {
        let parsed_site = site.map(str::trim).filter(|s| !s.is_empty()).map(Site::parse);
        let ctx = OperationContext::upload(file_name, parsed_site.flatten());

        match self.upload_inner(input, file_name, site, parsed_site) {
            Ok((receipt, bytes)) => {
                let stats = StagingStats {
                    data_rows: receipt.data_rows,
                    bytes,
                };
                self.reporter.staged(&ctx, &receipt.token, stats);
                Ok(receipt)
            }
            Err(e) => {
                self.reporter.failed(&ctx, &e);
                Err(e)
            }
        }
    }

    fn upload_inner(
        &self,
        input: &[u8],
        file_name: &str,
        raw_site: Option<&str>,
        parsed_site: Option<Option<Site>>,
    ) -> StagingResult<(UploadReceipt, usize)> {
        if file_name.trim().is_empty() {
            return Err(StagingError::MissingInput { what: "file" });
        }
        let site = match parsed_site {
            None => None,
            Some(Some(site)) => Some(site),
            Some(None) => {
                return Err(StagingError::UnknownSite {
                    site: raw_site.unwrap_or_default().to_string(),
                });
            }
        };

        let output = self.pipeline.run(input, file_name, site)?;
        let preview = preview(&output.buffer, self.preview_rows)?;
        let bytes = output.buffer.len();
        let token = self.sessions.put(StagedUpload {
            file_name: file_name.to_string(),
            site: output.site,
            data_rows: output.data_rows,
            buffer: Arc::from(output.buffer),
        })?;

        let receipt = UploadReceipt {
            token,
            preview,
            data_rows: output.data_rows,
        };
        Ok((receipt, bytes))
    }

    /// Write the upload staged under `token` to storage for `site`.
    pub fn commit(&self, token: &str, site: &str) -> StagingResult<CommitReceipt> {
        self.dispatcher.commit(token, site)
    }
}
