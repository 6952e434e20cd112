//! Commit: write a staged upload to object storage and retire its token.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{StagingError, StagingResult};
use crate::observability::{OperationContext, Reporter};
use crate::session::SessionStore;
use crate::storage::{put_with_deadline, ObjectMetadata, ObjectSink};
use crate::types::Site;

/// Content type of staged buffers.
pub const CSV_CONTENT_TYPE: &str = "text/csv";

/// Outcome of a successful commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReceipt {
    /// Key the object was stored under.
    pub key: String,
    pub site: Site,
    pub token: String,
    /// Size of the stored object.
    pub bytes: usize,
}

#[derive(Debug, Clone)]
pub struct CommitOptions {
    pub content_type: String,
    /// How long to wait for the sink to confirm a write.
    pub timeout: Duration,
}

impl Default for CommitOptions {
    fn default() -> Self {
        Self {
            content_type: CSV_CONTENT_TYPE.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Object key for a committed upload: `<site-key>/upload_<token>.csv`.
pub fn object_key(site: Site, token: &str) -> String {
    format!("{}/upload_{token}.csv", site.key())
}

/// Moves staged uploads from the [`SessionStore`] into an [`ObjectSink`].
pub struct CommitDispatcher {
    sessions: Arc<SessionStore>,
    sink: Arc<dyn ObjectSink>,
    opts: CommitOptions,
    reporter: Reporter,
}

impl CommitDispatcher {
    pub fn new(sessions: Arc<SessionStore>, sink: Arc<dyn ObjectSink>, opts: CommitOptions) -> Self {
        Self {
            sessions,
            sink,
            opts,
            reporter: Reporter::default(),
        }
    }

    pub fn with_reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Store the upload staged under `token` for `site`.
    ///
    /// - `site` must name one of the known sites.
    /// - The token is retired only after the sink confirms the write. If the write fails or
    ///   times out the upload stays staged and the same token can be committed again.
    /// - A token is committed at most once; later attempts fail with
    ///   [`StagingError::UnknownToken`] and write nothing.
    pub fn commit(&self, token: &str, site: &str) -> StagingResult<CommitReceipt> {
        let token = token.trim();
        let span = tracing::info_span!("commit", token, site);
        let _entered = span.enter();

        let result = self.commit_inner(token, site);
        match &result {
            Ok(receipt) => self.reporter.committed(receipt),
            Err(e) => self
                .reporter
                .failed(&OperationContext::commit(token, Site::parse(site)), e),
        }
        result
    }

    fn commit_inner(&self, token: &str, site: &str) -> StagingResult<CommitReceipt> {
        if site.trim().is_empty() {
            return Err(StagingError::MissingInput { what: "site" });
        }
        let site = Site::parse(site).ok_or_else(|| StagingError::UnknownSite {
            site: site.to_string(),
        })?;
        if token.is_empty() {
            return Err(StagingError::MissingInput { what: "token" });
        }

        let upload = self.sessions.begin_commit(token)?;
        if let Some(validated_for) = upload.site.filter(|s| *s != site) {
            tracing::warn!(
                validated_for = %validated_for,
                destination = %site,
                "committing to a different site than the upload was validated for"
            );
        }

        let key = object_key(site, token);
        let mut metadata = ObjectMetadata::new();
        metadata.insert("site".to_string(), site.key());
        metadata.insert("token".to_string(), token.to_string());
        metadata.insert("source_file".to_string(), upload.file_name.clone());
        metadata.insert("rows".to_string(), upload.data_rows.to_string());

        let written = put_with_deadline(
            Arc::clone(&self.sink),
            &key,
            &self.opts.content_type,
            metadata,
            Arc::clone(&upload.buffer),
            self.opts.timeout,
        );

        match written {
            Ok(()) => {
                self.sessions.finish_commit(token);
                Ok(CommitReceipt {
                    key,
                    site,
                    token: token.to_string(),
                    bytes: upload.buffer.len(),
                })
            }
            Err(e) => {
                self.sessions.abort_commit(token);
                Err(e)
            }
        }
    }
}
