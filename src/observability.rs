use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::Deserialize;

use crate::commit::CommitReceipt;
use crate::error::{ErrorClass, StagingError};
use crate::types::Site;

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StagingSeverity {
    /// Informational event.
    Info,
    /// Caller mistake (bad extension, unknown token, ...).
    Warning,
    /// The upload or commit failed.
    Error,
    /// Storage, I/O or internal failures.
    Critical,
}

impl StagingSeverity {
    /// Severity of a failed operation.
    pub fn for_error(e: &StagingError) -> Self {
        match e {
            StagingError::Csv(err) if matches!(err.kind(), ::csv::ErrorKind::Io(_)) => Self::Critical,
            StagingError::Io(_)
            | StagingError::Storage { .. }
            | StagingError::StorageTimeout { .. } => Self::Critical,
            other => match other.class() {
                ErrorClass::Client => Self::Warning,
                ErrorClass::Validation | ErrorClass::Collaborator => Self::Error,
                ErrorClass::Internal => Self::Critical,
            },
        }
    }
}

/// Which entry point an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Upload,
    Commit,
}

/// Context about an upload or commit attempt.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub operation: Operation,
    /// File name for uploads, token for commits.
    pub subject: String,
    pub site: Option<Site>,
}

impl OperationContext {
    pub fn upload(file_name: &str, site: Option<Site>) -> Self {
        Self {
            operation: Operation::Upload,
            subject: file_name.to_string(),
            site,
        }
    }

    pub fn commit(token: &str, site: Option<Site>) -> Self {
        Self {
            operation: Operation::Commit,
            subject: token.to_string(),
            site,
        }
    }
}

impl fmt::Display for OperationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let site = self.site.map(Site::key).unwrap_or_else(|| "-".to_string());
        write!(f, "op={:?} subject={} site={}", self.operation, self.subject, site)
    }
}

/// Minimal stats reported when an upload is staged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagingStats {
    /// Data rows, header excluded.
    pub data_rows: usize,
    /// Size of the staged buffer.
    pub bytes: usize,
}

/// Observer interface for staging outcomes.
///
/// Implementors can record metrics, logs, or trigger alerts.
pub trait StagingObserver: Send + Sync {
    /// Called when an upload has been validated and staged under `token`.
    fn on_staged(&self, _ctx: &OperationContext, _token: &str, _stats: StagingStats) {}

    /// Called when a staged upload has been written to storage.
    fn on_committed(&self, _receipt: &CommitReceipt) {}

    /// Called when an upload or commit fails.
    fn on_failure(&self, _ctx: &OperationContext, _severity: StagingSeverity, _error: &StagingError) {}

    /// Called when a failure meets the alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_failure`].
    fn on_alert(&self, ctx: &OperationContext, severity: StagingSeverity, error: &StagingError) {
        self.on_failure(ctx, severity, error)
    }
}

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn StagingObserver>>,
}

impl CompositeObserver {
    pub fn new(observers: Vec<Arc<dyn StagingObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl StagingObserver for CompositeObserver {
    fn on_staged(&self, ctx: &OperationContext, token: &str, stats: StagingStats) {
        for o in &self.observers {
            o.on_staged(ctx, token, stats);
        }
    }

    fn on_committed(&self, receipt: &CommitReceipt) {
        for o in &self.observers {
            o.on_committed(receipt);
        }
    }

    fn on_failure(&self, ctx: &OperationContext, severity: StagingSeverity, error: &StagingError) {
        for o in &self.observers {
            o.on_failure(ctx, severity, error);
        }
    }

    fn on_alert(&self, ctx: &OperationContext, severity: StagingSeverity, error: &StagingError) {
        for o in &self.observers {
            o.on_alert(ctx, severity, error);
        }
    }
}

/// Emits staging events as `tracing` events.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl StagingObserver for TracingObserver {
    fn on_staged(&self, ctx: &OperationContext, token: &str, stats: StagingStats) {
        tracing::info!(%ctx, token, rows = stats.data_rows, bytes = stats.bytes, "upload staged");
    }

    fn on_committed(&self, receipt: &CommitReceipt) {
        tracing::info!(
            key = %receipt.key,
            site = %receipt.site,
            bytes = receipt.bytes,
            "upload committed"
        );
    }

    fn on_failure(&self, ctx: &OperationContext, severity: StagingSeverity, error: &StagingError) {
        match severity {
            StagingSeverity::Info => tracing::info!(%ctx, %error, "staging failed"),
            StagingSeverity::Warning => tracing::warn!(%ctx, %error, "staging rejected"),
            StagingSeverity::Error | StagingSeverity::Critical => {
                tracing::error!(%ctx, ?severity, %error, "staging failed")
            }
        }
    }

    fn on_alert(&self, ctx: &OperationContext, severity: StagingSeverity, error: &StagingError) {
        tracing::error!(%ctx, ?severity, %error, alert = true, "staging alert");
    }
}

/// Appends staging events to a local log file.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileObserver {
    /// Create a file observer that appends events to `path`.
    ///
    /// Writes are best-effort; failures to open/write the log file are ignored.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn append_line(&self, line: &str) {
        let _guard = self.lock.lock().ok();
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{} {line}", chrono::Utc::now().to_rfc3339());
        }
    }
}

impl StagingObserver for FileObserver {
    fn on_staged(&self, ctx: &OperationContext, token: &str, stats: StagingStats) {
        self.append_line(&format!(
            "staged {ctx} token={token} rows={} bytes={}",
            stats.data_rows, stats.bytes
        ));
    }

    fn on_committed(&self, receipt: &CommitReceipt) {
        self.append_line(&format!(
            "committed key={} site={} bytes={}",
            receipt.key,
            receipt.site.key(),
            receipt.bytes
        ));
    }

    fn on_failure(&self, ctx: &OperationContext, severity: StagingSeverity, error: &StagingError) {
        self.append_line(&format!("fail severity={severity:?} {ctx} err={error}"));
    }

    fn on_alert(&self, ctx: &OperationContext, severity: StagingSeverity, error: &StagingError) {
        self.append_line(&format!("ALERT severity={severity:?} {ctx} err={error}"));
    }
}

/// Observer plus alert threshold, shared by the pipeline, the dispatcher and the service.
#[derive(Clone)]
pub struct Reporter {
    observer: Option<Arc<dyn StagingObserver>>,
    alert_at_or_above: StagingSeverity,
}

impl Default for Reporter {
    fn default() -> Self {
        Self {
            observer: None,
            alert_at_or_above: StagingSeverity::Critical,
        }
    }
}

impl fmt::Debug for Reporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reporter")
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}

impl Reporter {
    pub fn new(observer: Arc<dyn StagingObserver>, alert_at_or_above: StagingSeverity) -> Self {
        Self {
            observer: Some(observer),
            alert_at_or_above,
        }
    }

    pub fn staged(&self, ctx: &OperationContext, token: &str, stats: StagingStats) {
        if let Some(obs) = &self.observer {
            obs.on_staged(ctx, token, stats);
        }
    }

    pub fn committed(&self, receipt: &CommitReceipt) {
        if let Some(obs) = &self.observer {
            obs.on_committed(receipt);
        }
    }

    /// Report a failure, and an alert if its severity reaches the threshold.
    pub fn failed(&self, ctx: &OperationContext, error: &StagingError) {
        let Some(obs) = &self.observer else {
            return;
        };
        let severity = StagingSeverity::for_error(error);
        obs.on_failure(ctx, severity, error);
        if severity >= self.alert_at_or_above {
            obs.on_alert(ctx, severity, error);
        }
    }
}
