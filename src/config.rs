//! TOML configuration.
//!
//! Every key is optional. [`FileConfig`] mirrors the file as written; [`StagingConfig`] is the
//! resolved form with defaults filled in.
//!
//! ```toml
//! preview_rows = 25
//!
//! [conversion]
//! legacy = "external"
//! program = "/usr/bin/soffice"
//! timeout_secs = 60
//!
//! [storage]
//! root = "/var/lib/sheet-staging/objects"
//!
//! [sessions]
//! ttl_secs = 3600
//!
//! [schemas.downtown_medical]
//! fields = [{ name = "AppointmentID", type = "INTEGER" }]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::commit::{CommitOptions, CSV_CONTENT_TYPE};
use crate::error::{StagingError, StagingResult};
use crate::ingestion::external::ExternalConverter;
use crate::ingestion::unified::WorkbookConverter;
use crate::observability::{
    CompositeObserver, FileObserver, Reporter, StagingObserver, StagingSeverity, TracingObserver,
};
use crate::pipeline::PipelineOptions;
use crate::schema::SchemaRegistry;
use crate::service::DEFAULT_PREVIEW_ROWS;
use crate::session::SessionOptions;
use crate::storage::{FilesystemSink, MemorySink, ObjectSink};
use crate::types::{Schema, Site};

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    pub preview_rows: Option<usize>,
    pub content_type: Option<String>,

    pub conversion: Option<ConversionConfig>,
    pub storage: Option<StorageConfig>,
    pub sessions: Option<SessionsConfig>,
    pub pipeline: Option<PipelineConfig>,
    pub observability: Option<ObservabilityConfig>,
    /// Keyed by site display name or storage key.
    pub schemas: Option<BTreeMap<String, Schema>>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ConversionConfig {
    pub legacy: Option<LegacyConversion>,
    pub program: Option<String>,
    pub args: Option<Vec<String>>,
    pub timeout_secs: Option<u64>,
    pub scratch_dir: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for the filesystem sink. Without it objects are kept in memory.
    pub root: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SessionsConfig {
    pub ttl_secs: Option<u64>,
    pub max_entries: Option<usize>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct PipelineConfig {
    pub chunk_size: Option<usize>,
    pub num_threads: Option<usize>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub alert_at_or_above: Option<StagingSeverity>,
    /// Append-only event log written by [`FileObserver`].
    pub event_log: Option<String>,
}

/// How `.xls` workbooks are converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegacyConversion {
    /// Shell out to a headless office suite.
    External,
    /// Read them with calamine like every other format.
    InProcess,
}

impl FileConfig {
    pub fn load(path: &Path) -> StagingResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| StagingError::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml_str(&content)
            .map_err(|e| StagingError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml_str(content: &str) -> StagingResult<Self> {
        toml::from_str(content).map_err(|e| StagingError::Config(e.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct ConversionSettings {
    pub legacy: LegacyConversion,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub timeout: Duration,
    pub scratch_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub root: Option<PathBuf>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ObservabilitySettings {
    pub alert_at_or_above: StagingSeverity,
    pub event_log: Option<PathBuf>,
}

/// Resolved configuration.
#[derive(Debug, Clone)]
pub struct StagingConfig {
    pub preview_rows: usize,
    pub content_type: String,
    pub conversion: ConversionSettings,
    pub storage: StorageSettings,
    pub sessions: SessionOptions,
    pub pipeline: PipelineOptions,
    pub observability: ObservabilitySettings,
    pub registry: SchemaRegistry,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            preview_rows: DEFAULT_PREVIEW_ROWS,
            content_type: CSV_CONTENT_TYPE.to_string(),
            conversion: ConversionSettings {
                legacy: LegacyConversion::External,
                program: PathBuf::from("libreoffice"),
                args: Vec::new(),
                timeout: Duration::from_secs(120),
                scratch_dir: None,
            },
            storage: StorageSettings {
                root: None,
                timeout: Duration::from_secs(30),
            },
            sessions: SessionOptions::default(),
            pipeline: PipelineOptions::default(),
            observability: ObservabilitySettings {
                alert_at_or_above: StagingSeverity::Critical,
                event_log: None,
            },
            registry: SchemaRegistry::builtin(),
        }
    }
}

impl StagingConfig {
    /// Load `path` if given, otherwise use the defaults.
    pub fn load(path: Option<&Path>) -> StagingResult<Self> {
        match path {
            Some(path) => Self::resolve(FileConfig::load(path)?),
            None => Ok(Self::default()),
        }
    }

    /// Fill in defaults for every key the file leaves out.
    pub fn resolve(file: FileConfig) -> StagingResult<Self> {
        let defaults = Self::default();

        let conv = file.conversion.unwrap_or_default();
        let conversion = ConversionSettings {
            legacy: conv.legacy.unwrap_or(defaults.conversion.legacy),
            program: conv
                .program
                .map(PathBuf::from)
                .unwrap_or(defaults.conversion.program),
            args: conv.args.unwrap_or_default(),
            timeout: conv
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.conversion.timeout),
            scratch_dir: conv.scratch_dir.map(PathBuf::from),
        };

        let st = file.storage.unwrap_or_default();
        let storage = StorageSettings {
            root: st.root.map(PathBuf::from),
            timeout: st
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.storage.timeout),
        };

        let se = file.sessions.unwrap_or_default();
        let sessions = SessionOptions {
            ttl: se.ttl_secs.map(Duration::from_secs),
            max_entries: se.max_entries,
        };

        let pl = file.pipeline.unwrap_or_default();
        let pipeline = PipelineOptions {
            num_threads: pl.num_threads,
            chunk_size: pl.chunk_size.unwrap_or(defaults.pipeline.chunk_size),
        };
        if pipeline.chunk_size == 0 {
            return Err(StagingError::Config("pipeline.chunk_size must be > 0".to_string()));
        }

        let ob = file.observability.unwrap_or_default();
        let observability = ObservabilitySettings {
            alert_at_or_above: ob
                .alert_at_or_above
                .unwrap_or(defaults.observability.alert_at_or_above),
            event_log: ob.event_log.map(PathBuf::from),
        };

        let mut registry = defaults.registry;
        for (name, schema) in file.schemas.unwrap_or_default() {
            let site = Site::parse(&name)
                .ok_or_else(|| StagingError::Config(format!("schema for unknown site '{name}'")))?;
            registry.insert(site, schema);
        }

        Ok(Self {
            preview_rows: file.preview_rows.unwrap_or(defaults.preview_rows),
            content_type: file.content_type.unwrap_or(defaults.content_type),
            conversion,
            storage,
            sessions,
            pipeline,
            observability,
            registry,
        })
    }

    pub fn converter(&self) -> WorkbookConverter {
        match self.conversion.legacy {
            LegacyConversion::InProcess => WorkbookConverter::in_process(),
            LegacyConversion::External => {
                let mut external = ExternalConverter::new(&self.conversion.program)
                    .with_args(self.conversion.args.iter().cloned())
                    .with_timeout(self.conversion.timeout);
                if let Some(dir) = &self.conversion.scratch_dir {
                    external = external.with_scratch_root(dir);
                }
                WorkbookConverter::with_legacy(Arc::new(external))
            }
        }
    }

    /// Filesystem sink under `storage.root`, or an in-memory sink when no root is set.
    pub fn sink(&self) -> Arc<dyn ObjectSink> {
        match &self.storage.root {
            Some(root) => Arc::new(FilesystemSink::new(root)),
            None => Arc::new(MemorySink::new()),
        }
    }

    pub fn commit_options(&self) -> CommitOptions {
        CommitOptions {
            content_type: self.content_type.clone(),
            timeout: self.storage.timeout,
        }
    }

    /// Tracing observer, plus a file observer when `event_log` is set.
    pub fn reporter(&self) -> Reporter {
        let tracing_observer: Arc<dyn StagingObserver> = Arc::new(TracingObserver);
        let observer: Arc<dyn StagingObserver> = match &self.observability.event_log {
            Some(path) => {
                let file_observer: Arc<dyn StagingObserver> = Arc::new(FileObserver::new(path));
                Arc::new(CompositeObserver::new(vec![tracing_observer, file_observer]))
            }
            None => tracing_observer,
        };
        Reporter::new(observer, self.observability.alert_at_or_above)
    }
}
