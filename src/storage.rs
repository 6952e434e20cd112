//! Object storage sinks.
//!
//! The commit path only needs "store these bytes under this key, with this content type and
//! metadata". [`FilesystemSink`] keeps objects under a local root; [`MemorySink`] keeps them in
//! process.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::{mpsc, Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{StagingError, StagingResult};

/// User metadata attached to a stored object.
pub type ObjectMetadata = BTreeMap<String, String>;

/// "Put object" capability.
pub trait ObjectSink: Send + Sync {
    fn put(&self, key: &str, content_type: &str, metadata: &ObjectMetadata, body: &[u8]) -> StagingResult<()>;
}

/// A stored object as kept by [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub content_type: String,
    pub metadata: ObjectMetadata,
    pub body: Vec<u8>,
}

/// In-process sink, mostly useful for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemorySink {
    objects: Mutex<BTreeMap<String, StoredObject>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.lock().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, StoredObject>> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ObjectSink for MemorySink {
    fn put(&self, key: &str, content_type: &str, metadata: &ObjectMetadata, body: &[u8]) -> StagingResult<()> {
        self.lock().insert(
            key.to_string(),
            StoredObject {
                content_type: content_type.to_string(),
                metadata: metadata.clone(),
                body: body.to_vec(),
            },
        );
        Ok(())
    }
}

/// Metadata written next to each object as `<key>.meta.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSidecar {
    pub content_type: String,
    pub metadata: ObjectMetadata,
}

/// Stores objects as files under a root directory.
///
/// Both the object and its sidecar are written to a temporary file first and renamed into
/// place, so readers never see a partial object. The body lands first; a failed sidecar write
/// removes it again.
#[derive(Debug, Clone)]
pub struct FilesystemSink {
    root: PathBuf,
}

impl FilesystemSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path an object key is stored at. Keys are relative paths without `..` segments.
    pub fn object_path(&self, key: &str) -> StagingResult<PathBuf> {
        let relative = Path::new(key);
        let well_formed = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !well_formed {
            return Err(StagingError::Storage {
                key: key.to_string(),
                message: "object keys must be relative paths".to_string(),
            });
        }
        Ok(self.root.join(relative))
    }

    /// Read a stored object's sidecar.
    pub fn read_sidecar(&self, key: &str) -> StagingResult<ObjectSidecar> {
        let path = sidecar_path(&self.object_path(key)?);
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| StagingError::Storage {
            key: key.to_string(),
            message: format!("unreadable sidecar: {e}"),
        })
    }
}

impl ObjectSink for FilesystemSink {
    fn put(&self, key: &str, content_type: &str, metadata: &ObjectMetadata, body: &[u8]) -> StagingResult<()> {
        let path = self.object_path(key)?;
        let sidecar = ObjectSidecar {
            content_type: content_type.to_string(),
            metadata: metadata.clone(),
        };
        let sidecar_json = serde_json::to_vec_pretty(&sidecar).map_err(|e| StagingError::Storage {
            key: key.to_string(),
            message: e.to_string(),
        })?;

        let storage_err = |e: std::io::Error| StagingError::Storage {
            key: key.to_string(),
            message: e.to_string(),
        };
        write_atomically(&path, body).map_err(storage_err)?;
        if let Err(e) = write_atomically(&sidecar_path(&path), &sidecar_json) {
            let _ = fs::remove_file(&path);
            return Err(storage_err(e));
        }
        Ok(())
    }
}

fn sidecar_path(object_path: &Path) -> PathBuf {
    let mut name = object_path.as_os_str().to_owned();
    name.push(".meta.json");
    PathBuf::from(name)
}

fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Call [`ObjectSink::put`] on a worker thread and give up waiting after `timeout`.
///
/// A timed-out write may still land later. Keys are deterministic per upload, so a retried
/// commit overwrites the same object rather than creating a second one.
pub fn put_with_deadline(
    sink: Arc<dyn ObjectSink>,
    key: &str,
    content_type: &str,
    metadata: ObjectMetadata,
    body: Arc<[u8]>,
    timeout: Duration,
) -> StagingResult<()> {
    let (tx, rx) = mpsc::channel();
    let worker_key = key.to_string();
    let worker_content_type = content_type.to_string();
    thread::Builder::new()
        .name("object-put".to_string())
        .spawn(move || {
            let result = sink.put(&worker_key, &worker_content_type, &metadata, &body);
            let _ = tx.send(result);
        })?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(StagingError::StorageTimeout {
            key: key.to_string(),
            after: timeout,
        }),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(StagingError::internal(format!(
            "storage worker for '{key}' exited without a result"
        ))),
    }
}
