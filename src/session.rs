//! Staged uploads waiting for a commit, addressed by opaque tokens.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::error::{StagingError, StagingResult};
use crate::types::Site;

/// A validated upload, ready to be committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedUpload {
    /// Name of the uploaded file.
    pub file_name: String,
    /// Site whose schema validated the rows, if any.
    pub site: Option<Site>,
    /// Data rows in the buffer, header excluded.
    pub data_rows: usize,
    /// Finished CSV content. Never mutated once staged.
    pub buffer: Arc<[u8]>,
}

/// Limits for the [`SessionStore`]. Both default to unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionOptions {
    /// Entries older than this are treated as absent and dropped on the next access.
    pub ttl: Option<Duration>,
    /// Upper bound on live entries; further uploads are refused until space frees up.
    pub max_entries: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    Staged,
    Committing,
}

#[derive(Debug)]
struct Entry {
    upload: Arc<StagedUpload>,
    state: EntryState,
    staged_at: Instant,
}

/// Concurrent token → staged upload map.
///
/// Tokens are random v4 UUIDs. A token leaves the store exactly once, on a confirmed
/// commit (or expiry), and is never valid again.
#[derive(Debug, Default)]
pub struct SessionStore {
    entries: RwLock<HashMap<String, Entry>>,
    opts: SessionOptions,
}

impl SessionStore {
    pub fn new(opts: SessionOptions) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            opts,
        }
    }

    /// Stage `upload` and return its token.
    pub fn put(&self, upload: StagedUpload) -> StagingResult<String> {
        let mut entries = self.write();
        if let Some(limit) = self.opts.max_entries {
            if entries.len() >= limit {
                self.purge_locked(&mut entries);
            }
            if entries.len() >= limit {
                return Err(StagingError::SessionsFull { limit });
            }
        }

        let token = Uuid::new_v4().to_string();
        entries.insert(
            token.clone(),
            Entry {
                upload: Arc::new(upload),
                state: EntryState::Staged,
                staged_at: Instant::now(),
            },
        );
        Ok(token)
    }

    /// Look up a staged upload.
    pub fn get(&self, token: &str) -> Option<Arc<StagedUpload>> {
        let entries = self.read();
        entries
            .get(token)
            .filter(|entry| !self.is_expired(entry))
            .map(|entry| Arc::clone(&entry.upload))
    }

    /// Remove a token. Returns `true` if it was present.
    pub fn delete(&self, token: &str) -> bool {
        self.write().remove(token).is_some()
    }

    /// Number of entries, expired ones included until they are purged.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry that is not mid-commit. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.write();
        self.purge_locked(&mut entries)
    }

    /// Mark a staged upload as being committed and hand it out.
    ///
    /// While marked, other commits of the same token fail with
    /// [`StagingError::CommitInProgress`]. Follow with [`Self::finish_commit`] or
    /// [`Self::abort_commit`].
    pub(crate) fn begin_commit(&self, token: &str) -> StagingResult<Arc<StagedUpload>> {
        let mut entries = self.write();
        let unknown = || StagingError::UnknownToken {
            token: token.to_string(),
        };

        let expired = match entries.get(token) {
            None => return Err(unknown()),
            Some(entry) => self.is_expired(entry),
        };
        if expired {
            entries.remove(token);
            return Err(unknown());
        }

        let entry = entries.get_mut(token).ok_or_else(unknown)?;
        if entry.state == EntryState::Committing {
            return Err(StagingError::CommitInProgress {
                token: token.to_string(),
            });
        }
        entry.state = EntryState::Committing;
        Ok(Arc::clone(&entry.upload))
    }

    /// Retire a token after its upload was stored.
    pub(crate) fn finish_commit(&self, token: &str) {
        self.write().remove(token);
    }

    /// Return a token to the staged state after a failed write, so the commit can be retried.
    pub(crate) fn abort_commit(&self, token: &str) {
        if let Some(entry) = self.write().get_mut(token) {
            entry.state = EntryState::Staged;
        }
    }

    fn is_expired(&self, entry: &Entry) -> bool {
        entry.state == EntryState::Staged
            && self
                .opts
                .ttl
                .is_some_and(|ttl| entry.staged_at.elapsed() >= ttl)
    }

    fn purge_locked(&self, entries: &mut HashMap<String, Entry>) -> usize {
        let before = entries.len();
        entries.retain(|_, entry| !self.is_expired(entry));
        let purged = before - entries.len();
        if purged > 0 {
            tracing::debug!(purged, "dropped expired upload sessions");
        }
        purged
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Entry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Entry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    fn upload(tag: &str) -> StagedUpload {
        StagedUpload {
            file_name: format!("{tag}.xlsx"),
            site: Some(Site::NorthCampus),
            data_rows: 1,
            buffer: Arc::from(format!("h\n{tag}\n").into_bytes()),
        }
    }

    #[test]
    fn put_get_delete() {
        let store = SessionStore::default();
        let token = store.put(upload("a")).unwrap();
        assert_eq!(store.get(&token).unwrap().file_name, "a.xlsx");
        assert!(store.delete(&token));
        assert!(store.get(&token).is_none());
        assert!(!store.delete(&token));
    }

    #[test]
    fn concurrent_puts_get_distinct_tokens() {
        let store = Arc::new(SessionStore::default());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let tag = format!("u{i}");
                    let token = store.put(upload(&tag)).unwrap();
                    (tag, token)
                })
            })
            .collect();

        let results: Vec<(String, String)> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let tokens: HashSet<&String> = results.iter().map(|(_, t)| t).collect();
        assert_eq!(tokens.len(), 16);
        for (tag, token) in &results {
            assert_eq!(store.get(token).unwrap().file_name, format!("{tag}.xlsx"));
        }
    }

    #[test]
    fn commit_marks_entry_in_flight() {
        let store = SessionStore::default();
        let token = store.put(upload("a")).unwrap();

        store.begin_commit(&token).unwrap();
        assert!(matches!(
            store.begin_commit(&token),
            Err(StagingError::CommitInProgress { .. })
        ));

        store.abort_commit(&token);
        store.begin_commit(&token).unwrap();
        store.finish_commit(&token);
        assert!(matches!(
            store.begin_commit(&token),
            Err(StagingError::UnknownToken { .. })
        ));
    }

    #[test]
    fn ttl_expires_entries() {
        let store = SessionStore::new(SessionOptions {
            ttl: Some(Duration::ZERO),
            max_entries: None,
        });
        let token = store.put(upload("a")).unwrap();
        assert!(store.get(&token).is_none());
        assert!(matches!(
            store.begin_commit(&token),
            Err(StagingError::UnknownToken { .. })
        ));
        assert!(store.is_empty());

        store.put(upload("b")).unwrap();
        assert_eq!(store.purge_expired(), 1);
    }

    #[test]
    fn max_entries_refuses_new_uploads() {
        let store = SessionStore::new(SessionOptions {
            ttl: None,
            max_entries: Some(1),
        });
        let token = store.put(upload("a")).unwrap();
        assert!(matches!(
            store.put(upload("b")),
            Err(StagingError::SessionsFull { limit: 1 })
        ));
        store.delete(&token);
        store.put(upload("c")).unwrap();
    }
}
