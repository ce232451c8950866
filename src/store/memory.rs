use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tracing::{debug, info};

use super::JobStore;
use crate::error::StoreError;
use crate::types::job::{Job, JobId, NewJob};
use crate::types::states::JobState;

#[derive(Debug, Default)]
struct Inner {
    next_id: JobId,
    jobs: BTreeMap<JobId, Job>,
    by_fingerprint: HashMap<String, JobId>,
}

/// A mutex-guarded job table, optionally mirrored to a YAML snapshot file.
///
/// With a snapshot path, every mutation rewrites the snapshot before it is
/// acknowledged. If the write fails the mutation is undone and
/// `StoreError::Unavailable` returned, so memory never runs ahead of disk.
#[derive(Debug)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    snapshot: Option<PathBuf>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// A store that lives only as long as the process.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_id: 1,
                ..Default::default()
            }),
            snapshot: None,
        }
    }

    /// Opens a store backed by the snapshot at `path`, loading any jobs it
    /// already holds. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let jobs: Vec<Job> = match fs::read_to_string(&path) {
            Ok(text) => serde_yaml::from_str(&text).map_err(|error| {
                StoreError::Unavailable(format!(
                    "parsing snapshot {}: {error}",
                    path.display()
                ))
            })?,
            Err(error) if error.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(error) => {
                return Err(StoreError::Unavailable(format!(
                    "reading snapshot {}: {error}",
                    path.display()
                )))
            },
        };

        let mut inner = Inner {
            next_id: 1,
            ..Default::default()
        };
        for job in jobs {
            if inner.jobs.contains_key(&job.id)
                || inner.by_fingerprint.contains_key(&job.fingerprint)
            {
                return Err(StoreError::Unavailable(format!(
                    "snapshot {} holds job {} twice",
                    path.display(),
                    job.id
                )));
            }
            inner.next_id = inner.next_id.max(job.id + 1);
            inner.by_fingerprint.insert(job.fingerprint.clone(), job.id);
            inner.jobs.insert(job.id, job);
        }

        info!(
            path = %path.display(),
            jobs = inner.jobs.len(),
            "opened job snapshot"
        );

        Ok(Self {
            inner: Mutex::new(inner),
            snapshot: Some(path),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Every mutation below is undone before an error return, so the
        // table is consistent even if a holder panicked.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, inner: &Inner) -> Result<(), StoreError> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };

        let jobs: Vec<&Job> = inner.jobs.values().collect();
        let text = serde_yaml::to_string(&jobs).map_err(|error| {
            StoreError::Unavailable(format!("encoding snapshot: {error}"))
        })?;

        write_atomically(path, text.as_bytes()).map_err(|error| {
            StoreError::Unavailable(format!(
                "writing snapshot {}: {error}",
                path.display()
            ))
        })?;

        debug!(jobs = jobs.len(), "wrote job snapshot");
        Ok(())
    }
}

/// Replaces `path` with `data` so readers see either the old snapshot or the
/// whole new one. The data is synced before the rename, otherwise a power loss
/// can leave the renamed file empty.
fn write_atomically(path: &Path, data: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension("tmp");
    let mut file = File::create(&tmp)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp, path)
}

impl JobStore for MemoryStore {
    fn create_job(&self, new: NewJob) -> Result<Job, StoreError> {
        let mut inner = self.lock();

        if inner.by_fingerprint.contains_key(&new.fingerprint) {
            return Err(StoreError::Conflict(new.fingerprint));
        }

        let id = inner.next_id;
        let job = Job::from_new(id, new, Utc::now());
        inner.next_id += 1;
        inner.by_fingerprint.insert(job.fingerprint.clone(), id);
        inner.jobs.insert(id, job.clone());

        if let Err(error) = self.persist(&inner) {
            inner.jobs.remove(&id);
            inner.by_fingerprint.remove(&job.fingerprint);
            inner.next_id = id;
            return Err(error);
        }

        Ok(job)
    }

    fn get_job(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        Ok(self.lock().jobs.get(&id).cloned())
    }

    fn find_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> Result<Option<Job>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .by_fingerprint
            .get(fingerprint)
            .and_then(|id| inner.jobs.get(id))
            .cloned())
    }

    fn list_by_state(&self, state: JobState) -> Result<Vec<Job>, StoreError> {
        Ok(self
            .lock()
            .jobs
            .values()
            .filter(|j| j.state == state)
            .cloned()
            .collect())
    }

    fn list_all(&self) -> Result<Vec<Job>, StoreError> {
        Ok(self.lock().jobs.values().cloned().collect())
    }

    fn update(&self, job: &Job) -> Result<(), StoreError> {
        let mut inner = self.lock();

        let Some(slot) = inner.jobs.get_mut(&job.id) else {
            return Err(StoreError::NotFound(job.id));
        };
        if slot.fingerprint != job.fingerprint {
            return Err(StoreError::Conflict(job.fingerprint.clone()));
        }
        let previous = std::mem::replace(slot, job.clone());

        if let Err(error) = self.persist(&inner) {
            inner.jobs.insert(job.id, previous);
            return Err(error);
        }

        Ok(())
    }
}
