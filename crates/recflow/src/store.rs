//! Durable pending-job index plus the in-process FIFO queue feeding the dispatcher.
//!
//! The pending index is the only durable record. Every mutation rewrites the
//! whole index under a single lock, and a job only becomes visible to the
//! dispatcher after the write that records it has completed.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;
use crate::error::{Error, Result};
use crate::media::Details;

/// Queue capacity when few jobs are recovered
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// More recovered jobs than this is treated as corrupt or runaway state
pub const MAX_PENDING_JOBS: usize = 4096;

/// Unique job identifier.
///
/// UUIDv7 is time ordered, so the key order of the pending index is the order
/// jobs were accepted in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn generate() -> Self {
        JobId(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        JobId(s.to_string())
    }
}

/// A queued unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: JobId,
    pub details: Details,
}

/// On-disk form of the pending index
#[derive(Debug, Default, Serialize, Deserialize)]
struct PendingIndex {
    #[serde(default)]
    pending: BTreeMap<JobId, Details>,
}

/// Runtime queue capacity for a given number of recovered jobs
pub fn queue_capacity(pending: usize) -> Result<usize> {
    if pending > MAX_PENDING_JOBS {
        return Err(Error::TooManyPending {
            count: pending,
            ceiling: MAX_PENDING_JOBS,
        });
    }
    Ok(DEFAULT_QUEUE_CAPACITY.max(pending * 2))
}

/// Consumer end of the runtime queue, owned by the dispatcher
#[derive(Debug)]
pub struct JobQueue {
    rx: mpsc::Receiver<Job>,
    capacity: usize,
}

impl JobQueue {
    /// Wait for the next job. `None` once every store handle is gone.
    pub async fn next(&mut self) -> Option<Job> {
        self.rx.recv().await
    }

    /// Take the next job if one is ready right now
    pub fn try_next(&mut self) -> Option<Job> {
        self.rx.try_recv().ok()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Pending job store shared by the ingestion handlers and the dispatcher
#[derive(Debug)]
pub struct JobStore {
    path: PathBuf,
    index: Mutex<PendingIndex>,
    tx: mpsc::Sender<Job>,
}

impl JobStore {
    /// Open the store at `path`, replaying every pending job into a fresh queue.
    ///
    /// A missing state file is created empty. Fails with `TooManyPending` when the
    /// recovered backlog is beyond the sane ceiling.
    pub async fn open(path: impl Into<PathBuf>) -> Result<(JobStore, JobQueue)> {
        let path = path.into();
        let index = load_index(&path).await?;
        let recovered = index.pending.len();

        let capacity = queue_capacity(recovered)?;
        if capacity > DEFAULT_QUEUE_CAPACITY {
            debug!("state: resizing job queue to {}", capacity);
        }

        let (tx, rx) = mpsc::channel(capacity);
        for (id, details) in &index.pending {
            info!("state: adding pending job {} ({})", id, details.title);
            tx.try_send(Job { id: id.clone(), details: details.clone() })
                .map_err(|e| Error::Io(std::io::Error::other(format!("recovery queue rejected job: {}", e))))?;
        }

        info!("state: loaded {} pending job(s) from {}", recovered, path.display());

        let store = JobStore {
            path,
            index: Mutex::new(index),
            tx,
        };
        Ok((store, JobQueue { rx, capacity }))
    }

    /// Read the still-pending jobs from `path` in replay order, creating an empty index if absent
    pub async fn recover(path: &Path) -> Result<Vec<Job>> {
        let index = load_index(path).await?;
        Ok(index
            .pending
            .into_iter()
            .map(|(id, details)| Job { id, details })
            .collect())
    }

    /// Record a new job and publish it to the dispatcher.
    ///
    /// The index is written before the job is sent, so a job can never run without a
    /// durable record. On a failed write the job is dropped again and never published.
    pub async fn enqueue(&self, details: Details) -> Result<JobId> {
        details.validate()?;

        // Reserve the slot first so a full queue never blocks while the lock is held
        let permit = self.tx.reserve().await;

        let mut index = self.index.lock().await;
        let id = JobId::generate();
        index.pending.insert(id.clone(), details.clone());

        if let Err(e) = persist(&self.path, &index).await {
            index.pending.remove(&id);
            return Err(e);
        }

        debug!("state: appended job {} ({})", id, details.title);

        match permit {
            Ok(permit) => permit.send(Job { id: id.clone(), details }),
            Err(_) => warn!("state: dispatcher stopped, job {} will run after restart", id),
        }

        Ok(id)
    }

    /// Remove a finished job from the index. Unknown ids are a no-op.
    pub async fn complete(&self, id: &JobId) -> Result<()> {
        let mut index = self.index.lock().await;

        match index.pending.remove(id) {
            Some(details) => {
                debug!("state: removing job {} ({})", id, details.title);
                if let Err(e) = persist(&self.path, &index).await {
                    // Keep memory in line with what is still on disk
                    index.pending.insert(id.clone(), details);
                    return Err(e);
                }
                Ok(())
            }
            None => {
                debug!("state: job {} already complete", id);
                Ok(())
            }
        }
    }

    /// Ids of every pending job, oldest first
    pub async fn pending(&self) -> Vec<JobId> {
        self.index.lock().await.pending.keys().cloned().collect()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

async fn load_index(path: &Path) -> Result<PendingIndex> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let index = PendingIndex::default();
            persist(path, &index).await?;
            Ok(index)
        }
        Err(e) => Err(Error::Io(e)),
    }
}

/// Write the index to a sibling temp file and rename it over the state file
async fn persist(path: &Path, index: &PendingIndex) -> Result<()> {
    use tokio::io::AsyncWriteExt;

    debug!("state: saving state to disk");
    let json = serde_json::to_vec_pretty(index)?;
    let wrap = |source: std::io::Error| Error::Persistence {
        path: path.to_path_buf(),
        source,
    };

    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            tokio::fs::create_dir_all(dir).await.map_err(wrap)?;
        }
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o640)
        .open(&tmp)
        .await
        .map_err(wrap)?;
    file.write_all(&json).await.map_err(wrap)?;
    file.sync_all().await.map_err(wrap)?;
    drop(file);

    tokio::fs::rename(&tmp, path).await.map_err(wrap)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn details(title: &str) -> Details {
        Details {
            path: format!("/rec/{title}/{title}.ts"),
            channel: "BBC1".to_string(),
            title: title.to_string(),
            status: "OK".to_string(),
            description: "desc".to_string(),
        }
    }

    #[tokio::test]
    async fn test_open_creates_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("state.json");

        let (store, mut queue) = JobStore::open(&path).await.unwrap();
        assert!(path.exists());
        assert!(store.pending().await.is_empty());
        assert!(queue.try_next().is_none());
        assert_eq!(queue.capacity(), DEFAULT_QUEUE_CAPACITY);

        let json: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(json, serde_json::json!({"pending": {}}));
    }

    #[tokio::test]
    async fn test_enqueue_persists_and_publishes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let (store, mut queue) = JobStore::open(&path).await.unwrap();

        let id = store.enqueue(details("Show")).await.unwrap();

        let job = queue.try_next().unwrap();
        assert_eq!(job.id, id);
        assert_eq!(job.details.title, "Show");

        let json: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(json["pending"][id.as_str()]["channel"], "BBC1");
    }

    #[tokio::test]
    async fn test_enqueue_rejects_invalid_details() {
        let dir = tempfile::tempdir().unwrap();
        let (store, mut queue) = JobStore::open(dir.path().join("state.json")).await.unwrap();

        let mut bad = details("Show");
        bad.path = String::new();
        assert!(matches!(store.enqueue(bad).await, Err(Error::Validation(_))));
        assert!(queue.try_next().is_none());
        assert!(store.pending().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_write_does_not_publish() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let (store, mut queue) = JobStore::open(&path).await.unwrap();

        // A directory where the temp file should go makes every write fail
        std::fs::create_dir(dir.path().join("state.json.tmp")).unwrap();

        let err = store.enqueue(details("Show")).await.unwrap_err();
        assert!(matches!(err, Error::Persistence { .. }));
        assert!(queue.try_next().is_none());
        assert!(store.pending().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_complete_keeps_job_pending() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let (store, _queue) = JobStore::open(&path).await.unwrap();
        let id = store.enqueue(details("Show")).await.unwrap();

        std::fs::create_dir(dir.path().join("state.json.tmp")).unwrap();

        let err = store.complete(&id).await.unwrap_err();
        assert!(matches!(err, Error::Persistence { .. }));
        assert_eq!(store.pending().await, vec![id.clone()]);
        assert_eq!(JobStore::recover(&path).await.unwrap()[0].id, id);
    }

    #[tokio::test]
    async fn test_complete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let (store, _queue) = JobStore::open(&path).await.unwrap();

        let a = store.enqueue(details("A")).await.unwrap();
        let b = store.enqueue(details("B")).await.unwrap();

        store.complete(&a).await.unwrap();
        assert_eq!(store.pending().await, vec![b.clone()]);

        store.complete(&a).await.unwrap();
        assert_eq!(store.pending().await, vec![b.clone()]);

        store.complete(&JobId::from("never-existed")).await.unwrap();
        assert_eq!(store.pending().await, vec![b]);
    }

    #[tokio::test]
    async fn test_recovery_replays_pending_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut ids = Vec::new();
        {
            let (store, _queue) = JobStore::open(&path).await.unwrap();
            for title in ["A", "B", "C", "D"] {
                ids.push(store.enqueue(details(title)).await.unwrap());
            }
            store.complete(&ids[1]).await.unwrap();
        }
        let expected = vec![ids[0].clone(), ids[2].clone(), ids[3].clone()];

        let recovered: Vec<_> = JobStore::recover(&path).await.unwrap().into_iter().map(|j| j.id).collect();
        assert_eq!(recovered, expected);

        // Replaying twice yields the same set in the same order
        let (store, mut queue) = JobStore::open(&path).await.unwrap();
        let mut replayed = Vec::new();
        while let Some(job) = queue.try_next() {
            replayed.push(job.id);
        }
        assert_eq!(replayed, expected);
        assert_eq!(store.pending().await, expected);
    }

    #[tokio::test]
    async fn test_open_rejects_oversized_backlog() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut index = PendingIndex::default();
        for _ in 0..=MAX_PENDING_JOBS {
            index.pending.insert(JobId::generate(), details("X"));
        }
        std::fs::write(&path, serde_json::to_vec(&index).unwrap()).unwrap();

        let err = JobStore::open(&path).await.unwrap_err();
        assert!(matches!(err, Error::TooManyPending { count, .. } if count == MAX_PENDING_JOBS + 1));
    }

    #[tokio::test]
    async fn test_open_resizes_queue_for_large_backlog() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut index = PendingIndex::default();
        for _ in 0..100 {
            index.pending.insert(JobId::generate(), details("X"));
        }
        std::fs::write(&path, serde_json::to_vec(&index).unwrap()).unwrap();

        let (_store, queue) = JobStore::open(&path).await.unwrap();
        assert_eq!(queue.capacity(), 200);
    }

    proptest! {
        #[test]
        fn test_queue_capacity_policy(pending in 0usize..6000) {
            let result = queue_capacity(pending);
            if pending > MAX_PENDING_JOBS {
                prop_assert!(
                    matches!(result, Err(Error::TooManyPending { .. })),
                    "{} pending jobs should be refused",
                    pending
                );
            } else {
                prop_assert_eq!(result.unwrap(), DEFAULT_QUEUE_CAPACITY.max(2 * pending));
            }
        }
    }
}
