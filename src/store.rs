//! The result store: shared mapping from job id to job state.
//!
//! This is the single point of coordination between the background worker
//! (which writes completions) and status-polling callers (which read, and
//! occasionally patch corrections in). All access goes through a mutex and
//! short closure-scoped critical sections — the lock is never held across
//! an await point.
//!
//! ## Lifecycle
//!
//! An implicitly-shared dictionary that only ever grows would leak for the
//! life of the process, so the store is bounded two ways:
//!
//! * **Retention** — terminal (completed/error) jobs are pruned once older
//!   than the configured retention window.
//! * **Capacity** — when the map is full, the oldest terminal jobs are
//!   evicted first. In-flight jobs are never dropped: a submission that is
//!   still `processing` must stay observable until the worker finishes it.

use crate::job::{JobRecord, StatusReport};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub struct ResultStore {
    inner: Mutex<HashMap<String, JobRecord>>,
    capacity: usize,
    retention: Duration,
}

impl ResultStore {
    pub fn new(capacity: usize, retention: Duration) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            capacity,
            retention,
        }
    }

    /// Insert a fresh `processing` record under `job_id`.
    ///
    /// Job-id uniqueness is the caller's responsibility; a reused id
    /// replaces the previous record (last write wins) with a warning.
    pub fn insert(&self, job_id: impl Into<String>, record: JobRecord) {
        let job_id = job_id.into();
        let mut jobs = self.inner.lock().expect("result store poisoned");
        Self::prune_locked(&mut jobs, self.retention);
        if jobs.len() >= self.capacity {
            Self::evict_oldest_terminal(&mut jobs, self.capacity);
        }
        if jobs.insert(job_id.clone(), record).is_some() {
            warn!("Job id '{job_id}' reused; previous record replaced");
        }
    }

    /// Poll a job's state. A missing id synthesises `not_found` — it is
    /// never stored.
    pub fn status(&self, job_id: &str) -> StatusReport {
        let jobs = self.inner.lock().expect("result store poisoned");
        match jobs.get(job_id) {
            Some(record) => record.report(),
            None => StatusReport::NotFound,
        }
    }

    /// Run `f` against the record under the store lock.
    ///
    /// Returns `None` if the id is unknown. Keep `f` short: it runs inside
    /// the critical section shared with the worker.
    pub fn with_job<T>(&self, job_id: &str, f: impl FnOnce(&mut JobRecord) -> T) -> Option<T> {
        let mut jobs = self.inner.lock().expect("result store poisoned");
        jobs.get_mut(job_id).map(f)
    }

    /// Drop terminal jobs older than the retention window.
    ///
    /// Called on every insert and periodically by the sweeper.
    pub fn prune(&self) {
        let mut jobs = self.inner.lock().expect("result store poisoned");
        Self::prune_locked(&mut jobs, self.retention);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("result store poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn prune_locked(jobs: &mut HashMap<String, JobRecord>, retention: Duration) {
        let now = Instant::now();
        let before = jobs.len();
        jobs.retain(|_, record| match record.terminal_at {
            Some(at) => now.duration_since(at) < retention,
            None => true,
        });
        let dropped = before - jobs.len();
        if dropped > 0 {
            debug!("Pruned {dropped} expired job(s) from result store");
        }
    }

    /// Evict oldest-terminal-first until below `capacity`. In-flight jobs
    /// are left alone even if that keeps the map over capacity.
    fn evict_oldest_terminal(jobs: &mut HashMap<String, JobRecord>, capacity: usize) {
        while jobs.len() >= capacity {
            let oldest = jobs
                .iter()
                .filter_map(|(id, r)| r.terminal_at.map(|at| (at, id.clone())))
                .min_by_key(|(at, _)| *at);
            match oldest {
                Some((_, id)) => {
                    debug!("Result store full; evicting terminal job '{id}'");
                    jobs.remove(&id);
                }
                None => {
                    warn!(
                        "Result store over capacity ({}) with only in-flight jobs",
                        jobs.len()
                    );
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobStatus;
    use crate::pipeline::export::Export;
    use crate::pipeline::parse::FieldMap;
    use std::path::PathBuf;

    fn record(doc: &str) -> JobRecord {
        JobRecord::new(doc, PathBuf::from("uploads/x.png"), false, Some(vec![1, 2]))
    }

    fn empty_export() -> Export {
        Export {
            table: String::new(),
            text: String::new(),
        }
    }

    #[test]
    fn missing_id_synthesises_not_found() {
        let store = ResultStore::new(16, Duration::from_secs(60));
        assert_eq!(store.status("nope"), StatusReport::NotFound);
    }

    #[test]
    fn lifecycle_processing_to_completed() {
        let store = ResultStore::new(16, Duration::from_secs(60));
        store.insert("job-a", record("passport"));
        assert_eq!(store.status("job-a"), StatusReport::Processing);

        store.with_job("job-a", |r| {
            let mut fields = FieldMap::new();
            fields.insert("First Name", "Jane");
            r.complete("First Name: Jane".into(), fields, empty_export());
        });
        match store.status("job-a") {
            StatusReport::Completed { data } => {
                assert_eq!(data.get("First Name"), Some("Jane"));
            }
            other => panic!("expected completed, got {other:?}"),
        }
    }

    #[test]
    fn zero_retention_prunes_terminal_jobs() {
        let store = ResultStore::new(16, Duration::ZERO);
        store.insert("done", record("check"));
        store.with_job("done", |r| r.fail("boom".into()));
        store.prune();
        assert_eq!(store.status("done"), StatusReport::NotFound);
    }

    #[test]
    fn in_flight_jobs_survive_pruning() {
        let store = ResultStore::new(16, Duration::ZERO);
        store.insert("busy", record("check"));
        store.prune();
        assert_eq!(store.status("busy"), StatusReport::Processing);
    }

    #[test]
    fn capacity_evicts_oldest_terminal_first() {
        let store = ResultStore::new(2, Duration::from_secs(600));
        store.insert("old-done", record("check"));
        store.with_job("old-done", |r| r.fail("first failure".into()));
        store.insert("busy", record("check"));

        // Third insert: at capacity, the terminal job goes, the in-flight
        // job stays.
        store.insert("new", record("check"));
        assert_eq!(store.status("old-done"), StatusReport::NotFound);
        assert_eq!(store.status("busy"), StatusReport::Processing);
        assert_eq!(store.status("new"), StatusReport::Processing);
    }

    #[test]
    fn with_job_is_read_modify_write_atomic() {
        let store = ResultStore::new(16, Duration::from_secs(60));
        store.insert("job", record("passport"));
        let status = store
            .with_job("job", |r| {
                r.saved = true;
                r.status
            })
            .unwrap();
        assert_eq!(status, JobStatus::Processing);
        assert_eq!(store.with_job("job", |r| r.saved), Some(true));
    }
}
