//! The document service: submission, polling, review and export facade.
//!
//! One `DocumentService` owns the whole pipeline: the result store, the
//! FIFO task queue, the single background worker and the upload sweeper.
//! Host applications (web handlers, batch drivers) call into this facade;
//! nothing in here knows about HTTP.
//!
//! ## Control flow
//!
//! ```text
//! submit ──▶ queue ──▶ worker ──▶ store ◀── status (poll)
//!                                   │
//!                                   ├── save (patch fields, log record)
//!                                   └── export_csv / export_txt
//! ```
//!
//! Callers never block on submission — `submit` returns as soon as the job
//! record exists and the task is queued. Completion is observed by polling
//! [`DocumentService::status`].

use crate::config::PipelineConfig;
use crate::error::ServiceError;
use crate::job::{
    content_type_for, Download, JobRecord, JobStatus, StatusReport,
};
use crate::model::VisionModel;
use crate::persist::{LogEntry, RecordLog};
use crate::pipeline::export::{
    self, Export, FieldSource, CSV_CONTENT_TYPE, TEXT_CONTENT_TYPE,
};
use crate::pipeline::parse::FieldMap;
use crate::storage;
use crate::store::ResultStore;
use crate::worker::{run_worker, Task, TaskSource};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A document submission: raw bytes, or a file already on disk.
#[derive(Debug)]
pub enum Upload {
    Bytes { filename: String, data: Vec<u8> },
    File { path: PathBuf },
}

/// What `submit` returns: the accepted id and the upload path the job is
/// associated with (which may never be written, for memory-only uploads).
#[derive(Debug, Clone)]
pub struct Submission {
    pub job_id: String,
    pub path: PathBuf,
}

/// The extraction pipeline's public facade.
///
/// Construct once at startup, inside a Tokio runtime, with an
/// already-loaded model — model-load failures belong at process start,
/// not first use.
pub struct DocumentService {
    config: PipelineConfig,
    store: Arc<ResultStore>,
    queue: mpsc::UnboundedSender<Task>,
    log: Arc<dyn RecordLog>,
    worker: JoinHandle<()>,
    sweeper: JoinHandle<()>,
}

impl DocumentService {
    /// Start the service: prepare the uploads directory, spawn the worker
    /// and the cleanup sweeper.
    pub fn new(
        config: PipelineConfig,
        model: Arc<dyn VisionModel>,
        log: Arc<dyn RecordLog>,
    ) -> Result<Self, ServiceError> {
        std::fs::create_dir_all(&config.upload_dir).map_err(|e| {
            ServiceError::UploadDirFailed {
                path: config.upload_dir.clone(),
                source: e,
            }
        })?;

        let store = Arc::new(ResultStore::new(
            config.store_capacity,
            config.store_retention,
        ));
        let (queue, task_rx) = mpsc::unbounded_channel();

        let worker = tokio::spawn(run_worker(
            task_rx,
            model,
            Arc::clone(&store),
            config.clone(),
        ));
        let sweeper = tokio::spawn(run_sweeper(
            config.upload_dir.clone(),
            config.max_upload_age,
            config.sweep_interval,
            Arc::clone(&store),
        ));

        info!(
            "Document service started (uploads: {})",
            config.upload_dir.display()
        );
        Ok(Self {
            config,
            store,
            queue,
            log,
            worker,
            sweeper,
        })
    }

    /// Submit a document for processing. Non-blocking: returns once the
    /// job record exists and the task is queued.
    ///
    /// `job_id` is caller-chosen and must be unique per submission (see
    /// [`crate::job::stamped_job_id`] for the conventional scheme); a
    /// reused id replaces the earlier job. The `document_type` tag is
    /// accepted verbatim — unrecognised tags are processed with fallback
    /// behaviour rather than rejected.
    pub fn submit(
        &self,
        job_id: impl Into<String>,
        document_type: &str,
        upload: Upload,
    ) -> Result<Submission, ServiceError> {
        let job_id = job_id.into();
        match upload {
            Upload::Bytes { filename, data } => {
                self.submit_bytes(job_id, document_type, filename, data)
            }
            Upload::File { path } => self.submit_file(job_id, document_type, path),
        }
    }

    fn submit_bytes(
        &self,
        job_id: String,
        document_type: &str,
        filename: String,
        data: Vec<u8>,
    ) -> Result<Submission, ServiceError> {
        if !storage::is_allowed(&filename) {
            return Err(ServiceError::UnsupportedFile { name: filename });
        }
        if data.len() as u64 > self.config.max_upload_bytes {
            return Err(ServiceError::UploadTooLarge {
                name: filename,
                size: data.len() as u64,
                limit: self.config.max_upload_bytes,
            });
        }

        let safe = storage::sanitize_filename(&filename);
        let unique = format!("{}_{safe}", Utc::now().format("%Y%m%d%H%M%S"));
        let path = self.config.upload_dir.join(&unique);

        // Small uploads skip the disk round-trip entirely when they will be
        // cleaned up afterwards anyway; the worker materialises a temp file
        // on demand.
        let memory_only = (data.len() as u64) < self.config.memory_threshold_bytes
            && self.config.cleanup_after_processing;

        let (on_disk, source) = if memory_only {
            (false, TaskSource::Memory(data.clone()))
        } else {
            storage::save_upload(&self.config.upload_dir, &unique, &data).map_err(|e| {
                ServiceError::UploadWriteFailed {
                    path: path.clone(),
                    source: e,
                }
            })?;
            (true, TaskSource::Disk(path.clone()))
        };

        self.store.insert(
            job_id.clone(),
            JobRecord::new(document_type, path.clone(), on_disk, Some(data)),
        );
        self.enqueue(Task {
            job_id: job_id.clone(),
            document_type: document_type.to_string(),
            source,
        })?;
        debug!("Queued job '{job_id}' ({document_type})");
        Ok(Submission { job_id, path })
    }

    fn submit_file(
        &self,
        job_id: String,
        document_type: &str,
        path: PathBuf,
    ) -> Result<Submission, ServiceError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !storage::is_allowed(&name) {
            return Err(ServiceError::UnsupportedFile { name });
        }

        // Capture the bytes up front so the job always has an in-memory
        // copy to fall back on (and to survive upload cleanup).
        let data = std::fs::read(&path).map_err(|e| ServiceError::UploadReadFailed {
            path: path.clone(),
            source: e,
        })?;
        if data.len() as u64 > self.config.max_upload_bytes {
            return Err(ServiceError::UploadTooLarge {
                name,
                size: data.len() as u64,
                limit: self.config.max_upload_bytes,
            });
        }

        self.store.insert(
            job_id.clone(),
            JobRecord::new(document_type, path.clone(), true, Some(data)),
        );
        self.enqueue(Task {
            job_id: job_id.clone(),
            document_type: document_type.to_string(),
            source: TaskSource::Disk(path.clone()),
        })?;
        debug!("Queued job '{job_id}' ({document_type}) from {}", path.display());
        Ok(Submission { job_id, path })
    }

    fn enqueue(&self, task: Task) -> Result<(), ServiceError> {
        self.queue.send(task).map_err(|_| ServiceError::QueueClosed)
    }

    /// Poll a job's state: `{processing | completed+fields | error+detail |
    /// not_found}`.
    pub fn status(&self, job_id: &str) -> StatusReport {
        self.store.status(job_id)
    }

    /// Whether the reviewer has confirmed and logged this job.
    pub fn saved(&self, job_id: &str) -> Option<bool> {
        self.store.with_job(job_id, |record| record.saved)
    }

    /// The document's image bytes and content type, from memory or disk.
    pub fn image(&self, job_id: &str) -> Option<(Vec<u8>, &'static str)> {
        let (bytes, path) = self
            .store
            .with_job(job_id, |record| (record.image_data.clone(), record.path.clone()))?;
        let mime = content_type_for(&path).1;
        match bytes {
            Some(bytes) => Some((bytes, mime)),
            None => std::fs::read(&path).ok().map(|b| (b, mime)),
        }
    }

    /// Apply reviewer corrections, mark the job saved, and append the
    /// confirmed record to the log.
    ///
    /// Corrections overwrite individual labels (last write wins) and
    /// invalidate the memoised exports so subsequent downloads reflect the
    /// edits. The job's terminal status is untouched. When cleanup is
    /// enabled, the upload file is deleted here — after its bytes are
    /// captured in memory.
    pub async fn save(
        &self,
        user: &str,
        job_id: &str,
        corrections: &FieldMap,
        annotations: Option<serde_json::Value>,
    ) -> Result<(), ServiceError> {
        let patched = self.store.with_job(job_id, |record| {
            match record.fields.as_mut() {
                Some(fields) => fields.apply(corrections),
                None => {
                    let mut fields = FieldMap::new();
                    fields.apply(corrections);
                    record.fields = Some(fields);
                }
            }
            record.export = None; // downloads must reflect the corrections
            record.saved = true;
            (
                record.document_type.clone(),
                record.fields.clone().unwrap_or_default(),
            )
        });
        let Some((document_type, fields)) = patched else {
            return Err(ServiceError::JobNotFound {
                job_id: job_id.to_string(),
            });
        };

        if self.config.cleanup_after_processing {
            self.capture_and_delete_upload(job_id);
        }

        self.log
            .append(LogEntry {
                user: user.to_string(),
                document_type,
                fields,
                corrections: annotations,
                recorded_at: Utc::now(),
            })
            .await
            .map_err(|e| ServiceError::LogFailed {
                detail: e.to_string(),
            })
    }

    /// Migrate the image disk → memory, then delete the upload file.
    /// Skipped (with a warning) if the bytes cannot be read back — the
    /// file must never be the casualty of its own cleanup.
    fn capture_and_delete_upload(&self, job_id: &str) {
        let pending = self
            .store
            .with_job(job_id, |record| {
                if record.on_disk {
                    Some((record.path.clone(), record.image_data.is_some()))
                } else {
                    None
                }
            })
            .flatten();
        let Some((path, has_bytes)) = pending else { return };

        if !has_bytes {
            match std::fs::read(&path) {
                Ok(bytes) => {
                    self.store
                        .with_job(job_id, |record| record.image_data = Some(bytes));
                }
                Err(e) => {
                    warn!(
                        "Could not capture image before cleanup for '{job_id}': {e}; keeping {}",
                        path.display()
                    );
                    return;
                }
            }
        }
        self.store.with_job(job_id, |record| record.on_disk = false);
        storage::delete_file(&path);
    }

    /// The delimited-table export, converted to CSV, as a downloadable
    /// file. Requires a completed job.
    pub fn export_csv(&self, job_id: &str) -> Result<Download, ServiceError> {
        let (rendered, document_type, filename) = self.rendered(job_id)?;
        Ok(Download {
            filename: export::download_name(&document_type, &filename, Utc::now(), "csv"),
            content_type: CSV_CONTENT_TYPE,
            body: export::tsv_to_csv(&rendered.table).into_bytes(),
        })
    }

    /// The flat-text export as a downloadable file. Requires a completed
    /// job.
    pub fn export_txt(&self, job_id: &str) -> Result<Download, ServiceError> {
        let (rendered, document_type, filename) = self.rendered(job_id)?;
        Ok(Download {
            filename: export::download_name(&document_type, &filename, Utc::now(), "txt"),
            content_type: TEXT_CONTENT_TYPE,
            body: rendered.text.into_bytes(),
        })
    }

    /// Fetch the memoised export, re-rendering (and re-memoising) if a
    /// correction invalidated it.
    fn rendered(&self, job_id: &str) -> Result<(Export, String, String), ServiceError> {
        let result = self.store.with_job(job_id, |record| {
            if record.status != JobStatus::Completed {
                return None;
            }
            let filename = record.filename();
            let rendered = match record.export.clone() {
                Some(rendered) => rendered,
                None => {
                    let fresh = if let Some(fields) = &record.fields {
                        export::render(
                            FieldSource::Parsed(fields),
                            &record.document_type,
                            &filename,
                        )
                    } else if let Some(raw) = &record.raw_text {
                        export::render(FieldSource::Raw(raw), &record.document_type, &filename)
                    } else {
                        let empty = FieldMap::new();
                        export::render(
                            FieldSource::Parsed(&empty),
                            &record.document_type,
                            &filename,
                        )
                    };
                    record.export = Some(fresh.clone());
                    fresh
                }
            };
            Some((rendered, record.document_type.clone(), filename))
        });

        match result {
            Some(Some(found)) => Ok(found),
            Some(None) => Err(ServiceError::JobNotCompleted {
                job_id: job_id.to_string(),
            }),
            None => Err(ServiceError::JobNotFound {
                job_id: job_id.to_string(),
            }),
        }
    }

    /// Stop accepting tasks, finish the queue, and stop the sweeper.
    pub async fn shutdown(self) {
        drop(self.queue);
        self.sweeper.abort();
        if let Err(e) = self.worker.await {
            if !e.is_cancelled() {
                warn!("Worker task ended abnormally: {e}");
            }
        }
        info!("Document service shut down");
    }
}

/// Periodic maintenance: delete stale upload files and prune expired jobs.
async fn run_sweeper(
    dir: PathBuf,
    max_age: Duration,
    interval: Duration,
    store: Arc<ResultStore>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it so a fresh service doesn't
    // sweep before anything exists.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let removed = storage::sweep_stale(&dir, max_age);
        store.prune();
        debug!("Sweep pass done ({removed} file(s) removed)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GenerationOptions, ModelError};
    use crate::persist::MemoryLog;
    use crate::pipeline::preprocess::PixelTensor;
    use async_trait::async_trait;

    struct IdleModel;

    #[async_trait]
    impl VisionModel for IdleModel {
        async fn generate(
            &self,
            _pixels: &PixelTensor,
            _prompt: &str,
            _options: &GenerationOptions,
        ) -> Result<String, ModelError> {
            Ok(String::new())
        }
    }

    fn service(dir: &std::path::Path) -> DocumentService {
        let config = PipelineConfig::builder()
            .upload_dir(dir.join("uploads"))
            .build()
            .unwrap();
        DocumentService::new(config, Arc::new(IdleModel), Arc::new(MemoryLog::new())).unwrap()
    }

    #[tokio::test]
    async fn rejects_disallowed_extension() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        let err = svc
            .submit(
                "id-1",
                "passport",
                Upload::Bytes {
                    filename: "archive.zip".into(),
                    data: vec![1, 2, 3],
                },
            )
            .unwrap_err();
        assert!(matches!(err, ServiceError::UnsupportedFile { .. }));
        svc.shutdown().await;
    }

    #[tokio::test]
    async fn rejects_oversized_upload() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::builder()
            .upload_dir(dir.path().join("uploads"))
            .memory_threshold_bytes(8)
            .max_upload_bytes(16)
            .build()
            .unwrap();
        let svc =
            DocumentService::new(config, Arc::new(IdleModel), Arc::new(MemoryLog::new())).unwrap();
        let err = svc
            .submit(
                "id-1",
                "passport",
                Upload::Bytes {
                    filename: "scan.png".into(),
                    data: vec![0u8; 64],
                },
            )
            .unwrap_err();
        assert!(matches!(err, ServiceError::UploadTooLarge { .. }));
        svc.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_job_polls_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        assert_eq!(svc.status("nope"), StatusReport::NotFound);
        assert!(svc.saved("nope").is_none());
        svc.shutdown().await;
    }

    #[tokio::test]
    async fn export_before_completion_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        let err = svc.export_csv("missing").unwrap_err();
        assert!(matches!(err, ServiceError::JobNotFound { .. }));
        svc.shutdown().await;
    }
}
