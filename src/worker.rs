//! The background worker: a single consumer draining the FIFO task queue.
//!
//! Exactly one worker exists per service, so model invocations are
//! serialised and jobs complete in submission order — an observable
//! guarantee reviewers rely on when uploading batches. There is no
//! cancellation, no retry and no timeout: a failed job stays failed
//! (resubmission needs a new job id), and a hung model call blocks every
//! queued job behind it.
//!
//! Per-task errors are caught at the loop boundary and recorded as a
//! terminal `error` state; nothing a single document can do kills the
//! worker.

use crate::config::PipelineConfig;
use crate::document::{canonicalize, DocumentType};
use crate::error::TaskError;
use crate::job::content_type_for;
use crate::model::{GenerationOptions, VisionModel};
use crate::pipeline::export::{self, FieldSource};
use crate::pipeline::{extract, parse, preprocess};
use crate::storage;
use crate::store::ResultStore;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// One queued unit of work. The job record already exists in the store
/// (status `processing`) when the task is enqueued.
pub(crate) struct Task {
    pub job_id: String,
    pub document_type: String,
    pub source: TaskSource,
}

/// Where the worker finds the image bytes.
pub(crate) enum TaskSource {
    /// Read from the uploaded file.
    Disk(PathBuf),
    /// Materialise a temp file from these bytes.
    Memory(Vec<u8>),
}

/// Drain the queue until every sender is dropped.
pub(crate) async fn run_worker(
    mut queue: mpsc::UnboundedReceiver<Task>,
    model: Arc<dyn VisionModel>,
    store: Arc<ResultStore>,
    config: PipelineConfig,
) {
    info!("Extraction worker started");
    while let Some(task) = queue.recv().await {
        let job_id = task.job_id.clone();
        match process_task(task, model.as_ref(), &store, &config).await {
            Ok(()) => debug!("Job '{job_id}' completed"),
            Err(e) => {
                warn!("Job '{job_id}' failed: {e}");
                store.with_job(&job_id, |record| record.fail(e.to_string()));
            }
        }
    }
    info!("Extraction worker stopped (queue closed)");
}

/// Process one task end to end.
///
/// Any `Err` becomes the job's terminal error state in [`run_worker`]. The
/// temp file (when one is materialised) is owned by this frame, so RAII
/// removes it on every exit path — success, error or panic.
async fn process_task(
    task: Task,
    model: &dyn VisionModel,
    store: &Arc<ResultStore>,
    config: &PipelineConfig,
) -> Result<(), TaskError> {
    let Task {
        job_id,
        document_type,
        source,
    } = task;

    // ── Resolve the source to a readable path ────────────────────────────
    let mut _temp: Option<NamedTempFile> = None;
    let image_path: PathBuf = match source {
        TaskSource::Memory(bytes) => {
            let file = materialize(&bytes, &temp_suffix(store, &job_id))?;
            let path = file.path().to_path_buf();
            _temp = Some(file);
            path
        }
        TaskSource::Disk(path) => {
            if path.exists() {
                path
            } else {
                // The upload file vanished (swept, or deleted externally);
                // fall back to the bytes captured at submission time.
                let bytes = store
                    .with_job(&job_id, |record| record.image_data.clone())
                    .flatten();
                match bytes {
                    Some(bytes) => {
                        debug!(
                            "Upload file {} missing; restoring from captured bytes",
                            path.display()
                        );
                        let file = materialize(&bytes, &temp_suffix(store, &job_id))?;
                        let restored = file.path().to_path_buf();
                        _temp = Some(file);
                        restored
                    }
                    None => {
                        return Err(TaskError::SourceMissing {
                            path: path.display().to_string(),
                        })
                    }
                }
            }
        }
    };

    // ── Normalise (CPU-bound, off the async threads) ─────────────────────
    let input_size = config.input_size;
    let min_size = config.min_size;
    let decode_path = image_path.clone();
    let pixels = tokio::task::spawn_blocking(move || {
        preprocess::normalize_image(&decode_path, input_size, min_size)
    })
    .await
    .map_err(|e| TaskError::Preprocess {
        detail: format!("preprocess task panicked: {e}"),
    })??;

    // ── Extract ──────────────────────────────────────────────────────────
    let options = GenerationOptions {
        max_new_tokens: config.max_new_tokens,
        pad_with_eos: true,
    };
    let raw_text = extract::extract_fields(model, &pixels, &document_type, &options)
        .await
        .map_err(|e| TaskError::Inference {
            detail: e.to_string(),
        })?;

    // ── Parse, canonicalise, render ──────────────────────────────────────
    let mut fields = parse::parse_fields(&raw_text);
    canonicalize(&mut fields, DocumentType::from_tag(&document_type));

    let filename = store
        .with_job(&job_id, |record| record.filename())
        .unwrap_or_else(|| "document".to_string());
    let rendered = export::render(FieldSource::Parsed(&fields), &document_type, &filename);

    store.with_job(&job_id, |record| record.complete(raw_text, fields, rendered));

    // ── Post-completion cleanup of the original upload ───────────────────
    // Only when the bytes were captured in memory first: never delete the
    // only copy of a document.
    if config.cleanup_after_processing {
        let upload = store
            .with_job(&job_id, |record| {
                if record.on_disk && record.image_data.is_some() {
                    record.on_disk = false;
                    Some(record.path.clone())
                } else {
                    None
                }
            })
            .flatten();
        if let Some(path) = upload {
            storage::delete_file(&path);
        }
    }

    Ok(())
}

/// Temp-file suffix matching the upload's extension, so format sniffing by
/// extension keeps working on the materialised copy.
fn temp_suffix(store: &Arc<ResultStore>, job_id: &str) -> String {
    store
        .with_job(job_id, |record| content_type_for(&record.path).0.to_string())
        .unwrap_or_else(|| ".png".to_string())
}

/// Write bytes to a fresh temp file.
fn materialize(bytes: &[u8], suffix: &str) -> Result<NamedTempFile, TaskError> {
    let mut file = tempfile::Builder::new()
        .prefix("docufield-")
        .suffix(suffix)
        .tempfile()
        .map_err(|e| TaskError::TempFile {
            detail: e.to_string(),
        })?;
    file.write_all(bytes).map_err(|e| TaskError::TempFile {
        detail: e.to_string(),
    })?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobRecord, JobStatus};
    use crate::model::ModelError;
    use crate::pipeline::preprocess::PixelTensor;
    use async_trait::async_trait;
    use image::{Rgb, RgbImage};
    use std::time::Duration;

    struct CannedModel(&'static str);

    #[async_trait]
    impl VisionModel for CannedModel {
        async fn generate(
            &self,
            _pixels: &PixelTensor,
            _prompt: &str,
            _options: &GenerationOptions,
        ) -> Result<String, ModelError> {
            Ok(self.0.to_string())
        }
    }

    fn png_bytes() -> Vec<u8> {
        let img = RgbImage::from_pixel(64, 64, Rgb([200, 200, 200]));
        let mut buf = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    fn test_store() -> Arc<ResultStore> {
        Arc::new(ResultStore::new(64, Duration::from_secs(600)))
    }

    #[tokio::test]
    async fn memory_task_completes_and_parses() {
        let store = test_store();
        let bytes = png_bytes();
        store.insert(
            "job-1",
            JobRecord::new(
                "check",
                PathBuf::from("uploads/chk.png"),
                false,
                Some(bytes.clone()),
            ),
        );

        let task = Task {
            job_id: "job-1".into(),
            document_type: "check".into(),
            source: TaskSource::Memory(bytes),
        };
        let model = CannedModel("Bank Name: ABC Bank\nPayor Name: Jane Doe");
        process_task(task, &model, &store, &PipelineConfig::default())
            .await
            .unwrap();

        let (status, fields) = store
            .with_job("job-1", |r| (r.status, r.fields.clone().unwrap()))
            .unwrap();
        assert_eq!(status, JobStatus::Completed);
        assert_eq!(fields.get("Bank Name"), Some("ABC Bank"));
        // Alias folded by canonicalisation.
        assert_eq!(fields.get("1st Payor First Name"), Some("Jane Doe"));
        assert_eq!(fields.get("Payor Name"), None);
    }

    #[tokio::test]
    async fn missing_disk_source_without_bytes_is_source_missing() {
        let store = test_store();
        store.insert(
            "job-2",
            JobRecord::new("passport", PathBuf::from("uploads/gone.png"), true, None),
        );

        let task = Task {
            job_id: "job-2".into(),
            document_type: "passport".into(),
            source: TaskSource::Disk(PathBuf::from("uploads/gone.png")),
        };
        let model = CannedModel("irrelevant");
        let err = process_task(task, &model, &store, &PipelineConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::SourceMissing { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn missing_disk_source_falls_back_to_captured_bytes() {
        let store = test_store();
        let bytes = png_bytes();
        store.insert(
            "job-3",
            JobRecord::new(
                "passport",
                PathBuf::from("uploads/swept.png"),
                true,
                Some(bytes),
            ),
        );

        let task = Task {
            job_id: "job-3".into(),
            document_type: "passport".into(),
            source: TaskSource::Disk(PathBuf::from("uploads/swept.png")),
        };
        let model = CannedModel("First Name: Jane");
        process_task(task, &model, &store, &PipelineConfig::default())
            .await
            .unwrap();
        assert_eq!(
            store.with_job("job-3", |r| r.status).unwrap(),
            JobStatus::Completed
        );
    }

    #[tokio::test]
    async fn disk_upload_is_deleted_after_completion_when_bytes_captured() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = png_bytes();
        let upload = dir.path().join("scan.png");
        std::fs::write(&upload, &bytes).unwrap();

        let store = test_store();
        store.insert(
            "job-4",
            JobRecord::new("passport", upload.clone(), true, Some(bytes)),
        );

        let task = Task {
            job_id: "job-4".into(),
            document_type: "passport".into(),
            source: TaskSource::Disk(upload.clone()),
        };
        let model = CannedModel("First Name: Jane");
        process_task(task, &model, &store, &PipelineConfig::default())
            .await
            .unwrap();

        assert!(!upload.exists(), "upload should be cleaned up");
        let (on_disk, has_bytes) = store
            .with_job("job-4", |r| (r.on_disk, r.image_data.is_some()))
            .unwrap();
        assert!(!on_disk);
        assert!(has_bytes, "bytes must survive as the authoritative copy");
    }
}
