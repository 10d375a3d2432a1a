//! Job data model: one submitted document's processing record.
//!
//! A job is created at upload time (status `processing`, image bytes
//! captured), mutated once by the worker (terminal `completed`/`error`,
//! results populated) and optionally again by a human reviewer (fields
//! patched, `saved` set). Status transitions are forward-only:
//! `processing → {completed, error}`; correction and save never change a
//! terminal status, and no job is ever re-enqueued.

use crate::pipeline::export::Export;
use crate::pipeline::parse::FieldMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::warn;

/// Stored pipeline state of a job.
///
/// `not_found` is not a stored state — it is synthesised on lookup miss by
/// [`crate::store::ResultStore::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    /// Completed and error are terminal for the pipeline.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Processing)
    }
}

/// Poll response for a job id, shaped for direct JSON serialisation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StatusReport {
    Processing,
    Completed { data: FieldMap },
    Error { error: String },
    NotFound,
}

/// A downloadable export: body plus the metadata a file response needs.
#[derive(Debug, Clone)]
pub struct Download {
    pub filename: String,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

/// Build the conventional job id: upload-timestamp + filename composite.
///
/// Uniqueness is the caller's responsibility — two uploads of the same
/// filename within one second collide, and the store treats a reused id as
/// a fresh submission (last write wins).
pub fn stamped_job_id(filename: &str, at: DateTime<Utc>) -> String {
    format!("{}_{filename}", at.format("%Y%m%d%H%M%S"))
}

/// One submitted document's record in the result store.
///
/// # Image source
///
/// Exactly one source is authoritative at any time: the file at `path`
/// when `on_disk` is true, the `image_data` bytes otherwise. Ownership
/// migrates during the lifecycle — the worker materialises a temp file
/// from memory for the path-oriented loader, and `save` captures bytes
/// into memory before the upload file is deleted. The invariant
/// `on_disk || image_data.is_some()` means the document is never lost.
#[derive(Debug, Clone)]
pub struct JobRecord {
    /// Caller-supplied document type tag, kept verbatim (it may be outside
    /// the closed set; consumers fall back per their own rules).
    pub document_type: String,

    /// Upload path. The export filename and content type derive from it
    /// even after the file itself is gone.
    pub path: PathBuf,

    /// Whether the file at `path` is expected to exist.
    pub on_disk: bool,

    /// In-memory copy of the upload bytes.
    pub image_data: Option<Vec<u8>>,

    pub status: JobStatus,

    /// The model's unparsed reply (present once completed).
    pub raw_text: Option<String>,

    /// Parsed, canonicalised fields; reviewer corrections overwrite
    /// individual labels post-hoc.
    pub fields: Option<FieldMap>,

    /// Memoised export renderings; cleared when corrections are applied so
    /// downloads never go stale.
    pub export: Option<Export>,

    /// Human-readable failure detail (present only when status is error).
    pub error: Option<String>,

    /// Set once a reviewer confirmed the record and it was durably logged.
    pub saved: bool,

    pub created_at: Instant,

    /// When the job reached a terminal status; drives store retention.
    pub terminal_at: Option<Instant>,
}

impl JobRecord {
    pub fn new(
        document_type: impl Into<String>,
        path: PathBuf,
        on_disk: bool,
        image_data: Option<Vec<u8>>,
    ) -> Self {
        Self {
            document_type: document_type.into(),
            path,
            on_disk,
            image_data,
            status: JobStatus::Processing,
            raw_text: None,
            fields: None,
            export: None,
            error: None,
            saved: false,
            created_at: Instant::now(),
            terminal_at: None,
        }
    }

    /// The upload's bare filename, for exports and log rows.
    pub fn filename(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.to_string_lossy().into_owned())
    }

    /// Transition to `completed`, populating results. Ignored (with a
    /// warning) if the job is already terminal — transitions are
    /// forward-only.
    pub fn complete(&mut self, raw_text: String, fields: FieldMap, export: Export) {
        if self.status.is_terminal() {
            warn!("Ignoring completion for already-terminal job at {:?}", self.path);
            return;
        }
        self.status = JobStatus::Completed;
        self.raw_text = Some(raw_text);
        self.fields = Some(fields);
        self.export = Some(export);
        self.terminal_at = Some(Instant::now());
    }

    /// Transition to `error` with a human-readable detail string.
    pub fn fail(&mut self, detail: String) {
        if self.status.is_terminal() {
            warn!("Ignoring failure for already-terminal job at {:?}", self.path);
            return;
        }
        self.status = JobStatus::Error;
        self.error = Some(detail);
        self.terminal_at = Some(Instant::now());
    }

    /// Snapshot the record as a poll response.
    pub fn report(&self) -> StatusReport {
        match self.status {
            JobStatus::Processing => StatusReport::Processing,
            JobStatus::Completed => StatusReport::Completed {
                data: self.fields.clone().unwrap_or_default(),
            },
            JobStatus::Error => StatusReport::Error {
                error: self
                    .error
                    .clone()
                    .unwrap_or_else(|| "An unknown error occurred".to_string()),
            },
        }
    }
}

/// Return the canonical extension and content type for an upload path.
///
/// Unknown extensions default to PNG, matching the upload allow-list's
/// most common case.
pub fn content_type_for(path: &Path) -> (&'static str, &'static str) {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => (".jpg", "image/jpeg"),
        Some("png") => (".png", "image/png"),
        Some("pdf") => (".pdf", "application/pdf"),
        _ => (".png", "image/png"),
    }
}
