//! Error types for the docufield library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ServiceError`] — **Fatal**: the call cannot proceed at all (invalid
//!   configuration, unsupported upload, queue shut down, record log
//!   rejected the row). Returned as `Err(ServiceError)` from
//!   [`crate::service::DocumentService`] entry points.
//!
//! * [`TaskError`] — **Non-fatal**: one submitted document failed inside
//!   the background worker (undecodable image, missing source file, model
//!   refusal). Converted into a terminal `error` job state and stored on
//!   the job record; it never crashes the worker loop and other jobs are
//!   unaffected.
//!
//! The separation lets callers decide their own tolerance: surface a failed
//! job to the reviewer, or ignore it and keep uploading.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the docufield library.
///
/// Per-job failures use [`TaskError`] and are stored on the job record
/// rather than propagated here.
#[derive(Debug, Error)]
pub enum ServiceError {
    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Could not create or access the uploads directory.
    #[error("Failed to prepare uploads directory '{path}': {source}")]
    UploadDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Submission errors ─────────────────────────────────────────────────
    /// The upload's file extension is not in the allow-list.
    #[error("Unsupported file type: '{name}' (allowed: png, jpg, jpeg, pdf)")]
    UnsupportedFile { name: String },

    /// The upload exceeds the configured size cap.
    #[error("Upload '{name}' is {size} bytes, over the {limit}-byte limit")]
    UploadTooLarge { name: String, size: u64, limit: u64 },

    /// Could not read or persist the uploaded file.
    #[error("Failed to store upload '{path}': {source}")]
    UploadWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not read a path-based submission.
    #[error("Failed to read upload '{path}': {source}")]
    UploadReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The service has been shut down; the queue no longer accepts tasks.
    #[error("Processing queue is closed")]
    QueueClosed,

    // ── Review errors ─────────────────────────────────────────────────────
    /// No job exists under the given id.
    #[error("No job found for id '{job_id}'")]
    JobNotFound { job_id: String },

    /// The operation requires a completed job (e.g. export download).
    #[error("Job '{job_id}' has no processed results")]
    JobNotCompleted { job_id: String },

    /// The external record log rejected the appended row.
    #[error("Failed to persist record: {detail}")]
    LogFailed { detail: String },
}

/// A non-fatal error for a single submitted document.
///
/// Stored on the job record when processing fails; the job ends in a
/// terminal `error` state and the worker moves on to the next task.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum TaskError {
    /// The image could not be decoded.
    #[error("Error decoding image: {detail}")]
    ImageDecode { detail: String },

    /// Resize/pad/normalise failed after a successful decode.
    #[error("Error preprocessing image: {detail}")]
    Preprocess { detail: String },

    /// The source file is gone and no in-memory copy exists.
    #[error("File not found: {path}")]
    SourceMissing { path: String },

    /// Could not materialise a temporary file from in-memory bytes.
    #[error("Could not create temporary file: {detail}")]
    TempFile { detail: String },

    /// The vision model returned an error.
    #[error("Error processing image: {detail}")]
    Inference { detail: String },
}
