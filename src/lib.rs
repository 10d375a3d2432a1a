//! # docufield
//!
//! Extract structured field data from document images — passports, checks,
//! invoices — using a Vision Language Model, with a background review
//! workflow on top.
//!
//! ## Why this crate?
//!
//! Template-free OCR gives you text, not fields. Pointing a VLM at a
//! document with a strict field-enumeration prompt gives you `Label: value`
//! lines you can parse, review, correct and log — without per-layout
//! templates or training. This crate is the orchestration around that idea:
//! it decouples upload from inference with a work queue, tracks per-job
//! lifecycle state, and renders reviewer-facing exports.
//!
//! ## Pipeline Overview
//!
//! ```text
//! image bytes / path
//!  │
//!  ├─ 1. Submit    validate, capture bytes, enqueue (non-blocking)
//!  ├─ 2. Worker    single FIFO consumer, one model call at a time
//!  │     ├─ resolve source (temp file from memory if needed)
//!  │     ├─ normalise  448×448 white-padded ImageNet tensor
//!  │     ├─ extract    document-type instruction prompt → raw text
//!  │     ├─ parse      `Label: value` lines → ordered field map
//!  │     └─ render     TSV table + flat text, memoised
//!  ├─ 3. Poll      {processing | completed+fields | error | not_found}
//!  └─ 4. Review    correct fields, download exports, save to record log
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docufield::{
//!     DocumentService, MemoryLog, PipelineConfig, Upload, VisionModel,
//! };
//! use std::sync::Arc;
//!
//! # fn load_model() -> Arc<dyn VisionModel> { unimplemented!() }
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Load the model up front — load failures are fatal at startup,
//!     // never at first use.
//!     let model: Arc<dyn VisionModel> = load_model();
//!     let service = DocumentService::new(
//!         PipelineConfig::default(),
//!         model,
//!         Arc::new(MemoryLog::new()),
//!     )?;
//!
//!     let bytes = std::fs::read("passport_scan.png")?;
//!     let job_id = docufield::stamped_job_id("passport_scan.png", chrono::Utc::now());
//!     service.submit(&job_id, "passport", Upload::Bytes {
//!         filename: "passport_scan.png".into(),
//!         data: bytes,
//!     })?;
//!
//!     // Poll until the worker finishes, then download the table export.
//!     loop {
//!         match service.status(&job_id) {
//!             docufield::StatusReport::Processing => {
//!                 tokio::time::sleep(std::time::Duration::from_millis(200)).await;
//!             }
//!             report => {
//!                 println!("{}", serde_json::to_string(&report)?);
//!                 break;
//!             }
//!         }
//!     }
//!     let csv = service.export_csv(&job_id)?;
//!     std::fs::write(&csv.filename, &csv.body)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Boundaries
//!
//! The model is injected behind [`VisionModel`]; the confirmed-record sink
//! is injected behind [`RecordLog`]. Web routing, authentication and the
//! spreadsheet integration live in the host application.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod document;
pub mod error;
pub mod job;
pub mod model;
pub mod persist;
pub mod pipeline;
pub mod prompts;
pub mod service;
pub mod storage;
pub mod store;

mod worker;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use document::{canonicalize, DocumentType, FieldSchema, FieldSpec};
pub use error::{ServiceError, TaskError};
pub use job::{stamped_job_id, Download, JobStatus, StatusReport};
pub use model::{GenerationOptions, ModelError, VisionModel};
pub use persist::{LogEntry, LogError, MemoryLog, RecordLog};
pub use pipeline::export::{Export, FieldSource};
pub use pipeline::parse::{parse_fields, FieldMap};
pub use pipeline::preprocess::PixelTensor;
pub use service::{DocumentService, Submission, Upload};
