//! Pipeline stages for document field extraction.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap implementations (e.g. switch the normaliser's geometry) without
//! touching other stages.
//!
//! ## Data Flow
//!
//! ```text
//! preprocess ──▶ extract ──▶ parse ──▶ export
//! (448×448 CHW)  (VLM call)  (Label:   (TSV table
//!  tensor)                    Value)    + flat text)
//! ```
//!
//! 1. [`preprocess`] — decode, pad to a white square, scale to the model's
//!    input size, ImageNet-normalise; runs in `spawn_blocking` because
//!    decode and resampling are CPU-bound
//! 2. [`extract`]    — compose the document-type instruction prompt and
//!    call the vision model; the only stage touching the model boundary
//! 3. [`parse`]      — `Label: Value` lines into an insertion-ordered map
//! 4. [`export`]     — render the per-type delimited table and flat text

pub mod export;
pub mod extract;
pub mod parse;
pub mod preprocess;
