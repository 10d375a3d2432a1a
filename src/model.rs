//! The vision-model boundary.
//!
//! The model itself — weights, tokenizer, device placement — is outside
//! this crate. Everything the pipeline needs is an opaque async function
//! from (image tensor, prompt, generation limits) to text, captured by the
//! [`VisionModel`] trait.
//!
//! # Why dependency injection instead of a lazy global?
//!
//! A process-wide lazily-initialised singleton invites a double-load race
//! when two callers hit first-use simultaneously, and makes tests depend on
//! process state. Instead the caller constructs the model once at startup
//! (loading failures surface there, fatally, before any job is accepted)
//! and hands the service an `Arc<dyn VisionModel>` shared read-only by the
//! worker.

use crate::pipeline::preprocess::PixelTensor;
use async_trait::async_trait;
use thiserror::Error;

/// Generation limits passed with every model invocation.
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    /// Upper bound on generated tokens. Default: 512 — the field-enumeration
    /// replies are short, and an unbounded reply would stall the single
    /// worker behind one runaway generation.
    pub max_new_tokens: usize,

    /// Pad with the end-of-sequence token. Default: true.
    ///
    /// Deterministic padding keeps batched decodes reproducible; models
    /// without a dedicated pad token conventionally reuse EOS.
    pub pad_with_eos: bool,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_new_tokens: 512,
            pad_with_eos: true,
        }
    }
}

/// Errors surfaced by a [`VisionModel`] implementation.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The model could not be loaded. Fatal at process startup: construct
    /// the model before building the service, and fail fast there.
    #[error("Error loading model: {detail}")]
    LoadFailed { detail: String },

    /// A single inference call failed. Non-fatal: the worker converts this
    /// into a terminal `error` state for that job only.
    #[error("Inference failed: {detail}")]
    Inference { detail: String },
}

/// An opaque vision-language model.
///
/// Implementations must be `Send + Sync`: the handle is shared between the
/// constructing thread and the background worker. Calls are serialised by
/// the single worker, so implementations need not be re-entrant — but a
/// hang here blocks every queued job behind it (no timeout is enforced).
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Run one generation over a normalised image and return the raw reply.
    async fn generate(
        &self,
        pixels: &PixelTensor,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, ModelError>;
}
