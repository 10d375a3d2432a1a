//! Field extraction: compose the instruction prompt and call the model.
//!
//! This stage is intentionally thin — all prompt text lives in
//! [`crate::prompts`] so the label contract can change without touching
//! model-call plumbing here, and the model itself is behind
//! [`crate::model::VisionModel`]. The reply is returned verbatim; parsing
//! is the next stage's job.

use crate::document::DocumentType;
use crate::model::{GenerationOptions, ModelError, VisionModel};
use crate::pipeline::preprocess::PixelTensor;
use crate::prompts;
use std::time::Instant;
use tracing::{debug, warn};

/// Run one extraction over a normalised image.
///
/// Unrecognised document tags are not an error: the passport template is
/// substituted (with a warning) so a mistyped tag still produces reviewable
/// output rather than a dead job.
pub async fn extract_fields(
    model: &dyn VisionModel,
    pixels: &PixelTensor,
    document_type: &str,
    options: &GenerationOptions,
) -> Result<String, ModelError> {
    let doc = match DocumentType::from_tag(document_type) {
        Some(doc) => doc,
        None => {
            warn!(
                "Unrecognised document type '{}', falling back to the passport template",
                document_type
            );
            DocumentType::Passport
        }
    };

    let prompt = prompts::compose(doc);
    let start = Instant::now();
    let reply = model.generate(pixels, &prompt, options).await?;
    debug!(
        "Model replied for '{}' template: {} bytes in {:?}",
        doc,
        reply.len(),
        start.elapsed()
    );

    Ok(reply)
}
