use thiserror::Error;

/// Maximum number of characters of raw model output kept on a parse failure.
pub const RAW_EXCERPT_CHARS: usize = 500;

/// Failure kinds raised by the generation and rendering stages.
///
/// These travel inside `anyhow::Error`; callers that need to branch on the
/// kind use `err.downcast_ref::<PipelineError>()`.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("model output was not decodable as JSON: {excerpt}")]
    GenerationParse { excerpt: String },

    #[error("text endpoint returned an error: {0}")]
    GenerationApi(String),

    #[error("image prompt derivation failed: {0}")]
    PromptGeneration(String),

    #[error("image render failed: {0}")]
    Render(String),

    #[error("image download failed: {0}")]
    Download(String),
}

impl PipelineError {
    pub fn parse_failure(raw: &str) -> Self {
        PipelineError::GenerationParse {
            excerpt: excerpt(raw),
        }
    }
}

/// First `RAW_EXCERPT_CHARS` characters of `raw`, cut on a char boundary.
pub fn excerpt(raw: &str) -> String {
    raw.chars().take(RAW_EXCERPT_CHARS).collect()
}
