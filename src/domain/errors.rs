//! Domain errors. Used by ports and use cases.
//!
//! Adapters map infrastructure errors into these. `Llm` and `Validation` are recovered
//! inside the classification use cases; `Input` is the only class surfaced to callers
//! as a rejected request.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    /// Model unreachable, timed out, or answered with a non-success status.
    #[error("Language model unavailable: {0}")]
    Llm(String),

    /// Model answered, but the body failed the strict response schema.
    #[error("Model response failed validation: {0}")]
    Validation(String),

    #[error("Invalid input: {0}")]
    Input(String),

    #[error("Repository error: {0}")]
    Repo(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("UI error: {0}")]
    Ui(String),
}

impl DomainError {
    /// True for failures the pipelines recover from by falling back to keyword rules.
    pub fn is_classifier_failure(&self) -> bool {
        matches!(self, Self::Llm(_) | Self::Validation(_))
    }
}
