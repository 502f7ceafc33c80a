//! Outbound ports. Application calls into infrastructure.
//!
//! Implemented by adapters.

use crate::domain::{DomainError, Entry, ReportPeriod, SegmentResult};
use std::path::PathBuf;

/// One structured prompt for the hosted language model.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmRequest {
    pub system: String,
    pub user: String,
    /// Ask the provider to constrain output to a JSON object.
    pub json_response: bool,
}

/// Hosted language model. Treated as a black box that may be slow, wrong, or absent.
#[async_trait::async_trait]
pub trait LlmPort: Send + Sync {
    /// Submit one prompt and return the raw response body text.
    ///
    /// # Errors
    /// `DomainError::Llm` on transport failure, timeout, or non-success status.
    /// Implementations never retry.
    async fn complete(&self, request: &LlmRequest) -> Result<String, DomainError>;
}

/// Record-fetch collaborator. Supplies the entries for a resident and period.
#[async_trait::async_trait]
pub trait EntrySourcePort: Send + Sync {
    async fn fetch_entries(
        &self,
        resident_id: &str,
        period: &ReportPeriod,
    ) -> Result<Vec<Entry>, DomainError>;
}

/// Persistence collaborator. Accepts finished documents; the core never writes storage itself.
#[async_trait::async_trait]
pub trait ReportSinkPort: Send + Sync {
    /// Store a composed report. Returns where it landed.
    async fn save_report(
        &self,
        resident_id: &str,
        period: &ReportPeriod,
        document: &str,
    ) -> Result<PathBuf, DomainError>;

    /// Store a transcript segmentation under `name`.
    async fn save_segments(
        &self,
        name: &str,
        result: &SegmentResult,
    ) -> Result<PathBuf, DomainError>;
}

/// Organization-policy collaborator. Free-text operating rules appended to semantic prompts.
#[async_trait::async_trait]
pub trait PolicyPort: Send + Sync {
    /// `None` when the organization has not configured any rules.
    async fn operating_rules(&self) -> Result<Option<String>, DomainError>;
}
