//! Application use cases. Orchestrate domain logic via ports.

pub mod report_service;
pub mod segment_service;
pub mod semantic;

pub use report_service::{ReportOutcome, ReportService};
pub use segment_service::SegmentService;
pub use semantic::SemanticClassifier;
