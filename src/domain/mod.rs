//! Core domain layer. No external I/O dependencies.
//!
//! Entities, the two taxonomies, and the pure pipeline stages (redaction, explicit-label
//! routing, keyword rules, correction, composition) live here. Dependencies flow inward.

pub mod composer;
pub mod correction;
pub mod entities;
pub mod errors;
pub mod redact;
pub mod router;
pub mod rules;
pub mod taxonomy;

pub use composer::ReportComposer;
pub use correction::{CorrectionPass, CorrectionPolicy};
pub use entities::{
    Classification, ClassifiedItem, Entry, EntryId, ReportPeriod, RoutingMethod, SectionBlock,
    Segment, SegmentResult, SourceKind,
};
pub use errors::DomainError;
pub use redact::{redact, redact_entry};
pub use router::{route_explicit, split_labeled_fragments, RoutedEntries, TranscriptPart};
pub use rules::RuleClassifier;
pub use taxonomy::{ConfidencePolicy, ReportSection, SegmentCategory};
