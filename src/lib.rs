//! resident-digest: classification and report synthesis for recovery-residence records,
//! with Hexagonal Architecture.
//!
//! Two paths share one taxonomy and one confidence policy: activity entries become a
//! sectioned progress report, meeting transcripts become categorized segments. Both try a
//! language model first and fall back to deterministic keyword rules.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod shared;
pub mod usecases;
