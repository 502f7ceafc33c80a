//! Closed classification vocabularies and the confidence model shared by every classifier.
//!
//! Two taxonomies exist: the five narrative report sections and the six transcript
//! segment categories. Nothing outside these enums is ever accepted from a classifier.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reason attached to every item produced by the explicit-label router.
pub const USER_ASSIGNED_REASON: &str = "user-assigned";

/// Reason attached to items demoted below the confidence threshold.
pub const LOW_CONFIDENCE_REASON: &str = "low confidence";

/// Default demotion threshold when configuration does not supply one.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.6;

/// Confidence of an explicitly labeled item. Reserved: no classifier may emit it.
pub const EXPLICIT_CONFIDENCE: f64 = 1.0;

/// Upper bound applied to model-reported confidences so 1.0 stays reserved for explicit labels.
pub const MODEL_CONFIDENCE_CEILING: f64 = 0.99;

/// Narrative report sections, declared in canonical report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportSection {
    SponsorMentor,
    WorkSchool,
    ChoresCompliance,
    DemeanorParticipation,
    ProfessionalHelp,
}

impl ReportSection {
    /// Canonical order used by the composer and by the model response schema.
    pub const ALL: [ReportSection; 5] = [
        ReportSection::SponsorMentor,
        ReportSection::WorkSchool,
        ReportSection::ChoresCompliance,
        ReportSection::DemeanorParticipation,
        ReportSection::ProfessionalHelp,
    ];

    /// Wire key used in prompts and JSON responses.
    pub fn key(self) -> &'static str {
        match self {
            Self::SponsorMentor => "sponsor_mentor",
            Self::WorkSchool => "work_school",
            Self::ChoresCompliance => "chores_compliance",
            Self::DemeanorParticipation => "demeanor_participation",
            Self::ProfessionalHelp => "professional_help",
        }
    }

    /// Human-readable heading used in rendered reports.
    pub fn title(self) -> &'static str {
        match self {
            Self::SponsorMentor => "Sponsor/Mentor",
            Self::WorkSchool => "Work/School",
            Self::ChoresCompliance => "Chores/Compliance",
            Self::DemeanorParticipation => "Demeanor/Participation",
            Self::ProfessionalHelp => "Professional-Help/Appointments",
        }
    }

    /// Segment category covering the same ground in the transcript taxonomy.
    pub fn segment_category(self) -> SegmentCategory {
        match self {
            Self::SponsorMentor => SegmentCategory::Sponsor,
            Self::WorkSchool => SegmentCategory::WorkSchool,
            Self::ChoresCompliance => SegmentCategory::Chores,
            Self::DemeanorParticipation => SegmentCategory::Demeanor,
            Self::ProfessionalHelp => SegmentCategory::Medical,
        }
    }

    /// Lenient parse for human-assigned labels. Accepts section keys, titles and
    /// segment-category aliases ("chores", "sponsor", "medical", ...).
    pub fn from_label(label: &str) -> Option<Self> {
        match normalize_label(label).as_str() {
            "sponsor_mentor" | "sponsor" | "mentor" => Some(Self::SponsorMentor),
            "work_school" | "work" | "school" | "employment" => Some(Self::WorkSchool),
            "chores_compliance" | "chores" | "chore" | "compliance" => {
                Some(Self::ChoresCompliance)
            }
            "demeanor_participation" | "demeanor" | "participation" | "behavior" => {
                Some(Self::DemeanorParticipation)
            }
            "professional_help"
            | "professional_help_appointments"
            | "professional"
            | "appointments"
            | "medical" => Some(Self::ProfessionalHelp),
            _ => None,
        }
    }
}

impl fmt::Display for ReportSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for ReportSection {
    type Err = String;

    /// Strict parse: only the exact wire keys.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|section| section.key() == s)
            .ok_or_else(|| format!("unknown report section: {s}"))
    }
}

/// Transcript segment categories. `General` is the catch-all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentCategory {
    WorkSchool,
    Demeanor,
    Sponsor,
    Medical,
    Chores,
    General,
}

impl SegmentCategory {
    pub const ALL: [SegmentCategory; 6] = [
        SegmentCategory::WorkSchool,
        SegmentCategory::Demeanor,
        SegmentCategory::Sponsor,
        SegmentCategory::Medical,
        SegmentCategory::Chores,
        SegmentCategory::General,
    ];

    pub const CATCH_ALL: SegmentCategory = SegmentCategory::General;

    pub fn as_str(self) -> &'static str {
        match self {
            Self::WorkSchool => "work_school",
            Self::Demeanor => "demeanor",
            Self::Sponsor => "sponsor",
            Self::Medical => "medical",
            Self::Chores => "chores",
            Self::General => "general",
        }
    }

    /// Lenient parse for bracket labels in transcripts.
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = normalize_label(label);
        if normalized == "general" || normalized == "other" {
            return Some(Self::General);
        }
        ReportSection::from_label(&normalized).map(ReportSection::segment_category)
    }
}

impl fmt::Display for SegmentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SegmentCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| format!("unknown segment category: {s}"))
    }
}

fn normalize_label(label: &str) -> String {
    label
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if matches!(c, '-' | ' ' | '/') { '_' } else { c })
        .collect()
}

/// Clamp a configured value into [0, 1]; NaN falls back to `fallback`.
pub fn clamp_unit(value: f64, fallback: f64) -> f64 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Confidence threshold below which classifier output is demoted to the catch-all.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidencePolicy {
    min_confidence: f64,
}

impl ConfidencePolicy {
    pub fn new(min_confidence: f64) -> Self {
        Self {
            min_confidence: clamp_unit(min_confidence, DEFAULT_MIN_CONFIDENCE),
        }
    }

    pub fn min_confidence(&self) -> f64 {
        self.min_confidence
    }

    /// True when `confidence` is strictly below the threshold.
    pub fn is_low(&self, confidence: f64) -> bool {
        confidence < self.min_confidence
    }

    /// Rewrite a low-confidence segment to the catch-all. The segment is kept.
    pub fn demote_segment(&self, mut segment: super::Segment) -> super::Segment {
        if self.is_low(segment.confidence) {
            segment.category = SegmentCategory::CATCH_ALL;
            segment.reason = LOW_CONFIDENCE_REASON.to_string();
        }
        segment
    }
}

impl Default for ConfidencePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_CONFIDENCE)
    }
}
