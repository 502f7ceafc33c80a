//! Correction pass. Repairs one observed failure mode: objective employment facts filed
//! under a subjective section (usually Demeanor/Participation).
//!
//! Conservative on purpose. An item moves only when it carries a strong employment
//! signal, has no emotional framing near that signal, and sits below the re-routing
//! ceiling for its section. Explicit labels (confidence 1.0) never move.

use super::entities::{Classification, ClassifiedItem};
use super::taxonomy::{MODEL_CONFIDENCE_CEILING, ReportSection, clamp_unit};
use once_cell::sync::Lazy;
use regex::{Match, Regex};
use tracing::{debug, info};

/// Characters on either side of an employment phrase searched for emotional framing.
const FRAMING_WINDOW: usize = 80;

static EMPLOYMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:works? (?:at|for)|working (?:at|for)|worked (?:at|for)|job search|job hunting|jobs?|employ(?:ed|er|ment)|hired|interview(?:ed|s)?|paychecks?|pay ?stubs?|payday|wages?|shifts?|warehouse|culver'?s|walmart|amazon|mcdonald'?s|target|home depot|starbucks|fedex|ups)\b",
    )
    .expect("static employment pattern")
});

static EMOTIONAL_FRAMING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:ang(?:er|ry)|argu\w*|fight\w*|fought|yell\w*|upset|frustrat\w*|anxi\w*|stress\w*|conflict\w*|rude|hostile|cried|crying|mad|confront\w*|blew up|disrespect\w*|attitude)\b",
    )
    .expect("static framing pattern")
});

/// Re-routing ceilings and the confidence floor for relocated items.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrectionPolicy {
    /// Items in Demeanor/Participation move only below this confidence.
    pub primary_threshold: f64,
    /// Items in the remaining non-work sections move only below this confidence.
    pub other_threshold: f64,
    /// Relocated items end with at least this confidence.
    pub floor: f64,
}

impl CorrectionPolicy {
    pub fn new(primary_threshold: f64, other_threshold: f64, floor: f64) -> Self {
        let defaults = Self::default();
        Self {
            primary_threshold: clamp_unit(primary_threshold, defaults.primary_threshold),
            other_threshold: clamp_unit(other_threshold, defaults.other_threshold),
            floor: clamp_unit(floor, defaults.floor).min(MODEL_CONFIDENCE_CEILING),
        }
    }

    fn threshold_for(&self, section: ReportSection) -> f64 {
        if section == ReportSection::DemeanorParticipation {
            self.primary_threshold
        } else {
            self.other_threshold
        }
    }
}

impl Default for CorrectionPolicy {
    fn default() -> Self {
        Self {
            primary_threshold: 0.9,
            other_threshold: 0.85,
            floor: 0.85,
        }
    }
}

/// True when `text` states an employment fact without emotional framing around it.
pub fn is_plain_employment_fact(text: &str) -> bool {
    let mut found = false;
    for employment in EMPLOYMENT.find_iter(text) {
        found = true;
        if has_framing_near(text, &employment) {
            return false;
        }
    }
    found
}

fn has_framing_near(text: &str, employment: &Match<'_>) -> bool {
    let lo = employment.start().saturating_sub(FRAMING_WINDOW);
    let hi = employment.end() + FRAMING_WINDOW;
    EMOTIONAL_FRAMING
        .find_iter(text)
        .any(|m| m.end() > lo && m.start() < hi)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CorrectionPass {
    policy: CorrectionPolicy,
}

impl CorrectionPass {
    pub fn new(policy: CorrectionPolicy) -> Self {
        Self { policy }
    }

    /// Relocate plain employment facts into Work/School and note the count in its summary.
    pub fn correct(&self, mut classification: Classification) -> Classification {
        let mut relocated: Vec<ClassifiedItem> = Vec::new();

        for (&section, block) in classification.sections.iter_mut() {
            if section == ReportSection::WorkSchool {
                continue;
            }
            let ceiling = self.policy.threshold_for(section);
            let (moving, staying): (Vec<_>, Vec<_>) = std::mem::take(&mut block.items)
                .into_iter()
                .partition(|item| item.confidence < ceiling && is_plain_employment_fact(&item.text));
            block.items = staying;

            for mut item in moving {
                debug!(entry = %item.entry_id, from = section.key(), "relocating employment fact");
                item.reason = format!(
                    "corrected from {}: employment fact (was: {})",
                    section.title(),
                    item.reason
                );
                item.confidence = item.confidence.max(self.policy.floor);
                item.section = ReportSection::WorkSchool;
                relocated.push(item);
            }
        }

        if relocated.is_empty() {
            return classification;
        }

        let count = relocated.len();
        info!(relocated = count, "correction pass moved items into Work/School");
        let work = classification.section_mut(ReportSection::WorkSchool);
        work.items.extend(relocated);
        let note = format!(
            "{} {} relocated here from other sections by the correction pass.",
            count,
            if count == 1 { "item was" } else { "items were" }
        );
        work.summary = if work.summary.trim().is_empty() {
            note
        } else {
            format!("{} {}", work.summary.trim_end(), note)
        };
        classification
    }
}
