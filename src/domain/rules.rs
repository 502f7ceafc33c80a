//! Rule-based classifier. Deterministic keyword matching over both taxonomies.
//!
//! Used whenever the semantic classifier is unavailable or returns output that fails
//! validation. Rules are evaluated in `RULE_ORDER`; the first section whose pattern list
//! matches wins. That order is the tie-break and is covered by tests, so it must not be
//! derived from map iteration.

use super::entities::{Classification, ClassifiedItem, Entry, RoutingMethod, Segment};
use super::taxonomy::{
    EXPLICIT_CONFIDENCE, MODEL_CONFIDENCE_CEILING, ReportSection, SegmentCategory, clamp_unit,
};
use once_cell::sync::Lazy;
use regex::Regex;

/// Default confidence for a keyword hit: below the trust threshold on purpose.
pub const DEFAULT_RULE_CONFIDENCE: f64 = 0.55;

/// Reason attached to transcript sentences no rule matched.
pub const NO_RULE_MATCHED_REASON: &str = "no keyword rule matched";

/// Evaluation order. Sponsor goes first so "AA meeting" never lands in a meeting-ish
/// section, and demeanor goes last because its vocabulary is the most generic.
pub const RULE_ORDER: [ReportSection; 5] = [
    ReportSection::SponsorMentor,
    ReportSection::ProfessionalHelp,
    ReportSection::WorkSchool,
    ReportSection::ChoresCompliance,
    ReportSection::DemeanorParticipation,
];

fn keywords(section: ReportSection) -> &'static [&'static str] {
    match section {
        ReportSection::SponsorMentor => &[
            "sponsor",
            "sponsee",
            "mentor(?:ing|ed)?",
            "aa",
            "na",
            "alcoholics anonymous",
            "narcotics anonymous",
            "12[- ]step",
            "step work",
            "big book",
            "home group",
            "fellowship",
        ],
        ReportSection::ProfessionalHelp => &[
            "therap(?:y|ist)",
            "counsel(?:or|ing|ling)",
            "psychiatr\\w*",
            "doctor",
            "appointments?",
            "clinic",
            "medications?",
            "meds",
            "prescriptions?",
            "dentist",
            "case manager",
            "probation",
            "parole",
            "outpatient",
            "iop",
            "medical",
        ],
        ReportSection::WorkSchool => &[
            "work(?:s|ed|ing)?",
            "jobs?",
            "job search",
            "employ\\w*",
            "shifts?",
            "interview\\w*",
            "paychecks?",
            "pay ?stubs?",
            "hired",
            "school",
            "class(?:es)?",
            "ged",
            "college",
            "homework",
            "resume",
        ],
        ReportSection::ChoresCompliance => &[
            "chores?",
            "dishes",
            "clean\\w*",
            "curfew",
            "rent",
            "fees?",
            "house meeting",
            "drug tests?",
            "ua",
            "breathalyzer",
            "sign[- ]in",
            "laundry",
            "trash",
            "vacuum\\w*",
        ],
        ReportSection::DemeanorParticipation => &[
            "attitude",
            "demeanor",
            "participat\\w*",
            "engaged",
            "respectful",
            "disrespect\\w*",
            "argu\\w*",
            "conflict\\w*",
            "ang(?:er|ry)",
            "upset",
            "anxi\\w*",
            "mood",
            "cooperative",
            "behavior",
        ],
    }
}

struct CompiledRule {
    section: ReportSection,
    pattern: Regex,
}

static RULES: Lazy<Vec<CompiledRule>> = Lazy::new(|| {
    RULE_ORDER
        .into_iter()
        .map(|section| {
            let alternation = keywords(section).join("|");
            CompiledRule {
                section,
                pattern: Regex::new(&format!(r"(?i)\b(?:{alternation})\b"))
                    .expect("static keyword pattern"),
            }
        })
        .collect()
});

/// A run of text up to and including its terminators, or a terminator run on its own,
/// so every non-whitespace character lands in some sentence.
static SENTENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[^.!?\n]*[.!?]+|[^.!?\n]+").expect("static sentence pattern")
});

/// A keyword hit: the winning label plus the matched text, lowercased.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleMatch<L> {
    pub label: L,
    pub keyword: String,
}

/// Pure keyword classifier. No external dependency, no hidden state.
#[derive(Debug, Clone, Copy)]
pub struct RuleClassifier {
    confidence: f64,
}

impl RuleClassifier {
    /// `confidence` is clamped below the explicit-label value so keyword hits can never
    /// impersonate a human assignment.
    pub fn new(confidence: f64) -> Self {
        Self {
            confidence: clamp_unit(confidence, DEFAULT_RULE_CONFIDENCE)
                .min(MODEL_CONFIDENCE_CEILING),
        }
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// First section (in `RULE_ORDER`) whose keywords appear in `text`.
    pub fn match_section(&self, text: &str) -> Option<RuleMatch<ReportSection>> {
        RULES.iter().find_map(|rule| {
            rule.pattern.find(text).map(|m| RuleMatch {
                label: rule.section,
                keyword: m.as_str().to_lowercase(),
            })
        })
    }

    /// Same rules, mapped onto the transcript taxonomy. `None` means catch-all.
    pub fn match_category(&self, text: &str) -> Option<RuleMatch<SegmentCategory>> {
        self.match_section(text).map(|m| RuleMatch {
            label: m.label.segment_category(),
            keyword: m.keyword,
        })
    }

    /// Report-path fallback: route every entry by keyword; misses become uncategorized.
    pub fn classify_entries(&self, entries: &[Entry]) -> Classification {
        let mut classification = Classification::empty(RoutingMethod::RuleBased);
        for entry in entries {
            match self.match_section(&entry.text) {
                Some(hit) => classification.push_item(ClassifiedItem::from_entry(
                    entry,
                    hit.label,
                    self.confidence,
                    format!("keyword rule: {}", hit.keyword),
                )),
                None => classification.uncategorized.push(entry.id.clone()),
            }
        }

        Self::summarize(&mut classification);
        classification
    }

    /// Rewrite the count summaries of a keyword-routed classification. Run it again after
    /// explicitly labeled items are merged in so the totals cover the whole batch.
    pub fn summarize(classification: &mut Classification) {
        for block in classification.sections.values_mut() {
            let labeled = block
                .items
                .iter()
                .filter(|item| item.confidence >= EXPLICIT_CONFIDENCE)
                .count();
            let keyword = block.items.len() - labeled;
            let mut parts = Vec::new();
            if keyword > 0 {
                parts.push(format!(
                    "{} {} routed by keyword rules.",
                    keyword,
                    plural(keyword, "entry", "entries")
                ));
            }
            if labeled > 0 {
                parts.push(format!(
                    "{} {} explicitly labeled.",
                    labeled,
                    plural(labeled, "entry was", "entries were")
                ));
            }
            block.summary = parts.join(" ");
        }
        let placed = classification.item_count();
        let total = placed + classification.uncategorized.len();
        classification.overall_summary = format!(
            "Automated narrative summary unavailable. {} of {} {} placed in a section; {} uncategorized.",
            placed,
            total,
            plural(total, "entry", "entries"),
            classification.uncategorized.len()
        );
    }

    /// Transcript-path fallback: sentence split, classify each sentence, then merge runs of
    /// the same category. Sentences with no hit become catch-all at zero confidence.
    pub fn segment(&self, text: &str) -> Vec<Segment> {
        let mut segments: Vec<Segment> = Vec::new();
        let mut keywords: Vec<String> = Vec::new();

        for sentence in split_sentences(text) {
            let (category, keyword) = match self.match_category(sentence) {
                Some(hit) => (hit.label, Some(hit.keyword)),
                None => (SegmentCategory::CATCH_ALL, None),
            };
            match segments.last_mut() {
                Some(last) if last.category == category => {
                    last.text.push(' ');
                    last.text.push_str(sentence);
                    if let Some(k) = keyword {
                        if !keywords.contains(&k) {
                            keywords.push(k);
                        }
                        last.reason = format!("keyword rule: {}", keywords.join(", "));
                    }
                }
                _ => {
                    keywords.clear();
                    let (confidence, reason) = match keyword {
                        Some(k) => {
                            let reason = format!("keyword rule: {k}");
                            keywords.push(k);
                            (self.confidence, reason)
                        }
                        None => (0.0, NO_RULE_MATCHED_REASON.to_string()),
                    };
                    segments.push(Segment {
                        text: sentence.to_string(),
                        category,
                        confidence,
                        reason,
                    });
                }
            }
        }
        if segments.is_empty() && !text.trim().is_empty() {
            segments.push(Segment {
                text: text.trim().to_string(),
                category: SegmentCategory::CATCH_ALL,
                confidence: 0.0,
                reason: NO_RULE_MATCHED_REASON.to_string(),
            });
        }
        segments
    }
}

impl Default for RuleClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_RULE_CONFIDENCE)
    }
}

fn split_sentences(text: &str) -> impl Iterator<Item = &str> {
    SENTENCE
        .find_iter(text)
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
}

fn plural<'a>(n: usize, one: &'a str, many: &'a str) -> &'a str {
    if n == 1 { one } else { many }
}
