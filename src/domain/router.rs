//! Explicit-label router. Runs before any model call.
//!
//! A human's explicit category always wins: labeled entries (and bracket-labeled transcript
//! paragraphs) are emitted at full confidence and never reach a classifier.

use super::entities::{ClassifiedItem, Entry, Segment};
use super::taxonomy::{
    EXPLICIT_CONFIDENCE, ReportSection, SegmentCategory, USER_ASSIGNED_REASON,
};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

/// Entries split by whether a human already categorized them.
#[derive(Debug, Default)]
pub struct RoutedEntries {
    pub labeled: Vec<ClassifiedItem>,
    pub unlabeled: Vec<Entry>,
}

/// Split a batch into explicitly labeled items and entries that still need classification.
/// An unparseable label is logged and the entry is classified normally.
pub fn route_explicit(entries: Vec<Entry>) -> RoutedEntries {
    let mut routed = RoutedEntries::default();
    for entry in entries {
        let section = match entry.explicit_category.as_deref() {
            None => None,
            Some(label) => {
                let parsed = ReportSection::from_label(label);
                if parsed.is_none() {
                    warn!(entry = %entry.id, label, "unknown explicit category, classifying normally");
                }
                parsed
            }
        };
        match section {
            Some(section) => routed.labeled.push(ClassifiedItem::from_entry(
                &entry,
                section,
                EXPLICIT_CONFIDENCE,
                USER_ASSIGNED_REASON,
            )),
            None => routed.unlabeled.push(entry),
        }
    }
    routed
}

/// A transcript paragraph run: either a labeled fragment or text still to classify.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptPart {
    Labeled(Segment),
    Unlabeled(String),
}

static BRACKET_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\[(?P<label>[A-Za-z _/-]{2,40})\]\s*(?P<body>[\s\S]*)$")
        .expect("static label pattern")
});

static PARAGRAPH_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n\s*\n").expect("static paragraph pattern"));

/// Split a transcript into paragraphs, turning `[category] text` paragraphs into labeled
/// segments. Consecutive unlabeled paragraphs stay together as one block, in order.
pub fn split_labeled_fragments(transcript: &str) -> Vec<TranscriptPart> {
    let mut parts = Vec::new();
    let mut pending: Vec<&str> = Vec::new();

    for paragraph in PARAGRAPH_BREAK.split(transcript) {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }
        let labeled = BRACKET_LABEL.captures(paragraph).and_then(|caps| {
            let category = SegmentCategory::from_label(&caps["label"])?;
            let body = caps["body"].trim();
            (!body.is_empty()).then(|| Segment {
                text: body.to_string(),
                category,
                confidence: EXPLICIT_CONFIDENCE,
                reason: USER_ASSIGNED_REASON.to_string(),
            })
        });
        match labeled {
            Some(segment) => {
                if !pending.is_empty() {
                    parts.push(TranscriptPart::Unlabeled(pending.join("\n\n")));
                    pending.clear();
                }
                parts.push(TranscriptPart::Labeled(segment));
            }
            None => pending.push(paragraph),
        }
    }
    if !pending.is_empty() {
        parts.push(TranscriptPart::Unlabeled(pending.join("\n\n")));
    }
    parts
}
