//! Domain entities. Pure data structures for the classification core.
//!
//! No storage/HTTP types here; adapters map their records into `Entry` before they arrive.

use super::errors::DomainError;
use super::taxonomy::{ReportSection, SegmentCategory};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Opaque entry identifier, stable across retries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub String);

impl EntryId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntryId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Where an entry came from in the record-keeping system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Goal,
    Chore,
    Meeting,
    Incident,
    Note,
    Fee,
    Accomplishment,
    Checklist,
    #[serde(other)]
    Other,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Goal => "goal",
            Self::Chore => "chore",
            Self::Meeting => "meeting",
            Self::Incident => "incident",
            Self::Note => "note",
            Self::Fee => "fee",
            Self::Accomplishment => "accomplishment",
            Self::Checklist => "checklist",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One atomic, timestamped fact about a resident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    pub source_kind: SourceKind,
    pub text: String,
    pub occurred_at: DateTime<Utc>,
    /// Informational only; never used for routing.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Human-assigned category. When it parses, the entry bypasses classification.
    #[serde(default)]
    pub explicit_category: Option<String>,
}

/// Result of classifying one entry into a report section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedItem {
    pub entry_id: EntryId,
    pub source_kind: SourceKind,
    pub text: String,
    pub occurred_at: DateTime<Utc>,
    pub section: ReportSection,
    pub confidence: f64,
    pub reason: String,
}

impl ClassifiedItem {
    pub fn from_entry(
        entry: &Entry,
        section: ReportSection,
        confidence: f64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            entry_id: entry.id.clone(),
            source_kind: entry.source_kind,
            text: entry.text.clone(),
            occurred_at: entry.occurred_at,
            section,
            confidence,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionBlock {
    pub items: Vec<ClassifiedItem>,
    pub summary: String,
}

/// Which classifier handled the unlabeled part of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingMethod {
    /// Every entry carried an explicit label; no classifier ran.
    ExplicitOnly,
    Semantic,
    RuleBased,
}

/// Report-path output: entries routed into the five sections plus an uncategorized remainder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub sections: BTreeMap<ReportSection, SectionBlock>,
    pub uncategorized: Vec<EntryId>,
    pub overall_summary: String,
    pub method: RoutingMethod,
}

impl Classification {
    /// A classification with all five sections present and empty.
    pub fn empty(method: RoutingMethod) -> Self {
        Self {
            sections: ReportSection::ALL
                .into_iter()
                .map(|s| (s, SectionBlock::default()))
                .collect(),
            uncategorized: Vec::new(),
            overall_summary: String::new(),
            method,
        }
    }

    pub fn section(&self, section: ReportSection) -> Option<&SectionBlock> {
        self.sections.get(&section)
    }

    pub fn section_mut(&mut self, section: ReportSection) -> &mut SectionBlock {
        self.sections.entry(section).or_default()
    }

    /// Place an item into the section it names.
    pub fn push_item(&mut self, item: ClassifiedItem) {
        self.section_mut(item.section).items.push(item);
    }

    pub fn item_count(&self) -> usize {
        self.sections.values().map(|b| b.items.len()).sum()
    }

    /// Find a placed item by entry id.
    pub fn find_item(&self, id: &EntryId) -> Option<&ClassifiedItem> {
        self.sections
            .values()
            .flat_map(|b| b.items.iter())
            .find(|item| &item.entry_id == id)
    }

    /// Every entry id placed anywhere, section items first, then uncategorized.
    pub fn placed_ids(&self) -> impl Iterator<Item = &EntryId> {
        self.sections
            .values()
            .flat_map(|b| b.items.iter().map(|item| &item.entry_id))
            .chain(self.uncategorized.iter())
    }

    /// True when every id in `expected` is placed exactly once and nothing else is placed.
    pub fn covers_exactly<'a>(&self, expected: impl IntoIterator<Item = &'a EntryId>) -> bool {
        let expected: HashSet<&EntryId> = expected.into_iter().collect();
        let mut seen = HashSet::new();
        for id in self.placed_ids() {
            if !expected.contains(id) || !seen.insert(id) {
                return false;
            }
        }
        seen.len() == expected.len()
    }

    /// Newest first inside every section; ties broken by id.
    pub fn sort_by_recency(&mut self) {
        for block in self.sections.values_mut() {
            block.items.sort_by(|a, b| {
                b.occurred_at
                    .cmp(&a.occurred_at)
                    .then_with(|| a.entry_id.cmp(&b.entry_id))
            });
        }
    }
}

/// One categorized fragment of a transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,
    pub category: SegmentCategory,
    pub confidence: f64,
    pub reason: String,
}

/// Transcript-path output: ordered segments covering the transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentResult {
    pub segments: Vec<Segment>,
    pub method: RoutingMethod,
}

/// Inclusive date window a report covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ReportPeriod {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, DomainError> {
        if start > end {
            return Err(DomainError::Input(format!(
                "report period starts after it ends ({start} > {end})"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let day = at.date_naive();
        day >= self.start && day <= self.end
    }
}

impl fmt::Display for ReportPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}
