//! Report composer. Renders a finished classification as a fixed-structure Markdown document.
//!
//! Pure and deterministic: the same period and classification always produce the same bytes.

use super::entities::{Classification, ClassifiedItem, ReportPeriod};
use super::taxonomy::ReportSection;
use std::fmt::Write;

/// Default character budget for item excerpts.
pub const DEFAULT_EXCERPT_CHARS: usize = 160;

const TITLE: &str = "Resident Progress Report";

#[derive(Debug, Clone)]
pub struct ReportComposer {
    excerpt_chars: usize,
}

impl ReportComposer {
    pub fn new(excerpt_chars: usize) -> Self {
        Self {
            excerpt_chars: excerpt_chars.max(1),
        }
    }

    pub fn compose(&self, period: &ReportPeriod, classification: &Classification) -> String {
        let mut md = String::new();

        // Header
        md.push_str(&format!("# {}\n\n", TITLE));
        md.push_str(&format!(
            "**Period:** {} to {}\n\n",
            period.start.format("%Y-%m-%d"),
            period.end.format("%Y-%m-%d")
        ));
        md.push_str("---\n\n");

        md.push_str("## Overall Summary\n\n");
        md.push_str(non_empty_or(&classification.overall_summary, "_No summary available._"));
        md.push_str("\n\n");

        for section in ReportSection::ALL {
            md.push_str(&format!("## {}\n\n", section.title()));
            let block = classification.section(section);
            let summary = block.map(|b| b.summary.as_str()).unwrap_or_default();
            let items = block.map(|b| b.items.as_slice()).unwrap_or_default();

            if !summary.trim().is_empty() {
                md.push_str(summary.trim());
                md.push_str("\n\n");
            }
            if items.is_empty() {
                md.push_str("_No entries this period._\n\n");
                continue;
            }
            for item in items {
                self.push_item_line(&mut md, item);
            }
            md.push('\n');
        }

        md.push_str("## Uncategorized\n\n");
        if classification.uncategorized.is_empty() {
            md.push_str("All entries were categorized.\n\n");
        } else {
            let ids: Vec<&str> = classification
                .uncategorized
                .iter()
                .map(|id| id.as_str())
                .collect();
            md.push_str(&format!(
                "{} {} could not be categorized: {}\n\n",
                ids.len(),
                if ids.len() == 1 { "entry" } else { "entries" },
                ids.join(", ")
            ));
        }

        // Footer
        md.push_str("---\n");
        md.push_str("*Generated by resident-digest*\n");
        md
    }

    fn push_item_line(&self, md: &mut String, item: &ClassifiedItem) {
        // Writing into a String cannot fail.
        let _ = writeln!(
            md,
            "- **{}**: {} ({:.2})",
            item.source_kind,
            truncate_chars(&item.text, self.excerpt_chars),
            item.confidence
        );
    }
}

impl Default for ReportComposer {
    fn default() -> Self {
        Self::new(DEFAULT_EXCERPT_CHARS)
    }
}

fn non_empty_or<'a>(text: &'a str, fallback: &'a str) -> &'a str {
    let trimmed = text.trim();
    if trimmed.is_empty() { fallback } else { trimmed }
}

/// Flatten whitespace and cap at `budget` characters, ending with an ellipsis when cut.
pub fn truncate_chars(text: &str, budget: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= budget {
        return flat;
    }
    let mut cut: String = flat.chars().take(budget.saturating_sub(1)).collect();
    cut.truncate(cut.trim_end().len());
    cut.push('…');
    cut
}
