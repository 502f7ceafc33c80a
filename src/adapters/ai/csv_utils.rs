//! CSV utilities for semantic prompts. Uses the `csv` crate for safe serialization.
//!
//! Converts (already redacted) entries to a compact table suitable for LLM context input.

use crate::domain::Entry;

/// Convert entries to a CSV string for LLM context.
///
/// Format: `Id;Kind;Date;Text` (semicolon-delimited for LLM token efficiency).
/// The model refers back to entries by the `Id` column only.
pub fn entries_to_csv(entries: &[Entry]) -> Result<String, csv::Error> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b';')
        .has_headers(true)
        .from_writer(Vec::new());

    wtr.write_record(["Id", "Kind", "Date", "Text"])?;

    for entry in entries {
        let date_str = entry.occurred_at.format("%Y-%m-%d %H:%M").to_string();
        // Newlines flattened for readability; the csv crate handles quoting of the rest.
        let clean_text = entry.text.replace('\n', " ").replace('\r', "");
        wtr.write_record([
            entry.id.as_str(),
            entry.source_kind.as_str(),
            date_str.as_str(),
            clean_text.as_str(),
        ])?;
    }

    wtr.flush()?;
    let bytes = wtr
        .into_inner()
        .map_err(|e| csv::Error::from(std::io::Error::other(e.to_string())))?;

    String::from_utf8(bytes).map_err(|e| {
        csv::Error::from(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            e.to_string(),
        ))
    })
}
