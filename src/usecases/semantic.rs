//! Semantic classifier. Asks the hosted model to classify a batch, then accepts the answer
//! only if the whole response passes a strict schema check.
//!
//! Flow:
//! 1. Build one prompt: closed taxonomy, worked examples (one per value plus ambiguous
//!    cases), optional organization rules, and the redacted batch.
//! 2. One `LlmPort::complete` call. No retry.
//! 3. Parse and validate atomically: closed value sets, required fields, numeric ranges,
//!    every batch id exactly once. Any failure rejects the response as a unit.
//! 4. Apply confidence demotion to what survived.
//!
//! Errors are `DomainError::Llm` or `DomainError::Validation`; callers fall back to the
//! keyword rules on either.

use crate::adapters::ai::entries_to_csv;
use crate::domain::taxonomy::MODEL_CONFIDENCE_CEILING;
use crate::domain::{
    Classification, ClassifiedItem, ConfidencePolicy, DomainError, Entry, ReportSection,
    RoutingMethod, Segment, SegmentCategory,
};
use crate::ports::{LlmPort, LlmRequest};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Fallback reason when the model leaves one empty.
const MODEL_REASON: &str = "model classification";

/// Worked examples for the report path. `None` means the entry belongs in `uncategorized`.
const REPORT_EXAMPLES: &[(&str, Option<ReportSection>, &str)] = &[
    (
        "Called his sponsor and worked on step four together",
        Some(ReportSection::SponsorMentor),
        "sponsor contact",
    ),
    (
        "Second week at the warehouse; brought in a pay stub",
        Some(ReportSection::WorkSchool),
        "employment fact",
    ),
    (
        "Completed assigned chore (kitchen deep clean) and was in by curfew",
        Some(ReportSection::ChoresCompliance),
        "house duty and rule compliance",
    ),
    (
        "Shared openly in house meeting and encouraged a newer resident",
        Some(ReportSection::DemeanorParticipation),
        "participation and attitude",
    ),
    (
        "Kept psychiatrist appointment; medication adjusted",
        Some(ReportSection::ProfessionalHelp),
        "clinical appointment",
    ),
    (
        "Got into an argument about his shift at Culver's",
        Some(ReportSection::DemeanorParticipation),
        "ambiguous: names an employer, but the record is about conflict",
    ),
    (
        "Mentioned a job interview on Friday during check-in",
        Some(ReportSection::WorkSchool),
        "ambiguous: said in a meeting, but it is an objective work fact",
    ),
    (
        "Watched a movie in the common room",
        None,
        "fits no section",
    ),
];

/// Worked examples for the transcript path.
const SEGMENT_EXAMPLES: &[(&str, SegmentCategory, &str)] = &[
    (
        "I called my sponsor twice this week and we read the Big Book.",
        SegmentCategory::Sponsor,
        "sponsor contact",
    ),
    (
        "My doctor changed my meds on Tuesday.",
        SegmentCategory::Medical,
        "medical appointment",
    ),
    (
        "I picked up two extra shifts and enrolled in a GED class.",
        SegmentCategory::WorkSchool,
        "work and school facts",
    ),
    (
        "Bathrooms were cleaned and everyone made curfew.",
        SegmentCategory::Chores,
        "house duties",
    ),
    (
        "He was quiet and didn't really engage tonight.",
        SegmentCategory::Demeanor,
        "participation",
    ),
    (
        "Okay, let's get started, everyone grab a seat.",
        SegmentCategory::General,
        "meeting logistics",
    ),
    (
        "He was frustrated when his manager cut his hours.",
        SegmentCategory::Demeanor,
        "ambiguous: mentions work, but the point is his frustration",
    ),
];

fn section_guidance(section: ReportSection) -> &'static str {
    match section {
        ReportSection::SponsorMentor => {
            "contact with a sponsor or mentor, 12-step meetings, step work"
        }
        ReportSection::WorkSchool => {
            "employment, job search, interviews, pay, school, classes, training"
        }
        ReportSection::ChoresCompliance => {
            "house chores, curfew, rent and fees, drug tests, house-rule compliance"
        }
        ReportSection::DemeanorParticipation => {
            "attitude, mood, conflict, engagement and participation in house life"
        }
        ReportSection::ProfessionalHelp => {
            "therapy, counseling, medical or psychiatric appointments, medication, case management"
        }
    }
}

fn category_guidance(category: SegmentCategory) -> &'static str {
    match category {
        SegmentCategory::WorkSchool => "employment, job search, pay, school, classes",
        SegmentCategory::Demeanor => "attitude, mood, conflict, engagement",
        SegmentCategory::Sponsor => "sponsor or mentor contact, 12-step meetings, step work",
        SegmentCategory::Medical => "therapy, counseling, medical appointments, medication",
        SegmentCategory::Chores => "chores, curfew, rent, drug tests, house rules",
        SegmentCategory::General => "anything else; use when unsure",
    }
}

/// Strict report response. Field names equal `ReportSection::key()` values.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReportResponse {
    sponsor_mentor: SectionPayload,
    work_school: SectionPayload,
    chores_compliance: SectionPayload,
    demeanor_participation: SectionPayload,
    professional_help: SectionPayload,
    uncategorized: Vec<String>,
    #[serde(rename = "overallSummary")]
    overall_summary: String,
}

impl ReportResponse {
    fn into_parts(self) -> ([(ReportSection, SectionPayload); 5], Vec<String>, String) {
        (
            [
                (ReportSection::SponsorMentor, self.sponsor_mentor),
                (ReportSection::WorkSchool, self.work_school),
                (ReportSection::ChoresCompliance, self.chores_compliance),
                (ReportSection::DemeanorParticipation, self.demeanor_participation),
                (ReportSection::ProfessionalHelp, self.professional_help),
            ],
            self.uncategorized,
            self.overall_summary,
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SectionPayload {
    items: Vec<ItemPayload>,
    summary: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ItemPayload {
    id: String,
    confidence: f64,
    reason: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SegmentResponse {
    segments: Vec<SegmentPayload>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SegmentPayload {
    text: String,
    category: SegmentCategory,
    confidence: f64,
    reason: String,
}

/// LLM-backed classifier for both taxonomies.
pub struct SemanticClassifier {
    llm: Arc<dyn LlmPort>,
    policy: ConfidencePolicy,
}

impl SemanticClassifier {
    pub fn new(llm: Arc<dyn LlmPort>, policy: ConfidencePolicy) -> Self {
        Self { llm, policy }
    }

    pub fn policy(&self) -> ConfidencePolicy {
        self.policy
    }

    /// Classify a redacted, unlabeled batch into report sections.
    pub async fn classify_entries(
        &self,
        entries: &[Entry],
        operating_rules: Option<&str>,
    ) -> Result<Classification, DomainError> {
        let csv = entries_to_csv(entries).map_err(batch_error)?;
        let request = LlmRequest {
            system: report_system_prompt(),
            user: with_rules(
                operating_rules,
                format!("Classify these entries (CSV: Id;Kind;Date;Text):\n\n{}", csv),
            ),
            json_response: true,
        };

        let raw = self.llm.complete(&request).await?;
        debug!(raw_len = raw.len(), "semantic report response received");
        let classification = validate_report(&raw, entries, self.policy).inspect_err(|e| {
            warn!(error = %e, payload = %excerpt(&raw), "rejected model report response");
        })?;
        info!(
            entries = entries.len(),
            placed = classification.item_count(),
            uncategorized = classification.uncategorized.len(),
            "semantic classification accepted"
        );
        Ok(classification)
    }

    /// Segment redacted transcript blocks. Returns one segment list per block, in order.
    pub async fn segment_blocks(
        &self,
        blocks: &[String],
        operating_rules: Option<&str>,
    ) -> Result<Vec<Vec<Segment>>, DomainError> {
        let mut body = String::from(
            "Segment the transcript blocks below. Quote each segment verbatim from its block \
             and keep segments in transcript order.\n",
        );
        for (i, block) in blocks.iter().enumerate() {
            body.push_str(&format!("\n### Block {}\n{}\n", i + 1, block));
        }
        let request = LlmRequest {
            system: segment_system_prompt(),
            user: with_rules(operating_rules, body),
            json_response: true,
        };

        let raw = self.llm.complete(&request).await?;
        debug!(raw_len = raw.len(), "semantic segment response received");
        let segments = validate_segments(&raw, blocks, self.policy).inspect_err(|e| {
            warn!(error = %e, payload = %excerpt(&raw), "rejected model segment response");
        })?;
        info!(
            blocks = blocks.len(),
            segments = segments.iter().map(Vec::len).sum::<usize>(),
            "semantic segmentation accepted"
        );
        Ok(segments)
    }
}

fn with_rules(operating_rules: Option<&str>, body: String) -> String {
    match operating_rules.map(str::trim).filter(|r| !r.is_empty()) {
        Some(rules) => format!("Organization operating rules:\n{}\n\n{}", rules, body),
        None => body,
    }
}

fn excerpt(raw: &str) -> String {
    raw.chars().take(200).collect()
}

/// System prompt for the report path. Keys and examples come from the taxonomy itself.
pub fn report_system_prompt() -> String {
    let mut p = String::from(
        "You classify activity records about a resident of a recovery residence into report sections.\n\n\
         ## Sections\n\
         Use ONLY these keys. Never invent, rename, or merge sections.\n",
    );
    for section in ReportSection::ALL {
        p.push_str(&format!(
            "- {} ({}): {}\n",
            section.key(),
            section.title(),
            section_guidance(section)
        ));
    }
    p.push_str("Entries that fit no section go in \"uncategorized\".\n\n## Worked examples\n");
    for (text, section, why) in REPORT_EXAMPLES {
        let target = section.map(ReportSection::key).unwrap_or("uncategorized");
        p.push_str(&format!("- \"{}\" -> {} ({})\n", text, target, why));
    }
    p.push_str(
        "\n## Output Format\n\
         You MUST respond with valid JSON only. No markdown, no explanations outside JSON.\n\
         Every entry Id must appear exactly once: in one section's items or in uncategorized.\n\
         Refer to entries by Id only. confidence is a number from 0 to 1.\n\n",
    );
    p.push_str(&report_skeleton());
    p
}

fn report_skeleton() -> String {
    let mut s = String::from("{\n");
    for section in ReportSection::ALL {
        s.push_str(&format!(
            "  \"{}\": {{\"items\": [{{\"id\": \"<entry id>\", \"confidence\": 0.8, \"reason\": \"short justification\"}}], \"summary\": \"one or two sentences\"}},\n",
            section.key()
        ));
    }
    s.push_str("  \"uncategorized\": [\"<entry id>\"],\n");
    s.push_str("  \"overallSummary\": \"two or three sentences about the whole period\"\n}\n");
    s
}

/// System prompt for the transcript path.
pub fn segment_system_prompt() -> String {
    let mut p = String::from(
        "You split house-meeting transcripts into consecutive segments and categorize each one.\n\n\
         ## Categories\n\
         Use ONLY these values. Never invent categories.\n",
    );
    for category in SegmentCategory::ALL {
        p.push_str(&format!("- {}: {}\n", category, category_guidance(category)));
    }
    p.push_str("\n## Worked examples\n");
    for (text, category, why) in SEGMENT_EXAMPLES {
        p.push_str(&format!("- \"{}\" -> {} ({})\n", text, category, why));
    }
    p.push_str(
        "\n## Output Format\n\
         You MUST respond with valid JSON only. No markdown, no explanations outside JSON.\n\
         Every block must yield at least one segment. Segment text must be copied verbatim.\n\n\
         {\"segments\": [{\"text\": \"verbatim excerpt\", \"category\": \"general\", \"confidence\": 0.8, \"reason\": \"short justification\"}]}\n",
    );
    p
}

fn checked_confidence(value: f64, what: &str) -> Result<f64, DomainError> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(DomainError::Validation(format!(
            "confidence {} out of range for {}",
            value, what
        )));
    }
    Ok(value.min(MODEL_CONFIDENCE_CEILING))
}

fn reason_or_default(reason: String) -> String {
    let trimmed = reason.trim();
    if trimmed.is_empty() {
        MODEL_REASON.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Look up a response id in the batch and mark it placed. Unknown or repeated ids fail.
fn claim<'e>(
    by_id: &HashMap<&'e str, &'e Entry>,
    seen: &mut HashSet<&'e str>,
    id: &str,
) -> Result<&'e Entry, DomainError> {
    let entry = by_id
        .get(id)
        .copied()
        .ok_or_else(|| DomainError::Validation(format!("unknown entry id {:?}", id)))?;
    if !seen.insert(entry.id.as_str()) {
        return Err(DomainError::Validation(format!(
            "entry id {:?} placed more than once",
            id
        )));
    }
    Ok(entry)
}

/// Validate a report response against `entries` and apply demotion.
/// Demoted items move to `uncategorized`; nothing is dropped.
pub fn validate_report(
    raw: &str,
    entries: &[Entry],
    policy: ConfidencePolicy,
) -> Result<Classification, DomainError> {
    let response: ReportResponse = serde_json::from_str(raw)
        .map_err(|e| DomainError::Validation(format!("report response: {}", e)))?;

    let by_id: HashMap<&str, &Entry> = entries.iter().map(|e| (e.id.as_str(), e)).collect();
    let mut seen: HashSet<&str> = HashSet::with_capacity(entries.len());

    let (sections, uncategorized, overall_summary) = response.into_parts();
    let mut classification = Classification::empty(RoutingMethod::Semantic);
    let mut demoted = 0usize;

    for (section, payload) in sections {
        let mut items = Vec::with_capacity(payload.items.len());
        for item in payload.items {
            let entry = claim(&by_id, &mut seen, &item.id)?;
            let confidence = checked_confidence(item.confidence, &item.id)?;
            if policy.is_low(confidence) {
                demoted += 1;
                classification.uncategorized.push(entry.id.clone());
                continue;
            }
            items.push(ClassifiedItem::from_entry(
                entry,
                section,
                confidence,
                reason_or_default(item.reason),
            ));
        }
        let block = classification.section_mut(section);
        block.items = items;
        block.summary = payload.summary.trim().to_string();
    }
    for id in uncategorized {
        let entry = claim(&by_id, &mut seen, &id)?;
        classification.uncategorized.push(entry.id.clone());
    }

    if seen.len() != entries.len() {
        return Err(DomainError::Validation(format!(
            "response placed {} of {} entries",
            seen.len(),
            entries.len()
        )));
    }
    if demoted > 0 {
        debug!(demoted, "low-confidence items demoted to uncategorized");
    }
    classification.overall_summary = overall_summary.trim().to_string();
    Ok(classification)
}

fn normalize_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Validate a segment response against the blocks it was asked about, assign each segment
/// to its block by verbatim position, and apply demotion. The segments must cover every
/// block end to end; skipped or reordered text rejects the whole response.
pub fn validate_segments(
    raw: &str,
    blocks: &[String],
    policy: ConfidencePolicy,
) -> Result<Vec<Vec<Segment>>, DomainError> {
    let response: SegmentResponse = serde_json::from_str(raw)
        .map_err(|e| DomainError::Validation(format!("segment response: {}", e)))?;
    if response.segments.is_empty() {
        return Err(DomainError::Validation("no segments returned".to_string()));
    }

    let haystacks: Vec<String> = blocks.iter().map(|b| normalize_ws(b)).collect();
    let mut out: Vec<Vec<Segment>> = vec![Vec::new(); blocks.len()];
    let (mut block_idx, mut offset) = (0usize, 0usize);

    for (n, payload) in response.segments.into_iter().enumerate() {
        let needle = normalize_ws(&payload.text);
        if needle.is_empty() {
            return Err(DomainError::Validation(format!("segment {} has empty text", n)));
        }
        let confidence = checked_confidence(payload.confidence, &format!("segment {}", n))?;

        // Segments tile the blocks: each one starts where the previous one ended.
        while block_idx < haystacks.len() && haystacks[block_idx][offset..].trim().is_empty() {
            block_idx += 1;
            offset = 0;
        }
        let Some(hay) = haystacks.get(block_idx) else {
            return Err(DomainError::Validation(format!(
                "segment {} runs past the end of the transcript",
                n
            )));
        };
        let rest = hay[offset..].trim_start();
        if !rest.starts_with(&needle) {
            return Err(DomainError::Validation(format!(
                "segment {} is not the next verbatim excerpt of block {} (text skipped or reordered)",
                n,
                block_idx + 1
            )));
        }
        offset = hay.len() - rest.len() + needle.len();

        out[block_idx].push(policy.demote_segment(Segment {
            text: needle,
            category: payload.category,
            confidence,
            reason: reason_or_default(payload.reason),
        }));
    }

    let tail_uncovered = haystacks
        .get(block_idx)
        .is_some_and(|hay| !hay[offset..].trim().is_empty());
    if tail_uncovered || block_idx + 1 < haystacks.len() {
        return Err(DomainError::Validation(format!(
            "segments stop before the end of block {}",
            block_idx + 1
        )));
    }
    if let Some(empty) = out.iter().position(Vec::is_empty) {
        return Err(DomainError::Validation(format!(
            "block {} received no segments",
            empty + 1
        )));
    }
    Ok(out)
}

/// A batch that cannot be serialized never reaches the model; the caller falls back to rules.
fn batch_error(e: csv::Error) -> DomainError {
    DomainError::Validation(format!("Failed to serialize entries: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ai::MockLlmAdapter;
    use crate::domain::taxonomy::LOW_CONFIDENCE_REASON;
    use crate::domain::{EntryId, SourceKind};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn entry(id: &str, text: &str) -> Entry {
        Entry {
            id: EntryId::from(id),
            source_kind: SourceKind::Note,
            text: text.to_string(),
            occurred_at: Utc.with_ymd_and_hms(2026, 3, 5, 8, 0, 0).unwrap(),
            tags: vec![],
            explicit_category: None,
        }
    }

    fn empty_section() -> serde_json::Value {
        json!({"items": [], "summary": ""})
    }

    fn report_json(sponsor_items: serde_json::Value, uncategorized: serde_json::Value) -> String {
        json!({
            "sponsor_mentor": {"items": sponsor_items, "summary": "Regular sponsor contact."},
            "work_school": empty_section(),
            "chores_compliance": empty_section(),
            "demeanor_participation": empty_section(),
            "professional_help": empty_section(),
            "uncategorized": uncategorized,
            "overallSummary": "Quiet, steady week."
        })
        .to_string()
    }

    fn batch() -> Vec<Entry> {
        vec![
            entry("e1", "Attended AA meeting with sponsor tonight"),
            entry("e2", "Watched a movie"),
        ]
    }

    #[test]
    fn test_valid_report_is_accepted() {
        let raw = report_json(
            json!([{"id": "e1", "confidence": 0.9, "reason": "sponsor"}]),
            json!(["e2"]),
        );
        let c = validate_report(&raw, &batch(), ConfidencePolicy::default()).unwrap();
        assert_eq!(c.method, RoutingMethod::Semantic);
        let sponsor = c.section(ReportSection::SponsorMentor).unwrap();
        assert_eq!(sponsor.items[0].text, "Attended AA meeting with sponsor tonight");
        assert_eq!(sponsor.summary, "Regular sponsor contact.");
        assert_eq!(c.uncategorized, vec![EntryId::from("e2")]);
        assert_eq!(c.overall_summary, "Quiet, steady week.");
        assert!(c.covers_exactly(batch().iter().map(|e| &e.id).collect::<Vec<_>>()));
    }

    #[test]
    fn test_low_confidence_items_are_demoted_not_dropped() {
        let raw = report_json(
            json!([{"id": "e1", "confidence": 0.4, "reason": "maybe"}]),
            json!(["e2"]),
        );
        let c = validate_report(&raw, &batch(), ConfidencePolicy::default()).unwrap();
        assert!(c.section(ReportSection::SponsorMentor).unwrap().items.is_empty());
        assert!(c.uncategorized.contains(&EntryId::from("e1")));
        assert_eq!(c.uncategorized.len(), 2);
    }

    #[test]
    fn test_model_confidence_never_reaches_explicit_value() {
        let raw = report_json(
            json!([{"id": "e1", "confidence": 1.0, "reason": "certain"}]),
            json!(["e2"]),
        );
        let c = validate_report(&raw, &batch(), ConfidencePolicy::default()).unwrap();
        let item = &c.section(ReportSection::SponsorMentor).unwrap().items[0];
        assert_eq!(item.confidence, MODEL_CONFIDENCE_CEILING);
    }

    #[test]
    fn test_malformed_reports_are_rejected_whole() {
        let policy = ConfidencePolicy::default();
        let cases = vec![
            ("not json", "not json".to_string()),
            (
                "unknown id",
                report_json(json!([{"id": "e9", "confidence": 0.9, "reason": "x"}]), json!(["e1", "e2"])),
            ),
            (
                "duplicate id",
                report_json(json!([{"id": "e1", "confidence": 0.9, "reason": "x"}]), json!(["e1", "e2"])),
            ),
            (
                "omitted id",
                report_json(json!([{"id": "e1", "confidence": 0.9, "reason": "x"}]), json!([])),
            ),
            (
                "confidence range",
                report_json(json!([{"id": "e1", "confidence": 1.5, "reason": "x"}]), json!(["e2"])),
            ),
            (
                "invented section",
                json!({
                    "sponsor_mentor": empty_section(),
                    "work_school": empty_section(),
                    "chores_compliance": empty_section(),
                    "demeanor_participation": empty_section(),
                    "professional_help": empty_section(),
                    "hobbies": {"items": [{"id": "e1", "confidence": 0.9, "reason": "x"}], "summary": ""},
                    "uncategorized": ["e2"],
                    "overallSummary": ""
                })
                .to_string(),
            ),
            (
                "missing section",
                json!({
                    "sponsor_mentor": empty_section(),
                    "uncategorized": ["e1", "e2"],
                    "overallSummary": ""
                })
                .to_string(),
            ),
        ];
        for (name, raw) in cases {
            let err = validate_report(&raw, &batch(), policy).unwrap_err();
            assert!(
                matches!(err, DomainError::Validation(_)),
                "{name}: expected validation error, got {err:?}"
            );
        }
    }

    #[test]
    fn test_prompt_skeleton_matches_schema() {
        // The example shape in the prompt must itself parse once ids are real.
        let skeleton = report_skeleton().replace("<entry id>", "e1");
        let parsed: Result<ReportResponse, _> = serde_json::from_str(&skeleton);
        assert!(parsed.is_ok(), "{parsed:?}");
    }

    #[test]
    fn test_prompts_name_every_value_and_example() {
        let report = report_system_prompt();
        for section in ReportSection::ALL {
            assert!(report.contains(section.key()));
            assert!(REPORT_EXAMPLES.iter().any(|(_, s, _)| *s == Some(section)));
        }
        assert!(REPORT_EXAMPLES.iter().any(|(_, _, why)| why.starts_with("ambiguous")));

        let segment = segment_system_prompt();
        for category in SegmentCategory::ALL {
            assert!(segment.contains(category.as_str()));
            assert!(SEGMENT_EXAMPLES.iter().any(|(_, c, _)| *c == category));
        }
        assert!(SEGMENT_EXAMPLES.iter().any(|(_, _, why)| why.starts_with("ambiguous")));
    }

    #[test]
    fn test_segments_assigned_to_blocks_in_order() {
        let blocks = vec![
            "I called my sponsor.  Then I\nwent to work.".to_string(),
            "Chores got done.".to_string(),
        ];
        let raw = json!({"segments": [
            {"text": "I called my sponsor.", "category": "sponsor", "confidence": 0.9, "reason": "sponsor"},
            {"text": "Then I went to work.", "category": "work_school", "confidence": 0.5, "reason": "work"},
            {"text": "Chores got done.", "category": "chores", "confidence": 0.8, "reason": "chores"}
        ]})
        .to_string();
        let out = validate_segments(&raw, &blocks, ConfidencePolicy::default()).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].len(), 2);
        assert_eq!(out[0][1].category, SegmentCategory::General);
        assert_eq!(out[0][1].reason, LOW_CONFIDENCE_REASON);
        assert_eq!(out[1][0].category, SegmentCategory::Chores);
    }

    #[test]
    fn test_bad_segments_are_rejected() {
        let blocks = vec!["I called my sponsor. Then I went to work.".to_string()];
        let policy = ConfidencePolicy::default();
        let cases = vec![
            json!({"segments": []}),
            json!({"segments": [{"text": "I called my sponsor.", "category": "hobbies", "confidence": 0.9, "reason": "x"}]}),
            json!({"segments": [{"text": "I called my mentor.", "category": "sponsor", "confidence": 0.9, "reason": "x"}]}),
            json!({"segments": [
                {"text": "Then I went to work.", "category": "work_school", "confidence": 0.9, "reason": "x"},
                {"text": "I called my sponsor.", "category": "sponsor", "confidence": 0.9, "reason": "x"}
            ]}),
            json!({"segments": [{"text": "I called my sponsor.", "category": "sponsor", "confidence": -0.1, "reason": "x"}]}),
            json!({"segments": [{"text": "I called my sponsor.", "category": "sponsor", "reason": "x"}]}),
            json!([{"text": "I called my sponsor.", "category": "sponsor", "confidence": 0.9, "reason": "x"}]),
        ];
        for raw in cases {
            let err = validate_segments(&raw.to_string(), &blocks, policy).unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)), "{raw}: {err:?}");
        }

        let two_blocks = vec![blocks[0].clone(), "Chores got done.".to_string()];
        let raw = json!({"segments": [
            {"text": "I called my sponsor.", "category": "sponsor", "confidence": 0.9, "reason": "x"}
        ]});
        assert!(validate_segments(&raw.to_string(), &two_blocks, policy).is_err());
    }

    #[test]
    fn test_skipped_text_is_rejected() {
        let blocks = vec![
            "I called my sponsor. Then I relapsed on Friday and missed curfew. He threatened staff."
                .to_string(),
        ];
        let policy = ConfidencePolicy::default();
        let head_only = json!({"segments": [
            {"text": "I called my sponsor.", "category": "sponsor", "confidence": 0.9, "reason": "x"}
        ]});
        let middle_gap = json!({"segments": [
            {"text": "I called my sponsor.", "category": "sponsor", "confidence": 0.9, "reason": "x"},
            {"text": "He threatened staff.", "category": "demeanor", "confidence": 0.9, "reason": "x"}
        ]});
        let leading_gap = json!({"segments": [
            {"text": "He threatened staff.", "category": "demeanor", "confidence": 0.9, "reason": "x"}
        ]});
        for raw in [head_only, middle_gap, leading_gap] {
            let err = validate_segments(&raw.to_string(), &blocks, policy).unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)), "{raw}: {err:?}");
        }

        let full = json!({"segments": [
            {"text": "I called my sponsor.", "category": "sponsor", "confidence": 0.9, "reason": "x"},
            {"text": "Then I relapsed on Friday and missed curfew.", "category": "chores", "confidence": 0.8, "reason": "x"},
            {"text": "He threatened staff.", "category": "demeanor", "confidence": 0.9, "reason": "x"}
        ]});
        let out = validate_segments(&full.to_string(), &blocks, policy).unwrap();
        assert_eq!(out[0].len(), 3);
    }

    #[tokio::test]
    async fn test_segment_blocks_rejects_partial_cover() {
        let raw = json!({"segments": [
            {"text": "I called my sponsor.", "category": "sponsor", "confidence": 0.9, "reason": "x"}
        ]})
        .to_string();
        let llm = Arc::new(MockLlmAdapter::responding(raw));
        let classifier = SemanticClassifier::new(llm.clone(), ConfidencePolicy::default());
        let blocks = vec!["I called my sponsor. Then I relapsed on Friday.".to_string()];
        let err = classifier.segment_blocks(&blocks, None).await.unwrap_err();
        assert!(err.is_classifier_failure());
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_classify_entries_sends_one_prompt_with_rules() {
        let raw = report_json(
            json!([{"id": "e1", "confidence": 0.9, "reason": "sponsor"}]),
            json!(["e2"]),
        );
        let llm = Arc::new(MockLlmAdapter::responding(raw));
        let classifier = SemanticClassifier::new(llm.clone(), ConfidencePolicy::default());
        let c = classifier
            .classify_entries(&batch(), Some("No phones after 10pm."))
            .await
            .unwrap();
        assert_eq!(c.item_count(), 1);
        assert_eq!(llm.calls(), 1);

        let request = llm.last_request().unwrap();
        assert!(request.json_response);
        assert!(request.user.starts_with("Organization operating rules:\nNo phones after 10pm."));
        assert!(request.user.contains("e1;note;2026-03-05 08:00;Attended AA meeting"));
    }

    #[tokio::test]
    async fn test_malformed_response_is_not_retried() {
        let llm = Arc::new(MockLlmAdapter::responding("{\"oops\": true}"));
        let classifier = SemanticClassifier::new(llm.clone(), ConfidencePolicy::default());
        let err = classifier.classify_entries(&batch(), None).await.unwrap_err();
        assert!(err.is_classifier_failure());
        assert_eq!(llm.calls(), 1);
    }

    #[test]
    fn test_unserializable_batch_triggers_fallback() {
        let err = batch_error(csv::Error::from(std::io::Error::other("writer closed")));
        assert!(matches!(err, DomainError::Validation(_)));
        assert!(err.is_classifier_failure());
    }
}
