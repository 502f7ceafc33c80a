//! Report service. Orchestrates the report-synthesis pipeline.
//!
//! Flow: fetch entries -> period filter -> redact -> explicit-label router -> semantic
//! classifier (keyword rules when the model fails) -> merge -> correction pass -> compose -> store.
//! The caller always gets a complete document when the input is valid.

use crate::domain::{
    Classification, CorrectionPass, DomainError, Entry, EntryId, ReportComposer, ReportPeriod,
    RoutingMethod, RuleClassifier, redact_entry, route_explicit,
};
use crate::ports::{EntrySourcePort, PolicyPort, ReportSinkPort};
use crate::usecases::semantic::SemanticClassifier;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Everything produced by one report run.
#[derive(Debug)]
pub struct ReportOutcome {
    pub classification: Classification,
    pub document: String,
    pub path: PathBuf,
}

/// Service for classified progress reports.
pub struct ReportService {
    semantic: Arc<SemanticClassifier>,
    rules: RuleClassifier,
    correction: CorrectionPass,
    composer: ReportComposer,
    source: Arc<dyn EntrySourcePort>,
    policy: Arc<dyn PolicyPort>,
    sink: Arc<dyn ReportSinkPort>,
}

impl ReportService {
    /// Create a new report service.
    ///
    /// # Arguments
    /// * `semantic` - Model-backed classifier (shared with the transcript path)
    /// * `rules` - Keyword fallback
    /// * `correction` - Employment-fact correction pass
    /// * `composer` - Markdown renderer
    /// * `source` / `policy` / `sink` - Record fetch, operating rules, and report storage ports
    pub fn new(
        semantic: Arc<SemanticClassifier>,
        rules: RuleClassifier,
        correction: CorrectionPass,
        composer: ReportComposer,
        source: Arc<dyn EntrySourcePort>,
        policy: Arc<dyn PolicyPort>,
        sink: Arc<dyn ReportSinkPort>,
    ) -> Self {
        Self {
            semantic,
            rules,
            correction,
            composer,
            source,
            policy,
            sink,
        }
    }

    /// Fetch, classify, compose, and store the report for one resident and period.
    pub async fn generate_report(
        &self,
        resident_id: &str,
        period: &ReportPeriod,
    ) -> Result<ReportOutcome, DomainError> {
        let mut entries = self.source.fetch_entries(resident_id, period).await?;
        let fetched = entries.len();
        // Only keep entries inside the window even if the source was generous.
        entries.retain(|e| period.contains(e.occurred_at));
        info!(
            resident = resident_id,
            period = %period,
            fetched,
            in_period = entries.len(),
            "building report"
        );

        let classification = self.classify(entries).await?;
        let document = self.composer.compose(period, &classification);
        let path = self.sink.save_report(resident_id, period, &document).await?;

        info!(
            resident = resident_id,
            path = %path.display(),
            method = ?classification.method,
            "report generated"
        );
        Ok(ReportOutcome {
            classification,
            document,
            path,
        })
    }

    /// Classify a batch into the five report sections. Never fails because of the model;
    /// only a malformed batch (duplicate ids) is rejected.
    pub async fn classify(&self, entries: Vec<Entry>) -> Result<Classification, DomainError> {
        ensure_unique_ids(&entries)?;
        let expected: Vec<EntryId> = entries.iter().map(|e| e.id.clone()).collect();
        let recency: HashMap<EntryId, DateTime<Utc>> = entries
            .iter()
            .map(|e| (e.id.clone(), e.occurred_at))
            .collect();

        let redacted: Vec<Entry> = entries.iter().map(redact_entry).collect();
        let routed = route_explicit(redacted);
        info!(
            entries = expected.len(),
            labeled = routed.labeled.len(),
            unlabeled = routed.unlabeled.len(),
            "explicit labels routed"
        );

        let mut classification = if routed.unlabeled.is_empty() {
            Classification::empty(RoutingMethod::ExplicitOnly)
        } else {
            let rules = self.operating_rules().await;
            match self
                .semantic
                .classify_entries(&routed.unlabeled, rules.as_deref())
                .await
            {
                Ok(c) => c,
                Err(e) if e.is_classifier_failure() => {
                    warn!(error = %e, entries = routed.unlabeled.len(), "semantic classifier failed, falling back to keyword rules");
                    self.rules.classify_entries(&routed.unlabeled)
                }
                Err(e) => return Err(e),
            }
        };

        for item in routed.labeled {
            classification.push_item(item);
        }
        if classification.method == RoutingMethod::RuleBased {
            RuleClassifier::summarize(&mut classification);
        }
        let mut classification = self.correction.correct(classification);

        classification.sort_by_recency();
        classification.uncategorized.sort_by(|a, b| {
            recency
                .get(b)
                .cmp(&recency.get(a))
                .then_with(|| a.cmp(b))
        });

        debug_assert!(
            classification.covers_exactly(&expected),
            "classification must place every entry exactly once"
        );
        Ok(classification)
    }

    /// Render without storing.
    pub fn compose(&self, period: &ReportPeriod, classification: &Classification) -> String {
        self.composer.compose(period, classification)
    }

    async fn operating_rules(&self) -> Option<String> {
        match self.policy.operating_rules().await {
            Ok(rules) => rules,
            Err(e) => {
                warn!(error = %e, "operating rules unavailable, classifying without them");
                None
            }
        }
    }
}

fn ensure_unique_ids(entries: &[Entry]) -> Result<(), DomainError> {
    let mut seen = HashSet::with_capacity(entries.len());
    for entry in entries {
        if !seen.insert(&entry.id) {
            return Err(DomainError::Input(format!(
                "duplicate entry id {} in batch",
                entry.id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ai::MockLlmAdapter;
    use crate::domain::{ConfidencePolicy, ReportSection, SourceKind};
    use crate::ports::LlmPort;
    use chrono::{NaiveDate, TimeZone};
    use serde_json::json;
    use std::sync::Mutex;

    struct MemorySource(Vec<Entry>);

    #[async_trait::async_trait]
    impl EntrySourcePort for MemorySource {
        async fn fetch_entries(
            &self,
            _resident_id: &str,
            _period: &ReportPeriod,
        ) -> Result<Vec<Entry>, DomainError> {
            Ok(self.0.clone())
        }
    }

    struct FixedPolicy(Option<String>);

    #[async_trait::async_trait]
    impl PolicyPort for FixedPolicy {
        async fn operating_rules(&self) -> Result<Option<String>, DomainError> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct MemorySink(Mutex<Vec<String>>);

    #[async_trait::async_trait]
    impl ReportSinkPort for MemorySink {
        async fn save_report(
            &self,
            resident_id: &str,
            _period: &ReportPeriod,
            document: &str,
        ) -> Result<PathBuf, DomainError> {
            self.0
                .lock()
                .map_err(|e| DomainError::Repo(e.to_string()))?
                .push(document.to_string());
            Ok(PathBuf::from(format!("{resident_id}.md")))
        }

        async fn save_segments(
            &self,
            name: &str,
            _result: &crate::domain::SegmentResult,
        ) -> Result<PathBuf, DomainError> {
            Ok(PathBuf::from(format!("{name}.json")))
        }
    }

    fn entry(id: &str, day: u32, text: &str, label: Option<&str>) -> Entry {
        Entry {
            id: EntryId::from(id),
            source_kind: SourceKind::Note,
            text: text.to_string(),
            occurred_at: Utc.with_ymd_and_hms(2026, 3, day, 9, 0, 0).unwrap(),
            tags: vec![],
            explicit_category: label.map(String::from),
        }
    }

    fn service_with(llm: Arc<dyn LlmPort>, entries: Vec<Entry>) -> (ReportService, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::default());
        let service = ReportService::new(
            Arc::new(SemanticClassifier::new(llm, ConfidencePolicy::default())),
            RuleClassifier::default(),
            CorrectionPass::default(),
            ReportComposer::default(),
            Arc::new(MemorySource(entries)),
            Arc::new(FixedPolicy(None)),
            sink.clone(),
        );
        (service, sink)
    }

    fn period() -> ReportPeriod {
        ReportPeriod::new(
            NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 3, 31).unwrap(),
        )
        .unwrap()
    }

    fn batch() -> Vec<Entry> {
        vec![
            entry("e1", 2, "Dishes done, curfew met", Some("chores")),
            entry("e2", 3, "Attended AA meeting with sponsor tonight", None),
            entry("e3", 4, "Self-reported job at a warehouse", None),
            entry("e4", 5, "Watched a movie, call 555-123-4567", None),
        ]
    }

    #[tokio::test]
    async fn test_fallback_when_model_unavailable() {
        let llm = Arc::new(MockLlmAdapter::unavailable());
        let (service, _) = service_with(llm.clone(), vec![]);
        let c = service.classify(batch()).await.unwrap();

        assert_eq!(c.method, RoutingMethod::RuleBased);
        assert_eq!(llm.calls(), 1);
        assert!(c.covers_exactly(&batch().iter().map(|e| e.id.clone()).collect::<Vec<_>>()));

        let chores = &c.section(ReportSection::ChoresCompliance).unwrap().items;
        assert_eq!(chores[0].confidence, 1.0);
        assert_eq!(chores[0].reason, "user-assigned");
        let sponsor = &c.section(ReportSection::SponsorMentor).unwrap().items;
        assert_eq!(sponsor[0].entry_id, EntryId::from("e2"));
        assert_eq!(c.uncategorized, vec![EntryId::from("e4")]);
        assert!(
            c.overall_summary.contains("3 of 4 entries placed in a section; 1 uncategorized."),
            "{}",
            c.overall_summary
        );
        assert_eq!(
            c.section(ReportSection::ChoresCompliance).unwrap().summary,
            "1 entry was explicitly labeled."
        );
    }

    #[tokio::test]
    async fn test_fallback_runs_are_identical() {
        let (service, _) = service_with(Arc::new(MockLlmAdapter::unavailable()), vec![]);
        let first = service.classify(batch()).await.unwrap();
        let second = service.classify(batch()).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_explicit_label_beats_model() {
        // The model tries to claim e1 for another section; e1 never reaches it.
        let raw = json!({
            "sponsor_mentor": {"items": [{"id": "e2", "confidence": 0.9, "reason": "aa"}], "summary": "Sponsor work."},
            "work_school": {"items": [], "summary": ""},
            "chores_compliance": {"items": [], "summary": ""},
            "demeanor_participation": {"items": [{"id": "e3", "confidence": 0.5, "reason": "self report"}], "summary": ""},
            "professional_help": {"items": [], "summary": ""},
            "uncategorized": ["e4"],
            "overallSummary": "Good month."
        })
        .to_string();
        let llm = Arc::new(MockLlmAdapter::responding(raw));
        let (service, _) = service_with(llm.clone(), vec![]);
        let c = service.classify(batch()).await.unwrap();

        assert_eq!(c.method, RoutingMethod::Semantic);
        let prompt = llm.last_request().unwrap().user;
        assert!(!prompt.contains("Dishes done"));
        assert!(prompt.contains("[PHONE]"));
        assert!(!prompt.contains("555-123-4567"));

        let chores = c.section(ReportSection::ChoresCompliance).unwrap();
        assert_eq!(chores.items[0].entry_id, EntryId::from("e1"));
        assert_eq!(chores.items[0].confidence, 1.0);
        // e3 was demoted below 0.6 by the threshold, so it stays uncategorized.
        assert!(c.uncategorized.contains(&EntryId::from("e3")));
        assert!(c.covers_exactly(&batch().iter().map(|e| e.id.clone()).collect::<Vec<_>>()));
    }

    #[tokio::test]
    async fn test_correction_runs_after_semantic_merge() {
        let raw = json!({
            "sponsor_mentor": {"items": [{"id": "e2", "confidence": 0.9, "reason": "aa"}], "summary": ""},
            "work_school": {"items": [], "summary": ""},
            "chores_compliance": {"items": [], "summary": ""},
            "demeanor_participation": {"items": [{"id": "e3", "confidence": 0.7, "reason": "self report"}], "summary": ""},
            "professional_help": {"items": [], "summary": ""},
            "uncategorized": ["e4"],
            "overallSummary": ""
        })
        .to_string();
        let (service, _) = service_with(Arc::new(MockLlmAdapter::responding(raw)), vec![]);
        let c = service.classify(batch()).await.unwrap();
        let work = c.section(ReportSection::WorkSchool).unwrap();
        assert_eq!(work.items[0].entry_id, EntryId::from("e3"));
        assert!(work.items[0].confidence >= 0.85);
        assert!(c.section(ReportSection::DemeanorParticipation).unwrap().items.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_ids_rejected() {
        let (service, _) = service_with(Arc::new(MockLlmAdapter::unavailable()), vec![]);
        let mut entries = batch();
        entries.push(entry("e2", 6, "again", None));
        assert!(matches!(
            service.classify(entries).await,
            Err(DomainError::Input(_))
        ));
    }

    #[tokio::test]
    async fn test_all_labeled_skips_model() {
        let llm = Arc::new(MockLlmAdapter::unavailable());
        let (service, _) = service_with(llm.clone(), vec![]);
        let c = service
            .classify(vec![entry("e1", 2, "Dishes done, curfew met", Some("chores"))])
            .await
            .unwrap();
        assert_eq!(c.method, RoutingMethod::ExplicitOnly);
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_generate_report_filters_period_and_stores() {
        let mut entries = batch();
        entries.push(Entry {
            occurred_at: Utc.with_ymd_and_hms(2026, 4, 2, 9, 0, 0).unwrap(),
            ..entry("late", 1, "Called sponsor", None)
        });
        let (service, sink) = service_with(Arc::new(MockLlmAdapter::unavailable()), entries);
        let outcome = service.generate_report("r-17", &period()).await.unwrap();

        assert_eq!(outcome.path, PathBuf::from("r-17.md"));
        assert!(outcome.classification.find_item(&EntryId::from("late")).is_none());
        assert!(!outcome.classification.uncategorized.contains(&EntryId::from("late")));
        assert!(outcome.document.contains("**Period:** 2026-03-01 to 2026-03-31"));
        assert!(outcome.document.contains("1 entry could not be categorized: e4"));
        let stored = sink.0.lock().unwrap();
        assert_eq!(stored.as_slice(), [outcome.document.clone()]);
    }

    #[tokio::test]
    async fn test_empty_batch_still_composes() {
        let (service, _) = service_with(Arc::new(MockLlmAdapter::unavailable()), vec![]);
        let outcome = service.generate_report("r-1", &period()).await.unwrap();
        assert!(outcome.document.contains("All entries were categorized."));
        assert_eq!(outcome.classification.method, RoutingMethod::ExplicitOnly);
    }
}
