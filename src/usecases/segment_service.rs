//! Segment service. Splits a house-meeting transcript into categorized segments.
//!
//! Flow: redact -> bracket labels -> semantic segmentation of the unlabeled blocks
//! (sentence keyword rules when the model fails) -> reassemble in transcript order.

use crate::domain::{
    DomainError, RoutingMethod, RuleClassifier, Segment, SegmentResult, TranscriptPart, redact,
    split_labeled_fragments,
};
use crate::ports::{PolicyPort, ReportSinkPort};
use crate::usecases::semantic::SemanticClassifier;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Service for transcript segmentation.
pub struct SegmentService {
    semantic: Arc<SemanticClassifier>,
    rules: RuleClassifier,
    policy: Arc<dyn PolicyPort>,
    sink: Arc<dyn ReportSinkPort>,
}

impl SegmentService {
    pub fn new(
        semantic: Arc<SemanticClassifier>,
        rules: RuleClassifier,
        policy: Arc<dyn PolicyPort>,
        sink: Arc<dyn ReportSinkPort>,
    ) -> Self {
        Self {
            semantic,
            rules,
            policy,
            sink,
        }
    }

    /// Segment and persist under `name`. Returns the result and where it was written.
    pub async fn segment_and_store(
        &self,
        name: &str,
        transcript: &str,
    ) -> Result<(SegmentResult, PathBuf), DomainError> {
        let result = self.segment_transcript(transcript).await?;
        let path = self.sink.save_segments(name, &result).await?;
        info!(name, path = %path.display(), segments = result.segments.len(), "segments stored");
        Ok((result, path))
    }

    /// Segment a transcript. Empty input is rejected; model failures fall back to rules.
    pub async fn segment_transcript(&self, transcript: &str) -> Result<SegmentResult, DomainError> {
        if transcript.trim().is_empty() {
            return Err(DomainError::Input("transcript is empty".to_string()));
        }

        let parts = split_labeled_fragments(&redact(transcript));
        let blocks: Vec<String> = parts
            .iter()
            .filter_map(|p| match p {
                TranscriptPart::Unlabeled(text) => Some(text.clone()),
                TranscriptPart::Labeled(_) => None,
            })
            .collect();
        info!(
            parts = parts.len(),
            unlabeled_blocks = blocks.len(),
            "transcript split"
        );

        let (mut per_block, method) = if blocks.is_empty() {
            (Vec::new(), RoutingMethod::ExplicitOnly)
        } else {
            let rules = self.operating_rules().await;
            match self.semantic.segment_blocks(&blocks, rules.as_deref()).await {
                Ok(segments) => (segments, RoutingMethod::Semantic),
                Err(e) if e.is_classifier_failure() => {
                    warn!(error = %e, blocks = blocks.len(), "semantic segmentation failed, falling back to keyword rules");
                    let segments = blocks.iter().map(|b| self.rules.segment(b)).collect();
                    (segments, RoutingMethod::RuleBased)
                }
                Err(e) => return Err(e),
            }
        };

        // Blocks come back in the order they were sent; drain them in the same order.
        per_block.reverse();
        let mut segments: Vec<Segment> = Vec::new();
        for part in parts {
            match part {
                TranscriptPart::Labeled(segment) => segments.push(segment),
                TranscriptPart::Unlabeled(_) => {
                    if let Some(block) = per_block.pop() {
                        segments.extend(block);
                    }
                }
            }
        }

        Ok(SegmentResult { segments, method })
    }

    async fn operating_rules(&self) -> Option<String> {
        match self.policy.operating_rules().await {
            Ok(rules) => rules,
            Err(e) => {
                warn!(error = %e, "operating rules unavailable, segmenting without them");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ai::MockLlmAdapter;
    use crate::domain::{ConfidencePolicy, ReportPeriod, SegmentCategory};
    use crate::ports::LlmPort;
    use serde_json::json;

    struct NoRules;

    #[async_trait::async_trait]
    impl PolicyPort for NoRules {
        async fn operating_rules(&self) -> Result<Option<String>, DomainError> {
            Err(DomainError::Repo("rules file unreadable".to_string()))
        }
    }

    struct NullSink;

    #[async_trait::async_trait]
    impl ReportSinkPort for NullSink {
        async fn save_report(
            &self,
            _resident_id: &str,
            _period: &ReportPeriod,
            _document: &str,
        ) -> Result<PathBuf, DomainError> {
            Ok(PathBuf::from("report.md"))
        }

        async fn save_segments(
            &self,
            name: &str,
            _result: &SegmentResult,
        ) -> Result<PathBuf, DomainError> {
            Ok(PathBuf::from(format!("segments_{name}.json")))
        }
    }

    fn service(llm: Arc<dyn LlmPort>) -> SegmentService {
        SegmentService::new(
            Arc::new(SemanticClassifier::new(llm, ConfidencePolicy::default())),
            RuleClassifier::default(),
            Arc::new(NoRules),
            Arc::new(NullSink),
        )
    }

    const TRANSCRIPT: &str = "I called my sponsor. Then I went to work.\n\n\
                              [chores] Kitchen is spotless.\n\n\
                              The weather was nice.";

    #[tokio::test]
    async fn test_empty_transcript_rejected() {
        let llm = Arc::new(MockLlmAdapter::unavailable());
        let svc = service(llm.clone());
        assert!(matches!(
            svc.segment_transcript("  \n\n ").await,
            Err(DomainError::Input(_))
        ));
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_semantic_segments_keep_transcript_order() {
        let raw = json!({"segments": [
            {"text": "I called my sponsor.", "category": "sponsor", "confidence": 0.9, "reason": "sponsor call"},
            {"text": "Then I went to work.", "category": "work_school", "confidence": 0.8, "reason": "work"},
            {"text": "The weather was nice.", "category": "general", "confidence": 0.7, "reason": "small talk"}
        ]})
        .to_string();
        let llm = Arc::new(MockLlmAdapter::responding(raw));
        let result = service(llm.clone()).segment_transcript(TRANSCRIPT).await.unwrap();

        assert_eq!(result.method, RoutingMethod::Semantic);
        assert_eq!(llm.calls(), 1);
        assert!(!llm.last_request().unwrap().user.contains("Kitchen is spotless"));

        let categories: Vec<SegmentCategory> = result.segments.iter().map(|s| s.category).collect();
        assert_eq!(
            categories,
            vec![
                SegmentCategory::Sponsor,
                SegmentCategory::WorkSchool,
                SegmentCategory::Chores,
                SegmentCategory::General,
            ]
        );
        assert_eq!(result.segments[2].confidence, 1.0);
        assert_eq!(result.segments[2].text, "Kitchen is spotless.");
    }

    #[tokio::test]
    async fn test_fallback_on_invalid_response() {
        let llm = Arc::new(MockLlmAdapter::responding(r#"{"segments": "nope"}"#.to_string()));
        let result = service(llm.clone()).segment_transcript(TRANSCRIPT).await.unwrap();

        assert_eq!(result.method, RoutingMethod::RuleBased);
        assert_eq!(llm.calls(), 1);
        assert_eq!(result.segments[0].category, SegmentCategory::Sponsor);
        assert_eq!(result.segments[1].category, SegmentCategory::WorkSchool);
        assert_eq!(result.segments[2].category, SegmentCategory::Chores);
        assert_eq!(result.segments.last().unwrap().category, SegmentCategory::General);
    }

    #[tokio::test]
    async fn test_fully_labeled_transcript_skips_model() {
        let llm = Arc::new(MockLlmAdapter::unavailable());
        let result = service(llm.clone())
            .segment_transcript("[sponsor] Met my sponsor for coffee.\n\n[medical] Saw the dentist.")
            .await
            .unwrap();
        assert_eq!(result.method, RoutingMethod::ExplicitOnly);
        assert_eq!(llm.calls(), 0);
        assert_eq!(result.segments.len(), 2);
        assert!(result.segments.iter().all(|s| s.reason == "user-assigned"));
    }

    #[tokio::test]
    async fn test_transcript_is_redacted_before_model() {
        let llm = Arc::new(MockLlmAdapter::unavailable());
        let svc = service(llm.clone());
        let result = svc
            .segment_transcript("Text me at 555-867-5309 about the shift.")
            .await
            .unwrap();
        assert!(!llm.last_request().unwrap().user.contains("555-867-5309"));
        assert!(result.segments[0].text.contains("[PHONE]"));
    }

    #[tokio::test]
    async fn test_punctuation_only_transcript_is_not_dropped() {
        let result = service(Arc::new(MockLlmAdapter::unavailable()))
            .segment_transcript("...")
            .await
            .unwrap();
        assert_eq!(result.method, RoutingMethod::RuleBased);
        assert_eq!(result.segments.len(), 1);
        assert_eq!(result.segments[0].text, "...");
        assert_eq!(result.segments[0].category, SegmentCategory::General);
    }

    #[tokio::test]
    async fn test_segment_and_store_returns_path() {
        let svc = service(Arc::new(MockLlmAdapter::unavailable()));
        let (result, path) = svc.segment_and_store("week12", TRANSCRIPT).await.unwrap();
        assert_eq!(path, PathBuf::from("segments_week12.json"));
        assert!(!result.segments.is_empty());
    }
}
