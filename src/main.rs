//! Wiring & DI. Entry point: bootstrap adapters, inject into services, run UI.
//! No business logic here.

use dotenv::dotenv;
use resident_digest::adapters::ai::{MockLlmAdapter, OpenAiAdapter};
use resident_digest::adapters::persistence::FsStore;
use resident_digest::adapters::ui::tui::TuiInputPort;
use resident_digest::domain::{CorrectionPass, ReportComposer, RuleClassifier};
use resident_digest::ports::{EntrySourcePort, InputPort, LlmPort, PolicyPort, ReportSinkPort};
use resident_digest::shared::config::{AiProvider, AppConfig};
use resident_digest::usecases::{ReportService, SegmentService, SemanticClassifier};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let env_loaded = dotenv();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match &env_loaded {
        Ok(path) => info!(path = %path.display(), "loaded .env"),
        Err(_) => info!(cwd = %cwd.display(), "no .env found (check CWD)"),
    }

    resident_digest::adapters::ui::init_ui();

    let cfg = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "config could not be loaded, using defaults");
        AppConfig::default()
    });

    let data_dir = cfg.data_dir_or_default();
    let reports_dir = cfg.reports_dir_or_default();
    info!(
        data = %data_dir.display(),
        reports = %reports_dir.display(),
        rules = ?cfg.rules_path(),
        "storage paths"
    );

    // --- Language model: resolved once, shared by both pipelines ---
    let provider = cfg.ai_provider().map_err(|e| anyhow::anyhow!("{}", e))?;
    let llm: Arc<dyn LlmPort> = match provider {
        AiProvider::OpenAi | AiProvider::Ollama => {
            let url = cfg.ai_api_url_or_default(provider);
            let model = cfg.ai_model_or_default(provider);
            info!(?provider, %model, %url, "semantic classification enabled");
            Arc::new(OpenAiAdapter::new(
                url,
                cfg.ai_api_key().unwrap_or_default(),
                model,
                Duration::from_secs(cfg.ai_timeout_secs_or_default()),
            ))
        }
        AiProvider::Disabled => {
            warn!("no language model configured (DIGEST_AI_API_KEY / DIGEST_AI_PROVIDER), keyword rules only");
            Arc::new(MockLlmAdapter::unavailable())
        }
    };

    // --- Storage: one filesystem adapter behind three ports ---
    let store = Arc::new(FsStore::new(&data_dir, &reports_dir, cfg.rules_path()));
    let source: Arc<dyn EntrySourcePort> = Arc::clone(&store) as Arc<dyn EntrySourcePort>;
    let policy: Arc<dyn PolicyPort> = Arc::clone(&store) as Arc<dyn PolicyPort>;
    let sink: Arc<dyn ReportSinkPort> = store;

    // --- Services ---
    let confidence = cfg.confidence_policy();
    let rules = RuleClassifier::new(cfg.rule_confidence_or_default());
    let semantic = Arc::new(SemanticClassifier::new(llm, confidence));
    info!(
        min_confidence = confidence.min_confidence(),
        rule_confidence = rules.confidence(),
        "classification thresholds"
    );

    let report_service = Arc::new(ReportService::new(
        Arc::clone(&semantic),
        rules,
        CorrectionPass::new(cfg.correction_policy()),
        ReportComposer::new(cfg.excerpt_chars_or_default()),
        source,
        Arc::clone(&policy),
        Arc::clone(&sink),
    ));
    let segment_service = Arc::new(SegmentService::new(semantic, rules, policy, sink));

    let input_port: Arc<dyn InputPort> =
        Arc::new(TuiInputPort::new(report_service, segment_service));

    // --- Run (main menu -> Report / Segment / Exit) ---
    input_port
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    Ok(())
}
