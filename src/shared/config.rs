//! Application configuration. Paths, thresholds, language-model provider.
//!
//! Sources, later wins: `.env` (dotenv), `DIGEST_*` environment variables, then the optional
//! file named by `DIGEST_CONFIG`. Every key is optional; the `*_or_default` helpers apply
//! defaults and clamp numeric ranges.

use crate::domain::composer::DEFAULT_EXCERPT_CHARS;
use crate::domain::rules::DEFAULT_RULE_CONFIDENCE;
use crate::domain::taxonomy::{DEFAULT_MIN_CONFIDENCE, clamp_unit};
use crate::domain::{ConfidencePolicy, CorrectionPolicy, DomainError};
use serde::Deserialize;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434/v1/chat/completions";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.2";
pub const DEFAULT_AI_TIMEOUT_SECS: u64 = 60;

/// Which language-model backend the semantic classifier talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiProvider {
    OpenAi,
    Ollama,
    /// No model: every run takes the keyword-rule fallback.
    Disabled,
}

impl FromStr for AiProvider {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            "disabled" | "none" | "off" => Ok(Self::Disabled),
            other => Err(DomainError::Config(format!(
                "unknown ai_provider '{}' (expected openai, ollama or disabled)",
                other
            ))),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct AppConfig {
    /// Root for resident entry files. Read from DIGEST_DATA_DIR.
    #[serde(default)]
    pub data_dir: Option<String>,

    /// Output directory for reports and segment files. Read from DIGEST_REPORTS_DIR.
    #[serde(default)]
    pub reports_dir: Option<String>,

    /// Optional free-text organisation rules file. Read from DIGEST_RULES_PATH.
    #[serde(default)]
    pub rules_path: Option<String>,

    // ─────────────────────────────────────────────────────────────────────────
    // Classification thresholds
    // ─────────────────────────────────────────────────────────────────────────
    #[serde(default)]
    pub min_confidence: Option<f64>,

    #[serde(default)]
    pub rule_confidence: Option<f64>,

    #[serde(default)]
    pub correction_primary_threshold: Option<f64>,

    #[serde(default)]
    pub correction_other_threshold: Option<f64>,

    #[serde(default)]
    pub correction_floor: Option<f64>,

    /// Composer excerpt budget in characters.
    #[serde(default)]
    pub excerpt_chars: Option<usize>,

    // ─────────────────────────────────────────────────────────────────────────
    // Language model
    // ─────────────────────────────────────────────────────────────────────────
    /// openai | ollama | disabled. Read from DIGEST_AI_PROVIDER.
    #[serde(default)]
    pub ai_provider: Option<String>,

    /// API key. Read from DIGEST_AI_API_KEY.
    #[serde(default)]
    pub ai_api_key: Option<String>,

    #[serde(default)]
    pub ai_api_url: Option<String>,

    #[serde(default)]
    pub ai_model: Option<String>,

    #[serde(default)]
    pub ai_timeout_secs: Option<u64>,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();
        let mut c = config::Config::builder();
        c = c.add_source(config::Environment::with_prefix("DIGEST").try_parsing(true));
        if let Ok(path) = std::env::var("DIGEST_CONFIG") {
            c = c.add_source(config::File::with_name(&path));
        }
        c.build()?.try_deserialize()
    }

    pub fn data_dir_or_default(&self) -> PathBuf {
        PathBuf::from(self.data_dir.as_deref().unwrap_or("./data"))
    }

    /// Defaults to `{data_dir}/reports`.
    pub fn reports_dir_or_default(&self) -> PathBuf {
        self.reports_dir
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.data_dir_or_default().join("reports"))
    }

    pub fn rules_path(&self) -> Option<PathBuf> {
        self.rules_path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
    }

    pub fn confidence_policy(&self) -> ConfidencePolicy {
        ConfidencePolicy::new(self.min_confidence.unwrap_or(DEFAULT_MIN_CONFIDENCE))
    }

    /// Keyword-hit confidence; the rule classifier caps it below 1.0.
    pub fn rule_confidence_or_default(&self) -> f64 {
        clamp_unit(
            self.rule_confidence.unwrap_or(DEFAULT_RULE_CONFIDENCE),
            DEFAULT_RULE_CONFIDENCE,
        )
    }

    pub fn correction_policy(&self) -> CorrectionPolicy {
        let defaults = CorrectionPolicy::default();
        CorrectionPolicy::new(
            self.correction_primary_threshold
                .unwrap_or(defaults.primary_threshold),
            self.correction_other_threshold
                .unwrap_or(defaults.other_threshold),
            self.correction_floor.unwrap_or(defaults.floor),
        )
    }

    pub fn excerpt_chars_or_default(&self) -> usize {
        self.excerpt_chars
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_EXCERPT_CHARS)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // AI Configuration Helpers
    // ─────────────────────────────────────────────────────────────────────────

    /// Returns the API key if configured. Reads from config or DIGEST_AI_API_KEY env.
    pub fn ai_api_key(&self) -> Option<String> {
        self.ai_api_key
            .clone()
            .or_else(|| std::env::var("DIGEST_AI_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
    }

    /// Explicit provider if set, otherwise OpenAI when a key is present, else disabled.
    pub fn ai_provider(&self) -> Result<AiProvider, DomainError> {
        match self.ai_provider.as_deref().map(str::trim) {
            Some(p) if !p.is_empty() => p.parse(),
            _ if self.ai_api_key().is_some() => Ok(AiProvider::OpenAi),
            _ => Ok(AiProvider::Disabled),
        }
    }

    pub fn ai_api_url_or_default(&self, provider: AiProvider) -> String {
        self.ai_api_url.clone().unwrap_or_else(|| {
            match provider {
                AiProvider::Ollama => DEFAULT_OLLAMA_URL,
                AiProvider::OpenAi | AiProvider::Disabled => DEFAULT_OPENAI_URL,
            }
            .to_string()
        })
    }

    pub fn ai_model_or_default(&self, provider: AiProvider) -> String {
        self.ai_model.clone().unwrap_or_else(|| {
            match provider {
                AiProvider::Ollama => DEFAULT_OLLAMA_MODEL,
                AiProvider::OpenAi | AiProvider::Disabled => DEFAULT_OPENAI_MODEL,
            }
            .to_string()
        })
    }

    pub fn ai_timeout_secs_or_default(&self) -> u64 {
        self.ai_timeout_secs
            .filter(|s| *s > 0)
            .unwrap_or(DEFAULT_AI_TIMEOUT_SECS)
    }
}
