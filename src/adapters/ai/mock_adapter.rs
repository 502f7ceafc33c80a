//! Mock AI adapter for testing without API calls.
//!
//! Either answers every prompt with a fixed body or behaves like an unreachable provider.
//! Records call count and the last prompt so tests can assert on what left the process.

use crate::domain::DomainError;
use crate::ports::{LlmPort, LlmRequest};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone)]
enum MockBehavior {
    Unavailable,
    Respond(String),
}

/// Scripted LLM adapter.
///
/// Also used at runtime when no provider is configured: it then always reports
/// unavailability, which routes every batch through the keyword rules.
#[derive(Debug)]
pub struct MockLlmAdapter {
    behavior: MockBehavior,
    /// Simulated network delay in milliseconds.
    delay_ms: u64,
    calls: AtomicUsize,
    last_request: Mutex<Option<LlmRequest>>,
}

impl MockLlmAdapter {
    /// An adapter whose every call fails like an unreachable provider.
    pub fn unavailable() -> Self {
        Self::with_behavior(MockBehavior::Unavailable)
    }

    /// An adapter that answers every call with `body`.
    pub fn responding(body: impl Into<String>) -> Self {
        Self::with_behavior(MockBehavior::Respond(body.into()))
    }

    fn with_behavior(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            delay_ms: 0,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Add simulated latency.
    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    /// Number of `complete` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The most recent prompt, if any.
    pub fn last_request(&self) -> Option<LlmRequest> {
        self.last_request.lock().ok().and_then(|guard| guard.clone())
    }
}

#[async_trait::async_trait]
impl LlmPort for MockLlmAdapter {
    async fn complete(&self, request: &LlmRequest) -> Result<String, DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut guard) = self.last_request.lock() {
            *guard = Some(request.clone());
        }
        info!(
            prompt_len = request.user.len(),
            "[MOCK] Simulating language model call"
        );

        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }

        match &self.behavior {
            MockBehavior::Unavailable => Err(DomainError::Llm(
                "[MOCK] language model not configured".to_string(),
            )),
            MockBehavior::Respond(body) => Ok(body.clone()),
        }
    }
}
