//! AI adapter module. Implements LlmPort for the semantic classifier.
//!
//! Provides OpenAI-compatible adapter (OpenAI, Azure, Ollama) and a scripted mock for tests
//! and offline runs.

pub mod csv_utils;
pub mod mock_adapter;
pub mod openai_adapter;

pub use csv_utils::entries_to_csv;
pub use mock_adapter::MockLlmAdapter;
pub use openai_adapter::OpenAiAdapter;
