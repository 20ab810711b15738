//! Language model capability.
//!
//! The retrieval pipeline only needs `complete(prompt) → text`; everything
//! else (providers, chat payloads) is an implementation detail of the
//! OpenAI-compatible client. Dependency failures never escape the pipeline:
//! callers fall back deterministically (§ error policy).

mod client;
mod models;

pub use client::{ChatCompletionClient, ScriptedModel};
pub use models::{LlmError, LlmSettings};

use async_trait::async_trait;
use std::time::Duration;

/// Narrow interface to the language model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete a prompt, blocking until the deadline at most.
    async fn complete(&self, prompt: &str, deadline: Duration) -> Result<String, LlmError>;

    /// Whether the model can be called at all (key configured, enabled).
    fn is_available(&self) -> bool;
}
