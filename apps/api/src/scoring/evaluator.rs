//! The judgment seam.
//!
//! Everything around the model call is deterministic and unit-tested; the
//! call itself sits behind this trait so the pipeline can be driven by
//! scripted responses in tests.

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::AppError;
use crate::llm_client::{LlmClient, MODEL};

#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Sends one prompt and returns the model's raw text. Used for both the
    /// initial evaluation and the single repair round.
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, AppError>;

    /// Model identifier recorded in feedback metadata.
    fn model(&self) -> &str;
}

pub struct LlmEvaluator {
    client: Arc<LlmClient>,
}

impl LlmEvaluator {
    pub fn new(client: Arc<LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Evaluator for LlmEvaluator {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, AppError> {
        Ok(self.client.call_text(prompt, system).await?)
    }

    fn model(&self) -> &str {
        MODEL
    }
}

/// Replays scripted responses in order; panics when the script runs dry so a
/// test making more calls than it planned fails loudly.
#[cfg(test)]
pub struct ScriptedEvaluator {
    responses: std::sync::Mutex<std::collections::VecDeque<String>>,
    pub calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl ScriptedEvaluator {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses.into()),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl Evaluator for ScriptedEvaluator {
    async fn complete(&self, _system: &str, _prompt: &str) -> Result<String, AppError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let response = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("scripted evaluator ran out of responses");
        Ok(response)
    }

    fn model(&self) -> &str {
        "scripted"
    }
}
