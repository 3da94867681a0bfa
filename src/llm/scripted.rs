//! Scripted backend for deterministic runs without a model

use std::collections::VecDeque;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::sync::Mutex;

use super::provider::ModelBackend;
use super::types::{ModelRequest, ModelResponse};

/// One pre-programmed backend reaction
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Return this response
    Respond(ModelResponse),
    /// Fail the call with this message
    Fail(String),
    /// Wait, then perform the inner step
    Delay(Duration, Box<ScriptStep>),
}

impl ScriptStep {
    /// Convenience: wrap any step with a delay
    pub fn delayed(delay: Duration, inner: ScriptStep) -> Self {
        ScriptStep::Delay(delay, Box::new(inner))
    }
}

impl From<ModelResponse> for ScriptStep {
    fn from(response: ModelResponse) -> Self {
        ScriptStep::Respond(response)
    }
}

/// Backend that replays pre-programmed steps in order
///
/// Every request is recorded so tests can assert on what the model saw.
/// When the script runs out, the `fallback` step (if any) is repeated
/// forever; otherwise the call fails.
pub struct ScriptedBackend {
    steps: Mutex<VecDeque<ScriptStep>>,
    fallback: Option<ScriptStep>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedBackend {
    /// Create a backend from a list of steps
    pub fn new(steps: impl IntoIterator<Item = ScriptStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a backend from plain responses
    pub fn from_responses(responses: impl IntoIterator<Item = ModelResponse>) -> Self {
        Self::new(responses.into_iter().map(ScriptStep::Respond))
    }

    /// Repeat `step` once the script is exhausted
    pub fn with_fallback(mut self, step: ScriptStep) -> Self {
        self.fallback = Some(step);
        self
    }

    /// Number of calls made so far
    pub async fn call_count(&self) -> usize {
        self.requests.lock().await.len()
    }

    /// All requests received so far
    pub async fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().await.clone()
    }

    async fn perform(step: ScriptStep) -> Result<ModelResponse> {
        let mut step = step;
        loop {
            match step {
                ScriptStep::Respond(response) => return Ok(response),
                ScriptStep::Fail(message) => return Err(anyhow!(message)),
                ScriptStep::Delay(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    step = *inner;
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl ModelBackend for ScriptedBackend {
    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse> {
        self.requests.lock().await.push(request.clone());

        let next = self.steps.lock().await.pop_front();
        let step = match next.or_else(|| self.fallback.clone()) {
            Some(step) => step,
            None => {
                return Err(anyhow!(
                    "ScriptedBackend: no response configured for agent '{}'",
                    request.agent
                ))
            }
        };

        tracing::debug!("[ScriptedBackend] {} -> {:?}", request.agent, step);
        Self::perform(step).await
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(agent: &str) -> ModelRequest {
        ModelRequest {
            agent: agent.into(),
            instruction: String::new(),
            tools: Vec::new(),
            transfer_targets: Vec::new(),
            history: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_steps_in_order() {
        let backend = ScriptedBackend::from_responses(vec![
            ModelResponse::transfer("Coder"),
            ModelResponse::text("done"),
        ]);

        let first = backend.generate(&request("Root")).await.unwrap();
        assert_eq!(first, ModelResponse::transfer("Coder"));

        let second = backend.generate(&request("Coder")).await.unwrap();
        assert_eq!(second, ModelResponse::text("done"));

        assert!(backend.generate(&request("Coder")).await.is_err());
        assert_eq!(backend.call_count().await, 3);
        assert_eq!(backend.requests().await[1].agent, "Coder");
    }

    #[tokio::test]
    async fn test_failure_and_fallback() {
        let backend = ScriptedBackend::new(vec![ScriptStep::Fail("boom".into())])
            .with_fallback(ModelResponse::text("again").into());

        let err = backend.generate(&request("A")).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");

        for _ in 0..3 {
            assert_eq!(
                backend.generate(&request("A")).await.unwrap(),
                ModelResponse::text("again")
            );
        }
    }

    #[tokio::test]
    async fn test_delayed_step() {
        let backend = ScriptedBackend::new(vec![ScriptStep::delayed(
            Duration::from_millis(10),
            ModelResponse::text("late").into(),
        )]);
        let response = backend.generate(&request("A")).await.unwrap();
        assert_eq!(response, ModelResponse::text("late"));
    }
}
