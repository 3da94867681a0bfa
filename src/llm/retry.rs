//! Deadline and retry wrapper around backend calls
//!
//! - Every attempt runs under its own timeout
//! - A failed attempt is retried after an exponential backoff
//! - The last failure is returned as an `OrchestratorError`

use std::time::Duration;

use crate::core::{OrchestratorError, OrchestratorResult};

use super::provider::ModelBackend;
use super::types::{ModelRequest, ModelResponse};

/// Retry settings for backend calls
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts (first call included)
    pub max_attempts: u32,
    /// Delay before the first retry; doubled for each further retry
    pub base_delay: Duration,
    /// Deadline for a single attempt
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_millis(500),
            timeout: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(retry.saturating_sub(1)))
    }
}

/// Call the backend, retrying failed or timed-out attempts per `policy`
pub async fn generate_with_retry(
    backend: &dyn ModelBackend,
    request: &ModelRequest,
    policy: &RetryPolicy,
) -> OrchestratorResult<ModelResponse> {
    let attempts = policy.max_attempts.max(1);
    let mut last_error = OrchestratorError::Backend("no attempt made".into());

    for attempt in 1..=attempts {
        if attempt > 1 {
            let delay = policy.delay_for(attempt - 1);
            tracing::warn!(
                backend = backend.name(),
                agent = %request.agent,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "[Retry] Retrying backend call: {}",
                last_error
            );
            tokio::time::sleep(delay).await;
        }

        match tokio::time::timeout(policy.timeout, backend.generate(request)).await {
            Ok(Ok(response)) => return Ok(response),
            Ok(Err(e)) => {
                last_error = OrchestratorError::Backend(e.to_string());
            }
            Err(_) => {
                last_error = OrchestratorError::Timeout(policy.timeout.as_millis() as u64);
            }
        }
    }

    tracing::error!(
        backend = backend.name(),
        agent = %request.agent,
        "[Retry] Backend call failed after {} attempt(s): {}",
        attempts,
        last_error
    );
    Err(last_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ScriptStep, ScriptedBackend};

    fn request() -> ModelRequest {
        ModelRequest {
            agent: "A".into(),
            instruction: String::new(),
            tools: Vec::new(),
            transfer_targets: Vec::new(),
            history: Vec::new(),
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn test_retry_once_then_succeed() {
        let backend = ScriptedBackend::new(vec![
            ScriptStep::Fail("transient".into()),
            ModelResponse::text("ok").into(),
        ]);

        let response = generate_with_retry(&backend, &request(), &fast_policy())
            .await
            .unwrap();
        assert_eq!(response, ModelResponse::text("ok"));
        assert_eq!(backend.call_count().await, 2);
    }

    #[tokio::test]
    async fn test_second_failure_surfaces() {
        let backend = ScriptedBackend::new(vec![
            ScriptStep::Fail("down".into()),
            ScriptStep::Fail("still down".into()),
            ModelResponse::text("never reached").into(),
        ]);

        let err = generate_with_retry(&backend, &request(), &fast_policy())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Backend(ref m) if m == "still down"));
        assert_eq!(backend.call_count().await, 2);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let slow = ScriptStep::delayed(Duration::from_secs(5), ModelResponse::text("late").into());
        let backend = ScriptedBackend::new(vec![slow.clone(), slow]);

        let err = generate_with_retry(&backend, &request(), &fast_policy())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Timeout(200)));
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(100),
            timeout: Duration::from_secs(1),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
    }
}
