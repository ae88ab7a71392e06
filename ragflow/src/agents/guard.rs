//! Deadline, retry and fallback handling around an [`Agent`].

use super::retry::{with_retry, RetryConfig};
use super::{Agent, SharedAgent};
use crate::config::AgentCallConfig;
use crate::errors::AgentError;
use async_trait::async_trait;
use std::fmt::Debug;

/// What to do once an agent call has failed for good.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentPolicy<Resp> {
    /// Propagate the error to the caller.
    FailFast,
    /// Log the error and return a fixed value instead.
    ReturnFallback(Resp),
}

impl<Resp> Default for AgentPolicy<Resp> {
    fn default() -> Self {
        Self::FailFast
    }
}

/// An agent wrapped with a per-call timeout, retries and a failure policy.
///
/// A timeout is reported as [`AgentError::Timeout`] and goes through the
/// same retry and policy handling as any other failure.
pub struct GuardedAgent<Req, Resp> {
    inner: SharedAgent<Req, Resp>,
    policy: AgentPolicy<Resp>,
    settings: AgentCallConfig,
}

impl<Req, Resp> GuardedAgent<Req, Resp>
where
    Req: Clone + Send + Sync + 'static,
    Resp: Clone + Send + Sync + 'static,
{
    /// Wraps an agent with the default call settings and `FailFast`.
    #[must_use]
    pub fn new(inner: SharedAgent<Req, Resp>) -> Self {
        Self {
            inner,
            policy: AgentPolicy::FailFast,
            settings: AgentCallConfig::default(),
        }
    }

    /// Sets the failure policy.
    #[must_use]
    pub fn with_policy(mut self, policy: AgentPolicy<Resp>) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the fallback returned when the call fails.
    #[must_use]
    pub fn with_fallback(self, fallback: Resp) -> Self {
        self.with_policy(AgentPolicy::ReturnFallback(fallback))
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.settings.timeout_ms = timeout_ms;
        self
    }

    /// Sets the retry behavior.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.settings.retry = retry;
        self
    }

    /// Applies timeout and retry settings from configuration.
    #[must_use]
    pub fn with_call_config(mut self, config: &AgentCallConfig) -> Self {
        self.settings = config.clone();
        self
    }

    /// Returns the timeout and retry settings in effect.
    #[must_use]
    pub fn call_config(&self) -> &AgentCallConfig {
        &self.settings
    }

    /// Returns the configured policy.
    #[must_use]
    pub fn policy(&self) -> &AgentPolicy<Resp> {
        &self.policy
    }

    /// Calls the agent, applying timeout, retry and policy.
    pub async fn call(&self, request: Req) -> Result<Resp, AgentError> {
        let name = self.inner.name();
        let deadline = self.settings.timeout();

        let result = with_retry(&self.settings.retry, name, || {
            let request = request.clone();
            async move {
                match tokio::time::timeout(deadline, self.inner.run(request)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(AgentError::timeout(name, self.settings.timeout_ms)),
                }
            }
        })
        .await;

        match (result, &self.policy) {
            (Ok(response), _) => Ok(response),
            (Err(err), AgentPolicy::FailFast) => Err(err),
            (Err(err), AgentPolicy::ReturnFallback(fallback)) => {
                tracing::warn!(agent = name, error = %err, "Agent failed, using fallback");
                Ok(fallback.clone())
            }
        }
    }
}

impl<Req: Send + 'static, Resp: Send + 'static> Debug for GuardedAgent<Req, Resp> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedAgent")
            .field("agent", &self.inner.name())
            .field(
                "policy",
                &match self.policy {
                    AgentPolicy::FailFast => "fail_fast",
                    AgentPolicy::ReturnFallback(_) => "return_fallback",
                },
            )
            .field("timeout_ms", &self.settings.timeout_ms)
            .field("retry", &self.settings.retry)
            .finish()
    }
}

#[async_trait]
impl<Req, Resp> Agent<Req, Resp> for GuardedAgent<Req, Resp>
where
    Req: Clone + Send + Sync + 'static,
    Resp: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn run(&self, request: Req) -> Result<Resp, AgentError> {
        self.call(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::retry::JitterStrategy;
    use crate::agents::{Answer, AnswerRequest, FnAgent};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Debug)]
    struct SlowAgent {
        delay: Duration,
    }

    #[async_trait]
    impl Agent<AnswerRequest, Answer> for SlowAgent {
        fn name(&self) -> &str {
            "slow"
        }

        async fn run(&self, request: AnswerRequest) -> Result<Answer, AgentError> {
            tokio::time::sleep(self.delay).await;
            Ok(Answer {
                answer: request.message,
            })
        }
    }

    fn request() -> AnswerRequest {
        AnswerRequest {
            prior_knowledge: None,
            message: "hi".into(),
        }
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let guarded = GuardedAgent::new(Arc::new(SlowAgent {
            delay: Duration::from_millis(1),
        }));

        assert_eq!(guarded.call(request()).await.unwrap().answer, "hi");
    }

    #[tokio::test]
    async fn test_timeout_is_an_agent_error() {
        let guarded = GuardedAgent::new(Arc::new(SlowAgent {
            delay: Duration::from_millis(500),
        }))
        .with_timeout_ms(10);

        let err = guarded.call(request()).await.unwrap_err();
        assert_eq!(err, AgentError::timeout("slow", 10));
    }

    #[tokio::test]
    async fn test_timeout_uses_fallback() {
        let guarded = GuardedAgent::new(Arc::new(SlowAgent {
            delay: Duration::from_millis(500),
        }))
        .with_timeout_ms(10)
        .with_fallback(Answer::fallback());

        let answer = guarded.call(request()).await.unwrap();
        assert_eq!(answer.answer, "Could you be more specific?");
    }

    #[tokio::test]
    async fn test_retry_before_policy() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let agent = FnAgent::new("flaky", move |req: AnswerRequest| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(AgentError::malformed("flaky", "not json"))
            } else {
                Ok(Answer { answer: req.message })
            }
        });

        let guarded = GuardedAgent::new(Arc::new(agent)).with_retry(
            RetryConfig::new()
                .with_max_attempts(2)
                .with_base_delay_ms(1)
                .with_jitter(JitterStrategy::None),
        );

        assert_eq!(guarded.call(request()).await.unwrap().answer, "hi");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fail_fast_propagates() {
        let agent = FnAgent::new("broken", |_req: AnswerRequest| {
            Err::<Answer, _>(AgentError::failed("broken", "down"))
        });
        let guarded = GuardedAgent::new(Arc::new(agent));

        assert_eq!(guarded.policy(), &AgentPolicy::FailFast);
        let err = guarded.call(request()).await.unwrap_err();
        assert_eq!(err.agent(), "broken");
    }

    #[test]
    fn test_call_config_applies() {
        let config = AgentCallConfig {
            timeout_ms: 250,
            retry: RetryConfig::new().with_max_attempts(4),
        };
        let guarded = GuardedAgent::new(Arc::new(SlowAgent {
            delay: Duration::ZERO,
        }))
        .with_call_config(&config);

        assert_eq!(guarded.call_config(), &config);
        assert_eq!(guarded.call_config().timeout(), Duration::from_millis(250));

        let debug = format!("{guarded:?}");
        assert!(debug.contains("timeout_ms: 250"));
        assert!(debug.contains("max_attempts: 4"));
    }

    #[test]
    fn test_debug_names_agent_and_policy() {
        let guarded = GuardedAgent::new(Arc::new(SlowAgent {
            delay: Duration::ZERO,
        }))
        .with_fallback(Answer::fallback());

        let debug = format!("{guarded:?}");
        assert!(debug.contains("agent: \"slow\""));
        assert!(debug.contains("return_fallback"));
    }
}
