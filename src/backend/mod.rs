//! Backend trait and normalized request/response types.
//!
//! The [`Backend`] trait abstracts over text-generation providers,
//! translating a normalized [`LlmRequest`] (persona, prompt, creativity) into
//! a provider-specific HTTP call. Built-in implementations:
//! [`OpenAiBackend`] for any OpenAI-compatible API (Groq, OpenAI, Ollama's
//! `/v1/`, vLLM, ...) and [`MockBackend`] for tests.
//!
//! ## Architecture
//!
//! ```text
//! Pipeline ──► LlmRequest ──► with_backoff() ──► Backend::complete() ──► LlmResponse
//!                                                       │
//!                                             ┌─────────┴─────────┐
//!                                        OpenAiBackend        MockBackend
//!                                    /v1/chat/completions   canned / scripted
//!                                       SSE streaming
//! ```

pub mod backoff;
pub mod mock;
pub mod openai;
pub mod sse;

pub use backoff::BackoffConfig;
pub use mock::MockBackend;
pub use openai::OpenAiBackend;

use crate::client::LlmConfig;
use crate::error::Result;
use crate::PipelineError;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Type alias for the callback invoked before each transport retry.
///
/// Arguments: `(attempt_number, delay_before_retry, reason_for_retry)`.
pub type RetryCallback<'a> = Option<&'a mut (dyn FnMut(u32, Duration, &str) + Send)>;

/// The persona a step speaks as: role, goal and optional backstory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    /// Short description of who the model should be.
    pub role: String,
    /// What this persona is trying to achieve (already rendered).
    pub goal: String,
    /// Optional background for the persona.
    pub backstory: Option<String>,
}

impl Persona {
    /// Compose the system message sent ahead of the prompt.
    pub fn system_prompt(&self) -> String {
        let mut prompt = format!("You are {}.", self.role.trim().trim_end_matches('.'));
        if let Some(ref backstory) = self.backstory {
            let backstory = backstory.trim();
            if !backstory.is_empty() {
                prompt.push(' ');
                prompt.push_str(backstory);
            }
        }
        let goal = self.goal.trim();
        if !goal.is_empty() {
            prompt.push_str("\nYour personal goal is: ");
            prompt.push_str(goal);
        }
        prompt
    }
}

/// A normalized text-generation request, provider-agnostic.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// Model identifier (e.g. `"llama-3.3-70b-versatile"`).
    pub model: String,

    /// Persona framing for this call.
    pub persona: Persona,

    /// The rendered user prompt.
    pub prompt: String,

    /// Creativity (temperature) and token limits, fixed for the whole run.
    pub config: LlmConfig,

    /// Whether to use the streaming endpoint.
    pub stream: bool,
}

/// A normalized provider response.
#[derive(Debug)]
pub struct LlmResponse {
    /// The generated text content.
    pub text: String,

    /// HTTP status code (for diagnostics/logging).
    pub status: u16,

    /// Provider-specific metadata (token counts, model, request id).
    pub metadata: Option<serde_json::Value>,
}

/// Abstraction over text-generation providers.
///
/// Implementors translate between the normalized [`LlmRequest`]/[`LlmResponse`]
/// and the provider's HTTP API, in non-streaming mode and in streaming mode
/// with a token callback.
///
/// # Object Safety
///
/// This trait is object-safe and designed to be used as `Arc<dyn Backend>`.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Execute a non-streaming call.
    async fn complete(
        &self,
        client: &Client,
        base_url: &str,
        request: &LlmRequest,
    ) -> Result<LlmResponse>;

    /// Execute a streaming call.
    ///
    /// `on_token` is called for each token as it arrives. The final
    /// accumulated text is returned as an [`LlmResponse`].
    async fn complete_streaming(
        &self,
        client: &Client,
        base_url: &str,
        request: &LlmRequest,
        on_token: &mut (dyn FnMut(String) + Send),
    ) -> Result<LlmResponse>;

    /// Human-readable name for logging and diagnostics.
    fn name(&self) -> &'static str;
}

/// Check whether a [`PipelineError`] is retryable based on the backoff config.
///
/// Retryable conditions:
/// - [`PipelineError::HttpError`] with a status in `config.retryable_statuses`
/// - [`PipelineError::Request`] (connection/transport errors)
pub fn is_retryable(error: &PipelineError, config: &BackoffConfig) -> bool {
    match error {
        PipelineError::HttpError { status, .. } => config.retryable_statuses.contains(status),
        PipelineError::Request(_) => true,
        _ => false,
    }
}

fn check_cancel(cancel: Option<&AtomicBool>) -> Result<()> {
    match cancel {
        Some(flag) if flag.load(Ordering::Relaxed) => Err(PipelineError::Cancelled),
        _ => Ok(()),
    }
}

/// Wait out the delay before retry `attempt` (1-indexed), honoring
/// `Retry-After` when the config allows it.
async fn pause_before_retry(
    attempt: u32,
    last_error: Option<&PipelineError>,
    config: &BackoffConfig,
    cancel: Option<&AtomicBool>,
    on_retry: &mut RetryCallback<'_>,
) -> Result<()> {
    let delay = match last_error {
        Some(PipelineError::HttpError {
            retry_after: Some(ra),
            ..
        }) if config.respect_retry_after => *ra,
        _ => config.delay_for_attempt(attempt - 1),
    };

    let reason = last_error.map(|e| e.to_string()).unwrap_or_default();
    tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, %reason, "retrying provider call");

    if let Some(cb) = on_retry {
        cb(attempt, delay, &reason);
    }

    tokio::time::sleep(delay).await;
    check_cancel(cancel)
}

/// Execute a backend call with transport-level retry and exponential backoff.
///
/// Retries only transient failures (429, 5xx, connection errors) and only as
/// many times as [`BackoffConfig::max_retries`] allows. Returns the first
/// successful response, or the last error once retries are exhausted.
pub async fn with_backoff(
    backend: &Arc<dyn Backend>,
    client: &Client,
    base_url: &str,
    request: &LlmRequest,
    config: &BackoffConfig,
    cancel: Option<&AtomicBool>,
    mut on_retry: RetryCallback<'_>,
) -> Result<LlmResponse> {
    let mut last_error: Option<PipelineError> = None;

    for attempt in 0..=config.max_retries {
        check_cancel(cancel)?;

        if attempt > 0 {
            pause_before_retry(attempt, last_error.as_ref(), config, cancel, &mut on_retry)
                .await?;
        }

        match backend.complete(client, base_url, request).await {
            Ok(response) => return Ok(response),
            Err(e) => {
                if attempt < config.max_retries && is_retryable(&e, config) {
                    last_error = Some(e);
                    continue;
                }
                return Err(e);
            }
        }
    }

    Err(last_error.unwrap_or(PipelineError::Other(
        "backoff loop exited unexpectedly".into(),
    )))
}

/// Options for [`with_backoff_streaming`]: the optional/callback parameters.
pub struct BackoffStreamOpts<'a> {
    /// Optional cancellation flag.
    pub cancel: Option<&'a AtomicBool>,
    /// Optional callback invoked before each retry.
    pub on_retry: RetryCallback<'a>,
    /// Token callback; receives each token as it arrives.
    pub on_token: &'a mut (dyn FnMut(String) + Send),
}

/// Execute a streaming backend call with transport-level retry.
///
/// Same as [`with_backoff`] but for streaming calls. Each retry restarts the
/// stream from scratch; tokens already delivered from a failed attempt are
/// not retracted.
pub async fn with_backoff_streaming(
    backend: &Arc<dyn Backend>,
    client: &Client,
    base_url: &str,
    request: &LlmRequest,
    config: &BackoffConfig,
    opts: BackoffStreamOpts<'_>,
) -> Result<LlmResponse> {
    let BackoffStreamOpts {
        cancel,
        mut on_retry,
        on_token,
    } = opts;
    let mut last_error: Option<PipelineError> = None;

    for attempt in 0..=config.max_retries {
        check_cancel(cancel)?;

        if attempt > 0 {
            pause_before_retry(attempt, last_error.as_ref(), config, cancel, &mut on_retry)
                .await?;
        }

        match backend
            .complete_streaming(client, base_url, request, on_token)
            .await
        {
            Ok(response) => return Ok(response),
            Err(e) => {
                if attempt < config.max_retries && is_retryable(&e, config) {
                    last_error = Some(e);
                    continue;
                }
                return Err(e);
            }
        }
    }

    Err(last_error.unwrap_or(PipelineError::Other(
        "backoff loop exited unexpectedly".into(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::backoff::JitterStrategy;

    fn test_request() -> LlmRequest {
        LlmRequest {
            model: "test".into(),
            persona: Persona {
                role: "Tester".into(),
                goal: String::new(),
                backstory: None,
            },
            prompt: "test".into(),
            config: LlmConfig::default(),
            stream: false,
        }
    }

    fn instant_retries(max_retries: u32) -> BackoffConfig {
        BackoffConfig {
            max_retries,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            jitter: JitterStrategy::None,
            ..BackoffConfig::standard()
        }
    }

    #[test]
    fn test_persona_system_prompt_full() {
        let persona = Persona {
            role: "Chef Profissional".into(),
            goal: "Escrever uma receita de Brownie".into(),
            backstory: Some("Você é um chef renomado.".into()),
        };
        assert_eq!(
            persona.system_prompt(),
            "You are Chef Profissional. Você é um chef renomado.\nYour personal goal is: Escrever uma receita de Brownie"
        );
    }

    #[test]
    fn test_persona_system_prompt_role_only() {
        let persona = Persona {
            role: "Redator de resumo didático.".into(),
            goal: "  ".into(),
            backstory: None,
        };
        assert_eq!(persona.system_prompt(), "You are Redator de resumo didático.");
    }

    #[test]
    fn test_is_retryable_statuses() {
        let config = BackoffConfig::standard();
        let http = |status| PipelineError::HttpError {
            status,
            body: String::new(),
            retry_after: None,
        };
        assert!(is_retryable(&http(429), &config));
        assert!(is_retryable(&http(503), &config));
        assert!(!is_retryable(&http(400), &config));
        assert!(!is_retryable(&http(401), &config));
    }

    #[test]
    fn test_is_retryable_other_errors_not_retried() {
        let config = BackoffConfig::standard();
        assert!(!is_retryable(&PipelineError::Other("x".into()), &config));
        assert!(!is_retryable(&PipelineError::Cancelled, &config));
        assert!(!is_retryable(&PipelineError::Provider("x".into()), &config));
    }

    #[tokio::test]
    async fn test_backoff_respects_cancellation() {
        let cancel = AtomicBool::new(true);
        let mock = Arc::new(MockBackend::fixed("unused"));
        let backend: Arc<dyn Backend> = mock.clone();

        let result = with_backoff(
            &backend,
            &Client::new(),
            "http://unused",
            &test_request(),
            &BackoffConfig::standard(),
            Some(&cancel),
            None,
        )
        .await;

        assert!(matches!(result, Err(PipelineError::Cancelled)));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_backoff_retries_transient_failure() {
        let mock = Arc::new(MockBackend::fixed("recovered").fail_on_call(0));
        let backend: Arc<dyn Backend> = mock.clone();
        let mut retries = Vec::new();
        let mut on_retry = |attempt: u32, _delay: Duration, reason: &str| {
            retries.push((attempt, reason.to_string()));
        };

        let response = with_backoff(
            &backend,
            &Client::new(),
            "http://unused",
            &test_request(),
            &instant_retries(2),
            None,
            Some(&mut on_retry),
        )
        .await
        .unwrap();

        assert_eq!(response.text, "recovered");
        assert_eq!(mock.call_count(), 2);
        assert_eq!(retries.len(), 1);
        assert_eq!(retries[0].0, 1);
        assert!(retries[0].1.contains("503"));
    }

    #[tokio::test]
    async fn test_no_backoff_returns_first_error() {
        let mock = Arc::new(MockBackend::fixed("never").fail_on_call(0));
        let backend: Arc<dyn Backend> = mock.clone();

        let result = with_backoff(
            &backend,
            &Client::new(),
            "http://unused",
            &test_request(),
            &BackoffConfig::none(),
            None,
            None,
        )
        .await;

        assert!(matches!(result, Err(PipelineError::HttpError { status: 503, .. })));
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_refused_connection_is_retried() {
        let backend: Arc<dyn Backend> = Arc::new(OpenAiBackend::new());
        let client = Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap();
        let mut retries = 0;
        let mut on_retry = |_attempt: u32, _delay: Duration, _reason: &str| retries += 1;

        let result = with_backoff(
            &backend,
            &client,
            "http://127.0.0.1:9",
            &test_request(),
            &instant_retries(2),
            None,
            Some(&mut on_retry),
        )
        .await;

        assert!(matches!(result, Err(PipelineError::Request(_))));
        assert_eq!(retries, 2);
    }

    #[tokio::test]
    async fn test_streaming_backoff_delivers_tokens() {
        let backend: Arc<dyn Backend> = Arc::new(MockBackend::fixed("streamed"));
        let mut tokens = Vec::new();
        let mut on_token = |t: String| tokens.push(t);

        let response = with_backoff_streaming(
            &backend,
            &Client::new(),
            "http://unused",
            &test_request(),
            &BackoffConfig::none(),
            BackoffStreamOpts {
                cancel: None,
                on_retry: None,
                on_token: &mut on_token,
            },
        )
        .await
        .unwrap();

        assert_eq!(response.text, "streamed");
        assert_eq!(tokens, vec!["streamed"]);
    }
}
