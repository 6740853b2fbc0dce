//! Backend for OpenAI-compatible chat-completion APIs.
//!
//! [`OpenAiBackend`] covers Groq (the default provider of the built-in
//! presets), OpenAI, Together AI, Mistral, vLLM, llama.cpp server, LM Studio
//! and Ollama's `/v1/` endpoint.
//!
//! Endpoint: `{base_url}/v1/chat/completions`. The step persona becomes the
//! system message and the rendered prompt the user message.
//! Streaming: SSE with `data: {"choices": [{"delta": {"content": "token"}}]}`.

use super::sse::{delta_content, SseDecoder};
use super::{Backend, LlmRequest, LlmResponse};
use crate::error::Result;
use crate::PipelineError;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};

/// Base URL of Groq's OpenAI-compatible API.
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai";

/// Model used by the built-in presets.
pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

/// Backend for any OpenAI-compatible API.
///
/// # Example
///
/// ```
/// use crew_pipeline::backend::OpenAiBackend;
///
/// let anonymous = OpenAiBackend::new();
/// let with_key = OpenAiBackend::new().with_api_key("gsk_...");
/// assert!(with_key.has_api_key());
/// ```
#[derive(Clone, Default)]
pub struct OpenAiBackend {
    /// Optional API key. If set, sent as `Authorization: Bearer {key}`.
    pub(crate) api_key: Option<String>,
    /// Optional organization ID. If set, sent as `OpenAI-Organization: {org}`.
    pub(crate) organization: Option<String>,
}

impl std::fmt::Debug for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiBackend")
            .field("api_key", &self.api_key.as_deref().map(redact))
            .field("organization", &self.organization)
            .finish()
    }
}

/// Keep a short, char-aligned prefix of a secret for identification.
fn redact(key: &str) -> String {
    if key.chars().count() > 6 {
        let prefix: String = key.chars().take(6).collect();
        format!("{}***", prefix)
    } else {
        "***".to_string()
    }
}

impl OpenAiBackend {
    /// Create a backend without authentication.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the API key for authentication.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the organization ID header.
    pub fn with_organization(mut self, org: impl Into<String>) -> Self {
        self.organization = Some(org.into());
        self
    }

    /// Returns `true` if an API key has been configured.
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Build the messages array: persona as system, prompt as user.
    fn build_messages(request: &LlmRequest) -> Vec<Value> {
        vec![
            json!({"role": "system", "content": request.persona.system_prompt()}),
            json!({"role": "user", "content": request.prompt}),
        ]
    }

    /// Build the request body for `/v1/chat/completions`.
    fn build_body(request: &LlmRequest, stream: bool) -> Value {
        let mut body = json!({
            "model": request.model,
            "messages": Self::build_messages(request),
            "temperature": request.config.temperature,
            "max_tokens": request.config.max_tokens,
            "stream": stream,
        });

        // Extra provider fields (top_p, seed, ...) never override the
        // fields above.
        if let (Some(body), Some(extra)) = (
            body.as_object_mut(),
            request.config.options.as_ref().and_then(Value::as_object),
        ) {
            for (k, v) in extra {
                body.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }

        body
    }

    /// Parse a `Retry-After` header value as seconds.
    fn parse_retry_after(value: &str) -> Option<std::time::Duration> {
        value
            .trim()
            .parse::<u64>()
            .ok()
            .map(std::time::Duration::from_secs)
    }

    /// Build the reqwest request with appropriate headers.
    fn build_http_request(
        &self,
        client: &Client,
        url: &str,
        body: &Value,
    ) -> reqwest::RequestBuilder {
        let mut req = client.post(url).json(body);

        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }
        if let Some(ref org) = self.organization {
            req = req.header("OpenAI-Organization", org.as_str());
        }

        req
    }

    /// Send the request and turn non-2xx statuses into [`PipelineError::HttpError`].
    async fn send(
        &self,
        client: &Client,
        base_url: &str,
        body: &Value,
    ) -> Result<reqwest::Response> {
        let url = format!("{}/v1/chat/completions", base_url.trim_end_matches('/'));
        tracing::debug!(%url, model = %body["model"], "sending chat completion");

        let resp = self
            .build_http_request(client, &url, body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    tracing::warn!(%url, error = %e, "failed to connect to provider");
                }
                PipelineError::Request(e)
            })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(Self::parse_retry_after);
            let text = resp.text().await.unwrap_or_default();
            return Err(PipelineError::HttpError {
                status,
                body: text,
                retry_after,
            });
        }

        Ok(resp)
    }

    /// Extract metadata from a completion response.
    fn extract_metadata(json_resp: &Value) -> Option<Value> {
        let meta: serde_json::Map<String, Value> = ["usage", "model", "id"]
            .iter()
            .filter_map(|k| json_resp.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect();
        if meta.is_empty() {
            None
        } else {
            Some(Value::Object(meta))
        }
    }

    fn extract_text(json_resp: &Value) -> Result<String> {
        json_resp
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                PipelineError::Provider("response has no choices[0].message.content".into())
            })
    }
}

#[async_trait]
impl Backend for OpenAiBackend {
    async fn complete(
        &self,
        client: &Client,
        base_url: &str,
        request: &LlmRequest,
    ) -> Result<LlmResponse> {
        let body = Self::build_body(request, false);
        let resp = self.send(client, base_url, &body).await?;
        let status = resp.status().as_u16();

        let json_resp: Value = resp.json().await?;
        Ok(LlmResponse {
            text: Self::extract_text(&json_resp)?,
            status,
            metadata: Self::extract_metadata(&json_resp),
        })
    }

    async fn complete_streaming(
        &self,
        client: &Client,
        base_url: &str,
        request: &LlmRequest,
        on_token: &mut (dyn FnMut(String) + Send),
    ) -> Result<LlmResponse> {
        let body = Self::build_body(request, true);
        let resp = self.send(client, base_url, &body).await?;
        let status = resp.status().as_u16();

        let mut stream = resp.bytes_stream();
        let mut decoder = SseDecoder::new();
        let mut accumulated = String::new();

        let mut push = |chunk: &Value, accumulated: &mut String| {
            if let Some(content) = delta_content(chunk) {
                accumulated.push_str(content);
                on_token(content.to_string());
            }
        };

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(PipelineError::Request)?;
            for value in decoder.decode(&chunk) {
                push(&value, &mut accumulated);
            }
            if decoder.is_done() {
                break;
            }
        }
        for value in decoder.flush() {
            push(&value, &mut accumulated);
        }

        Ok(LlmResponse {
            text: accumulated,
            status,
            metadata: None,
        })
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Persona;
    use crate::client::LlmConfig;

    fn test_request() -> LlmRequest {
        LlmRequest {
            model: DEFAULT_MODEL.into(),
            persona: Persona {
                role: "Professor(a) de Idiomas".into(),
                goal: "Ensinar Present Perfect".into(),
                backstory: Some("Professor experiente.".into()),
            },
            prompt: "Explique o tema.".into(),
            config: LlmConfig::default().with_temperature(0.3),
            stream: false,
        }
    }

    #[test]
    fn test_chat_payload() {
        let body = OpenAiBackend::build_body(&test_request(), false);

        assert_eq!(body["model"], DEFAULT_MODEL);
        assert_eq!(body["temperature"], 0.3);
        assert_eq!(body["max_tokens"], 2048);
        assert_eq!(body["stream"], false);

        let messages = body["messages"].as_array().expect("messages");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert!(messages[0]["content"]
            .as_str()
            .unwrap()
            .starts_with("You are Professor(a) de Idiomas."));
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[1]["content"], "Explique o tema.");
    }

    #[test]
    fn test_extra_options_merged_without_override() {
        let mut request = test_request();
        request.config.options = Some(json!({"top_p": 0.9, "temperature": 1.5}));

        let body = OpenAiBackend::build_body(&request, false);
        assert_eq!(body["top_p"], 0.9);
        assert_eq!(body["temperature"], 0.3);
    }

    #[test]
    fn test_streaming_body() {
        let body = OpenAiBackend::build_body(&test_request(), true);
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn test_auth_headers() {
        let backend = OpenAiBackend::new()
            .with_api_key("gsk_test123")
            .with_organization("org-abc");

        let req = backend
            .build_http_request(&Client::new(), "https://api.groq.com/openai/v1/chat/completions", &json!({}))
            .build()
            .expect("build request");

        assert_eq!(req.headers().get("Authorization").unwrap(), "Bearer gsk_test123");
        assert_eq!(req.headers().get("OpenAI-Organization").unwrap(), "org-abc");
    }

    #[test]
    fn test_no_auth() {
        let req = OpenAiBackend::new()
            .build_http_request(&Client::new(), "http://localhost:11434/v1/chat/completions", &json!({}))
            .build()
            .expect("build request");
        assert!(req.headers().get("Authorization").is_none());
    }

    #[test]
    fn test_extract_text_and_metadata() {
        let resp = json!({
            "id": "chatcmpl-1",
            "model": DEFAULT_MODEL,
            "choices": [{"message": {"role": "assistant", "content": "# Teoria"}}],
            "usage": {"total_tokens": 42}
        });
        assert_eq!(OpenAiBackend::extract_text(&resp).unwrap(), "# Teoria");
        let meta = OpenAiBackend::extract_metadata(&resp).unwrap();
        assert_eq!(meta["usage"]["total_tokens"], 42);
        assert_eq!(meta["id"], "chatcmpl-1");
    }

    #[test]
    fn test_extract_text_missing_is_provider_error() {
        let err = OpenAiBackend::extract_text(&json!({"choices": []})).unwrap_err();
        assert!(err.is_provider_error());
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(
            OpenAiBackend::parse_retry_after(" 7 "),
            Some(std::time::Duration::from_secs(7))
        );
        assert_eq!(OpenAiBackend::parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let backend = OpenAiBackend::new().with_api_key("gsk_1234567890abcdef");
        let debug_output = format!("{:?}", backend);
        assert!(!debug_output.contains("1234567890abcdef"));
        assert!(debug_output.contains("gsk_12***"));
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_error() {
        let backend = OpenAiBackend::new();
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(2))
            .build()
            .unwrap();
        let result = backend
            .complete(&client, "http://127.0.0.1:9", &test_request())
            .await;
        assert!(result.unwrap_err().is_provider_error());
    }
}
