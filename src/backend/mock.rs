//! Mock backend for running pipelines without a live provider.
//!
//! [`MockBackend`] returns canned responses in order (or computes them from
//! the request), records every request it receives, and can be told to fail
//! on a given call. This is enough to exercise ordering, partial failure and
//! determinism of a pipeline run.
//!
//! # Example
//!
//! ```
//! use crew_pipeline::backend::MockBackend;
//!
//! let mock = MockBackend::new(vec!["first".to_string(), "second".to_string()])
//!     .fail_on_call(2);
//! assert_eq!(mock.call_count(), 0);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::Client;

use super::{Backend, LlmRequest, LlmResponse};
use crate::error::Result;
use crate::PipelineError;

type ResponderFn = dyn Fn(&LlmRequest) -> Result<String> + Send + Sync;

enum Responder {
    Canned(Vec<String>),
    Computed(Box<ResponderFn>),
}

/// A test backend that returns canned or computed responses.
///
/// Canned responses cycle back to the beginning once exhausted. For
/// streaming, the whole response is emitted as a single token.
pub struct MockBackend {
    responder: Responder,
    calls: AtomicUsize,
    fail_on: Vec<usize>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl std::fmt::Debug for MockBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockBackend")
            .field("calls", &self.call_count())
            .field("fail_on", &self.fail_on)
            .finish()
    }
}

impl MockBackend {
    /// Create a mock backend with the given canned responses.
    pub fn new(responses: Vec<String>) -> Self {
        assert!(!responses.is_empty(), "MockBackend requires at least one response");
        Self::with_responder(Responder::Canned(responses))
    }

    /// Create a mock that always returns the same response.
    pub fn fixed(response: impl Into<String>) -> Self {
        Self::new(vec![response.into()])
    }

    /// Create a mock that derives each response from the request.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&LlmRequest) -> Result<String> + Send + Sync + 'static,
    {
        Self::with_responder(Responder::Computed(Box::new(f)))
    }

    /// A deterministic mock that answers with the persona role and prompt.
    pub fn echo() -> Self {
        Self::from_fn(|req| Ok(format!("[{}] {}", req.persona.role, req.prompt)))
    }

    fn with_responder(responder: Responder) -> Self {
        Self {
            responder,
            calls: AtomicUsize::new(0),
            fail_on: Vec::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Fail the call with the given 0-based index with an HTTP 503.
    pub fn fail_on_call(mut self, index: usize) -> Self {
        self.fail_on.push(index);
        self
    }

    /// Number of calls received so far (failed ones included).
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Snapshot of every request received, in order.
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn respond(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let idx = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request.clone());

        if self.fail_on.contains(&idx) {
            return Err(PipelineError::HttpError {
                status: 503,
                body: format!("mock failure on call {}", idx),
                retry_after: None,
            });
        }

        let text = match &self.responder {
            Responder::Canned(responses) => responses[idx % responses.len()].clone(),
            Responder::Computed(f) => f(request)?,
        };

        Ok(LlmResponse {
            text,
            status: 200,
            metadata: None,
        })
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn complete(
        &self,
        _client: &Client,
        _base_url: &str,
        request: &LlmRequest,
    ) -> Result<LlmResponse> {
        self.respond(request)
    }

    async fn complete_streaming(
        &self,
        _client: &Client,
        _base_url: &str,
        request: &LlmRequest,
        on_token: &mut (dyn FnMut(String) + Send),
    ) -> Result<LlmResponse> {
        let response = self.respond(request)?;
        on_token(response.text.clone());
        Ok(response)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
