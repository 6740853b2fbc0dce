use std::time::Duration;
use thiserror::Error;

/// Errors produced by the pipeline and its components.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Low-level HTTP transport failure (connection refused, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// JSON parsing failed at the serde level.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing of a pipeline definition failed.
    #[cfg(feature = "yaml")]
    #[error("YAML parsing failed: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Reading a definition file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A variable required by at least one enabled step was not supplied,
    /// or was supplied blank.
    #[error("Missing required input '{name}'")]
    MissingInput { name: String },

    /// A placeholder could not be resolved against the inputs and the
    /// outputs of the step's declared dependencies.
    #[error("Step '{step}': unresolved placeholder '{{{placeholder}}}'")]
    Template { step: String, placeholder: String },

    /// Invalid pipeline shape or input value detected before execution.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// The provider could not be reached or returned an unusable body.
    #[error("Provider error: {0}")]
    Provider(String),

    /// HTTP error with status code, response body, and optional Retry-After hint.
    ///
    /// Returned by [`Backend`](crate::backend::Backend) implementations when
    /// the provider returns a non-success status code. The `retry_after` field
    /// is populated from the `Retry-After` response header when present.
    #[error("HTTP {status}: {body}")]
    HttpError {
        /// HTTP status code (e.g. 401, 429, 503).
        status: u16,
        /// Response body text.
        body: String,
        /// Parsed `Retry-After` header value, if present.
        retry_after: Option<Duration>,
    },

    /// A step failed after the run started.
    #[error("Step '{step}' failed: {source}")]
    StepFailed {
        step: String,
        #[source]
        source: Box<PipelineError>,
    },

    /// The run was cancelled via the cancellation flag.
    #[error("Pipeline was cancelled")]
    Cancelled,

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(String),
}

impl PipelineError {
    /// Whether this error came from the text-generation provider
    /// (network, auth, quota, malformed response).
    pub fn is_provider_error(&self) -> bool {
        matches!(
            self,
            PipelineError::Request(_)
                | PipelineError::HttpError { .. }
                | PipelineError::Provider(_)
                | PipelineError::Json(_)
        )
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        PipelineError::Configuration(message.into())
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        PipelineError::Other(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
