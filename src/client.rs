use crate::{error::Result, PipelineError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Generation settings shared by every step of a run.
///
/// `temperature` is the creativity parameter: at or below 0.3 answers are
/// close to deterministic, 0.4 to 0.7 suits explanations, above 0.7 output
/// gets more varied and less predictable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Temperature (0.0 = deterministic, higher = more creative).
    pub temperature: f64,

    /// Maximum tokens to generate per step.
    pub max_tokens: u32,

    /// Extra provider-specific body fields (e.g. `top_p`, `seed`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2048,
            options: None,
        }
    }
}

impl LlmConfig {
    pub fn with_temperature(mut self, temp: f64) -> Self {
        self.temperature = temp;
        self
    }

    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = tokens;
        self
    }

    pub fn with_options(mut self, options: Value) -> Self {
        self.options = Some(options);
        self
    }

    /// Reject values providers refuse outright.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(PipelineError::config(format!(
                "temperature {} is outside [0, 2]",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(PipelineError::config("max_tokens must be at least 1"));
        }
        if let Some(ref options) = self.options {
            if !options.is_object() {
                return Err(PipelineError::config("options must be a JSON object"));
            }
        }
        Ok(())
    }
}
