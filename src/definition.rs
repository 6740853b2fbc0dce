//! Serializable pipeline definitions.
//!
//! A [`PipelineDefinition`] describes a whole form-driven pipeline: the input
//! form, the steps, the label each step's panel is shown under, and which
//! toggle (if any) switches an optional step on. Resolving it against raw
//! form values yields a validated [`Pipeline`] and the validated inputs.

use crate::{
    client::LlmConfig,
    error::Result,
    input::{InputKind, InputSchema, Inputs},
    pipeline::Pipeline,
    step::StepSpec,
    PipelineError,
};
use serde::{Deserialize, Serialize};

/// One step of a definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    #[serde(flatten)]
    pub spec: StepSpec,

    /// Panel title shown for this step's output. Defaults to the step name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Name of a toggle input that enables this step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled_when: Option<String>,
}

impl StepDefinition {
    pub fn new(spec: StepSpec) -> Self {
        Self {
            spec,
            label: None,
            enabled_when: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Run this step only when the named toggle is on.
    pub fn enabled_when(mut self, toggle: impl Into<String>) -> Self {
        self.enabled_when = Some(toggle.into());
        self
    }

    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.spec.name)
    }
}

impl From<StepSpec> for StepDefinition {
    fn from(spec: StepSpec) -> Self {
        Self::new(spec)
    }
}

fn default_temperature() -> f64 {
    LlmConfig::default().temperature
}

/// A complete, serializable pipeline description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDefinition {
    /// Short identifier (e.g. `"recipe"`).
    pub name: String,

    /// Human-facing title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Model identifier; the provider default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Creativity parameter shared by every step.
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// The input form.
    #[serde(default)]
    pub inputs: InputSchema,

    /// Steps in execution order.
    pub steps: Vec<StepDefinition>,
}

/// A definition resolved against form values.
#[derive(Debug)]
pub struct Resolved {
    pub pipeline: Pipeline,
    pub inputs: Inputs,
}

impl PipelineDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: None,
            description: None,
            model: None,
            temperature: default_temperature(),
            max_tokens: None,
            inputs: InputSchema::default(),
            steps: Vec::new(),
        }
    }

    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.name)
    }

    /// Panel label for a step, if the step exists.
    pub fn label_for(&self, step: &str) -> Option<&str> {
        self.steps
            .iter()
            .find(|s| s.spec.name == step)
            .map(StepDefinition::label)
    }

    /// Validate raw form values, resolve optional steps, and build the
    /// pipeline. Nothing is sent to a provider.
    pub fn resolve(&self, raw: &Inputs) -> Result<Resolved> {
        let inputs = self.inputs.validate(raw)?;
        let pipeline = self.pipeline_for(&inputs)?;
        pipeline.check_inputs(&inputs)?;
        Ok(Resolved { pipeline, inputs })
    }

    /// Check the definition's shape with every toggle at its default.
    /// Steps left off by their toggle are still checked.
    pub fn check(&self) -> Result<Pipeline> {
        self.pipeline_for(&Inputs::new())
    }

    /// Build the pipeline, taking toggle values from `inputs` and falling
    /// back to each toggle's default.
    pub fn pipeline_for(&self, inputs: &Inputs) -> Result<Pipeline> {
        let mut config = LlmConfig::default().with_temperature(self.temperature);
        if let Some(max_tokens) = self.max_tokens {
            config = config.with_max_tokens(max_tokens);
        }

        let mut builder = Pipeline::builder(self.name.clone()).config(config);
        if let Some(ref model) = self.model {
            builder = builder.model(model.clone());
        }

        for step in &self.steps {
            let mut spec = step.spec.clone();
            if let Some(ref toggle) = step.enabled_when {
                spec.enabled = spec.enabled && self.toggle_value(&spec.name, toggle, inputs)?;
            }
            builder = builder.step(spec);
        }
        builder.build()
    }

    fn toggle_value(&self, step: &str, toggle: &str, inputs: &Inputs) -> Result<bool> {
        let field = self.inputs.field(toggle).ok_or_else(|| {
            PipelineError::config(format!(
                "step '{}' is enabled by undeclared input '{}'",
                step, toggle
            ))
        })?;
        if !field.is_toggle() {
            return Err(PipelineError::config(format!(
                "step '{}' is enabled by '{}', which is not a toggle",
                step, toggle
            )));
        }
        let default = matches!(field.kind, InputKind::Toggle { default: true });
        Ok(inputs.flag(toggle).unwrap_or(default))
    }
}
