use crate::{error::Result, PipelineError};
use serde::Serialize;

/// Output from a single step.
#[derive(Debug, Clone, Serialize)]
pub struct StepOutput {
    /// Name of the step that produced this output.
    pub name: String,

    /// Cleaned response text (reasoning block and wrapping fence removed).
    pub text: String,

    /// Thinking process, if the model emitted a `<think>` block.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,

    /// Raw response text from the provider.
    pub raw_response: String,

    /// Model that answered.
    pub model: String,

    /// Provider metadata (token usage, request id).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Step outputs in execution order. Append-only: an output is never replaced.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct StepOutputs {
    entries: Vec<StepOutput>,
}

impl StepOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the output of a step by name.
    pub fn get(&self, name: &str) -> Option<&StepOutput> {
        self.entries.iter().find(|o| o.name == name)
    }

    /// Text of a step's output.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).map(|o| o.text.as_str())
    }

    /// Step names in execution order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|o| o.name.as_str()).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StepOutput> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn record(&mut self, output: StepOutput) -> Result<()> {
        if self.get(&output.name).is_some() {
            return Err(PipelineError::Other(format!(
                "output for step '{}' already recorded",
                output.name
            )));
        }
        self.entries.push(output);
        Ok(())
    }
}

impl<'a> IntoIterator for &'a StepOutputs {
    type Item = &'a StepOutput;
    type IntoIter = std::slice::Iter<'a, StepOutput>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// The step that ended a run early, and why.
#[derive(Debug)]
pub struct StepFailure {
    pub step: String,
    pub error: PipelineError,
}

/// Result of a pipeline run: every output produced, plus the failure that
/// stopped the run, if any.
#[derive(Debug)]
pub struct RunOutcome {
    /// Outputs of the steps that completed, in order.
    pub outputs: StepOutputs,

    /// Set when a step failed; later steps were not run.
    pub failure: Option<StepFailure>,
}

impl RunOutcome {
    /// Whether every enabled step produced an output.
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }

    /// Name of the step that failed, if any.
    pub fn failed_step(&self) -> Option<&str> {
        self.failure.as_ref().map(|f| f.step.as_str())
    }

    /// All-or-nothing view: the outputs, or the failure wrapped as
    /// [`PipelineError::StepFailed`].
    pub fn into_result(self) -> Result<StepOutputs> {
        match self.failure {
            None => Ok(self.outputs),
            Some(StepFailure { step, error }) => Err(PipelineError::StepFailed {
                step,
                source: Box::new(error),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(name: &str, text: &str) -> StepOutput {
        StepOutput {
            name: name.into(),
            text: text.into(),
            thinking: None,
            raw_response: text.into(),
            model: "test".into(),
            metadata: None,
        }
    }

    #[test]
    fn test_outputs_keep_order() {
        let mut outputs = StepOutputs::new();
        outputs.record(output("summary", "s")).unwrap();
        outputs.record(output("examples", "e")).unwrap();
        assert_eq!(outputs.names(), vec!["summary", "examples"]);
        assert_eq!(outputs.text("examples"), Some("e"));
        assert_eq!(outputs.len(), 2);
    }

    #[test]
    fn test_outputs_reject_second_write() {
        let mut outputs = StepOutputs::new();
        outputs.record(output("summary", "first")).unwrap();
        assert!(outputs.record(output("summary", "second")).is_err());
        assert_eq!(outputs.text("summary"), Some("first"));
    }

    #[test]
    fn test_outputs_serialize_as_list() {
        let mut outputs = StepOutputs::new();
        outputs.record(output("tips", "Use chocolate 70%")).unwrap();
        let json = serde_json::to_value(&outputs).unwrap();
        assert_eq!(json[0]["name"], "tips");
        assert!(json[0].get("thinking").is_none());
    }

    #[test]
    fn test_into_result_wraps_failure() {
        let outcome = RunOutcome {
            outputs: StepOutputs::new(),
            failure: Some(StepFailure {
                step: "recipe".into(),
                error: PipelineError::Provider("down".into()),
            }),
        };
        assert!(!outcome.is_complete());
        assert_eq!(outcome.failed_step(), Some("recipe"));
        match outcome.into_result() {
            Err(PipelineError::StepFailed { step, .. }) => assert_eq!(step, "recipe"),
            other => panic!("Expected StepFailed, got {other:?}"),
        }
    }
}
