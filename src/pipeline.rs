use crate::{
    backend::{
        openai::DEFAULT_MODEL, with_backoff, with_backoff_streaming, BackoffStreamOpts,
        LlmRequest,
    },
    client::LlmConfig,
    error::Result,
    events::{emit, Event},
    exec_ctx::ExecCtx,
    input::Inputs,
    parsing,
    step::{Step, StepSpec},
    types::{RunOutcome, StepFailure, StepOutput, StepOutputs},
    PipelineError,
};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A validated, ordered list of steps sharing one model and one creativity
/// setting.
///
/// Built with [`Pipeline::builder`]. Building performs every shape check
/// (names, dependencies, placeholders, temperature) so that [`execute`]
/// only has to check the inputs.
///
/// [`execute`]: Pipeline::execute
pub struct Pipeline {
    name: String,
    steps: Vec<Step>,
    skipped: Vec<String>,
    required_inputs: Vec<String>,
    model: String,
    config: LlmConfig,
    streaming: bool,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("steps", &self.step_names())
            .field("skipped", &self.skipped)
            .field("required_inputs", &self.required_inputs)
            .field("model", &self.model)
            .field("temperature", &self.config.temperature)
            .field("streaming", &self.streaming)
            .finish()
    }
}

impl Pipeline {
    /// Create a new pipeline builder.
    pub fn builder(name: impl Into<String>) -> PipelineBuilder {
        PipelineBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of the steps that will run, in order.
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Names of disabled steps, omitted from every run.
    pub fn skipped_steps(&self) -> &[String] {
        &self.skipped
    }

    /// Input variables referenced by at least one enabled step.
    pub fn required_inputs(&self) -> &[String] {
        &self.required_inputs
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Switch streaming on or off after building.
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Check that every required input is present and non-blank.
    pub fn check_inputs(&self, inputs: &Inputs) -> Result<()> {
        for name in &self.required_inputs {
            match inputs.get(name) {
                Some(value) if !value.is_blank() => {}
                _ => return Err(PipelineError::MissingInput { name: name.clone() }),
            }
        }
        Ok(())
    }

    /// Run every enabled step in order.
    ///
    /// Missing inputs and cancellation are returned as `Err` and discard the
    /// run. A step failure (unresolved placeholder, provider error) stops
    /// the run and comes back inside the [`RunOutcome`] together with the
    /// outputs of the steps that completed before it. Build-time checks and
    /// [`check_inputs`](Pipeline::check_inputs) leave no placeholder
    /// unresolved, so in practice only provider errors end a run early.
    pub async fn execute(&self, ctx: &ExecCtx, inputs: Inputs) -> Result<RunOutcome> {
        self.check_inputs(&inputs)?;

        info!(
            pipeline = %self.name,
            steps = self.steps.len(),
            model = %self.model,
            "starting pipeline run"
        );

        let mut run = PipelineRun::new(inputs);
        let total = self.steps.len();

        for (index, step) in self.steps.iter().enumerate() {
            ctx.check_cancelled()?;

            emit(
                &ctx.event_handler,
                Event::StepStart {
                    name: step.name().to_string(),
                    index,
                    total,
                },
            );
            info!("Executing step {}/{}: {}", index + 1, total, step.name());

            let result = self.run_step(ctx, &run, step).await;
            emit(
                &ctx.event_handler,
                Event::StepEnd {
                    name: step.name().to_string(),
                    ok: result.is_ok(),
                },
            );

            match result {
                Ok(output) => run.outputs.record(output)?,
                Err(PipelineError::Cancelled) => return Err(PipelineError::Cancelled),
                Err(error) => {
                    warn!(step = step.name(), %error, "step failed, stopping run");
                    return Ok(RunOutcome {
                        outputs: run.outputs,
                        failure: Some(StepFailure {
                            step: step.name().to_string(),
                            error,
                        }),
                    });
                }
            }
        }

        info!(pipeline = %self.name, "pipeline run complete");
        Ok(RunOutcome {
            outputs: run.outputs,
            failure: None,
        })
    }

    async fn run_step(&self, ctx: &ExecCtx, run: &PipelineRun, step: &Step) -> Result<StepOutput> {
        let vars = run.effective_vars(&step.spec.depends_on);
        let rendered = step.render(&vars)?;
        debug!("Effective prompt for step {}: {}", step.name(), rendered.prompt);

        let request = LlmRequest {
            model: self.model.clone(),
            persona: rendered.persona,
            prompt: rendered.prompt,
            config: self.config.clone(),
            stream: self.streaming,
        };

        let handler = ctx.event_handler.clone();
        let name = step.name().to_string();
        let mut on_retry = |attempt: u32, delay: Duration, reason: &str| {
            emit(
                &handler,
                Event::TransportRetry {
                    name: name.clone(),
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                    reason: reason.to_string(),
                },
            );
        };

        let response = if self.streaming {
            let token_handler = ctx.event_handler.clone();
            let token_name = step.name().to_string();
            let mut on_token = |chunk: String| {
                emit(
                    &token_handler,
                    Event::Token {
                        name: token_name.clone(),
                        chunk,
                    },
                );
            };
            with_backoff_streaming(
                &ctx.backend,
                &ctx.client,
                &ctx.base_url,
                &request,
                &ctx.backoff,
                BackoffStreamOpts {
                    cancel: ctx.cancel_flag(),
                    on_retry: Some(&mut on_retry),
                    on_token: &mut on_token,
                },
            )
            .await?
        } else {
            with_backoff(
                &ctx.backend,
                &ctx.client,
                &ctx.base_url,
                &request,
                &ctx.backoff,
                ctx.cancel_flag(),
                Some(&mut on_retry),
            )
            .await?
        };

        debug!(
            "Provider returned {} bytes for step {}",
            response.text.len(),
            step.name()
        );

        let (thinking, text) = parsing::clean_response(&response.text);
        Ok(StepOutput {
            name: step.name().to_string(),
            text,
            thinking,
            raw_response: response.text,
            model: self.model.clone(),
            metadata: response.metadata,
        })
    }
}

/// State of one run: the inputs and the outputs produced so far.
///
/// Owned by a single `execute` call and dropped when it returns.
#[derive(Debug)]
struct PipelineRun {
    inputs: Inputs,
    outputs: StepOutputs,
}

impl PipelineRun {
    fn new(inputs: Inputs) -> Self {
        Self {
            inputs,
            outputs: StepOutputs::new(),
        }
    }

    /// Inputs plus the outputs of `depends_on`. Outputs win on a name clash.
    fn effective_vars(&self, depends_on: &[String]) -> HashMap<String, String> {
        let mut vars = self.inputs.to_vars();
        for dep in depends_on {
            if let Some(text) = self.outputs.text(dep) {
                vars.insert(dep.clone(), text.to_string());
            }
        }
        vars
    }
}

/// Builder for [`Pipeline`].
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    name: String,
    steps: Vec<StepSpec>,
    model: Option<String>,
    config: LlmConfig,
    streaming: bool,
}

impl PipelineBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            model: None,
            config: LlmConfig::default(),
            streaming: false,
        }
    }

    /// Append a step. Insertion order is execution order.
    pub fn step(mut self, step: StepSpec) -> Self {
        self.steps.push(step);
        self
    }

    /// Append several steps.
    pub fn steps(mut self, steps: impl IntoIterator<Item = StepSpec>) -> Self {
        self.steps.extend(steps);
        self
    }

    /// Model identifier. Default: [`DEFAULT_MODEL`].
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Creativity parameter for every step.
    pub fn temperature(mut self, temperature: f64) -> Self {
        self.config.temperature = temperature;
        self
    }

    /// Replace the whole generation config.
    pub fn config(mut self, config: LlmConfig) -> Self {
        self.config = config;
        self
    }

    /// Stream tokens as [`Event::Token`] events.
    pub fn streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Validate the step list and produce a [`Pipeline`].
    pub fn build(self) -> Result<Pipeline> {
        if self.steps.is_empty() {
            return Err(PipelineError::config(format!(
                "pipeline '{}' has no steps",
                self.name
            )));
        }
        self.config.validate()?;

        let names: Vec<&str> = self.steps.iter().map(|s| s.name.as_str()).collect();
        for (i, spec) in self.steps.iter().enumerate() {
            if spec.name.trim().is_empty() {
                return Err(PipelineError::config(format!("step #{} has an empty name", i + 1)));
            }
            if names[..i].contains(&spec.name.as_str()) {
                return Err(PipelineError::config(format!(
                    "duplicate step name '{}'",
                    spec.name
                )));
            }
            if spec.prompt_template.is_blank() {
                return Err(PipelineError::config(format!(
                    "step '{}' has an empty prompt template",
                    spec.name
                )));
            }
        }

        if !self.steps.iter().any(|s| s.enabled) {
            return Err(PipelineError::config(format!(
                "pipeline '{}' has no enabled steps",
                self.name
            )));
        }

        // Disabled steps are checked too, so an optional step is rejected
        // before anyone switches it on.
        let mut required_inputs: Vec<String> = Vec::new();
        for (i, spec) in self.steps.iter().enumerate() {
            for (k, dep) in spec.depends_on.iter().enumerate() {
                if spec.depends_on[..k].contains(dep) {
                    return Err(PipelineError::config(format!(
                        "step '{}' lists dependency '{}' twice",
                        spec.name, dep
                    )));
                }
                check_dependency(&self.steps, i, dep)?;
            }
            for placeholder in spec.placeholders() {
                if spec.depends_on.iter().any(|d| d == placeholder) {
                    continue;
                }
                if names.contains(&placeholder) {
                    return Err(PipelineError::Template {
                        step: spec.name.clone(),
                        placeholder: placeholder.to_string(),
                    });
                }
                if spec.enabled && !required_inputs.iter().any(|r| r == placeholder) {
                    required_inputs.push(placeholder.to_string());
                }
            }
        }

        let (enabled, disabled): (Vec<StepSpec>, Vec<StepSpec>) =
            self.steps.into_iter().partition(|s| s.enabled);

        Ok(Pipeline {
            name: self.name,
            steps: enabled.into_iter().map(Step::new).collect(),
            skipped: disabled.into_iter().map(|s| s.name).collect(),
            required_inputs,
            model: self.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            config: self.config,
            streaming: self.streaming,
        })
    }
}

/// A dependency must name an earlier step other than the step itself. Only a
/// disabled step may depend on a disabled step.
fn check_dependency(steps: &[StepSpec], index: usize, dep: &str) -> Result<()> {
    let step = &steps[index].name;
    match steps.iter().position(|s| s.name == dep) {
        None => Err(PipelineError::config(format!(
            "step '{}' depends on unknown step '{}'",
            step, dep
        ))),
        Some(j) if j == index => Err(PipelineError::config(format!(
            "step '{}' depends on itself",
            step
        ))),
        Some(j) if j > index => Err(PipelineError::config(format!(
            "step '{}' depends on later step '{}'",
            step, dep
        ))),
        Some(j) if steps[index].enabled && !steps[j].enabled => {
            Err(PipelineError::config(format!(
                "step '{}' depends on disabled step '{}'",
                step, dep
            )))
        }
        Some(_) => Ok(()),
    }
}
