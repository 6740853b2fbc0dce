use crate::{
    backend::Persona,
    error::Result,
    template::{section, Template},
    PipelineError,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single step of the pipeline: one persona, one templated prompt.
///
/// `goal`, `prompt_template` and `expected_output` may reference input
/// variables and the outputs of the steps listed in `depends_on`, using
/// `{name}` placeholders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSpec {
    /// Unique name; insertion order is execution order.
    pub name: String,

    /// Persona framing for the model call.
    pub role: String,

    /// Goal template for the persona.
    #[serde(default = "empty_template")]
    pub goal: Template,

    /// Optional persona backstory.
    #[serde(default)]
    pub backstory: Option<String>,

    /// Prompt template.
    #[serde(alias = "prompt")]
    pub prompt_template: Template,

    /// Optional description of the answer shape, appended to the prompt.
    #[serde(default)]
    pub expected_output: Option<Template>,

    /// Earlier steps whose outputs this step reads.
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Whether this step runs. Disabled steps are omitted entirely.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn empty_template() -> Template {
    Template::parse("")
}

fn default_enabled() -> bool {
    true
}

impl StepSpec {
    /// Create a new step with a role and a prompt template.
    pub fn new(
        name: impl Into<String>,
        role: impl Into<String>,
        prompt_template: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            goal: empty_template(),
            backstory: None,
            prompt_template: Template::parse(prompt_template.into()),
            expected_output: None,
            depends_on: Vec::new(),
            enabled: true,
        }
    }

    /// Set the goal template.
    pub fn with_goal(mut self, goal: impl Into<String>) -> Self {
        self.goal = Template::parse(goal.into());
        self
    }

    /// Set the persona backstory.
    pub fn with_backstory(mut self, backstory: impl Into<String>) -> Self {
        self.backstory = Some(backstory.into());
        self
    }

    /// Describe the expected answer shape.
    pub fn with_expected_output(mut self, expected: impl Into<String>) -> Self {
        self.expected_output = Some(Template::parse(expected.into()));
        self
    }

    /// Read the output of an earlier step.
    pub fn depends_on(mut self, step: impl Into<String>) -> Self {
        self.depends_on.push(step.into());
        self
    }

    /// Set whether the step runs.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Disable this step (it will be omitted from the pipeline).
    pub fn disabled(self) -> Self {
        self.enabled(false)
    }

    /// All templates of this step.
    pub(crate) fn templates(&self) -> impl Iterator<Item = &Template> {
        [&self.goal, &self.prompt_template]
            .into_iter()
            .chain(self.expected_output.as_ref())
    }

    /// Distinct placeholder names across all templates.
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for template in self.templates() {
            for name in template.placeholders() {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }

    fn references(&self, name: &str) -> bool {
        self.templates().any(|t| t.references(name))
    }
}

/// A validated step, ready to render.
#[derive(Debug, Clone)]
pub(crate) struct Step {
    pub(crate) spec: StepSpec,
    /// Dependencies no template references; their outputs are appended as
    /// context sections.
    context_deps: Vec<String>,
}

/// A step rendered against its effective substitution mapping.
#[derive(Debug, Clone)]
pub(crate) struct RenderedStep {
    pub(crate) persona: Persona,
    pub(crate) prompt: String,
}

impl Step {
    pub(crate) fn new(spec: StepSpec) -> Self {
        let mut context_deps: Vec<String> = Vec::new();
        for dep in &spec.depends_on {
            if !spec.references(dep) && !context_deps.contains(dep) {
                context_deps.push(dep.clone());
            }
        }
        Self { spec, context_deps }
    }

    pub(crate) fn name(&self) -> &str {
        &self.spec.name
    }

    /// Render persona and prompt. `vars` must already contain the inputs and
    /// the outputs of `depends_on`.
    pub(crate) fn render(&self, vars: &HashMap<String, String>) -> Result<RenderedStep> {
        let render = |template: &Template| {
            template
                .render(vars)
                .map_err(|missing| PipelineError::Template {
                    step: self.spec.name.clone(),
                    placeholder: missing.0,
                })
        };

        let goal = render(&self.spec.goal)?;
        let mut prompt = render(&self.spec.prompt_template)?;

        if let Some(ref expected) = self.spec.expected_output {
            let expected = render(expected)?;
            if !expected.trim().is_empty() {
                prompt.push_str("\n\nThis is the expected criteria for your final answer: ");
                prompt.push_str(expected.trim());
            }
        }

        for dep in &self.context_deps {
            let output = vars.get(dep).ok_or_else(|| PipelineError::Template {
                step: self.spec.name.clone(),
                placeholder: dep.clone(),
            })?;
            prompt.push_str("\n\n");
            prompt.push_str(&section(&format!("Context: {}", dep), output));
        }

        Ok(RenderedStep {
            persona: Persona {
                role: self.spec.role.clone(),
                goal,
                backstory: self.spec.backstory.clone(),
            },
            prompt,
        })
    }
}
