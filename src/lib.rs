//! # Crew Pipeline
//!
//! Sequential multi-agent LLM pipelines built from templated persona steps.
//!
//! A pipeline is a fixed, ordered list of steps. Each step speaks as a
//! persona (role, goal, optional backstory) and sends one templated prompt to
//! a text-generation provider. Templates read the user's named inputs and the
//! outputs of the earlier steps a step declares in `depends_on`. Outputs come
//! back in step order, one per enabled step, ready to be shown as one panel
//! per step.
//!
//! ## Core Concepts
//!
//! - **[`StepSpec`]**: persona, prompt template, optional expected output,
//!   dependencies, and an `enabled` flag resolved before the run.
//! - **[`Pipeline`]**: validated at build time (names, dependencies,
//!   placeholders, temperature); [`Pipeline::execute`] runs the steps.
//! - **[`RunOutcome`]**: the outputs produced, plus the failing step if the
//!   run stopped early. Earlier outputs are never thrown away.
//! - **[`ExecCtx`]**: HTTP client, provider backend, endpoint, transport
//!   backoff, cancellation, and an optional event handler.
//! - **[`PipelineDefinition`]**: a serializable form (typed inputs) plus
//!   steps, with optional steps gated by toggles. [`presets`] ships three.
//!
//! ## Quick Start
//!
//! ```no_run
//! use crew_pipeline::{ExecCtx, Inputs, Pipeline, StepSpec};
//! use crew_pipeline::backend::openai::GROQ_BASE_URL;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ctx = ExecCtx::builder(GROQ_BASE_URL)
//!         .openai_with_key(std::env::var("GROQ_API_KEY")?)
//!         .build()?;
//!
//!     let pipeline = Pipeline::builder("lesson")
//!         .temperature(0.3)
//!         .step(StepSpec::new("theory", "Language teacher", "Explain {tema} for a {nivel} student."))
//!         .step(StepSpec::new("exercises", "Exercise author", "Write 3 exercises about {tema}. No answers."))
//!         .step(
//!             StepSpec::new("answer_key", "Reviewer", "Answer these exercises:\n{exercises}")
//!                 .depends_on("exercises"),
//!         )
//!         .build()?;
//!
//!     let inputs = Inputs::new()
//!         .with("tema", "Present Perfect")
//!         .with("nivel", "beginner");
//!
//!     let outcome = pipeline.execute(&ctx, inputs).await?;
//!     for output in &outcome.outputs {
//!         println!("## {}\n{}\n", output.name, output.text);
//!     }
//!     if let Some(failure) = outcome.failure {
//!         eprintln!("step '{}' failed: {}", failure.step, failure.error);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Presets
//!
//! ```no_run
//! use crew_pipeline::{presets, ExecCtx, Inputs};
//! use crew_pipeline::backend::openai::GROQ_BASE_URL;
//!
//! # async fn run() -> crew_pipeline::Result<()> {
//! let resolved = presets::recipe().resolve(
//!     &Inputs::new().with("prato", "Brownie").with("porcoes", 6i64),
//! )?;
//! let ctx = ExecCtx::builder(GROQ_BASE_URL).openai_with_key("gsk_...").build()?;
//! let _outputs = resolved.pipeline.execute(&ctx, resolved.inputs).await?.into_result()?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod client;
pub mod config;
pub mod definition;
pub mod error;
pub mod events;
pub mod exec_ctx;
pub mod input;
pub mod parsing;
pub mod pipeline;
pub mod presets;
pub mod step;
pub mod template;
pub mod types;

pub use backend::{BackoffConfig, MockBackend, OpenAiBackend};
pub use client::LlmConfig;
pub use config::ProviderSettings;
pub use definition::{PipelineDefinition, Resolved, StepDefinition};
pub use error::{PipelineError, Result};
pub use events::{Event, EventHandler, FnEventHandler};
pub use exec_ctx::{ExecCtx, ExecCtxBuilder};
pub use input::{InputField, InputKind, InputSchema, InputValue, Inputs};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use step::StepSpec;
pub use template::Template;
pub use types::{RunOutcome, StepFailure, StepOutput, StepOutputs};
