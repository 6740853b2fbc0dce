//! Command-line interface

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use console::{style, Emoji};
use crew_pipeline::{
    backend::openai::GROQ_BASE_URL,
    config::{ENV_API_KEY, ENV_BASE_URL, ENV_MODEL},
    presets, Event, EventHandler, InputKind, Inputs, PipelineDefinition, ProviderSettings,
    RunOutcome,
};
use serde_json::json;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "ok ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "x ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");

/// Run templated multi-agent LLM pipelines
#[derive(Debug, Parser)]
#[command(name = "crew", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Cli {
    /// Parse CLI arguments from the environment
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the built-in presets and their inputs
    List,

    /// Check a pipeline without calling the provider
    Validate(SourceArgs),

    /// Run a pipeline
    Run(RunArgs),
}

/// Which definition to use, and the raw form values.
#[derive(Debug, Args)]
pub struct SourceArgs {
    /// Built-in preset (study, language, recipe)
    #[arg(long, conflicts_with = "file", required_unless_present = "file")]
    pub preset: Option<String>,

    /// Definition file (.json, or .yaml with the `yaml` feature)
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Input value as key=value (repeatable)
    #[arg(short, long = "input", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub inputs: Vec<(String, String)>,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub provider: ProviderArgs,

    /// Print tokens as they arrive
    #[arg(long, conflicts_with = "json")]
    pub stream: bool,

    /// Print the outcome as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ProviderArgs {
    /// Base URL of an OpenAI-compatible provider
    #[arg(long, env = ENV_BASE_URL, default_value = GROQ_BASE_URL)]
    pub base_url: String,

    /// Provider API key
    #[arg(long, env = ENV_API_KEY, hide_env_values = true)]
    pub api_key: Option<String>,

    /// Model identifier (overrides the definition)
    #[arg(long, env = ENV_MODEL)]
    pub model: Option<String>,

    /// Timeout for each provider call, in seconds
    #[arg(long, default_value_t = 60)]
    pub timeout_secs: u64,

    /// Transport retries on 429/5xx
    #[arg(long, default_value_t = 0)]
    pub retries: u32,
}

impl From<ProviderArgs> for ProviderSettings {
    fn from(args: ProviderArgs) -> Self {
        ProviderSettings {
            base_url: args.base_url,
            api_key: args.api_key.filter(|k| !k.trim().is_empty()),
            model: args.model,
            timeout: Duration::from_secs(args.timeout_secs),
            retries: args.retries,
        }
    }
}

/// Parse a `key=value` pair.
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}

impl SourceArgs {
    fn definition(&self) -> Result<PipelineDefinition> {
        match (&self.preset, &self.file) {
            (Some(name), _) => presets::by_name(name).ok_or_else(|| {
                anyhow!(
                    "unknown preset '{}' (available: {})",
                    name,
                    presets::NAMES.join(", ")
                )
            }),
            (None, Some(path)) => PipelineDefinition::from_file(path)
                .with_context(|| format!("Failed to load definition {}", path.display())),
            (None, None) => bail!("either --preset or --file is required"),
        }
    }

    fn raw_inputs(&self) -> Inputs {
        self.inputs
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

pub fn list() {
    for def in presets::all() {
        println!("{} {}", style(&def.name).bold().cyan(), style(def.title()).dim());
        if let Some(ref description) = def.description {
            println!("    {}", description);
        }
        for field in def.inputs.fields() {
            let detail = match &field.kind {
                InputKind::Text { required: true, .. } => "text, required".to_string(),
                InputKind::Text { default, .. } => match default {
                    Some(d) => format!("text, default \"{}\"", d),
                    None => "text".to_string(),
                },
                InputKind::Choice { options, .. } => format!("one of: {}", options.join(" | ")),
                InputKind::Number { min, max, default } => match default {
                    Some(d) => format!("number {}..={}, default {}", min, max, d),
                    None => format!("number {}..={}", min, max),
                },
                InputKind::Toggle { default } => format!("toggle, default {}", default),
            };
            println!("    --input {}=...  ({})", style(&field.name).green(), detail);
        }
        println!();
    }
}

pub fn validate(args: &SourceArgs) -> Result<()> {
    let def = args.definition()?;
    let pipeline = if args.inputs.is_empty() {
        def.check()?
    } else {
        def.resolve(&args.raw_inputs())?.pipeline
    };

    println!("{}{} is valid", CHECK, style(def.title()).bold());
    println!("{}Steps: {}", INFO, pipeline.step_names().join(" -> "));
    if !pipeline.skipped_steps().is_empty() {
        println!("{}Skipped: {}", INFO, pipeline.skipped_steps().join(", "));
    }
    println!("{}Required inputs: {}", INFO, pipeline.required_inputs().join(", "));
    Ok(())
}

/// Prints streamed tokens under a heading per step.
struct StreamPrinter {
    def: PipelineDefinition,
}

impl EventHandler for StreamPrinter {
    fn on_event(&self, event: Event) {
        match event {
            Event::StepStart { name, index, total } => {
                let label = self.def.label_for(&name).unwrap_or(&name);
                println!(
                    "\n{} {}\n",
                    style(format!("[{}/{}]", index + 1, total)).dim(),
                    style(label).bold().cyan()
                );
            }
            Event::Token { chunk, .. } => {
                print!("{}", chunk);
                let _ = std::io::stdout().flush();
            }
            Event::StepEnd { .. } => println!(),
            Event::TransportRetry {
                attempt, delay_ms, ..
            } => eprintln!(
                "{}",
                style(format!("retry {} in {} ms", attempt, delay_ms)).yellow()
            ),
        }
    }
}

/// Record an interrupt on the cancel flag. Returns `true` when the run was
/// already cancelled, meaning the user asked twice.
pub fn interrupt(cancel: &AtomicBool) -> bool {
    cancel.swap(true, Ordering::Relaxed)
}

pub async fn run(args: RunArgs, cancel: Arc<AtomicBool>) -> Result<()> {
    let mut def = args.source.definition()?;
    let settings = ProviderSettings::from(args.provider);
    if settings.api_key.is_none() {
        bail!("no API key: pass --api-key or set {}", ENV_API_KEY);
    }
    if let Some(ref model) = settings.model {
        def.model = Some(model.clone());
    }

    let resolved = def.resolve(&args.source.raw_inputs())?;
    let pipeline = resolved.pipeline.with_streaming(args.stream);

    let mut builder = settings.ctx_builder().cancellation(Some(cancel));
    if args.stream {
        builder = builder.event_handler(Arc::new(StreamPrinter { def: def.clone() }));
    }
    let ctx = builder.build()?;

    if !args.json {
        println!(
            "{} {} ({})",
            INFO,
            style(def.title()).bold(),
            style(pipeline.model()).dim()
        );
    }

    let outcome = pipeline.execute(&ctx, resolved.inputs).await?;

    if args.json {
        print_json(&def, &outcome)?;
    } else if !args.stream {
        print_outputs(&def, &outcome);
    }

    match outcome.failure {
        None => Ok(()),
        Some(failure) => {
            if !args.json {
                eprintln!(
                    "\n{}{}",
                    CROSS,
                    style(format!("Step '{}' failed: {}", failure.step, failure.error)).red()
                );
            }
            Err(anyhow!("pipeline stopped at step '{}'", failure.step))
        }
    }
}

fn print_outputs(def: &PipelineDefinition, outcome: &RunOutcome) {
    for output in &outcome.outputs {
        let label = def.label_for(&output.name).unwrap_or(&output.name);
        println!("\n{}\n", style(format!("## {}", label)).bold().cyan());
        println!("{}", output.text);
    }
}

fn print_json(def: &PipelineDefinition, outcome: &RunOutcome) -> Result<()> {
    let failure = outcome.failure.as_ref().map(|f| {
        json!({
            "step": f.step,
            "error": f.error.to_string(),
        })
    });
    let value = json!({
        "pipeline": def.name,
        "outputs": outcome.outputs,
        "failure": failure,
    });
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("tema=Present Perfect"),
            Ok(("tema".to_string(), "Present Perfect".to_string()))
        );
        assert_eq!(
            parse_key_value("expr=a=b"),
            Ok(("expr".to_string(), "a=b".to_string()))
        );
        assert!(parse_key_value("tema").is_err());
        assert!(parse_key_value(" =x").is_err());
    }

    #[test]
    fn test_run_args_parse() {
        let cli = Cli::try_parse_from([
            "crew",
            "run",
            "--preset",
            "recipe",
            "-i",
            "prato=Brownie",
            "--input",
            "porcoes=6",
            "--api-key",
            "gsk_test",
            "--retries",
            "2",
        ])
        .unwrap();
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.source.preset.as_deref(), Some("recipe"));
                assert_eq!(args.source.inputs.len(), 2);
                assert_eq!(args.provider.retries, 2);
                let inputs = args.source.raw_inputs();
                assert_eq!(inputs.get("porcoes").map(|v| v.to_string()), Some("6".into()));
            }
            other => panic!("Expected run, got {other:?}"),
        }
    }

    #[test]
    fn test_preset_and_file_conflict() {
        let result = Cli::try_parse_from(["crew", "validate", "--preset", "study", "--file", "x.json"]);
        assert!(result.is_err());
        assert!(Cli::try_parse_from(["crew", "validate"]).is_err());
    }

    #[test]
    fn test_second_interrupt_asks_to_exit() {
        let cancel = AtomicBool::new(false);
        assert!(!interrupt(&cancel));
        assert!(cancel.load(Ordering::Relaxed));
        assert!(interrupt(&cancel));
    }

    #[test]
    fn test_validate_preset_with_inputs() {
        let args = SourceArgs {
            preset: Some("language".into()),
            file: None,
            inputs: vec![
                ("tema".into(), "Saudações".into()),
                ("mostrar_gabarito".into(), "false".into()),
            ],
        };
        assert!(validate(&args).is_ok());

        let unknown = SourceArgs {
            preset: Some("poetry".into()),
            file: None,
            inputs: Vec::new(),
        };
        assert!(validate(&unknown).is_err());
    }
}
