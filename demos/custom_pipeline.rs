//! Example: a hand-built pipeline streamed from a live provider.
//!
//! Reads `GROQ_API_KEY` (and optionally `CREW_BASE_URL`, `CREW_MODEL`) from
//! the environment.
//!
//! Run with: `GROQ_API_KEY=gsk_... cargo run --example custom_pipeline`

use crew_pipeline::template::{numbered_list, section};
use crew_pipeline::{Event, FnEventHandler, Inputs, Pipeline, ProviderSettings, StepSpec};
use std::io::Write;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("crew_pipeline=info").init();

    let settings = ProviderSettings::from_env()?;
    let handler = Arc::new(FnEventHandler(|event: Event| match event {
        Event::StepStart { name, index, total } => println!("\n--- [{}/{}] {} ---", index + 1, total, name),
        Event::Token { chunk, .. } => {
            print!("{}", chunk);
            let _ = std::io::stdout().flush();
        }
        _ => {}
    }));
    let ctx = settings.ctx_builder().event_handler(handler).build()?;

    let rules = numbered_list(&[
        "Write in plain English.".to_string(),
        "Keep every answer under 120 words.".to_string(),
    ]);

    let mut builder = Pipeline::builder("pitch")
        .temperature(0.5)
        .streaming(true)
        .step(
            StepSpec::new(
                "outline",
                "Product strategist",
                format!("Outline a one-minute pitch for {{product}}.\n\n{}", section("Rules", &rules)),
            )
            .with_goal("Find the single strongest angle for {product}"),
        )
        .step(
            StepSpec::new("pitch", "Copywriter", "Turn this outline into a pitch:\n{outline}")
                .depends_on("outline")
                .with_expected_output("One paragraph"),
        )
        .step(
            StepSpec::new("critique", "Skeptical investor", "List the three weakest claims.")
                .depends_on("pitch"),
        );
    if let Some(model) = settings.model {
        builder = builder.model(model);
    }
    let pipeline = builder.build()?;

    let outcome = pipeline
        .execute(&ctx, Inputs::new().with("product", "a solar-powered kettle"))
        .await?;
    println!();
    if let Some(failure) = outcome.failure {
        eprintln!("stopped at '{}': {}", failure.step, failure.error);
    }
    Ok(())
}
