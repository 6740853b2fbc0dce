//! Example: run the `study` preset against a scripted backend.
//!
//! No provider or API key is needed. Each persona answers with a short
//! canned text so the ordering, the optional answer key and the context
//! hand-off between steps can be seen end to end.
//!
//! Run with: `cargo run --example offline_study_guide`

use crew_pipeline::{presets, ExecCtx, Inputs, MockBackend};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mock = MockBackend::from_fn(|req| {
        let text = match req.persona.role.as_str() {
            "Redator de resumo didático" => "# Algoritmos\nUm algoritmo é uma sequência finita de passos.",
            "Criador de exemplos contextualizados" => "1. **Receita de bolo**: passos em ordem.",
            "Criador de exercícios práticos" => "1. V/F: todo algoritmo termina?",
            _ => "1. Resposta: V. Comentário: por definição, é finito.",
        };
        Ok(text.to_string())
    });

    let ctx = ExecCtx::builder("http://unused")
        .backend(Arc::new(mock))
        .build()?;

    let def = presets::study();
    let raw = Inputs::new()
        .with("tema", "Algoritmos")
        .with("objetivo", "Entender conceitos");
    let resolved = def.resolve(&raw)?;

    println!("Steps: {:?}", resolved.pipeline.step_names());
    let outputs = resolved
        .pipeline
        .execute(&ctx, resolved.inputs)
        .await?
        .into_result()?;

    for output in &outputs {
        let label = def.label_for(&output.name).unwrap_or(&output.name);
        println!("\n== {} ==\n{}", label, output.text);
    }
    Ok(())
}
