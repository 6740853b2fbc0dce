//! Built-in pipeline definitions.
//!
//! Three form-driven assistants, each a short chain of personas writing
//! Brazilian Portuguese markdown:
//!
//! - [`study`]: summary, examples, exercises and an optional answer key for
//!   any study topic.
//! - [`language`]: a language lesson (theory, conversation examples,
//!   exercises, optional answer key with pronunciation tips).
//! - [`recipe`]: a cooking assistant (introduction, recipe, tips, optional
//!   pairings).

use crate::definition::{PipelineDefinition, StepDefinition};
use crate::input::{InputField, InputSchema};
use crate::step::StepSpec;

/// Names accepted by [`by_name`].
pub const NAMES: [&str; 3] = ["study", "language", "recipe"];

/// Look up a preset by name.
pub fn by_name(name: &str) -> Option<PipelineDefinition> {
    match name {
        "study" => Some(study()),
        "language" => Some(language()),
        "recipe" => Some(recipe()),
        _ => None,
    }
}

/// Every preset, in [`NAMES`] order.
pub fn all() -> Vec<PipelineDefinition> {
    vec![study(), language(), recipe()]
}

fn definition(
    name: &str,
    title: &str,
    description: &str,
    temperature: f64,
    inputs: Vec<InputField>,
    steps: Vec<StepDefinition>,
) -> PipelineDefinition {
    let mut def = PipelineDefinition::new(name);
    def.title = Some(title.to_string());
    def.description = Some(description.to_string());
    def.temperature = temperature;
    def.inputs = InputSchema::new(inputs);
    def.steps = steps;
    def
}

/// Study material generator.
pub fn study() -> PipelineDefinition {
    let summary = StepSpec::new(
        "summary",
        "Redator de resumo didático",
        "RESUMO: escreva em português do Brasil um resumo didático sobre {tema} e objetivo {objetivo}. \
         Inclua: definição (3-4 frases), por que importa (2-3), onde se aplica (2-3), e 4-6 ideias-chave, \
         com marcadores. Formate em Markdown com título.",
    )
    .with_goal(
        "Escrever RESUMO claro e didático sobre {tema} alinhado com o objetivo: {objetivo}. \
         A linguagem deve ser didática, direta, com contexto prático e sem jargões.",
    )
    .with_backstory("Você transforma temas técnicos e acadêmicos em explicações curtas e precisas.")
    .with_expected_output("Resumo em Markdown com título, parágrafos curtos e 4-6 marcadores.");

    let examples = StepSpec::new(
        "examples",
        "Criador de exemplos contextualizados",
        "EXEMPLOS: produza 4 exemplos curtos e contextualizados sobre {tema}. \
         Padrão (até 5 linhas cada): título, cenário, dados/entrada, como aplicar (1-2 frases), resultado.",
    )
    .with_goal(
        "Gerar EXEMPLOS CURTOS sobre {tema}, cada um com contexto realista. \
         Cada exemplo com título (em negrito), cenário, dados (se houver), aplicação e resultado.",
    )
    .with_backstory("Você mostra o conceito em ação com exemplos breves e concretos.")
    .with_expected_output("Lista numerada (1-4) em Markdown com exemplos curtos e completos.");

    let exercises = StepSpec::new(
        "exercises",
        "Criador de exercícios práticos",
        "EXERCÍCIOS: crie 4 exercícios simples sobre {tema} em português do Brasil. \
         Varie formatos e não inclua respostas. Entregue lista numerada (1-4) em Markdown.",
    )
    .with_goal(
        "Criar 4 EXERCÍCIOS SIMPLES sobre {tema}. \
         Variar formato (múltipla escolha, V/F, completar, resolução curta). \
         Enunciados claros. NÃO incluir respostas.",
    )
    .with_backstory("Você cria atividades rápidas que fixam os conceitos essenciais.")
    .with_expected_output("Lista numerada (1-4) com exercícios simples, sem respostas.");

    let answer_key = StepSpec::new(
        "answer_key",
        "Revisor e gabaritador",
        "GABARITO: com base nos EXERCÍCIOS fornecidos no contexto, produza as respostas corretas. \
         Para cada item, dê:\n\
         - Resposta: (letra, valor, solução)\n\
         - Comentário: justificativa breve e direta (1-2 frases), citando o conceito-chave\n\
         Formato: lista numerada (1 a 4) em Markdown.",
    )
    .with_goal(
        "Ler os EXERCÍCIOS sobre {tema} e produzir o GABARITO oficial, \
         com respostas corretas e justificativa breve (1-3 frases) por item.",
    )
    .with_backstory("Você confere consistência e explica rapidamente o porquê da resposta.")
    .with_expected_output("Lista numerada (1-4) com resposta e comentário por exercício.")
    .depends_on("exercises");

    definition(
        "study",
        "Agentes para estudo",
        "Informe o tema e gere material para estudar.",
        0.3,
        vec![
            InputField::required_text("tema").with_label("Tema de estudo"),
            InputField::text_with_default("objetivo", "não informado").with_label("Objetivo"),
            InputField::toggle("mostrar_gabarito", true).with_label("Gerar gabarito"),
        ],
        vec![
            StepDefinition::new(summary).with_label("Resumo"),
            StepDefinition::new(examples).with_label("Exemplos"),
            StepDefinition::new(exercises).with_label("Exercícios"),
            StepDefinition::new(answer_key)
                .with_label("Gabarito")
                .enabled_when("mostrar_gabarito"),
        ],
    )
}

/// Language lesson assistant.
pub fn language() -> PipelineDefinition {
    let theory = StepSpec::new(
        "theory",
        "Professor(a) de Idiomas",
        "EXPLICAÇÃO TEÓRICA\n\
         Explique o tema {tema} no idioma {idioma} para o nível {nivel}. \
         Considere o objetivo do aluno: {objetivo}. \
         Inclua definição, quando usar, exemplos e 3–5 dicas rápidas. \
         Formate em Markdown, misturando idioma e tradução.",
    )
    .with_goal(
        "Ensinar o tema {tema} do idioma {idioma} para um aluno de nível {nivel}. \
         Deve explicar regras, exemplos e variações. Linguagem acessível, \
         sem jargão técnico e com traduções simples.",
    )
    .with_backstory(
        "Você é um professor de idiomas experiente que transforma tópicos difíceis em explicações simples e envolventes.",
    )
    .with_expected_output("Texto didático e bem formatado em Markdown.");

    let examples = StepSpec::new(
        "examples",
        "Criador(a) de Exemplos de Conversação",
        "EXEMPLOS PRÁTICOS\n\
         Crie 4 exemplos reais sobre {tema} no idioma {idioma}. \
         Cada um com: frase original, tradução e nota explicativa (em 1 linha).",
    )
    .with_goal(
        "Gerar 4 exemplos curtos e contextualizados sobre {tema} no idioma {idioma}. \
         Inclua frases originais, tradução e breve explicação de uso.",
    )
    .with_backstory(
        "Você cria exemplos práticos e naturais, simulando situações reais de conversação.",
    )
    .with_expected_output("Lista numerada (1–4) com exemplos e traduções.");

    let exercises = StepSpec::new(
        "exercises",
        "Autor(a) de Exercícios de Idiomas",
        "EXERCÍCIOS\n\
         Crie 3 exercícios curtos para praticar {tema} no idioma {idioma}. \
         Não inclua respostas. Formato variado e divertido.",
    )
    .with_goal(
        "Criar 3 exercícios curtos sobre {tema} no idioma {idioma}. \
         Varie formatos (completar, múltipla escolha, tradução, correção). \
         Não inclua respostas.",
    )
    .with_backstory(
        "Você cria atividades divertidas e educativas para praticar vocabulário e gramática.",
    )
    .with_expected_output("Lista numerada (1–3) com enunciados curtos.");

    let answer_key = StepSpec::new(
        "answer_key",
        "Revisor(a) e Instrutor(a) de Pronúncia",
        "GABARITO E DICAS\n\
         Responda corretamente aos exercícios abaixo.\n\n\
         {exercises}\n\n\
         Para cada um: resposta + justificativa curta + dica de pronúncia.",
    )
    .with_goal(
        "Gerar o gabarito dos exercícios e incluir uma dica de pronúncia relacionada ao tema {tema} \
         no idioma {idioma}. Resposta + breve justificativa + dica de pronúncia.",
    )
    .with_backstory(
        "Você é um professor nativo com excelente didática, que revisa respostas e dá dicas úteis de fala e sotaque.",
    )
    .with_expected_output("Lista numerada (1–3) com respostas, explicações e dicas de fala.")
    .depends_on("exercises");

    definition(
        "language",
        "LinguAI — Assistente Inteligente de Idiomas",
        "Aprenda e pratique idiomas com ajuda de agentes especializados.",
        0.3,
        vec![
            InputField::choice("idioma", ["Inglês", "Espanhol", "Francês", "Alemão", "Italiano"])
                .with_label("Idioma"),
            InputField::required_text("tema").with_label("Tema do estudo"),
            InputField::choice("nivel", ["Iniciante", "Intermediário", "Avançado"])
                .with_label("Nível do aluno"),
            InputField::text_with_default("objetivo", "não informado")
                .with_label("Objetivo (opcional)"),
            InputField::toggle("mostrar_gabarito", true)
                .with_label("Gerar gabarito e dicas de pronúncia"),
        ],
        vec![
            StepDefinition::new(theory).with_label("Teoria"),
            StepDefinition::new(examples).with_label("Exemplos"),
            StepDefinition::new(exercises).with_label("Exercícios"),
            StepDefinition::new(answer_key)
                .with_label("Gabarito e Pronúncia")
                .enabled_when("mostrar_gabarito"),
        ],
    )
}

/// Cooking assistant.
pub fn recipe() -> PipelineDefinition {
    let introduction = StepSpec::new(
        "introduction",
        "Historiador(a) Gastronômico(a)",
        "INTRODUÇÃO CULINÁRIA\n\
         Explique a origem ou contexto do prato {prato}. \
         Conte curiosidades e o porquê de ser interessante para o público de nível {nivel}. \
         Tom envolvente e convidativo, em até 150 palavras.",
    )
    .with_goal(
        "Apresentar o prato {prato}, sua origem ou contexto cultural, \
         e o motivo de ser uma boa escolha para o nível {nivel}. \
         Estilo leve, curioso e inspirador.",
    )
    .with_backstory(
        "Você é um amante da gastronomia que adora contar histórias sobre os pratos e ingredientes.",
    )
    .with_expected_output("Texto introdutório com curiosidades e contexto cultural.");

    let recipe = StepSpec::new(
        "recipe",
        "Chef Profissional",
        "RECEITA DETALHADA\n\
         Culinária preferida: {cozinha}. \
         Liste os ingredientes com quantidades para {porcoes} porções, \
         seguido do modo de preparo numerado, com passos curtos e claros. \
         Formato Markdown.",
    )
    .with_goal(
        "Escrever uma receita detalhada de {prato}, com ingredientes, quantidades e modo de preparo \
         passo a passo, adequada a {porcoes} porções e nível {nivel}.",
    )
    .with_backstory("Você é um chef renomado que explica receitas com precisão e clareza.")
    .with_expected_output("Receita completa com ingredientes e modo de preparo formatados.");

    let tips = StepSpec::new(
        "tips",
        "Consultor(a) Culinário(a)",
        "DICAS E VARIAÇÕES\n\
         Forneça de 3 a 5 dicas curtas sobre como melhorar, variar ou adaptar a receita {prato}. \
         Inclua ideias para versões vegetarianas, rápidas ou gourmet.",
    )
    .with_goal(
        "Gerar 3–5 dicas extras e variações criativas para a receita {prato}, \
         considerando possíveis substituições de ingredientes, adaptações para dietas e truques de sabor.",
    )
    .with_backstory(
        "Você é um consultor de cozinha criativo que sempre tem boas ideias para aprimorar receitas.",
    )
    .with_expected_output("Lista de dicas em Markdown, numerada (1–5).");

    let pairing = StepSpec::new(
        "pairing",
        "Sommelier e Harmonizador(a)",
        "HARMONIZAÇÕES\n\
         Sugira 1–2 bebidas, 1 acompanhamento e 1 sobremesa que combinem com {prato}. \
         Inclua breve justificativa de cada sugestão.",
    )
    .with_goal(
        "Gerar sugestões de bebidas, acompanhamentos e sobremesas que harmonizam bem com {prato}. \
         Inclua 1–2 bebidas, 1 acompanhamento e 1 sobremesa compatível.",
    )
    .with_backstory(
        "Você é um sommelier experiente com paladar apurado, que entende combinações de sabores.",
    )
    .with_expected_output("Lista organizada por categoria (bebidas, acompanhamento, sobremesa).");

    definition(
        "recipe",
        "ChefAI — Seu Assistente Culinário Inteligente",
        "Descubra, aprenda e prepare receitas criadas por agentes especializados.",
        0.4,
        vec![
            InputField::required_text("prato")
                .with_label("Nome da receita ou ingrediente principal"),
            InputField::choice(
                "cozinha",
                [
                    "Não especificar",
                    "Italiana",
                    "Brasileira",
                    "Japonesa",
                    "Mexicana",
                    "Francesa",
                    "Vegana",
                ],
            )
            .with_label("Tipo de culinária (opcional)"),
            InputField::choice("nivel", ["Fácil", "Médio", "Avançado"])
                .with_label("Nível de dificuldade"),
            InputField::number("porcoes", 1.0, 20.0, 4.0).with_label("Número de porções"),
            InputField::toggle("mostrar_harmonizacao", true)
                .with_label("Gerar harmonizações (bebidas, acompanhamentos, etc.)"),
        ],
        vec![
            StepDefinition::new(introduction).with_label("Introdução"),
            StepDefinition::new(recipe).with_label("Receita"),
            StepDefinition::new(tips).with_label("Dicas"),
            StepDefinition::new(pairing)
                .with_label("Harmonizações")
                .enabled_when("mostrar_harmonizacao"),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, MockBackend};
    use crate::input::Inputs;
    use crate::{ExecCtx, PipelineError};
    use std::sync::Arc;

    fn mock_ctx(mock: Arc<MockBackend>) -> ExecCtx {
        let backend: Arc<dyn Backend> = mock;
        ExecCtx::builder("http://unused")
            .backend(backend)
            .build()
            .unwrap()
    }

    #[test]
    fn test_every_preset_is_well_formed() {
        for def in all() {
            let pipeline = def.check().unwrap();
            assert_eq!(pipeline.step_names().len(), 4, "{}", def.name);
        }
        assert_eq!(
            all().iter().map(|d| d.name.as_str()).collect::<Vec<_>>(),
            NAMES.to_vec()
        );
        assert!(by_name("poetry").is_none());
    }

    #[test]
    fn test_recipe_portions_bounds() {
        let def = recipe();
        for bad in [0i64, 25] {
            let raw = Inputs::new().with("prato", "Brownie").with("porcoes", bad);
            assert!(matches!(
                def.resolve(&raw),
                Err(PipelineError::Configuration(_))
            ));
        }
        let ok = def
            .resolve(&Inputs::new().with("prato", "Brownie").with("porcoes", 20i64))
            .unwrap();
        assert_eq!(ok.inputs.get("porcoes").map(|p| p.to_string()), Some("20".into()));
        assert_eq!(ok.pipeline.config().temperature, 0.4);
    }

    #[test]
    fn test_study_required_inputs() {
        let pipeline = study().check().unwrap();
        assert_eq!(pipeline.required_inputs(), &["tema", "objetivo"]);
    }

    #[tokio::test]
    async fn test_language_lesson_without_answer_key() {
        let raw = Inputs::new()
            .with("tema", "Present Perfect")
            .with("nivel", "Iniciante")
            .with("mostrar_gabarito", false);
        let resolved = language().resolve(&raw).unwrap();
        assert_eq!(resolved.inputs.get("idioma").map(|i| i.to_string()), Some("Inglês".into()));

        let mock = Arc::new(MockBackend::echo());
        let outcome = resolved
            .pipeline
            .execute(&mock_ctx(mock.clone()), resolved.inputs)
            .await
            .unwrap();

        assert!(outcome.is_complete());
        assert_eq!(outcome.outputs.names(), vec!["theory", "examples", "exercises"]);
        assert!(outcome.outputs.get("answer_key").is_none());
        assert_eq!(mock.call_count(), 3);

        let first = &mock.requests()[0];
        assert!(first.prompt.contains("Present Perfect"));
        assert!(first.prompt.contains("não informado"));
        assert!(first.persona.goal.contains("nível Iniciante"));
    }

    #[tokio::test]
    async fn test_study_answer_key_reads_exercises_as_context() {
        let resolved = study()
            .resolve(&Inputs::new().with("tema", "Algoritmos"))
            .unwrap();
        let mock = Arc::new(MockBackend::echo());
        let outcome = resolved
            .pipeline
            .execute(&mock_ctx(mock.clone()), resolved.inputs)
            .await
            .unwrap();

        assert_eq!(
            outcome.outputs.names(),
            vec!["summary", "examples", "exercises", "answer_key"]
        );
        let exercises = outcome.outputs.text("exercises").unwrap();
        let last = &mock.requests()[3];
        assert!(last
            .prompt
            .ends_with(&format!("## Context: exercises\n{}", exercises)));
    }
}
