//! Provider settings and definition files.

use crate::{
    backend::{openai::GROQ_BASE_URL, BackoffConfig},
    definition::PipelineDefinition,
    error::Result,
    exec_ctx::{ExecCtx, ExecCtxBuilder, DEFAULT_TIMEOUT},
    PipelineError,
};
use std::path::Path;
use std::time::Duration;

pub const ENV_BASE_URL: &str = "CREW_BASE_URL";
pub const ENV_API_KEY: &str = "GROQ_API_KEY";
pub const ENV_MODEL: &str = "CREW_MODEL";
pub const ENV_TIMEOUT_SECS: &str = "CREW_TIMEOUT_SECS";
pub const ENV_RETRIES: &str = "CREW_RETRIES";

/// Where and how to reach the text-generation provider.
#[derive(Clone, PartialEq)]
pub struct ProviderSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Overrides the model of the pipeline definition.
    pub model: Option<String>,
    pub timeout: Duration,
    /// Transport retries for 429/5xx. Zero disables backoff.
    pub retries: u32,
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .field("retries", &self.retries)
            .finish()
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: GROQ_BASE_URL.to_string(),
            api_key: None,
            model: None,
            timeout: DEFAULT_TIMEOUT,
            retries: 0,
        }
    }
}

impl ProviderSettings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary lookup (environment, config map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut settings = Self::default();

        if let Some(url) = get(ENV_BASE_URL) {
            settings.base_url = url;
        }
        settings.api_key = get(ENV_API_KEY);
        settings.model = get(ENV_MODEL);
        if let Some(secs) = get(ENV_TIMEOUT_SECS) {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                PipelineError::config(format!("{} must be a whole number of seconds", ENV_TIMEOUT_SECS))
            })?;
            settings.timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = get(ENV_RETRIES) {
            settings.retries = retries.trim().parse().map_err(|_| {
                PipelineError::config(format!("{} must be a non-negative integer", ENV_RETRIES))
            })?;
        }
        Ok(settings)
    }

    /// Transport backoff matching `retries`.
    pub fn backoff(&self) -> BackoffConfig {
        if self.retries == 0 {
            BackoffConfig::none()
        } else {
            BackoffConfig::standard().with_max_retries(self.retries)
        }
    }

    /// A context builder for the OpenAI-compatible backend.
    pub fn ctx_builder(&self) -> ExecCtxBuilder {
        let builder = ExecCtx::builder(self.base_url.clone())
            .timeout(self.timeout)
            .backoff(self.backoff());
        match self.api_key {
            Some(ref key) => builder.openai_with_key(key.clone()),
            None => builder,
        }
    }
}

impl PipelineDefinition {
    /// Load a definition from a `.json` file, or `.yaml`/`.yml` with the
    /// `yaml` feature. The definition is checked before it is returned.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content),
            _ => Self::from_json_str(&content),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let def: PipelineDefinition = serde_json::from_str(json)?;
        def.check()?;
        Ok(def)
    }

    #[cfg(feature = "yaml")]
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let def: PipelineDefinition = serde_yaml::from_str(yaml)?;
        def.check()?;
        Ok(def)
    }

    #[cfg(not(feature = "yaml"))]
    pub fn from_yaml_str(_yaml: &str) -> Result<Self> {
        Err(PipelineError::config(
            "YAML definitions require the `yaml` feature",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_point_at_groq() {
        let settings = ProviderSettings::from_lookup(|_| None).unwrap();
        assert_eq!(settings.base_url, GROQ_BASE_URL);
        assert!(settings.api_key.is_none());
        assert_eq!(settings.timeout, DEFAULT_TIMEOUT);
        assert_eq!(settings.backoff().max_retries, 0);
    }

    #[test]
    fn test_lookup_overrides() {
        let settings = ProviderSettings::from_lookup(lookup(&[
            (ENV_BASE_URL, "http://localhost:11434/v1"),
            (ENV_API_KEY, "gsk_secret"),
            (ENV_MODEL, "llama3.2"),
            (ENV_TIMEOUT_SECS, "90"),
            (ENV_RETRIES, "3"),
        ]))
        .unwrap();
        assert_eq!(settings.model.as_deref(), Some("llama3.2"));
        assert_eq!(settings.timeout, Duration::from_secs(90));
        assert_eq!(settings.backoff().max_retries, 3);
        assert!(!format!("{:?}", settings).contains("gsk_secret"));

        let ctx = settings.ctx_builder().build().unwrap();
        assert_eq!(ctx.base_url, "http://localhost:11434");
    }

    #[test]
    fn test_blank_values_ignored() {
        let settings = ProviderSettings::from_lookup(lookup(&[(ENV_API_KEY, "  ")])).unwrap();
        assert!(settings.api_key.is_none());
    }

    #[test]
    fn test_bad_numbers_rejected() {
        let result = ProviderSettings::from_lookup(lookup(&[(ENV_TIMEOUT_SECS, "soon")]));
        assert!(matches!(result, Err(PipelineError::Configuration(_))));
    }

    #[test]
    fn test_definition_from_json_str_is_checked() {
        let bad = r#"{"name": "x", "steps": []}"#;
        assert!(matches!(
            PipelineDefinition::from_json_str(bad),
            Err(PipelineError::Configuration(_))
        ));

        let good = r#"{"name": "x", "steps": [{"name": "a", "role": "r", "prompt": "{tema}"}]}"#;
        let def = PipelineDefinition::from_json_str(good).unwrap();
        assert_eq!(def.steps.len(), 1);
    }

    #[test]
    fn test_definition_from_file() {
        let path = std::env::temp_dir().join(format!("crew-def-{}.json", std::process::id()));
        let json = serde_json::to_string_pretty(&crate::presets::recipe()).unwrap();
        std::fs::write(&path, json).unwrap();

        let def = PipelineDefinition::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(def.name, "recipe");
        assert_eq!(def.label_for("pairing"), Some("Harmonizações"));
    }

    #[cfg(feature = "yaml")]
    #[test]
    fn test_definition_from_yaml_str() {
        let yaml = "name: mini\ntemperature: 0.2\nsteps:\n  - name: a\n    role: Tutor\n    prompt: Explique {tema}\n";
        let def = PipelineDefinition::from_yaml_str(yaml).unwrap();
        assert_eq!(def.temperature, 0.2);
    }
}
