//! Typed user inputs and the schema that re-validates them.
//!
//! Form front ends collect values with widgets (text boxes, selects, number
//! spinners, checkboxes). The pipeline never trusts that the widget did its
//! job: [`InputSchema::validate`] checks every field again, fills defaults,
//! and rejects out-of-range values instead of clamping them.

use crate::{error::Result, PipelineError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// A single input value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
    Flag(bool),
    Number(f64),
    Text(String),
}

impl InputValue {
    /// Whether this value is empty text.
    pub fn is_blank(&self) -> bool {
        matches!(self, InputValue::Text(s) if s.trim().is_empty())
    }
}

impl fmt::Display for InputValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputValue::Flag(b) => write!(f, "{}", b),
            InputValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            InputValue::Number(n) => write!(f, "{}", n),
            InputValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for InputValue {
    fn from(s: &str) -> Self {
        InputValue::Text(s.to_string())
    }
}

impl From<String> for InputValue {
    fn from(s: String) -> Self {
        InputValue::Text(s)
    }
}

impl From<f64> for InputValue {
    fn from(n: f64) -> Self {
        InputValue::Number(n)
    }
}

impl From<i64> for InputValue {
    fn from(n: i64) -> Self {
        InputValue::Number(n as f64)
    }
}

impl From<bool> for InputValue {
    fn from(b: bool) -> Self {
        InputValue::Flag(b)
    }
}

/// Named inputs for a run. Immutable once the run starts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Inputs {
    values: BTreeMap<String, InputValue>,
}

impl Inputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<InputValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<InputValue>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&InputValue> {
        self.values.get(name)
    }

    /// The flag value of a toggle, if the input is a flag.
    pub fn flag(&self, name: &str) -> Option<bool> {
        match self.values.get(name) {
            Some(InputValue::Flag(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &InputValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Substitution view: every value rendered as text.
    pub(crate) fn to_vars(&self) -> HashMap<String, String> {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .collect()
    }
}

impl<K: Into<String>, V: Into<InputValue>> FromIterator<(K, V)> for Inputs {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut inputs = Inputs::new();
        for (k, v) in iter {
            inputs.insert(k, v);
        }
        inputs
    }
}

/// What kind of widget collects a field, and its constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputKind {
    /// Free text.
    Text {
        #[serde(default)]
        required: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<String>,
    },
    /// One of a fixed list of options.
    Choice {
        options: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<String>,
    },
    /// A number within `[min, max]`.
    Number {
        min: f64,
        max: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<f64>,
    },
    /// A boolean checkbox.
    Toggle {
        #[serde(default)]
        default: bool,
    },
}

/// One field of an input form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputField {
    /// Variable name used by templates.
    pub name: String,

    /// Human-facing label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(flatten)]
    pub kind: InputKind,
}

impl InputField {
    pub fn text(name: impl Into<String>) -> Self {
        Self::with_kind(
            name,
            InputKind::Text {
                required: false,
                default: None,
            },
        )
    }

    pub fn required_text(name: impl Into<String>) -> Self {
        Self::with_kind(
            name,
            InputKind::Text {
                required: true,
                default: None,
            },
        )
    }

    pub fn text_with_default(name: impl Into<String>, default: impl Into<String>) -> Self {
        Self::with_kind(
            name,
            InputKind::Text {
                required: false,
                default: Some(default.into()),
            },
        )
    }

    pub fn choice<S: Into<String>>(
        name: impl Into<String>,
        options: impl IntoIterator<Item = S>,
    ) -> Self {
        Self::with_kind(
            name,
            InputKind::Choice {
                options: options.into_iter().map(Into::into).collect(),
                default: None,
            },
        )
    }

    pub fn number(name: impl Into<String>, min: f64, max: f64, default: f64) -> Self {
        Self::with_kind(
            name,
            InputKind::Number {
                min,
                max,
                default: Some(default),
            },
        )
    }

    pub fn toggle(name: impl Into<String>, default: bool) -> Self {
        Self::with_kind(name, InputKind::Toggle { default })
    }

    /// Set the human-facing label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    fn with_kind(name: impl Into<String>, kind: InputKind) -> Self {
        Self {
            name: name.into(),
            label: None,
            kind,
        }
    }

    pub fn is_toggle(&self) -> bool {
        matches!(self.kind, InputKind::Toggle { .. })
    }

    /// Validate one raw value. `Ok(None)` means the field stays unset.
    fn validate(&self, raw: Option<&InputValue>) -> Result<Option<InputValue>> {
        let raw = raw.filter(|v| !v.is_blank());
        match &self.kind {
            InputKind::Text { required, default } => match raw {
                Some(value) => Ok(Some(InputValue::Text(value.to_string().trim().to_string()))),
                None => match default {
                    Some(d) => Ok(Some(InputValue::Text(d.clone()))),
                    None if *required => Err(PipelineError::MissingInput {
                        name: self.name.clone(),
                    }),
                    None => Ok(None),
                },
            },
            InputKind::Choice { options, default } => {
                let chosen = match raw {
                    Some(value) => value.to_string().trim().to_string(),
                    None => match default.as_ref().or(options.first()) {
                        Some(d) => d.clone(),
                        None => {
                            return Err(PipelineError::config(format!(
                                "input '{}' has no options",
                                self.name
                            )))
                        }
                    },
                };
                if !options.contains(&chosen) {
                    return Err(PipelineError::config(format!(
                        "input '{}': '{}' is not one of [{}]",
                        self.name,
                        chosen,
                        options.join(", ")
                    )));
                }
                Ok(Some(InputValue::Text(chosen)))
            }
            InputKind::Number { min, max, default } => {
                let n = match raw {
                    Some(InputValue::Number(n)) => *n,
                    Some(InputValue::Text(s)) => s.trim().parse::<f64>().map_err(|_| {
                        PipelineError::config(format!(
                            "input '{}': '{}' is not a number",
                            self.name,
                            s.trim()
                        ))
                    })?,
                    Some(InputValue::Flag(_)) => {
                        return Err(PipelineError::config(format!(
                            "input '{}' expects a number",
                            self.name
                        )))
                    }
                    None => match default {
                        Some(d) => *d,
                        None => {
                            return Err(PipelineError::MissingInput {
                                name: self.name.clone(),
                            })
                        }
                    },
                };
                if !n.is_finite() || n < *min || n > *max {
                    return Err(PipelineError::config(format!(
                        "input '{}': {} is outside [{}, {}]",
                        self.name,
                        InputValue::Number(n),
                        InputValue::Number(*min),
                        InputValue::Number(*max)
                    )));
                }
                Ok(Some(InputValue::Number(n)))
            }
            InputKind::Toggle { default } => {
                let flag = match raw {
                    None => *default,
                    Some(value) => parse_flag(value).ok_or_else(|| {
                        PipelineError::config(format!(
                            "input '{}': '{}' is not a yes/no value",
                            self.name, value
                        ))
                    })?,
                };
                Ok(Some(InputValue::Flag(flag)))
            }
        }
    }
}

fn parse_flag(value: &InputValue) -> Option<bool> {
    match value {
        InputValue::Flag(b) => Some(*b),
        InputValue::Number(n) if *n == 1.0 => Some(true),
        InputValue::Number(n) if *n == 0.0 => Some(false),
        InputValue::Number(_) => None,
        InputValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        },
    }
}

/// An ordered list of input fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputSchema {
    fields: Vec<InputField>,
}

impl InputSchema {
    pub fn new(fields: Vec<InputField>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[InputField] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&InputField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Re-validate raw values: fill defaults, check requirements, choices
    /// and bounds. Names the schema does not declare are passed through.
    pub fn validate(&self, raw: &Inputs) -> Result<Inputs> {
        let mut validated = Inputs::new();
        for field in &self.fields {
            if let Some(value) = field.validate(raw.get(&field.name))? {
                validated.insert(field.name.clone(), value);
            }
        }
        for (name, value) in raw.iter() {
            if self.field(name).is_none() {
                validated.insert(name, value.clone());
            }
        }
        Ok(validated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn portions_schema() -> InputSchema {
        InputSchema::new(vec![
            InputField::required_text("prato"),
            InputField::number("porcoes", 1.0, 20.0, 4.0),
        ])
    }

    #[test]
    fn test_display_whole_numbers_without_fraction() {
        assert_eq!(InputValue::Number(4.0).to_string(), "4");
        assert_eq!(InputValue::Number(2.5).to_string(), "2.5");
        assert_eq!(InputValue::Flag(true).to_string(), "true");
    }

    #[test]
    fn test_untagged_deserialize() {
        let inputs: Inputs =
            serde_json::from_str(r#"{"prato": "Brownie", "porcoes": 6, "mostrar": false}"#)
                .unwrap();
        assert_eq!(inputs.get("prato"), Some(&InputValue::Text("Brownie".into())));
        assert_eq!(inputs.get("porcoes"), Some(&InputValue::Number(6.0)));
        assert_eq!(inputs.flag("mostrar"), Some(false));
    }

    #[test]
    fn test_required_text_missing_or_blank() {
        let schema = portions_schema();
        for raw in [Inputs::new(), Inputs::new().with("prato", "   ")] {
            match schema.validate(&raw) {
                Err(PipelineError::MissingInput { name }) => assert_eq!(name, "prato"),
                other => panic!("Expected MissingInput, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_number_defaults_and_parses_text() {
        let schema = portions_schema();
        let v = schema.validate(&Inputs::new().with("prato", "Brownie")).unwrap();
        assert_eq!(v.get("porcoes"), Some(&InputValue::Number(4.0)));

        let v = schema
            .validate(&Inputs::new().with("prato", "Brownie").with("porcoes", "12"))
            .unwrap();
        assert_eq!(v.get("porcoes").map(|p| p.to_string()), Some("12".into()));
    }

    #[test]
    fn test_number_out_of_range_rejected_not_clamped() {
        let schema = portions_schema();
        for bad in [0i64, 25] {
            let raw = Inputs::new().with("prato", "Brownie").with("porcoes", bad);
            assert!(matches!(
                schema.validate(&raw),
                Err(PipelineError::Configuration(_))
            ));
        }
        let raw = Inputs::new().with("prato", "Brownie").with("porcoes", "muitas");
        assert!(matches!(
            schema.validate(&raw),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn test_choice_default_and_unknown_option() {
        let schema = InputSchema::new(vec![InputField::choice(
            "nivel",
            ["Iniciante", "Intermediário", "Avançado"],
        )]);
        let v = schema.validate(&Inputs::new()).unwrap();
        assert_eq!(v.get("nivel").map(|n| n.to_string()), Some("Iniciante".into()));

        let err = schema
            .validate(&Inputs::new().with("nivel", "Expert"))
            .unwrap_err();
        assert!(err.to_string().contains("Expert"));
    }

    #[test]
    fn test_optional_text_default() {
        let schema = InputSchema::new(vec![InputField::text_with_default(
            "objetivo",
            "não informado",
        )]);
        let v = schema.validate(&Inputs::new()).unwrap();
        assert_eq!(v.get("objetivo").map(|o| o.to_string()), Some("não informado".into()));
    }

    #[test]
    fn test_toggle_parsing() {
        let schema = InputSchema::new(vec![InputField::toggle("mostrar_gabarito", true)]);
        assert_eq!(schema.validate(&Inputs::new()).unwrap().flag("mostrar_gabarito"), Some(true));
        let v = schema
            .validate(&Inputs::new().with("mostrar_gabarito", "no"))
            .unwrap();
        assert_eq!(v.flag("mostrar_gabarito"), Some(false));
        assert!(schema
            .validate(&Inputs::new().with("mostrar_gabarito", "talvez"))
            .is_err());
    }

    #[test]
    fn test_unknown_inputs_pass_through() {
        let schema = portions_schema();
        let v = schema
            .validate(&Inputs::new().with("prato", "Brownie").with("extra", "x"))
            .unwrap();
        assert_eq!(v.get("extra"), Some(&InputValue::Text("x".into())));
    }

    #[test]
    fn test_field_deserialize_flattened_kind() {
        let field: InputField = serde_json::from_str(
            r#"{"name": "porcoes", "label": "Porções", "kind": "number", "min": 1, "max": 20, "default": 4}"#,
        )
        .unwrap();
        assert_eq!(field.label.as_deref(), Some("Porções"));
        assert_eq!(
            field.kind,
            InputKind::Number {
                min: 1.0,
                max: 20.0,
                default: Some(4.0)
            }
        );
    }
}
