//! Prompt templates with `{name}` placeholders.
//!
//! A [`Template`] is parsed once, when the step list is assembled, so the set
//! of variables it needs is known before any provider call. Rendering against
//! a substitution mapping either fills every placeholder or reports the first
//! one it could not resolve.
//!
//! Use `{{` to insert a literal `{` and `}}` to insert a literal `}`. Brace
//! text that is not a valid identifier (e.g. `{ a: 1 }`) is left as-is.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A parsed prompt template.
///
/// # Example
///
/// ```
/// use crew_pipeline::template::Template;
/// use std::collections::HashMap;
///
/// let template = Template::parse("Explain {tema} for level {nivel}. JSON: {{\"ok\": true}}");
/// assert_eq!(template.placeholders(), vec!["tema", "nivel"]);
///
/// let vars = HashMap::from([
///     ("tema".to_string(), "Present Perfect".to_string()),
///     ("nivel".to_string(), "Iniciante".to_string()),
/// ]);
/// let rendered = template.render(&vars).unwrap();
/// assert_eq!(rendered, r#"Explain Present Perfect for level Iniciante. JSON: {"ok": true}"#);
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

/// A placeholder that had no value in the substitution mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedPlaceholder(pub String);

impl fmt::Display for UnresolvedPlaceholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unresolved placeholder '{{{}}}'", self.0)
    }
}

impl std::error::Error for UnresolvedPlaceholder {}

impl Template {
    /// Parse a template. Parsing never fails; malformed braces stay literal.
    pub fn parse(source: impl Into<String>) -> Self {
        let source = source.into();
        let segments = scan(&source);
        Self { source, segments }
    }

    /// The original template text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether the template text is empty or whitespace only.
    pub fn is_blank(&self) -> bool {
        self.source.trim().is_empty()
    }

    /// Distinct placeholder names, in order of first appearance.
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for segment in &self.segments {
            if let Segment::Placeholder(name) = segment {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Whether the template references `name`.
    pub fn references(&self, name: &str) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Placeholder(p) if p == name))
    }

    /// Substitute every placeholder from `vars`.
    pub fn render(
        &self,
        vars: &HashMap<String, String>,
    ) -> std::result::Result<String, UnresolvedPlaceholder> {
        let mut rendered = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => rendered.push_str(text),
                Segment::Placeholder(name) => match vars.get(name) {
                    Some(value) => rendered.push_str(value),
                    None => return Err(UnresolvedPlaceholder(name.clone())),
                },
            }
        }
        Ok(rendered)
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Template").field(&self.source).finish()
    }
}

impl From<String> for Template {
    fn from(source: String) -> Self {
        Self::parse(source)
    }
}

impl From<&str> for Template {
    fn from(source: &str) -> Self {
        Self::parse(source)
    }
}

impl From<Template> for String {
    fn from(template: Template) -> Self {
        template.source
    }
}

fn is_ident(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn scan(source: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut rest = source;

    while let Some(idx) = rest.find(['{', '}']) {
        literal.push_str(&rest[..idx]);
        let tail = &rest[idx..];

        if let Some(after) = tail.strip_prefix("{{") {
            literal.push('{');
            rest = after;
        } else if let Some(after) = tail.strip_prefix("}}") {
            literal.push('}');
            rest = after;
        } else if tail.starts_with('{') {
            match tail[1..].find('}') {
                Some(end) if is_ident(&tail[1..1 + end]) => {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder(tail[1..1 + end].to_string()));
                    rest = &tail[end + 2..];
                }
                _ => {
                    literal.push('{');
                    rest = &tail[1..];
                }
            }
        } else {
            // lone '}'
            literal.push('}');
            rest = &tail[1..];
        }
    }

    literal.push_str(rest);
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    segments
}

/// Create a numbered list from items (1-indexed).
pub fn numbered_list(items: &[String]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {}", i + 1, item))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Wrap text in a labeled section for structured prompts.
pub fn section(label: &str, content: &str) -> String {
    format!("## {}\n{}", label, content)
}
