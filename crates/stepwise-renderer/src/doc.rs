//! Document and step model accumulated during rendering.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::RenderError;

/// One lesson unit, delimited by horizontal-rule boundaries in the source.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Step {
    /// Step identifier; defaulted to `step-<index>` during post-processing
    /// when the front matter set none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Learning goals, surfaced as a `goals` attribute on the step element.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goals: Option<String>,

    /// Extra CSS classes for the step element.
    #[serde(rename = "class", skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,

    /// Remaining front-matter keys, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Step {
    /// Merge a parsed front-matter mapping into this step.
    ///
    /// `id`, `goals` and `class` land in their typed fields; everything else
    /// is kept as-is.
    pub fn merge(&mut self, meta: Map<String, Value>) {
        for (key, value) in meta {
            match key.as_str() {
                "id" => self.id = Some(stringify(&value)),
                "goals" => self.goals = Some(stringify(&value)),
                "class" => self.class = Some(stringify(&value)),
                _ => {
                    self.extra.insert(key, value);
                }
            }
        }
    }
}

/// The accumulating compilation output: document metadata plus ordered steps.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Document {
    /// Title taken from the first level-1 heading.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Steps in source order of their boundary markers.
    pub steps: Vec<Step>,

    /// Top-level front-matter keys.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Document {
    /// Append a fresh step and make it current.
    pub fn push_step(&mut self) {
        self.steps.push(Step::default());
    }

    /// The step currently receiving content, if any boundary has been seen.
    pub fn current_step(&mut self) -> Option<&mut Step> {
        self.steps.last_mut()
    }

    /// Merge a front-matter mapping into the current step, or into the
    /// document itself when no step is open yet.
    pub fn merge_meta(&mut self, meta: Map<String, Value>) {
        if let Some(step) = self.steps.last_mut() {
            step.merge(meta);
        } else {
            for (key, value) in meta {
                if key == "title" {
                    self.title = Some(stringify(&value));
                } else {
                    self.extra.insert(key, value);
                }
            }
        }
    }
}

/// Parse a structured metadata block into a key/value mapping.
pub fn parse_meta(text: &str) -> Result<Map<String, Value>, RenderError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Map::new());
    }
    let meta: Map<String, Value> = serde_yaml::from_str(trimmed)?;
    Ok(meta)
}

/// Render a metadata value the way it appears in an attribute.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
