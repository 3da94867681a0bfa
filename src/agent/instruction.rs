//! Instruction template rendering
//!
//! Placeholders are `{key}` or `{key?}`, where `key` may carry a scope
//! prefix (`{user:name}`). Braces that do not form a placeholder are left
//! alone, so instructions can contain JSON examples.

use regex::{Captures, Regex};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::core::{OrchestratorError, OrchestratorResult};

const PLACEHOLDER: &str = r"\{((?:app:|user:|temp:)?[A-Za-z_][A-Za-z0-9_]*)(\?)?\}";

/// Result of rendering one template
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedInstruction {
    /// Rendered text
    pub text: String,
    /// Required keys that were not in state
    pub missing: Vec<String>,
}

/// Renders agent instructions against session state
#[derive(Debug, Clone)]
pub struct InstructionRenderer {
    pattern: Regex,
}

impl InstructionRenderer {
    /// Compile the placeholder pattern
    pub fn new() -> OrchestratorResult<Self> {
        let pattern = Regex::new(PLACEHOLDER)
            .map_err(|e| OrchestratorError::config(format!("Invalid placeholder pattern: {}", e)))?;
        Ok(Self { pattern })
    }

    /// Render `template` for `agent`
    ///
    /// A missing key renders as an empty string. Required keys are reported
    /// in `missing` and logged at warn level; `{key?}` is silent.
    pub fn render(
        &self,
        agent: &str,
        template: &str,
        state: &BTreeMap<String, Value>,
    ) -> RenderedInstruction {
        let mut missing = Vec::new();

        let text = self
            .pattern
            .replace_all(template, |caps: &Captures| {
                let key = &caps[1];
                let optional = caps.get(2).is_some();
                match state.get(key) {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => {
                        if !optional {
                            missing.push(key.to_string());
                        }
                        String::new()
                    }
                }
            })
            .into_owned();

        for key in &missing {
            tracing::warn!(
                agent = %agent,
                "[Instruction] State key '{}' referenced by instruction is missing; rendering empty",
                key
            );
        }

        RenderedInstruction { text, missing }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state() -> BTreeMap<String, Value> {
        let mut state = BTreeMap::new();
        state.insert("topic".to_string(), json!("sales"));
        state.insert("limit".to_string(), json!(10));
        state.insert("user:name".to_string(), json!("Ada"));
        state.insert("filters".to_string(), json!({"region": "EU"}));
        state
    }

    #[test]
    fn test_renders_values() {
        let renderer = InstructionRenderer::new().unwrap();
        let rendered = renderer.render(
            "A",
            "Analyze {topic} for {user:name}, top {limit}, filters {filters}.",
            &state(),
        );

        assert_eq!(
            rendered.text,
            r#"Analyze sales for Ada, top 10, filters {"region":"EU"}."#
        );
        assert!(rendered.missing.is_empty());
    }

    #[test]
    fn test_missing_keys_render_empty() {
        let renderer = InstructionRenderer::new().unwrap();
        let rendered = renderer.render("A", "[{nothing}] [{maybe?}] [{app:motd}]", &state());

        assert_eq!(rendered.text, "[] [] []");
        assert_eq!(rendered.missing, vec!["nothing", "app:motd"]);
    }

    #[test]
    fn test_leaves_non_placeholders_alone() {
        let renderer = InstructionRenderer::new().unwrap();
        let template = r#"Reply as {"answer": 1} or { topic } or {9lives}"#;
        let rendered = renderer.render("A", template, &state());

        assert_eq!(rendered.text, template);
    }
}
