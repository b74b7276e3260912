//! Chain definition parsing from YAML/JSON.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::chain::Chain;
use crate::template::{ResolutionError, Template};
use crate::types::Context;

/// Errors that can occur when loading a chain definition.
#[derive(Error, Debug)]
pub enum DefinitionError {
    #[error("Failed to read definition file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid template in prompt {step}: {source}")]
    TemplateError {
        step: usize,
        #[source]
        source: ResolutionError,
    },

    #[error("Definition validation failed: {0}")]
    ValidationError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// A named chain and the context it runs with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainDefinition {
    /// Human-readable name
    pub name: String,

    /// Detailed description
    #[serde(default)]
    pub description: Option<String>,

    /// Variables for `{{name}}` placeholders
    #[serde(default)]
    pub context: Context,

    /// Prompt templates in execution order
    #[serde(default)]
    pub prompts: Vec<String>,
}

impl ChainDefinition {
    /// Parse a definition from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, DefinitionError> {
        let definition: ChainDefinition = serde_yaml::from_str(yaml)?;
        definition.validate()?;
        Ok(definition)
    }

    /// Parse a definition from JSON string.
    pub fn from_json(json: &str) -> Result<Self, DefinitionError> {
        let definition: ChainDefinition = serde_json::from_str(json)?;
        definition.validate()?;
        Ok(definition)
    }

    /// Parse a definition from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, DefinitionError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse a definition from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, DefinitionError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// The parsed chain.
    pub fn chain(&self) -> Result<Chain, DefinitionError> {
        let templates = self
            .prompts
            .iter()
            .enumerate()
            .map(|(step, prompt)| {
                Template::parse(prompt)
                    .map_err(|source| DefinitionError::TemplateError { step, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Chain::from_templates(templates))
    }

    /// Validate the definition structure.
    fn validate(&self) -> Result<(), DefinitionError> {
        if self.name.trim().is_empty() {
            return Err(DefinitionError::MissingField("name".to_string()));
        }

        if self.prompts.is_empty() {
            return Err(DefinitionError::MissingField("prompts".to_string()));
        }

        let chain = self.chain()?;

        if let Some((step, back)) = chain.unreachable_reference() {
            return Err(DefinitionError::ValidationError(format!(
                "Prompt {} references output[-{}] but only {} earlier output(s) exist",
                step, back, step
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const VALID_DEFINITION: &str = r#"
name: "Greeting chain"
description: "Two-step greeting"
context:
  var1: "Hello"
  var2: "World"
  retries: 2
prompts:
  - "First prompt: {{var1}}"
  - "Second prompt: {{var2}} and {{output[-1]}}"
"#;

    #[test]
    fn test_parse_valid_definition() {
        let definition = ChainDefinition::from_yaml(VALID_DEFINITION).unwrap();
        assert_eq!(definition.name, "Greeting chain");
        assert_eq!(definition.prompts.len(), 2);
        assert_eq!(definition.context.get("var1"), Some(&json!("Hello")));
        assert_eq!(definition.context.get("retries"), Some(&json!(2)));

        let chain = definition.chain().unwrap();
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn test_parse_json_definition() {
        let json = r#"{"name": "j", "prompts": ["{{topic}}"], "context": {"topic": "rust"}}"#;
        let definition = ChainDefinition::from_json(json).unwrap();
        assert_eq!(definition.description, None);
        assert_eq!(definition.context.len(), 1);
    }

    #[test]
    fn test_missing_prompts() {
        let yaml = r#"
name: "Empty"
"#;
        let result = ChainDefinition::from_yaml(yaml);
        assert!(matches!(result, Err(DefinitionError::MissingField(f)) if f == "prompts"));
    }

    #[test]
    fn test_blank_name() {
        let yaml = r#"
name: "  "
prompts: ["hi"]
"#;
        assert!(matches!(
            ChainDefinition::from_yaml(yaml),
            Err(DefinitionError::MissingField(_))
        ));
    }

    #[test]
    fn test_malformed_template() {
        let yaml = r#"
name: "Broken"
prompts:
  - "ok"
  - "{{ spaced }}"
"#;
        let result = ChainDefinition::from_yaml(yaml);
        assert!(matches!(
            result,
            Err(DefinitionError::TemplateError {
                step: 1,
                source: ResolutionError::InvalidPlaceholder { .. }
            })
        ));
    }

    #[test]
    fn test_forward_reference_rejected() {
        let yaml = r#"
name: "Forward"
prompts:
  - "{{output[-1]}}"
"#;
        let result = ChainDefinition::from_yaml(yaml);
        assert!(matches!(result, Err(DefinitionError::ValidationError(_))));
    }

    #[test]
    fn test_unknown_context_is_a_run_time_concern() {
        // Context variables are only checked when the chain runs.
        let yaml = r#"
name: "Late binding"
prompts: ["{{supplied_later}}"]
"#;
        assert!(ChainDefinition::from_yaml(yaml).is_ok());
    }

    #[test]
    fn test_missing_file() {
        let result = ChainDefinition::from_yaml_file("/nonexistent/chain.yaml");
        assert!(matches!(result, Err(DefinitionError::IoError(_))));
    }
}
