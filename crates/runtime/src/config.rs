use std::collections::BTreeMap;

use relay_xpath::ResultShape;
use serde::Deserialize;
use serde_json::Value;

use crate::convert::TargetType;
use crate::document::DocumentType;
use crate::evaluator::{XPathEvaluator, XPathEvaluatorBuilder};

/// Result shape as written in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShapeSetting {
    Boolean,
    Node,
    NodeSet,
    Number,
    String,
}

impl From<ShapeSetting> for ResultShape {
    fn from(setting: ShapeSetting) -> Self {
        match setting {
            ShapeSetting::Boolean => ResultShape::Boolean,
            ShapeSetting::Node => ResultShape::Node,
            ShapeSetting::NodeSet => ResultShape::NodeSet,
            ShapeSetting::Number => ResultShape::Number,
            ShapeSetting::String => ResultShape::Text,
        }
    }
}

/// Declarative evaluator settings, e.g. loaded from a route definition.
///
/// ```
/// use relay_runtime::EvaluatorConfig;
///
/// let config: EvaluatorConfig = serde_json::from_str(
///     r#"{ "expression": "/o:order/@id", "result-type": "integer", "namespaces": { "o": "urn:orders" } }"#,
/// )
/// .unwrap();
/// let evaluator = config.build();
/// assert_eq!(evaluator.text(), "/o:order/@id");
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct EvaluatorConfig {
    pub expression: String,
    #[serde(default)]
    pub result_shape: Option<ShapeSetting>,
    #[serde(default)]
    pub result_type: Option<TargetType>,
    #[serde(default)]
    pub namespaces: BTreeMap<String, String>,
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
    #[serde(default)]
    pub document_type: Option<DocumentType>,
    #[serde(default)]
    pub max_idle: Option<usize>,
}

impl EvaluatorConfig {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            result_shape: None,
            result_type: None,
            namespaces: BTreeMap::new(),
            variables: BTreeMap::new(),
            document_type: None,
            max_idle: None,
        }
    }

    pub fn build(self) -> XPathEvaluator {
        XPathEvaluatorBuilder::from_config(self).build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    fn parses_full_config() {
        let config: EvaluatorConfig = serde_json::from_value(json!({
            "expression": "/a",
            "result-shape": "string",
            "result-type": "text",
            "namespaces": { "p": "urn:p" },
            "variables": { "limit": 3 },
            "document-type": "bytes",
            "max-idle": 4
        }))
        .unwrap();
        assert_eq!(config.result_shape, Some(ShapeSetting::String));
        assert_eq!(config.result_type, Some(TargetType::Text));
        assert_eq!(config.namespaces.get("p").map(String::as_str), Some("urn:p"));
        assert_eq!(config.variables.get("limit"), Some(&json!(3)));
        assert_eq!(config.document_type, Some(DocumentType::Bytes));
        assert_eq!(config.max_idle, Some(4));
    }

    #[rstest]
    fn only_expression_is_required() {
        let config: EvaluatorConfig = serde_json::from_value(json!({ "expression": "/a" })).unwrap();
        assert_eq!(config, EvaluatorConfig::new("/a"));
    }

    #[rstest]
    fn unknown_fields_are_rejected() {
        let result = serde_json::from_value::<EvaluatorConfig>(json!({ "expression": "/a", "shape": "x" }));
        assert!(result.is_err());
    }

    #[rstest]
    fn explicit_shape_overrides_result_type() {
        let mut config = EvaluatorConfig::new("/a");
        config.result_shape = Some(ShapeSetting::String);
        config.result_type = Some(TargetType::Number);
        let evaluator = config.build();
        assert_eq!(evaluator.result_shape(), ResultShape::Text);
        assert_eq!(evaluator.result_type(), Some(TargetType::Number));
    }
}
