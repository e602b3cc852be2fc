//! Post-evaluation conversion of a shaped result into a caller-requested type.
use std::fmt;

use relay_xpath::xdm::{format_number, parse_number};
use relay_xpath::{ResultShape, SimpleNode, XPathValue, XdmNode};
use serde::Deserialize;
use thiserror::Error;

/// Type a caller asks an evaluation result to be converted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetType {
    Boolean,
    Number,
    Integer,
    Text,
    Node,
    NodeList,
}

impl TargetType {
    /// The result shape an expression is evaluated with when this type is requested.
    pub fn shape(self) -> ResultShape {
        match self {
            TargetType::Number | TargetType::Integer => ResultShape::Number,
            TargetType::Text => ResultShape::Text,
            TargetType::Boolean => ResultShape::Boolean,
            TargetType::Node => ResultShape::Node,
            TargetType::NodeList => ResultShape::NodeSet,
        }
    }
}

impl From<TargetType> for ResultShape {
    fn from(target: TargetType) -> Self {
        target.shape()
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TargetType::Boolean => "boolean",
            TargetType::Number => "number",
            TargetType::Integer => "integer",
            TargetType::Text => "text",
            TargetType::Node => "node",
            TargetType::NodeList => "node-list",
        })
    }
}

/// A converted evaluation result.
#[derive(Debug, Clone, PartialEq)]
pub enum Converted {
    Boolean(bool),
    Number(f64),
    Integer(i64),
    Text(String),
    Node(Option<SimpleNode>),
    NodeList(Vec<SimpleNode>),
}

impl Converted {
    pub fn kind(&self) -> &'static str {
        match self {
            Converted::Boolean(_) => "boolean",
            Converted::Number(_) => "number",
            Converted::Integer(_) => "integer",
            Converted::Text(_) => "text",
            Converted::Node(_) => "node",
            Converted::NodeList(_) => "node-list",
        }
    }
}

impl From<XPathValue<SimpleNode>> for Converted {
    fn from(value: XPathValue<SimpleNode>) -> Self {
        match value {
            XPathValue::Boolean(b) => Converted::Boolean(b),
            XPathValue::Number(n) => Converted::Number(n),
            XPathValue::Text(s) => Converted::Text(s),
            XPathValue::Node(n) => Converted::Node(n),
            XPathValue::NodeSet(nodes) => Converted::NodeList(nodes),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    #[error("cannot convert a {from} result to {to}")]
    Unsupported { from: ResultShape, to: TargetType },
    #[error("'{value}' is not a valid {to}")]
    InvalidValue { value: String, to: TargetType },
    #[error("expected a {expected} value, got {actual}")]
    Mismatch { expected: TargetType, actual: &'static str },
}

/// Converts shaped results to target types.
pub trait TypeConversionService: Send + Sync {
    fn convert(&self, value: XPathValue<SimpleNode>, target: TargetType) -> Result<Converted, ConversionError>;
}

/// XPath 1.0 flavoured conversions. Text only converts to boolean when it reads `true` or
/// `false`; text and nodes only convert to numbers when they hold one.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultTypeConverter;

impl TypeConversionService for DefaultTypeConverter {
    fn convert(&self, value: XPathValue<SimpleNode>, target: TargetType) -> Result<Converted, ConversionError> {
        match target {
            TargetType::Boolean => to_boolean(value).map(Converted::Boolean),
            TargetType::Number => to_number(value).map(Converted::Number),
            TargetType::Integer => to_integer(value).map(Converted::Integer),
            TargetType::Text => Ok(Converted::Text(to_text(&value))),
            TargetType::Node => match value {
                XPathValue::Node(node) => Ok(Converted::Node(node)),
                XPathValue::NodeSet(nodes) => Ok(Converted::Node(nodes.into_iter().next())),
                other => Err(ConversionError::Unsupported { from: other.shape(), to: target }),
            },
            TargetType::NodeList => match value {
                XPathValue::Node(node) => Ok(Converted::NodeList(node.into_iter().collect())),
                XPathValue::NodeSet(nodes) => Ok(Converted::NodeList(nodes)),
                other => Err(ConversionError::Unsupported { from: other.shape(), to: target }),
            },
        }
    }
}

fn to_boolean(value: XPathValue<SimpleNode>) -> Result<bool, ConversionError> {
    Ok(match value {
        XPathValue::Boolean(b) => b,
        XPathValue::Number(n) => n != 0.0 && !n.is_nan(),
        XPathValue::Node(node) => node.is_some(),
        XPathValue::NodeSet(nodes) => !nodes.is_empty(),
        XPathValue::Text(text) => match text.trim() {
            t if t.eq_ignore_ascii_case("true") => true,
            t if t.eq_ignore_ascii_case("false") => false,
            _ => return Err(ConversionError::InvalidValue { value: text, to: TargetType::Boolean }),
        },
    })
}

fn to_number(value: XPathValue<SimpleNode>) -> Result<f64, ConversionError> {
    let text = match value {
        XPathValue::Number(n) => return Ok(n),
        XPathValue::Boolean(b) => return Ok(f64::from(u8::from(b))),
        other => to_text(&other),
    };
    match parse_number(&text) {
        n if n.is_nan() => Err(ConversionError::InvalidValue { value: text, to: TargetType::Number }),
        n => Ok(n),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn to_integer(value: XPathValue<SimpleNode>) -> Result<i64, ConversionError> {
    let n = to_number(value).map_err(|e| match e {
        ConversionError::InvalidValue { value, .. } => ConversionError::InvalidValue { value, to: TargetType::Integer },
        other => other,
    })?;
    if n.is_finite() && n.fract() == 0.0 && n >= i64::MIN as f64 && n < i64::MAX as f64 {
        Ok(n as i64)
    } else {
        Err(ConversionError::InvalidValue { value: format_number(n), to: TargetType::Integer })
    }
}

/// Node sets concatenate the string values of their nodes.
fn to_text(value: &XPathValue<SimpleNode>) -> String {
    match value {
        XPathValue::Boolean(b) => b.to_string(),
        XPathValue::Number(n) => format_number(*n),
        XPathValue::Text(s) => s.clone(),
        XPathValue::Node(node) => node.as_ref().map(XdmNode::string_value).unwrap_or_default(),
        XPathValue::NodeSet(nodes) => nodes.iter().map(XdmNode::string_value).collect(),
    }
}

/// Rust types an evaluation can be converted into directly.
pub trait FromConverted: Sized {
    const TARGET: TargetType;

    fn from_converted(value: Converted) -> Result<Self, ConversionError>;
}

macro_rules! from_converted {
    ($ty:ty, $target:ident) => {
        impl FromConverted for $ty {
            const TARGET: TargetType = TargetType::$target;

            fn from_converted(value: Converted) -> Result<Self, ConversionError> {
                match value {
                    Converted::$target(v) => Ok(v),
                    other => Err(ConversionError::Mismatch { expected: Self::TARGET, actual: other.kind() }),
                }
            }
        }
    };
}

from_converted!(bool, Boolean);
from_converted!(f64, Number);
from_converted!(i64, Integer);
from_converted!(String, Text);
from_converted!(Option<SimpleNode>, Node);
from_converted!(Vec<SimpleNode>, NodeList);
