use std::fmt;

use crate::model::{NodeKind, XdmNode};
use crate::runtime::{Error, ErrorCode};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExpandedName {
    pub ns_uri: Option<String>,
    pub local: String,
}

impl ExpandedName {
    pub fn new(ns_uri: Option<&str>, local: impl Into<String>) -> Self {
        Self { ns_uri: ns_uri.filter(|ns| !ns.is_empty()).map(str::to_owned), local: local.into() }
    }

    pub fn local(local: impl Into<String>) -> Self {
        Self { ns_uri: None, local: local.into() }
    }
}

impl fmt::Display for ExpandedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ns_uri {
            Some(ns) => write!(f, "Q{{{ns}}}{}", self.local),
            None => f.write_str(&self.local),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum XdmAtomicValue {
    Boolean(bool),
    String(String),
    Integer(i64),
    Double(f64),
    UntypedAtomic(String),
}

impl XdmAtomicValue {
    pub fn is_numeric(&self) -> bool {
        matches!(self, XdmAtomicValue::Integer(_) | XdmAtomicValue::Double(_))
    }

    pub fn string_value(&self) -> String {
        match self {
            XdmAtomicValue::Boolean(b) => b.to_string(),
            XdmAtomicValue::String(s) | XdmAtomicValue::UntypedAtomic(s) => s.clone(),
            XdmAtomicValue::Integer(i) => i.to_string(),
            XdmAtomicValue::Double(d) => format_number(*d),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn number_value(&self) -> f64 {
        match self {
            XdmAtomicValue::Boolean(b) => f64::from(u8::from(*b)),
            XdmAtomicValue::String(s) | XdmAtomicValue::UntypedAtomic(s) => parse_number(s),
            XdmAtomicValue::Integer(i) => *i as f64,
            XdmAtomicValue::Double(d) => *d,
        }
    }

    pub fn boolean_value(&self) -> bool {
        match self {
            XdmAtomicValue::Boolean(b) => *b,
            XdmAtomicValue::String(s) | XdmAtomicValue::UntypedAtomic(s) => !s.is_empty(),
            XdmAtomicValue::Integer(i) => *i != 0,
            XdmAtomicValue::Double(d) => *d != 0.0 && !d.is_nan(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum XdmItem<N> {
    Node(N),
    Atomic(XdmAtomicValue),
}

impl<N> XdmItem<N> {
    pub fn as_node(&self) -> Option<&N> {
        match self {
            XdmItem::Node(n) => Some(n),
            XdmItem::Atomic(_) => None,
        }
    }
}

impl<N: XdmNode> XdmItem<N> {
    pub fn string_value(&self) -> String {
        match self {
            XdmItem::Node(n) => n.string_value(),
            XdmItem::Atomic(a) => a.string_value(),
        }
    }

    /// Nodes atomize to their string value as an untyped atomic.
    pub fn atomize(&self) -> XdmAtomicValue {
        match self {
            XdmItem::Node(n) => XdmAtomicValue::UntypedAtomic(n.string_value()),
            XdmItem::Atomic(a) => a.clone(),
        }
    }
}

impl<N> From<XdmAtomicValue> for XdmItem<N> {
    fn from(value: XdmAtomicValue) -> Self {
        XdmItem::Atomic(value)
    }
}

pub type XdmSequence<N> = Vec<XdmItem<N>>;

/// Result kinds an evaluation can be coerced to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResultShape {
    Boolean,
    Node,
    #[default]
    NodeSet,
    Number,
    Text,
}

impl fmt::Display for ResultShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResultShape::Boolean => "boolean",
            ResultShape::Node => "node",
            ResultShape::NodeSet => "node-set",
            ResultShape::Number => "number",
            ResultShape::Text => "string",
        })
    }
}

/// An evaluation result coerced to a [`ResultShape`].
#[derive(Debug, Clone, PartialEq)]
pub enum XPathValue<N> {
    Boolean(bool),
    Number(f64),
    Text(String),
    Node(Option<N>),
    NodeSet(Vec<N>),
}

impl<N> XPathValue<N> {
    pub fn shape(&self) -> ResultShape {
        match self {
            XPathValue::Boolean(_) => ResultShape::Boolean,
            XPathValue::Number(_) => ResultShape::Number,
            XPathValue::Text(_) => ResultShape::Text,
            XPathValue::Node(_) => ResultShape::Node,
            XPathValue::NodeSet(_) => ResultShape::NodeSet,
        }
    }
}

impl<N: XdmNode> XPathValue<N> {
    pub fn coerce(seq: XdmSequence<N>, shape: ResultShape) -> Result<Self, Error> {
        Ok(match shape {
            ResultShape::Boolean => XPathValue::Boolean(boolean_value(&seq)?),
            ResultShape::Number => XPathValue::Number(number_value(&seq)),
            ResultShape::Text => XPathValue::Text(string_value(&seq)),
            ResultShape::Node => XPathValue::Node(into_nodes(seq, shape)?.into_iter().next()),
            ResultShape::NodeSet => XPathValue::NodeSet(into_nodes(seq, shape)?),
        })
    }
}

fn into_nodes<N: XdmNode>(seq: XdmSequence<N>, shape: ResultShape) -> Result<Vec<N>, Error> {
    seq.into_iter()
        .map(|item| match item {
            XdmItem::Node(n) => Ok(n),
            XdmItem::Atomic(a) => Err(Error::from_code(
                ErrorCode::XPTY0004,
                format!("cannot return atomic value '{}' as {shape}", a.string_value()),
            )),
        })
        .collect()
}

/// `boolean()` applied to a sequence: non-empty node sequences are true, a single atomic
/// uses its own truth value.
pub fn boolean_value<N: XdmNode>(seq: &[XdmItem<N>]) -> Result<bool, Error> {
    match seq {
        [] => Ok(false),
        [XdmItem::Node(_), ..] => Ok(true),
        [XdmItem::Atomic(a)] => Ok(a.boolean_value()),
        [XdmItem::Atomic(_), ..] => Err(Error::from_code(
            ErrorCode::FORG0006,
            "effective boolean value is not defined for a sequence of several atomic values",
        )),
    }
}

/// `number()` applied to a sequence; only the first item counts, the empty sequence is NaN.
pub fn number_value<N: XdmNode>(seq: &[XdmItem<N>]) -> f64 {
    match seq.first() {
        None => f64::NAN,
        Some(XdmItem::Node(n)) => parse_number(&n.string_value()),
        Some(XdmItem::Atomic(a)) => a.number_value(),
    }
}

/// `string()` applied to a sequence; only the first item counts.
pub fn string_value<N: XdmNode>(seq: &[XdmItem<N>]) -> String {
    seq.first().map(XdmItem::string_value).unwrap_or_default()
}

/// Canonical XPath 1.0 rendering of a number: integral values without a fraction,
/// `NaN`, `Infinity`, and never exponent notation.
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() }
    } else if value == 0.0 {
        "0".to_string()
    } else {
        value.to_string()
    }
}

/// XPath 1.0 string-to-number: optional surrounding whitespace, an optional minus sign and
/// digits with an optional fraction. Anything else is NaN.
pub fn parse_number(text: &str) -> f64 {
    let trimmed = text.trim_matches(|c: char| matches!(c, ' ' | '\t' | '\r' | '\n'));
    let digits = trimmed.strip_prefix('-').unwrap_or(trimmed);
    let mut seen_digit = false;
    let mut seen_dot = false;
    for c in digits.chars() {
        match c {
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => return f64::NAN,
        }
    }
    if !seen_digit {
        return f64::NAN;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

/// Kind test shared by the evaluator and node functions.
pub(crate) fn is_named_kind(kind: NodeKind) -> bool {
    matches!(kind, NodeKind::Element | NodeKind::Attribute | NodeKind::ProcessingInstruction | NodeKind::Namespace)
}
