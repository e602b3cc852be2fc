//! Message model handed to the evaluator once per invocation.
//!
//! An [`Invocation`] is a cheap handle over an input [`Message`] and an optional output
//! message. Evaluation never mutates it; the only interior state is the read position of a
//! stream-backed body, which [`crate::document::StreamResetHook`] rewinds.
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use relay_xpath::{SimpleNode, XdmAtomicValue, XdmItem, XdmSequence};
use serde_json::Value;

/// Re-readable in-memory stream. Reads advance a shared cursor until [`StreamCache::reset`].
pub struct StreamCache {
    data: Vec<u8>,
    position: AtomicUsize,
}

impl StreamCache {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into(), position: AtomicUsize::new(0) }
    }

    /// Returns the unread remainder and moves the cursor to the end.
    pub fn read_to_end(&self) -> Vec<u8> {
        let start = self.position.swap(self.data.len(), Ordering::AcqRel).min(self.data.len());
        self.data[start..].to_vec()
    }

    /// The unread remainder, without moving the cursor.
    pub fn peek(&self) -> &[u8] {
        let start = self.position.load(Ordering::Acquire).min(self.data.len());
        &self.data[start..]
    }

    pub fn position(&self) -> usize {
        self.position.load(Ordering::Acquire)
    }

    pub fn reset(&self) {
        self.position.store(0, Ordering::Release);
    }
}

impl fmt::Debug for StreamCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamCache").field("len", &self.data.len()).field("position", &self.position()).finish()
    }
}

/// Reference to a file whose content becomes the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    path: PathBuf,
}

impl FileHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug, Clone, Default)]
pub enum Body {
    #[default]
    Empty,
    Text(String),
    Bytes(Vec<u8>),
    Xml(SimpleNode),
    Stream(Arc<StreamCache>),
    File(FileHandle),
}

impl Body {
    pub fn stream(data: impl Into<Vec<u8>>) -> Self {
        Body::Stream(Arc::new(StreamCache::new(data)))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Body::Empty)
    }

    /// The body as an expression value: parsed XML as its node, everything else as a string.
    /// A stream is peeked, not consumed.
    pub fn to_sequence(&self) -> XdmSequence<SimpleNode> {
        let text = match self {
            Body::Empty => return Vec::new(),
            Body::Xml(node) => return vec![XdmItem::Node(node.clone())],
            Body::Text(text) => text.clone(),
            Body::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            Body::Stream(stream) => String::from_utf8_lossy(stream.peek()).into_owned(),
            Body::File(file) => file.path().to_string_lossy().into_owned(),
        };
        vec![XdmItem::Atomic(XdmAtomicValue::String(text))]
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Text(text.to_string())
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Text(text)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Bytes(bytes)
    }
}

impl From<SimpleNode> for Body {
    fn from(node: SimpleNode) -> Self {
        Body::Xml(node)
    }
}

impl From<FileHandle> for Body {
    fn from(file: FileHandle) -> Self {
        Body::File(file)
    }
}

/// A body plus named headers.
#[derive(Debug, Clone, Default)]
pub struct Message {
    body: Body,
    headers: BTreeMap<String, Value>,
}

impl Message {
    pub fn new(body: impl Into<Body>) -> Self {
        Self { body: body.into(), headers: BTreeMap::new() }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn header(&self, name: &str) -> Option<&Value> {
        self.headers.get(name)
    }

    pub fn headers(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The named header as an expression value; absent headers are the empty sequence.
    pub fn header_sequence(&self, name: &str) -> XdmSequence<SimpleNode> {
        self.header(name).map(json_to_sequence).unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
struct Exchange {
    input: Message,
    output: Option<Message>,
}

/// One request: an input message and, once produced, an output message.
#[derive(Debug, Clone)]
pub struct Invocation(Arc<Exchange>);

impl Invocation {
    pub fn new(input: Message) -> Self {
        Self(Arc::new(Exchange { input, output: None }))
    }

    #[must_use]
    pub fn with_output(self, output: Message) -> Self {
        let mut exchange = Arc::unwrap_or_clone(self.0);
        exchange.output = Some(output);
        Self(Arc::new(exchange))
    }

    pub fn input(&self) -> &Message {
        &self.0.input
    }

    pub fn output(&self) -> Option<&Message> {
        self.0.output.as_ref()
    }

    pub fn ptr_eq(&self, other: &Invocation) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl From<Message> for Invocation {
    fn from(input: Message) -> Self {
        Invocation::new(input)
    }
}

/// Maps a JSON header value onto the expression data model. Arrays flatten into sequences,
/// objects are rendered as JSON text.
pub fn json_to_sequence(value: &Value) -> XdmSequence<SimpleNode> {
    let atomic = match value {
        Value::Null => return Vec::new(),
        Value::Array(items) => return items.iter().flat_map(json_to_sequence).collect(),
        Value::Bool(b) => XdmAtomicValue::Boolean(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => XdmAtomicValue::Integer(i),
            None => XdmAtomicValue::Double(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => XdmAtomicValue::String(s.clone()),
        Value::Object(_) => XdmAtomicValue::String(value.to_string()),
    };
    vec![XdmItem::Atomic(atomic)]
}
