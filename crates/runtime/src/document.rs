//! Turning an invocation's input body into the document an expression runs against.
use std::fmt;
use std::path::PathBuf;

use relay_xpath::{ErrorCode, SimpleNode, xml};
use serde::Deserialize;
use thiserror::Error;

use crate::message::{Body, FileHandle, Invocation};

/// Representation the input body should be read as before parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentType {
    #[default]
    Node,
    Text,
    Bytes,
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DocumentType::Node => "node",
            DocumentType::Text => "text",
            DocumentType::Bytes => "bytes",
        })
    }
}

/// Document value as extracted from a message, before parsing.
#[derive(Debug, Clone)]
pub enum RawDocument {
    Node(SimpleNode),
    Text(String),
    Bytes(Vec<u8>),
    File(FileHandle),
    Empty,
}

/// Unparsed XML content.
#[derive(Debug, Clone)]
pub enum InputSource {
    Text(String),
    Bytes(Vec<u8>),
}

impl InputSource {
    pub fn parse(&self) -> Result<SimpleNode, DocumentError> {
        let parsed = match self {
            InputSource::Text(text) => xml::parse_document(text),
            InputSource::Bytes(bytes) => xml::parse_document_bytes(bytes),
        };
        parsed.map_err(DocumentError::Malformed)
    }
}

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("malformed document: {0}")]
    Malformed(#[source] relay_xpath::Error),
    #[error("cannot read file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Extracts the raw document from an invocation.
pub trait DocumentProvider: Send + Sync {
    fn extract(&self, invocation: &Invocation, hint: Option<DocumentType>) -> Result<RawDocument, DocumentError>;

    fn file_bytes(&self, file: &FileHandle) -> Result<Vec<u8>, DocumentError>;
}

/// Reads the input body. A hint the body cannot honour falls back to the body as it is.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultDocumentProvider;

/// Reads a body as text; invalid UTF-8 is `err:FODC0002`, as for byte sources.
fn decode_text(bytes: Vec<u8>) -> Result<String, DocumentError> {
    String::from_utf8(bytes).map_err(|e| {
        let message = format!("document is not valid UTF-8: {}", e.utf8_error());
        DocumentError::Malformed(relay_xpath::Error::from_code(ErrorCode::FODC0002, message).with_source(e))
    })
}

impl DocumentProvider for DefaultDocumentProvider {
    fn extract(&self, invocation: &Invocation, hint: Option<DocumentType>) -> Result<RawDocument, DocumentError> {
        let raw = match (invocation.input().body(), hint.unwrap_or_default()) {
            (Body::Empty, _) => RawDocument::Empty,
            (Body::Xml(node), _) => RawDocument::Node(node.clone()),
            (Body::File(file), _) => RawDocument::File(file.clone()),
            (Body::Text(text), DocumentType::Bytes) => RawDocument::Bytes(text.clone().into_bytes()),
            (Body::Text(text), _) => RawDocument::Text(text.clone()),
            (Body::Bytes(bytes), DocumentType::Text) => RawDocument::Text(decode_text(bytes.clone())?),
            (Body::Bytes(bytes), _) => RawDocument::Bytes(bytes.clone()),
            (Body::Stream(stream), DocumentType::Text) => RawDocument::Text(decode_text(stream.read_to_end())?),
            (Body::Stream(stream), _) => RawDocument::Bytes(stream.read_to_end()),
        };
        Ok(raw)
    }

    fn file_bytes(&self, file: &FileHandle) -> Result<Vec<u8>, DocumentError> {
        std::fs::read(file.path()).map_err(|source| DocumentError::Io { path: file.path().to_path_buf(), source })
    }
}

/// Called once the document has been extracted, so a consumed body can be read again.
pub trait StreamResetHook: Send + Sync {
    fn reset(&self, invocation: &Invocation);
}

/// Rewinds a stream-backed input body; other bodies are left alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResetStreamCache;

impl StreamResetHook for ResetStreamCache {
    fn reset(&self, invocation: &Invocation) {
        if let Body::Stream(stream) = invocation.input().body() {
            stream.reset();
            tracing::trace!("stream body reset");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use relay_xpath::XdmNode;
    use rstest::rstest;

    #[rstest]
    #[case(None)]
    #[case(Some(DocumentType::Text))]
    #[case(Some(DocumentType::Bytes))]
    fn xml_body_is_used_as_is(#[case] hint: Option<DocumentType>) {
        let node = xml::parse_document("<a/>").unwrap();
        let invocation = Invocation::new(Message::new(node.clone()));
        let raw = DefaultDocumentProvider.extract(&invocation, hint).unwrap();
        assert!(matches!(raw, RawDocument::Node(n) if n == node));
    }

    #[rstest]
    fn text_hint_decodes_bytes() {
        let invocation = Invocation::new(Message::new(b"<a/>".to_vec()));
        let raw = DefaultDocumentProvider.extract(&invocation, Some(DocumentType::Text)).unwrap();
        assert!(matches!(raw, RawDocument::Text(t) if t == "<a/>"));
    }

    #[rstest]
    #[case(Body::from(vec![b'<', b'a', 0xff, b'/', b'>']))]
    #[case(Body::stream(vec![b'<', b'a', 0xc3, b'/', b'>']))]
    fn text_hint_rejects_invalid_utf8(#[case] body: Body) {
        let invocation = Invocation::new(Message::new(body));
        let err = DefaultDocumentProvider.extract(&invocation, Some(DocumentType::Text)).unwrap_err();
        assert!(matches!(err, DocumentError::Malformed(e) if e.code == relay_xpath::ErrorCode::FODC0002));
    }

    #[rstest]
    fn stream_is_consumed_until_reset() {
        let invocation = Invocation::new(Message::new(Body::stream("<a/>")));
        let raw = DefaultDocumentProvider.extract(&invocation, None).unwrap();
        assert!(matches!(raw, RawDocument::Bytes(b) if b == b"<a/>"));
        let Body::Stream(stream) = invocation.input().body() else { unreachable!() };
        assert!(stream.peek().is_empty());
        ResetStreamCache.reset(&invocation);
        assert_eq!(stream.peek(), b"<a/>");
    }

    #[rstest]
    fn malformed_source_is_reported() {
        let err = InputSource::Text("<a>".into()).parse().unwrap_err();
        assert!(matches!(err, DocumentError::Malformed(e) if e.code == relay_xpath::ErrorCode::FODC0006));
    }

    #[rstest]
    fn missing_file_is_an_io_error() {
        let file = FileHandle::new("/definitely/not/here.xml");
        let err = DefaultDocumentProvider.file_bytes(&file).unwrap_err();
        assert!(matches!(err, DocumentError::Io { .. }));
    }

    #[rstest]
    fn parsed_source_has_root_element() {
        let doc = InputSource::Bytes(b"<a><b/></a>".to_vec()).parse().unwrap();
        assert_eq!(doc.children().len(), 1);
    }
}
