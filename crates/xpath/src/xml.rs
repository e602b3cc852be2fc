//! XML text to [`SimpleNode`] documents, backed by `quick-xml`.
//!
//! Namespace declarations are resolved while reading, so element and attribute names carry
//! their namespace URI. Character and predefined entity references are expanded; DTDs are
//! skipped and other entities are rejected.
use quick_xml::Reader;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesStart, Event};

use crate::model::{NodeKind, QName, XdmNode};
use crate::runtime::{Error, ErrorCode, XML_NS};
use crate::simple_node::{SimpleNode, SimpleNodeOrBuilder};

fn malformed(e: impl std::error::Error + Send + Sync + 'static) -> Error {
    let message = format!("malformed XML: {e}");
    Error::from_code(ErrorCode::FODC0006, message).with_source(e)
}

fn invalid(message: impl Into<String>) -> Error {
    Error::from_code(ErrorCode::FODC0006, message)
}

/// An element whose end tag has not been read yet.
#[derive(Default)]
struct Open {
    name: Option<QName>,
    bindings: Vec<(String, String)>,
    attributes: Vec<SimpleNode>,
    children: Vec<SimpleNode>,
}

impl Open {
    fn finish(self) -> SimpleNode {
        let builder = match self.name {
            Some(name) => SimpleNode::element_qname(name),
            None => SimpleNode::document(),
        };
        let builder = self
            .bindings
            .iter()
            .fold(builder, |b, (prefix, uri)| b.namespace(SimpleNode::namespace(prefix, uri)));
        let builder = self.attributes.into_iter().fold(builder, |b, a| b.attr(a));
        builder.children(self.children.into_iter().map(SimpleNodeOrBuilder::from)).build()
    }
}

fn lookup<'a>(prefix: &str, local: &'a [(String, String)], stack: &'a [Open]) -> Option<&'a str> {
    if prefix == "xml" {
        return Some(XML_NS);
    }
    local
        .iter()
        .rev()
        .chain(stack.iter().rev().flat_map(|open| open.bindings.iter().rev()))
        .find(|(p, _)| p == prefix)
        .map(|(_, uri)| uri.as_str())
}

fn split_qname(raw: &str) -> (Option<&str>, &str) {
    match raw.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, raw),
    }
}

fn open_element(start: &BytesStart<'_>, stack: &[Open]) -> Result<Open, Error> {
    let mut bindings = Vec::new();
    let mut raw_attrs = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(malformed)?;
        let key = std::str::from_utf8(attr.key.as_ref()).map_err(malformed)?.to_string();
        let value = attr.unescape_value().map_err(malformed)?.into_owned();
        if key == "xmlns" {
            bindings.push((String::new(), value));
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            bindings.push((prefix.to_string(), value));
        } else {
            raw_attrs.push((key, value));
        }
    }

    let raw_name = std::str::from_utf8(start.name().as_ref()).map_err(malformed)?.to_string();
    let (prefix, local) = split_qname(&raw_name);
    let ns_uri = match lookup(prefix.unwrap_or(""), &bindings, stack) {
        Some(uri) if !uri.is_empty() => Some(uri.to_string()),
        Some(_) => None,
        None if prefix.is_some() => {
            return Err(invalid(format!("namespace prefix of element '{raw_name}' is not declared")));
        }
        None => None,
    };
    let name = QName { prefix: prefix.map(str::to_string), local: local.to_string(), ns_uri };

    let mut attributes = Vec::with_capacity(raw_attrs.len());
    for (key, value) in raw_attrs {
        let (prefix, local) = split_qname(&key);
        let ns_uri = match prefix {
            None => None,
            Some(p) => Some(
                lookup(p, &bindings, stack)
                    .ok_or_else(|| invalid(format!("namespace prefix of attribute '{key}' is not declared")))?
                    .to_string(),
            ),
        };
        let qname = QName { prefix: prefix.map(str::to_string), local: local.to_string(), ns_uri };
        attributes.push(SimpleNode::attribute_qname(qname, &value));
    }

    Ok(Open { name: Some(name), bindings, attributes, children: Vec::new() })
}

/// Moves buffered character data into a text node of the innermost open element.
fn flush_text(text: &mut String, stack: &mut [Open]) -> Result<(), Error> {
    if text.is_empty() {
        return Ok(());
    }
    let depth = stack.len();
    match stack.last_mut() {
        Some(open) if depth > 1 => open.children.push(SimpleNode::text(text.as_str())),
        _ if text.chars().all(char::is_whitespace) => {}
        _ => return Err(invalid("character data outside the root element")),
    }
    text.clear();
    Ok(())
}

fn append(node: SimpleNode, stack: &mut [Open]) -> Result<(), Error> {
    let open = stack.last_mut().ok_or_else(|| invalid("unbalanced end tag"))?;
    open.children.push(node);
    Ok(())
}

/// Deepest element nesting [`parse_document`] accepts; deeper documents are `err:FODC0006`.
pub const MAX_DEPTH: usize = 1024;

fn check_depth(stack: &[Open]) -> Result<(), Error> {
    // The document node occupies the bottom of the stack.
    if stack.len() > MAX_DEPTH {
        return Err(invalid(format!("elements are nested deeper than {MAX_DEPTH} levels")));
    }
    Ok(())
}

/// Parses XML text into a document node.
pub fn parse_document(xml: &str) -> Result<SimpleNode, Error> {
    let mut reader = Reader::from_str(xml.strip_prefix('\u{feff}').unwrap_or(xml));
    reader.config_mut().trim_text(false);
    let mut stack = vec![Open::default()];
    let mut text = String::new();
    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Start(start) => {
                flush_text(&mut text, &mut stack)?;
                check_depth(&stack)?;
                let open = open_element(&start, &stack)?;
                stack.push(open);
            }
            Event::Empty(start) => {
                flush_text(&mut text, &mut stack)?;
                check_depth(&stack)?;
                let node = open_element(&start, &stack)?.finish();
                append(node, &mut stack)?;
            }
            Event::End(_) => {
                flush_text(&mut text, &mut stack)?;
                if stack.len() < 2 {
                    return Err(invalid("unbalanced end tag"));
                }
                let node = stack.pop().map(Open::finish).ok_or_else(|| invalid("unbalanced end tag"))?;
                append(node, &mut stack)?;
            }
            Event::Text(t) => text.push_str(&t.decode().map_err(malformed)?),
            Event::CData(c) => text.push_str(&c.decode().map_err(malformed)?),
            Event::GeneralRef(r) => {
                if r.is_char_ref() {
                    let c = r.resolve_char_ref().map_err(malformed)?.ok_or_else(|| invalid("invalid character reference"))?;
                    text.push(c);
                } else {
                    let name = r.decode().map_err(malformed)?;
                    let value = resolve_predefined_entity(&name)
                        .ok_or_else(|| invalid(format!("undeclared entity '&{name};'")))?;
                    text.push_str(value);
                }
            }
            Event::Comment(c) => {
                flush_text(&mut text, &mut stack)?;
                let body = c.decode().map_err(malformed)?;
                append(SimpleNode::comment(&body), &mut stack)?;
            }
            Event::PI(pi) => {
                flush_text(&mut text, &mut stack)?;
                let target = std::str::from_utf8(pi.target()).map_err(malformed)?;
                let content = std::str::from_utf8(pi.content()).map_err(malformed)?;
                append(SimpleNode::pi(target, content.trim_start()), &mut stack)?;
            }
            Event::Decl(_) | Event::DocType(_) => {}
            Event::Eof => break,
        }
    }
    flush_text(&mut text, &mut stack)?;
    if stack.len() != 1 {
        return Err(invalid("unexpected end of input: unclosed element"));
    }
    let document = stack.pop().map(Open::finish).ok_or_else(|| invalid("empty document"))?;
    match document.children().iter().filter(|c| c.kind() == NodeKind::Element).count() {
        0 => Err(invalid("document has no root element")),
        1 => Ok(document),
        _ => Err(invalid("document has more than one root element")),
    }
}

/// Parses UTF-8 encoded XML. Other encodings are rejected with `err:FODC0002`.
pub fn parse_document_bytes(bytes: &[u8]) -> Result<SimpleNode, Error> {
    let xml = std::str::from_utf8(bytes).map_err(|e| {
        Error::from_code(ErrorCode::FODC0002, format!("document is not valid UTF-8: {e}")).with_source(e)
    })?;
    parse_document(xml)
}
