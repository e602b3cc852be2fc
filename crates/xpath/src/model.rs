use core::cmp::Ordering;

use smallvec::SmallVec;

use crate::runtime::{Error, ErrorCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Document,
    Element,
    Attribute,
    Text,
    Comment,
    ProcessingInstruction,
    Namespace,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    pub prefix: Option<String>,
    pub local: String,
    pub ns_uri: Option<String>,
}

impl QName {
    pub fn local(local: impl Into<String>) -> Self {
        Self { prefix: None, local: local.into(), ns_uri: None }
    }

    /// Lexical form as written in the document (`prefix:local` or `local`).
    pub fn lexical(&self) -> String {
        match &self.prefix {
            Some(p) if !p.is_empty() => format!("{p}:{}", self.local),
            _ => self.local.clone(),
        }
    }
}

type AncestorPath<N> = SmallVec<[N; 16]>;

fn path_to_root<N: XdmNode>(node: &N) -> AncestorPath<N> {
    let mut path: AncestorPath<N> = SmallVec::new();
    path.push(node.clone());
    let mut current = node.parent();
    while let Some(parent) = current {
        current = parent.parent();
        path.push(parent);
    }
    path.reverse();
    path
}

/// Document order derived from ancestry and sibling position.
///
/// An ancestor precedes its descendants. Below a common parent, attributes come first, then
/// namespace nodes, then children, each group in adapter order. Nodes of different trees have
/// no order here and yield `err:FOER0000`; adapters spanning several roots override
/// [`XdmNode::compare_document_order`].
pub fn try_compare_by_ancestry<N: XdmNode>(a: &N, b: &N) -> Result<Ordering, Error> {
    if a == b {
        return Ok(Ordering::Equal);
    }
    let pa = path_to_root(a);
    let pb = path_to_root(b);
    let common = pa.iter().zip(pb.iter()).take_while(|(x, y)| x == y).count();
    if common == 0 {
        return Err(Error::from_code(ErrorCode::FOER0000, "document order is undefined for nodes of different trees"));
    }
    if common == pa.len() || common == pb.len() {
        return Ok(pa.len().cmp(&pb.len()));
    }
    let parent = &pa[common - 1];
    let (na, nb) = (&pa[common], &pb[common]);
    let siblings = parent.attributes().into_iter().chain(parent.namespaces()).chain(parent.children());
    for sibling in siblings {
        if &sibling == na {
            return Ok(Ordering::Less);
        }
        if &sibling == nb {
            return Ok(Ordering::Greater);
        }
    }
    Ok(Ordering::Equal)
}

pub trait XdmNode: Clone + Eq + core::fmt::Debug + Send + Sync {
    fn kind(&self) -> NodeKind;
    fn name(&self) -> Option<QName>;
    fn string_value(&self) -> String;

    fn parent(&self) -> Option<Self>;
    fn children(&self) -> Vec<Self>;
    fn attributes(&self) -> Vec<Self>;
    fn namespaces(&self) -> Vec<Self> {
        Vec::new()
    }

    /// Topmost ancestor (the node itself when it has no parent).
    fn root(&self) -> Self {
        let mut node = self.clone();
        while let Some(parent) = node.parent() {
            node = parent;
        }
        node
    }

    fn compare_document_order(&self, other: &Self) -> Result<Ordering, Error> {
        try_compare_by_ancestry(self, other)
    }
}
