use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::model::XdmNode;
use crate::xdm::{ExpandedName, XdmItem, XdmSequence};

pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Static,
    Dynamic,
}

/// Error codes emitted by this engine. Only the subset of the W3C codes that the XPath 1.0
/// feature set can raise is modelled.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    FOER0000, // unidentified error
    FORG0006, // invalid argument type
    FODC0002, // resource could not be read
    FODC0006, // malformed document
    XPTY0004, // type error
    XPDY0002, // context item absent
    XPST0003, // syntax error
    XPST0008, // undeclared variable
    XPST0017, // unknown function or wrong arity
    XPST0081, // unbound namespace prefix
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::FOER0000 => "err:FOER0000",
            ErrorCode::FORG0006 => "err:FORG0006",
            ErrorCode::FODC0002 => "err:FODC0002",
            ErrorCode::FODC0006 => "err:FODC0006",
            ErrorCode::XPTY0004 => "err:XPTY0004",
            ErrorCode::XPDY0002 => "err:XPDY0002",
            ErrorCode::XPST0003 => "err:XPST0003",
            ErrorCode::XPST0008 => "err:XPST0008",
            ErrorCode::XPST0017 => "err:XPST0017",
            ErrorCode::XPST0081 => "err:XPST0081",
        }
    }

    pub fn kind(self) -> ErrorKind {
        match self {
            ErrorCode::XPST0003 | ErrorCode::XPST0008 | ErrorCode::XPST0017 | ErrorCode::XPST0081 => {
                ErrorKind::Static
            }
            _ => ErrorKind::Dynamic,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub code: ErrorCode,
    pub message: String,
    #[source]
    pub source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    pub fn from_code(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { kind: code.kind(), code, message: message.into(), source: None }
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    pub fn is_static(&self) -> bool {
        self.kind == ErrorKind::Static
    }
}

#[derive(Debug, Clone, Default)]
pub struct NamespaceBindings {
    by_prefix: HashMap<String, String>,
}

impl NamespaceBindings {
    pub fn get(&self, prefix: &str) -> Option<&str> {
        self.by_prefix.get(prefix).map(String::as_str)
    }

    pub fn insert(&mut self, prefix: impl Into<String>, uri: impl Into<String>) {
        self.by_prefix.insert(prefix.into(), uri.into());
    }

    pub fn contains(&self, prefix: &str) -> bool {
        self.by_prefix.contains_key(prefix)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.by_prefix.iter().map(|(p, u)| (p.as_str(), u.as_str()))
    }
}

/// Prefix bindings visible to an expression at compile time.
#[derive(Debug, Clone)]
pub struct StaticContext {
    pub namespaces: NamespaceBindings,
}

impl Default for StaticContext {
    fn default() -> Self {
        StaticContextBuilder::new().build()
    }
}

impl StaticContext {
    pub fn resolve_prefix(&self, prefix: &str) -> Option<&str> {
        self.namespaces.get(prefix)
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticContextBuilder {
    namespaces: NamespaceBindings,
}

impl StaticContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.namespaces.insert(prefix, uri);
        self
    }

    /// Binds `prefix` unless it is already bound.
    #[must_use]
    pub fn with_default_namespace(mut self, prefix: &str, uri: &str) -> Self {
        if !self.namespaces.contains(prefix) {
            self.namespaces.insert(prefix, uri);
        }
        self
    }

    pub fn build(mut self) -> StaticContext {
        // The xml prefix is always bound and cannot be redeclared.
        self.namespaces.insert("xml", XML_NS);
        StaticContext { namespaces: self.namespaces }
    }
}

/// Dynamic context handed to function implementations.
pub struct CallCtx<'a, N> {
    pub item: Option<&'a XdmItem<N>>,
    pub position: usize,
    pub last: usize,
    pub static_ctx: &'a StaticContext,
}

impl<N: XdmNode> CallCtx<'_, N> {
    /// The context item, or `err:XPDY0002` when the function depends on one that is absent.
    pub fn context_item(&self) -> Result<&XdmItem<N>, Error> {
        self.item.ok_or_else(|| Error::from_code(ErrorCode::XPDY0002, "context item is undefined"))
    }
}

pub type FunctionImpl<N> =
    Arc<dyn Fn(&CallCtx<'_, N>, &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    Unknown,
    WrongArity { available: Vec<usize> },
}

/// Looks up an implementation for a function call by expanded name and arity.
pub trait FunctionResolver<N>: Send + Sync {
    fn resolve_function(&self, name: &ExpandedName, arity: usize) -> Option<FunctionImpl<N>>;
}

/// Supplies values for `$name` references at evaluation time.
pub trait VariableResolver<N>: Send + Sync {
    fn resolve_variable(&self, name: &ExpandedName) -> Option<XdmSequence<N>>;
}

impl<N: Clone + Send + Sync> VariableResolver<N> for HashMap<ExpandedName, XdmSequence<N>> {
    fn resolve_variable(&self, name: &ExpandedName) -> Option<XdmSequence<N>> {
        self.get(name).cloned()
    }
}

pub struct FunctionRegistry<N> {
    fns: HashMap<(ExpandedName, usize), FunctionImpl<N>>,
    variadic: HashMap<ExpandedName, (usize, FunctionImpl<N>)>,
}

impl<N> Default for FunctionRegistry<N> {
    fn default() -> Self {
        Self { fns: HashMap::new(), variadic: HashMap::new() }
    }
}

impl<N> fmt::Debug for FunctionRegistry<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("fixed", &self.fns.len())
            .field("variadic", &self.variadic.len())
            .finish()
    }
}

impl<N> FunctionRegistry<N> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: ExpandedName, arity: usize, f: FunctionImpl<N>) {
        self.fns.insert((name, arity), f);
    }

    pub fn register_ns(&mut self, ns: &str, local: &str, arity: usize, f: FunctionImpl<N>) {
        self.register(ExpandedName::new(Some(ns), local), arity, f);
    }

    pub fn register_local(&mut self, local: &str, arity: usize, f: FunctionImpl<N>) {
        self.register(ExpandedName::local(local), arity, f);
    }

    /// Registers one implementation for every arity in `min..=max`.
    pub fn register_range(&mut self, local: &str, min: usize, max: usize, f: &FunctionImpl<N>) {
        for arity in min..=max {
            self.register_local(local, arity, Arc::clone(f));
        }
    }

    /// Registers an implementation accepting `min` or more arguments.
    pub fn register_variadic(&mut self, local: &str, min: usize, f: FunctionImpl<N>) {
        self.variadic.insert(ExpandedName::local(local), (min, f));
    }

    pub fn resolve(&self, name: &ExpandedName, arity: usize) -> Result<FunctionImpl<N>, ResolveError> {
        if let Some(f) = self.fns.get(&(name.clone(), arity)) {
            return Ok(Arc::clone(f));
        }
        if let Some((min, f)) = self.variadic.get(name) {
            if arity >= *min {
                return Ok(Arc::clone(f));
            }
            return Err(ResolveError::WrongArity { available: vec![*min] });
        }
        let mut available: Vec<usize> =
            self.fns.keys().filter(|(n, _)| n == name).map(|(_, a)| *a).collect();
        if available.is_empty() {
            return Err(ResolveError::Unknown);
        }
        available.sort_unstable();
        Err(ResolveError::WrongArity { available })
    }
}

impl<N: Send + Sync> FunctionResolver<N> for FunctionRegistry<N> {
    fn resolve_function(&self, name: &ExpandedName, arity: usize) -> Option<FunctionImpl<N>> {
        self.resolve(name, arity).ok()
    }
}
