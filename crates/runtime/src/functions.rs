//! Extension functions reading the message of the current evaluation.
//!
//! `body()` and `header(name)` are available unprefixed or in the `in` namespace for the
//! input message, and in the `out` namespace for the output message. They read the
//! [`ExecutionContext`] installed by the evaluator and yield the empty sequence when nothing
//! is installed or the requested part does not exist.
use std::fmt;
use std::sync::Arc;

use relay_xpath::{CallCtx, Error, ExpandedName, FunctionImpl, FunctionResolver, SimpleNode, XdmItem, XdmSequence};

use crate::context::ExecutionContext;
use crate::message::Message;

pub const IN_NAMESPACE: &str = "urn:relay:xpath:in";
pub const OUT_NAMESPACE: &str = "urn:relay:xpath:out";
pub const ENV_NAMESPACE: &str = "urn:relay:xpath:env";

/// Which message of the invocation a function reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionGroup {
    Input,
    Output,
}

impl FunctionGroup {
    /// Group of a function name: no namespace or `in` for input, `out` for output.
    pub fn of(name: &ExpandedName) -> Option<Self> {
        match name.ns_uri.as_deref() {
            None | Some(IN_NAMESPACE) => Some(FunctionGroup::Input),
            Some(OUT_NAMESPACE) => Some(FunctionGroup::Output),
            Some(_) => None,
        }
    }

    pub(crate) fn with_message<R>(self, f: impl FnOnce(&Message) -> R) -> Option<R> {
        ExecutionContext::with_current(|ctx| {
            let invocation = ctx?.invocation();
            let message = match self {
                FunctionGroup::Input => Some(invocation.input()),
                FunctionGroup::Output => invocation.output(),
            };
            message.map(f)
        })
    }
}

type Builtin = fn(FunctionGroup, &[XdmSequence<SimpleNode>]) -> XdmSequence<SimpleNode>;

static BUILTINS: &[(&str, usize, Builtin)] = &[("body", 0, body), ("header", 1, header)];

fn body(group: FunctionGroup, _args: &[XdmSequence<SimpleNode>]) -> XdmSequence<SimpleNode> {
    group.with_message(|m| m.body().to_sequence()).unwrap_or_default()
}

fn header(group: FunctionGroup, args: &[XdmSequence<SimpleNode>]) -> XdmSequence<SimpleNode> {
    let Some(name) = args.first().and_then(|a| a.first()).map(XdmItem::string_value) else {
        return Vec::new();
    };
    if name.is_empty() {
        return Vec::new();
    }
    group.with_message(|m| m.header_sequence(&name)).unwrap_or_default()
}

fn bridge<F>(f: F) -> FunctionImpl<SimpleNode>
where
    F: Fn(&CallCtx<'_, SimpleNode>, &[XdmSequence<SimpleNode>]) -> Result<XdmSequence<SimpleNode>, Error>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// Resolves the message functions, consulting an external resolver first.
#[derive(Clone, Default)]
pub struct FunctionBridge {
    external: Option<Arc<dyn FunctionResolver<SimpleNode>>>,
}

impl FunctionBridge {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_external(mut self, resolver: Arc<dyn FunctionResolver<SimpleNode>>) -> Self {
        self.external = Some(resolver);
        self
    }
}

impl fmt::Debug for FunctionBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionBridge").field("external", &self.external.is_some()).finish()
    }
}

impl FunctionResolver<SimpleNode> for FunctionBridge {
    fn resolve_function(&self, name: &ExpandedName, arity: usize) -> Option<FunctionImpl<SimpleNode>> {
        if let Some(f) = self.external.as_ref().and_then(|r| r.resolve_function(name, arity)) {
            return Some(f);
        }
        let group = FunctionGroup::of(name)?;
        let &(_, _, builtin) = BUILTINS.iter().find(|(local, n, _)| *local == name.local && *n == arity)?;
        Some(bridge(move |_, args| Ok(builtin(group, args))))
    }
}
