//! Core function library (XPath 1.0 plus `upper-case`/`lower-case`), registered in no namespace.

use std::sync::Arc;

use crate::model::XdmNode;
use crate::runtime::{CallCtx, Error, FunctionImpl, FunctionRegistry};
use crate::xdm::{XdmAtomicValue, XdmItem, XdmSequence};

mod boolean;
mod nodes;
mod numeric;
mod strings;

pub fn default_function_registry<N: XdmNode + 'static>() -> FunctionRegistry<N> {
    let mut reg = FunctionRegistry::new();
    boolean::register(&mut reg);
    strings::register(&mut reg);
    numeric::register(&mut reg);
    nodes::register(&mut reg);
    reg
}

pub(crate) fn wrap<N, F>(f: F) -> FunctionImpl<N>
where
    F: Fn(&CallCtx<'_, N>, &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> + Send + Sync + 'static,
{
    Arc::new(f)
}

pub(crate) fn atomic<N>(value: XdmAtomicValue) -> XdmSequence<N> {
    vec![XdmItem::Atomic(value)]
}

/// Argument `idx`; the registry guarantees arity, an absent argument reads as empty.
pub(crate) fn arg<N>(args: &[XdmSequence<N>], idx: usize) -> &[XdmItem<N>] {
    args.get(idx).map_or(&[], Vec::as_slice)
}

/// The first argument, or the context item for the zero-argument form of a function.
pub(crate) fn arg_or_context<'a, N: XdmNode>(
    ctx: &'a CallCtx<'_, N>,
    args: &'a [XdmSequence<N>],
) -> Result<&'a [XdmItem<N>], Error> {
    match args.first() {
        Some(seq) => Ok(seq.as_slice()),
        None => Ok(std::slice::from_ref(ctx.context_item()?)),
    }
}
