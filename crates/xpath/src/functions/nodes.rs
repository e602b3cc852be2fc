use super::{arg_or_context, atomic, wrap};
use crate::model::{QName, XdmNode};
use crate::runtime::{CallCtx, Error, ErrorCode, FunctionRegistry};
use crate::xdm::{XdmAtomicValue, XdmItem, XdmSequence, is_named_kind};

pub(super) fn register<N: XdmNode + 'static>(reg: &mut FunctionRegistry<N>) {
    reg.register_range("name", 0, 1, &wrap(|ctx: &CallCtx<'_, N>, args: &[XdmSequence<N>]| {
        node_name_part(ctx, args, |q| q.lexical())
    }));
    reg.register_range("local-name", 0, 1, &wrap(|ctx: &CallCtx<'_, N>, args: &[XdmSequence<N>]| {
        node_name_part(ctx, args, |q| q.local.clone())
    }));
    reg.register_range("namespace-uri", 0, 1, &wrap(|ctx: &CallCtx<'_, N>, args: &[XdmSequence<N>]| {
        node_name_part(ctx, args, |q| q.ns_uri.clone().unwrap_or_default())
    }));
}

/// Applies `part` to the name of the first node of the argument (or the context node).
/// Unnamed nodes and the empty sequence yield the empty string.
fn node_name_part<N: XdmNode>(
    ctx: &CallCtx<'_, N>,
    args: &[XdmSequence<N>],
    part: impl Fn(&QName) -> String,
) -> Result<XdmSequence<N>, Error> {
    let value = match arg_or_context(ctx, args)?.first() {
        None => String::new(),
        Some(XdmItem::Node(n)) if is_named_kind(n.kind()) => n.name().map(|q| part(&q)).unwrap_or_default(),
        Some(XdmItem::Node(_)) => String::new(),
        Some(XdmItem::Atomic(a)) => {
            return Err(Error::from_code(
                ErrorCode::XPTY0004,
                format!("expected a node, found atomic value '{}'", a.string_value()),
            ));
        }
    };
    Ok(atomic(XdmAtomicValue::String(value)))
}
