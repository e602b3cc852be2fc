use super::{arg, atomic, wrap};
use crate::model::XdmNode;
use crate::runtime::{CallCtx, Error, FunctionRegistry};
use crate::xdm::{XdmAtomicValue, XdmSequence, boolean_value};

pub(super) fn register<N: XdmNode + 'static>(reg: &mut FunctionRegistry<N>) {
    reg.register_local("true", 0, wrap(|_: &CallCtx<'_, N>, _: &[XdmSequence<N>]| Ok(atomic(XdmAtomicValue::Boolean(true)))));
    reg.register_local("false", 0, wrap(|_: &CallCtx<'_, N>, _: &[XdmSequence<N>]| Ok(atomic(XdmAtomicValue::Boolean(false)))));
    reg.register_local("boolean", 1, wrap(fn_boolean::<N>));
    reg.register_local("not", 1, wrap(fn_not::<N>));
}

fn fn_boolean<N: XdmNode>(_ctx: &CallCtx<'_, N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    Ok(atomic(XdmAtomicValue::Boolean(boolean_value(arg(args, 0))?)))
}

fn fn_not<N: XdmNode>(_ctx: &CallCtx<'_, N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    Ok(atomic(XdmAtomicValue::Boolean(!boolean_value(arg(args, 0))?)))
}
