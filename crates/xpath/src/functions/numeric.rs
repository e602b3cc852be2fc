use super::{arg, arg_or_context, atomic, wrap};
use crate::model::XdmNode;
use crate::runtime::{CallCtx, Error, FunctionRegistry};
use crate::xdm::{XdmAtomicValue, XdmItem, XdmSequence, number_value};

pub(super) fn register<N: XdmNode + 'static>(reg: &mut FunctionRegistry<N>) {
    reg.register_range("number", 0, 1, &wrap(fn_number::<N>));
    reg.register_local("sum", 1, wrap(fn_sum::<N>));
    reg.register_local("count", 1, wrap(fn_count::<N>));
    reg.register_local("floor", 1, wrap(|_: &CallCtx<'_, N>, args: &[XdmSequence<N>]| Ok(rounding(arg(args, 0), f64::floor))));
    reg.register_local("ceiling", 1, wrap(|_: &CallCtx<'_, N>, args: &[XdmSequence<N>]| Ok(rounding(arg(args, 0), f64::ceil))));
    reg.register_local("round", 1, wrap(|_: &CallCtx<'_, N>, args: &[XdmSequence<N>]| Ok(rounding(arg(args, 0), round_half_up))));
}

/// XPath rounding: halves round towards positive infinity and values in `[-0.5, 0)` give -0.
pub(crate) fn round_half_up(x: f64) -> f64 {
    if !x.is_finite() {
        x
    } else if (-0.5..0.0).contains(&x) {
        -0.0
    } else {
        (x + 0.5).floor()
    }
}

/// Integers pass through unchanged; everything else is converted to a double first.
fn rounding<N: XdmNode>(seq: &[XdmItem<N>], op: fn(f64) -> f64) -> XdmSequence<N> {
    match seq {
        [XdmItem::Atomic(XdmAtomicValue::Integer(i))] => atomic(XdmAtomicValue::Integer(*i)),
        _ => atomic(XdmAtomicValue::Double(op(number_value(seq)))),
    }
}

fn fn_number<N: XdmNode>(ctx: &CallCtx<'_, N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    Ok(atomic(XdmAtomicValue::Double(number_value(arg_or_context(ctx, args)?))))
}

fn fn_sum<N: XdmNode>(_ctx: &CallCtx<'_, N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    let items = arg(args, 0);
    if items.iter().all(|i| matches!(i, XdmItem::Atomic(XdmAtomicValue::Integer(_)))) {
        let exact = items.iter().try_fold(0i64, |acc, item| match item {
            XdmItem::Atomic(XdmAtomicValue::Integer(v)) => acc.checked_add(*v),
            _ => None,
        });
        if let Some(total) = exact {
            return Ok(atomic(XdmAtomicValue::Integer(total)));
        }
    }
    let total: f64 = items.iter().map(|item| item.atomize().number_value()).sum();
    Ok(atomic(XdmAtomicValue::Double(total)))
}

fn fn_count<N: XdmNode>(_ctx: &CallCtx<'_, N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    let n = arg(args, 0).len();
    Ok(atomic(XdmAtomicValue::Integer(i64::try_from(n).unwrap_or(i64::MAX))))
}
