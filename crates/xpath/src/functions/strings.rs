use super::{arg, arg_or_context, atomic, wrap};
use crate::model::XdmNode;
use crate::runtime::{CallCtx, Error, FunctionRegistry};
use crate::xdm::{XdmAtomicValue, XdmSequence, number_value, string_value};

use super::numeric::round_half_up;

pub(super) fn register<N: XdmNode + 'static>(reg: &mut FunctionRegistry<N>) {
    reg.register_range("string", 0, 1, &wrap(fn_string::<N>));
    reg.register_variadic("concat", 2, wrap(fn_concat::<N>));
    reg.register_local("contains", 2, wrap(fn_contains::<N>));
    reg.register_local("starts-with", 2, wrap(fn_starts_with::<N>));
    reg.register_local("ends-with", 2, wrap(fn_ends_with::<N>));
    reg.register_range("substring", 2, 3, &wrap(fn_substring::<N>));
    reg.register_local("substring-before", 2, wrap(fn_substring_before::<N>));
    reg.register_local("substring-after", 2, wrap(fn_substring_after::<N>));
    reg.register_range("string-length", 0, 1, &wrap(fn_string_length::<N>));
    reg.register_range("normalize-space", 0, 1, &wrap(fn_normalize_space::<N>));
    reg.register_local("translate", 3, wrap(fn_translate::<N>));
    reg.register_local("upper-case", 1, wrap(fn_upper_case::<N>));
    reg.register_local("lower-case", 1, wrap(fn_lower_case::<N>));
}

fn text<N>(s: impl Into<String>) -> XdmSequence<N> {
    atomic(XdmAtomicValue::String(s.into()))
}

fn string_arg<N: XdmNode>(args: &[XdmSequence<N>], idx: usize) -> String {
    string_value(arg(args, idx))
}

fn fn_string<N: XdmNode>(ctx: &CallCtx<'_, N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    Ok(text(string_value(arg_or_context(ctx, args)?)))
}

fn fn_concat<N: XdmNode>(_ctx: &CallCtx<'_, N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    Ok(text(args.iter().map(|a| string_value(a)).collect::<String>()))
}

fn fn_contains<N: XdmNode>(_ctx: &CallCtx<'_, N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    let b = string_arg(args, 0).contains(string_arg(args, 1).as_str());
    Ok(atomic(XdmAtomicValue::Boolean(b)))
}

fn fn_starts_with<N: XdmNode>(_ctx: &CallCtx<'_, N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    let b = string_arg(args, 0).starts_with(string_arg(args, 1).as_str());
    Ok(atomic(XdmAtomicValue::Boolean(b)))
}

fn fn_ends_with<N: XdmNode>(_ctx: &CallCtx<'_, N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    let b = string_arg(args, 0).ends_with(string_arg(args, 1).as_str());
    Ok(atomic(XdmAtomicValue::Boolean(b)))
}

/// Characters at 1-based positions `p` with `round(start) <= p < round(start) + round(len)`.
#[allow(clippy::cast_precision_loss)]
fn fn_substring<N: XdmNode>(_ctx: &CallCtx<'_, N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    let source = string_arg(args, 0);
    let start = round_half_up(number_value(arg(args, 1)));
    let end = if args.len() > 2 { start + round_half_up(number_value(arg(args, 2))) } else { f64::INFINITY };
    let out: String = source
        .chars()
        .enumerate()
        .filter(|(i, _)| {
            let p = (*i + 1) as f64;
            p >= start && p < end
        })
        .map(|(_, c)| c)
        .collect();
    Ok(text(out))
}

fn fn_substring_before<N: XdmNode>(_ctx: &CallCtx<'_, N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    let source = string_arg(args, 0);
    let needle = string_arg(args, 1);
    let out = if needle.is_empty() { "" } else { source.find(&needle).map_or("", |i| &source[..i]) };
    Ok(text(out))
}

fn fn_substring_after<N: XdmNode>(_ctx: &CallCtx<'_, N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    let source = string_arg(args, 0);
    let needle = string_arg(args, 1);
    let out = source.find(&needle).map_or("", |i| &source[i + needle.len()..]);
    Ok(text(out))
}

fn fn_string_length<N: XdmNode>(ctx: &CallCtx<'_, N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    let len = string_value(arg_or_context(ctx, args)?).chars().count();
    Ok(atomic(XdmAtomicValue::Integer(i64::try_from(len).unwrap_or(i64::MAX))))
}

fn fn_normalize_space<N: XdmNode>(ctx: &CallCtx<'_, N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    let source = string_value(arg_or_context(ctx, args)?);
    let out = source
        .split([' ', '\t', '\r', '\n'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    Ok(text(out))
}

/// Characters of the second argument map to the character at the same position of the
/// third; characters without a counterpart are removed.
fn fn_translate<N: XdmNode>(_ctx: &CallCtx<'_, N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    let source = string_arg(args, 0);
    let from: Vec<char> = string_arg(args, 1).chars().collect();
    let to: Vec<char> = string_arg(args, 2).chars().collect();
    let out: String = source
        .chars()
        .filter_map(|c| match from.iter().position(|f| *f == c) {
            Some(idx) => to.get(idx).copied(),
            None => Some(c),
        })
        .collect();
    Ok(text(out))
}

fn fn_upper_case<N: XdmNode>(_ctx: &CallCtx<'_, N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    Ok(text(string_arg(args, 0).to_uppercase()))
}

fn fn_lower_case<N: XdmNode>(_ctx: &CallCtx<'_, N>, args: &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> {
    Ok(text(string_arg(args, 0).to_lowercase()))
}
