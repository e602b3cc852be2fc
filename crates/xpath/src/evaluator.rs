use core::cmp::Ordering;
use core::fmt;
use std::sync::Arc;

use crate::compiler::{self, ir};
use crate::functions::default_function_registry;
use crate::model::{NodeKind, XdmNode};
use crate::runtime::{
    CallCtx, Error, ErrorCode, FunctionImpl, FunctionRegistry, FunctionResolver, ResolveError, StaticContext,
    VariableResolver,
};
use crate::xdm::{
    ExpandedName, ResultShape, XPathValue, XdmAtomicValue, XdmItem, XdmSequence, boolean_value, number_value,
};

/// Compiles expression text into [`XPathExpression`] instances sharing one configuration:
/// namespace bindings, an optional external function resolver and an optional variable
/// resolver. Cheap to clone.
pub struct XPathCompiler<N> {
    static_ctx: StaticContext,
    resolver: Option<Arc<dyn FunctionResolver<N>>>,
    variables: Option<Arc<dyn VariableResolver<N>>>,
    core: Arc<FunctionRegistry<N>>,
}

impl<N> Clone for XPathCompiler<N> {
    fn clone(&self) -> Self {
        Self {
            static_ctx: self.static_ctx.clone(),
            resolver: self.resolver.clone(),
            variables: self.variables.clone(),
            core: Arc::clone(&self.core),
        }
    }
}

impl<N> fmt::Debug for XPathCompiler<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XPathCompiler")
            .field("static_ctx", &self.static_ctx)
            .field("resolver", &self.resolver.is_some())
            .field("variables", &self.variables.is_some())
            .finish_non_exhaustive()
    }
}

impl<N: XdmNode + 'static> Default for XPathCompiler<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: XdmNode + 'static> XPathCompiler<N> {
    pub fn new() -> Self {
        Self {
            static_ctx: StaticContext::default(),
            resolver: None,
            variables: None,
            core: Arc::new(default_function_registry()),
        }
    }

    #[must_use]
    pub fn with_static_context(mut self, static_ctx: StaticContext) -> Self {
        self.static_ctx = static_ctx;
        self
    }

    /// Resolver consulted for every function the core library does not define.
    #[must_use]
    pub fn with_function_resolver(mut self, resolver: Arc<dyn FunctionResolver<N>>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    #[must_use]
    pub fn with_variable_resolver(mut self, variables: Arc<dyn VariableResolver<N>>) -> Self {
        self.variables = Some(variables);
        self
    }

    pub fn static_context(&self) -> &StaticContext {
        &self.static_ctx
    }

    pub fn compile(&self, source: &str) -> Result<XPathExpression<N>, Error> {
        let program = compiler::compile_xpath_with_context(source, &self.static_ctx)?;
        Ok(self.instantiate(Arc::new(program)))
    }

    /// Creates a fresh instance of an already compiled program with this configuration.
    pub fn instantiate(&self, program: Arc<ir::CompiledXPath>) -> XPathExpression<N> {
        XPathExpression {
            call_sites: vec![None; program.call_sites],
            program,
            core: Arc::clone(&self.core),
            resolver: self.resolver.clone(),
            variables: self.variables.clone(),
            stack: Vec::new(),
        }
    }
}

/// One executable instance of a compiled expression.
///
/// An instance owns its evaluation stack and a cache of resolved call sites, so evaluation
/// takes `&mut self`. Run the same expression on several threads by giving each thread its
/// own instance.
pub struct XPathExpression<N> {
    program: Arc<ir::CompiledXPath>,
    core: Arc<FunctionRegistry<N>>,
    resolver: Option<Arc<dyn FunctionResolver<N>>>,
    variables: Option<Arc<dyn VariableResolver<N>>>,
    call_sites: Vec<Option<FunctionImpl<N>>>,
    stack: Vec<XdmSequence<N>>,
}

impl<N> fmt::Debug for XPathExpression<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XPathExpression")
            .field("source", &self.program.source)
            .field("resolved_sites", &self.call_sites.iter().filter(|s| s.is_some()).count())
            .finish_non_exhaustive()
    }
}

struct Frame<N> {
    item: Option<XdmItem<N>>,
    position: usize,
    last: usize,
}

impl<N> Frame<N> {
    fn context_item(&self) -> Result<&XdmItem<N>, Error> {
        self.item.as_ref().ok_or_else(|| Error::from_code(ErrorCode::XPDY0002, "context item is undefined"))
    }
}

impl<N: XdmNode + 'static> XPathExpression<N> {
    pub fn source(&self) -> &str {
        &self.program.source
    }

    pub fn program(&self) -> &Arc<ir::CompiledXPath> {
        &self.program
    }

    /// Evaluates against an optional context item and returns the raw sequence.
    pub fn evaluate(&mut self, context: Option<XdmItem<N>>) -> Result<XdmSequence<N>, Error> {
        let program = Arc::clone(&self.program);
        let frame = Frame { position: usize::from(context.is_some()), last: usize::from(context.is_some()), item: context };
        self.stack.clear();
        let result = self.run(&program.instrs, &frame, &program.static_ctx);
        self.stack.clear();
        result
    }

    pub fn evaluate_as(&mut self, context: Option<XdmItem<N>>, shape: ResultShape) -> Result<XPathValue<N>, Error> {
        let seq = self.evaluate(context)?;
        XPathValue::coerce(seq, shape)
    }

    fn run(&mut self, code: &ir::InstrSeq, frame: &Frame<N>, sctx: &StaticContext) -> Result<XdmSequence<N>, Error> {
        let base = self.stack.len();
        let outcome = self.exec(code, frame, sctx, base);
        let value = match outcome {
            Ok(()) if self.stack.len() > base => self.stack.pop().unwrap_or_default(),
            Ok(()) => Vec::new(),
            Err(e) => {
                self.stack.truncate(base);
                return Err(e);
            }
        };
        self.stack.truncate(base);
        Ok(value)
    }

    fn pop(&mut self, base: usize) -> Result<XdmSequence<N>, Error> {
        if self.stack.len() <= base {
            return Err(Error::from_code(ErrorCode::FOER0000, "evaluation stack underflow"));
        }
        self.stack.pop().ok_or_else(|| Error::from_code(ErrorCode::FOER0000, "evaluation stack underflow"))
    }

    fn peek_bool(&self, base: usize) -> Result<bool, Error> {
        match self.stack.last() {
            Some(seq) if self.stack.len() > base => boolean_value(seq),
            _ => Err(Error::from_code(ErrorCode::FOER0000, "evaluation stack underflow")),
        }
    }

    fn exec(&mut self, code: &ir::InstrSeq, frame: &Frame<N>, sctx: &StaticContext, base: usize) -> Result<(), Error> {
        let ops = &code.0;
        let mut ip = 0;
        while ip < ops.len() {
            match &ops[ip] {
                ir::OpCode::PushAtomic(v) => self.stack.push(vec![XdmItem::Atomic(v.clone())]),
                ir::OpCode::LoadVarByName(name) => {
                    let value = self.variables.as_ref().and_then(|v| v.resolve_variable(name)).ok_or_else(|| {
                        Error::from_code(ErrorCode::XPST0008, format!("variable ${name} is not declared"))
                    })?;
                    self.stack.push(value);
                }
                ir::OpCode::LoadContextItem => {
                    let item = frame.context_item()?.clone();
                    self.stack.push(vec![item]);
                }
                ir::OpCode::Position => self.stack.push(vec![XdmItem::Atomic(integer(frame.position))]),
                ir::OpCode::Last => self.stack.push(vec![XdmItem::Atomic(integer(frame.last))]),
                ir::OpCode::ToRoot => match frame.context_item()? {
                    XdmItem::Node(n) => self.stack.push(vec![XdmItem::Node(n.root())]),
                    XdmItem::Atomic(_) => {
                        return Err(Error::from_code(
                            ErrorCode::XPTY0004,
                            "'/' selects the root of the context node, but the context item is atomic",
                        ));
                    }
                },
                ir::OpCode::AxisStep(axis, test, preds) => {
                    let input = self.pop(base)?;
                    let out = self.axis_step(input, *axis, test, preds, sctx)?;
                    self.stack.push(out);
                }
                ir::OpCode::ApplyPredicates(preds) => {
                    let mut seq = self.pop(base)?;
                    for pred in preds {
                        seq = self.filter(seq, pred, sctx)?;
                    }
                    self.stack.push(seq);
                }
                ir::OpCode::Add | ir::OpCode::Sub | ir::OpCode::Mul | ir::OpCode::Div | ir::OpCode::Mod => {
                    let right = self.pop(base)?;
                    let left = self.pop(base)?;
                    self.stack.push(vec![XdmItem::Atomic(arithmetic(&ops[ip], &left, &right))]);
                }
                ir::OpCode::Neg => {
                    let operand = self.pop(base)?;
                    let value = match Num::of(&operand) {
                        Num::Int(i) => i.checked_neg().map_or_else(|| XdmAtomicValue::Double(-Num::Int(i).as_f64()), XdmAtomicValue::Integer),
                        Num::Dbl(d) => XdmAtomicValue::Double(-d),
                    };
                    self.stack.push(vec![XdmItem::Atomic(value)]);
                }
                ir::OpCode::ToEBV => {
                    let operand = self.pop(base)?;
                    let b = boolean_value(&operand)?;
                    self.stack.push(vec![XdmItem::Atomic(XdmAtomicValue::Boolean(b))]);
                }
                ir::OpCode::Pop => {
                    self.pop(base)?;
                }
                ir::OpCode::JumpIfTrue(target) => {
                    if self.peek_bool(base)? {
                        ip = *target;
                        continue;
                    }
                }
                ir::OpCode::JumpIfFalse(target) => {
                    if !self.peek_bool(base)? {
                        ip = *target;
                        continue;
                    }
                }
                ir::OpCode::CompareGeneral(op) => {
                    let right = self.pop(base)?;
                    let left = self.pop(base)?;
                    let b = general_compare(*op, &left, &right)?;
                    self.stack.push(vec![XdmItem::Atomic(XdmAtomicValue::Boolean(b))]);
                }
                ir::OpCode::Union => {
                    let right = into_nodes(self.pop(base)?, "union")?;
                    let mut left = into_nodes(self.pop(base)?, "union")?;
                    left.extend(right);
                    let merged = doc_order_distinct(left)?;
                    self.stack.push(merged.into_iter().map(XdmItem::Node).collect());
                }
                ir::OpCode::CallByName { name, argc, site } => {
                    let f = self.resolve_call(name, *argc, *site)?;
                    let split = self
                        .stack
                        .len()
                        .checked_sub(*argc)
                        .filter(|s| *s >= base)
                        .ok_or_else(|| Error::from_code(ErrorCode::FOER0000, "evaluation stack underflow"))?;
                    let args = self.stack.split_off(split);
                    let ctx = CallCtx { item: frame.item.as_ref(), position: frame.position, last: frame.last, static_ctx: sctx };
                    let out = (*f)(&ctx, &args)?;
                    self.stack.push(out);
                }
            }
            ip += 1;
        }
        Ok(())
    }

    /// Core library first for names in no namespace, then the external resolver. A hit is
    /// cached for the call site.
    fn resolve_call(&mut self, name: &ExpandedName, argc: usize, site: usize) -> Result<FunctionImpl<N>, Error> {
        if let Some(Some(f)) = self.call_sites.get(site) {
            return Ok(Arc::clone(f));
        }
        let core = if name.ns_uri.is_none() { self.core.resolve(name, argc) } else { Err(ResolveError::Unknown) };
        let f = match core {
            Ok(f) => f,
            Err(core_err) => match self.resolver.as_ref().and_then(|r| r.resolve_function(name, argc)) {
                Some(f) => f,
                None => {
                    let message = match core_err {
                        ResolveError::WrongArity { available } => {
                            format!("function {name}() does not accept {argc} argument(s), expected one of {available:?}")
                        }
                        ResolveError::Unknown => format!("unknown function {name}#{argc}"),
                    };
                    return Err(Error::from_code(ErrorCode::XPST0017, message));
                }
            },
        };
        if let Some(slot) = self.call_sites.get_mut(site) {
            *slot = Some(Arc::clone(&f));
        }
        tracing::trace!(function = %name, arity = argc, site, "resolved call site");
        Ok(f)
    }

    fn axis_step(
        &mut self,
        input: XdmSequence<N>,
        axis: ir::AxisIR,
        test: &ir::NodeTestIR,
        preds: &[ir::InstrSeq],
        sctx: &StaticContext,
    ) -> Result<XdmSequence<N>, Error> {
        let nodes = into_nodes(input, "path step")?;
        let single = nodes.len() == 1;
        let mut out: Vec<N> = Vec::new();
        for node in &nodes {
            let mut selected: XdmSequence<N> = axis_nodes(node, axis)
                .into_iter()
                .filter(|n| matches_test(n, axis, test))
                .map(XdmItem::Node)
                .collect();
            for pred in preds {
                selected = self.filter(selected, pred, sctx)?;
            }
            out.extend(selected.into_iter().filter_map(|item| match item {
                XdmItem::Node(n) => Some(n),
                XdmItem::Atomic(_) => None,
            }));
        }
        let ordered = if single {
            if axis.is_reverse() {
                out.reverse();
            }
            out
        } else {
            doc_order_distinct(out)?
        };
        Ok(ordered.into_iter().map(XdmItem::Node).collect())
    }

    /// Keeps the items for which `pred` holds; a numeric predicate value selects by position.
    fn filter(&mut self, items: XdmSequence<N>, pred: &ir::InstrSeq, sctx: &StaticContext) -> Result<XdmSequence<N>, Error> {
        let last = items.len();
        let mut kept = Vec::with_capacity(items.len());
        for (idx, item) in items.into_iter().enumerate() {
            let frame = Frame { item: Some(item), position: idx + 1, last };
            let value = self.run(pred, &frame, sctx)?;
            let keep = match value.as_slice() {
                [XdmItem::Atomic(a)] if a.is_numeric() => position_matches(a.number_value(), idx + 1),
                _ => boolean_value(&value)?,
            };
            if keep && let Some(item) = frame.item {
                kept.push(item);
            }
        }
        Ok(kept)
    }
}

fn integer(n: usize) -> XdmAtomicValue {
    XdmAtomicValue::Integer(i64::try_from(n).unwrap_or(i64::MAX))
}

#[allow(clippy::cast_precision_loss, clippy::float_cmp)]
fn position_matches(value: f64, position: usize) -> bool {
    value == position as f64
}

fn into_nodes<N: XdmNode>(seq: XdmSequence<N>, what: &str) -> Result<Vec<N>, Error> {
    seq.into_iter()
        .map(|item| match item {
            XdmItem::Node(n) => Ok(n),
            XdmItem::Atomic(a) => Err(Error::from_code(
                ErrorCode::XPTY0004,
                format!("{what} requires nodes, found atomic value '{}'", a.string_value()),
            )),
        })
        .collect()
}

/// Sorts into document order and removes duplicates.
pub fn doc_order_distinct<N: XdmNode>(mut nodes: Vec<N>) -> Result<Vec<N>, Error> {
    if nodes.len() < 2 {
        return Ok(nodes);
    }
    let mut failure = None;
    nodes.sort_by(|a, b| match a.compare_document_order(b) {
        Ok(ord) => ord,
        Err(e) => {
            failure.get_or_insert(e);
            Ordering::Equal
        }
    });
    if let Some(e) = failure {
        return Err(e);
    }
    nodes.dedup();
    Ok(nodes)
}

/// Appends the descendants of `node` in document order.
fn descendants<N: XdmNode>(node: &N, out: &mut Vec<N>) {
    let mut pending: Vec<N> = node.children().into_iter().rev().collect();
    while let Some(next) = pending.pop() {
        pending.extend(next.children().into_iter().rev());
        out.push(next);
    }
}

fn is_attribute_like(kind: NodeKind) -> bool {
    matches!(kind, NodeKind::Attribute | NodeKind::Namespace)
}

/// Nodes on `axis` in axis order: reverse axes start next to the context node.
fn axis_nodes<N: XdmNode>(node: &N, axis: ir::AxisIR) -> Vec<N> {
    let mut out = Vec::new();
    match axis {
        ir::AxisIR::Child => out = node.children(),
        ir::AxisIR::Attribute => out = node.attributes(),
        ir::AxisIR::SelfAxis => out.push(node.clone()),
        ir::AxisIR::Descendant => descendants(node, &mut out),
        ir::AxisIR::DescendantOrSelf => {
            out.push(node.clone());
            descendants(node, &mut out);
        }
        ir::AxisIR::Parent => out.extend(node.parent()),
        ir::AxisIR::Ancestor | ir::AxisIR::AncestorOrSelf => {
            if axis == ir::AxisIR::AncestorOrSelf {
                out.push(node.clone());
            }
            let mut current = node.parent();
            while let Some(parent) = current {
                current = parent.parent();
                out.push(parent);
            }
        }
        ir::AxisIR::FollowingSibling | ir::AxisIR::PrecedingSibling => {
            if is_attribute_like(node.kind()) {
                return out;
            }
            if let Some(parent) = node.parent() {
                let siblings = parent.children();
                if let Some(idx) = siblings.iter().position(|s| s == node) {
                    if axis == ir::AxisIR::FollowingSibling {
                        out.extend(siblings[idx + 1..].iter().cloned());
                    } else {
                        out.extend(siblings[..idx].iter().rev().cloned());
                    }
                }
            }
        }
        ir::AxisIR::Following => {
            let mut current = node.clone();
            if is_attribute_like(node.kind())
                && let Some(owner) = node.parent()
            {
                descendants(&owner, &mut out);
                current = owner;
            }
            while let Some(parent) = current.parent() {
                let siblings = parent.children();
                if let Some(idx) = siblings.iter().position(|s| *s == current) {
                    for sibling in &siblings[idx + 1..] {
                        out.push(sibling.clone());
                        descendants(sibling, &mut out);
                    }
                }
                current = parent;
            }
        }
        ir::AxisIR::Preceding => {
            let mut current = node.clone();
            if is_attribute_like(node.kind())
                && let Some(owner) = node.parent()
            {
                current = owner;
            }
            while let Some(parent) = current.parent() {
                let siblings = parent.children();
                if let Some(idx) = siblings.iter().position(|s| *s == current) {
                    for sibling in siblings[..idx].iter().rev() {
                        let mut subtree = Vec::new();
                        descendants(sibling, &mut subtree);
                        out.extend(subtree.into_iter().rev());
                        out.push(sibling.clone());
                    }
                }
                current = parent;
            }
        }
    }
    out
}

fn matches_test<N: XdmNode>(node: &N, axis: ir::AxisIR, test: &ir::NodeTestIR) -> bool {
    let principal = if axis == ir::AxisIR::Attribute { NodeKind::Attribute } else { NodeKind::Element };
    let kind = node.kind();
    match test {
        ir::NodeTestIR::AnyKind => true,
        ir::NodeTestIR::WildcardAny => kind == principal,
        ir::NodeTestIR::Name(expected) => {
            kind == principal
                && node.name().is_some_and(|q| {
                    q.local == expected.local
                        && q.ns_uri.as_deref().filter(|ns| !ns.is_empty()) == expected.ns_uri.as_deref()
                })
        }
        ir::NodeTestIR::NsWildcard(uri) => {
            kind == principal && node.name().is_some_and(|q| q.ns_uri.as_deref() == Some(uri.as_str()))
        }
        ir::NodeTestIR::KindText => kind == NodeKind::Text,
        ir::NodeTestIR::KindComment => kind == NodeKind::Comment,
        ir::NodeTestIR::KindProcessingInstruction(target) => {
            kind == NodeKind::ProcessingInstruction
                && target.as_ref().is_none_or(|t| node.name().is_some_and(|q| &q.local == t))
        }
    }
}

#[derive(Clone, Copy)]
enum Num {
    Int(i64),
    Dbl(f64),
}

impl Num {
    fn of<N: XdmNode>(seq: &[XdmItem<N>]) -> Num {
        match seq {
            [XdmItem::Atomic(XdmAtomicValue::Integer(i))] => Num::Int(*i),
            _ => Num::Dbl(number_value(seq)),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Dbl(d) => d,
        }
    }
}

/// Integer operands stay integers while the result fits; `div` always yields a double.
fn arithmetic<N: XdmNode>(op: &ir::OpCode, left: &[XdmItem<N>], right: &[XdmItem<N>]) -> XdmAtomicValue {
    let (a, b) = (Num::of(left), Num::of(right));
    if let (Num::Int(x), Num::Int(y)) = (a, b) {
        let exact = match op {
            ir::OpCode::Add => x.checked_add(y),
            ir::OpCode::Sub => x.checked_sub(y),
            ir::OpCode::Mul => x.checked_mul(y),
            ir::OpCode::Mod if y != 0 => Some(x.checked_rem(y).unwrap_or(0)),
            _ => None,
        };
        if let Some(v) = exact {
            return XdmAtomicValue::Integer(v);
        }
    }
    let (x, y) = (a.as_f64(), b.as_f64());
    XdmAtomicValue::Double(match op {
        ir::OpCode::Add => x + y,
        ir::OpCode::Sub => x - y,
        ir::OpCode::Mul => x * y,
        ir::OpCode::Div => x / y,
        _ => x % y,
    })
}

/// XPath 1.0 comparison: booleans compare by truth value, otherwise the comparison is
/// existential over the atomized items of both operands.
fn general_compare<N: XdmNode>(op: ir::ComparisonOp, left: &[XdmItem<N>], right: &[XdmItem<N>]) -> Result<bool, Error> {
    let is_bool = |seq: &[XdmItem<N>]| matches!(seq, [XdmItem::Atomic(XdmAtomicValue::Boolean(_))]);
    if is_bool(left) || is_bool(right) {
        let a = XdmAtomicValue::Boolean(boolean_value(left)?);
        let b = XdmAtomicValue::Boolean(boolean_value(right)?);
        return Ok(compare_atomic(op, &a, &b));
    }
    let rights: Vec<XdmAtomicValue> = right.iter().map(XdmItem::atomize).collect();
    Ok(left.iter().any(|l| {
        let l = l.atomize();
        rights.iter().any(|r| compare_atomic(op, &l, r))
    }))
}

#[allow(clippy::float_cmp)]
fn compare_atomic(op: ir::ComparisonOp, a: &XdmAtomicValue, b: &XdmAtomicValue) -> bool {
    let is_bool = |v: &XdmAtomicValue| matches!(v, XdmAtomicValue::Boolean(_));
    match op {
        ir::ComparisonOp::Eq | ir::ComparisonOp::Ne => {
            let equal = if is_bool(a) || is_bool(b) {
                a.boolean_value() == b.boolean_value()
            } else if a.is_numeric() || b.is_numeric() {
                a.number_value() == b.number_value()
            } else {
                a.string_value() == b.string_value()
            };
            (op == ir::ComparisonOp::Eq) == equal
        }
        ir::ComparisonOp::Lt => a.number_value() < b.number_value(),
        ir::ComparisonOp::Le => a.number_value() <= b.number_value(),
        ir::ComparisonOp::Gt => a.number_value() > b.number_value(),
        ir::ComparisonOp::Ge => a.number_value() >= b.number_value(),
    }
}
