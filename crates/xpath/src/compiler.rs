use std::sync::Arc;

use crate::parser::{XPathParser, ast};
use crate::runtime::{Error, ErrorCode, StaticContext};
use crate::xdm::{ExpandedName, XdmAtomicValue};

pub mod ir;

type CResult<T> = Result<T, Error>;

/// Parses and lowers `expr` against the default static context.
pub fn compile_xpath(expr: &str) -> CResult<ir::CompiledXPath> {
    compile_xpath_with_context(expr, &StaticContext::default())
}

pub fn compile_xpath_with_context(expr: &str, static_ctx: &StaticContext) -> CResult<ir::CompiledXPath> {
    let ast = XPathParser::parse_to_ast(expr)?;
    let mut compiler = Compiler::new(static_ctx);
    compiler.lower_expr(&ast)?;
    tracing::debug!(expression = expr, ops = compiler.code.len(), call_sites = compiler.call_sites, "compiled xpath");
    Ok(ir::CompiledXPath {
        instrs: ir::InstrSeq(compiler.code),
        static_ctx: Arc::new(static_ctx.clone()),
        source: expr.to_string(),
        call_sites: compiler.call_sites,
    })
}

struct Compiler<'a> {
    static_ctx: &'a StaticContext,
    code: Vec<ir::OpCode>,
    call_sites: usize,
}

impl<'a> Compiler<'a> {
    fn new(static_ctx: &'a StaticContext) -> Self {
        Self { static_ctx, code: Vec::new(), call_sites: 0 }
    }

    fn emit(&mut self, op: ir::OpCode) {
        self.code.push(op);
    }

    fn lower_expr(&mut self, e: &ast::Expr) -> CResult<()> {
        match e {
            ast::Expr::Literal(lit) => self.emit(ir::OpCode::PushAtomic(lower_literal(lit))),
            ast::Expr::VarRef(q) => {
                let name = self.to_expanded(q)?;
                self.emit(ir::OpCode::LoadVarByName(name));
            }
            ast::Expr::FunctionCall { name, args } => self.lower_call(name, args)?,
            ast::Expr::Binary { left, op, right } => match arithmetic_op(*op) {
                Some(code) => {
                    self.lower_expr(left)?;
                    self.lower_expr(right)?;
                    self.emit(code);
                }
                None => self.lower_logical(left, *op == ast::BinaryOp::And, right)?,
            },
            ast::Expr::GeneralComparison { left, op, right } => {
                self.lower_expr(left)?;
                self.lower_expr(right)?;
                self.emit(ir::OpCode::CompareGeneral(map_cmp(*op)));
            }
            ast::Expr::Negate(inner) => {
                self.lower_expr(inner)?;
                self.emit(ir::OpCode::Neg);
            }
            ast::Expr::Union(left, right) => {
                self.lower_expr(left)?;
                self.lower_expr(right)?;
                self.emit(ir::OpCode::Union);
            }
            ast::Expr::Path(path) => {
                match path.start {
                    ast::PathStart::Root => self.emit(ir::OpCode::ToRoot),
                    ast::PathStart::Relative => self.emit(ir::OpCode::LoadContextItem),
                }
                self.lower_path_steps(&path.steps)?;
            }
            ast::Expr::Filter { input, predicates } => {
                self.lower_expr(input)?;
                let preds = self.lower_predicates(predicates)?;
                self.emit(ir::OpCode::ApplyPredicates(preds));
            }
            ast::Expr::PathFrom { base, steps } => {
                self.lower_expr(base)?;
                self.lower_path_steps(steps)?;
            }
        }
        Ok(())
    }

    /// `and`/`or` short-circuit: the left operand's boolean stays on the stack when it decides.
    fn lower_logical(&mut self, left: &ast::Expr, is_and: bool, right: &ast::Expr) -> CResult<()> {
        self.lower_expr(left)?;
        self.emit(ir::OpCode::ToEBV);
        let pos = self.code.len();
        self.emit(if is_and { ir::OpCode::JumpIfFalse(0) } else { ir::OpCode::JumpIfTrue(0) });
        self.emit(ir::OpCode::Pop);
        self.lower_expr(right)?;
        self.emit(ir::OpCode::ToEBV);
        self.patch_jump(pos);
        Ok(())
    }

    fn lower_call(&mut self, name: &ast::QName, args: &[ast::Expr]) -> CResult<()> {
        if name.prefix.is_none() && args.is_empty() {
            match name.local.as_str() {
                "position" => {
                    self.emit(ir::OpCode::Position);
                    return Ok(());
                }
                "last" => {
                    self.emit(ir::OpCode::Last);
                    return Ok(());
                }
                _ => {}
            }
        }
        let expanded = self.to_expanded(name)?;
        for arg in args {
            self.lower_expr(arg)?;
        }
        let site = self.call_sites;
        self.call_sites += 1;
        self.emit(ir::OpCode::CallByName { name: expanded, argc: args.len(), site });
        Ok(())
    }

    fn lower_predicates(&mut self, preds: &[ast::Expr]) -> CResult<Vec<ir::InstrSeq>> {
        let mut out = Vec::with_capacity(preds.len());
        for p in preds {
            let saved = std::mem::take(&mut self.code);
            let lowered = self.lower_expr(p);
            let body = std::mem::replace(&mut self.code, saved);
            lowered?;
            out.push(ir::InstrSeq(body));
        }
        Ok(out)
    }

    fn lower_path_steps(&mut self, steps: &[ast::Step]) -> CResult<()> {
        for step in steps {
            let test = self.map_node_test(&step.test)?;
            let preds = self.lower_predicates(&step.predicates)?;
            self.emit(ir::OpCode::AxisStep(map_axis(step.axis), test, preds));
        }
        Ok(())
    }

    fn map_node_test(&self, t: &ast::NodeTest) -> CResult<ir::NodeTestIR> {
        Ok(match t {
            ast::NodeTest::Name(ast::NameTest::QName(q)) => ir::NodeTestIR::Name(self.to_expanded(q)?),
            ast::NodeTest::Name(ast::NameTest::Wildcard(ast::WildcardName::Any)) => ir::NodeTestIR::WildcardAny,
            ast::NodeTest::Name(ast::NameTest::Wildcard(ast::WildcardName::NsWildcard(prefix))) => {
                ir::NodeTestIR::NsWildcard(self.resolve_prefix(prefix)?.to_string())
            }
            ast::NodeTest::Kind(ast::KindTest::AnyKind) => ir::NodeTestIR::AnyKind,
            ast::NodeTest::Kind(ast::KindTest::Text) => ir::NodeTestIR::KindText,
            ast::NodeTest::Kind(ast::KindTest::Comment) => ir::NodeTestIR::KindComment,
            ast::NodeTest::Kind(ast::KindTest::ProcessingInstruction(target)) => {
                ir::NodeTestIR::KindProcessingInstruction(target.clone())
            }
        })
    }

    fn resolve_prefix(&self, prefix: &str) -> CResult<&'a str> {
        self.static_ctx.resolve_prefix(prefix).ok_or_else(|| {
            Error::from_code(ErrorCode::XPST0081, format!("namespace prefix '{prefix}' is not declared"))
        })
    }

    /// Unprefixed names stay in no namespace; XPath 1.0 has no default element namespace.
    fn to_expanded(&self, q: &ast::QName) -> CResult<ExpandedName> {
        match &q.prefix {
            Some(prefix) => Ok(ExpandedName::new(Some(self.resolve_prefix(prefix)?), q.local.clone())),
            None => Ok(ExpandedName::local(q.local.clone())),
        }
    }

    fn patch_jump(&mut self, pos: usize) {
        let target = self.code.len();
        match &mut self.code[pos] {
            ir::OpCode::JumpIfTrue(t) | ir::OpCode::JumpIfFalse(t) => *t = target,
            _ => debug_assert!(false, "patch_jump on a non-jump opcode"),
        }
    }
}

fn lower_literal(l: &ast::Literal) -> XdmAtomicValue {
    match l {
        ast::Literal::Integer(i) => XdmAtomicValue::Integer(*i),
        ast::Literal::Double(d) => XdmAtomicValue::Double(*d),
        ast::Literal::String(s) => XdmAtomicValue::String(s.clone()),
    }
}

fn arithmetic_op(op: ast::BinaryOp) -> Option<ir::OpCode> {
    match op {
        ast::BinaryOp::Add => Some(ir::OpCode::Add),
        ast::BinaryOp::Sub => Some(ir::OpCode::Sub),
        ast::BinaryOp::Mul => Some(ir::OpCode::Mul),
        ast::BinaryOp::Div => Some(ir::OpCode::Div),
        ast::BinaryOp::Mod => Some(ir::OpCode::Mod),
        ast::BinaryOp::And | ast::BinaryOp::Or => None,
    }
}

fn map_axis(a: ast::Axis) -> ir::AxisIR {
    match a {
        ast::Axis::Child => ir::AxisIR::Child,
        ast::Axis::Descendant => ir::AxisIR::Descendant,
        ast::Axis::DescendantOrSelf => ir::AxisIR::DescendantOrSelf,
        ast::Axis::Attribute => ir::AxisIR::Attribute,
        ast::Axis::SelfAxis => ir::AxisIR::SelfAxis,
        ast::Axis::Parent => ir::AxisIR::Parent,
        ast::Axis::Ancestor => ir::AxisIR::Ancestor,
        ast::Axis::AncestorOrSelf => ir::AxisIR::AncestorOrSelf,
        ast::Axis::FollowingSibling => ir::AxisIR::FollowingSibling,
        ast::Axis::PrecedingSibling => ir::AxisIR::PrecedingSibling,
        ast::Axis::Following => ir::AxisIR::Following,
        ast::Axis::Preceding => ir::AxisIR::Preceding,
    }
}

fn map_cmp(op: ast::GeneralComp) -> ir::ComparisonOp {
    match op {
        ast::GeneralComp::Eq => ir::ComparisonOp::Eq,
        ast::GeneralComp::Ne => ir::ComparisonOp::Ne,
        ast::GeneralComp::Lt => ir::ComparisonOp::Lt,
        ast::GeneralComp::Le => ir::ComparisonOp::Le,
        ast::GeneralComp::Gt => ir::ComparisonOp::Gt,
        ast::GeneralComp::Ge => ir::ComparisonOp::Ge,
    }
}
