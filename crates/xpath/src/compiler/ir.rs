use std::sync::Arc;

use crate::runtime::StaticContext;
use crate::xdm::{ExpandedName, XdmAtomicValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisIR {
    Child,
    Attribute,
    SelfAxis,
    DescendantOrSelf,
    Descendant,
    Parent,
    Ancestor,
    AncestorOrSelf,
    PrecedingSibling,
    FollowingSibling,
    Preceding,
    Following,
}

impl AxisIR {
    /// Reverse axes number their nodes from the context node outwards.
    pub fn is_reverse(self) -> bool {
        matches!(
            self,
            AxisIR::Parent | AxisIR::Ancestor | AxisIR::AncestorOrSelf | AxisIR::PrecedingSibling | AxisIR::Preceding
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeTestIR {
    AnyKind,
    Name(ExpandedName),
    WildcardAny,
    NsWildcard(String),
    KindText,
    KindComment,
    KindProcessingInstruction(Option<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OpCode {
    // Data and variables
    PushAtomic(XdmAtomicValue),
    LoadVarByName(ExpandedName),
    LoadContextItem,
    Position,
    Last,
    ToRoot,

    // Steps / filters
    AxisStep(AxisIR, NodeTestIR, Vec<InstrSeq>),
    ApplyPredicates(Vec<InstrSeq>),

    // Arithmetic / logic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Neg,
    ToEBV,
    Pop,
    // Absolute targets; the conditional jumps leave their operand on the stack.
    JumpIfTrue(usize),
    JumpIfFalse(usize),

    CompareGeneral(ComparisonOp),
    Union,

    // Functions; `site` indexes the per-instance call-site cache.
    CallByName { name: ExpandedName, argc: usize, site: usize },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstrSeq(pub Vec<OpCode>);

/// Immutable program produced by the compiler; shared by every instance of an expression.
#[derive(Debug, Clone)]
pub struct CompiledXPath {
    pub instrs: InstrSeq,
    pub static_ctx: Arc<StaticContext>,
    pub source: String,
    pub call_sites: usize,
}
