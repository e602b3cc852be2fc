use pest::Parser;
use pest::iterators::Pair;

use crate::runtime::{Error, ErrorCode};

pub mod ast;

#[derive(pest_derive::Parser)]
#[grammar = "xpath.pest"]
pub struct XPathParser;

fn malformed(pair: &Pair<'_, Rule>) -> Error {
    Error::from_code(
        ErrorCode::XPST0003,
        format!("unexpected {:?} at offset {}: '{}'", pair.as_rule(), pair.as_span().start(), pair.as_str()),
    )
}

fn missing(what: &str) -> Error {
    Error::from_code(ErrorCode::XPST0003, format!("incomplete expression: expected {what}"))
}

impl XPathParser {
    /// Parses `input` into the AST consumed by the compiler. Syntax errors are `err:XPST0003`.
    pub fn parse_to_ast(input: &str) -> Result<ast::Expr, Error> {
        let mut pairs = Self::parse(Rule::xpath, input).map_err(|e| {
            Error::from_code(ErrorCode::XPST0003, format!("syntax error in '{input}'")).with_source(e)
        })?;
        let root = pairs.next().ok_or_else(|| missing("expression"))?;
        let expr = root.into_inner().next().ok_or_else(|| missing("expression"))?;
        Self::build_expr(expr)
    }

    fn build_expr(pair: Pair<'_, Rule>) -> Result<ast::Expr, Error> {
        match pair.as_rule() {
            Rule::expr | Rule::parenthesized => {
                let inner = pair.into_inner().next().ok_or_else(|| missing("expression"))?;
                Self::build_expr(inner)
            }
            Rule::or_expr | Rule::and_expr | Rule::additive_expr | Rule::multiplicative_expr => {
                Self::build_binary_chain(pair)
            }
            Rule::equality_expr | Rule::relational_expr => Self::build_comparison_chain(pair),
            Rule::unary_expr => Self::build_unary(pair),
            Rule::union_expr => {
                let mut inner = pair.into_inner();
                let first = inner.next().ok_or_else(|| missing("path"))?;
                let mut expr = Self::build_expr(first)?;
                while let Some(op) = inner.next() {
                    debug_assert_eq!(op.as_rule(), Rule::OP_PIPE);
                    let right = inner.next().ok_or_else(|| missing("path after '|'"))?;
                    expr = ast::Expr::Union(Box::new(expr), Box::new(Self::build_expr(right)?));
                }
                Ok(expr)
            }
            Rule::path_expr => {
                let inner = pair.into_inner().next().ok_or_else(|| missing("path"))?;
                Self::build_expr(inner)
            }
            Rule::absolute_path => Self::build_absolute_path(pair),
            Rule::relative_path => {
                Ok(ast::Expr::Path(ast::PathExpr { start: ast::PathStart::Relative, steps: Self::build_steps(pair)? }))
            }
            Rule::filter_path => Self::build_filter_path(pair),
            Rule::filter_expr => Self::build_filter_expr(pair),
            Rule::primary_expr => {
                let inner = pair.into_inner().next().ok_or_else(|| missing("primary expression"))?;
                Self::build_expr(inner)
            }
            Rule::string_literal => Ok(ast::Expr::Literal(ast::Literal::String(string_literal_value(&pair)))),
            Rule::number_literal => number_literal(&pair),
            Rule::var_ref => {
                let name = pair.into_inner().next().ok_or_else(|| missing("variable name"))?;
                Ok(ast::Expr::VarRef(ast_qname_from_str(name.as_str())))
            }
            Rule::function_call => {
                let mut inner = pair.into_inner();
                let name = inner.next().ok_or_else(|| missing("function name"))?;
                let args = inner.map(Self::build_expr).collect::<Result<Vec<_>, _>>()?;
                Ok(ast::Expr::FunctionCall { name: ast_qname_from_str(name.as_str()), args })
            }
            _ => Err(malformed(&pair)),
        }
    }

    /// Left-associative chain `operand (op operand)*` for logical and arithmetic operators.
    fn build_binary_chain(pair: Pair<'_, Rule>) -> Result<ast::Expr, Error> {
        let mut inner = pair.into_inner();
        let first = inner.next().ok_or_else(|| missing("operand"))?;
        let mut expr = Self::build_expr(first)?;
        while let Some(op) = inner.next() {
            let op = match op.as_rule() {
                Rule::K_OR => ast::BinaryOp::Or,
                Rule::K_AND => ast::BinaryOp::And,
                Rule::OP_PLUS => ast::BinaryOp::Add,
                Rule::OP_MINUS => ast::BinaryOp::Sub,
                Rule::OP_STAR => ast::BinaryOp::Mul,
                Rule::K_DIV => ast::BinaryOp::Div,
                Rule::K_MOD => ast::BinaryOp::Mod,
                _ => return Err(malformed(&op)),
            };
            let right = inner.next().ok_or_else(|| missing("right operand"))?;
            expr = ast::Expr::Binary { left: Box::new(expr), op, right: Box::new(Self::build_expr(right)?) };
        }
        Ok(expr)
    }

    fn build_comparison_chain(pair: Pair<'_, Rule>) -> Result<ast::Expr, Error> {
        let mut inner = pair.into_inner();
        let first = inner.next().ok_or_else(|| missing("operand"))?;
        let mut expr = Self::build_expr(first)?;
        while let Some(op) = inner.next() {
            let op = match op.as_rule() {
                Rule::OP_EQ => ast::GeneralComp::Eq,
                Rule::OP_NE => ast::GeneralComp::Ne,
                Rule::OP_LT => ast::GeneralComp::Lt,
                Rule::OP_LTE => ast::GeneralComp::Le,
                Rule::OP_GT => ast::GeneralComp::Gt,
                Rule::OP_GTE => ast::GeneralComp::Ge,
                _ => return Err(malformed(&op)),
            };
            let right = inner.next().ok_or_else(|| missing("right operand"))?;
            expr = ast::Expr::GeneralComparison { left: Box::new(expr), op, right: Box::new(Self::build_expr(right)?) };
        }
        Ok(expr)
    }

    fn build_unary(pair: Pair<'_, Rule>) -> Result<ast::Expr, Error> {
        let mut negations = 0usize;
        let mut operand = None;
        for p in pair.into_inner() {
            match p.as_rule() {
                Rule::OP_MINUS => negations += 1,
                _ => operand = Some(Self::build_expr(p)?),
            }
        }
        let mut expr = operand.ok_or_else(|| missing("operand after '-'"))?;
        // An even number of minus signs still converts the operand to a number.
        for _ in 0..negations {
            expr = ast::Expr::Negate(Box::new(expr));
        }
        Ok(expr)
    }

    fn build_absolute_path(pair: Pair<'_, Rule>) -> Result<ast::Expr, Error> {
        let mut inner = pair.into_inner();
        let lead = inner.next().ok_or_else(|| missing("'/'"))?;
        let mut steps = Vec::new();
        if lead.as_rule() == Rule::OP_DSLASH {
            steps.push(ast::Step::descendant_or_self());
        }
        if let Some(rel) = inner.next() {
            steps.extend(Self::build_steps(rel)?);
        }
        Ok(ast::Expr::Path(ast::PathExpr { start: ast::PathStart::Root, steps }))
    }

    fn build_filter_path(pair: Pair<'_, Rule>) -> Result<ast::Expr, Error> {
        let mut inner = pair.into_inner();
        let filter = inner.next().ok_or_else(|| missing("filter expression"))?;
        let base = Self::build_expr(filter)?;
        let Some(sep) = inner.next() else {
            return Ok(base);
        };
        let mut steps = Vec::new();
        if sep.as_rule() == Rule::OP_DSLASH {
            steps.push(ast::Step::descendant_or_self());
        }
        let rel = inner.next().ok_or_else(|| missing("step after '/'"))?;
        steps.extend(Self::build_steps(rel)?);
        Ok(ast::Expr::PathFrom { base: Box::new(base), steps })
    }

    fn build_filter_expr(pair: Pair<'_, Rule>) -> Result<ast::Expr, Error> {
        let mut inner = pair.into_inner();
        let primary = inner.next().ok_or_else(|| missing("primary expression"))?;
        let input = Self::build_expr(primary)?;
        let predicates = inner.map(Self::build_predicate).collect::<Result<Vec<_>, _>>()?;
        if predicates.is_empty() {
            Ok(input)
        } else {
            Ok(ast::Expr::Filter { input: Box::new(input), predicates })
        }
    }

    fn build_predicate(pair: Pair<'_, Rule>) -> Result<ast::Expr, Error> {
        if pair.as_rule() != Rule::predicate {
            return Err(malformed(&pair));
        }
        let inner = pair.into_inner().next().ok_or_else(|| missing("predicate expression"))?;
        Self::build_expr(inner)
    }

    fn build_steps(pair: Pair<'_, Rule>) -> Result<Vec<ast::Step>, Error> {
        let mut steps = Vec::new();
        for p in pair.into_inner() {
            match p.as_rule() {
                Rule::step => steps.push(Self::build_step(p)?),
                Rule::OP_DSLASH => steps.push(ast::Step::descendant_or_self()),
                Rule::OP_SLASH => {}
                _ => return Err(malformed(&p)),
            }
        }
        Ok(steps)
    }

    fn build_step(pair: Pair<'_, Rule>) -> Result<ast::Step, Error> {
        let inner = pair.into_inner().next().ok_or_else(|| missing("step"))?;
        match inner.as_rule() {
            Rule::abbrev_step => {
                let token = first_token_rule(&inner);
                let axis = if token == Rule::OP_DOTDOT { ast::Axis::Parent } else { ast::Axis::SelfAxis };
                Ok(ast::Step { axis, test: ast::NodeTest::Kind(ast::KindTest::AnyKind), predicates: vec![] })
            }
            Rule::axis_step => {
                let mut axis = ast::Axis::Child;
                let mut test = None;
                let mut predicates = Vec::new();
                for p in inner.into_inner() {
                    match p.as_rule() {
                        Rule::axis_specifier => axis = axis_from_rule(first_token_rule(&p)),
                        Rule::node_test => test = Some(Self::build_node_test(p)?),
                        Rule::predicate => predicates.push(Self::build_predicate(p)?),
                        _ => return Err(malformed(&p)),
                    }
                }
                let test = test.ok_or_else(|| missing("node test"))?;
                Ok(ast::Step { axis, test, predicates })
            }
            _ => Err(malformed(&inner)),
        }
    }

    fn build_node_test(pair: Pair<'_, Rule>) -> Result<ast::NodeTest, Error> {
        let inner = pair.into_inner().next().ok_or_else(|| missing("node test"))?;
        match inner.as_rule() {
            Rule::kind_test => {
                let kind = inner.into_inner().next().ok_or_else(|| missing("kind test"))?;
                let test = match kind.as_rule() {
                    Rule::any_kind_test => ast::KindTest::AnyKind,
                    Rule::text_test => ast::KindTest::Text,
                    Rule::comment_test => ast::KindTest::Comment,
                    Rule::pi_test => ast::KindTest::ProcessingInstruction(
                        find_rule(&kind, Rule::string_literal).map(|lit| string_literal_value(&lit)),
                    ),
                    _ => return Err(malformed(&kind)),
                };
                Ok(ast::NodeTest::Kind(test))
            }
            Rule::name_test => {
                let name = inner.into_inner().next().ok_or_else(|| missing("name test"))?;
                let test = match name.as_rule() {
                    Rule::wildcard_name => match name.as_str().strip_suffix(":*") {
                        Some(prefix) => ast::NameTest::Wildcard(ast::WildcardName::NsWildcard(prefix.to_string())),
                        None => ast::NameTest::Wildcard(ast::WildcardName::Any),
                    },
                    Rule::qname => ast::NameTest::QName(ast_qname_from_str(name.as_str())),
                    _ => return Err(malformed(&name)),
                };
                Ok(ast::NodeTest::Name(test))
            }
            _ => Err(malformed(&inner)),
        }
    }
}

/// Walks down a pair to the first terminal token rule (e.g. `OP_DOT`, `K_CHILD`).
fn first_token_rule(pair: &Pair<'_, Rule>) -> Rule {
    let mut current = pair.clone();
    while let Some(next) = current.clone().into_inner().next() {
        current = next;
    }
    current.as_rule()
}

fn find_rule<'i>(pair: &Pair<'i, Rule>, rule: Rule) -> Option<Pair<'i, Rule>> {
    pair.clone().into_inner().flatten().find(|p| p.as_rule() == rule)
}

fn axis_from_rule(rule: Rule) -> ast::Axis {
    match rule {
        Rule::K_ANCESTOR => ast::Axis::Ancestor,
        Rule::K_ANCESTOR_OR_SELF => ast::Axis::AncestorOrSelf,
        Rule::K_ATTRIBUTE | Rule::OP_AT => ast::Axis::Attribute,
        Rule::K_DESCENDANT => ast::Axis::Descendant,
        Rule::K_DESCENDANT_OR_SELF => ast::Axis::DescendantOrSelf,
        Rule::K_FOLLOWING => ast::Axis::Following,
        Rule::K_FOLLOWING_SIBLING => ast::Axis::FollowingSibling,
        Rule::K_PARENT => ast::Axis::Parent,
        Rule::K_PRECEDING => ast::Axis::Preceding,
        Rule::K_PRECEDING_SIBLING => ast::Axis::PrecedingSibling,
        Rule::K_SELF => ast::Axis::SelfAxis,
        _ => ast::Axis::Child,
    }
}

fn string_literal_value(pair: &Pair<'_, Rule>) -> String {
    match pair.clone().into_inner().next() {
        Some(content) => match content.as_rule() {
            Rule::dbl_string_inner => content.as_str().replace("\"\"", "\""),
            Rule::sgl_string_inner => content.as_str().replace("''", "'"),
            _ => content.as_str().to_string(),
        },
        None => String::new(),
    }
}

fn number_literal(pair: &Pair<'_, Rule>) -> Result<ast::Expr, Error> {
    let text = pair.as_str();
    if !text.contains('.')
        && let Ok(v) = text.parse::<i64>()
    {
        return Ok(ast::Expr::Literal(ast::Literal::Integer(v)));
    }
    text.parse::<f64>()
        .map(|v| ast::Expr::Literal(ast::Literal::Double(v)))
        .map_err(|e| Error::from_code(ErrorCode::XPST0003, format!("invalid number literal '{text}'")).with_source(e))
}

pub(crate) fn ast_qname_from_str(s: &str) -> ast::QName {
    match s.split_once(':') {
        Some((prefix, local)) => ast::QName { prefix: Some(prefix.to_string()), local: local.to_string() },
        None => ast::QName { prefix: None, local: s.to_string() },
    }
}
