use relay_xpath::parser::XPathParser;
use relay_xpath::parser::ast::{
    Axis, BinaryOp, Expr, GeneralComp, KindTest, Literal, NameTest, NodeTest, PathStart, QName, WildcardName,
};
use relay_xpath::ErrorCode;
use rstest::rstest;

fn parse(src: &str) -> Expr {
    XPathParser::parse_to_ast(src).expect("parse")
}

fn path(expr: Expr) -> (PathStart, Vec<relay_xpath::parser::ast::Step>) {
    match expr {
        Expr::Path(p) => (p.start, p.steps),
        other => panic!("expected path, got {other:?}"),
    }
}

#[rstest]
#[case("42", Literal::Integer(42))]
#[case("4.5", Literal::Double(4.5))]
#[case(".5", Literal::Double(0.5))]
#[case("'it''s'", Literal::String("it's".into()))]
#[case("\"say \"\"hi\"\"\"", Literal::String("say \"hi\"".into()))]
#[case("''", Literal::String(String::new()))]
fn literals(#[case] src: &str, #[case] expected: Literal) {
    assert_eq!(parse(src), Expr::Literal(expected));
}

#[rstest]
fn abbreviated_steps_expand_to_axes() {
    let (start, steps) = path(parse("/a//b/@id/../."));
    assert_eq!(start, PathStart::Root);
    let axes: Vec<Axis> = steps.iter().map(|s| s.axis).collect();
    assert_eq!(
        axes,
        vec![Axis::Child, Axis::DescendantOrSelf, Axis::Child, Axis::Attribute, Axis::Parent, Axis::SelfAxis]
    );
}

#[rstest]
#[case("ancestor-or-self::x", Axis::AncestorOrSelf)]
#[case("ancestor::x", Axis::Ancestor)]
#[case("following-sibling::x", Axis::FollowingSibling)]
#[case("preceding::x", Axis::Preceding)]
#[case("descendant::x", Axis::Descendant)]
#[case("self::x", Axis::SelfAxis)]
#[case("attribute::x", Axis::Attribute)]
fn explicit_axes(#[case] src: &str, #[case] axis: Axis) {
    let (start, steps) = path(parse(src));
    assert_eq!(start, PathStart::Relative);
    assert_eq!(steps[0].axis, axis);
}

#[rstest]
#[case("node()", NodeTest::Kind(KindTest::AnyKind))]
#[case("text()", NodeTest::Kind(KindTest::Text))]
#[case("comment()", NodeTest::Kind(KindTest::Comment))]
#[case("processing-instruction()", NodeTest::Kind(KindTest::ProcessingInstruction(None)))]
#[case("processing-instruction('xml-stylesheet')", NodeTest::Kind(KindTest::ProcessingInstruction(Some("xml-stylesheet".into()))))]
#[case("*", NodeTest::Name(NameTest::Wildcard(WildcardName::Any)))]
#[case("p:*", NodeTest::Name(NameTest::Wildcard(WildcardName::NsWildcard("p".into()))))]
#[case("p:item", NodeTest::Name(NameTest::QName(QName { prefix: Some("p".into()), local: "item".into() })))]
fn node_tests(#[case] src: &str, #[case] expected: NodeTest) {
    let (_, steps) = path(parse(src));
    assert_eq!(steps[0].test, expected);
}

#[rstest]
fn keywords_are_valid_element_names() {
    let (_, steps) = path(parse("div/mod"));
    assert_eq!(steps.len(), 2);
    assert!(matches!(parse("div div mod"), Expr::Binary { op: BinaryOp::Div, .. }));
}

#[rstest]
fn operator_precedence() {
    let Expr::Binary { op: BinaryOp::Or, left, right } = parse("1 + 2 * 3 = 7 or false()") else {
        panic!("expected or at the top");
    };
    assert!(matches!(*right, Expr::FunctionCall { .. }));
    let Expr::GeneralComparison { op: GeneralComp::Eq, left: sum, .. } = *left else {
        panic!("expected comparison");
    };
    let Expr::Binary { op: BinaryOp::Add, right: product, .. } = *sum else {
        panic!("expected addition");
    };
    assert!(matches!(*product, Expr::Binary { op: BinaryOp::Mul, .. }));
}

#[rstest]
fn repeated_minus_nests_negations() {
    let Expr::Negate(inner) = parse("--3") else { panic!("expected negation") };
    assert!(matches!(*inner, Expr::Negate(_)));
}

#[rstest]
fn filter_expression_with_path_continuation() {
    let Expr::PathFrom { base, steps } = parse("$items[1]//name") else {
        panic!("expected path from filter");
    };
    assert!(matches!(*base, Expr::Filter { ref predicates, .. } if predicates.len() == 1));
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].axis, Axis::DescendantOrSelf);
}

#[rstest]
fn prefixed_function_and_variable_names() {
    let Expr::FunctionCall { name, args } = parse("out:header($in:key)") else {
        panic!("expected call");
    };
    assert_eq!(name, QName { prefix: Some("out".into()), local: "header".into() });
    assert_eq!(args, vec![Expr::VarRef(QName { prefix: Some("in".into()), local: "key".into() })]);
}

#[rstest]
fn union_is_left_nested() {
    let Expr::Union(left, _) = parse("a | b | c") else { panic!("expected union") };
    assert!(matches!(*left, Expr::Union(_, _)));
}

#[rstest]
#[case("")]
#[case("a[")]
#[case("1 +")]
#[case("a/")]
#[case("'unterminated")]
#[case("f(,)")]
#[case("a ! b")]
fn syntax_errors(#[case] src: &str) {
    let err = XPathParser::parse_to_ast(src).unwrap_err();
    assert_eq!(err.code, ErrorCode::XPST0003, "{src}");
    assert!(err.is_static());
}
