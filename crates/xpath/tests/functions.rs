use relay_xpath::{ErrorCode, ResultShape, SimpleNode, XPathCompiler, XPathValue, XdmItem, xml};
use rstest::{fixture, rstest};

#[fixture]
fn order() -> SimpleNode {
    xml::parse_document(
        r#"<o:order xmlns:o="urn:orders" id="A-17"><o:line qty="2">  Blue   widget </o:line><o:line qty="5">Bolt</o:line><?trace on?></o:order>"#,
    )
    .expect("document")
}

fn text(doc: &SimpleNode, src: &str) -> String {
    let compiler = XPathCompiler::<SimpleNode>::new()
        .with_static_context(relay_xpath::StaticContextBuilder::new().with_namespace("o", "urn:orders").build());
    match compiler.compile(src).expect("compile").evaluate_as(Some(XdmItem::Node(doc.clone())), ResultShape::Text) {
        Ok(XPathValue::Text(s)) => s,
        other => panic!("{src}: {other:?}"),
    }
}

#[rstest]
#[case("concat('a', 'b', 'c', 1)", "abc1")]
#[case("contains('widget', 'dg')", "true")]
#[case("starts-with('widget', 'wi')", "true")]
#[case("ends-with('widget', 'et')", "true")]
#[case("substring('12345', 2, 3)", "234")]
#[case("substring('12345', 1.5, 2.6)", "234")]
#[case("substring('12345', 0, 3)", "12")]
#[case("substring('12345', 0 div 0, 3)", "")]
#[case("substring('12345', -42, 1 div 0)", "12345")]
#[case("substring('12345', 3)", "345")]
#[case("substring-before('1999/04/01', '/')", "1999")]
#[case("substring-after('1999/04/01', '/')", "04/01")]
#[case("substring-after('abc', '')", "abc")]
#[case("substring-before('abc', '')", "")]
#[case("string-length('grüße')", "5")]
#[case("normalize-space('  a \t b\n ')", "a b")]
#[case("translate('bar', 'abc', 'ABC')", "BAr")]
#[case("translate('--aaa--', 'a-', 'A')", "AAA")]
#[case("upper-case('abc')", "ABC")]
#[case("lower-case('ÄB')", "äb")]
#[case("string(1 div 0)", "Infinity")]
#[case("not(0)", "true")]
#[case("boolean('')", "false")]
#[case("floor(2.7)", "2")]
#[case("ceiling(-2.5)", "-2")]
#[case("round(2.5)", "3")]
#[case("round(-2.5)", "-2")]
#[case("round(7)", "7")]
#[case("number('  3.25 ')", "3.25")]
#[case("number('1e3')", "NaN")]
fn string_and_number_functions(order: SimpleNode, #[case] src: &str, #[case] expected: &str) {
    assert_eq!(text(&order, src), expected, "{src}");
}

#[rstest]
#[case("count(/o:order/o:line)", "2")]
#[case("sum(/o:order/o:line/@qty)", "7")]
#[case("string(/o:order/@id)", "A-17")]
#[case("normalize-space(/o:order/o:line[1])", "Blue widget")]
#[case("string-length(/o:order/o:line[2])", "4")]
#[case("name(/o:order)", "o:order")]
#[case("local-name(/o:order)", "order")]
#[case("namespace-uri(/o:order)", "urn:orders")]
#[case("namespace-uri(/o:order/@id)", "")]
#[case("name(/o:order/processing-instruction())", "trace")]
#[case("name(/o:order/o:missing)", "")]
#[case("local-name(/)", "")]
#[case("/o:order/o:line[last()]/@qty", "5")]
#[case("/o:order/o:line[position() = 1]/@qty", "2")]
#[case("string(/o:order/o:line[2]/@qty * 2)", "10")]
fn node_functions(order: SimpleNode, #[case] src: &str, #[case] expected: &str) {
    assert_eq!(text(&order, src), expected, "{src}");
}

#[rstest]
fn context_forms_use_the_context_node(order: SimpleNode) {
    assert_eq!(text(&order, "/o:order/o:line[string-length() = 4]/@qty"), "5");
    assert_eq!(text(&order, "/o:order/o:line[normalize-space() = 'Bolt']/@qty"), "5");
    assert_eq!(text(&order, "/o:order/*[local-name() = 'line'][1]/@qty"), "2");
    assert_eq!(text(&order, "/o:order/@id[string() = 'A-17']"), "A-17");
}

#[rstest]
fn context_forms_without_context_fail() {
    let mut expr = XPathCompiler::<SimpleNode>::new().compile("string-length()").unwrap();
    assert_eq!(expr.evaluate(None).unwrap_err().code, ErrorCode::XPDY0002);
}

#[rstest]
#[case("no-such-function()")]
#[case("concat('a')")]
#[case("count()")]
#[case("substring('a', 1, 2, 3)")]
#[case("true(1)")]
#[case("o:count(.)")]
fn unknown_functions_and_wrong_arity(order: SimpleNode, #[case] src: &str) {
    let compiler = XPathCompiler::<SimpleNode>::new()
        .with_static_context(relay_xpath::StaticContextBuilder::new().with_namespace("o", "urn:orders").build());
    let mut expr = compiler.compile(src).expect("resolution is deferred to evaluation");
    let err = expr.evaluate(Some(XdmItem::Node(order))).unwrap_err();
    assert_eq!(err.code, ErrorCode::XPST0017, "{src}");
    assert!(err.is_static());
}

#[rstest]
fn name_functions_reject_atomic_arguments() {
    let mut expr = XPathCompiler::<SimpleNode>::new().compile("local-name(1)").unwrap();
    assert_eq!(expr.evaluate(None).unwrap_err().code, ErrorCode::XPTY0004);
}
