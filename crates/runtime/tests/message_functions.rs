mod common;

use common::order;
use relay_runtime::{Body, Converted, Invocation, Message, TargetType, XPathEvaluator, XPathValue};
use relay_xpath::ResultShape;
use rstest::rstest;
use serde_json::json;

fn text(evaluator: &XPathEvaluator, invocation: &Invocation) -> String {
    match evaluator.evaluate_as(invocation, ResultShape::Text).expect("evaluate") {
        XPathValue::Text(s) => s,
        other => panic!("expected text, got {other:?}"),
    }
}

#[rstest]
fn default_shape_is_a_node_set() {
    let evaluator = XPathEvaluator::builder("a/b").build();
    let invocation = common::text_invocation("<a><b>1</b><b>2</b></a>");

    let Converted::NodeList(nodes) = evaluator.evaluate(&invocation).unwrap() else {
        panic!("expected nodes");
    };
    let values: Vec<String> = nodes.iter().map(relay_xpath::XdmNode::string_value).collect();
    assert_eq!(values, vec!["1", "2"]);
}

#[rstest]
#[case("<a><b>1</b></a>", true)]
#[case("<a><b>2</b></a>", false)]
#[case("<a/>", false)]
fn boolean_predicates(#[case] body: &str, #[case] expected: bool) {
    let evaluator = XPathEvaluator::builder("a/b = '1'").boolean_result().build();
    assert_eq!(evaluator.matches(&common::text_invocation(body)).unwrap(), expected);
    assert_eq!(evaluator.evaluate(&common::text_invocation(body)).unwrap(), Converted::Boolean(expected));
}

#[rstest]
#[case("header('orderId')", "42")]
#[case("in:header('orderId')", "42")]
#[case("out:header('orderId')", "reply-42")]
#[case("header('missing')", "")]
#[case("out:header('missing')", "")]
#[case("header('')", "")]
#[case("string(header('priority') * 2)", "14")]
#[case("string(header('express'))", "true")]
#[case("string(count(header('tags')))", "2")]
#[case("header('tags')[2]", "blue")]
#[case("string(out:body()/ack/@status)", "accepted")]
#[case("$in:orderId", "42")]
#[case("$out:orderId", "reply-42")]
#[case("string(count($in:missing))", "0")]
fn header_and_body_functions(order: Invocation, #[case] src: &str, #[case] expected: &str) {
    let evaluator = XPathEvaluator::builder(src).string_result().build();
    assert_eq!(text(&evaluator, &order), expected, "{src}");
}

#[rstest]
fn missing_header_is_empty_not_an_error(order: Invocation) {
    let evaluator = XPathEvaluator::builder("header('missing')").build();
    assert_eq!(evaluator.evaluate(&order).unwrap(), Converted::NodeList(Vec::new()));

    let exists = XPathEvaluator::builder("boolean(header('missing'))").boolean_result().build();
    assert!(!exists.matches(&order).unwrap());
}

#[rstest]
fn output_functions_without_output_are_empty() {
    let invocation = Invocation::new(Message::new("<a/>").with_header("orderId", "1"));
    let evaluator = XPathEvaluator::builder("count(out:body()) + count(out:header('orderId'))").number_result().build();
    assert_eq!(evaluator.evaluate(&invocation).unwrap(), Converted::Number(0.0));
}

#[rstest]
fn body_of_text_message_is_its_text(order: Invocation) {
    let evaluator = XPathEvaluator::builder("starts-with(body(), '<order')").boolean_result().build();
    assert!(evaluator.matches(&order).unwrap());

    let nodes = XPathEvaluator::builder("count(/order/a/b)").result_type(TargetType::Integer).build();
    assert_eq!(nodes.evaluate(&order).unwrap(), Converted::Integer(2));
}

#[rstest]
fn body_of_empty_message_is_empty() {
    let evaluator = XPathEvaluator::builder("count(body()) = 0 and count(/*) = 0").boolean_result().build();
    assert!(evaluator.matches(&Invocation::new(Message::new(Body::Empty))).unwrap());
}

#[rstest]
fn namespaced_documents(order: Invocation) {
    let evaluator = XPathEvaluator::builder("/order/p:total/@currency").namespace("p", "urn:pricing").string_result().build();
    assert_eq!(text(&evaluator, &order), "EUR");

    let total = XPathEvaluator::builder("/order/p:total")
        .namespaces([("p", "urn:pricing")])
        .result_type(TargetType::Number)
        .build();
    assert_eq!(total.evaluate(&order).unwrap(), Converted::Number(19.9));
}

#[rstest]
fn in_prefix_can_be_rebound(order: Invocation) {
    let evaluator = XPathEvaluator::builder("count(/order/in:total)").namespace("in", "urn:pricing").number_result().build();
    assert_eq!(evaluator.evaluate(&order).unwrap(), Converted::Number(1.0));
}

#[rstest]
fn bound_variables(order: Invocation) {
    let evaluator = XPathEvaluator::builder("/order/lines > $limit and $label = 'rush' and $in:orderId = $expected")
        .variable("limit", 2)
        .variable("label", "rush")
        .variable("expected", json!(42))
        .boolean_result()
        .build();
    assert!(evaluator.matches(&order).unwrap());
}

#[rstest]
fn bindings_shadow_header_variables(order: Invocation) {
    let evaluator = XPathEvaluator::builder("$in:orderId")
        .variable_ns(relay_runtime::IN_NAMESPACE, "orderId", "bound")
        .string_result()
        .build();
    assert_eq!(text(&evaluator, &order), "bound");
}

#[rstest]
fn environment_variables(order: Invocation) {
    let evaluator = XPathEvaluator::builder("$env:CARGO_PKG_NAME").string_result().build();
    assert_eq!(text(&evaluator, &order), env!("CARGO_PKG_NAME"));

    let missing = XPathEvaluator::builder("count($env:RELAY_SURELY_UNSET_VARIABLE)").number_result().build();
    assert_eq!(missing.evaluate(&order).unwrap(), Converted::Number(0.0));
}

#[rstest]
fn undeclared_variable_is_an_evaluation_error(order: Invocation) {
    let evaluator = XPathEvaluator::builder("$nope").build();
    let err = evaluator.evaluate(&order).unwrap_err();
    assert_eq!(err.xpath_error().map(|e| e.code), Some(relay_xpath::ErrorCode::XPST0008));
}
