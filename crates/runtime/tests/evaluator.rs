mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::order;
use relay_runtime::{
    Body, ConversionError, Converted, DocumentError, DocumentProvider, DocumentType, EvaluatorConfig, EvaluatorError,
    FileHandle, Invocation, Message, RawDocument, SimpleNode, StreamResetHook, TargetType, TypeConversionService,
    XPathEvaluator, XPathValue,
};
use relay_xpath::{ErrorCode, XdmNode};
use rstest::rstest;
use serde_json::json;

#[rstest]
fn failed_evaluation_returns_its_instance(order: Invocation) {
    let evaluator = XPathEvaluator::builder("if-missing() or /order/@id = 42").boolean_result().build();

    for _ in 0..3 {
        let err = evaluator.matches(&order).unwrap_err();
        assert_eq!(err.xpath_error().map(|e| e.code), Some(ErrorCode::XPST0017));
    }
    let stats = evaluator.pool_stats();
    assert_eq!((stats.created, stats.idle, stats.checked_out), (1, 1, 0));

    let fallback = XPathEvaluator::builder("count(/order/a/b)").number_result().build();
    fallback.evaluate(&common::text_invocation("<broken")).unwrap_err();
    assert_eq!(fallback.evaluate(&order).unwrap(), Converted::Number(2.0));
    assert_eq!(fallback.pool_stats().created, 1);
}

#[rstest]
fn identical_configuration_gives_identical_results(order: Invocation) {
    let build = || {
        XPathEvaluator::builder("concat(/order/@id, ':', $suffix, ':', /order/p:total)")
            .namespace("p", "urn:pricing")
            .variable("suffix", "x")
            .string_result()
            .build()
    };
    let (first, second) = (build(), build());
    let a = first.evaluate(&order).unwrap();
    assert_eq!(a, second.evaluate(&order).unwrap());
    assert_eq!(a, first.evaluate(&order).unwrap());
    assert_eq!(a, Converted::Text("42:x:19.90".to_string()));
}

#[rstest]
fn builder_clones_are_independent_evaluators(order: Invocation) {
    let builder = XPathEvaluator::builder("string(/order/p:total)").namespace("p", "urn:pricing").string_result();
    let (a, b) = (builder.clone().build(), builder.build());
    assert_eq!(a.evaluate(&order).unwrap(), b.evaluate(&order).unwrap());
    a.shutdown();
    assert!(!b.is_shutdown());
    assert_eq!(b.evaluate(&order).unwrap(), Converted::Text("19.90".to_string()));
}

#[rstest]
fn malformed_expression_is_a_configuration_error(order: Invocation) {
    let evaluator = XPathEvaluator::builder("/order[").build();
    assert!(matches!(evaluator.prepare(), Err(EvaluatorError::Configuration { .. })));
    let err = evaluator.evaluate(&order).unwrap_err();
    assert!(matches!(err, EvaluatorError::Configuration { ref expression, .. } if expression == "/order["));
    assert_eq!(err.xpath_error().map(|e| e.code), Some(ErrorCode::XPST0003));
}

#[rstest]
fn unbound_prefix_is_a_configuration_error(order: Invocation) {
    let evaluator = XPathEvaluator::builder("/q:order").build();
    let err = evaluator.evaluate(&order).unwrap_err();
    assert_eq!(err.xpath_error().map(|e| e.code), Some(ErrorCode::XPST0081));
    assert!(matches!(err, EvaluatorError::Configuration { .. }));
}

#[rstest]
fn malformed_body_is_a_document_error() {
    let evaluator = XPathEvaluator::builder("/a").build();
    let err = evaluator.evaluate(&common::text_invocation("<a><b></a>")).unwrap_err();
    let EvaluatorError::Document { source: DocumentError::Malformed(cause), .. } = &err else {
        panic!("expected a document error, got {err:?}");
    };
    assert_eq!(cause.code, ErrorCode::FODC0006);
    assert!(err.to_string().contains("/a"));
}

#[rstest]
fn overly_nested_body_is_a_document_error() {
    let evaluator = XPathEvaluator::builder("count(/a)").number_result().build();
    let body = format!("{}{}", "<a>".repeat(100_000), "</a>".repeat(100_000));
    let err = evaluator.evaluate(&common::text_invocation(&body)).unwrap_err();
    let EvaluatorError::Document { source: DocumentError::Malformed(cause), .. } = &err else {
        panic!("expected a document error, got {err:?}");
    };
    assert_eq!(cause.code, ErrorCode::FODC0006);

    let shallow = format!("{}{}", "<a>".repeat(64), "</a>".repeat(64));
    assert_eq!(evaluator.evaluate(&common::text_invocation(&shallow)).unwrap(), Converted::Number(1.0));
}

#[rstest]
fn stream_bodies_are_reset_after_extraction() {
    let stream = Body::stream(b"<m><v>5</v></m>".to_vec());
    let Body::Stream(cache) = &stream else { unreachable!() };
    let cache = Arc::clone(cache);
    let invocation = Invocation::new(Message::new(stream));
    let evaluator = XPathEvaluator::builder("number(/m/v)").result_type(TargetType::Integer).build();

    for _ in 0..2 {
        assert_eq!(evaluator.evaluate(&invocation).unwrap(), Converted::Integer(5));
        assert_eq!(cache.position(), 0);
    }
}

#[rstest]
fn stream_can_be_read_as_text() {
    let invocation = Invocation::new(Message::new(Body::stream("<m>été</m>")));
    let evaluator = XPathEvaluator::builder("string-length(/m)").document_type(DocumentType::Text).number_result().build();
    assert_eq!(evaluator.evaluate(&invocation).unwrap(), Converted::Number(3.0));
}

#[derive(Default)]
struct CountingReset(AtomicUsize);

impl StreamResetHook for CountingReset {
    fn reset(&self, _invocation: &Invocation) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[rstest]
fn reset_hook_runs_even_when_parsing_fails() {
    let hook = Arc::new(CountingReset::default());
    let evaluator = XPathEvaluator::builder("/a").stream_reset_hook(hook.clone()).build();

    evaluator.evaluate(&common::text_invocation("<a/>")).unwrap();
    evaluator.evaluate(&common::text_invocation("<a>")).unwrap_err();
    assert_eq!(hook.0.load(Ordering::SeqCst), 2);
}

#[rstest]
fn file_bodies_are_read_from_disk() {
    let path = std::env::temp_dir().join(format!("relay-runtime-file-body-{}.xml", std::process::id()));
    std::fs::write(&path, "<doc><item/><item/></doc>").unwrap();
    let invocation = Invocation::new(Message::new(FileHandle::new(&path)));

    let count = XPathEvaluator::builder("count(/doc/item)").result_type(TargetType::Integer).build();
    assert_eq!(count.evaluate(&invocation).unwrap(), Converted::Integer(2));
    let name = XPathEvaluator::builder("body()").string_result().build();
    assert_eq!(name.evaluate(&invocation).unwrap(), Converted::Text(path.to_string_lossy().into_owned()));

    std::fs::remove_file(&path).unwrap();
    let err = count.evaluate(&invocation).unwrap_err();
    assert!(matches!(err, EvaluatorError::Document { source: DocumentError::Io { .. }, .. }));
}

#[rstest]
fn bytes_bodies_must_be_utf8() {
    let evaluator = XPathEvaluator::builder("/a").build();
    let err = evaluator.evaluate(&Invocation::new(Message::new(vec![b'<', b'a', 0xfe, b'/', b'>']))).unwrap_err();
    let EvaluatorError::Document { source: DocumentError::Malformed(cause), .. } = err else {
        panic!("expected a document error");
    };
    assert_eq!(cause.code, ErrorCode::FODC0002);
}

#[rstest]
#[case(TargetType::Boolean, Converted::Boolean(true))]
#[case(TargetType::Number, Converted::Number(42.0))]
#[case(TargetType::Integer, Converted::Integer(42))]
#[case(TargetType::Text, Converted::Text("42".to_string()))]
fn evaluate_to_infers_the_shape(order: Invocation, #[case] target: TargetType, #[case] expected: Converted) {
    let evaluator = XPathEvaluator::builder("/order/@id").build();
    assert_eq!(evaluator.evaluate_to(&order, target).unwrap(), expected, "{target}");
}

#[rstest]
fn evaluate_typed_returns_rust_values(order: Invocation) {
    let id = XPathEvaluator::builder("/order/@id").build();
    assert_eq!(id.evaluate_typed::<i64>(&order).unwrap(), 42);
    assert_eq!(id.evaluate_typed::<String>(&order).unwrap(), "42");
    assert!((id.evaluate_typed::<f64>(&order).unwrap() - 42.0).abs() < f64::EPSILON);
    assert!(id.evaluate_typed::<bool>(&order).unwrap());

    let lines = XPathEvaluator::builder("/order/a/b").build();
    let nodes = lines.evaluate_typed::<Vec<SimpleNode>>(&order).unwrap();
    assert_eq!(nodes.len(), 2);
    let first = lines.evaluate_typed::<Option<SimpleNode>>(&order).unwrap();
    assert_eq!(first.map(|n| n.string_value()), Some("first".to_string()));
}

#[rstest]
fn conversion_failures(order: Invocation) {
    let text = XPathEvaluator::builder("string(/order/a/b)").build();
    let err = text.evaluate_typed::<i64>(&order).unwrap_err();
    assert!(matches!(err, EvaluatorError::Conversion(ConversionError::InvalidValue { to: TargetType::Integer, .. })));

    let fraction = XPathEvaluator::builder("/order/p:total").namespace("p", "urn:pricing").build();
    assert!(matches!(fraction.evaluate_typed::<i64>(&order), Err(EvaluatorError::Conversion(_))));

    let number = XPathEvaluator::builder("1 + 1").build();
    let err = number.evaluate_typed::<Vec<SimpleNode>>(&order).unwrap_err();
    assert!(matches!(err, EvaluatorError::Evaluation { .. }), "{err}");
}

#[rstest]
fn configured_shape_wins_over_target(order: Invocation) {
    let evaluator = XPathEvaluator::builder("/order/a/b").string_result().build();
    assert_eq!(evaluator.evaluate_to(&order, TargetType::Text).unwrap(), Converted::Text("first".to_string()));
    let err = evaluator.evaluate_to(&order, TargetType::NodeList).unwrap_err();
    assert!(matches!(err, EvaluatorError::Conversion(ConversionError::Unsupported { .. })));
}

#[rstest]
fn result_type_converts_every_evaluation(order: Invocation) {
    let evaluator = XPathEvaluator::builder("/order/lines").result_type(TargetType::Integer).build();
    assert_eq!(evaluator.evaluate(&order).unwrap(), Converted::Integer(3));

    let text = XPathEvaluator::builder("/order/a/b").node_set_result().result_type(TargetType::Text).build();
    assert_eq!(text.evaluate(&order).unwrap(), Converted::Text("firstsecond".to_string()));
}

struct Upper;

impl TypeConversionService for Upper {
    fn convert(&self, value: XPathValue<SimpleNode>, target: TargetType) -> Result<Converted, ConversionError> {
        match (value, target) {
            (XPathValue::Text(s), TargetType::Text) => Ok(Converted::Text(s.to_uppercase())),
            (value, _) => Err(ConversionError::Unsupported { from: value.shape(), to: target }),
        }
    }
}

#[rstest]
fn custom_type_converter(order: Invocation) {
    let evaluator = XPathEvaluator::builder("string(/order/a/b)").type_converter(Arc::new(Upper)).build();
    assert_eq!(evaluator.evaluate_typed::<String>(&order).unwrap(), "FIRST");
    assert!(evaluator.evaluate_typed::<i64>(&order).is_err());
}

/// Reads the document from a header instead of the body.
struct HeaderDocument;

impl DocumentProvider for HeaderDocument {
    fn extract(&self, invocation: &Invocation, _hint: Option<DocumentType>) -> Result<RawDocument, DocumentError> {
        Ok(match invocation.input().header("payload") {
            Some(serde_json::Value::String(xml)) => RawDocument::Text(xml.clone()),
            _ => RawDocument::Empty,
        })
    }

    fn file_bytes(&self, file: &FileHandle) -> Result<Vec<u8>, DocumentError> {
        Err(DocumentError::Io {
            path: file.path().to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::Unsupported, "files are not supported"),
        })
    }
}

#[rstest]
fn custom_document_provider() {
    let evaluator = XPathEvaluator::builder("/h/@v = 'yes'").boolean_result().document_provider(Arc::new(HeaderDocument)).build();
    let invocation = Invocation::new(Message::new("<ignored/>").with_header("payload", r#"<h v="yes"/>"#));
    assert!(evaluator.matches(&invocation).unwrap());
    assert!(!evaluator.matches(&common::text_invocation("<h v=\"yes\"/>")).unwrap());
}

#[rstest]
fn evaluators_from_configuration(order: Invocation) {
    let config: EvaluatorConfig = serde_json::from_value(json!({
        "expression": "/order/p:total > $min and header('orderId') = '42'",
        "result-shape": "boolean",
        "namespaces": { "p": "urn:pricing" },
        "variables": { "min": 10 },
        "max-idle": 1
    }))
    .unwrap();
    let evaluator = config.build();
    assert!(evaluator.matches(&order).unwrap());
    assert_eq!(evaluator.evaluate(&order).unwrap(), Converted::Boolean(true));
    assert_eq!(evaluator.to_string(), "XPath: /order/p:total > $min and header('orderId') = '42'");
}
