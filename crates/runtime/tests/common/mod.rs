#![allow(dead_code)]

use relay_runtime::{Invocation, Message};
use rstest::fixture;
use serde_json::json;

pub const ORDER: &str = r#"<order id="42" xmlns:p="urn:pricing"><a><b>first</b><b>second</b></a><p:total currency="EUR">19.90</p:total><lines>3</lines></order>"#;

/// Routes engine logs to the test output when `RUST_LOG` is set.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// rstest fixture: order document with headers on the input and a reply on the output.
#[fixture]
pub fn order() -> Invocation {
    init_tracing();
    let input = Message::new(ORDER)
        .with_header("orderId", "42")
        .with_header("priority", 7)
        .with_header("express", true)
        .with_header("tags", json!(["red", "blue"]));
    let ack = relay_xpath::xml::parse_document(r#"<ack status="accepted"/>"#).expect("document");
    let output = Message::new(ack).with_header("orderId", "reply-42");
    Invocation::new(input).with_output(output)
}

pub fn text_invocation(body: &str) -> Invocation {
    Invocation::new(Message::new(body))
}
