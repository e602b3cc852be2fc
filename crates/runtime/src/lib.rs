//! Concurrency-safe XPath evaluation over message payloads.
//!
//! An [`XPathEvaluator`] is built once per expression and shared between worker threads.
//! Each call extracts the document from an [`Invocation`], checks a compiled expression out
//! of an [`ExpressionPool`], publishes the invocation as the thread's [`ExecutionContext`]
//! so `body()`, `header(name)`, `out:body()` and `out:header(name)` can read it, and
//! shapes the result.
//!
//! ```
//! use relay_runtime::{Invocation, Message, XPathEvaluator};
//!
//! let evaluator = XPathEvaluator::builder("/order/@id = header('orderId')").boolean_result().build();
//! let invocation = Invocation::new(Message::new(r#"<order id="42"/>"#).with_header("orderId", "42"));
//! assert!(evaluator.matches(&invocation).unwrap());
//! ```
pub mod config;
pub mod context;
pub mod convert;
pub mod document;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod message;
pub mod pool;
pub mod variables;

pub use config::{EvaluatorConfig, ShapeSetting};
pub use context::{ContextGuard, ExecutionContext};
pub use convert::{ConversionError, Converted, DefaultTypeConverter, FromConverted, TargetType, TypeConversionService};
pub use document::{
    DefaultDocumentProvider, DocumentError, DocumentProvider, DocumentType, InputSource, RawDocument,
    ResetStreamCache, StreamResetHook,
};
pub use error::EvaluatorError;
pub use evaluator::{XPathEvaluator, XPathEvaluatorBuilder};
pub use functions::{ENV_NAMESPACE, FunctionBridge, FunctionGroup, IN_NAMESPACE, OUT_NAMESPACE};
pub use message::{Body, FileHandle, Invocation, Message, StreamCache, json_to_sequence};
pub use pool::{ExpressionPool, PoolStats, PooledExpression};
pub use relay_xpath::{ResultShape, SimpleNode, XPathValue};
pub use variables::{MessageVariableResolver, VariableBinding};
