//! A compact XPath 1.0 engine: pest grammar, AST, stack-machine IR and evaluator over any
//! tree implementing [`XdmNode`].
//!
//! Compilation is separated from execution. [`XPathCompiler`] carries the configuration
//! (namespace bindings, function and variable resolvers) and produces [`XPathExpression`]
//! instances. An instance is stateful and evaluates through `&mut self`.
//!
//! ```
//! use relay_xpath::{ResultShape, SimpleNode, XPathCompiler, XPathValue, XdmItem, xml};
//!
//! let document = xml::parse_document("<a><b>1</b><b>2</b></a>").unwrap();
//! let mut expr = XPathCompiler::<SimpleNode>::new().compile("count(a/b)").unwrap();
//! let value = expr.evaluate_as(Some(XdmItem::Node(document)), ResultShape::Number).unwrap();
//! assert_eq!(value, XPathValue::Number(2.0));
//! ```
pub mod compiler;
pub mod evaluator;
pub mod functions;
pub mod model;
pub mod parser;
pub mod runtime;
pub mod simple_node;
pub mod xdm;
pub mod xml;

pub use compiler::{compile_xpath, compile_xpath_with_context};
pub use evaluator::{XPathCompiler, XPathExpression};
pub use model::{NodeKind, QName, XdmNode};
pub use parser::XPathParser;
pub use runtime::{
    CallCtx, Error, ErrorCode, ErrorKind, FunctionImpl, FunctionRegistry, FunctionResolver, StaticContext,
    StaticContextBuilder, VariableResolver,
};
pub use simple_node::{SimpleNode, SimpleNodeBuilder, attr, comment, doc, elem, ns, text};
pub use xdm::{ExpandedName, ResultShape, XPathValue, XdmAtomicValue, XdmItem, XdmSequence};
