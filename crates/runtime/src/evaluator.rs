use std::fmt;
use std::sync::Arc;

use relay_xpath::{
    ExpandedName, FunctionResolver, ResultShape, SimpleNode, StaticContextBuilder, XPathCompiler, XPathValue, XdmItem,
};
use serde_json::Value;

use crate::config::EvaluatorConfig;
use crate::context::ExecutionContext;
use crate::convert::{Converted, DefaultTypeConverter, FromConverted, TargetType, TypeConversionService};
use crate::document::{
    DefaultDocumentProvider, DocumentProvider, DocumentType, InputSource, RawDocument, ResetStreamCache,
    StreamResetHook,
};
use crate::error::EvaluatorError;
use crate::functions::{ENV_NAMESPACE, FunctionBridge, IN_NAMESPACE, OUT_NAMESPACE};
use crate::message::Invocation;
use crate::pool::{ExpressionPool, PoolStats};
use crate::variables::{MessageVariableResolver, VariableBinding};

/// One XPath expression, evaluated concurrently against the documents of many invocations.
///
/// Share it between worker threads behind an `Arc`; every evaluation checks out its own
/// compiled instance from an internal pool.
pub struct XPathEvaluator {
    text: String,
    shape: ResultShape,
    shape_configured: bool,
    result_type: Option<TargetType>,
    document_type: Option<DocumentType>,
    pool: ExpressionPool,
    documents: Arc<dyn DocumentProvider>,
    converter: Arc<dyn TypeConversionService>,
    reset_hook: Arc<dyn StreamResetHook>,
}

impl XPathEvaluator {
    pub fn builder(text: impl Into<String>) -> XPathEvaluatorBuilder {
        XPathEvaluatorBuilder::new(text)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn result_shape(&self) -> ResultShape {
        self.shape
    }

    pub fn result_type(&self) -> Option<TargetType> {
        self.result_type
    }

    /// Compiles the expression now instead of on first use.
    pub fn prepare(&self) -> Result<(), EvaluatorError> {
        self.pool.acquire().map(drop)
    }

    /// Evaluates against the invocation's input document and shapes the result.
    pub fn evaluate_as(&self, invocation: &Invocation, shape: ResultShape) -> Result<XPathValue<SimpleNode>, EvaluatorError> {
        let document = self.document(invocation)?;
        let mut expr = self.pool.acquire()?;
        let _context = ExecutionContext::new(invocation.clone()).install();
        tracing::trace!(expression = %self.text, %shape, "evaluating xpath");
        let value = expr
            .evaluate_as(Some(XdmItem::Node(document)), shape)
            .map_err(|source| EvaluatorError::Evaluation { expression: self.text.clone(), source })?;
        tracing::trace!(expression = %self.text, result = %value.shape(), "evaluated xpath");
        Ok(value)
    }

    /// Evaluates with the configured shape, converted to the configured result type if any.
    pub fn evaluate(&self, invocation: &Invocation) -> Result<Converted, EvaluatorError> {
        let value = self.evaluate_as(invocation, self.shape)?;
        match self.result_type {
            Some(target) => Ok(self.converter.convert(value, target)?),
            None => Ok(Converted::from(value)),
        }
    }

    /// Evaluates as a predicate.
    pub fn matches(&self, invocation: &Invocation) -> Result<bool, EvaluatorError> {
        let value = self.evaluate_as(invocation, ResultShape::Boolean)?;
        let converted = self.converter.convert(value, TargetType::Boolean)?;
        Ok(bool::from_converted(converted)?)
    }

    /// Evaluates and converts to `target`. Without a configured shape the expression is
    /// evaluated with the shape `target` implies.
    pub fn evaluate_to(&self, invocation: &Invocation, target: TargetType) -> Result<Converted, EvaluatorError> {
        let shape = if self.shape_configured { self.shape } else { target.shape() };
        let value = self.evaluate_as(invocation, shape)?;
        Ok(self.converter.convert(value, target)?)
    }

    pub fn evaluate_typed<T: FromConverted>(&self, invocation: &Invocation) -> Result<T, EvaluatorError> {
        let converted = self.evaluate_to(invocation, T::TARGET)?;
        Ok(T::from_converted(converted)?)
    }

    /// Releases all pooled instances. Later evaluations fail with [`EvaluatorError::Shutdown`].
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }

    pub fn is_shutdown(&self) -> bool {
        self.pool.is_shutdown()
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    fn document(&self, invocation: &Invocation) -> Result<SimpleNode, EvaluatorError> {
        let document = self.documents.extract(invocation, self.document_type).and_then(|raw| match raw {
            RawDocument::Node(node) => Ok(node),
            RawDocument::Text(text) => InputSource::Text(text).parse(),
            RawDocument::Bytes(bytes) => InputSource::Bytes(bytes).parse(),
            RawDocument::File(file) => InputSource::Bytes(self.documents.file_bytes(&file)?).parse(),
            RawDocument::Empty => Ok(SimpleNode::document().build()),
        });
        self.reset_hook.reset(invocation);
        document.map_err(|source| EvaluatorError::Document { expression: self.text.clone(), source })
    }
}

impl fmt::Display for XPathEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "XPath: {}", self.text)
    }
}

impl fmt::Debug for XPathEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XPathEvaluator")
            .field("text", &self.text)
            .field("shape", &self.shape)
            .field("result_type", &self.result_type)
            .field("document_type", &self.document_type)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

/// Configuration of an [`XPathEvaluator`]. Nothing can be changed after [`build`](Self::build).
///
/// The prefixes `in`, `out` and `env` are bound to the message namespaces unless they are
/// registered explicitly.
#[derive(Clone)]
pub struct XPathEvaluatorBuilder {
    text: String,
    shape: Option<ResultShape>,
    result_type: Option<TargetType>,
    namespaces: Vec<(String, String)>,
    variables: VariableBinding,
    functions: Option<Arc<dyn FunctionResolver<SimpleNode>>>,
    document_type: Option<DocumentType>,
    documents: Arc<dyn DocumentProvider>,
    converter: Arc<dyn TypeConversionService>,
    reset_hook: Arc<dyn StreamResetHook>,
    max_idle: Option<usize>,
}

impl XPathEvaluatorBuilder {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            shape: None,
            result_type: None,
            namespaces: Vec::new(),
            variables: VariableBinding::new(),
            functions: None,
            document_type: None,
            documents: Arc::new(DefaultDocumentProvider),
            converter: Arc::new(DefaultTypeConverter),
            reset_hook: Arc::new(ResetStreamCache),
            max_idle: None,
        }
    }

    pub fn from_config(config: EvaluatorConfig) -> Self {
        let mut builder = Self::new(config.expression);
        builder.shape = config.result_shape.map(ResultShape::from);
        if let Some(target) = config.result_type {
            builder = builder.result_type(target);
        }
        builder.namespaces.extend(config.namespaces);
        for (name, value) in config.variables {
            builder = builder.variable(&name, value);
        }
        builder.document_type = config.document_type;
        builder.max_idle = config.max_idle;
        builder
    }

    #[must_use]
    pub fn boolean_result(self) -> Self {
        self.result_shape(ResultShape::Boolean)
    }

    #[must_use]
    pub fn node_result(self) -> Self {
        self.result_shape(ResultShape::Node)
    }

    #[must_use]
    pub fn node_set_result(self) -> Self {
        self.result_shape(ResultShape::NodeSet)
    }

    #[must_use]
    pub fn number_result(self) -> Self {
        self.result_shape(ResultShape::Number)
    }

    #[must_use]
    pub fn string_result(self) -> Self {
        self.result_shape(ResultShape::Text)
    }

    #[must_use]
    pub fn result_shape(mut self, shape: ResultShape) -> Self {
        self.shape = Some(shape);
        self
    }

    /// Converts every [`XPathEvaluator::evaluate`] result to `target` and, unless a shape is
    /// set explicitly, evaluates with the shape `target` implies.
    #[must_use]
    pub fn result_type(mut self, target: TargetType) -> Self {
        self.result_type = Some(target);
        self.shape.get_or_insert(target.shape());
        self
    }

    #[must_use]
    pub fn namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.namespaces.push((prefix.into(), uri.into()));
        self
    }

    #[must_use]
    pub fn namespaces<I, P, U>(mut self, bindings: I) -> Self
    where
        I: IntoIterator<Item = (P, U)>,
        P: Into<String>,
        U: Into<String>,
    {
        self.namespaces.extend(bindings.into_iter().map(|(p, u)| (p.into(), u.into())));
        self
    }

    /// Binds `$name`.
    #[must_use]
    pub fn variable(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.variables.insert(ExpandedName::local(name), value);
        self
    }

    /// Binds a variable in a namespace, referenced as `$prefix:local`.
    #[must_use]
    pub fn variable_ns(mut self, ns_uri: &str, local: &str, value: impl Into<Value>) -> Self {
        self.variables.insert(ExpandedName::new(Some(ns_uri), local), value);
        self
    }

    /// Resolver consulted before the message functions.
    #[must_use]
    pub fn function_resolver(mut self, resolver: Arc<dyn FunctionResolver<SimpleNode>>) -> Self {
        self.functions = Some(resolver);
        self
    }

    #[must_use]
    pub fn document_type(mut self, document_type: DocumentType) -> Self {
        self.document_type = Some(document_type);
        self
    }

    #[must_use]
    pub fn document_provider(mut self, provider: Arc<dyn DocumentProvider>) -> Self {
        self.documents = provider;
        self
    }

    #[must_use]
    pub fn type_converter(mut self, converter: Arc<dyn TypeConversionService>) -> Self {
        self.converter = converter;
        self
    }

    #[must_use]
    pub fn stream_reset_hook(mut self, hook: Arc<dyn StreamResetHook>) -> Self {
        self.reset_hook = hook;
        self
    }

    /// Caps the idle instances kept by the pool. Unbounded by default.
    #[must_use]
    pub fn max_idle(mut self, max_idle: usize) -> Self {
        self.max_idle = Some(max_idle);
        self
    }

    pub fn build(self) -> XPathEvaluator {
        let static_ctx = self
            .namespaces
            .into_iter()
            .fold(StaticContextBuilder::new(), |b, (prefix, uri)| b.with_namespace(prefix, uri))
            .with_default_namespace("in", IN_NAMESPACE)
            .with_default_namespace("out", OUT_NAMESPACE)
            .with_default_namespace("env", ENV_NAMESPACE)
            .build();
        let bridge = match self.functions {
            Some(external) => FunctionBridge::new().with_external(external),
            None => FunctionBridge::new(),
        };
        let compiler = XPathCompiler::new()
            .with_static_context(static_ctx)
            .with_function_resolver(Arc::new(bridge))
            .with_variable_resolver(Arc::new(MessageVariableResolver::new(Arc::new(self.variables))));
        let pool = ExpressionPool::new(self.text.clone(), compiler).with_max_idle(self.max_idle);
        let shape = self.shape.unwrap_or_default();
        tracing::debug!(expression = %self.text, %shape, result_type = ?self.result_type, "built xpath evaluator");
        XPathEvaluator {
            text: self.text,
            shape,
            shape_configured: self.shape.is_some(),
            result_type: self.result_type,
            document_type: self.document_type,
            pool,
            documents: self.documents,
            converter: self.converter,
            reset_hook: self.reset_hook,
        }
    }
}

impl fmt::Debug for XPathEvaluatorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XPathEvaluatorBuilder")
            .field("text", &self.text)
            .field("shape", &self.shape)
            .field("result_type", &self.result_type)
            .field("namespaces", &self.namespaces)
            .field("variables", &self.variables)
            .field("document_type", &self.document_type)
            .field("max_idle", &self.max_idle)
            .finish_non_exhaustive()
    }
}
