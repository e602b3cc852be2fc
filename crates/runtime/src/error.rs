use thiserror::Error;

use crate::convert::ConversionError;
use crate::document::DocumentError;

/// Failure of one evaluator call. Every variant that originates from a specific expression
/// carries its source text.
#[derive(Debug, Error)]
pub enum EvaluatorError {
    #[error("invalid XPath expression '{expression}': {source}")]
    Configuration {
        expression: String,
        #[source]
        source: relay_xpath::Error,
    },
    #[error("failed to evaluate XPath '{expression}': {source}")]
    Evaluation {
        expression: String,
        #[source]
        source: relay_xpath::Error,
    },
    #[error("no document for XPath '{expression}': {source}")]
    Document {
        expression: String,
        #[source]
        source: DocumentError,
    },
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error("XPath evaluator for '{expression}' has been shut down")]
    Shutdown { expression: String },
}

impl EvaluatorError {
    /// The engine error behind an `Evaluation` or `Configuration` failure.
    pub fn xpath_error(&self) -> Option<&relay_xpath::Error> {
        match self {
            EvaluatorError::Configuration { source, .. } | EvaluatorError::Evaluation { source, .. } => Some(source),
            _ => None,
        }
    }
}
