use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum JetQueryGeneratorError {
    #[error("Function '{function}' cannot be translated: {reason}")]
    UnsupportedFunction { function: String, reason: String },

    #[error("Literal of type {0} has no representation in the dialect")]
    UnsupportedLiteral(String),

    #[error("Conversion to {0} is not supported by the dialect")]
    UnsupportedConversion(String),

    #[error("Unsupported expression node: {0}")]
    UnsupportedNodeKind(String),

    #[error("Invalid expression: {0}")]
    InvalidExpression(String),
}

impl JetQueryGeneratorError {
    pub fn unsupported_function(function: impl Into<String>, reason: impl Into<String>) -> Self {
        JetQueryGeneratorError::UnsupportedFunction {
            function: function.into(),
            reason: reason.into(),
        }
    }
}
