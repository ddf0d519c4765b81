use thiserror::Error;

use crate::jet_query_generator::errors::JetQueryGeneratorError;

/// Failure categories reported to the host, which decides between client
/// evaluation and a user-facing "query not supported" error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationFailureKind {
    UnsupportedNodeKind,
    UnsupportedFunction,
    UnsupportedLiteral,
    AliasCollision,
    InvalidQueryTree,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RenderBuildError {
    #[error("Column '{table}.{column}' is not visible at this point of the query")]
    UnresolvedColumn { table: String, column: String },

    #[error("Unknown source alias '{0}'")]
    UnknownAlias(String),

    #[error("Alias '{0}' was allocated twice in one statement (internal invariant violation)")]
    AliasCollision(String),

    #[error("Invalid query tree: {0}")]
    InvalidQueryTree(String),

    #[error("Unsupported query shape: {0}")]
    UnsupportedNodeKind(String),

    #[error(transparent)]
    Generator(#[from] JetQueryGeneratorError),
}

impl RenderBuildError {
    pub fn kind(&self) -> TranslationFailureKind {
        match self {
            RenderBuildError::UnresolvedColumn { .. }
            | RenderBuildError::UnknownAlias(_)
            | RenderBuildError::InvalidQueryTree(_) => TranslationFailureKind::InvalidQueryTree,
            RenderBuildError::AliasCollision(_) => TranslationFailureKind::AliasCollision,
            RenderBuildError::UnsupportedNodeKind(_) => TranslationFailureKind::UnsupportedNodeKind,
            RenderBuildError::Generator(e) => match e {
                JetQueryGeneratorError::UnsupportedFunction { .. } => {
                    TranslationFailureKind::UnsupportedFunction
                }
                JetQueryGeneratorError::UnsupportedLiteral(_) => {
                    TranslationFailureKind::UnsupportedLiteral
                }
                JetQueryGeneratorError::UnsupportedConversion(_)
                | JetQueryGeneratorError::UnsupportedNodeKind(_) => {
                    TranslationFailureKind::UnsupportedNodeKind
                }
                JetQueryGeneratorError::InvalidExpression(_) => {
                    TranslationFailureKind::InvalidQueryTree
                }
            },
        }
    }

    /// Fatal failures point at a bug upstream or in the translator; the host
    /// must not fall back to client evaluation for them.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            TranslationFailureKind::AliasCollision
                | TranslationFailureKind::UnsupportedLiteral
                | TranslationFailureKind::InvalidQueryTree
        )
    }
}
