//! Per-translation scratch state.
//!
//! One context is created for each `translate_query` call and dropped at the
//! end of it; nothing here outlives a statement.

use std::fmt;

use serde::Serialize;

use crate::dialect::{DialectProfile, NullSemanticsMode, ParameterStyle};
use crate::query_tree::{SqlType, Value};

use super::alias_allocator::AliasAllocator;
use super::errors::RenderBuildError;
use super::scope::Scope;

/// Placeholder-to-value binding handed back with the SQL text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterBinding {
    pub placeholder: String,
    pub name: String,
    pub value: Value,
    pub ty: SqlType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TranslationWarning {
    /// Skip without an explicit ordering; rows are ordered by the listed tie-break.
    AmbiguousPagingOrdering { tie_break: Vec<String> },
}

impl fmt::Display for TranslationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranslationWarning::AmbiguousPagingOrdering { tie_break } => write!(
                f,
                "Skip applied without ordering; rows ordered by [{}]",
                tie_break.join(", ")
            ),
        }
    }
}

/// Position of the expression being lowered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprContext {
    Predicate,
    Value,
}

const SYNTHETIC_PARAMETER_PREFIX: &str = "__lit";

pub struct TranslationContext<'a> {
    profile: &'a DialectProfile,
    null_semantics: NullSemanticsMode,
    aliases: AliasAllocator,
    parameters: Vec<ParameterBinding>,
    expr_contexts: Vec<ExprContext>,
    outer_scopes: Vec<Scope>,
    warnings: Vec<TranslationWarning>,
    synthetic_parameters: usize,
}

impl<'a> TranslationContext<'a> {
    pub fn new(profile: &'a DialectProfile, null_semantics: NullSemanticsMode) -> Self {
        TranslationContext {
            profile,
            null_semantics,
            aliases: AliasAllocator::new(),
            parameters: Vec::new(),
            expr_contexts: Vec::new(),
            outer_scopes: Vec::new(),
            warnings: Vec::new(),
            synthetic_parameters: 0,
        }
    }

    pub fn profile(&self) -> &'a DialectProfile {
        self.profile
    }

    pub fn null_semantics(&self) -> NullSemanticsMode {
        self.null_semantics
    }

    pub fn allocate_alias(&mut self, base: &str) -> String {
        self.aliases.allocate(base)
    }

    pub fn register_alias(&mut self, alias: &str) -> Result<(), RenderBuildError> {
        self.aliases.register(alias)
    }

    /// Bind a host parameter and return its placeholder text.
    pub fn add_parameter(&mut self, name: &str, value: &Value, ty: &SqlType) -> String {
        match self.profile.parameter_style {
            ParameterStyle::Named => {
                if let Some(existing) = self.parameters.iter().find(|p| p.name == name) {
                    return existing.placeholder.clone();
                }
                let placeholder = format!("@{}", name);
                self.parameters.push(ParameterBinding {
                    placeholder: placeholder.clone(),
                    name: name.to_string(),
                    value: value.clone(),
                    ty: ty.clone(),
                });
                placeholder
            }
            ParameterStyle::Positional => {
                self.parameters.push(ParameterBinding {
                    placeholder: "?".to_string(),
                    name: name.to_string(),
                    value: value.clone(),
                    ty: ty.clone(),
                });
                "?".to_string()
            }
        }
    }

    /// Bind a literal that has no textual form in the dialect.
    pub fn add_synthetic_parameter(&mut self, value: &Value, ty: &SqlType) -> String {
        let name = format!("{}{}", SYNTHETIC_PARAMETER_PREFIX, self.synthetic_parameters);
        self.synthetic_parameters += 1;
        log::debug!("Literal of type {:?} sent as parameter {}", ty, name);
        self.add_parameter(&name, value, ty)
    }

    pub fn current_context(&self) -> ExprContext {
        self.expr_contexts
            .last()
            .copied()
            .unwrap_or(ExprContext::Value)
    }

    pub fn in_predicate(&self) -> bool {
        self.current_context() == ExprContext::Predicate
    }

    /// Run `f` with `context` pushed on the boolean-context stack.
    pub fn with_context<T>(
        &mut self,
        context: ExprContext,
        f: impl FnOnce(&mut Self) -> T,
    ) -> T {
        self.expr_contexts.push(context);
        let result = f(self);
        self.expr_contexts.pop();
        result
    }

    pub fn push_outer_scope(&mut self, scope: Scope) {
        self.outer_scopes.push(scope);
    }

    pub fn pop_outer_scope(&mut self) {
        self.outer_scopes.pop();
    }

    /// Enclosing query scopes, innermost first.
    pub fn outer_scopes(&self) -> impl Iterator<Item = &Scope> {
        self.outer_scopes.iter().rev()
    }

    /// Record a warning once per statement.
    pub fn warn(&mut self, warning: TranslationWarning) {
        if self.warnings.contains(&warning) {
            return;
        }
        log::warn!("{}", warning);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[TranslationWarning] {
        &self.warnings
    }

    pub fn parameters(&self) -> &[ParameterBinding] {
        &self.parameters
    }

    pub fn into_output(self) -> (Vec<ParameterBinding>, Vec<TranslationWarning>) {
        (self.parameters, self.warnings)
    }
}
