//! Jet SQL generation.
//!
//! Entry point of the library: a canonical [`QueryExpression`] is folded into
//! a [`RenderPlan`](crate::render_plan::RenderPlan) and rendered as Jet SQL
//! text plus the ordered parameter bindings.

use std::sync::Arc;

use serde::Serialize;

use crate::config::TranslatorConfig;
use crate::dialect::{DialectProfile, NullSemanticsMode};
use crate::query_tree::QueryExpression;
use crate::render_plan::context::{ParameterBinding, TranslationContext, TranslationWarning};
use crate::render_plan::errors::RenderBuildError;
use crate::render_plan::plan_builder::build_render_plan;

pub mod common;
pub mod errors;
pub mod function_registry;
pub mod function_translator;
pub mod null_semantics;
pub mod to_sql;
pub mod to_sql_query;

pub use errors::JetQueryGeneratorError;
pub use function_translator::{is_function_supported, translate_scalar_function};

/// One translated statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslatedQuery {
    pub sql: String,
    pub parameters: Vec<ParameterBinding>,
    pub warnings: Vec<TranslationWarning>,
}

pub fn translate_query(
    query: &QueryExpression,
    profile: &DialectProfile,
    null_semantics: NullSemanticsMode,
) -> Result<TranslatedQuery, RenderBuildError> {
    let mut ctx = TranslationContext::new(profile, null_semantics);
    let plan = build_render_plan(query, &mut ctx)?;
    plan.check_unique_aliases()?;
    crate::debug_println!("{}", plan);

    let sql = to_sql_query::render_plan_to_sql(&plan, &mut ctx)?;
    log::trace!("Generated SQL for profile '{}':\n{}", profile.name, sql);

    let (parameters, warnings) = ctx.into_output();
    Ok(TranslatedQuery {
        sql,
        parameters,
        warnings,
    })
}

/// Translator bound to one dialect profile; cheap to clone and share across threads.
#[derive(Debug, Clone)]
pub struct QueryTranslator {
    profile: Arc<DialectProfile>,
    null_semantics: NullSemanticsMode,
}

impl QueryTranslator {
    pub fn new(profile: DialectProfile, null_semantics: NullSemanticsMode) -> Self {
        QueryTranslator {
            profile: Arc::new(profile),
            null_semantics,
        }
    }

    pub fn from_config(config: &TranslatorConfig) -> Self {
        Self::new(config.profile.clone(), config.null_semantics)
    }

    pub fn profile(&self) -> &DialectProfile {
        &self.profile
    }

    pub fn null_semantics(&self) -> NullSemanticsMode {
        self.null_semantics
    }

    pub fn translate(&self, query: &QueryExpression) -> Result<TranslatedQuery, RenderBuildError> {
        translate_query(query, &self.profile, self.null_semantics)
    }
}

impl Default for QueryTranslator {
    fn default() -> Self {
        Self::new(DialectProfile::default(), NullSemanticsMode::default())
    }
}
