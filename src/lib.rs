//! JetSQL - relational query translation for the Jet/ACE (Access) database engine
//!
//! This crate turns a canonical, dialect-agnostic query tree into Jet SQL:
//! - Dialect profiles describing what the target Jet/ACE version supports
//! - Render planning (derived-table pushdown, paging emulation, TPC unions)
//! - Null-semantics compensation and boolean context lowering
//! - Scalar function translation and SQL text generation

/// Debug print macro for println-style output (only in debug builds)
#[macro_export]
macro_rules! debug_println {
    ($($arg:tt)*) => {
        #[cfg(debug_assertions)]
        println!($($arg)*);
    };
}

pub mod config;
pub mod dialect;
pub mod jet_query_generator;
pub mod query_tree;
pub mod render_plan;

pub use config::TranslatorConfig;
pub use dialect::{DialectProfile, NullSemanticsMode};
pub use jet_query_generator::{translate_query, QueryTranslator, TranslatedQuery};
pub use query_tree::QueryExpression;
pub use render_plan::errors::RenderBuildError;
