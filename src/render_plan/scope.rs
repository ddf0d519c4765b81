//! Column visibility for one query layer.
//!
//! Maps host-side references (`alias.column`, or whole projected expressions
//! after a pushdown) onto physical render expressions.

use crate::query_tree::{ColumnRef, EntityHierarchy, SqlExpr};

use super::render_expr::RenderExpr;

#[derive(Debug, Clone, PartialEq)]
pub struct BoundColumn {
    pub name: String,
    pub expr: RenderExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PolymorphicBinding {
    pub hierarchy: EntityHierarchy,
    /// Concrete types present in the materialized source.
    pub materialized: Vec<String>,
    /// Discriminator column, or the literal type name when only one type remains.
    pub discriminator: Option<RenderExpr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceBinding {
    pub host_alias: String,
    pub columns: Vec<BoundColumn>,
    pub keys: Vec<String>,
    /// Source sits on the optional side of a LEFT JOIN.
    pub nullable: bool,
    pub polymorphic: Option<PolymorphicBinding>,
}

impl SourceBinding {
    pub fn column(&self, name: &str) -> Option<RenderExpr> {
        let expr = self
            .columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.expr.clone())
            .or_else(|| {
                let poly = self.polymorphic.as_ref()?;
                if poly.hierarchy.discriminator_column == name {
                    poly.discriminator.clone()
                } else {
                    None
                }
            })?;
        Some(if self.nullable { expr.into_nullable() } else { expr })
    }

    /// Key columns of the source, or every column when it has no usable key.
    pub fn row_key(&self) -> Vec<RenderExpr> {
        let keys: Option<Vec<RenderExpr>> = if self.keys.is_empty() {
            None
        } else {
            self.keys.iter().map(|k| self.column(k)).collect()
        };
        match keys {
            Some(keys) => keys,
            None => self
                .columns
                .iter()
                .filter_map(|c| self.column(&c.name))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    pub sources: Vec<SourceBinding>,
    /// Canonical expressions projected by an inner layer and what they became.
    pub projection_matches: Vec<(SqlExpr, RenderExpr)>,
}

impl Scope {
    pub fn single(binding: SourceBinding) -> Self {
        Scope {
            sources: vec![binding],
            projection_matches: Vec::new(),
        }
    }

    pub fn source(&self, host_alias: &str) -> Option<&SourceBinding> {
        self.sources.iter().find(|s| s.host_alias == host_alias)
    }

    pub fn source_mut(&mut self, host_alias: &str) -> Option<&mut SourceBinding> {
        self.sources.iter_mut().find(|s| s.host_alias == host_alias)
    }

    pub fn has_alias(&self, host_alias: &str) -> bool {
        self.source(host_alias).is_some()
            || self.projection_matches.iter().any(|(canonical, _)| {
                matches!(canonical, SqlExpr::Column(c) if c.table == host_alias)
            })
    }

    /// Whole-expression match against an inner projection.
    pub fn match_projection(&self, expr: &SqlExpr) -> Option<RenderExpr> {
        self.projection_matches
            .iter()
            .find(|(canonical, _)| canonical == expr)
            .map(|(_, resolved)| resolved.clone())
    }

    pub fn lookup_column(&self, column: &ColumnRef) -> Option<RenderExpr> {
        let projected = self.projection_matches.iter().find(|(canonical, _)| {
            matches!(canonical, SqlExpr::Column(c) if c.table == column.table && c.column == column.column)
        });
        if let Some((_, resolved)) = projected {
            return Some(resolved.clone());
        }
        self.source(&column.table)?.column(&column.column)
    }

    /// Columns of every source in declaration order, as `(host alias, name, expr)`.
    pub fn visible_columns(&self) -> Vec<(String, String, RenderExpr)> {
        self.sources
            .iter()
            .flat_map(|s| {
                s.columns.iter().filter_map(move |c| {
                    s.column(&c.name)
                        .map(|expr| (s.host_alias.clone(), c.name.clone(), expr))
                })
            })
            .collect()
    }

    /// Deterministic row identity: key columns of every row-contributing source.
    pub fn row_key(&self) -> Vec<RenderExpr> {
        self.sources.iter().flat_map(SourceBinding::row_key).collect()
    }

    pub fn polymorphic(&self, host_alias: &str) -> Option<&PolymorphicBinding> {
        self.source(host_alias).and_then(|s| s.polymorphic.as_ref())
    }
}
