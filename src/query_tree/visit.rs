//! Read-only traversal helpers over canonical query trees.

use std::collections::BTreeSet;

use super::{QueryExpression, QueryOperator, SqlExpr, TableSource};

/// Visit every expression node of `query`, nested queries included.
pub fn walk_exprs<'a>(query: &'a QueryExpression, visit: &mut dyn FnMut(&'a SqlExpr)) {
    walk_source_exprs(&query.source, visit);
    for op in &query.operators {
        match op {
            QueryOperator::Where(e) | QueryOperator::Having(e) => walk_expr(e, visit),
            QueryOperator::Join(join) => {
                walk_source_exprs(&join.source, visit);
                if let Some(on) = &join.on {
                    walk_expr(on, visit);
                }
            }
            QueryOperator::Select(items) => {
                items.iter().for_each(|i| walk_expr(&i.expression, visit))
            }
            QueryOperator::OrderBy(items) | QueryOperator::ThenBy(items) => {
                items.iter().for_each(|i| walk_expr(&i.expression, visit))
            }
            QueryOperator::GroupBy(keys) => keys.iter().for_each(|k| walk_expr(k, visit)),
            QueryOperator::Aggregate(agg) => {
                if let Some(arg) = &agg.argument {
                    walk_expr(arg, visit);
                }
            }
            QueryOperator::Skip(_)
            | QueryOperator::Take(_)
            | QueryOperator::Distinct
            | QueryOperator::OfType { .. } => {}
        }
    }
}

pub fn walk_expr<'a>(expr: &'a SqlExpr, visit: &mut dyn FnMut(&'a SqlExpr)) {
    visit(expr);
    for child in expr.children() {
        walk_expr(child, visit);
    }
    if let Some(query) = expr.subquery() {
        walk_exprs(query, visit);
    }
}

fn walk_source_exprs<'a>(source: &'a TableSource, visit: &mut dyn FnMut(&'a SqlExpr)) {
    match source {
        TableSource::Subquery { query, .. } => walk_exprs(query, visit),
        TableSource::SetOperation { queries, .. } => {
            queries.iter().for_each(|q| walk_exprs(q, visit))
        }
        TableSource::Table { .. } | TableSource::Polymorphic { .. } => {}
    }
}

/// Visit every table source of `query`, nested queries included.
pub fn walk_sources<'a>(query: &'a QueryExpression, visit: &mut dyn FnMut(&'a TableSource)) {
    walk_source(&query.source, visit);
    for op in &query.operators {
        if let QueryOperator::Join(join) = op {
            walk_source(&join.source, visit);
        }
    }
    walk_exprs(query, &mut |expr| {
        if let Some(nested) = expr.subquery() {
            walk_source(&nested.source, visit);
            for op in &nested.operators {
                if let QueryOperator::Join(join) = op {
                    walk_source(&join.source, visit);
                }
            }
        }
    });
}

fn walk_source<'a>(source: &'a TableSource, visit: &mut dyn FnMut(&'a TableSource)) {
    visit(source);
    match source {
        TableSource::Subquery { query, .. } => walk_sources(query, visit),
        TableSource::SetOperation { queries, .. } => {
            queries.iter().for_each(|q| walk_sources(q, visit))
        }
        TableSource::Table { .. } | TableSource::Polymorphic { .. } => {}
    }
}

/// Aliases referenced by `query` that it does not define itself.
pub fn free_aliases(query: &QueryExpression) -> BTreeSet<String> {
    let mut defined = BTreeSet::new();
    walk_sources(query, &mut |source| {
        defined.insert(source.alias().to_string());
    });
    let mut free = BTreeSet::new();
    walk_exprs(query, &mut |expr| match expr {
        SqlExpr::Column(c) if !defined.contains(&c.table) => {
            free.insert(c.table.clone());
        }
        SqlExpr::TypeIs { table, .. } if !defined.contains(table) => {
            free.insert(table.clone());
        }
        _ => {}
    });
    free
}
