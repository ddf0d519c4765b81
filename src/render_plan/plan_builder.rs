//! Folds a canonical operator pipeline into [`RenderPlan`] layers.
//!
//! Operators are applied in order to the current layer. An operator that
//! cannot be expressed on top of what the layer already holds (a filter after
//! `TOP`, a join after `DISTINCT`, ...) first pushes the layer down into a
//! derived table `t`; later references are remapped onto `t`'s columns.

use crate::query_tree::visit::free_aliases;
use crate::query_tree::{
    AggregateCall, AggregateFunction, AggregateOperator, BinaryExpr, CaseChain, CaseWhen,
    Coalesce, ColumnRef, Conditional, Convert, FunctionCall, InList, JoinClause, JoinKind,
    LikeExpr, OrderingItem, PagingValue, ProjectionItem, QueryExpression, QueryOperator,
    SetOperationKind, SqlExpr, TableSource, TypedExpr, UnaryExpr, Value,
};

use super::context::TranslationContext;
use super::errors::RenderBuildError;
use super::pagination::{apply_paging, PagingRequest};
use super::render_expr::RenderExpr;
use super::scope::{BoundColumn, Scope, SourceBinding};
use super::tpc_union::{self, MaterializedSource};
use super::{
    unique_name, FromGroup, FromSource, Join, JoinType, OrderByItem, OrderByItems, OrderByOrder,
    OutputColumn, RenderPlan, SelectItem, SelectItems, UnionItems, UnionType,
};

/// A built query together with the columns it exposes.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltQuery {
    pub plan: RenderPlan,
    pub columns: Vec<OutputColumn>,
}

pub fn build_render_plan(
    query: &QueryExpression,
    ctx: &mut TranslationContext<'_>,
) -> Result<RenderPlan, RenderBuildError> {
    Ok(build_query(query, ctx)?.plan)
}

pub fn build_query(
    query: &QueryExpression,
    ctx: &mut TranslationContext<'_>,
) -> Result<BuiltQuery, RenderBuildError> {
    let mut layer = Layer::root(query, ctx)?;
    for (i, op) in query.operators.iter().enumerate() {
        if layer.aggregated {
            return Err(RenderBuildError::InvalidQueryTree(format!(
                "{} after a terminal aggregate",
                operator_name(op)
            )));
        }
        if layer.requires_pushdown(op) {
            log::debug!("{} forces a pushdown", operator_name(op));
            layer.push_down(ctx)?;
        }
        layer.apply(op, query, &query.operators[i + 1..], ctx)?;
    }
    layer.finish(ctx)
}

fn operator_name(op: &QueryOperator) -> &'static str {
    match op {
        QueryOperator::Where(_) => "Where",
        QueryOperator::Join(_) => "Join",
        QueryOperator::Select(_) => "Select",
        QueryOperator::OrderBy(_) => "OrderBy",
        QueryOperator::ThenBy(_) => "ThenBy",
        QueryOperator::Skip(_) => "Skip",
        QueryOperator::Take(_) => "Take",
        QueryOperator::Distinct => "Distinct",
        QueryOperator::GroupBy(_) => "GroupBy",
        QueryOperator::Having(_) => "Having",
        QueryOperator::OfType { .. } => "OfType",
        QueryOperator::Aggregate(_) => "Aggregate",
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Origin {
    /// Plain column of a source, still addressable as `alias.column`.
    Source { host_alias: String, column: String },
    /// Explicitly projected expression.
    Expression(SqlExpr),
    /// Ordering key carried through a pushdown only.
    Hidden,
}

#[derive(Debug, Clone, PartialEq)]
struct ProjectedColumn {
    origin: Origin,
    name: String,
    expr: RenderExpr,
}

#[derive(Debug, Default)]
struct Layer {
    plan: RenderPlan,
    scope: Scope,
    projection: Vec<ProjectedColumn>,
    group_keys: Vec<(SqlExpr, RenderExpr)>,
    skip: Option<PagingValue>,
    take: Option<PagingValue>,
    /// FROM already holds comma-separated groups.
    cross_grouped: bool,
    aggregated: bool,
}

impl Layer {
    fn root(
        query: &QueryExpression,
        ctx: &mut TranslationContext<'_>,
    ) -> Result<Self, RenderBuildError> {
        let bound = bind_source(&query.source, query, &query.operators, true, ctx)?;
        let mut plan = RenderPlan::new(bound.source);
        if let Some(filter) = bound.filter {
            plan.add_filter(filter);
        }
        Ok(Layer::over(plan, Scope::single(bound.binding)))
    }

    fn over(plan: RenderPlan, scope: Scope) -> Self {
        Layer {
            plan,
            scope,
            ..Default::default()
        }
    }

    fn is_paged(&self) -> bool {
        self.skip.is_some() || self.take.is_some()
    }

    fn is_grouped(&self) -> bool {
        !self.group_keys.is_empty()
    }

    fn requires_pushdown(&self, op: &QueryOperator) -> bool {
        let paged = self.is_paged();
        let distinct = self.plan.select.distinct;
        let grouped = self.is_grouped();
        match op {
            QueryOperator::Where(_) | QueryOperator::OfType { .. } => paged || distinct || grouped,
            QueryOperator::Join(join) => {
                paged
                    || distinct
                    || grouped
                    || !self.projection.is_empty()
                    || (self.cross_grouped
                        && !matches!(join.kind, JoinKind::Cross | JoinKind::CrossApply))
            }
            QueryOperator::Select(_) => distinct,
            QueryOperator::OrderBy(_) | QueryOperator::ThenBy(_) => paged || distinct,
            QueryOperator::Skip(_) | QueryOperator::Distinct => paged,
            QueryOperator::Take(_) => self.take.is_some(),
            QueryOperator::GroupBy(_) => {
                paged || distinct || grouped || !self.projection.is_empty()
            }
            QueryOperator::Having(_) => false,
            QueryOperator::Aggregate(_) => paged || distinct || grouped,
        }
    }

    fn apply(
        &mut self,
        op: &QueryOperator,
        owner: &QueryExpression,
        following: &[QueryOperator],
        ctx: &mut TranslationContext<'_>,
    ) -> Result<(), RenderBuildError> {
        match op {
            QueryOperator::Where(predicate) => {
                let resolved = resolve(predicate, &self.scope, ctx)?;
                self.plan.add_filter(resolved);
            }
            QueryOperator::Join(join) => self.join(join, owner, following, ctx)?,
            QueryOperator::Select(items) => self.select(items, ctx)?,
            QueryOperator::OrderBy(items) => {
                self.plan.order_by = OrderByItems(resolve_ordering(items, &self.scope, ctx)?);
            }
            QueryOperator::ThenBy(items) => {
                let mut more = resolve_ordering(items, &self.scope, ctx)?;
                self.plan.order_by.0.append(&mut more);
            }
            QueryOperator::Skip(count) => self.skip = Some(count.clone()),
            QueryOperator::Take(count) => self.take = Some(count.clone()),
            QueryOperator::Distinct => {
                if !self.plan.order_by.0.is_empty() {
                    log::debug!("Ordering below Distinct dropped");
                    self.plan.order_by = OrderByItems::default();
                }
                self.plan.select.distinct = true;
            }
            QueryOperator::GroupBy(keys) => {
                for key in keys {
                    let resolved = resolve(key, &self.scope, ctx)?;
                    self.plan.group_by.0.push(resolved.clone());
                    self.group_keys.push((key.clone(), resolved));
                }
            }
            QueryOperator::Having(predicate) => {
                if !self.is_grouped() {
                    return Err(RenderBuildError::InvalidQueryTree(
                        "Having without a preceding GroupBy".to_string(),
                    ));
                }
                let resolved = resolve(predicate, &self.scope, ctx)?;
                let existing = self.plan.having_clause.take();
                self.plan.having_clause =
                    RenderExpr::conjunction(existing.into_iter().chain(Some(resolved)));
            }
            QueryOperator::OfType { alias, types } => self.of_type(alias, types)?,
            QueryOperator::Aggregate(aggregate) => self.aggregate(aggregate, ctx)?,
        }
        Ok(())
    }

    fn join(
        &mut self,
        join: &JoinClause,
        owner: &QueryExpression,
        following: &[QueryOperator],
        ctx: &mut TranslationContext<'_>,
    ) -> Result<(), RenderBuildError> {
        let alias = join.source.alias();
        if self.scope.source(alias).is_some() {
            return Err(RenderBuildError::InvalidQueryTree(format!(
                "Source alias '{}' is bound twice",
                alias
            )));
        }
        if join.kind == JoinKind::CrossApply && is_correlated_source(&join.source) {
            return Err(RenderBuildError::UnsupportedNodeKind(
                "CROSS APPLY over a correlated source".to_string(),
            ));
        }

        let prunable = join.kind != JoinKind::Left;
        let bound = bind_source(&join.source, owner, following, prunable, ctx)?;
        match join.kind {
            JoinKind::Cross | JoinKind::CrossApply => {
                if join.on.is_some() {
                    return Err(RenderBuildError::InvalidQueryTree(
                        "Cross join with a join predicate".to_string(),
                    ));
                }
                self.plan.from.0.push(FromGroup {
                    source: bound.source,
                    joins: Vec::new(),
                });
                self.scope.sources.push(bound.binding);
                if let Some(filter) = bound.filter {
                    self.plan.add_filter(filter);
                }
                self.cross_grouped = true;
            }
            JoinKind::Inner | JoinKind::Left => {
                let on = join.on.as_ref().ok_or_else(|| {
                    RenderBuildError::InvalidQueryTree(format!(
                        "{:?} join on '{}' without a predicate",
                        join.kind, alias
                    ))
                })?;
                self.scope.sources.push(bound.binding);
                // the ON clause sees the joined row before null extension
                let mut joining_on = resolve(on, &self.scope, ctx)?;
                if let Some(filter) = bound.filter {
                    joining_on = RenderExpr::and(joining_on, filter);
                }
                let join_type = if join.kind == JoinKind::Left {
                    if let Some(binding) = self.scope.sources.last_mut() {
                        binding.nullable = true;
                    }
                    JoinType::Left
                } else {
                    JoinType::Inner
                };
                let group = self.plan.from.0.last_mut().ok_or_else(|| {
                    RenderBuildError::InvalidQueryTree("Join without a source".to_string())
                })?;
                group.joins.push(Join {
                    source: bound.source,
                    join_type,
                    joining_on,
                });
            }
        }
        Ok(())
    }

    fn select(
        &mut self,
        items: &[ProjectionItem],
        ctx: &mut TranslationContext<'_>,
    ) -> Result<(), RenderBuildError> {
        if items.is_empty() {
            return Err(RenderBuildError::InvalidQueryTree(
                "Select with an empty projection".to_string(),
            ));
        }
        let mut projection: Vec<ProjectedColumn> = Vec::with_capacity(items.len());
        for item in items {
            let expr = resolve(&item.expression, &self.scope, ctx)?;
            let base = item
                .alias
                .clone()
                .or_else(|| match &item.expression {
                    SqlExpr::Column(c) => Some(c.column.clone()),
                    _ => None,
                })
                .unwrap_or_else(|| "c".to_string());
            let name = unique_name(&base, |n| projection.iter().any(|c| c.name == n));
            projection.push(ProjectedColumn {
                origin: Origin::Expression(item.expression.clone()),
                name,
                expr,
            });
        }
        self.projection = projection;
        Ok(())
    }

    fn of_type(&mut self, alias: &str, types: &[String]) -> Result<(), RenderBuildError> {
        let poly = match self.scope.polymorphic(alias) {
            Some(poly) => poly,
            None if self.scope.has_alias(alias) => {
                return Err(RenderBuildError::InvalidQueryTree(format!(
                    "OfType on non-polymorphic source '{}'",
                    alias
                )))
            }
            None => return Err(RenderBuildError::UnknownAlias(alias.to_string())),
        };
        let allowed = poly.hierarchy.concrete_descendants(types);
        if poly.materialized.iter().all(|t| allowed.contains(t)) {
            log::debug!(
                "OfType({}) on '{}' already applied by materialization",
                types.join(", "),
                alias
            );
            return Ok(());
        }
        let test = tpc_union::type_test(poly, types)?;
        self.plan.add_filter(test);
        Ok(())
    }

    fn aggregate(
        &mut self,
        aggregate: &AggregateOperator,
        ctx: &mut TranslationContext<'_>,
    ) -> Result<(), RenderBuildError> {
        let arg = match &aggregate.argument {
            None if aggregate.function != AggregateFunction::Count => {
                return Err(RenderBuildError::InvalidQueryTree(format!(
                    "{:?} requires an argument",
                    aggregate.function
                )))
            }
            None => None,
            Some(argument) if aggregate.distinct => {
                // DISTINCT aggregates run over a distinct derived table
                let resolved = resolve(argument, &self.scope, ctx)?;
                self.projection = vec![ProjectedColumn {
                    origin: Origin::Expression(argument.clone()),
                    name: "c".to_string(),
                    expr: resolved,
                }];
                self.plan.select.distinct = true;
                self.plan.order_by = OrderByItems::default();
                self.push_down(ctx)?;
                Some(resolve(argument, &self.scope, ctx)?)
            }
            Some(argument) => Some(resolve(argument, &self.scope, ctx)?),
        };
        let call = RenderExpr::Aggregate(AggregateCall {
            function: aggregate.function,
            arg: arg.map(Box::new),
            distinct: false,
        });
        self.plan.select = SelectItems {
            items: vec![SelectItem {
                expression: call,
                col_alias: None,
            }],
            distinct: false,
        };
        self.plan.order_by = OrderByItems::default();
        self.projection.clear();
        self.aggregated = true;
        Ok(())
    }

    /// Columns the layer exposes: the explicit projection, the grouping
    /// keys, or every visible source column.
    fn output_projection(&self) -> Vec<ProjectedColumn> {
        if !self.projection.is_empty() {
            return self.projection.clone();
        }
        let mut out: Vec<ProjectedColumn> = Vec::new();
        if self.is_grouped() {
            for (canonical, expr) in &self.group_keys {
                let base = match canonical {
                    SqlExpr::Column(c) => c.column.as_str(),
                    _ => "Key",
                };
                let name = unique_name(base, |n| out.iter().any(|c| c.name == n));
                out.push(ProjectedColumn {
                    origin: Origin::Expression(canonical.clone()),
                    name,
                    expr: expr.clone(),
                });
            }
            return out;
        }
        for (host_alias, column, expr) in self.scope.visible_columns() {
            let name = unique_name(&column, |n| out.iter().any(|c| c.name == n));
            out.push(ProjectedColumn {
                origin: Origin::Source { host_alias, column },
                name,
                expr,
            });
        }
        out
    }

    fn tie_break(&self, columns: &[ProjectedColumn]) -> Vec<RenderExpr> {
        if self.is_grouped() {
            self.group_keys.iter().map(|(_, e)| e.clone()).collect()
        } else if self.plan.select.distinct {
            columns
                .iter()
                .filter(|c| c.origin != Origin::Hidden)
                .map(|c| c.expr.clone())
                .collect()
        } else {
            self.scope.row_key()
        }
    }

    /// Project `columns` and apply pending paging.
    fn finalize(
        self,
        columns: &[ProjectedColumn],
        ctx: &mut TranslationContext<'_>,
    ) -> Result<RenderPlan, RenderBuildError> {
        let request = PagingRequest {
            tie_break: self.tie_break(columns),
            skip: self.skip,
            take: self.take,
        };
        let mut plan = self.plan;
        plan.select.items = columns
            .iter()
            .map(|c| SelectItem::named(c.expr.clone(), &c.name))
            .collect();
        if request.is_empty() {
            Ok(plan)
        } else {
            apply_paging(plan, &request, ctx)
        }
    }

    fn finish(self, ctx: &mut TranslationContext<'_>) -> Result<BuiltQuery, RenderBuildError> {
        if self.aggregated {
            let columns = self.plan.output_columns();
            return Ok(BuiltQuery {
                plan: self.plan,
                columns,
            });
        }
        let projection = self.output_projection();
        let plan = self.finalize(&projection, ctx)?;
        let columns = plan.output_columns();
        Ok(BuiltQuery { plan, columns })
    }

    /// Wrap the layer into a derived table and continue on top of it.
    fn push_down(&mut self, ctx: &mut TranslationContext<'_>) -> Result<(), RenderBuildError> {
        let inner = std::mem::take(self);
        let paged = inner.is_paged();
        let ordering = inner.plan.order_by.0.clone();
        let old_scope = inner.scope.clone();

        let mut columns = inner.output_projection();
        for item in &ordering {
            if matches!(item.expression, RenderExpr::Constant(_) | RenderExpr::Parameter(_))
                || columns.iter().any(|c| c.expr == item.expression)
            {
                continue;
            }
            let name = unique_name("c", |n| columns.iter().any(|c| c.name == n));
            columns.push(ProjectedColumn {
                origin: Origin::Hidden,
                name,
                expr: item.expression.clone(),
            });
        }

        let mut plan = inner.finalize(&columns, ctx)?;
        if !paged {
            plan.order_by = OrderByItems::default();
        }
        let alias = ctx.allocate_alias("t");
        log::debug!("Layer pushed down into derived table '{}'", alias);

        let mut outer = RenderPlan::new(FromSource::Derived {
            plan: Box::new(plan),
            alias: alias.clone(),
        });
        outer.order_by = OrderByItems(
            ordering
                .into_iter()
                .map(|item| {
                    let expression = columns
                        .iter()
                        .find(|c| c.expr == item.expression)
                        .map(|c| derived_column(&alias, c))
                        .unwrap_or(item.expression);
                    OrderByItem {
                        expression,
                        order: item.order,
                    }
                })
                .collect(),
        );
        *self = Layer::over(outer, derived_scope(&old_scope, &columns, &alias));
        Ok(())
    }
}

fn derived_column(alias: &str, column: &ProjectedColumn) -> RenderExpr {
    RenderExpr::column(
        alias,
        &column.name,
        column.expr.sql_type(),
        column.expr.is_nullable(),
    )
}

fn same_column(a: &RenderExpr, b: &RenderExpr) -> bool {
    match (a.as_column(), b.as_column()) {
        (Some(x), Some(y)) => x.table_alias == y.table_alias && x.column == y.column,
        _ => a == b,
    }
}

/// Scope of the layer built on top of derived table `alias`.
fn derived_scope(old: &Scope, columns: &[ProjectedColumn], alias: &str) -> Scope {
    let mut scope = Scope::default();
    let mut synthetic = Vec::new();
    for column in columns {
        let out = derived_column(alias, column);
        match &column.origin {
            Origin::Source {
                host_alias,
                column: name,
            } => {
                if scope.source(host_alias).is_none() {
                    let previous = old.source(host_alias);
                    scope.sources.push(SourceBinding {
                        host_alias: host_alias.clone(),
                        columns: Vec::new(),
                        keys: previous.map(|b| b.keys.clone()).unwrap_or_default(),
                        nullable: false,
                        polymorphic: previous.and_then(|b| b.polymorphic.clone()),
                    });
                }
                if let Some(binding) = scope.source_mut(host_alias) {
                    binding.columns.push(BoundColumn {
                        name: name.clone(),
                        expr: out,
                    });
                }
            }
            Origin::Expression(canonical) => {
                scope.projection_matches.push((canonical.clone(), out.clone()));
                synthetic.push(BoundColumn {
                    name: column.name.clone(),
                    expr: out,
                });
            }
            Origin::Hidden => {}
        }
    }

    for (canonical, resolved) in &old.projection_matches {
        if scope.projection_matches.iter().any(|(c, _)| c == canonical) {
            continue;
        }
        if let Some(column) = columns.iter().find(|c| &c.expr == resolved) {
            scope
                .projection_matches
                .push((canonical.clone(), derived_column(alias, column)));
        }
    }

    for binding in &mut scope.sources {
        if let Some(poly) = binding.polymorphic.as_mut() {
            poly.discriminator = match poly.discriminator.take() {
                Some(literal @ RenderExpr::Constant(_)) => Some(literal),
                Some(discriminator) => columns
                    .iter()
                    .find(|c| same_column(&c.expr, &discriminator))
                    .map(|c| derived_column(alias, c)),
                None => None,
            };
        }
    }

    if !synthetic.is_empty() {
        scope.sources.push(SourceBinding {
            host_alias: String::new(),
            columns: synthetic,
            keys: Vec::new(),
            nullable: false,
            polymorphic: None,
        });
    }
    scope
}

fn is_correlated_source(source: &TableSource) -> bool {
    match source {
        TableSource::Subquery { query, .. } => !free_aliases(query).is_empty(),
        TableSource::SetOperation { queries, .. } => {
            queries.iter().any(|q| !free_aliases(q).is_empty())
        }
        TableSource::Table { .. } | TableSource::Polymorphic { .. } => false,
    }
}

fn reject_correlated(query: &QueryExpression) -> Result<(), RenderBuildError> {
    let free = free_aliases(query);
    if free.is_empty() {
        return Ok(());
    }
    Err(RenderBuildError::UnsupportedNodeKind(format!(
        "Derived table correlated with outer source(s) [{}]",
        free.into_iter().collect::<Vec<_>>().join(", ")
    )))
}

fn derived_binding(alias: &str, physical: &str, columns: &[OutputColumn]) -> SourceBinding {
    SourceBinding {
        host_alias: alias.to_string(),
        columns: columns
            .iter()
            .map(|c| BoundColumn {
                name: c.name.clone(),
                expr: RenderExpr::column(physical, &c.name, c.ty.clone(), c.nullable),
            })
            .collect(),
        keys: Vec::new(),
        nullable: false,
        polymorphic: None,
    }
}

fn bind_source(
    source: &TableSource,
    owner: &QueryExpression,
    following: &[QueryOperator],
    prunable: bool,
    ctx: &mut TranslationContext<'_>,
) -> Result<MaterializedSource, RenderBuildError> {
    if source.alias().is_empty() {
        return Err(RenderBuildError::InvalidQueryTree(
            "Source without an alias".to_string(),
        ));
    }
    match source {
        TableSource::Table {
            name,
            alias,
            columns,
            key,
        } => {
            let physical = ctx.allocate_alias(alias);
            let binding = SourceBinding {
                host_alias: alias.clone(),
                columns: columns
                    .iter()
                    .map(|c| BoundColumn {
                        name: c.name.clone(),
                        expr: RenderExpr::column(&physical, &c.name, c.ty.clone(), c.nullable),
                    })
                    .collect(),
                keys: key.clone(),
                nullable: false,
                polymorphic: None,
            };
            Ok(MaterializedSource {
                source: FromSource::Table {
                    name: name.clone(),
                    alias: physical,
                },
                binding,
                filter: None,
            })
        }
        TableSource::Subquery { query, alias } => {
            reject_correlated(query)?;
            let built = build_query(query, ctx)?;
            let physical = ctx.allocate_alias(alias);
            let binding = derived_binding(alias, &physical, &built.columns);
            Ok(MaterializedSource {
                source: FromSource::Derived {
                    plan: Box::new(built.plan),
                    alias: physical,
                },
                binding,
                filter: None,
            })
        }
        TableSource::SetOperation {
            kind,
            queries,
            alias,
        } => {
            let union_type = match kind {
                SetOperationKind::UnionAll => UnionType::All,
                SetOperationKind::Union => UnionType::Distinct,
                SetOperationKind::Intersect | SetOperationKind::Except => {
                    return Err(RenderBuildError::UnsupportedNodeKind(format!(
                        "{:?} is not available in Jet SQL",
                        kind
                    )))
                }
            };
            if queries.is_empty() {
                return Err(RenderBuildError::InvalidQueryTree(
                    "Set operation without branches".to_string(),
                ));
            }
            let mut input = Vec::with_capacity(queries.len());
            let mut columns: Option<Vec<OutputColumn>> = None;
            for query in queries {
                reject_correlated(query)?;
                let built = build_query(query, ctx)?;
                match columns.as_mut() {
                    None => columns = Some(built.columns.clone()),
                    Some(existing) => {
                        if existing.len() != built.columns.len() {
                            return Err(RenderBuildError::InvalidQueryTree(format!(
                                "Set operation branches project {} and {} columns",
                                existing.len(),
                                built.columns.len()
                            )));
                        }
                        for (column, other) in existing.iter_mut().zip(&built.columns) {
                            column.nullable |= other.nullable;
                        }
                    }
                }
                let mut plan = built.plan;
                if plan.is_limited() {
                    let wrapper = ctx.allocate_alias("t");
                    plan = plan.into_derived(&wrapper, &built.columns);
                } else {
                    plan.order_by = OrderByItems::default();
                }
                input.push(plan);
            }
            let columns = columns.unwrap_or_default();
            let physical = ctx.allocate_alias(alias);
            let binding = derived_binding(alias, &physical, &columns);
            Ok(MaterializedSource {
                source: FromSource::Union {
                    union: UnionItems { input, union_type },
                    alias: physical,
                },
                binding,
                filter: None,
            })
        }
        TableSource::Polymorphic { alias, hierarchy } => {
            tpc_union::materialize(alias, hierarchy, owner, following, prunable, ctx)
        }
    }
}

fn resolve_ordering(
    items: &[OrderingItem],
    scope: &Scope,
    ctx: &mut TranslationContext<'_>,
) -> Result<Vec<OrderByItem>, RenderBuildError> {
    items
        .iter()
        .map(|item| {
            Ok(OrderByItem {
                expression: resolve(&item.expression, scope, ctx)?,
                order: if item.descending {
                    OrderByOrder::Desc
                } else {
                    OrderByOrder::Asc
                },
            })
        })
        .collect()
}

fn resolve_boxed(
    expr: &SqlExpr,
    scope: &Scope,
    ctx: &mut TranslationContext<'_>,
) -> Result<Box<RenderExpr>, RenderBuildError> {
    Ok(Box::new(resolve(expr, scope, ctx)?))
}

fn resolve_all(
    exprs: &[SqlExpr],
    scope: &Scope,
    ctx: &mut TranslationContext<'_>,
) -> Result<Vec<RenderExpr>, RenderBuildError> {
    exprs.iter().map(|e| resolve(e, scope, ctx)).collect()
}

/// Resolve a host expression against `scope`, falling back to the enclosing
/// query scopes for correlated references.
pub(crate) fn resolve(
    expr: &SqlExpr,
    scope: &Scope,
    ctx: &mut TranslationContext<'_>,
) -> Result<RenderExpr, RenderBuildError> {
    if !matches!(
        expr,
        SqlExpr::Column(_) | SqlExpr::Constant(_) | SqlExpr::Parameter(_)
    ) {
        if let Some(projected) = scope.match_projection(expr) {
            return Ok(projected);
        }
    }
    Ok(match expr {
        SqlExpr::Column(column) => resolve_column(column, scope, ctx)?,
        SqlExpr::Constant(c) => RenderExpr::Constant(c.clone()),
        SqlExpr::Parameter(p) => RenderExpr::Parameter(p.clone()),
        SqlExpr::Binary(b) => RenderExpr::Binary(BinaryExpr {
            op: b.op,
            left: resolve_boxed(&b.left, scope, ctx)?,
            right: resolve_boxed(&b.right, scope, ctx)?,
            ty: b.ty.clone(),
            null_expanded: false,
        }),
        SqlExpr::Unary(u) => RenderExpr::Unary(UnaryExpr {
            op: u.op,
            operand: resolve_boxed(&u.operand, scope, ctx)?,
        }),
        SqlExpr::Function(f) => RenderExpr::Function(FunctionCall {
            function: f.function,
            args: resolve_all(&f.args, scope, ctx)?,
            ty: f.ty.clone(),
        }),
        SqlExpr::Conditional(c) => RenderExpr::Conditional(Conditional {
            test: resolve_boxed(&c.test, scope, ctx)?,
            then: resolve_boxed(&c.then, scope, ctx)?,
            otherwise: resolve_boxed(&c.otherwise, scope, ctx)?,
        }),
        SqlExpr::Case(c) => RenderExpr::Case(CaseChain {
            operand: match &c.operand {
                Some(operand) => Some(resolve_boxed(operand, scope, ctx)?),
                None => None,
            },
            whens: c
                .whens
                .iter()
                .map(|w| {
                    Ok(CaseWhen {
                        when: resolve(&w.when, scope, ctx)?,
                        then: resolve(&w.then, scope, ctx)?,
                    })
                })
                .collect::<Result<Vec<_>, RenderBuildError>>()?,
            otherwise: match &c.otherwise {
                Some(otherwise) => Some(resolve_boxed(otherwise, scope, ctx)?),
                None => None,
            },
        }),
        SqlExpr::Coalesce(c) => RenderExpr::Coalesce(Coalesce {
            left: resolve_boxed(&c.left, scope, ctx)?,
            right: resolve_boxed(&c.right, scope, ctx)?,
        }),
        SqlExpr::Convert(c) => RenderExpr::Convert(Convert {
            operand: resolve_boxed(&c.operand, scope, ctx)?,
            ty: c.ty.clone(),
        }),
        SqlExpr::Like(l) => RenderExpr::Like(LikeExpr {
            item: resolve_boxed(&l.item, scope, ctx)?,
            pattern: resolve_boxed(&l.pattern, scope, ctx)?,
            negated: l.negated,
        }),
        SqlExpr::In(i) => RenderExpr::In(InList {
            item: resolve_boxed(&i.item, scope, ctx)?,
            values: resolve_all(&i.values, scope, ctx)?,
            negated: i.negated,
            null_expanded: false,
        }),
        SqlExpr::InSubquery {
            item,
            query,
            negated,
        } => {
            let item = resolve_boxed(item, scope, ctx)?;
            let built = nested_query(query, scope, ctx)?;
            if built.columns.len() != 1 {
                return Err(RenderBuildError::InvalidQueryTree(format!(
                    "IN subquery projects {} columns",
                    built.columns.len()
                )));
            }
            RenderExpr::InSubquery {
                item,
                plan: Box::new(unordered(built.plan)),
                negated: *negated,
            }
        }
        SqlExpr::Exists { query, negated } => {
            let built = nested_query(query, scope, ctx)?;
            RenderExpr::Exists {
                plan: Box::new(exists_projection(built.plan)),
                negated: *negated,
            }
        }
        SqlExpr::ScalarSubquery { query, ty } => {
            let built = nested_query(query, scope, ctx)?;
            if built.plan.select.items.len() != 1 {
                return Err(RenderBuildError::InvalidQueryTree(format!(
                    "Scalar subquery projects {} columns",
                    built.plan.select.items.len()
                )));
            }
            RenderExpr::ScalarSubquery {
                plan: Box::new(unordered(built.plan)),
                ty: ty.clone(),
            }
        }
        SqlExpr::Aggregate(a) => RenderExpr::Aggregate(AggregateCall {
            function: a.function,
            arg: match &a.arg {
                Some(arg) => Some(resolve_boxed(arg, scope, ctx)?),
                None => None,
            },
            distinct: a.distinct,
        }),
        SqlExpr::TypeIs { table, types } => resolve_type_test(table, types, scope, ctx)?,
    })
}

fn resolve_column(
    column: &ColumnRef,
    scope: &Scope,
    ctx: &TranslationContext<'_>,
) -> Result<RenderExpr, RenderBuildError> {
    let found = scope.lookup_column(column).or_else(|| {
        let outer = ctx.outer_scopes().find_map(|s| s.lookup_column(column));
        if outer.is_some() {
            log::trace!("Correlated reference {}.{}", column.table, column.column);
        }
        outer
    });
    match found {
        Some(expr) => Ok(retype(expr, column)),
        None if scope.has_alias(&column.table)
            || ctx.outer_scopes().any(|s| s.has_alias(&column.table)) =>
        {
            Err(RenderBuildError::UnresolvedColumn {
                table: column.table.clone(),
                column: column.column.clone(),
            })
        }
        None => Err(RenderBuildError::UnknownAlias(column.table.clone())),
    }
}

/// Keep the host's richer type (enums) when it shares the bound storage type.
fn retype(expr: RenderExpr, column: &ColumnRef) -> RenderExpr {
    match expr {
        RenderExpr::Column(mut bound) => {
            if bound.ty.storage() == column.ty.storage() {
                bound.ty = column.ty.clone();
            }
            bound.nullable |= column.nullable;
            RenderExpr::Column(bound)
        }
        other => other,
    }
}

fn resolve_type_test(
    table: &str,
    types: &[String],
    scope: &Scope,
    ctx: &TranslationContext<'_>,
) -> Result<RenderExpr, RenderBuildError> {
    let poly = scope
        .polymorphic(table)
        .or_else(|| ctx.outer_scopes().find_map(|s| s.polymorphic(table)));
    match poly {
        Some(poly) => tpc_union::type_test(poly, types),
        None if scope.has_alias(table) || ctx.outer_scopes().any(|s| s.has_alias(table)) => {
            Err(RenderBuildError::InvalidQueryTree(format!(
                "Type test on non-polymorphic source '{}'",
                table
            )))
        }
        None => Err(RenderBuildError::UnknownAlias(table.to_string())),
    }
}

fn nested_query(
    query: &QueryExpression,
    scope: &Scope,
    ctx: &mut TranslationContext<'_>,
) -> Result<BuiltQuery, RenderBuildError> {
    ctx.push_outer_scope(scope.clone());
    let built = build_query(query, ctx);
    ctx.pop_outer_scope();
    built
}

fn unordered(mut plan: RenderPlan) -> RenderPlan {
    if !plan.is_limited() {
        plan.order_by = OrderByItems::default();
    }
    plan
}

/// `EXISTS (SELECT 1 ...)` unless the projection decides which rows exist.
fn exists_projection(mut plan: RenderPlan) -> RenderPlan {
    let keeps_projection = plan.select.distinct
        || plan.is_limited()
        || !plan.group_by.0.is_empty()
        || plan
            .select
            .items
            .iter()
            .any(|item| matches!(item.expression, RenderExpr::Aggregate(_)));
    if keeps_projection {
        return plan;
    }
    plan.select.items = vec![SelectItem {
        expression: RenderExpr::constant(Value::Int32(1)),
        col_alias: None,
    }];
    plan.order_by = OrderByItems::default();
    plan
}
