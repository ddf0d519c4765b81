//! Resolved statement model.
//!
//! The plan builder folds the canonical operator pipeline into [`RenderPlan`]
//! layers (pushing layers down into derived tables where needed); the Jet
//! generator renders the result through [`ToSql`].

use std::collections::HashSet;
use std::fmt;

pub mod alias_allocator;
pub mod context;
pub mod errors;
pub mod pagination;
pub mod plan_builder;
pub mod render_expr;
pub mod scope;
pub mod tpc_union;

#[cfg(test)]
mod tests;

use crate::query_tree::{SqlType, TypedExpr};

use context::TranslationContext;
use errors::RenderBuildError;
use render_expr::RenderExpr;

pub trait ToSql {
    fn to_sql(&self, ctx: &mut TranslationContext<'_>) -> Result<String, RenderBuildError>;
}

#[derive(Debug, PartialEq, Clone, Default)]
pub struct RenderPlan {
    pub select: SelectItems,
    pub from: FromGroups,
    pub filters: FilterItems,
    pub group_by: GroupByExpressions,
    pub having_clause: Option<RenderExpr>,
    pub order_by: OrderByItems,
    /// `TOP n`
    pub limit: LimitItem,
    /// Native `OFFSET .. FETCH`, only on profiles that support it.
    pub offset: Option<OffsetFetch>,
}

#[derive(Debug, PartialEq, Clone, Default)]
pub struct SelectItems {
    pub items: Vec<SelectItem>,
    pub distinct: bool,
}

#[derive(Debug, PartialEq, Clone)]
pub struct SelectItem {
    pub expression: RenderExpr,
    pub col_alias: Option<String>,
}

#[derive(Debug, PartialEq, Clone, Default)]
pub struct FromGroups(pub Vec<FromGroup>);

/// One comma-separated element of the FROM clause: a source and the joins
/// nested onto it.
#[derive(Debug, PartialEq, Clone)]
pub struct FromGroup {
    pub source: FromSource,
    pub joins: Vec<Join>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum FromSource {
    Table { name: String, alias: String },
    Derived { plan: Box<RenderPlan>, alias: String },
    Union { union: UnionItems, alias: String },
}

impl FromSource {
    pub fn alias(&self) -> &str {
        match self {
            FromSource::Table { alias, .. }
            | FromSource::Derived { alias, .. }
            | FromSource::Union { alias, .. } => alias,
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct UnionItems {
    pub input: Vec<RenderPlan>,
    pub union_type: UnionType,
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum UnionType {
    Distinct,
    All,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Join {
    pub source: FromSource,
    pub join_type: JoinType,
    pub joining_on: RenderExpr,
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum JoinType {
    Inner,
    Left,
}

#[derive(Debug, PartialEq, Clone, Default)]
pub struct FilterItems(pub Option<RenderExpr>);

#[derive(Debug, PartialEq, Clone, Default)]
pub struct GroupByExpressions(pub Vec<RenderExpr>);

#[derive(Debug, PartialEq, Clone, Default)]
pub struct OrderByItems(pub Vec<OrderByItem>);

#[derive(Debug, PartialEq, Clone)]
pub struct OrderByItem {
    pub expression: RenderExpr,
    pub order: OrderByOrder,
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum OrderByOrder {
    Asc,
    Desc,
}

impl OrderByOrder {
    pub fn reversed(self) -> Self {
        match self {
            OrderByOrder::Asc => OrderByOrder::Desc,
            OrderByOrder::Desc => OrderByOrder::Asc,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Default)]
pub struct LimitItem(pub Option<RenderExpr>);

#[derive(Debug, PartialEq, Clone)]
pub struct OffsetFetch {
    pub offset: RenderExpr,
    pub fetch: Option<RenderExpr>,
}

/// Named output column of a rendered `SELECT`.
#[derive(Debug, PartialEq, Clone)]
pub struct OutputColumn {
    pub name: String,
    pub ty: SqlType,
    pub nullable: bool,
}

impl SelectItem {
    pub fn named(expression: RenderExpr, name: &str) -> Self {
        SelectItem {
            expression,
            col_alias: Some(name.to_string()),
        }
    }

    /// Name the column has outside the `SELECT`, if any.
    pub fn output_name(&self) -> Option<String> {
        self.col_alias
            .clone()
            .or_else(|| self.expression.as_column().map(|c| c.column.clone()))
    }
}

/// `base`, or `base0`, `base1`, ... when `taken` already claims it.
pub fn unique_name(base: &str, taken: impl Fn(&str) -> bool) -> String {
    if !taken(base) {
        return base.to_string();
    }
    (0..)
        .map(|i| format!("{}{}", base, i))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| base.to_string())
}

impl RenderPlan {
    pub fn new(source: FromSource) -> Self {
        RenderPlan {
            select: SelectItems::default(),
            from: FromGroups(vec![FromGroup {
                source,
                joins: Vec::new(),
            }]),
            filters: FilterItems::default(),
            group_by: GroupByExpressions::default(),
            having_clause: None,
            order_by: OrderByItems::default(),
            limit: LimitItem::default(),
            offset: None,
        }
    }

    pub fn is_limited(&self) -> bool {
        self.limit.0.is_some() || self.offset.is_some()
    }

    pub fn output_columns(&self) -> Vec<OutputColumn> {
        self.select
            .items
            .iter()
            .filter_map(|item| {
                item.output_name().map(|name| OutputColumn {
                    name,
                    ty: item.expression.sql_type(),
                    nullable: item.expression.is_nullable(),
                })
            })
            .collect()
    }

    /// `SELECT alias.c1, alias.c2 .. FROM (self) AS alias`
    pub fn into_derived(self, alias: &str, columns: &[OutputColumn]) -> RenderPlan {
        let mut outer = RenderPlan::new(FromSource::Derived {
            plan: Box::new(self),
            alias: alias.to_string(),
        });
        outer.select.items = columns
            .iter()
            .map(|c| {
                SelectItem::named(
                    RenderExpr::column(alias, &c.name, c.ty.clone(), c.nullable),
                    &c.name,
                )
            })
            .collect();
        outer
    }

    /// Output name under which `expr` is selected, adding a select item when
    /// it is not projected yet.
    pub fn ensure_projected(&mut self, expr: &RenderExpr) -> String {
        if let Some(name) = self
            .select
            .items
            .iter()
            .find(|item| &item.expression == expr)
            .and_then(SelectItem::output_name)
        {
            return name;
        }
        let taken: Vec<String> = self
            .select
            .items
            .iter()
            .filter_map(SelectItem::output_name)
            .collect();
        let name = unique_name("c", |n| taken.iter().any(|t| t == n));
        self.select.items.push(SelectItem::named(expr.clone(), &name));
        name
    }

    /// AND `predicate` into the WHERE clause.
    pub fn add_filter(&mut self, predicate: RenderExpr) {
        self.filters = FilterItems(RenderExpr::conjunction(
            self.filters.0.take().into_iter().chain(Some(predicate)),
        ));
    }

    /// Every physical alias the statement declares, nested plans included,
    /// in declaration order.
    pub fn declared_aliases(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_aliases(&mut out);
        out
    }

    fn collect_aliases(&self, out: &mut Vec<String>) {
        for group in &self.from.0 {
            collect_source_aliases(&group.source, out);
            for join in &group.joins {
                collect_source_aliases(&join.source, out);
                collect_expr_aliases(&join.joining_on, out);
            }
        }
        for item in &self.select.items {
            collect_expr_aliases(&item.expression, out);
        }
        let exprs = self
            .filters
            .0
            .iter()
            .chain(self.group_by.0.iter())
            .chain(self.having_clause.iter())
            .chain(self.order_by.0.iter().map(|o| &o.expression));
        for expr in exprs {
            collect_expr_aliases(expr, out);
        }
    }

    /// Fails with `AliasCollision` if any alias is declared twice.
    pub fn check_unique_aliases(&self) -> Result<(), RenderBuildError> {
        let mut seen = HashSet::new();
        for alias in self.declared_aliases() {
            if !seen.insert(alias.clone()) {
                return Err(RenderBuildError::AliasCollision(alias));
            }
        }
        Ok(())
    }
}

fn collect_source_aliases(source: &FromSource, out: &mut Vec<String>) {
    out.push(source.alias().to_string());
    match source {
        FromSource::Table { .. } => {}
        FromSource::Derived { plan, .. } => plan.collect_aliases(out),
        FromSource::Union { union, .. } => {
            for branch in &union.input {
                branch.collect_aliases(out);
            }
        }
    }
}

fn collect_expr_aliases(expr: &RenderExpr, out: &mut Vec<String>) {
    match expr {
        RenderExpr::InSubquery { item, plan, .. } => {
            collect_expr_aliases(item, out);
            plan.collect_aliases(out);
        }
        RenderExpr::Exists { plan, .. } | RenderExpr::ScalarSubquery { plan, .. } => {
            plan.collect_aliases(out)
        }
        RenderExpr::Binary(b) => {
            collect_expr_aliases(&b.left, out);
            collect_expr_aliases(&b.right, out);
        }
        RenderExpr::Unary(u) => collect_expr_aliases(&u.operand, out),
        RenderExpr::Function(f) => f.args.iter().for_each(|a| collect_expr_aliases(a, out)),
        RenderExpr::Conditional(c) => {
            collect_expr_aliases(&c.test, out);
            collect_expr_aliases(&c.then, out);
            collect_expr_aliases(&c.otherwise, out);
        }
        RenderExpr::Case(c) => {
            for w in &c.whens {
                collect_expr_aliases(&w.when, out);
                collect_expr_aliases(&w.then, out);
            }
            if let Some(o) = &c.otherwise {
                collect_expr_aliases(o, out);
            }
        }
        RenderExpr::Coalesce(c) => {
            collect_expr_aliases(&c.left, out);
            collect_expr_aliases(&c.right, out);
        }
        RenderExpr::Convert(c) => collect_expr_aliases(&c.operand, out),
        RenderExpr::Like(l) => {
            collect_expr_aliases(&l.item, out);
            collect_expr_aliases(&l.pattern, out);
        }
        RenderExpr::In(i) => {
            collect_expr_aliases(&i.item, out);
            i.values.iter().for_each(|v| collect_expr_aliases(v, out));
        }
        RenderExpr::Aggregate(a) => {
            if let Some(arg) = &a.arg {
                collect_expr_aliases(arg, out);
            }
        }
        RenderExpr::Column(_) | RenderExpr::Constant(_) | RenderExpr::Parameter(_) => {}
    }
}

impl fmt::Display for RenderPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "---- RenderPlan ----")?;
        writeln!(f, "\nSELECT: {:?}", self.select)?;
        writeln!(f, "\nFROM: {:?}", self.from)?;
        writeln!(f, "\nFILTERS: {:?}", self.filters)?;
        writeln!(f, "\nGROUP BY: {:?}", self.group_by)?;
        writeln!(f, "\nHAVING: {:?}", self.having_clause)?;
        writeln!(f, "\nORDER BY: {:?}", self.order_by)?;
        writeln!(f, "\nTOP: {:?}", self.limit)?;
        writeln!(f, "\nOFFSET: {:?}", self.offset)?;
        writeln!(f, "-------------------")
    }
}
