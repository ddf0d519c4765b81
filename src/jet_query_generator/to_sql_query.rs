//! Statement rendering: `RenderPlan` -> Jet SQL text.
//!
//! Clauses go on separate lines, derived tables are indented four spaces and
//! joins are nested with parentheses the way Jet requires:
//! `FROM ((a INNER JOIN b ON ..) INNER JOIN c ON ..)`.

use crate::render_plan::context::TranslationContext;
use crate::render_plan::errors::RenderBuildError;
use crate::render_plan::render_expr::RenderExpr;
use crate::render_plan::{
    FilterItems, FromGroup, FromGroups, FromSource, GroupByExpressions, Join, JoinType,
    OffsetFetch, OrderByItems, OrderByOrder, RenderPlan, SelectItem, SelectItems, ToSql,
    UnionItems, UnionType,
};

use super::common::format_identifier;
use super::to_sql::{lower_predicate, lower_value, parenthesized_subquery};

type RenderResult = Result<String, RenderBuildError>;

pub fn render_plan_to_sql(plan: &RenderPlan, ctx: &mut TranslationContext<'_>) -> RenderResult {
    plan.to_sql(ctx)
}

impl ToSql for RenderPlan {
    fn to_sql(&self, ctx: &mut TranslationContext<'_>) -> RenderResult {
        let mut sql = String::from("SELECT ");
        if self.select.distinct {
            sql.push_str("DISTINCT ");
        }
        if let Some(limit) = &self.limit.0 {
            sql.push_str(&render_top(limit, ctx)?);
        }
        sql.push_str(&self.select.to_sql(ctx)?);
        sql.push_str(&self.from.to_sql(ctx)?);
        sql.push_str(&self.filters.to_sql(ctx)?);
        sql.push_str(&self.group_by.to_sql(ctx)?);
        if let Some(having) = &self.having_clause {
            sql.push_str(&format!("\nHAVING {}", lower_predicate(having, ctx)?));
        }
        sql.push_str(&self.order_by.to_sql(ctx)?);
        if let Some(offset) = &self.offset {
            sql.push_str(&offset.to_sql(ctx)?);
        }
        Ok(sql)
    }
}

/// `TOP n `. Jet only accepts a literal here unless the profile says otherwise.
fn render_top(limit: &RenderExpr, ctx: &mut TranslationContext<'_>) -> RenderResult {
    match limit {
        RenderExpr::Parameter(p) if !ctx.profile().supports_parameterized_top => {
            let value = p.value.as_i64().ok_or_else(|| {
                RenderBuildError::InvalidQueryTree(format!(
                    "TOP parameter '{}' has no integral value",
                    p.name
                ))
            })?;
            log::debug!("Inlining TOP parameter {} = {}", p.name, value);
            Ok(format!("TOP {} ", value))
        }
        other => Ok(format!("TOP {} ", lower_value(other, ctx)?)),
    }
}

impl ToSql for SelectItems {
    fn to_sql(&self, ctx: &mut TranslationContext<'_>) -> RenderResult {
        if self.items.is_empty() {
            return Ok("*".to_string());
        }
        let items = self
            .items
            .iter()
            .map(|item| item.to_sql(ctx))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items.join(", "))
    }
}

impl ToSql for SelectItem {
    fn to_sql(&self, ctx: &mut TranslationContext<'_>) -> RenderResult {
        let expr = lower_value(&self.expression, ctx)?;
        match &self.col_alias {
            // `t`.`Name` AS `Name` is redundant
            Some(alias) if self.expression.as_column().map(|c| &c.column) != Some(alias) => Ok(
                format!("{} AS {}", expr, format_identifier(alias, ctx.profile())),
            ),
            _ => Ok(expr),
        }
    }
}

impl ToSql for FromGroups {
    fn to_sql(&self, ctx: &mut TranslationContext<'_>) -> RenderResult {
        if self.0.is_empty() {
            return Ok(String::new());
        }
        let groups = self
            .0
            .iter()
            .map(|g| g.to_sql(ctx))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(format!("\nFROM {}", groups.join(", ")))
    }
}

impl ToSql for FromGroup {
    fn to_sql(&self, ctx: &mut TranslationContext<'_>) -> RenderResult {
        let mut sql = "(".repeat(self.joins.len().saturating_sub(1));
        sql.push_str(&self.source.to_sql(ctx)?);
        let last = self.joins.len().saturating_sub(1);
        for (i, join) in self.joins.iter().enumerate() {
            sql.push_str(&join.to_sql(ctx)?);
            if i < last {
                sql.push(')');
            }
        }
        Ok(sql)
    }
}

impl ToSql for Join {
    fn to_sql(&self, ctx: &mut TranslationContext<'_>) -> RenderResult {
        let keyword = match self.join_type {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
        };
        let source = self.source.to_sql(ctx)?;
        let on = lower_predicate(&self.joining_on, ctx)?;
        Ok(format!("\n{} {} ON {}", keyword, source, on))
    }
}

impl ToSql for FromSource {
    fn to_sql(&self, ctx: &mut TranslationContext<'_>) -> RenderResult {
        let profile = ctx.profile();
        match self {
            FromSource::Table { name, alias } => Ok(format!(
                "{} AS {}",
                format_identifier(name, profile),
                format_identifier(alias, profile)
            )),
            FromSource::Derived { plan, alias } => {
                let inner = plan.to_sql(ctx)?;
                Ok(format!(
                    "{} AS {}",
                    parenthesized_subquery(&inner),
                    format_identifier(alias, profile)
                ))
            }
            FromSource::Union { union, alias } => {
                let inner = union.to_sql(ctx)?;
                Ok(format!(
                    "{} AS {}",
                    parenthesized_subquery(&inner),
                    format_identifier(alias, profile)
                ))
            }
        }
    }
}

impl ToSql for UnionItems {
    fn to_sql(&self, ctx: &mut TranslationContext<'_>) -> RenderResult {
        let separator = match self.union_type {
            UnionType::All => "\nUNION ALL\n",
            UnionType::Distinct => "\nUNION\n",
        };
        let branches = self
            .input
            .iter()
            .map(|plan| plan.to_sql(ctx))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(branches.join(separator))
    }
}

impl ToSql for FilterItems {
    fn to_sql(&self, ctx: &mut TranslationContext<'_>) -> RenderResult {
        match &self.0 {
            Some(filter) => Ok(format!("\nWHERE {}", lower_predicate(filter, ctx)?)),
            None => Ok(String::new()),
        }
    }
}

impl ToSql for GroupByExpressions {
    fn to_sql(&self, ctx: &mut TranslationContext<'_>) -> RenderResult {
        if self.0.is_empty() {
            return Ok(String::new());
        }
        let keys = self
            .0
            .iter()
            .map(|k| lower_value(k, ctx))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(format!("\nGROUP BY {}", keys.join(", ")))
    }
}

impl ToSql for OrderByItems {
    fn to_sql(&self, ctx: &mut TranslationContext<'_>) -> RenderResult {
        if self.0.is_empty() {
            return Ok(String::new());
        }
        let mut items = Vec::with_capacity(self.0.len());
        for item in &self.0 {
            // Jet rejects constant ORDER BY items
            if matches!(item.expression, RenderExpr::Constant(_) | RenderExpr::Parameter(_)) {
                continue;
            }
            let expr = lower_value(&item.expression, ctx)?;
            items.push(match item.order {
                OrderByOrder::Asc => expr,
                OrderByOrder::Desc => format!("{} DESC", expr),
            });
        }
        if items.is_empty() {
            return Ok(String::new());
        }
        Ok(format!("\nORDER BY {}", items.join(", ")))
    }
}

impl ToSql for OffsetFetch {
    fn to_sql(&self, ctx: &mut TranslationContext<'_>) -> RenderResult {
        let offset = lower_value(&self.offset, ctx)?;
        let mut sql = format!("\nOFFSET {} ROWS", offset);
        if let Some(fetch) = &self.fetch {
            sql.push_str(&format!(" FETCH NEXT {} ROWS ONLY", lower_value(fetch, ctx)?));
        }
        Ok(sql)
    }
}
