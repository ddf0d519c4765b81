//! Skip/Take lowering.
//!
//! Jet only knows `TOP n`. Depending on the request and the profile a paged
//! layer becomes:
//!
//! - take only: `SELECT TOP k ..`
//! - native offset (ACE 16+): `ORDER BY .. OFFSET s ROWS FETCH NEXT k ROWS ONLY`
//! - nested top: `TOP k` over the reversed `TOP (s + k)`, ordered again outside
//! - row number (default): a derived table whose rows carry a correlated
//!   `COUNT(*)` sequence column, filtered and ordered by it outside:
//!
//! ```text
//! SELECT `t`.`Nickname`, `t`.`FullName`
//! FROM (
//!     SELECT `g`.`Nickname`, `g`.`FullName`, (
//!         SELECT COUNT(*)
//!         FROM `Gears` AS `g0`
//!         WHERE `g0`.`FullName` < `g`.`FullName` OR (`g0`.`FullName` = `g`.`FullName` AND `g0`.`Nickname` <= `g`.`Nickname`)
//!     ) AS `row`
//!     FROM `Gears` AS `g`
//! ) AS `t`
//! WHERE `t`.`row` >= 2 AND `t`.`row` <= 3
//! ORDER BY `t`.`row`
//! ```
//!
//! Every ordering is completed with tie-break keys so the row order is total.
//! Jet sorts NULLs first, so the correlated comparison chain is null-safe in
//! that direction.

use std::collections::HashMap;

use crate::dialect::SkipTakeStrategy;
use crate::query_tree::{BinaryOperator, PagingValue, ParameterRef, SqlType, TypedExpr, Value};

use super::context::{TranslationContext, TranslationWarning};
use super::errors::RenderBuildError;
use super::render_expr::RenderExpr;
use super::{
    unique_name, FilterItems, FromGroup, FromGroups, FromSource, GroupByExpressions, Join,
    LimitItem, OffsetFetch, OrderByItem, OrderByItems, OrderByOrder, RenderPlan, SelectItem,
    SelectItems, UnionItems,
};

const ROW_COLUMN: &str = "row";

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PagingRequest {
    pub skip: Option<PagingValue>,
    pub take: Option<PagingValue>,
    /// Keys completing the layer's ordering into a total order.
    pub tie_break: Vec<RenderExpr>,
}

impl PagingRequest {
    pub fn is_empty(&self) -> bool {
        self.skip.is_none() && self.take.is_none()
    }
}

/// Apply `request` to a finished layer. The output columns of the returned
/// plan are exactly those of `plan`.
pub fn apply_paging(
    mut plan: RenderPlan,
    request: &PagingRequest,
    ctx: &mut TranslationContext<'_>,
) -> Result<RenderPlan, RenderBuildError> {
    for value in request.skip.iter().chain(request.take.iter()) {
        if value.value() < 0 {
            return Err(RenderBuildError::InvalidQueryTree(format!(
                "Negative paging count {:?}",
                value
            )));
        }
    }

    let skip = request
        .skip
        .as_ref()
        .filter(|s| !matches!(s, PagingValue::Literal(0)));
    let take = request.take.as_ref();

    if let Some(PagingValue::Literal(0)) = take {
        log::debug!("Take(0): replacing the row limit with a false filter");
        plan.add_filter(RenderExpr::boolean(false));
        return Ok(plan);
    }

    match (skip, take) {
        (None, None) => Ok(plan),
        (None, Some(take)) => {
            if ctx.profile().top_returns_ties && !plan.order_by.0.is_empty() {
                plan.order_by = OrderByItems(total_order(&plan, &request.tie_break, false, ctx));
            }
            plan.limit = LimitItem(Some(paging_expr(take)));
            Ok(plan)
        }
        (Some(skip), take) => {
            let profile = ctx.profile();
            if profile.supports_offset_fetch {
                log::debug!("Paging with native OFFSET/FETCH");
                plan.order_by = OrderByItems(total_order(&plan, &request.tie_break, true, ctx));
                plan.offset = Some(OffsetFetch {
                    offset: paging_expr(skip),
                    fetch: take.map(paging_expr),
                });
                return Ok(plan);
            }
            match (profile.skip_take_strategy, take) {
                (SkipTakeStrategy::NestedTop, Some(take)) => {
                    nested_top(plan, skip, take, &request.tie_break, ctx)
                }
                _ => row_number(plan, skip, take, &request.tie_break, ctx),
            }
        }
    }
}

fn int_value(value: i64) -> Value {
    match i32::try_from(value) {
        Ok(v) => Value::Int32(v),
        Err(_) => Value::Int64(value),
    }
}

fn checked_sum(a: i64, b: i64) -> Result<i64, RenderBuildError> {
    a.checked_add(b).ok_or_else(|| {
        RenderBuildError::InvalidQueryTree(format!("Paging bound {} + {} overflows", a, b))
    })
}

fn paging_expr(value: &PagingValue) -> RenderExpr {
    match value {
        PagingValue::Literal(v) => RenderExpr::constant(int_value(*v)),
        PagingValue::Parameter { name, value } => {
            let value = int_value(*value);
            RenderExpr::Parameter(ParameterRef {
                name: name.clone(),
                ty: value.natural_type(),
                value,
            })
        }
    }
}

fn describe(expr: &RenderExpr) -> String {
    match expr.as_column() {
        Some(c) => format!("{}.{}", c.table_alias, c.column),
        None => format!("{:?}", expr),
    }
}

/// The layer's ordering followed by the tie-break keys it does not already
/// contain. Skipping rows of an unordered layer is reported.
fn total_order(
    plan: &RenderPlan,
    tie_break: &[RenderExpr],
    skipping: bool,
    ctx: &mut TranslationContext<'_>,
) -> Vec<OrderByItem> {
    let mut items = plan.order_by.0.clone();
    if items.is_empty() && skipping {
        ctx.warn(TranslationWarning::AmbiguousPagingOrdering {
            tie_break: tie_break.iter().map(describe).collect(),
        });
    }
    for key in tie_break {
        if !items.iter().any(|item| &item.expression == key) {
            items.push(OrderByItem {
                expression: key.clone(),
                order: OrderByOrder::Asc,
            });
        }
    }
    items
}

fn remap_order(keys: &[OrderByItem], names: &[String], alias: &str, reverse: bool) -> OrderByItems {
    OrderByItems(
        keys.iter()
            .zip(names)
            .map(|(key, name)| OrderByItem {
                expression: RenderExpr::column(
                    alias,
                    name,
                    key.expression.sql_type(),
                    key.expression.is_nullable(),
                ),
                order: if reverse { key.order.reversed() } else { key.order },
            })
            .collect(),
    )
}

/// `TOP k` over the reversed `TOP (s + k)`. Exact only when the layer has at
/// least `s + k` rows.
fn nested_top(
    mut plan: RenderPlan,
    skip: &PagingValue,
    take: &PagingValue,
    tie_break: &[RenderExpr],
    ctx: &mut TranslationContext<'_>,
) -> Result<RenderPlan, RenderBuildError> {
    let keys = total_order(&plan, tie_break, true, ctx);
    let visible = plan.output_columns();
    let names: Vec<String> = keys
        .iter()
        .map(|key| plan.ensure_projected(&key.expression))
        .collect();

    let total = checked_sum(skip.value(), take.value())?;
    if matches!(skip, PagingValue::Parameter { .. }) || matches!(take, PagingValue::Parameter { .. }) {
        log::debug!("Nested TOP inlines paging parameters as TOP {}", total);
    }
    plan.order_by = OrderByItems(keys.clone());
    plan.limit = LimitItem(Some(RenderExpr::constant(int_value(total))));

    let all = plan.output_columns();
    let inner_alias = ctx.allocate_alias("t");
    let mut middle = plan.into_derived(&inner_alias, &all);
    middle.limit = LimitItem(Some(paging_expr(take)));
    middle.order_by = remap_order(&keys, &names, &inner_alias, true);

    let outer_alias = ctx.allocate_alias("t");
    let mut outer = middle.into_derived(&outer_alias, &visible);
    outer.order_by = remap_order(&keys, &names, &outer_alias, false);
    Ok(outer)
}

/// Correlated `COUNT(*)` sequence column filtered in an outer query.
fn row_number(
    mut plan: RenderPlan,
    skip: &PagingValue,
    take: Option<&PagingValue>,
    tie_break: &[RenderExpr],
    ctx: &mut TranslationContext<'_>,
) -> Result<RenderPlan, RenderBuildError> {
    let mut keys = total_order(&plan, tie_break, true, ctx);
    let visible = plan.output_columns();

    // Counting over a grouped or distinct layer needs a plain row source.
    if plan.select.distinct || !plan.group_by.0.is_empty() {
        let names: Vec<String> = keys
            .iter()
            .map(|key| plan.ensure_projected(&key.expression))
            .collect();
        let all = plan.output_columns();
        let alias = ctx.allocate_alias("t");
        log::debug!("Row numbering a grouped/distinct layer through derived table '{}'", alias);
        plan.order_by = OrderByItems::default();
        plan = plan.into_derived(&alias, &all);
        keys = remap_order(&keys, &names, &alias, false).0;
    }

    let taken: Vec<String> = plan.output_columns().into_iter().map(|c| c.name).collect();
    let row_name = unique_name(ROW_COLUMN, |n| taken.iter().any(|t| t == n));

    let (mut shadow, renames) = shadow_copy(&plan, ctx);
    shadow.select = SelectItems {
        items: vec![SelectItem {
            expression: RenderExpr::count_star(),
            col_alias: None,
        }],
        distinct: false,
    };
    shadow.order_by = OrderByItems::default();
    shadow.limit = LimitItem::default();
    shadow.offset = None;
    let chain = precedence_chain(
        keys.iter()
            .map(|k| (rename_expr(&k.expression, &renames), k.expression.clone(), k.order))
            .collect(),
    );
    if let Some(chain) = chain {
        shadow.add_filter(chain);
    }

    plan.order_by = OrderByItems::default();
    plan.select.items.push(SelectItem::named(
        RenderExpr::ScalarSubquery {
            plan: Box::new(shadow),
            ty: SqlType::Int32,
        },
        &row_name,
    ));

    let alias = ctx.allocate_alias("t");
    log::debug!(
        "Emulating Skip({:?})/Take({:?}) with sequence column '{}' over '{}'",
        skip,
        take,
        row_name,
        alias
    );
    let mut outer = plan.into_derived(&alias, &visible);
    let row = RenderExpr::column(&alias, &row_name, SqlType::Int32, false);
    if let Some(bounds) = row_bounds(&row, skip, take)? {
        outer.add_filter(bounds);
    }
    outer.order_by = OrderByItems(vec![OrderByItem {
        expression: row,
        order: OrderByOrder::Asc,
    }]);
    Ok(outer)
}

/// `row >= s + 1 [AND row <= s + k]`, or `row > @s [AND row <= @s + @k]`.
fn row_bounds(
    row: &RenderExpr,
    skip: &PagingValue,
    take: Option<&PagingValue>,
) -> Result<Option<RenderExpr>, RenderBuildError> {
    let lower = match skip {
        PagingValue::Literal(s) => RenderExpr::binary(
            BinaryOperator::GreaterThanOrEqual,
            row.clone(),
            RenderExpr::constant(int_value(checked_sum(*s, 1)?)),
        ),
        PagingValue::Parameter { .. } => {
            RenderExpr::binary(BinaryOperator::GreaterThan, row.clone(), paging_expr(skip))
        }
    };
    let upper = match take {
        Some(take) => {
            let limit = match (skip, take) {
                (PagingValue::Literal(s), PagingValue::Literal(k)) => {
                    RenderExpr::constant(int_value(checked_sum(*s, *k)?))
                }
                _ => RenderExpr::binary(BinaryOperator::Add, paging_expr(skip), paging_expr(take)),
            };
            Some(RenderExpr::binary(BinaryOperator::LessThanOrEqual, row.clone(), limit))
        }
        None => None,
    };
    Ok(RenderExpr::conjunction(Some(lower).into_iter().chain(upper)))
}

/// `candidate` sorts strictly before `current`.
fn precedes(candidate: &RenderExpr, current: &RenderExpr, order: OrderByOrder) -> RenderExpr {
    let op = match order {
        OrderByOrder::Asc => BinaryOperator::LessThan,
        OrderByOrder::Desc => BinaryOperator::GreaterThan,
    };
    let cmp = RenderExpr::expanded(op, candidate.clone(), current.clone());
    if !candidate.is_nullable() && !current.is_nullable() {
        return cmp;
    }
    let nulls = match order {
        OrderByOrder::Asc => RenderExpr::and(
            RenderExpr::is_null(candidate.clone()),
            RenderExpr::is_not_null(current.clone()),
        ),
        OrderByOrder::Desc => RenderExpr::and(
            RenderExpr::is_not_null(candidate.clone()),
            RenderExpr::is_null(current.clone()),
        ),
    };
    RenderExpr::or(nulls, cmp)
}

fn same(candidate: &RenderExpr, current: &RenderExpr) -> RenderExpr {
    let eq = RenderExpr::expanded(BinaryOperator::Equal, candidate.clone(), current.clone());
    if !candidate.is_nullable() && !current.is_nullable() {
        return eq;
    }
    RenderExpr::or(
        eq,
        RenderExpr::and(
            RenderExpr::is_null(candidate.clone()),
            RenderExpr::is_null(current.clone()),
        ),
    )
}

/// Predicate "candidate row sorts at or before the current row" over
/// `(candidate, current, direction)` keys, most significant first.
pub(crate) fn precedence_chain(
    keys: Vec<(RenderExpr, RenderExpr, OrderByOrder)>,
) -> Option<RenderExpr> {
    let mut keys = keys.into_iter().rev();
    let (candidate, current, order) = keys.next()?;
    let mut chain = if candidate.is_nullable() || current.is_nullable() {
        RenderExpr::or(
            precedes(&candidate, &current, order),
            same(&candidate, &current),
        )
    } else {
        let op = match order {
            OrderByOrder::Asc => BinaryOperator::LessThanOrEqual,
            OrderByOrder::Desc => BinaryOperator::GreaterThanOrEqual,
        };
        RenderExpr::expanded(op, candidate, current)
    };
    for (candidate, current, order) in keys {
        chain = RenderExpr::or(
            precedes(&candidate, &current, order),
            RenderExpr::and(same(&candidate, &current), chain),
        );
    }
    Some(chain)
}

/// Copy of `plan` with every alias it declares replaced by a fresh one.
fn shadow_copy(
    plan: &RenderPlan,
    ctx: &mut TranslationContext<'_>,
) -> (RenderPlan, HashMap<String, String>) {
    let renames: HashMap<String, String> = plan
        .declared_aliases()
        .into_iter()
        .map(|alias| {
            let base = alias.trim_end_matches(|c: char| c.is_ascii_digit()).to_string();
            let fresh = ctx.allocate_alias(&base);
            (alias, fresh)
        })
        .collect();
    (rename_plan(plan, &renames), renames)
}

fn renamed(alias: &str, renames: &HashMap<String, String>) -> String {
    renames
        .get(alias)
        .cloned()
        .unwrap_or_else(|| alias.to_string())
}

fn rename_plan(plan: &RenderPlan, renames: &HashMap<String, String>) -> RenderPlan {
    let expr = |e: &RenderExpr| rename_expr(e, renames);
    RenderPlan {
        select: SelectItems {
            items: plan
                .select
                .items
                .iter()
                .map(|item| SelectItem {
                    expression: expr(&item.expression),
                    col_alias: item.col_alias.clone(),
                })
                .collect(),
            distinct: plan.select.distinct,
        },
        from: FromGroups(
            plan.from
                .0
                .iter()
                .map(|group| FromGroup {
                    source: rename_source(&group.source, renames),
                    joins: group
                        .joins
                        .iter()
                        .map(|join| Join {
                            source: rename_source(&join.source, renames),
                            join_type: join.join_type,
                            joining_on: expr(&join.joining_on),
                        })
                        .collect(),
                })
                .collect(),
        ),
        filters: FilterItems(plan.filters.0.as_ref().map(expr)),
        group_by: GroupByExpressions(plan.group_by.0.iter().map(expr).collect()),
        having_clause: plan.having_clause.as_ref().map(expr),
        order_by: OrderByItems(
            plan.order_by
                .0
                .iter()
                .map(|item| OrderByItem {
                    expression: expr(&item.expression),
                    order: item.order,
                })
                .collect(),
        ),
        limit: LimitItem(plan.limit.0.as_ref().map(expr)),
        offset: plan.offset.as_ref().map(|o| OffsetFetch {
            offset: expr(&o.offset),
            fetch: o.fetch.as_ref().map(expr),
        }),
    }
}

fn rename_source(source: &FromSource, renames: &HashMap<String, String>) -> FromSource {
    match source {
        FromSource::Table { name, alias } => FromSource::Table {
            name: name.clone(),
            alias: renamed(alias, renames),
        },
        FromSource::Derived { plan, alias } => FromSource::Derived {
            plan: Box::new(rename_plan(plan, renames)),
            alias: renamed(alias, renames),
        },
        FromSource::Union { union, alias } => FromSource::Union {
            union: UnionItems {
                input: union.input.iter().map(|p| rename_plan(p, renames)).collect(),
                union_type: union.union_type,
            },
            alias: renamed(alias, renames),
        },
    }
}

fn rename_expr(expr: &RenderExpr, renames: &HashMap<String, String>) -> RenderExpr {
    match expr {
        RenderExpr::Column(c) => match renames.get(&c.table_alias) {
            Some(fresh) => RenderExpr::column(fresh, &c.column, c.ty.clone(), c.nullable),
            None => expr.clone(),
        },
        RenderExpr::InSubquery {
            item,
            plan,
            negated,
        } => RenderExpr::InSubquery {
            item: Box::new(rename_expr(item, renames)),
            plan: Box::new(rename_plan(plan, renames)),
            negated: *negated,
        },
        RenderExpr::Exists { plan, negated } => RenderExpr::Exists {
            plan: Box::new(rename_plan(plan, renames)),
            negated: *negated,
        },
        RenderExpr::ScalarSubquery { plan, ty } => RenderExpr::ScalarSubquery {
            plan: Box::new(rename_plan(plan, renames)),
            ty: ty.clone(),
        },
        other => other.map_children(&mut |child| rename_expr(child, renames)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{DialectProfile, NullSemanticsMode};
    use crate::query_tree::{Constant, UnaryOperator};
    use proptest::prelude::*;

    fn gears_plan() -> RenderPlan {
        let mut plan = RenderPlan::new(FromSource::Table {
            name: "Gears".into(),
            alias: "g".into(),
        });
        plan.select.items = vec![
            SelectItem::named(
                RenderExpr::column("g", "Nickname", SqlType::String, false),
                "Nickname",
            ),
            SelectItem::named(
                RenderExpr::column("g", "FullName", SqlType::String, false),
                "FullName",
            ),
        ];
        plan
    }

    fn nickname() -> RenderExpr {
        RenderExpr::column("g", "Nickname", SqlType::String, false)
    }

    fn ordered_by_full_name(mut plan: RenderPlan) -> RenderPlan {
        plan.order_by = OrderByItems(vec![OrderByItem {
            expression: RenderExpr::column("g", "FullName", SqlType::String, false),
            order: OrderByOrder::Asc,
        }]);
        plan
    }

    fn request(skip: Option<i64>, take: Option<i64>) -> PagingRequest {
        PagingRequest {
            skip: skip.map(PagingValue::Literal),
            take: take.map(PagingValue::Literal),
            tie_break: vec![nickname()],
        }
    }

    fn with_ctx<T>(profile: &DialectProfile, f: impl FnOnce(&mut TranslationContext<'_>) -> T) -> T {
        let mut ctx = TranslationContext::new(profile, NullSemanticsMode::TwoValued);
        ctx.register_alias("g").unwrap();
        f(&mut ctx)
    }

    #[test]
    fn test_take_only_sets_top() {
        let profile = DialectProfile::default();
        let plan = with_ctx(&profile, |ctx| {
            apply_paging(gears_plan(), &request(None, Some(5)), ctx).unwrap()
        });
        assert_eq!(plan.limit.0, Some(RenderExpr::constant(Value::Int32(5))));
        assert!(plan.order_by.0.is_empty());
    }

    #[test]
    fn test_take_zero_is_false_filter() {
        let profile = DialectProfile::default();
        let plan = with_ctx(&profile, |ctx| {
            apply_paging(gears_plan(), &request(None, Some(0)), ctx).unwrap()
        });
        assert_eq!(plan.limit.0, None);
        assert_eq!(plan.filters.0, Some(RenderExpr::boolean(false)));
    }

    #[test]
    fn test_skip_zero_is_no_skip() {
        let profile = DialectProfile::default();
        let plan = with_ctx(&profile, |ctx| {
            apply_paging(gears_plan(), &request(Some(0), Some(2)), ctx).unwrap()
        });
        assert!(matches!(plan.from.0[0].source, FromSource::Table { .. }));
        assert!(plan.limit.0.is_some());
    }

    #[test]
    fn test_top_with_ties_appends_tie_break() {
        let profile = DialectProfile {
            top_returns_ties: true,
            ..Default::default()
        };
        let plan = with_ctx(&profile, |ctx| {
            apply_paging(ordered_by_full_name(gears_plan()), &request(None, Some(1)), ctx).unwrap()
        });
        assert_eq!(plan.order_by.0.len(), 2);
        assert_eq!(plan.order_by.0[1].expression, nickname());
    }

    #[test]
    fn test_offset_fetch_on_capable_profile() {
        let profile = DialectProfile::ace16();
        let plan = with_ctx(&profile, |ctx| {
            apply_paging(ordered_by_full_name(gears_plan()), &request(Some(1), Some(2)), ctx)
                .unwrap()
        });
        assert_eq!(
            plan.offset,
            Some(OffsetFetch {
                offset: RenderExpr::constant(Value::Int32(1)),
                fetch: Some(RenderExpr::constant(Value::Int32(2))),
            })
        );
    }

    #[test]
    fn test_row_number_shape() {
        let profile = DialectProfile::default();
        let (plan, warnings) = with_ctx(&profile, |ctx| {
            let plan = apply_paging(
                ordered_by_full_name(gears_plan()),
                &request(Some(1), Some(2)),
                ctx,
            )
            .unwrap();
            (plan, ctx.warnings().to_vec())
        });
        assert!(warnings.is_empty());
        let FromSource::Derived { plan: inner, alias } = &plan.from.0[0].source else {
            panic!("expected a derived table");
        };
        assert_eq!(alias, "t");
        assert_eq!(plan.output_columns().len(), 2);
        let row = RenderExpr::column("t", "row", SqlType::Int32, false);
        assert_eq!(
            plan.filters.0,
            Some(RenderExpr::and(
                RenderExpr::binary(
                    BinaryOperator::GreaterThanOrEqual,
                    row.clone(),
                    RenderExpr::constant(Value::Int32(2))
                ),
                RenderExpr::binary(
                    BinaryOperator::LessThanOrEqual,
                    row.clone(),
                    RenderExpr::constant(Value::Int32(3))
                ),
            ))
        );
        assert_eq!(plan.order_by.0[0].expression, row);

        let last = inner.select.items.last().unwrap();
        assert_eq!(last.col_alias.as_deref(), Some("row"));
        let RenderExpr::ScalarSubquery { plan: counter, .. } = &last.expression else {
            panic!("expected the sequence subquery");
        };
        assert_eq!(counter.declared_aliases(), vec!["g0".to_string()]);
        assert!(inner.order_by.0.is_empty());
    }

    #[test]
    fn test_skip_without_ordering_warns() {
        let profile = DialectProfile::default();
        let warnings = with_ctx(&profile, |ctx| {
            apply_paging(gears_plan(), &request(Some(3), None), ctx).unwrap();
            ctx.warnings().to_vec()
        });
        assert_eq!(
            warnings,
            vec![TranslationWarning::AmbiguousPagingOrdering {
                tie_break: vec!["g.Nickname".into()]
            }]
        );
    }

    #[test]
    fn test_parameterized_bounds() {
        let row = RenderExpr::column("t", "row", SqlType::Int32, false);
        let skip = PagingValue::Parameter {
            name: "p0".into(),
            value: 1,
        };
        let take = PagingValue::Literal(2);
        let bounds = row_bounds(&row, &skip, Some(&take)).unwrap().unwrap();
        let RenderExpr::Binary(and) = bounds else {
            panic!("expected a conjunction");
        };
        assert_eq!(and.op, BinaryOperator::AndAlso);
        let RenderExpr::Binary(upper) = *and.right else {
            panic!("expected an upper bound");
        };
        assert!(matches!(*upper.right, RenderExpr::Binary(ref b) if b.op == BinaryOperator::Add));
    }

    #[test]
    fn test_overflowing_page_bounds_are_rejected() {
        let nested = DialectProfile {
            skip_take_strategy: SkipTakeStrategy::NestedTop,
            ..Default::default()
        };
        let cases = [
            (DialectProfile::default(), request(Some(i64::MAX), Some(2))),
            (DialectProfile::default(), request(Some(i64::MAX), None)),
            (nested, request(Some(i64::MAX - 1), Some(2))),
        ];
        for (profile, paging) in cases {
            let result = with_ctx(&profile, |ctx| {
                apply_paging(ordered_by_full_name(gears_plan()), &paging, ctx)
            });
            assert!(
                matches!(result, Err(RenderBuildError::InvalidQueryTree(_))),
                "{:?}",
                result
            );
        }
    }

    #[test]
    fn test_nested_top_shape() {
        let profile = DialectProfile {
            skip_take_strategy: SkipTakeStrategy::NestedTop,
            ..Default::default()
        };
        let plan = with_ctx(&profile, |ctx| {
            apply_paging(ordered_by_full_name(gears_plan()), &request(Some(2), Some(3)), ctx)
                .unwrap()
        });
        let FromSource::Derived { plan: middle, .. } = &plan.from.0[0].source else {
            panic!("expected a derived table");
        };
        assert_eq!(middle.limit.0, Some(RenderExpr::constant(Value::Int32(3))));
        assert_eq!(middle.order_by.0[0].order, OrderByOrder::Desc);
        let FromSource::Derived { plan: inner, .. } = &middle.from.0[0].source else {
            panic!("expected the TOP (s + k) layer");
        };
        assert_eq!(inner.limit.0, Some(RenderExpr::constant(Value::Int32(5))));
        assert_eq!(plan.order_by.0[0].order, OrderByOrder::Asc);
        assert_eq!(plan.output_columns().len(), 2);
    }

    #[test]
    fn test_shadow_copy_renames_nested_aliases() {
        let profile = DialectProfile::default();
        let inner = gears_plan();
        let columns = inner.output_columns();
        let derived = inner.into_derived("t", &columns);
        let (copy, renames) = with_ctx(&profile, |ctx| {
            ctx.register_alias("t").unwrap();
            shadow_copy(&derived, ctx)
        });
        assert_eq!(renames.get("t").map(String::as_str), Some("t0"));
        assert_eq!(renames.get("g").map(String::as_str), Some("g0"));
        assert_eq!(copy.declared_aliases(), vec!["t0".to_string(), "g0".to_string()]);
    }

    // Three-valued evaluation of the chain over two rows of (name, id).
    type Row = (Option<i64>, i64);

    fn eval(expr: &RenderExpr, candidate: Row, current: Row) -> Option<Value> {
        let cell = |alias: &str, column: &str| {
            let row = if alias == "c" { candidate } else { current };
            match column {
                "Name" => row.0.map(Value::Int64).unwrap_or(Value::Null),
                _ => Value::Int64(row.1),
            }
        };
        let as_bool = |v: Option<Value>| match v {
            Some(Value::Boolean(b)) => Some(b),
            _ => None,
        };
        match expr {
            RenderExpr::Column(c) => match cell(&c.table_alias, &c.column) {
                Value::Null => None,
                v => Some(v),
            },
            RenderExpr::Constant(Constant { value, .. }) => Some(value.clone()),
            RenderExpr::Unary(u) => {
                let v = eval(&u.operand, candidate, current);
                match u.op {
                    UnaryOperator::IsNull => Some(Value::Boolean(v.is_none())),
                    UnaryOperator::IsNotNull => Some(Value::Boolean(v.is_some())),
                    _ => unreachable!(),
                }
            }
            RenderExpr::Binary(b) if b.op.is_logical() => {
                let l = as_bool(eval(&b.left, candidate, current));
                let r = as_bool(eval(&b.right, candidate, current));
                let out = match b.op {
                    BinaryOperator::AndAlso => match (l, r) {
                        (Some(false), _) | (_, Some(false)) => Some(false),
                        (Some(true), Some(true)) => Some(true),
                        _ => None,
                    },
                    _ => match (l, r) {
                        (Some(true), _) | (_, Some(true)) => Some(true),
                        (Some(false), Some(false)) => Some(false),
                        _ => None,
                    },
                };
                out.map(Value::Boolean)
            }
            RenderExpr::Binary(b) => {
                let l = eval(&b.left, candidate, current)?.as_i64()?;
                let r = eval(&b.right, candidate, current)?.as_i64()?;
                let out = match b.op {
                    BinaryOperator::Equal => l == r,
                    BinaryOperator::LessThan => l < r,
                    BinaryOperator::LessThanOrEqual => l <= r,
                    BinaryOperator::GreaterThan => l > r,
                    BinaryOperator::GreaterThanOrEqual => l >= r,
                    _ => unreachable!(),
                };
                Some(Value::Boolean(out))
            }
            _ => unreachable!(),
        }
    }

    fn chain(order: OrderByOrder) -> RenderExpr {
        let key = |alias: &str, column: &str, nullable: bool| {
            RenderExpr::column(alias, column, SqlType::Int64, nullable)
        };
        precedence_chain(vec![
            (key("c", "Name", true), key("r", "Name", true), order),
            (key("c", "Id", false), key("r", "Id", false), OrderByOrder::Asc),
        ])
        .unwrap()
    }

    proptest! {
        #[test]
        fn sequence_numbers_select_the_requested_page(
            names in prop::collection::vec(prop::option::of(0i64..4), 0..12),
            skip in 0usize..6,
            take in 1usize..6,
            descending in any::<bool>(),
        ) {
            let rows: Vec<Row> = names.iter().enumerate().map(|(i, n)| (*n, i as i64)).collect();
            let order = if descending { OrderByOrder::Desc } else { OrderByOrder::Asc };
            let predicate = chain(order);

            let mut numbered: Vec<(usize, i64)> = rows
                .iter()
                .map(|current| {
                    let position = rows
                        .iter()
                        .filter(|candidate| {
                            eval(&predicate, **candidate, *current) == Some(Value::Boolean(true))
                        })
                        .count();
                    (position, current.1)
                })
                .collect();
            numbered.sort();
            let positions: Vec<usize> = numbered.iter().map(|(p, _)| *p).collect();
            prop_assert_eq!(positions, (1..=rows.len()).collect::<Vec<_>>());

            let page: Vec<i64> = numbered
                .iter()
                .filter(|(p, _)| *p > skip && *p <= skip + take)
                .map(|(_, id)| *id)
                .collect();

            // NULLs first ascending, last descending; ids break ties
            let mut expected = rows.clone();
            expected.sort_by(|a, b| {
                let by_name = if descending { b.0.cmp(&a.0) } else { a.0.cmp(&b.0) };
                by_name.then(a.1.cmp(&b.1))
            });
            let expected: Vec<i64> = expected.iter().skip(skip).take(take).map(|r| r.1).collect();
            prop_assert_eq!(page, expected);
        }
    }
}
