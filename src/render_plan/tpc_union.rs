//! Table-per-concrete-type materialization.
//!
//! A polymorphic source becomes a `UNION ALL` derived table with one branch
//! per concrete type. Every branch projects the same ordered column list
//! (`NULL` for columns a type lacks) and, when something downstream needs it,
//! a literal discriminator:
//!
//! ```text
//! (
//!     SELECT `g`.`Nickname`, `g`.`Rank`, 'Gear' AS `Discriminator`
//!     FROM `Gears` AS `g`
//!     UNION ALL
//!     SELECT `o`.`Nickname`, `o`.`Rank`, 'Officer' AS `Discriminator`
//!     FROM `Officers` AS `o`
//! ) AS `u`
//! ```
//!
//! Each occurrence of a hierarchy in a statement is expanded on its own, with
//! fresh aliases.

use std::collections::BTreeSet;

use crate::query_tree::visit::walk_exprs;
use crate::query_tree::{
    BinaryOperator, ColumnDef, EntityHierarchy, EntityTypeMapping, InList, QueryExpression,
    QueryOperator, SqlExpr, SqlType, Value,
};

use super::alias_allocator::table_alias_base;
use super::context::TranslationContext;
use super::errors::RenderBuildError;
use super::render_expr::RenderExpr;
use super::scope::{BoundColumn, PolymorphicBinding, SourceBinding};
use super::{FromSource, RenderPlan, SelectItem, UnionItems, UnionType};

/// What the rest of a query reads from a polymorphic source.
#[derive(Debug, Clone, PartialEq)]
pub struct Consumers {
    /// Referenced columns; `None` when the whole entity is projected.
    pub columns: Option<BTreeSet<String>>,
    pub discriminator: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaterializedSource {
    pub source: FromSource,
    pub binding: SourceBinding,
    /// Extra predicate the owning layer must apply (no type left to read).
    pub filter: Option<RenderExpr>,
}

/// Concrete types that survive `OfType` filters applied before the first
/// row barrier. Sources on the optional side of an outer join are never pruned.
pub fn materialized_types(
    alias: &str,
    hierarchy: &EntityHierarchy,
    following: &[QueryOperator],
    prunable: bool,
) -> Vec<String> {
    let mut types: Vec<String> = hierarchy.concrete_types().map(|t| t.name.clone()).collect();
    if !prunable {
        return types;
    }
    for op in following {
        if op.is_row_barrier() {
            break;
        }
        if let QueryOperator::OfType {
            alias: target,
            types: wanted,
        } = op
        {
            if target == alias {
                let allowed = hierarchy.concrete_descendants(wanted);
                types.retain(|t| allowed.contains(t));
            }
        }
    }
    types
}

/// Scan `owner` (nested queries included) for everything read from `alias`.
pub fn analyze_consumers(
    alias: &str,
    hierarchy: &EntityHierarchy,
    owner: &QueryExpression,
    materialized: &[String],
) -> Consumers {
    let mut columns = BTreeSet::new();
    let mut discriminator = false;
    walk_exprs(owner, &mut |expr| match expr {
        SqlExpr::Column(c) if c.table == alias => {
            if c.column == hierarchy.discriminator_column {
                discriminator = true;
            } else {
                columns.insert(c.column.clone());
            }
        }
        SqlExpr::TypeIs { table, .. } if table == alias => discriminator = true,
        _ => {}
    });

    for op in &owner.operators {
        if let QueryOperator::OfType {
            alias: target,
            types,
        } = op
        {
            let allowed = hierarchy.concrete_descendants(types);
            if target == alias && !materialized.iter().all(|t| allowed.contains(t)) {
                discriminator = true;
            }
        }
    }

    let projects_entity = !owner.operators.iter().any(|op| {
        matches!(
            op,
            QueryOperator::Select(_) | QueryOperator::GroupBy(_) | QueryOperator::Aggregate(_)
        )
    });
    if projects_entity && materialized.len() > 1 {
        discriminator = true;
    }

    Consumers {
        columns: if projects_entity { None } else { Some(columns) },
        discriminator,
    }
}

/// Ordered column list shared by every branch. Nullable when any
/// materialized type lacks the column.
fn column_layout(
    hierarchy: &EntityHierarchy,
    types: &[&EntityTypeMapping],
    consumers: &Consumers,
) -> Vec<ColumnDef> {
    let mut layout: Vec<ColumnDef> = Vec::new();
    for ty in types {
        for column in &ty.columns {
            if column.name == hierarchy.discriminator_column
                || layout.iter().any(|c| c.name == column.name)
            {
                continue;
            }
            let everywhere = types
                .iter()
                .all(|t| t.columns.iter().any(|c| c.name == column.name));
            layout.push(ColumnDef::new(
                &column.name,
                column.ty.clone(),
                column.nullable || !everywhere,
            ));
        }
    }

    if let Some(wanted) = &consumers.columns {
        let filtered: Vec<ColumnDef> = layout
            .iter()
            .filter(|c| wanted.contains(&c.name) || hierarchy.key.contains(&c.name))
            .cloned()
            .collect();
        if filtered.is_empty() {
            // a branch needs at least one column
            layout.truncate(1);
        } else {
            layout = filtered;
        }
    }
    layout
}

fn discriminator_value(type_name: &str) -> RenderExpr {
    RenderExpr::constant(Value::String(type_name.to_string()))
}

pub fn materialize(
    alias: &str,
    hierarchy: &EntityHierarchy,
    owner: &QueryExpression,
    following: &[QueryOperator],
    prunable: bool,
    ctx: &mut TranslationContext<'_>,
) -> Result<MaterializedSource, RenderBuildError> {
    let first_concrete = hierarchy.concrete_types().next().ok_or_else(|| {
        RenderBuildError::InvalidQueryTree(format!(
            "Hierarchy '{}' has no concrete type",
            hierarchy.name
        ))
    })?;

    let names = materialized_types(alias, hierarchy, following, prunable);
    let consumers = analyze_consumers(alias, hierarchy, owner, &names);
    let types: Vec<&EntityTypeMapping> = hierarchy
        .concrete_types()
        .filter(|t| names.contains(&t.name))
        .collect();

    log::debug!(
        "Materializing '{}' ({}) as [{}], discriminator: {}",
        alias,
        hierarchy.name,
        names.join(", "),
        consumers.discriminator
    );

    match types.as_slice() {
        [] => {
            let mut single = direct_table(alias, hierarchy, first_concrete, &consumers, ctx)?;
            if let Some(poly) = single.binding.polymorphic.as_mut() {
                poly.materialized.clear();
                poly.discriminator = None;
            }
            single.filter = Some(RenderExpr::boolean(false));
            Ok(single)
        }
        [only] => direct_table(alias, hierarchy, only, &consumers, ctx),
        _ => union_all(alias, hierarchy, &types, &consumers, ctx),
    }
}

fn table_name(ty: &EntityTypeMapping) -> Result<&str, RenderBuildError> {
    ty.table.as_deref().ok_or_else(|| {
        RenderBuildError::InvalidQueryTree(format!("Type '{}' has no table", ty.name))
    })
}

/// One concrete type left: the table is referenced directly.
fn direct_table(
    alias: &str,
    hierarchy: &EntityHierarchy,
    ty: &EntityTypeMapping,
    consumers: &Consumers,
    ctx: &mut TranslationContext<'_>,
) -> Result<MaterializedSource, RenderBuildError> {
    let table = table_name(ty)?;
    let physical = ctx.allocate_alias(&table_alias_base(table));
    let layout = column_layout(hierarchy, &[ty], consumers);

    let mut columns: Vec<BoundColumn> = layout
        .iter()
        .map(|c| BoundColumn {
            name: c.name.clone(),
            expr: RenderExpr::column(&physical, &c.name, c.ty.clone(), c.nullable),
        })
        .collect();
    // referenced columns that only other (pruned) types declare
    if let Some(wanted) = &consumers.columns {
        for name in wanted {
            if columns.iter().any(|c| &c.name == name) {
                continue;
            }
            let declared = hierarchy
                .types
                .iter()
                .flat_map(|t| t.columns.iter())
                .find(|c| &c.name == name);
            if let Some(def) = declared {
                columns.push(BoundColumn {
                    name: name.clone(),
                    expr: RenderExpr::null(def.ty.clone()),
                });
            }
        }
    }

    Ok(MaterializedSource {
        source: FromSource::Table {
            name: table.to_string(),
            alias: physical,
        },
        binding: SourceBinding {
            host_alias: alias.to_string(),
            columns,
            keys: hierarchy.key.clone(),
            nullable: false,
            polymorphic: Some(PolymorphicBinding {
                hierarchy: hierarchy.clone(),
                materialized: vec![ty.name.clone()],
                discriminator: Some(discriminator_value(&ty.name)),
            }),
        },
        filter: None,
    })
}

fn union_all(
    alias: &str,
    hierarchy: &EntityHierarchy,
    types: &[&EntityTypeMapping],
    consumers: &Consumers,
    ctx: &mut TranslationContext<'_>,
) -> Result<MaterializedSource, RenderBuildError> {
    let union_alias = ctx.allocate_alias("u");
    let layout = column_layout(hierarchy, types, consumers);
    let discriminator = &hierarchy.discriminator_column;

    let mut branches = Vec::with_capacity(types.len());
    for ty in types {
        let table = table_name(ty)?;
        let branch_alias = ctx.allocate_alias(&table_alias_base(table));
        let mut branch = RenderPlan::new(FromSource::Table {
            name: table.to_string(),
            alias: branch_alias.clone(),
        });
        for column in &layout {
            let expression = match ty.columns.iter().find(|c| c.name == column.name) {
                Some(own) => {
                    RenderExpr::column(&branch_alias, &own.name, own.ty.clone(), own.nullable)
                }
                None => RenderExpr::null(column.ty.clone()),
            };
            branch.select.items.push(SelectItem {
                expression,
                col_alias: Some(column.name.clone()),
            });
        }
        if consumers.discriminator {
            branch.select.items.push(SelectItem {
                expression: discriminator_value(&ty.name),
                col_alias: Some(discriminator.clone()),
            });
        }
        branches.push(branch);
    }

    let mut columns: Vec<BoundColumn> = layout
        .iter()
        .map(|c| BoundColumn {
            name: c.name.clone(),
            expr: RenderExpr::column(&union_alias, &c.name, c.ty.clone(), c.nullable),
        })
        .collect();
    let discriminator_expr = if consumers.discriminator {
        let expr = RenderExpr::column(&union_alias, discriminator, SqlType::String, false);
        columns.push(BoundColumn {
            name: discriminator.clone(),
            expr: expr.clone(),
        });
        Some(expr)
    } else {
        None
    };

    Ok(MaterializedSource {
        source: FromSource::Union {
            union: UnionItems {
                input: branches,
                union_type: UnionType::All,
            },
            alias: union_alias,
        },
        binding: SourceBinding {
            host_alias: alias.to_string(),
            columns,
            keys: hierarchy.key.clone(),
            nullable: false,
            polymorphic: Some(PolymorphicBinding {
                hierarchy: hierarchy.clone(),
                materialized: types.iter().map(|t| t.name.clone()).collect(),
                discriminator: discriminator_expr,
            }),
        },
        filter: None,
    })
}

/// Resolve `x is T` against a materialized source. Answers known from the
/// materialized type set fold to constants.
pub fn type_test(
    poly: &PolymorphicBinding,
    types: &[String],
) -> Result<RenderExpr, RenderBuildError> {
    let allowed = poly.hierarchy.concrete_descendants(types);
    let targets: Vec<&String> = poly
        .materialized
        .iter()
        .filter(|t| allowed.contains(t))
        .collect();
    if targets.is_empty() {
        return Ok(RenderExpr::boolean(false));
    }
    if targets.len() == poly.materialized.len() {
        return Ok(RenderExpr::boolean(true));
    }

    let discriminator = poly.discriminator.clone().ok_or_else(|| {
        RenderBuildError::InvalidQueryTree(format!(
            "Discriminator of '{}' was not materialized",
            poly.hierarchy.name
        ))
    })?;
    Ok(match targets.as_slice() {
        [single] => RenderExpr::binary(
            BinaryOperator::Equal,
            discriminator,
            discriminator_value(single),
        ),
        _ => RenderExpr::In(InList {
            item: Box::new(discriminator),
            values: targets.iter().map(|t| discriminator_value(t)).collect(),
            negated: false,
            null_expanded: false,
        }),
    })
}
