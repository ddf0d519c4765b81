use pretty_assertions::assert_eq;

use super::*;
use crate::dialect::SkipTakeStrategy;
use crate::query_tree::{PagingValue, ProjectionItem, QueryOperator};
use crate::render_plan::context::TranslationWarning;

fn ordered_gears() -> QueryExpression {
    QueryExpression::new(gears()).order_by(column("g", "FullName", SqlType::String, true), false)
}

#[test]
fn test_take_renders_top() {
    assert_eq!(
        sql(&ordered_gears().take(3)),
        "SELECT TOP 3 `g`.`Nickname`, `g`.`SquadId`, `g`.`FullName`\nFROM `Gears` AS `g`\nORDER BY `g`.`FullName`"
    );
}

#[test]
fn test_take_parameter_is_inlined() {
    let query = ordered_gears().with(QueryOperator::Take(PagingValue::Parameter {
        name: "p0".into(),
        value: 4,
    }));
    let out = translate(&query);
    assert!(out.sql.starts_with("SELECT TOP 4 "), "{}", out.sql);
    assert!(out.parameters.is_empty());
}

#[test]
fn test_skip_take_with_sequence_column() {
    let out = translate(&ordered_gears().skip(1).take(2));
    assert!(out.warnings.is_empty());
    let sql = out.sql;
    assert!(
        sql.starts_with("SELECT `t`.`Nickname`, `t`.`SquadId`, `t`.`FullName`\nFROM (\n    SELECT `g`.`Nickname`, `g`.`SquadId`, `g`.`FullName`, (\n        SELECT COUNT(*)\n        FROM `Gears` AS `g0`\n        WHERE "),
        "{}",
        sql
    );
    assert!(
        sql.ends_with(") AS `row`\n    FROM `Gears` AS `g`\n) AS `t`\nWHERE `t`.`row` >= 2 AND `t`.`row` <= 3\nORDER BY `t`.`row`"),
        "{}",
        sql
    );
    // nullable ordering key sorts NULLs first
    assert!(sql.contains("`g0`.`FullName` IS NULL AND `g`.`FullName` IS NOT NULL"), "{}", sql);
    // non-nullable last key closes the chain inclusively
    assert!(sql.contains("`g0`.`SquadId` <= `g`.`SquadId`"), "{}", sql);
}

#[test]
fn test_skip_only_has_no_upper_bound() {
    let sql = sql(&ordered_gears().skip(10));
    assert!(sql.contains("WHERE `t`.`row` >= 11\nORDER BY `t`.`row`"), "{}", sql);
}

#[test]
fn test_skip_without_ordering_warns() {
    let out = translate(&QueryExpression::new(gears()).skip(1));
    assert_eq!(
        out.warnings,
        vec![TranslationWarning::AmbiguousPagingOrdering {
            tie_break: vec!["g.Nickname".into(), "g.SquadId".into()]
        }]
    );
}

#[test]
fn test_offset_fetch_profile() {
    assert_eq!(
        translate_with(&ordered_gears().skip(1).take(2), &DialectProfile::ace16()).sql,
        "SELECT `g`.`Nickname`, `g`.`SquadId`, `g`.`FullName`\nFROM `Gears` AS `g`\nORDER BY `g`.`FullName`, `g`.`Nickname`, `g`.`SquadId`\nOFFSET 1 ROWS FETCH NEXT 2 ROWS ONLY"
    );
}

#[test]
fn test_nested_top_profile() {
    let profile = DialectProfile {
        skip_take_strategy: SkipTakeStrategy::NestedTop,
        ..Default::default()
    };
    assert_eq!(
        translate_with(&ordered_gears().skip(1).take(2), &profile).sql,
        "SELECT `t0`.`Nickname`, `t0`.`SquadId`, `t0`.`FullName`\n\
         FROM (\n    \
         SELECT TOP 2 `t`.`Nickname`, `t`.`SquadId`, `t`.`FullName`\n    \
         FROM (\n        \
         SELECT TOP 3 `g`.`Nickname`, `g`.`SquadId`, `g`.`FullName`\n        \
         FROM `Gears` AS `g`\n        \
         ORDER BY `g`.`FullName`, `g`.`Nickname`, `g`.`SquadId`\n    \
         ) AS `t`\n    \
         ORDER BY `t`.`FullName` DESC, `t`.`Nickname` DESC, `t`.`SquadId` DESC\n\
         ) AS `t0`\n\
         ORDER BY `t0`.`FullName`, `t0`.`Nickname`, `t0`.`SquadId`"
    );
}

#[test]
fn test_distinct_page_is_numbered_over_derived_rows() {
    let query = QueryExpression::new(gears())
        .select(vec![ProjectionItem {
            expression: column("g", "FullName", SqlType::String, true),
            alias: None,
        }])
        .with(QueryOperator::Distinct)
        .skip(2);
    let sql = sql(&query);
    assert!(sql.contains("SELECT DISTINCT `g`.`FullName`"), "{}", sql);
    // the counter re-reads the distinct rows under fresh aliases
    assert!(sql.contains("SELECT DISTINCT `g0`.`FullName`"), "{}", sql);
    assert!(sql.contains(") AS `t0`"), "{}", sql);
    assert!(sql.contains("WHERE `t1`.`row` >= 3"), "{}", sql);
}

#[test]
fn test_take_zero_returns_no_rows() {
    let sql = sql(&ordered_gears().take(0));
    assert!(!sql.contains("TOP"), "{}", sql);
    assert!(sql.contains("WHERE 0 = 1"), "{}", sql);
}
