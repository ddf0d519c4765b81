use pretty_assertions::assert_eq;

use super::*;
use crate::query_tree::{
    BinaryOperator, JoinClause, JoinKind, ProjectionItem, QueryOperator, SetOperationKind, Value,
};
use crate::render_plan::errors::{RenderBuildError, TranslationFailureKind};

fn owner_matches_gear() -> SqlExpr {
    SqlExpr::eq(
        column("w", "OwnerNickname", SqlType::String, true),
        column("g", "Nickname", SqlType::String, false),
    )
}

#[test]
fn test_comparison_in_projection_becomes_iif() {
    let query = QueryExpression::new(gears()).select(vec![ProjectionItem {
        expression: SqlExpr::eq(
            column("g", "SquadId", SqlType::Int32, false),
            SqlExpr::constant(Value::Int32(1)),
        ),
        alias: None,
    }]);
    assert_eq!(
        sql(&query),
        "SELECT IIF(`g`.`SquadId` = 1, TRUE, FALSE) AS `c`\nFROM `Gears` AS `g`"
    );
}

#[test]
fn test_not_equal_on_nullable_column_keeps_null_rows() {
    let query = QueryExpression::new(gears()).filter(SqlExpr::binary(
        BinaryOperator::NotEqual,
        column("g", "FullName", SqlType::String, true),
        SqlExpr::constant(Value::String("Marcus".into())),
    ));
    assert!(sql(&query)
        .ends_with("WHERE `g`.`FullName` <> 'Marcus' OR `g`.`FullName` IS NULL"));

    let relational =
        translate_query(&query, &DialectProfile::default(), NullSemanticsMode::Relational).unwrap();
    assert!(relational.sql.ends_with("WHERE `g`.`FullName` <> 'Marcus'"));
}

#[test]
fn test_in_subquery() {
    let owners = QueryExpression::new(weapons()).select(vec![ProjectionItem {
        expression: column("w", "OwnerNickname", SqlType::String, true),
        alias: None,
    }]);
    let query = QueryExpression::new(gears()).filter(SqlExpr::InSubquery {
        item: Box::new(column("g", "Nickname", SqlType::String, false)),
        query: Box::new(owners),
        negated: false,
    });
    assert!(sql(&query).ends_with(
        "WHERE `g`.`Nickname` IN (\n    SELECT `w`.`OwnerNickname`\n    FROM `Weapons` AS `w`\n)"
    ));
}

#[test]
fn test_correlated_exists_selects_constant() {
    let owned = QueryExpression::new(weapons()).filter(owner_matches_gear());
    let query = QueryExpression::new(gears()).filter(SqlExpr::Exists {
        query: Box::new(owned),
        negated: true,
    });
    assert_eq!(
        sql(&query),
        "SELECT `g`.`Nickname`, `g`.`SquadId`, `g`.`FullName`\n\
         FROM `Gears` AS `g`\n\
         WHERE NOT (EXISTS (\n    \
         SELECT 1\n    \
         FROM `Weapons` AS `w`\n    \
         WHERE `w`.`OwnerNickname` = `g`.`Nickname`\n\
         ))"
    );
}

#[test]
fn test_correlated_derived_table_is_rejected() {
    let owned = QueryExpression::new(weapons()).filter(owner_matches_gear());
    for kind in [JoinKind::Cross, JoinKind::CrossApply] {
        let query = QueryExpression::new(gears()).with(QueryOperator::Join(JoinClause {
            kind,
            source: TableSource::Subquery {
                query: Box::new(owned.clone()),
                alias: "o".into(),
            },
            on: None,
        }));
        let err = translate_query(&query, &DialectProfile::default(), NullSemanticsMode::TwoValued)
            .unwrap_err();
        assert_eq!(err.kind(), TranslationFailureKind::UnsupportedNodeKind, "{}", err);
    }
}

#[test]
fn test_except_is_rejected() {
    let query = QueryExpression::new(TableSource::SetOperation {
        kind: SetOperationKind::Except,
        queries: vec![QueryExpression::new(gears()), QueryExpression::new(gears())],
        alias: "s".into(),
    });
    let err = translate_query(&query, &DialectProfile::default(), NullSemanticsMode::TwoValued)
        .unwrap_err();
    assert!(matches!(err, RenderBuildError::UnsupportedNodeKind(_)));
}

#[test]
fn test_cross_join_lists_sources() {
    let query = QueryExpression::new(gears()).with(QueryOperator::Join(JoinClause {
        kind: JoinKind::Cross,
        source: weapons(),
        on: None,
    }));
    assert!(sql(&query).ends_with("\nFROM `Gears` AS `g`, `Weapons` AS `w`"));
}

#[test]
fn test_parameters_follow_text_order() {
    let query = QueryExpression::new(gears())
        .filter(SqlExpr::eq(
            column("g", "SquadId", SqlType::Int32, false),
            SqlExpr::parameter("squad", Value::Int32(1), SqlType::Int32),
        ))
        .filter(SqlExpr::eq(
            column("g", "Nickname", SqlType::String, false),
            SqlExpr::parameter("nick", Value::String("Marcus".into()), SqlType::String),
        ));
    let out = translate(&query);
    assert!(out.sql.ends_with("WHERE `g`.`SquadId` = @squad AND `g`.`Nickname` = @nick"));
    let names: Vec<_> = out.parameters.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["squad", "nick"]);
}
