//! Failure reporting through the public API
//!
//! The host decides between client evaluation and a hard error from the
//! failure kind, so each category is checked end to end.

use jetsql::query_tree::{
    CanonicalFunction, ColumnDef, DateUnit, ProjectionItem, SetOperationKind, SqlExpr, SqlType,
    TableSource, Value,
};
use jetsql::render_plan::errors::TranslationFailureKind;
use jetsql::{QueryExpression, QueryTranslator, RenderBuildError};
use test_case::test_case;

fn missions() -> TableSource {
    TableSource::Table {
        name: "Missions".into(),
        alias: "m".into(),
        columns: vec![
            ColumnDef::new("Id", SqlType::Int32, false),
            ColumnDef::new("Timeline", SqlType::DateTime, false),
        ],
        key: vec!["Id".into()],
    }
}

fn timeline() -> SqlExpr {
    SqlExpr::column("m", "Timeline", SqlType::DateTime, false)
}

fn project(expression: SqlExpr) -> QueryExpression {
    QueryExpression::new(missions()).select(vec![ProjectionItem {
        expression,
        alias: Some("Value".into()),
    }])
}

fn set_operation(kind: SetOperationKind) -> QueryExpression {
    QueryExpression::new(TableSource::SetOperation {
        kind,
        queries: vec![
            QueryExpression::new(missions()),
            QueryExpression::new(missions()),
        ],
        alias: "u".into(),
    })
}

fn translate_err(query: &QueryExpression) -> RenderBuildError {
    QueryTranslator::default().translate(query).unwrap_err()
}

#[test_case(
    project(SqlExpr::call(CanonicalFunction::DayOfWeek, vec![timeline()], SqlType::Int32)),
    TranslationFailureKind::UnsupportedFunction,
    false;
    "day of week has no Jet equivalent"
)]
#[test_case(
    project(SqlExpr::call(
        CanonicalFunction::DatePart(DateUnit::Millisecond),
        vec![timeline()],
        SqlType::Int32
    )),
    TranslationFailureKind::UnsupportedFunction,
    false;
    "millisecond date part"
)]
#[test_case(
    set_operation(SetOperationKind::Intersect),
    TranslationFailureKind::UnsupportedNodeKind,
    false;
    "intersect"
)]
#[test_case(
    project(SqlExpr::constant(Value::TimeSpan(36_000_000_000))),
    TranslationFailureKind::UnsupportedLiteral,
    true;
    "time span literal"
)]
#[test_case(
    QueryExpression::new(missions()).filter(SqlExpr::column("x", "Id", SqlType::Int32, false)),
    TranslationFailureKind::InvalidQueryTree,
    true;
    "unknown alias"
)]
fn test_failure_kind(query: QueryExpression, kind: TranslationFailureKind, fatal: bool) {
    let err = translate_err(&query);
    assert_eq!(err.kind(), kind, "{}", err);
    assert_eq!(err.is_fatal(), fatal, "{}", err);
}

#[test]
fn test_unresolved_column_names_the_column() {
    let query = QueryExpression::new(missions())
        .filter(SqlExpr::column("m", "CodeName", SqlType::String, false));
    let err = translate_err(&query);
    assert_eq!(
        err,
        RenderBuildError::UnresolvedColumn {
            table: "m".into(),
            column: "CodeName".into()
        }
    );
    assert_eq!(
        err.to_string(),
        "Column 'm.CodeName' is not visible at this point of the query"
    );
}

#[test]
fn test_unresolved_column_is_reported_before_and_after_pushdown() {
    let code_name = SqlExpr::column("m", "CodeName", SqlType::String, false);
    let direct = project(code_name.clone());
    // a filter after TOP moves the page into a derived table first
    let pushed = QueryExpression::new(missions()).take(3).filter(SqlExpr::eq(
        code_name,
        SqlExpr::constant(Value::String("Hammer".into())),
    ));
    for query in [direct, pushed] {
        let err = translate_err(&query);
        assert_eq!(err.kind(), TranslationFailureKind::InvalidQueryTree, "{}", err);
        assert!(matches!(err, RenderBuildError::UnresolvedColumn { .. }), "{}", err);
    }
}

#[test]
fn test_negative_take_is_rejected() {
    let err = translate_err(&QueryExpression::new(missions()).take(-1));
    assert_eq!(err.kind(), TranslationFailureKind::InvalidQueryTree);
}

#[test]
fn test_union_all_of_same_table_is_translated() {
    let sql = QueryTranslator::default()
        .translate(&set_operation(SetOperationKind::UnionAll))
        .unwrap()
        .sql;
    assert!(sql.contains("FROM `Missions` AS `m`\n    UNION ALL\n    SELECT `m0`.`Id`"), "{}", sql);
    assert!(sql.contains("FROM `Missions` AS `m0`\n) AS `u`"), "{}", sql);
}
