//! Unit tests for the serialized query-tree format read by the CLI
//!
//! Hosts hand query trees over as JSON (or YAML); optional fields must
//! default so that hand-written trees stay short.

use jetsql::query_tree::{
    BinaryOperator, ColumnDef, JoinKind, PagingValue, QueryOperator, SqlExpr, SqlType,
    TableSource, Value,
};
use jetsql::QueryExpression;

#[test]
fn test_minimal_json_query() {
    let json = r#"{
        "source": {
            "Table": {
                "name": "Gears",
                "alias": "g",
                "columns": [
                    {"name": "Nickname", "ty": "String"},
                    {"name": "FullName", "ty": "String", "nullable": true}
                ],
                "key": ["Nickname"]
            }
        }
    }"#;
    let query: QueryExpression = serde_json::from_str(json).unwrap();
    assert!(query.operators.is_empty());
    match &query.source {
        TableSource::Table { name, columns, .. } => {
            assert_eq!(name, "Gears");
            assert_eq!(columns[0], ColumnDef::new("Nickname", SqlType::String, false));
            assert!(columns[1].nullable);
        }
        other => panic!("expected a table source, got {:?}", other),
    }
}

#[test]
fn test_json_operators_in_host_order() {
    let json = r#"{
        "source": {"Table": {"name": "Gears", "alias": "g"}},
        "operators": [
            {"Where": {"Binary": {
                "op": "Equal",
                "left": {"Column": {"table": "g", "column": "Nickname", "ty": "String"}},
                "right": {"Parameter": {"name": "nick", "value": {"String": "Marcus"}, "ty": "String"}}
            }}},
            {"Skip": {"Parameter": {"name": "p0", "value": 10}}},
            {"Take": {"Literal": 5}},
            "Distinct"
        ]
    }"#;
    let query: QueryExpression = serde_json::from_str(json).unwrap();
    assert_eq!(query.operators.len(), 4);

    match &query.operators[0] {
        QueryOperator::Where(SqlExpr::Binary(b)) => {
            assert_eq!(b.op, BinaryOperator::Equal);
            assert!(!b.null_expanded);
            assert_eq!(
                *b.right,
                SqlExpr::parameter("nick", Value::String("Marcus".into()), SqlType::String)
            );
        }
        other => panic!("expected a comparison filter, got {:?}", other),
    }
    assert_eq!(
        query.operators[1],
        QueryOperator::Skip(PagingValue::Parameter {
            name: "p0".into(),
            value: 10
        })
    );
    assert_eq!(query.operators[2], QueryOperator::Take(PagingValue::Literal(5)));
    assert_eq!(query.operators[3], QueryOperator::Distinct);
}

#[test]
fn test_yaml_join_and_enum_type() {
    let yaml = r#"
source:
  Table: { name: Gears, alias: g }
operators:
  - Join:
      kind: Left
      source:
        Table: { name: Weapons, alias: w }
      on:
        Binary:
          op: Equal
          left: { Column: { table: g, column: Nickname, ty: String } }
          right: { Column: { table: w, column: OwnerNickname, ty: String, nullable: true } }
  - Where:
      Binary:
        op: Equal
        left:
          Column:
            table: g
            column: Rank
            ty: { Enum: { name: MilitaryRank, underlying: Int16 } }
        right: { Constant: { value: { Int16: 2 }, ty: Int16 } }
"#;
    let query = QueryExpression::from_yaml_str(yaml).unwrap();
    match &query.operators[0] {
        QueryOperator::Join(join) => {
            assert_eq!(join.kind, JoinKind::Left);
            assert_eq!(join.source.alias(), "w");
            assert!(join.on.is_some());
        }
        other => panic!("expected a join, got {:?}", other),
    }
    match &query.operators[1] {
        QueryOperator::Where(SqlExpr::Binary(b)) => match &*b.left {
            SqlExpr::Column(c) => assert_eq!(c.ty.storage(), &SqlType::Int16),
            other => panic!("expected a column, got {:?}", other),
        },
        other => panic!("expected a filter, got {:?}", other),
    }
}

#[test]
fn test_yaml_unit_operators_and_paging() {
    let yaml = r#"
source:
  Table: { name: Gears, alias: g }
operators:
  - Distinct
  - Skip: { Literal: 3 }
  - Take: { Parameter: { name: p0, value: 5 } }
"#;
    let query = QueryExpression::from_yaml_str(yaml).unwrap();
    assert_eq!(
        query.operators,
        vec![
            QueryOperator::Distinct,
            QueryOperator::Skip(PagingValue::Literal(3)),
            QueryOperator::Take(PagingValue::Parameter {
                name: "p0".into(),
                value: 5
            }),
        ]
    );
}

#[test]
fn test_unknown_operator_is_rejected() {
    let json = r#"{"source": {"Table": {"name": "Gears", "alias": "g"}}, "operators": ["Reverse"]}"#;
    let result: Result<QueryExpression, _> = serde_json::from_str(json);
    assert!(result.is_err());
}
