//! End-to-end translation scenarios over a small Gears of War style model
//!
//! Gear and Officer are mapped table-per-concrete-type; Weapons reference
//! their owner by nickname. Each test translates a host query the way an
//! application would and inspects the generated statement.

use jetsql::dialect::DialectProfile;
use jetsql::query_tree::{
    BinaryOperator, CanonicalFunction, ColumnDef, EntityHierarchy, EntityTypeMapping, JoinClause,
    JoinKind, OrderingItem, ProjectionItem, QueryOperator, SqlExpr, SqlType, TableSource, Value,
};
use jetsql::{NullSemanticsMode, QueryExpression, QueryTranslator, TranslatorConfig};
use pretty_assertions::assert_eq;

fn military_rank() -> SqlType {
    SqlType::Enum {
        name: "MilitaryRank".into(),
        underlying: Box::new(SqlType::Int32),
    }
}

fn gear_columns() -> Vec<ColumnDef> {
    vec![
        ColumnDef::new("Nickname", SqlType::String, false),
        ColumnDef::new("SquadId", SqlType::Int32, false),
        ColumnDef::new("Rank", SqlType::Int32, false),
        ColumnDef::new("HasSoulPatch", SqlType::Boolean, false),
    ]
}

fn gears() -> TableSource {
    let mut officer_columns = gear_columns();
    officer_columns.push(ColumnDef::new("LeaderNickname", SqlType::String, true));
    TableSource::Polymorphic {
        alias: "g".into(),
        hierarchy: EntityHierarchy {
            name: "Gear".into(),
            discriminator_column: "Discriminator".into(),
            key: vec!["Nickname".into(), "SquadId".into()],
            types: vec![
                EntityTypeMapping {
                    name: "Gear".into(),
                    base_type: None,
                    table: Some("Gears".into()),
                    columns: gear_columns(),
                },
                EntityTypeMapping {
                    name: "Officer".into(),
                    base_type: Some("Gear".into()),
                    table: Some("Officers".into()),
                    columns: officer_columns,
                },
            ],
        },
    }
}

fn cities() -> TableSource {
    TableSource::Table {
        name: "Cities".into(),
        alias: "c".into(),
        columns: vec![
            ColumnDef::new("Name", SqlType::String, false),
            ColumnDef::new("Location", SqlType::String, true),
        ],
        key: vec!["Name".into()],
    }
}

fn weapons() -> TableSource {
    TableSource::Table {
        name: "Weapons".into(),
        alias: "w".into(),
        columns: vec![
            ColumnDef::new("Id", SqlType::Int32, false),
            ColumnDef::new("Name", SqlType::String, true),
            ColumnDef::new("OwnerFullName", SqlType::String, true),
        ],
        key: vec!["Id".into()],
    }
}

fn col(table: &str, name: &str, ty: SqlType, nullable: bool) -> SqlExpr {
    SqlExpr::column(table, name, ty, nullable)
}

fn item(expression: SqlExpr, alias: Option<&str>) -> ProjectionItem {
    ProjectionItem {
        expression,
        alias: alias.map(str::to_string),
    }
}

#[test]
fn test_enum_filter_over_hierarchy_unions_both_tables() {
    // gears.Where(g => g.Rank == MilitaryRank.Corporal)
    let query = QueryExpression::new(gears()).filter(SqlExpr::eq(
        col("g", "Rank", military_rank(), false),
        SqlExpr::typed_constant(Value::Int32(2), military_rank()),
    ));
    let out = QueryTranslator::default().translate(&query).unwrap();
    let sql = out.sql;

    assert!(sql.contains("FROM `Gears` AS `g`\n    UNION ALL\n"), "{}", sql);
    assert!(sql.contains("FROM `Officers` AS `o`\n) AS `u`"), "{}", sql);
    assert!(sql.contains("NULL AS `LeaderNickname`, 'Gear' AS `Discriminator`"), "{}", sql);
    assert!(sql.ends_with("WHERE `u`.`Rank` = 2"), "{}", sql);
    assert!(out.parameters.is_empty());
}

#[test]
fn test_of_type_reads_only_the_concrete_table() {
    let query = QueryExpression::new(gears())
        .with(QueryOperator::OfType {
            alias: "g".into(),
            types: vec!["Officer".into()],
        })
        .select(vec![item(col("g", "LeaderNickname", SqlType::String, true), None)]);
    let sql = QueryTranslator::default().translate(&query).unwrap().sql;
    assert_eq!(sql, "SELECT `o`.`LeaderNickname`\nFROM `Officers` AS `o`");
}

#[test]
fn test_skip_take_page_uses_sequence_bounds() {
    // cities.OrderBy(c => c.Name).Skip(1).Take(2)
    let query = QueryExpression::new(cities())
        .order_by(col("c", "Name", SqlType::String, false), false)
        .skip(1)
        .take(2);
    let out = QueryTranslator::default().translate(&query).unwrap();
    let sql = out.sql;

    assert!(sql.contains("SELECT COUNT(*)\n        FROM `Cities` AS `c0`"), "{}", sql);
    assert!(sql.contains("`c0`.`Name` <= `c`.`Name`"), "{}", sql);
    assert!(
        sql.ends_with("WHERE `t`.`row` >= 2 AND `t`.`row` <= 3\nORDER BY `t`.`row`"),
        "{}",
        sql
    );
    assert!(!sql.contains("TOP"), "{}", sql);
    assert!(out.warnings.is_empty());
}

#[test]
fn test_skip_take_on_ace16_uses_offset_fetch() {
    let query = QueryExpression::new(cities())
        .order_by(col("c", "Name", SqlType::String, false), true)
        .skip(5)
        .take(5);
    let translator = QueryTranslator::new(DialectProfile::ace16(), NullSemanticsMode::TwoValued);
    let sql = translator.translate(&query).unwrap().sql;
    assert_eq!(
        sql,
        "SELECT `c`.`Name`, `c`.`Location`\nFROM `Cities` AS `c`\nORDER BY `c`.`Name` DESC\nOFFSET 5 ROWS FETCH NEXT 5 ROWS ONLY"
    );
}

#[test]
fn test_take_after_take_materializes_inner_page() {
    let query = QueryExpression::new(cities())
        .order_by(col("c", "Name", SqlType::String, false), false)
        .take(10)
        .take(3);
    let sql = QueryTranslator::default().translate(&query).unwrap().sql;
    assert_eq!(sql.matches("TOP").count(), 2, "{}", sql);
    assert!(sql.starts_with("SELECT TOP 3 `t`.`Name`, `t`.`Location`\nFROM (\n    SELECT TOP 10 "), "{}", sql);
    assert!(sql.ends_with(") AS `t`\nORDER BY `t`.`Name`"), "{}", sql);
}

#[test]
fn test_bool_column_in_filter_and_projection() {
    let soul_patch = col("g", "HasSoulPatch", SqlType::Boolean, false);
    let query = QueryExpression::new(gears())
        .with(QueryOperator::OfType {
            alias: "g".into(),
            types: vec!["Officer".into()],
        })
        .filter(SqlExpr::not(soul_patch.clone()))
        .select(vec![
            item(col("g", "Nickname", SqlType::String, false), None),
            item(soul_patch, Some("Patched")),
        ]);
    let sql = QueryTranslator::default().translate(&query).unwrap().sql;
    assert_eq!(
        sql,
        "SELECT `o`.`Nickname`, `o`.`HasSoulPatch` AS `Patched`\nFROM `Officers` AS `o`\nWHERE `o`.`HasSoulPatch` <> TRUE"
    );
}

#[test]
fn test_string_functions_translate_to_jet_builtins() {
    let name = col("w", "Name", SqlType::String, true);
    let query = QueryExpression::new(weapons())
        .filter(SqlExpr::call(
            CanonicalFunction::StartsWith,
            vec![name.clone(), SqlExpr::constant(Value::String("Mark".into()))],
            SqlType::Boolean,
        ))
        .select(vec![
            item(
                SqlExpr::call(CanonicalFunction::ToUpper, vec![name.clone()], SqlType::String),
                Some("Upper"),
            ),
            item(
                SqlExpr::call(CanonicalFunction::StringLength, vec![name], SqlType::Int32),
                Some("Length"),
            ),
        ]);
    let sql = QueryTranslator::default().translate(&query).unwrap().sql;
    assert!(sql.contains("UCASE(`w`.`Name`) AS `Upper`"), "{}", sql);
    assert!(
        sql.contains("IIF(`w`.`Name` IS NULL, NULL, LEN(`w`.`Name`)) AS `Length`"),
        "{}",
        sql
    );
    assert!(sql.ends_with("WHERE `w`.`Name` LIKE 'Mark%'"), "{}", sql);
}

#[test]
fn test_nullable_comparison_is_compensated_for_host_semantics() {
    let owner = col("w", "OwnerFullName", SqlType::String, true);
    let query = QueryExpression::new(weapons()).filter(SqlExpr::binary(
        BinaryOperator::NotEqual,
        owner,
        SqlExpr::parameter("owner", Value::String("Marcus Fenix".into()), SqlType::String),
    ));

    let two_valued = QueryTranslator::default().translate(&query).unwrap();
    assert!(
        two_valued
            .sql
            .ends_with("WHERE `w`.`OwnerFullName` <> @owner OR `w`.`OwnerFullName` IS NULL"),
        "{}",
        two_valued.sql
    );
    assert_eq!(two_valued.parameters.len(), 1);
    assert_eq!(two_valued.parameters[0].name, "owner");

    let config = TranslatorConfig {
        null_semantics: NullSemanticsMode::Relational,
        ..Default::default()
    };
    let relational = QueryTranslator::from_config(&config).translate(&query).unwrap();
    assert!(
        relational.sql.ends_with("WHERE `w`.`OwnerFullName` <> @owner"),
        "{}",
        relational.sql
    );
}

#[test]
fn test_left_join_then_filter_on_optional_side() {
    let query = QueryExpression::new(cities())
        .with(QueryOperator::Join(JoinClause {
            kind: JoinKind::Left,
            source: weapons(),
            on: Some(SqlExpr::eq(
                col("c", "Name", SqlType::String, false),
                col("w", "Name", SqlType::String, true),
            )),
        }))
        .with(QueryOperator::OrderBy(vec![OrderingItem {
            expression: col("w", "Id", SqlType::Int32, false),
            descending: false,
        }]))
        .select(vec![
            item(col("c", "Name", SqlType::String, false), Some("City")),
            item(col("w", "Id", SqlType::Int32, false), Some("WeaponId")),
        ]);
    let sql = QueryTranslator::default().translate(&query).unwrap().sql;
    assert_eq!(
        sql,
        "SELECT `c`.`Name` AS `City`, `w`.`Id` AS `WeaponId`\n\
         FROM `Cities` AS `c`\n\
         LEFT JOIN `Weapons` AS `w` ON `c`.`Name` = `w`.`Name`\n\
         ORDER BY `w`.`Id`"
    );
}

#[test]
fn test_translator_is_shared_across_threads() {
    let translator = QueryTranslator::default();
    let query = QueryExpression::new(cities()).take(1);
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let translator = translator.clone();
            let query = query.clone();
            std::thread::spawn(move || translator.translate(&query).unwrap().sql)
        })
        .collect();
    for handle in handles {
        assert_eq!(
            handle.join().unwrap(),
            "SELECT TOP 1 `c`.`Name`, `c`.`Location`\nFROM `Cities` AS `c`"
        );
    }
}
