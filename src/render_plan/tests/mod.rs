//! Golden-SQL tests for whole statements: plan building plus Jet rendering.

use crate::dialect::{DialectProfile, NullSemanticsMode};
use crate::jet_query_generator::{translate_query, TranslatedQuery};
use crate::query_tree::{
    ColumnDef, EntityHierarchy, EntityTypeMapping, QueryExpression, SqlExpr, SqlType, TableSource,
};

mod pagination_tests;
mod predicate_tests;

fn gears() -> TableSource {
    TableSource::Table {
        name: "Gears".into(),
        alias: "g".into(),
        columns: vec![
            ColumnDef::new("Nickname", SqlType::String, false),
            ColumnDef::new("SquadId", SqlType::Int32, false),
            ColumnDef::new("FullName", SqlType::String, true),
        ],
        key: vec!["Nickname".into(), "SquadId".into()],
    }
}

fn weapons() -> TableSource {
    TableSource::Table {
        name: "Weapons".into(),
        alias: "w".into(),
        columns: vec![
            ColumnDef::new("Id", SqlType::Int32, false),
            ColumnDef::new("OwnerNickname", SqlType::String, true),
        ],
        key: vec!["Id".into()],
    }
}

fn gear_columns() -> Vec<ColumnDef> {
    vec![
        ColumnDef::new("Nickname", SqlType::String, false),
        ColumnDef::new("SquadId", SqlType::Int32, false),
        ColumnDef::new("Rank", SqlType::Int32, false),
    ]
}

/// Gear (table Gears) and Officer (table Officers) mapped table-per-concrete-type.
fn gear_hierarchy() -> TableSource {
    let mut officer_columns = gear_columns();
    officer_columns.push(ColumnDef::new("Rating", SqlType::Int32, false));
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

fn column(table: &str, name: &str, ty: SqlType, nullable: bool) -> SqlExpr {
    SqlExpr::column(table, name, ty, nullable)
}

fn translate_with(query: &QueryExpression, profile: &DialectProfile) -> TranslatedQuery {
    translate_query(query, profile, NullSemanticsMode::TwoValued).unwrap()
}

fn translate(query: &QueryExpression) -> TranslatedQuery {
    translate_with(query, &DialectProfile::default())
}

fn sql(query: &QueryExpression) -> String {
    translate(query).sql
}
