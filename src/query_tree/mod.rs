//! Canonical, dialect-agnostic relational query tree handed over by the host.
//!
//! A query is a root [`TableSource`] followed by the host's operators in the
//! order they were applied. The tree is never mutated by the translator.

use serde::{Deserialize, Serialize};

pub mod expression;
pub mod types;
pub mod visit;

pub use expression::{
    AggregateCall, AggregateFunction, BinaryExpr, BinaryOperator, CanonicalFunction, CaseChain,
    CaseWhen, Coalesce, ColumnRef, Conditional, Constant, Convert, DateUnit, FunctionCall,
    InList, LikeExpr, ParameterRef, SqlExpr, TypedExpr, UnaryExpr, UnaryOperator,
};
pub use types::{SqlType, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryExpression {
    pub source: TableSource,
    #[serde(default)]
    pub operators: Vec<QueryOperator>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub ty: SqlType,
    #[serde(default)]
    pub nullable: bool,
}

impl ColumnDef {
    pub fn new(name: &str, ty: SqlType, nullable: bool) -> Self {
        ColumnDef {
            name: name.to_string(),
            ty,
            nullable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SetOperationKind {
    UnionAll,
    Union,
    Intersect,
    Except,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TableSource {
    Table {
        name: String,
        alias: String,
        #[serde(default)]
        columns: Vec<ColumnDef>,
        #[serde(default)]
        key: Vec<String>,
    },
    Subquery {
        query: Box<QueryExpression>,
        alias: String,
    },
    SetOperation {
        kind: SetOperationKind,
        queries: Vec<QueryExpression>,
        alias: String,
    },
    /// Entity hierarchy mapped table-per-concrete-type.
    Polymorphic {
        alias: String,
        hierarchy: EntityHierarchy,
    },
}

impl TableSource {
    pub fn alias(&self) -> &str {
        match self {
            TableSource::Table { alias, .. }
            | TableSource::Subquery { alias, .. }
            | TableSource::SetOperation { alias, .. }
            | TableSource::Polymorphic { alias, .. } => alias,
        }
    }
}

fn default_discriminator() -> String {
    "Discriminator".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityHierarchy {
    pub name: String,
    #[serde(default = "default_discriminator")]
    pub discriminator_column: String,
    #[serde(default)]
    pub key: Vec<String>,
    pub types: Vec<EntityTypeMapping>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityTypeMapping {
    pub name: String,
    #[serde(default)]
    pub base_type: Option<String>,
    /// Physical table of a concrete type; `None` for abstract types.
    #[serde(default)]
    pub table: Option<String>,
    /// Every column of the concrete table, inherited ones included.
    #[serde(default)]
    pub columns: Vec<ColumnDef>,
}

impl EntityHierarchy {
    pub fn concrete_types(&self) -> impl Iterator<Item = &EntityTypeMapping> {
        self.types.iter().filter(|t| t.table.is_some())
    }

    /// `true` when `candidate` is `ancestor` or derives from it.
    pub fn derives_from(&self, candidate: &str, ancestor: &str) -> bool {
        let mut current = Some(candidate);
        while let Some(name) = current {
            if name == ancestor {
                return true;
            }
            current = self
                .types
                .iter()
                .find(|t| t.name == name)
                .and_then(|t| t.base_type.as_deref());
        }
        false
    }

    /// Concrete types assignable to any of `types`, in declaration order.
    pub fn concrete_descendants(&self, types: &[String]) -> Vec<String> {
        self.concrete_types()
            .filter(|t| types.iter().any(|ancestor| self.derives_from(&t.name, ancestor)))
            .map(|t| t.name.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinKind {
    Inner,
    Left,
    Cross,
    CrossApply,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinClause {
    pub kind: JoinKind,
    pub source: TableSource,
    #[serde(default)]
    pub on: Option<SqlExpr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionItem {
    pub expression: SqlExpr,
    #[serde(default)]
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderingItem {
    pub expression: SqlExpr,
    #[serde(default)]
    pub descending: bool,
}

/// Skip/Take count: a literal, or a host parameter with its current value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PagingValue {
    Literal(i64),
    Parameter { name: String, value: i64 },
}

impl PagingValue {
    pub fn value(&self) -> i64 {
        match self {
            PagingValue::Literal(v) => *v,
            PagingValue::Parameter { value, .. } => *value,
        }
    }
}

/// Terminal aggregate applied to the whole query (`Count()`, `Sum(x => ..)`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateOperator {
    pub function: AggregateFunction,
    #[serde(default)]
    pub argument: Option<SqlExpr>,
    #[serde(default)]
    pub distinct: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryOperator {
    Where(SqlExpr),
    Join(JoinClause),
    Select(Vec<ProjectionItem>),
    OrderBy(Vec<OrderingItem>),
    ThenBy(Vec<OrderingItem>),
    Skip(PagingValue),
    Take(PagingValue),
    Distinct,
    GroupBy(Vec<SqlExpr>),
    Having(SqlExpr),
    OfType { alias: String, types: Vec<String> },
    Aggregate(AggregateOperator),
}

impl QueryOperator {
    /// Operators after which the row set is no longer a plain filtered product.
    pub fn is_row_barrier(&self) -> bool {
        matches!(
            self,
            QueryOperator::Skip(_)
                | QueryOperator::Take(_)
                | QueryOperator::Distinct
                | QueryOperator::GroupBy(_)
                | QueryOperator::Aggregate(_)
        )
    }
}

impl QueryExpression {
    pub fn new(source: TableSource) -> Self {
        QueryExpression {
            source,
            operators: Vec::new(),
        }
    }

    /// Parse a YAML query tree. Enum variants are written as single-key maps
    /// (`Table: {..}`), the same shape the JSON form uses.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::with::singleton_map_recursive::deserialize(serde_yaml::Deserializer::from_str(
            yaml,
        ))
    }

    pub fn with(mut self, op: QueryOperator) -> Self {
        self.operators.push(op);
        self
    }

    pub fn filter(self, predicate: SqlExpr) -> Self {
        self.with(QueryOperator::Where(predicate))
    }

    pub fn select(self, items: Vec<ProjectionItem>) -> Self {
        self.with(QueryOperator::Select(items))
    }

    pub fn order_by(self, expression: SqlExpr, descending: bool) -> Self {
        self.with(QueryOperator::OrderBy(vec![OrderingItem {
            expression,
            descending,
        }]))
    }

    pub fn skip(self, count: i64) -> Self {
        self.with(QueryOperator::Skip(PagingValue::Literal(count)))
    }

    pub fn take(self, count: i64) -> Self {
        self.with(QueryOperator::Take(PagingValue::Literal(count)))
    }
}
