//! Scalar and predicate expressions of the canonical query tree.
//!
//! Node payloads are generic over the child expression type so the resolved
//! expression tree (`render_plan::render_expr::RenderExpr`) can reuse them.

use serde::{Deserialize, Serialize};

use super::types::{SqlType, Value};
use super::QueryExpression;

/// Typing information every expression tree exposes to the lowering passes.
pub trait TypedExpr {
    fn sql_type(&self) -> SqlType;
    fn is_nullable(&self) -> bool;
    /// `true` when the node is a literal/parameter carrying a NULL value.
    fn is_null_literal(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnRef {
    /// Host-side alias of the source the column belongs to.
    pub table: String,
    pub column: String,
    pub ty: SqlType,
    #[serde(default)]
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constant {
    pub value: Value,
    pub ty: SqlType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRef {
    pub name: String,
    pub value: Value,
    pub ty: SqlType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOperator {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    AndAlso,
    OrElse,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    BitwiseAnd,
    BitwiseOr,
    ExclusiveOr,
}

impl BinaryOperator {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOperator::Equal
                | BinaryOperator::NotEqual
                | BinaryOperator::LessThan
                | BinaryOperator::LessThanOrEqual
                | BinaryOperator::GreaterThan
                | BinaryOperator::GreaterThanOrEqual
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOperator::AndAlso | BinaryOperator::OrElse)
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOperator::Add
                | BinaryOperator::Subtract
                | BinaryOperator::Multiply
                | BinaryOperator::Divide
                | BinaryOperator::Modulo
        )
    }

    pub fn is_bitwise(self) -> bool {
        matches!(
            self,
            BinaryOperator::BitwiseAnd | BinaryOperator::BitwiseOr | BinaryOperator::ExclusiveOr
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOperator {
    Not,
    Negate,
    BitwiseNot,
    IsNull,
    IsNotNull,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryExpr<E> {
    pub op: BinaryOperator,
    pub left: Box<E>,
    pub right: Box<E>,
    /// Result type override supplied by the host (enum-typed bitwise ops and the like).
    #[serde(default)]
    pub ty: Option<SqlType>,
    /// Set once null-semantics expansion has rewritten this comparison.
    #[serde(default)]
    pub null_expanded: bool,
}

impl<E: TypedExpr> BinaryExpr<E> {
    pub fn result_type(&self) -> SqlType {
        if self.op.is_comparison() || self.op.is_logical() {
            return SqlType::Boolean;
        }
        match &self.ty {
            Some(ty) => ty.clone(),
            None => SqlType::promote(&self.left.sql_type(), &self.right.sql_type()),
        }
    }

    pub fn result_nullable(&self) -> bool {
        self.left.is_nullable() || self.right.is_nullable()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnaryExpr<E> {
    pub op: UnaryOperator,
    pub operand: Box<E>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall<E> {
    pub function: CanonicalFunction,
    pub args: Vec<E>,
    pub ty: SqlType,
}

impl<E: TypedExpr> FunctionCall<E> {
    pub fn result_nullable(&self) -> bool {
        match self.function {
            CanonicalFunction::Now
            | CanonicalFunction::UtcNow
            | CanonicalFunction::Today
            | CanonicalFunction::IsNullOrEmpty
            | CanonicalFunction::IsNullOrWhiteSpace => false,
            _ => self.args.iter().any(TypedExpr::is_nullable),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conditional<E> {
    pub test: Box<E>,
    pub then: Box<E>,
    pub otherwise: Box<E>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseWhen<E> {
    pub when: E,
    pub then: E,
}

/// Multi-branch conditional; `operand` present means the simple `CASE x WHEN v` form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseChain<E> {
    pub operand: Option<Box<E>>,
    pub whens: Vec<CaseWhen<E>>,
    pub otherwise: Option<Box<E>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coalesce<E> {
    pub left: Box<E>,
    pub right: Box<E>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Convert<E> {
    pub operand: Box<E>,
    pub ty: SqlType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LikeExpr<E> {
    pub item: Box<E>,
    pub pattern: Box<E>,
    #[serde(default)]
    pub negated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InList<E> {
    pub item: Box<E>,
    pub values: Vec<E>,
    #[serde(default)]
    pub negated: bool,
    #[serde(default)]
    pub null_expanded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateFunction {
    Count,
    Sum,
    Average,
    Min,
    Max,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateCall<E> {
    pub function: AggregateFunction,
    /// `None` only for `COUNT(*)`.
    pub arg: Option<Box<E>>,
    #[serde(default)]
    pub distinct: bool,
}

impl<E: TypedExpr> AggregateCall<E> {
    pub fn result_type(&self) -> SqlType {
        let arg_ty = self.arg.as_ref().map(|a| a.sql_type());
        match (self.function, arg_ty) {
            (AggregateFunction::Count, _) => SqlType::Int32,
            (AggregateFunction::Average, Some(ty)) if ty.is_integral() => SqlType::Double,
            (_, Some(ty)) => ty,
            (_, None) => SqlType::Int32,
        }
    }
}

/// Date/time component understood by the host's date API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DateUnit {
    Year,
    Quarter,
    Month,
    DayOfYear,
    Day,
    Week,
    Hour,
    Minute,
    Second,
    Millisecond,
}

/// Closed set of host scalar functions the provider knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CanonicalFunction {
    // string
    StringLength,
    Substring,
    ToUpper,
    ToLower,
    Trim,
    TrimStart,
    TrimEnd,
    IndexOf,
    Replace,
    Concat,
    StartsWith,
    EndsWith,
    Contains,
    IsNullOrEmpty,
    IsNullOrWhiteSpace,
    // math
    Abs,
    Sign,
    Sqrt,
    Exp,
    Log,
    Log10,
    Sin,
    Cos,
    Tan,
    Atan,
    Asin,
    Acos,
    Atan2,
    Ceiling,
    Floor,
    Truncate,
    Round,
    Power,
    Max,
    Min,
    // date/time
    Now,
    UtcNow,
    Today,
    DatePart(DateUnit),
    DateAdd(DateUnit),
    DateDiff(DateUnit),
    DateComponent,
    TimeOfDay,
    DateFromParts,
    DayOfWeek,
    DateTimeSubtract,
    TimeOnlySubtract,
    TimeSpanAdd,
    // misc
    NewGuid,
}

impl CanonicalFunction {
    /// Functions that produce a predicate rather than a value.
    pub fn is_predicate(self) -> bool {
        matches!(
            self,
            CanonicalFunction::StartsWith
                | CanonicalFunction::EndsWith
                | CanonicalFunction::Contains
                | CanonicalFunction::IsNullOrEmpty
                | CanonicalFunction::IsNullOrWhiteSpace
        )
    }
}

/// Canonical scalar/predicate expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlExpr {
    Column(ColumnRef),
    Constant(Constant),
    Parameter(ParameterRef),
    Binary(BinaryExpr<SqlExpr>),
    Unary(UnaryExpr<SqlExpr>),
    Function(FunctionCall<SqlExpr>),
    Conditional(Conditional<SqlExpr>),
    Case(CaseChain<SqlExpr>),
    Coalesce(Coalesce<SqlExpr>),
    Convert(Convert<SqlExpr>),
    Like(LikeExpr<SqlExpr>),
    In(InList<SqlExpr>),
    InSubquery {
        item: Box<SqlExpr>,
        query: Box<QueryExpression>,
        #[serde(default)]
        negated: bool,
    },
    Exists {
        query: Box<QueryExpression>,
        #[serde(default)]
        negated: bool,
    },
    ScalarSubquery {
        query: Box<QueryExpression>,
        ty: SqlType,
    },
    Aggregate(AggregateCall<SqlExpr>),
    /// Type test against a polymorphic source (`x is Officer`).
    TypeIs {
        table: String,
        types: Vec<String>,
    },
}

impl SqlExpr {
    pub fn column(table: &str, column: &str, ty: SqlType, nullable: bool) -> Self {
        SqlExpr::Column(ColumnRef {
            table: table.to_string(),
            column: column.to_string(),
            ty,
            nullable,
        })
    }

    pub fn constant(value: Value) -> Self {
        let ty = value.natural_type();
        SqlExpr::Constant(Constant { value, ty })
    }

    pub fn typed_constant(value: Value, ty: SqlType) -> Self {
        SqlExpr::Constant(Constant { value, ty })
    }

    pub fn parameter(name: &str, value: Value, ty: SqlType) -> Self {
        SqlExpr::Parameter(ParameterRef {
            name: name.to_string(),
            value,
            ty,
        })
    }

    pub fn binary(op: BinaryOperator, left: SqlExpr, right: SqlExpr) -> Self {
        SqlExpr::Binary(BinaryExpr {
            op,
            left: Box::new(left),
            right: Box::new(right),
            ty: None,
            null_expanded: false,
        })
    }

    pub fn eq(left: SqlExpr, right: SqlExpr) -> Self {
        Self::binary(BinaryOperator::Equal, left, right)
    }

    pub fn and(left: SqlExpr, right: SqlExpr) -> Self {
        Self::binary(BinaryOperator::AndAlso, left, right)
    }

    pub fn not(operand: SqlExpr) -> Self {
        SqlExpr::Unary(UnaryExpr {
            op: UnaryOperator::Not,
            operand: Box::new(operand),
        })
    }

    pub fn call(function: CanonicalFunction, args: Vec<SqlExpr>, ty: SqlType) -> Self {
        SqlExpr::Function(FunctionCall { function, args, ty })
    }

    /// Direct children, not descending into nested queries.
    pub fn children(&self) -> Vec<&SqlExpr> {
        match self {
            SqlExpr::Column(_)
            | SqlExpr::Constant(_)
            | SqlExpr::Parameter(_)
            | SqlExpr::TypeIs { .. }
            | SqlExpr::Exists { .. }
            | SqlExpr::ScalarSubquery { .. } => vec![],
            SqlExpr::Binary(b) => vec![b.left.as_ref(), b.right.as_ref()],
            SqlExpr::Unary(u) => vec![u.operand.as_ref()],
            SqlExpr::Function(f) => f.args.iter().collect(),
            SqlExpr::Conditional(c) => vec![c.test.as_ref(), c.then.as_ref(), c.otherwise.as_ref()],
            SqlExpr::Case(c) => {
                let mut out: Vec<&SqlExpr> = c.operand.iter().map(|o| o.as_ref()).collect();
                for w in &c.whens {
                    out.push(&w.when);
                    out.push(&w.then);
                }
                out.extend(c.otherwise.iter().map(|o| o.as_ref()));
                out
            }
            SqlExpr::Coalesce(c) => vec![c.left.as_ref(), c.right.as_ref()],
            SqlExpr::Convert(c) => vec![c.operand.as_ref()],
            SqlExpr::Like(l) => vec![l.item.as_ref(), l.pattern.as_ref()],
            SqlExpr::In(i) => {
                let mut out = vec![i.item.as_ref()];
                out.extend(i.values.iter());
                out
            }
            SqlExpr::InSubquery { item, .. } => vec![item.as_ref()],
            SqlExpr::Aggregate(a) => a.arg.iter().map(|a| a.as_ref()).collect(),
        }
    }

    /// Nested query carried by subquery nodes.
    pub fn subquery(&self) -> Option<&QueryExpression> {
        match self {
            SqlExpr::InSubquery { query, .. }
            | SqlExpr::Exists { query, .. }
            | SqlExpr::ScalarSubquery { query, .. } => Some(query),
            _ => None,
        }
    }
}

impl TypedExpr for SqlExpr {
    fn sql_type(&self) -> SqlType {
        match self {
            SqlExpr::Column(c) => c.ty.clone(),
            SqlExpr::Constant(c) => c.ty.clone(),
            SqlExpr::Parameter(p) => p.ty.clone(),
            SqlExpr::Binary(b) => b.result_type(),
            SqlExpr::Unary(u) => match u.op {
                UnaryOperator::Not | UnaryOperator::IsNull | UnaryOperator::IsNotNull => {
                    SqlType::Boolean
                }
                UnaryOperator::Negate | UnaryOperator::BitwiseNot => u.operand.sql_type(),
            },
            SqlExpr::Function(f) => f.ty.clone(),
            SqlExpr::Conditional(c) => {
                if c.then.is_null_literal() {
                    c.otherwise.sql_type()
                } else {
                    c.then.sql_type()
                }
            }
            SqlExpr::Case(c) => c
                .whens
                .iter()
                .map(|w| &w.then)
                .find(|t| !t.is_null_literal())
                .map(TypedExpr::sql_type)
                .or_else(|| c.otherwise.as_ref().map(|o| o.sql_type()))
                .unwrap_or(SqlType::Int32),
            SqlExpr::Coalesce(c) => c.left.sql_type(),
            SqlExpr::Convert(c) => c.ty.clone(),
            SqlExpr::Like(_)
            | SqlExpr::In(_)
            | SqlExpr::InSubquery { .. }
            | SqlExpr::Exists { .. }
            | SqlExpr::TypeIs { .. } => SqlType::Boolean,
            SqlExpr::ScalarSubquery { ty, .. } => ty.clone(),
            SqlExpr::Aggregate(a) => a.result_type(),
        }
    }

    fn is_nullable(&self) -> bool {
        match self {
            SqlExpr::Column(c) => c.nullable,
            SqlExpr::Constant(c) => c.value.is_null(),
            SqlExpr::Parameter(p) => p.value.is_null(),
            SqlExpr::Binary(b) => b.result_nullable(),
            SqlExpr::Unary(u) => match u.op {
                UnaryOperator::IsNull | UnaryOperator::IsNotNull => false,
                _ => u.operand.is_nullable(),
            },
            SqlExpr::Function(f) => f.result_nullable(),
            SqlExpr::Conditional(c) => c.then.is_nullable() || c.otherwise.is_nullable(),
            SqlExpr::Case(c) => {
                c.otherwise.as_ref().map_or(true, |o| o.is_nullable())
                    || c.whens.iter().any(|w| w.then.is_nullable())
            }
            SqlExpr::Coalesce(c) => c.right.is_nullable(),
            SqlExpr::Convert(c) => c.operand.is_nullable(),
            SqlExpr::Like(l) => l.item.is_nullable() || l.pattern.is_nullable(),
            SqlExpr::In(i) => i.item.is_nullable() || i.values.iter().any(|v| v.is_nullable()),
            SqlExpr::InSubquery { item, .. } => item.is_nullable(),
            SqlExpr::Exists { .. } | SqlExpr::TypeIs { .. } => false,
            SqlExpr::ScalarSubquery { .. } => true,
            SqlExpr::Aggregate(a) => a.function != AggregateFunction::Count,
        }
    }

    fn is_null_literal(&self) -> bool {
        match self {
            SqlExpr::Constant(c) => c.value.is_null(),
            SqlExpr::Parameter(p) => p.value.is_null(),
            _ => false,
        }
    }
}
