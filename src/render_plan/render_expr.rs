use crate::query_tree::{
    AggregateCall, AggregateFunction, BinaryExpr, BinaryOperator, CaseChain, CaseWhen, Coalesce,
    Conditional, Constant, Convert, FunctionCall, InList, LikeExpr, ParameterRef, SqlType,
    TypedExpr, UnaryExpr, UnaryOperator, Value,
};

use super::RenderPlan;

/// Column bound to a physical (statement-level) alias.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnExpr {
    pub table_alias: String,
    pub column: String,
    pub ty: SqlType,
    pub nullable: bool,
}

/// Resolved expression: canonical shape with every column bound to a
/// physical alias and every nested query already planned.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderExpr {
    Column(ColumnExpr),
    Constant(Constant),
    Parameter(ParameterRef),
    Binary(BinaryExpr<RenderExpr>),
    Unary(UnaryExpr<RenderExpr>),
    Function(FunctionCall<RenderExpr>),
    Conditional(Conditional<RenderExpr>),
    Case(CaseChain<RenderExpr>),
    Coalesce(Coalesce<RenderExpr>),
    Convert(Convert<RenderExpr>),
    Like(LikeExpr<RenderExpr>),
    In(InList<RenderExpr>),
    InSubquery {
        item: Box<RenderExpr>,
        plan: Box<RenderPlan>,
        negated: bool,
    },
    Exists {
        plan: Box<RenderPlan>,
        negated: bool,
    },
    ScalarSubquery {
        plan: Box<RenderPlan>,
        ty: SqlType,
    },
    Aggregate(AggregateCall<RenderExpr>),
}

impl RenderExpr {
    pub fn column(table_alias: &str, column: &str, ty: SqlType, nullable: bool) -> Self {
        RenderExpr::Column(ColumnExpr {
            table_alias: table_alias.to_string(),
            column: column.to_string(),
            ty,
            nullable,
        })
    }

    pub fn constant(value: Value) -> Self {
        let ty = value.natural_type();
        RenderExpr::Constant(Constant { value, ty })
    }

    pub fn null(ty: SqlType) -> Self {
        RenderExpr::Constant(Constant {
            value: Value::Null,
            ty,
        })
    }

    pub fn boolean(value: bool) -> Self {
        RenderExpr::constant(Value::Boolean(value))
    }

    pub fn binary(op: BinaryOperator, left: RenderExpr, right: RenderExpr) -> Self {
        RenderExpr::Binary(BinaryExpr {
            op,
            left: Box::new(left),
            right: Box::new(right),
            ty: None,
            null_expanded: false,
        })
    }

    /// Comparison already in its final null-semantics form.
    pub fn expanded(op: BinaryOperator, left: RenderExpr, right: RenderExpr) -> Self {
        RenderExpr::Binary(BinaryExpr {
            op,
            left: Box::new(left),
            right: Box::new(right),
            ty: None,
            null_expanded: true,
        })
    }

    pub fn and(left: RenderExpr, right: RenderExpr) -> Self {
        Self::binary(BinaryOperator::AndAlso, left, right)
    }

    pub fn or(left: RenderExpr, right: RenderExpr) -> Self {
        Self::binary(BinaryOperator::OrElse, left, right)
    }

    pub fn unary(op: UnaryOperator, operand: RenderExpr) -> Self {
        RenderExpr::Unary(UnaryExpr {
            op,
            operand: Box::new(operand),
        })
    }

    pub fn is_null(operand: RenderExpr) -> Self {
        Self::unary(UnaryOperator::IsNull, operand)
    }

    pub fn is_not_null(operand: RenderExpr) -> Self {
        Self::unary(UnaryOperator::IsNotNull, operand)
    }

    pub fn not(operand: RenderExpr) -> Self {
        Self::unary(UnaryOperator::Not, operand)
    }

    pub fn count_star() -> Self {
        RenderExpr::Aggregate(AggregateCall {
            function: AggregateFunction::Count,
            arg: None,
            distinct: false,
        })
    }

    /// Folds a list of predicates with `AND`; `None` for an empty list.
    pub fn conjunction(items: impl IntoIterator<Item = RenderExpr>) -> Option<RenderExpr> {
        items.into_iter().reduce(RenderExpr::and)
    }

    pub fn constant_bool(&self) -> Option<bool> {
        match self {
            RenderExpr::Constant(Constant {
                value: Value::Boolean(b),
                ..
            }) => Some(*b),
            _ => None,
        }
    }

    /// `true` for nodes that are predicates in the dialect (comparisons,
    /// connectives, LIKE, IN, EXISTS, null tests, predicate functions).
    pub fn is_predicate(&self) -> bool {
        match self {
            RenderExpr::Binary(b) => {
                b.op.is_comparison()
                    || b.op.is_logical()
                    || (b.op.is_bitwise() && b.result_type().is_boolean())
            }
            RenderExpr::Unary(u) => match u.op {
                UnaryOperator::Not | UnaryOperator::IsNull | UnaryOperator::IsNotNull => true,
                UnaryOperator::BitwiseNot => u.operand.sql_type().is_boolean(),
                UnaryOperator::Negate => false,
            },
            RenderExpr::Function(f) => f.function.is_predicate(),
            RenderExpr::Like(_)
            | RenderExpr::In(_)
            | RenderExpr::InSubquery { .. }
            | RenderExpr::Exists { .. } => true,
            _ => false,
        }
    }

    pub fn is_simple(&self) -> bool {
        matches!(
            self,
            RenderExpr::Column(_) | RenderExpr::Constant(_) | RenderExpr::Parameter(_)
        )
    }

    pub fn as_column(&self) -> Option<&ColumnExpr> {
        match self {
            RenderExpr::Column(c) => Some(c),
            _ => None,
        }
    }

    /// Rebuild the node with `f` applied to every direct child. Nested plans are shared as is.
    pub fn map_children(&self, f: &mut dyn FnMut(&RenderExpr) -> RenderExpr) -> RenderExpr {
        match self {
            RenderExpr::Column(_) | RenderExpr::Constant(_) | RenderExpr::Parameter(_) => {
                self.clone()
            }
            RenderExpr::Exists { .. } | RenderExpr::ScalarSubquery { .. } => self.clone(),
            RenderExpr::Binary(b) => RenderExpr::Binary(BinaryExpr {
                op: b.op,
                left: Box::new(f(&b.left)),
                right: Box::new(f(&b.right)),
                ty: b.ty.clone(),
                null_expanded: b.null_expanded,
            }),
            RenderExpr::Unary(u) => RenderExpr::Unary(UnaryExpr {
                op: u.op,
                operand: Box::new(f(&u.operand)),
            }),
            RenderExpr::Function(call) => RenderExpr::Function(FunctionCall {
                function: call.function,
                args: call.args.iter().map(|a| f(a)).collect(),
                ty: call.ty.clone(),
            }),
            RenderExpr::Conditional(c) => RenderExpr::Conditional(Conditional {
                test: Box::new(f(&c.test)),
                then: Box::new(f(&c.then)),
                otherwise: Box::new(f(&c.otherwise)),
            }),
            RenderExpr::Case(c) => RenderExpr::Case(CaseChain {
                operand: c.operand.as_ref().map(|o| Box::new(f(o))),
                whens: c
                    .whens
                    .iter()
                    .map(|w| CaseWhen {
                        when: f(&w.when),
                        then: f(&w.then),
                    })
                    .collect(),
                otherwise: c.otherwise.as_ref().map(|o| Box::new(f(o))),
            }),
            RenderExpr::Coalesce(c) => RenderExpr::Coalesce(Coalesce {
                left: Box::new(f(&c.left)),
                right: Box::new(f(&c.right)),
            }),
            RenderExpr::Convert(c) => RenderExpr::Convert(Convert {
                operand: Box::new(f(&c.operand)),
                ty: c.ty.clone(),
            }),
            RenderExpr::Like(l) => RenderExpr::Like(LikeExpr {
                item: Box::new(f(&l.item)),
                pattern: Box::new(f(&l.pattern)),
                negated: l.negated,
            }),
            RenderExpr::In(i) => RenderExpr::In(InList {
                item: Box::new(f(&i.item)),
                values: i.values.iter().map(|v| f(v)).collect(),
                negated: i.negated,
                null_expanded: i.null_expanded,
            }),
            RenderExpr::InSubquery {
                item,
                plan,
                negated,
            } => RenderExpr::InSubquery {
                item: Box::new(f(item)),
                plan: plan.clone(),
                negated: *negated,
            },
            RenderExpr::Aggregate(a) => RenderExpr::Aggregate(AggregateCall {
                function: a.function,
                arg: a.arg.as_ref().map(|x| Box::new(f(x))),
                distinct: a.distinct,
            }),
        }
    }

    /// Same expression with nullability forced on (columns of left-joined sources).
    pub fn into_nullable(self) -> RenderExpr {
        match self {
            RenderExpr::Column(mut c) => {
                c.nullable = true;
                RenderExpr::Column(c)
            }
            other => other,
        }
    }
}

impl TypedExpr for RenderExpr {
    fn sql_type(&self) -> SqlType {
        match self {
            RenderExpr::Column(c) => c.ty.clone(),
            RenderExpr::Constant(c) => c.ty.clone(),
            RenderExpr::Parameter(p) => p.ty.clone(),
            RenderExpr::Binary(b) => b.result_type(),
            RenderExpr::Unary(u) => match u.op {
                UnaryOperator::Not | UnaryOperator::IsNull | UnaryOperator::IsNotNull => {
                    SqlType::Boolean
                }
                UnaryOperator::Negate | UnaryOperator::BitwiseNot => u.operand.sql_type(),
            },
            RenderExpr::Function(f) => f.ty.clone(),
            RenderExpr::Conditional(c) => {
                if c.then.is_null_literal() {
                    c.otherwise.sql_type()
                } else {
                    c.then.sql_type()
                }
            }
            RenderExpr::Case(c) => c
                .whens
                .iter()
                .map(|w| &w.then)
                .find(|t| !t.is_null_literal())
                .map(TypedExpr::sql_type)
                .or_else(|| c.otherwise.as_ref().map(|o| o.sql_type()))
                .unwrap_or(SqlType::Int32),
            RenderExpr::Coalesce(c) => c.left.sql_type(),
            RenderExpr::Convert(c) => c.ty.clone(),
            RenderExpr::Like(_)
            | RenderExpr::In(_)
            | RenderExpr::InSubquery { .. }
            | RenderExpr::Exists { .. } => SqlType::Boolean,
            RenderExpr::ScalarSubquery { ty, .. } => ty.clone(),
            RenderExpr::Aggregate(a) => a.result_type(),
        }
    }

    fn is_nullable(&self) -> bool {
        match self {
            RenderExpr::Column(c) => c.nullable,
            RenderExpr::Constant(c) => c.value.is_null(),
            RenderExpr::Parameter(p) => p.value.is_null(),
            RenderExpr::Binary(b) => b.result_nullable(),
            RenderExpr::Unary(u) => match u.op {
                UnaryOperator::IsNull | UnaryOperator::IsNotNull => false,
                _ => u.operand.is_nullable(),
            },
            RenderExpr::Function(f) => f.result_nullable(),
            RenderExpr::Conditional(c) => c.then.is_nullable() || c.otherwise.is_nullable(),
            RenderExpr::Case(c) => {
                c.otherwise.as_ref().map_or(true, |o| o.is_nullable())
                    || c.whens.iter().any(|w| w.then.is_nullable())
            }
            RenderExpr::Coalesce(c) => c.right.is_nullable(),
            RenderExpr::Convert(c) => c.operand.is_nullable(),
            RenderExpr::Like(l) => l.item.is_nullable() || l.pattern.is_nullable(),
            RenderExpr::In(i) => i.item.is_nullable() || i.values.iter().any(|v| v.is_nullable()),
            RenderExpr::InSubquery { item, .. } => item.is_nullable(),
            RenderExpr::Exists { .. } => false,
            RenderExpr::ScalarSubquery { .. } => true,
            RenderExpr::Aggregate(a) => a.function != AggregateFunction::Count,
        }
    }

    fn is_null_literal(&self) -> bool {
        match self {
            RenderExpr::Constant(c) => c.value.is_null(),
            RenderExpr::Parameter(p) => p.value.is_null(),
            _ => false,
        }
    }
}
