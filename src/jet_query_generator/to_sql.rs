//! Expression lowering.
//!
//! `lower_predicate`/`lower_value` are the entry points: they run the
//! null-semantics expansion once and then emit text with the boolean context
//! pushed on the translation context. The `emit_*` functions work on already
//! expanded trees and are shared with the function translator.

use crate::dialect::{BitwiseOperatorForm, NullSemanticsMode};
use crate::query_tree::{
    AggregateCall, AggregateFunction, BinaryExpr, BinaryOperator, CaseChain, Conditional,
    Convert, SqlType, TypedExpr, UnaryExpr, UnaryOperator,
};
use crate::render_plan::context::{ExprContext, TranslationContext};
use crate::render_plan::errors::RenderBuildError;
use crate::render_plan::render_expr::RenderExpr;
use crate::render_plan::{RenderPlan, ToSql};

use super::common::{conversion_function, format_literal, qualified_column};
use super::errors::JetQueryGeneratorError;
use super::function_translator::translate_scalar_function;
use super::null_semantics;

type LowerResult = Result<String, RenderBuildError>;

pub fn lower_predicate(expr: &RenderExpr, ctx: &mut TranslationContext<'_>) -> LowerResult {
    let expanded = null_semantics::expand(expr, ctx.null_semantics());
    emit_predicate(&expanded, ctx)
}

pub fn lower_value(expr: &RenderExpr, ctx: &mut TranslationContext<'_>) -> LowerResult {
    let expanded = null_semantics::expand(expr, ctx.null_semantics());
    emit_value(&expanded, ctx)
}

impl ToSql for RenderExpr {
    fn to_sql(&self, ctx: &mut TranslationContext<'_>) -> Result<String, RenderBuildError> {
        lower_value(self, ctx)
    }
}

pub(crate) fn emit_predicate(expr: &RenderExpr, ctx: &mut TranslationContext<'_>) -> LowerResult {
    ctx.with_context(ExprContext::Predicate, |ctx| predicate_text(expr, ctx))
}

pub(crate) fn emit_value(expr: &RenderExpr, ctx: &mut TranslationContext<'_>) -> LowerResult {
    ctx.with_context(ExprContext::Value, |ctx| value_text(expr, ctx))
}

/// Indent every line of `sql` by four spaces and wrap it in parentheses.
pub(crate) fn parenthesized_subquery(sql: &str) -> String {
    let body = sql
        .lines()
        .map(|line| format!("    {}", line))
        .collect::<Vec<_>>()
        .join("\n");
    format!("(\n{}\n)", body)
}

pub(crate) fn render_subquery(plan: &RenderPlan, ctx: &mut TranslationContext<'_>) -> LowerResult {
    let sql = plan.to_sql(ctx)?;
    Ok(parenthesized_subquery(&sql))
}

fn invalid(message: impl Into<String>) -> RenderBuildError {
    JetQueryGeneratorError::InvalidExpression(message.into()).into()
}

// ---------------------------------------------------------------------------
// Predicate position
// ---------------------------------------------------------------------------

fn predicate_text(expr: &RenderExpr, ctx: &mut TranslationContext<'_>) -> LowerResult {
    if let Some(value) = expr.constant_bool() {
        return Ok(if value { "1 = 1" } else { "0 = 1" }.to_string());
    }
    let true_literal = ctx.profile().true_literal();
    match expr {
        // NOT over a bool value: `flag <> TRUE`
        RenderExpr::Unary(u)
            if u.op == UnaryOperator::Not
                && !u.operand.is_predicate()
                && u.operand.sql_type().is_boolean() =>
        {
            if let Some(value) = u.operand.constant_bool() {
                return Ok(if value { "0 = 1" } else { "1 = 1" }.to_string());
            }
            let operand = emit_value(&u.operand, ctx)?;
            Ok(format!("{} <> {}", operand, true_literal))
        }
        e if e.is_predicate() => predicate_node(e, ctx),
        e if e.sql_type().is_boolean() => {
            let value = emit_value(e, ctx)?;
            Ok(format!("{} = {}", value, true_literal))
        }
        other => Err(invalid(format!(
            "{:?} expression used as a predicate",
            other.sql_type()
        ))),
    }
}

fn predicate_node(expr: &RenderExpr, ctx: &mut TranslationContext<'_>) -> LowerResult {
    match expr {
        RenderExpr::Binary(b) if b.op.is_logical() || b.op.is_bitwise() => connective(b, ctx),
        RenderExpr::Binary(b) => comparison(b, ctx),
        RenderExpr::Unary(u) => match u.op {
            UnaryOperator::IsNull | UnaryOperator::IsNotNull => {
                let operand = emit_value(&u.operand, ctx)?;
                let operand = wrap_compound(operand, &u.operand);
                let test = if u.op == UnaryOperator::IsNull {
                    "IS NULL"
                } else {
                    "IS NOT NULL"
                };
                Ok(format!("{} {}", operand, test))
            }
            // Not, or BitwiseNot over a bool
            _ => {
                let operand = emit_predicate(&u.operand, ctx)?;
                Ok(format!("NOT ({})", operand))
            }
        },
        RenderExpr::Function(call) => translate_scalar_function(call, ctx),
        RenderExpr::Like(like) => {
            let item = emit_value(&like.item, ctx)?;
            let pattern = emit_value(&like.pattern, ctx)?;
            let keyword = if like.negated { "NOT LIKE" } else { "LIKE" };
            Ok(format!("{} {} {}", wrap_compound(item, &like.item), keyword, pattern))
        }
        RenderExpr::In(list) => {
            if list.values.is_empty() {
                return Ok(if list.negated { "1 = 1" } else { "0 = 1" }.to_string());
            }
            let item = emit_value(&list.item, ctx)?;
            let values = list
                .values
                .iter()
                .map(|v| emit_value(v, ctx))
                .collect::<Result<Vec<_>, _>>()?;
            let keyword = if list.negated { "NOT IN" } else { "IN" };
            Ok(format!(
                "{} {} ({})",
                wrap_compound(item, &list.item),
                keyword,
                values.join(", ")
            ))
        }
        RenderExpr::InSubquery {
            item,
            plan,
            negated,
        } => {
            let item_sql = emit_value(item, ctx)?;
            let subquery = render_subquery(plan, ctx)?;
            let keyword = if *negated { "NOT IN" } else { "IN" };
            Ok(format!("{} {} {}", wrap_compound(item_sql, item), keyword, subquery))
        }
        RenderExpr::Exists { plan, negated } => {
            let subquery = render_subquery(plan, ctx)?;
            if *negated {
                Ok(format!("NOT (EXISTS {})", subquery))
            } else {
                Ok(format!("EXISTS {}", subquery))
            }
        }
        other => Err(invalid(format!("{:?} is not a predicate", other))),
    }
}

fn connective(b: &BinaryExpr<RenderExpr>, ctx: &mut TranslationContext<'_>) -> LowerResult {
    let left = emit_predicate(&b.left, ctx)?;
    let right = emit_predicate(&b.right, ctx)?;
    let keyword = match b.op {
        BinaryOperator::AndAlso | BinaryOperator::BitwiseAnd => "AND",
        BinaryOperator::OrElse | BinaryOperator::BitwiseOr => "OR",
        BinaryOperator::ExclusiveOr => "XOR",
        other => return Err(invalid(format!("{:?} is not a connective", other))),
    };
    let left = wrap_connective_operand(left, &b.left, keyword);
    let right = wrap_connective_operand(right, &b.right, keyword);
    Ok(format!("{} {} {}", left, keyword, right))
}

fn connective_keyword(expr: &RenderExpr) -> Option<&'static str> {
    match expr {
        RenderExpr::Binary(b) if b.op.is_logical() || (b.op.is_bitwise() && expr.is_predicate()) => {
            match b.op {
                BinaryOperator::AndAlso | BinaryOperator::BitwiseAnd => Some("AND"),
                BinaryOperator::OrElse | BinaryOperator::BitwiseOr => Some("OR"),
                _ => Some("XOR"),
            }
        }
        _ => None,
    }
}

/// `AND` inside `OR` and vice versa is always parenthesized.
fn wrap_connective_operand(sql: String, operand: &RenderExpr, parent: &str) -> String {
    match connective_keyword(operand) {
        Some(child) if child != parent || parent == "XOR" => format!("({})", sql),
        _ => sql,
    }
}

fn comparison(b: &BinaryExpr<RenderExpr>, ctx: &mut TranslationContext<'_>) -> LowerResult {
    let symbol = match b.op {
        BinaryOperator::Equal => "=",
        BinaryOperator::NotEqual => "<>",
        BinaryOperator::LessThan => "<",
        BinaryOperator::LessThanOrEqual => "<=",
        BinaryOperator::GreaterThan => ">",
        BinaryOperator::GreaterThanOrEqual => ">=",
        other => return Err(invalid(format!("{:?} is not a comparison", other))),
    };
    let left = emit_value(&b.left, ctx)?;
    let right = emit_value(&b.right, ctx)?;
    Ok(format!(
        "{} {} {}",
        wrap_bitwise(left, &b.left),
        symbol,
        wrap_bitwise(right, &b.right)
    ))
}

fn wrap_bitwise(sql: String, operand: &RenderExpr) -> String {
    match operand {
        RenderExpr::Binary(b) if b.op.is_bitwise() => format!("({})", sql),
        _ => sql,
    }
}

/// Parenthesize operator nodes in front of a postfix test (`IS NULL`, `LIKE`, `IN`).
fn wrap_compound(sql: String, operand: &RenderExpr) -> String {
    match operand {
        RenderExpr::Binary(_) | RenderExpr::Unary(_) => format!("({})", sql),
        _ => sql,
    }
}

// ---------------------------------------------------------------------------
// Value position
// ---------------------------------------------------------------------------

fn value_text(expr: &RenderExpr, ctx: &mut TranslationContext<'_>) -> LowerResult {
    if expr.is_predicate() {
        return predicate_as_value(expr, ctx);
    }
    log::trace!("Lowering value {:?}", expr);
    match expr {
        RenderExpr::Column(c) => Ok(qualified_column(&c.table_alias, &c.column, ctx.profile())),
        RenderExpr::Constant(c) => Ok(format_literal(&c.value, &c.ty, ctx)?),
        RenderExpr::Parameter(p) => Ok(ctx.add_parameter(&p.name, &p.value, &p.ty)),
        RenderExpr::Binary(b) => operator_value(expr, b, ctx),
        RenderExpr::Unary(u) => unary_value(u, ctx),
        RenderExpr::Function(call) => translate_scalar_function(call, ctx),
        RenderExpr::Conditional(c) => conditional(c, ctx),
        RenderExpr::Case(c) => case_chain(c, ctx),
        RenderExpr::Coalesce(c) => {
            let left = emit_value(&c.left, ctx)?;
            let right = emit_value(&c.right, ctx)?;
            Ok(format!("IIF({} IS NULL, {}, {})", wrap_compound(left.clone(), &c.left), right, left))
        }
        RenderExpr::Convert(c) => convert(c, ctx),
        RenderExpr::ScalarSubquery { plan, .. } => render_subquery(plan, ctx),
        RenderExpr::Aggregate(a) => aggregate(a, ctx),
        RenderExpr::Like(_)
        | RenderExpr::In(_)
        | RenderExpr::InSubquery { .. }
        | RenderExpr::Exists { .. } => predicate_as_value(expr, ctx),
    }
}

/// Predicate in value position: `IIF(p, TRUE, FALSE)`.
fn predicate_as_value(expr: &RenderExpr, ctx: &mut TranslationContext<'_>) -> LowerResult {
    let predicate = emit_predicate(expr, ctx)?;
    let profile = ctx.profile();
    let (t, f) = (profile.true_literal(), profile.false_literal());
    let unknown_is_null =
        ctx.null_semantics() == NullSemanticsMode::Relational && expr.is_nullable();
    Ok(match (profile.supports_case, unknown_is_null) {
        (true, false) => format!("CASE WHEN {} THEN {} ELSE {} END", predicate, t, f),
        (true, true) => format!(
            "CASE WHEN {} THEN {} WHEN NOT ({}) THEN {} END",
            predicate, t, predicate, f
        ),
        (false, false) => format!("IIF({}, {}, {})", predicate, t, f),
        (false, true) => format!(
            "IIF({}, {}, IIF(NOT ({}), {}, NULL))",
            predicate, t, predicate, f
        ),
    })
}

fn conditional(c: &Conditional<RenderExpr>, ctx: &mut TranslationContext<'_>) -> LowerResult {
    let test = emit_predicate(&c.test, ctx)?;
    let then = emit_value(&c.then, ctx)?;
    let otherwise = emit_value(&c.otherwise, ctx)?;
    let unknown_is_null =
        ctx.null_semantics() == NullSemanticsMode::Relational && c.test.is_nullable();
    Ok(match (ctx.profile().supports_case, unknown_is_null) {
        (true, false) => format!("CASE WHEN {} THEN {} ELSE {} END", test, then, otherwise),
        (true, true) => format!(
            "CASE WHEN {} THEN {} WHEN NOT ({}) THEN {} END",
            test, then, test, otherwise
        ),
        (false, false) => format!("IIF({}, {}, {})", test, then, otherwise),
        (false, true) => format!(
            "IIF({}, {}, IIF(NOT ({}), {}, NULL))",
            test, then, test, otherwise
        ),
    })
}

/// Searched case chain; an unknown `WHEN` falls through to the next branch.
fn case_chain(c: &CaseChain<RenderExpr>, ctx: &mut TranslationContext<'_>) -> LowerResult {
    if c.operand.is_some() {
        return Err(invalid("simple CASE reached lowering without desugaring"));
    }
    let mut branches = Vec::with_capacity(c.whens.len());
    for w in &c.whens {
        let when = emit_predicate(&w.when, ctx)?;
        let then = emit_value(&w.then, ctx)?;
        branches.push((when, then));
    }
    let otherwise = match &c.otherwise {
        Some(o) => emit_value(o, ctx)?,
        None => "NULL".to_string(),
    };
    if ctx.profile().supports_case {
        let whens: String = branches
            .iter()
            .map(|(w, t)| format!(" WHEN {} THEN {}", w, t))
            .collect();
        return Ok(format!("CASE{} ELSE {} END", whens, otherwise));
    }
    Ok(branches
        .into_iter()
        .rev()
        .fold(otherwise, |acc, (when, then)| format!("IIF({}, {}, {})", when, then, acc)))
}

fn convert(c: &Convert<RenderExpr>, ctx: &mut TranslationContext<'_>) -> LowerResult {
    let operand = emit_value(&c.operand, ctx)?;
    if c.operand.sql_type().storage() == c.ty.storage() {
        return Ok(operand);
    }
    convert_text(operand, &c.operand, &c.ty)
}

/// Conversion call to `target`, null-guarded when the operand is nullable.
pub(crate) fn convert_text(sql: String, operand: &RenderExpr, target: &SqlType) -> LowerResult {
    let Some(function) = conversion_function(target) else {
        return Err(JetQueryGeneratorError::UnsupportedConversion(format!(
            "{:?}",
            target.storage()
        ))
        .into());
    };
    if operand.is_nullable() && !operand.is_null_literal() {
        Ok(format!(
            "IIF({} IS NULL, NULL, {}({}))",
            wrap_compound(sql.clone(), operand),
            function,
            sql
        ))
    } else {
        Ok(format!("{}({})", function, sql))
    }
}

fn aggregate(a: &AggregateCall<RenderExpr>, ctx: &mut TranslationContext<'_>) -> LowerResult {
    if a.distinct {
        return Err(RenderBuildError::UnsupportedNodeKind(
            "DISTINCT aggregate inside an expression".to_string(),
        ));
    }
    let Some(arg) = &a.arg else {
        return match a.function {
            AggregateFunction::Count => Ok("COUNT(*)".to_string()),
            other => Err(invalid(format!("{:?} without an argument", other))),
        };
    };
    let arg_sql = emit_value(arg, ctx)?;
    Ok(match a.function {
        AggregateFunction::Count => format!("COUNT({})", arg_sql),
        AggregateFunction::Sum => format!("SUM({})", arg_sql),
        AggregateFunction::Min => format!("MIN({})", arg_sql),
        AggregateFunction::Max => format!("MAX({})", arg_sql),
        AggregateFunction::Average if arg.sql_type().is_integral() => {
            format!("AVG({})", convert_text(arg_sql, arg, &SqlType::Double)?)
        }
        AggregateFunction::Average => format!("AVG({})", arg_sql),
    })
}

/// Operand of a prefix operator; negative literals are parenthesized so
/// `-(-1)` never reads as `--1`.
fn wrap_prefix_operand(sql: String, operand: &RenderExpr) -> String {
    if sql.starts_with('-') && !matches!(operand, RenderExpr::Binary(_) | RenderExpr::Unary(_)) {
        return format!("({})", sql);
    }
    wrap_compound(sql, operand)
}

fn unary_value(u: &UnaryExpr<RenderExpr>, ctx: &mut TranslationContext<'_>) -> LowerResult {
    let operand = emit_value(&u.operand, ctx)?;
    match u.op {
        UnaryOperator::Negate => Ok(format!("-{}", wrap_prefix_operand(operand, &u.operand))),
        UnaryOperator::BitwiseNot => match ctx.profile().bitwise_operator_form {
            BitwiseOperatorForm::Keyword => Ok(format!("BNOT({})", operand)),
            BitwiseOperatorForm::Symbol => {
                Ok(format!("~{}", wrap_prefix_operand(operand, &u.operand)))
            }
        },
        other => Err(invalid(format!("{:?} in value position", other))),
    }
}

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

fn is_integer_division(b: &BinaryExpr<RenderExpr>) -> bool {
    b.op == BinaryOperator::Divide && b.left.sql_type().is_integral() && b.right.sql_type().is_integral()
}

fn is_concatenation(expr: &RenderExpr) -> bool {
    matches!(expr, RenderExpr::Binary(b) if b.op == BinaryOperator::Add && b.result_type().is_string())
}

/// Binding strength of an operator node in value position.
fn precedence(expr: &RenderExpr) -> u8 {
    match expr {
        RenderExpr::Binary(b) if !expr.is_predicate() => {
            if is_concatenation(expr) {
                return 2;
            }
            match b.op {
                BinaryOperator::Multiply => 6,
                BinaryOperator::Divide if is_integer_division(b) => 5,
                BinaryOperator::Divide => 6,
                BinaryOperator::Modulo => 4,
                BinaryOperator::Add | BinaryOperator::Subtract => 3,
                _ => 1,
            }
        }
        RenderExpr::Unary(u) if u.op == UnaryOperator::Negate => 7,
        _ => 9,
    }
}

fn operator_value(
    node: &RenderExpr,
    b: &BinaryExpr<RenderExpr>,
    ctx: &mut TranslationContext<'_>,
) -> LowerResult {
    if is_concatenation(node) {
        let mut operands = Vec::new();
        flatten_concatenation(node, &mut operands);
        return render_concatenation(&operands, ctx);
    }
    let symbol = match b.op {
        BinaryOperator::Add => "+",
        BinaryOperator::Subtract => "-",
        BinaryOperator::Multiply => "*",
        BinaryOperator::Divide if is_integer_division(b) => "\\",
        BinaryOperator::Divide => "/",
        BinaryOperator::Modulo => "MOD",
        BinaryOperator::BitwiseAnd | BinaryOperator::BitwiseOr | BinaryOperator::ExclusiveOr => {
            bitwise_symbol(b.op, ctx.profile().bitwise_operator_form)
        }
        other => return Err(invalid(format!("{:?} in value position", other))),
    };
    let result_ty = b.result_type();
    let parent = precedence(node);
    let non_commutative = matches!(
        b.op,
        BinaryOperator::Subtract | BinaryOperator::Divide | BinaryOperator::Modulo
    );
    let left = operator_operand(&b.left, &result_ty, parent, false, ctx)?;
    let right = operator_operand(&b.right, &result_ty, parent, non_commutative, ctx)?;
    Ok(format!("{} {} {}", left, symbol, right))
}

fn bitwise_symbol(op: BinaryOperator, form: BitwiseOperatorForm) -> &'static str {
    match (form, op) {
        (BitwiseOperatorForm::Keyword, BinaryOperator::BitwiseAnd) => "BAND",
        (BitwiseOperatorForm::Keyword, BinaryOperator::BitwiseOr) => "BOR",
        (BitwiseOperatorForm::Keyword, _) => "BXOR",
        (BitwiseOperatorForm::Symbol, BinaryOperator::BitwiseAnd) => "&",
        (BitwiseOperatorForm::Symbol, BinaryOperator::BitwiseOr) => "|",
        (BitwiseOperatorForm::Symbol, _) => "^",
    }
}

/// Operand of an arithmetic/bitwise node: converted to the node's type when
/// its storage type differs, parenthesized by precedence.
fn operator_operand(
    operand: &RenderExpr,
    result_ty: &SqlType,
    parent: u8,
    strict_right: bool,
    ctx: &mut TranslationContext<'_>,
) -> LowerResult {
    let sql = emit_value(operand, ctx)?;
    let needs_conversion = !matches!(operand, RenderExpr::Constant(_) | RenderExpr::Parameter(_))
        && !result_ty.is_temporal()
        && !operand.sql_type().is_temporal()
        && operand.sql_type().storage() != result_ty.storage();
    if needs_conversion {
        return convert_text(sql, operand, result_ty);
    }
    let child = precedence(operand);
    if child < parent || (strict_right && child == parent) {
        Ok(format!("({})", sql))
    } else {
        Ok(sql)
    }
}

fn flatten_concatenation<'e>(expr: &'e RenderExpr, out: &mut Vec<&'e RenderExpr>) {
    match expr {
        RenderExpr::Binary(b) if is_concatenation(expr) => {
            flatten_concatenation(&b.left, out);
            flatten_concatenation(&b.right, out);
        }
        other => out.push(other),
    }
}

/// `a & b & ...` with the null handling the mode and profile require.
pub(crate) fn render_concatenation(
    operands: &[&RenderExpr],
    ctx: &mut TranslationContext<'_>,
) -> LowerResult {
    let mut parts = Vec::with_capacity(operands.len());
    for operand in operands {
        let sql = emit_value(operand, ctx)?;
        let sql = if precedence(operand) <= 2 {
            format!("({})", sql)
        } else {
            sql
        };
        parts.push((sql, operand.is_nullable() && !operand.is_null_literal()));
    }
    let mode = ctx.null_semantics();
    let null_as_empty = ctx.profile().concat_null_as_empty;
    let nullable: Vec<&String> = parts.iter().filter(|(_, n)| *n).map(|(s, _)| s).collect();

    if mode == NullSemanticsMode::Relational && null_as_empty && !nullable.is_empty() {
        let guard = nullable
            .iter()
            .map(|s| format!("{} IS NULL", s))
            .collect::<Vec<_>>()
            .join(" OR ");
        let joined = parts
            .iter()
            .map(|(s, _)| s.as_str())
            .collect::<Vec<_>>()
            .join(" & ");
        return Ok(format!("IIF({}, NULL, {})", guard, joined));
    }
    if mode == NullSemanticsMode::TwoValued && !null_as_empty {
        return Ok(parts
            .iter()
            .map(|(s, n)| {
                if *n {
                    format!("IIF({} IS NULL, '', {})", s, s)
                } else {
                    s.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" & "));
    }
    Ok(parts
        .iter()
        .map(|(s, _)| s.as_str())
        .collect::<Vec<_>>()
        .join(" & "))
}
