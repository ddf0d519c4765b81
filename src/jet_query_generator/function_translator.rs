/// Canonical Function Translator
///
/// Renders canonical scalar function calls through the registry. Direct
/// mappings are handled generically; `Special` rules need the argument
/// expressions themselves (literal patterns, interval units, operator forms).
use crate::query_tree::{CanonicalFunction, DateUnit, FunctionCall, SqlType, TypedExpr, Value};
use crate::render_plan::context::TranslationContext;
use crate::render_plan::errors::RenderBuildError;
use crate::render_plan::render_expr::RenderExpr;

use super::common::{escape_like_pattern, format_string};
use super::errors::JetQueryGeneratorError;
use super::function_registry::{
    day_fraction_divisor, function_rule, interval_code, FunctionMapping, FunctionRule,
};
use super::to_sql::{emit_value, render_concatenation};

pub use super::function_registry::is_function_supported;

type TranslateResult = Result<String, RenderBuildError>;

fn function_name(function: CanonicalFunction) -> String {
    format!("{:?}", function)
}

fn unsupported(function: CanonicalFunction, reason: &str) -> RenderBuildError {
    JetQueryGeneratorError::unsupported_function(function_name(function), reason).into()
}

/// Translate a canonical function call to Jet SQL.
pub fn translate_scalar_function(
    call: &FunctionCall<RenderExpr>,
    ctx: &mut TranslationContext<'_>,
) -> TranslateResult {
    match function_rule(call.function) {
        FunctionRule::Unsupported(reason) => Err(unsupported(call.function, reason)),
        FunctionRule::Mapped(mapping) => translate_mapped(&mapping, call, ctx),
        FunctionRule::Special => translate_special(call, ctx),
    }
}

fn translate_mapped(
    mapping: &FunctionMapping,
    call: &FunctionCall<RenderExpr>,
    ctx: &mut TranslationContext<'_>,
) -> TranslateResult {
    let args = lower_args(call, ctx)?;
    let args = match mapping.arg_transform {
        Some(transform) => transform(&args),
        None => args,
    };
    let sql = format!("{}({})", mapping.jet_name, args.join(", "));

    let guard_first = mapping.null_guard
        && ctx.profile().length_requires_null_guard
        && call.args.first().is_some_and(|a| a.is_nullable());
    match args.first() {
        Some(first) if guard_first => Ok(format!("IIF({} IS NULL, NULL, {})", first, sql)),
        _ => Ok(sql),
    }
}

fn lower_args(
    call: &FunctionCall<RenderExpr>,
    ctx: &mut TranslationContext<'_>,
) -> Result<Vec<String>, RenderBuildError> {
    call.args.iter().map(|a| emit_value(a, ctx)).collect()
}

fn arg<'c>(call: &'c FunctionCall<RenderExpr>, index: usize) -> Result<&'c RenderExpr, RenderBuildError> {
    call.args.get(index).ok_or_else(|| {
        JetQueryGeneratorError::InvalidExpression(format!(
            "{} expects at least {} argument(s), got {}",
            function_name(call.function),
            index + 1,
            call.args.len()
        ))
        .into()
    })
}

/// Non-null string constant, used to turn pattern functions into `LIKE`.
fn literal_string(expr: &RenderExpr) -> Option<&str> {
    match expr {
        RenderExpr::Constant(c) => match &c.value {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        },
        _ => None,
    }
}

fn translate_special(call: &FunctionCall<RenderExpr>, ctx: &mut TranslationContext<'_>) -> TranslateResult {
    use CanonicalFunction as F;
    match call.function {
        F::IndexOf => {
            let s = emit_value(arg(call, 0)?, ctx)?;
            let p = emit_value(arg(call, 1)?, ctx)?;
            match call.args.get(2) {
                Some(start) => {
                    let start = emit_value(start, ctx)?;
                    let start = super::function_registry::one_based(&start);
                    Ok(format!("(INSTR({}, {}, {}, 1) - 1)", start, s, p))
                }
                None => Ok(format!("(INSTR(1, {}, {}, 1) - 1)", s, p)),
            }
        }
        F::Concat => {
            let operands: Vec<&RenderExpr> = call.args.iter().collect();
            if operands.is_empty() {
                return Ok("''".to_string());
            }
            render_concatenation(&operands, ctx)
        }
        F::StartsWith | F::EndsWith | F::Contains => pattern_match(call, ctx),
        F::IsNullOrEmpty => {
            let s = emit_value(arg(call, 0)?, ctx)?;
            Ok(format!("({} IS NULL OR {} = '')", s, s))
        }
        F::IsNullOrWhiteSpace => {
            let s = emit_value(arg(call, 0)?, ctx)?;
            Ok(format!("({} IS NULL OR TRIM({}) = '')", s, s))
        }
        F::Ceiling => {
            let x = emit_value(arg(call, 0)?, ctx)?;
            Ok(format!("(-INT(-({})))", x))
        }
        F::Log => {
            let x = emit_value(arg(call, 0)?, ctx)?;
            match call.args.get(1) {
                Some(base) => {
                    let b = emit_value(base, ctx)?;
                    Ok(format!("(LOG({}) / LOG({}))", x, b))
                }
                None => Ok(format!("LOG({})", x)),
            }
        }
        F::Log10 => {
            let x = emit_value(arg(call, 0)?, ctx)?;
            Ok(format!("(LOG({}) / LOG(10))", x))
        }
        F::Power => {
            let x = emit_value(arg(call, 0)?, ctx)?;
            let y = emit_value(arg(call, 1)?, ctx)?;
            Ok(format!("({} ^ {})", x, y))
        }
        F::Max | F::Min => {
            let a = emit_value(arg(call, 0)?, ctx)?;
            let b = emit_value(arg(call, 1)?, ctx)?;
            let op = if call.function == F::Max { ">" } else { "<" };
            Ok(format!("IIF({} {} {}, {}, {})", a, op, b, a, b))
        }
        F::DatePart(unit) => {
            let code = require_code(call.function, unit)?;
            let d = emit_value(arg(call, 0)?, ctx)?;
            Ok(format!("DATEPART('{}', {})", code, d))
        }
        F::DateDiff(unit) => {
            let code = require_code(call.function, unit)?;
            let start = emit_value(arg(call, 0)?, ctx)?;
            let end = emit_value(arg(call, 1)?, ctx)?;
            Ok(format!("DATEDIFF('{}', {}, {})", code, start, end))
        }
        F::DateAdd(unit) => date_add(call, unit, ctx),
        other => Err(JetQueryGeneratorError::UnsupportedNodeKind(format!(
            "{} has no special translation",
            function_name(other)
        ))
        .into()),
    }
}

fn require_code(function: CanonicalFunction, unit: DateUnit) -> Result<&'static str, RenderBuildError> {
    interval_code(unit)
        .ok_or_else(|| unsupported(function, &format!("no interval code for {:?}", unit)))
}

/// `DateAdd(date, amount)`. Fractional amounts cannot go through DATEADD,
/// which truncates them; day-based units fall back to date arithmetic.
fn date_add(
    call: &FunctionCall<RenderExpr>,
    unit: DateUnit,
    ctx: &mut TranslationContext<'_>,
) -> TranslateResult {
    let date = arg(call, 0)?;
    let amount = arg(call, 1)?;
    let fractional = matches!(
        amount.sql_type().storage(),
        SqlType::Single | SqlType::Double | SqlType::Decimal | SqlType::Currency
    );
    if fractional {
        let Some(divisor) = day_fraction_divisor(unit) else {
            return Err(unsupported(
                call.function,
                &format!("fractional {:?} amounts", unit),
            ));
        };
        let d = emit_value(date, ctx)?;
        let n = emit_value(amount, ctx)?;
        return Ok(if divisor == 1 {
            format!("({} + {})", d, n)
        } else {
            format!("({} + {} / {})", d, n, divisor)
        });
    }
    let code = require_code(call.function, unit)?;
    let d = emit_value(date, ctx)?;
    let n = emit_value(amount, ctx)?;
    Ok(format!("DATEADD('{}', {}, {})", code, n, d))
}

/// StartsWith/EndsWith/Contains: `LIKE` for literal patterns, otherwise
/// `LEFT`/`RIGHT`/`INSTR` against the computed pattern.
fn pattern_match(call: &FunctionCall<RenderExpr>, ctx: &mut TranslationContext<'_>) -> TranslateResult {
    use CanonicalFunction as F;
    let subject = emit_value(arg(call, 0)?, ctx)?;
    let pattern = arg(call, 1)?;

    if let Some(text) = literal_string(pattern) {
        let escaped = escape_like_pattern(text);
        let like = match call.function {
            F::StartsWith => format!("{}%", escaped),
            F::EndsWith => format!("%{}", escaped),
            _ => format!("%{}%", escaped),
        };
        return Ok(format!("{} LIKE {}", subject, format_string(&like)));
    }

    let p = emit_value(pattern, ctx)?;
    Ok(match call.function {
        F::StartsWith => format!("({} = '' OR LEFT({}, LEN({})) = {})", p, subject, p, p),
        F::EndsWith => format!("({} = '' OR RIGHT({}, LEN({})) = {})", p, subject, p, p),
        _ => format!("({} = '' OR INSTR(1, {}, {}, 1) > 0)", p, subject, p),
    })
}
