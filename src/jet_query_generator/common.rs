//! Literal and identifier formatting for the Jet dialect.

use chrono::Timelike;
use regex::Regex;

use crate::dialect::{DialectProfile, IdentifierQuote};
use crate::query_tree::{SqlType, Value};
use crate::render_plan::context::TranslationContext;

use super::errors::JetQueryGeneratorError;

lazy_static::lazy_static! {
    static ref LIKE_WILDCARDS: Regex = Regex::new(r"[%_\[]").expect("valid LIKE wildcard regex");
}

/// Delimit an identifier, doubling any embedded closing delimiter.
///
/// # Examples
/// ```
/// use jetsql::dialect::DialectProfile;
/// use jetsql::jet_query_generator::common::format_identifier;
/// assert_eq!(format_identifier("Nick`name", &DialectProfile::default()), "`Nick``name`");
/// ```
pub fn format_identifier(name: &str, profile: &DialectProfile) -> String {
    match profile.identifier_quote {
        IdentifierQuote::Backtick => format!("`{}`", name.replace('`', "``")),
        IdentifierQuote::Bracket => format!("[{}]", name.replace(']', "]]")),
    }
}

/// `alias.column`, both delimited.
pub fn qualified_column(table_alias: &str, column: &str, profile: &DialectProfile) -> String {
    format!(
        "{}.{}",
        format_identifier(table_alias, profile),
        format_identifier(column, profile)
    )
}

pub fn format_string(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Escape LIKE wildcards so `text` matches literally: `%` -> `[%]`.
pub fn escape_like_pattern(text: &str) -> String {
    LIKE_WILDCARDS.replace_all(text, "[$0]").into_owned()
}

fn format_float(text: String) -> String {
    if text.contains(['.', 'e', 'E']) {
        text
    } else {
        format!("{}.0", text)
    }
}

/// Render a value as dialect literal text. Values without a literal form
/// (sub-second times, large byte arrays) are moved into synthetic parameters.
pub fn format_literal(
    value: &Value,
    ty: &SqlType,
    ctx: &mut TranslationContext<'_>,
) -> Result<String, JetQueryGeneratorError> {
    let profile = ctx.profile();
    let text = match value {
        Value::Null => "NULL".to_string(),
        Value::Boolean(true) => profile.true_literal().to_string(),
        Value::Boolean(false) => profile.false_literal().to_string(),
        Value::Byte(v) => v.to_string(),
        Value::Int16(v) => v.to_string(),
        Value::Int32(v) => v.to_string(),
        Value::Int64(v) => v.to_string(),
        Value::Single(v) => {
            if !v.is_finite() {
                return Err(JetQueryGeneratorError::UnsupportedLiteral(format!("Single {}", v)));
            }
            format_float(v.to_string())
        }
        Value::Double(v) => {
            if !v.is_finite() {
                return Err(JetQueryGeneratorError::UnsupportedLiteral(format!("Double {}", v)));
            }
            format_float(v.to_string())
        }
        Value::Decimal(d) => d.normalize().to_string(),
        Value::String(s) => format_string(s),
        Value::DateTime(dt) => {
            if dt.nanosecond() != 0 {
                return Ok(ctx.add_synthetic_parameter(value, ty));
            }
            dt.format("#%Y-%m-%d %H:%M:%S#").to_string()
        }
        Value::DateOnly(d) => d.format("#%Y-%m-%d#").to_string(),
        Value::TimeOnly(t) => {
            if t.nanosecond() != 0 {
                return Ok(ctx.add_synthetic_parameter(value, ty));
            }
            t.format("#%H:%M:%S#").to_string()
        }
        Value::Guid(g) => format!("'{{{}}}'", g.hyphenated().to_string().to_uppercase()),
        Value::Binary(bytes) => {
            if bytes.len() > profile.binary_literal_threshold {
                return Ok(ctx.add_synthetic_parameter(value, ty));
            }
            format!("0x{}", hex::encode_upper(bytes))
        }
        Value::TimeSpan(_) => {
            return Err(JetQueryGeneratorError::UnsupportedLiteral("TimeSpan".to_string()));
        }
    };
    Ok(text)
}

/// VBA conversion function producing `ty`, if the dialect has one.
pub fn conversion_function(ty: &SqlType) -> Option<&'static str> {
    match ty.storage() {
        SqlType::Boolean => Some("CBOOL"),
        SqlType::Byte => Some("CBYTE"),
        SqlType::Int16 => Some("CINT"),
        SqlType::Int32 => Some("CLNG"),
        SqlType::Int64 | SqlType::Decimal => Some("CDEC"),
        SqlType::Currency => Some("CCUR"),
        SqlType::Single => Some("CSNG"),
        SqlType::Double => Some("CDBL"),
        SqlType::String => Some("CSTR"),
        SqlType::DateTime | SqlType::DateOnly | SqlType::TimeOnly => Some("CDATE"),
        SqlType::TimeSpan | SqlType::Guid | SqlType::Binary | SqlType::Enum { .. } => None,
    }
}
