/// Canonical function -> Jet function registry
///
/// Every canonical function has exactly one rule here. The match is exhaustive,
/// so adding a canonical function without deciding how Jet renders it does not
/// compile.
use crate::query_tree::{CanonicalFunction, DateUnit};

/// Straight call mapping with optional argument rewriting.
#[derive(Clone)]
pub struct FunctionMapping {
    pub canonical: CanonicalFunction,
    /// Jet function name
    pub jet_name: &'static str,
    /// Optional argument transformation function
    /// Takes SQL string args, returns transformed SQL string args
    pub arg_transform: Option<fn(&[String]) -> Vec<String>>,
    /// Wrap as `IIF(arg IS NULL, NULL, F(..))` when the first argument is nullable
    pub null_guard: bool,
}

#[derive(Clone)]
pub enum FunctionRule {
    Mapped(FunctionMapping),
    /// Needs the argument expressions (literal detection, interval codes, operators).
    Special,
    Unsupported(&'static str),
}

fn mapped(canonical: CanonicalFunction, jet_name: &'static str) -> FunctionRule {
    FunctionRule::Mapped(FunctionMapping {
        canonical,
        jet_name,
        arg_transform: None,
        null_guard: false,
    })
}

fn mapped_with(
    canonical: CanonicalFunction,
    jet_name: &'static str,
    arg_transform: fn(&[String]) -> Vec<String>,
) -> FunctionRule {
    FunctionRule::Mapped(FunctionMapping {
        canonical,
        jet_name,
        arg_transform: Some(arg_transform),
        null_guard: false,
    })
}

/// `start + 1`, folded when `start` is an integer literal.
pub(crate) fn one_based(start: &str) -> String {
    match start.trim().parse::<i64>() {
        Ok(n) => (n + 1).to_string(),
        Err(_) if start.contains(' ') => format!("({}) + 1", start),
        Err(_) => format!("{} + 1", start),
    }
}

pub fn function_rule(function: CanonicalFunction) -> FunctionRule {
    use CanonicalFunction as F;
    match function {
        // ===== STRING FUNCTIONS =====
        F::StringLength => FunctionRule::Mapped(FunctionMapping {
            canonical: function,
            jet_name: "LEN",
            arg_transform: None,
            null_guard: true,
        }),
        // Substring(s, start [, length]) -> MID(s, start + 1 [, length]); host is 0-based
        F::Substring => mapped_with(function, "MID", |args| {
            let mut out = args.to_vec();
            if let Some(start) = out.get_mut(1) {
                *start = one_based(start);
            }
            out
        }),
        F::ToUpper => mapped(function, "UCASE"),
        F::ToLower => mapped(function, "LCASE"),
        F::Trim => mapped(function, "TRIM"),
        F::TrimStart => mapped(function, "LTRIM"),
        F::TrimEnd => mapped(function, "RTRIM"),
        F::Replace => mapped(function, "REPLACE"),
        F::IndexOf
        | F::Concat
        | F::StartsWith
        | F::EndsWith
        | F::Contains
        | F::IsNullOrEmpty
        | F::IsNullOrWhiteSpace => FunctionRule::Special,

        // ===== MATH FUNCTIONS =====
        F::Abs => mapped(function, "ABS"),
        F::Sign => mapped(function, "SGN"),
        F::Sqrt => mapped(function, "SQR"),
        F::Exp => mapped(function, "EXP"),
        F::Sin => mapped(function, "SIN"),
        F::Cos => mapped(function, "COS"),
        F::Tan => mapped(function, "TAN"),
        F::Atan => mapped(function, "ATN"),
        F::Floor => mapped(function, "INT"),
        F::Truncate => mapped(function, "FIX"),
        // Round(x) -> ROUND(x, 0); Jet and the host both round half to even
        F::Round => mapped_with(function, "ROUND", |args| {
            let mut out = args.to_vec();
            if out.len() == 1 {
                out.push("0".to_string());
            }
            out
        }),
        F::Ceiling | F::Log | F::Log10 | F::Power | F::Max | F::Min => FunctionRule::Special,
        F::Asin => FunctionRule::Unsupported("Jet has no arcsine function"),
        F::Acos => FunctionRule::Unsupported("Jet has no arccosine function"),
        F::Atan2 => FunctionRule::Unsupported("Jet has no two-argument arctangent"),

        // ===== DATETIME FUNCTIONS =====
        F::Now => mapped(function, "NOW"),
        F::Today => mapped(function, "DATE"),
        F::UtcNow => FunctionRule::Unsupported("Jet has no UTC clock"),
        F::DatePart(_) | F::DateAdd(_) | F::DateDiff(_) => FunctionRule::Special,
        F::DateComponent => mapped(function, "DATEVALUE"),
        F::TimeOfDay => mapped(function, "TIMEVALUE"),
        F::DateFromParts => mapped(function, "DATESERIAL"),
        F::DayOfWeek => {
            FunctionRule::Unsupported("DATEPART weekday numbering differs from the host's")
        }
        F::DateTimeSubtract => FunctionRule::Unsupported("Jet has no duration type"),
        F::TimeOnlySubtract => FunctionRule::Unsupported("Jet has no duration type"),
        F::TimeSpanAdd => FunctionRule::Unsupported("Jet has no duration type"),

        F::NewGuid => FunctionRule::Unsupported("Jet cannot generate GUIDs in queries"),
    }
}

/// DATEPART/DATEADD/DATEDIFF interval code for `unit`.
pub fn interval_code(unit: DateUnit) -> Option<&'static str> {
    match unit {
        DateUnit::Year => Some("yyyy"),
        DateUnit::Quarter => Some("q"),
        DateUnit::Month => Some("m"),
        DateUnit::DayOfYear => Some("y"),
        DateUnit::Day => Some("d"),
        DateUnit::Week => Some("ww"),
        DateUnit::Hour => Some("h"),
        DateUnit::Minute => Some("n"),
        DateUnit::Second => Some("s"),
        DateUnit::Millisecond => None,
    }
}

/// Day fraction of one `unit`, for adding fractional amounts by plain date arithmetic.
pub fn day_fraction_divisor(unit: DateUnit) -> Option<u32> {
    match unit {
        DateUnit::Day => Some(1),
        DateUnit::Hour => Some(24),
        DateUnit::Minute => Some(1440),
        DateUnit::Second => Some(86400),
        _ => None,
    }
}

pub fn is_function_supported(function: CanonicalFunction) -> bool {
    !matches!(function_rule(function), FunctionRule::Unsupported(_))
}
