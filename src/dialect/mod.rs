//! Dialect capability table.
//!
//! Describes what the target Jet/ACE engine supports natively. Every other
//! component asks the profile before deciding to rewrite or pass through.
//! Fields missing from a deserialized profile fall back to [`DialectProfile::default`],
//! which is the conservative Jet profile (nothing optional supported).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierQuote {
    #[default]
    Backtick,
    Bracket,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterStyle {
    /// `@name`, one binding per distinct name.
    #[default]
    Named,
    /// `?`, one binding per occurrence in text order.
    Positional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BooleanLiteralForm {
    /// `TRUE` / `FALSE`
    #[default]
    Keyword,
    /// `-1` / `0`
    Numeric,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BitwiseOperatorForm {
    /// `BAND`, `BOR`, `BXOR`, `BNOT`
    #[default]
    Keyword,
    /// `&`, `|`, `^`, `~`
    Symbol,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipTakeStrategy {
    /// Correlated `COUNT(*)` sequence column filtered in an outer query.
    #[default]
    RowNumber,
    /// `TOP k` over a reversed `TOP (s + k)`.
    NestedTop,
}

/// Host null-semantics mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullSemanticsMode {
    /// Comparisons behave like the host language: `null == null` is true.
    #[default]
    TwoValued,
    /// Plain SQL three-valued logic.
    Relational,
}

/// Capability queries with conservative defaults, for hosts that describe
/// a dialect with their own type instead of a [`DialectProfile`].
pub trait DialectCapabilities: Send + Sync {
    fn supports_case(&self) -> bool {
        false
    }
    fn supports_offset_fetch(&self) -> bool {
        false
    }
    fn supports_parameterized_top(&self) -> bool {
        false
    }
    fn supports_cross_apply(&self) -> bool {
        false
    }
    fn bitwise_operator_form(&self) -> BitwiseOperatorForm {
        BitwiseOperatorForm::Keyword
    }
    fn boolean_literal_form(&self) -> BooleanLiteralForm {
        BooleanLiteralForm::Keyword
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DialectProfile {
    #[validate(length(min = 1))]
    pub name: String,
    pub identifier_quote: IdentifierQuote,
    pub parameter_style: ParameterStyle,
    pub boolean_literal_form: BooleanLiteralForm,
    pub bitwise_operator_form: BitwiseOperatorForm,
    pub supports_case: bool,
    pub supports_offset_fetch: bool,
    pub supports_parameterized_top: bool,
    pub supports_cross_apply: bool,
    /// `&` treats NULL operands as empty strings.
    pub concat_null_as_empty: bool,
    /// `LEN(NULL)` misbehaves and must be guarded.
    pub length_requires_null_guard: bool,
    /// `TOP n` returns ties of the last row.
    pub top_returns_ties: bool,
    pub skip_take_strategy: SkipTakeStrategy,
    /// Byte arrays longer than this are sent as parameters.
    #[validate(range(max = 65536))]
    pub binary_literal_threshold: usize,
}

impl Default for DialectProfile {
    fn default() -> Self {
        DialectProfile {
            name: "jet".to_string(),
            identifier_quote: IdentifierQuote::default(),
            parameter_style: ParameterStyle::default(),
            boolean_literal_form: BooleanLiteralForm::default(),
            bitwise_operator_form: BitwiseOperatorForm::default(),
            supports_case: false,
            supports_offset_fetch: false,
            supports_parameterized_top: false,
            supports_cross_apply: false,
            concat_null_as_empty: true,
            length_requires_null_guard: true,
            top_returns_ties: false,
            skip_take_strategy: SkipTakeStrategy::default(),
            binary_literal_threshold: 256,
        }
    }
}

impl DialectCapabilities for DialectProfile {
    fn supports_case(&self) -> bool {
        self.supports_case
    }
    fn supports_offset_fetch(&self) -> bool {
        self.supports_offset_fetch
    }
    fn supports_parameterized_top(&self) -> bool {
        self.supports_parameterized_top
    }
    fn supports_cross_apply(&self) -> bool {
        self.supports_cross_apply
    }
    fn bitwise_operator_form(&self) -> BitwiseOperatorForm {
        self.bitwise_operator_form
    }
    fn boolean_literal_form(&self) -> BooleanLiteralForm {
        self.boolean_literal_form
    }
}

impl DialectProfile {
    /// Profile of ACE 16+ which understands `OFFSET .. FETCH`.
    pub fn ace16() -> Self {
        DialectProfile {
            name: "ace16".to_string(),
            supports_offset_fetch: true,
            ..Default::default()
        }
    }

    pub fn true_literal(&self) -> &'static str {
        match self.boolean_literal_form {
            BooleanLiteralForm::Keyword => "TRUE",
            BooleanLiteralForm::Numeric => "-1",
        }
    }

    pub fn false_literal(&self) -> &'static str {
        match self.boolean_literal_form {
            BooleanLiteralForm::Keyword => "FALSE",
            BooleanLiteralForm::Numeric => "0",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
#[error("Unknown {kind} '{value}'")]
pub struct ParseProfileValueError {
    kind: &'static str,
    value: String,
}

macro_rules! keyword_enum {
    ($ty:ty, $kind:literal, { $($text:literal => $variant:expr),+ $(,)? }) => {
        impl FromStr for $ty {
            type Err = ParseProfileValueError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($variant),)+
                    other => Err(ParseProfileValueError {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

keyword_enum!(IdentifierQuote, "identifier quote", {
    "backtick" => IdentifierQuote::Backtick,
    "bracket" => IdentifierQuote::Bracket,
});

keyword_enum!(ParameterStyle, "parameter style", {
    "named" => ParameterStyle::Named,
    "positional" => ParameterStyle::Positional,
});

keyword_enum!(SkipTakeStrategy, "skip/take strategy", {
    "row_number" => SkipTakeStrategy::RowNumber,
    "nested_top" => SkipTakeStrategy::NestedTop,
});

keyword_enum!(NullSemanticsMode, "null semantics mode", {
    "two_valued" => NullSemanticsMode::TwoValued,
    "relational" => NullSemanticsMode::Relational,
});

impl fmt::Display for NullSemanticsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NullSemanticsMode::TwoValued => write!(f, "two_valued"),
            NullSemanticsMode::Relational => write!(f, "relational"),
        }
    }
}
