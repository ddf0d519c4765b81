//! Unit tests for dialect profiles and their YAML form
//!
//! Profiles are usually shipped as YAML next to the host application, so
//! these tests go through serde_yaml the same way a deployment would.

use jetsql::dialect::{
    BitwiseOperatorForm, BooleanLiteralForm, DialectCapabilities, DialectProfile, IdentifierQuote,
    ParameterStyle, SkipTakeStrategy,
};
use jetsql::{NullSemanticsMode, TranslatorConfig};
use validator::Validate;

/// Host-side dialect description that only overrides what it knows about.
struct LegacyJet;

impl DialectCapabilities for LegacyJet {
    fn boolean_literal_form(&self) -> BooleanLiteralForm {
        BooleanLiteralForm::Numeric
    }
}

#[test]
fn test_partial_profile_yaml_keeps_conservative_defaults() {
    let yaml = r#"
name: ace-bracket
identifier_quote: bracket
supports_case: true
"#;
    let profile: DialectProfile = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(profile.name, "ace-bracket");
    assert_eq!(profile.identifier_quote, IdentifierQuote::Bracket);
    assert!(profile.supports_case);
    assert!(!profile.supports_offset_fetch);
    assert!(!profile.supports_parameterized_top);
    assert_eq!(profile.parameter_style, ParameterStyle::Named);
    assert_eq!(profile.skip_take_strategy, SkipTakeStrategy::RowNumber);
    assert!(profile.validate().is_ok());
}

#[test]
fn test_profile_yaml_round_trips_through_config() {
    let config = TranslatorConfig {
        profile: DialectProfile::ace16(),
        null_semantics: NullSemanticsMode::Relational,
    };
    let yaml = serde_yaml::to_string(&config).unwrap();
    assert!(yaml.contains("supports_offset_fetch: true"), "{}", yaml);
    assert!(yaml.contains("null_semantics: relational"), "{}", yaml);

    let parsed: TranslatorConfig = serde_yaml::from_str(&yaml).unwrap();
    assert_eq!(parsed, config);
}

#[test]
fn test_unknown_enum_value_in_yaml_is_rejected() {
    let yaml = "skip_take_strategy: window_function\n";
    let result: Result<DialectProfile, _> = serde_yaml::from_str(yaml);
    assert!(result.is_err());
}

#[test]
fn test_profile_keyword_parsing_is_case_insensitive() {
    assert_eq!("Bracket".parse::<IdentifierQuote>().unwrap(), IdentifierQuote::Bracket);
    assert_eq!(" NESTED_TOP ".parse::<SkipTakeStrategy>().unwrap(), SkipTakeStrategy::NestedTop);
    assert_eq!(
        "Relational".parse::<NullSemanticsMode>().unwrap(),
        NullSemanticsMode::Relational
    );

    let err = "dollar".parse::<ParameterStyle>().unwrap_err();
    assert_eq!(err.to_string(), "Unknown parameter style 'dollar'");
}

#[test]
fn test_capability_defaults_are_conservative() {
    let legacy = LegacyJet;
    assert!(!legacy.supports_case());
    assert!(!legacy.supports_offset_fetch());
    assert!(!legacy.supports_cross_apply());
    assert_eq!(legacy.bitwise_operator_form(), BitwiseOperatorForm::Keyword);
    assert_eq!(legacy.boolean_literal_form(), BooleanLiteralForm::Numeric);

    let ace16: &dyn DialectCapabilities = &DialectProfile::ace16();
    assert!(ace16.supports_offset_fetch());
    assert!(!ace16.supports_parameterized_top());
}
