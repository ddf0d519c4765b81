use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;
use validator::Validate;

use crate::dialect::{DialectProfile, NullSemanticsMode, ParameterStyle};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("Parse error for {field}: {value} - {source}")]
    Parse {
        field: String,
        value: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Translator configuration: the target dialect and the host null semantics.
#[derive(Clone, Debug, Default, PartialEq, Validate, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslatorConfig {
    #[validate(nested)]
    pub profile: DialectProfile,

    pub null_semantics: NullSemanticsMode,
}

impl TranslatorConfig {
    /// Create configuration from `JETSQL_*` environment variables with validation.
    /// Unset variables keep the conservative Jet defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = DialectProfile::default();
        let profile = DialectProfile {
            name: env::var("JETSQL_PROFILE_NAME").unwrap_or(defaults.name.clone()),
            identifier_quote: parse_env_var("JETSQL_IDENTIFIER_QUOTE", "backtick")?,
            parameter_style: parse_env_var("JETSQL_PARAMETER_STYLE", "named")?,
            skip_take_strategy: parse_env_var("JETSQL_SKIP_TAKE_STRATEGY", "row_number")?,
            supports_offset_fetch: parse_env_var("JETSQL_OFFSET_FETCH", "false")?,
            binary_literal_threshold: parse_env_var("JETSQL_BINARY_LITERAL_THRESHOLD", "256")?,
            ..defaults
        };
        let config = Self {
            profile,
            null_semantics: parse_env_var("JETSQL_NULL_SEMANTICS", "two_valued")?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Create configuration from CLI arguments with validation
    pub fn from_cli(cli: CliConfig) -> Result<Self, ConfigError> {
        let mut config = match &cli.config_file {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::from_env()?,
        };
        if cli.relational_nulls {
            config.null_semantics = NullSemanticsMode::Relational;
        }
        if cli.positional_parameters {
            config.profile.parameter_style = ParameterStyle::Positional;
        }

        config.validate()?;
        Ok(config)
    }

    /// Create configuration from YAML file
    pub fn from_yaml_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
            field: "yaml_file".to_string(),
            value: "file read failed".to_string(),
            source: Box::new(e),
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            field: "yaml_content".to_string(),
            value: content,
            source: Box::new(e),
        })?;

        config.validate()?;
        Ok(config)
    }
}

/// CLI configuration (parsed from command line arguments)
#[derive(Clone, Debug, Default)]
pub struct CliConfig {
    /// YAML file replacing the environment as base configuration
    pub config_file: Option<std::path::PathBuf>,
    pub relational_nulls: bool,
    pub positional_parameters: bool,
}

/// Parse an environment variable with a default value
fn parse_env_var<T: std::str::FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    value.parse().map_err(|e| ConfigError::Parse {
        field: key.to_string(),
        value,
        source: Box::new(e),
    })
}
