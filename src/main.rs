use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use jetsql::{config, QueryExpression, QueryTranslator};

/// JetSQL - translate canonical query trees into Jet/Access SQL
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// YAML configuration file (replaces the JETSQL_* environment variables)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Translate for relational (three-valued) host null semantics
    #[arg(long, global = true)]
    relational_nulls: bool,

    /// Emit `?` placeholders instead of named parameters
    #[arg(long, global = true)]
    positional: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Translate a query tree (JSON or YAML file) and print the SQL
    Translate {
        /// Query tree file; `.yaml`/`.yml` are read as YAML, anything else as JSON
        file: PathBuf,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Print the effective dialect profile as YAML
    Profile,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

impl From<&Cli> for config::CliConfig {
    fn from(cli: &Cli) -> Self {
        config::CliConfig {
            config_file: cli.config.clone(),
            relational_nulls: cli.relational_nulls,
            positional_parameters: cli.positional,
        }
    }
}

fn read_query(path: &Path) -> anyhow::Result<QueryExpression> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    let query = if is_yaml {
        QueryExpression::from_yaml_str(&content)
            .with_context(|| format!("invalid query tree in {}", path.display()))?
    } else {
        serde_json::from_str(&content)
            .with_context(|| format!("invalid query tree in {}", path.display()))?
    };
    Ok(query)
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Defaults to INFO level, can be overridden with RUST_LOG env var
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = config::TranslatorConfig::from_cli((&cli).into())
        .context("Configuration error")?;
    log::debug!("Using dialect profile '{}'", config.profile.name);

    match cli.command {
        Command::Profile => {
            print!("{}", serde_yaml::to_string(&config)?);
        }
        Command::Translate { file, format } => {
            let query = read_query(&file)?;
            let translator = QueryTranslator::from_config(&config);
            let translated = match translator.translate(&query) {
                Ok(translated) => translated,
                Err(e) => bail!("Translation failed ({:?}): {}", e.kind(), e),
            };
            match format {
                OutputFormat::Text => {
                    println!("{}", translated.sql);
                    for binding in &translated.parameters {
                        println!("-- {} = {:?}", binding.placeholder, binding.value);
                    }
                    for warning in &translated.warnings {
                        eprintln!("warning: {}", warning);
                    }
                }
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&translated)?);
                }
            }
        }
    }
    Ok(())
}
