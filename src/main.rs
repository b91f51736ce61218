use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use metadata_verify::cli::{Cli, Command, OutputFormat, VerbosityLevel};
use metadata_verify::config::{Config, ConfigManager};
use metadata_verify::document::DocumentConverter;
use metadata_verify::file_discovery::FileDiscovery;
use metadata_verify::grammar::GrammarSet;
use metadata_verify::import::{ImportResults, Importer};
use metadata_verify::model::Record;
use metadata_verify::output::Output;
use metadata_verify::schema_loader::SchemaLoader;
use metadata_verify::search::SearchEngine;
use metadata_verify::store::InMemoryStore;
use metadata_verify::validator::{EngineConfig, ValidationEngine};
use metadata_verify::xml_codec::write_video;

/// Every document accepted
const EXIT_OK: u8 = 0;
/// At least one document rejected or unreadable
const EXIT_REJECTED: u8 = 1;
/// Startup or internal failure
const EXIT_FATAL: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_args();
    init_tracing(cli.verbosity());

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(EXIT_FATAL)
        }
    }
}

fn init_tracing(verbosity: VerbosityLevel) {
    let default_level = match verbosity {
        VerbosityLevel::Quiet => "warn",
        VerbosityLevel::Normal => "info",
        VerbosityLevel::Verbose => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // Reports go to stdout; logs stay on stderr.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

async fn run(cli: Cli) -> Result<u8> {
    cli.validate().map_err(anyhow::Error::msg)?;

    let config = ConfigManager::load_config(&cli)
        .await
        .context("Failed to load configuration")?;
    debug!(?config, "Effective configuration");

    let output = Output::new(
        VerbosityLevel::from_flags(config.output.verbose, config.output.quiet),
        config.output.format,
    );

    let discovery = FileDiscovery::from_config(&config.files)?;

    match &cli.command {
        Command::Convert { json_file } => convert(json_file).await,
        Command::Validate { path } => {
            let grammars = load_grammars(&config).await?;
            let engine = ValidationEngine::new(grammars, EngineConfig::from_config(&config));
            let results = engine.validate_path(path, &discovery).await?;
            print!("{}", output.format_results(&results)?);
            Ok(if results.has_errors() {
                EXIT_REJECTED
            } else {
                EXIT_OK
            })
        }
        Command::Import { path } => {
            let grammars = load_grammars(&config).await?;
            let (_, results) = import(path, grammars, &discovery, &config).await?;
            print!("{}", output.format_import(&results)?);
            Ok(exit_code(&results))
        }
        Command::Search { path, term } => {
            let grammars = load_grammars(&config).await?;
            let (importer, results) = import(path, grammars, &discovery, &config).await?;
            if results.has_errors() && output_is_verbose(&config) {
                eprint!("{}", output.format_import(&results)?);
            }

            let engine = SearchEngine::new().with_snapshot_path(config.search.snapshot_path.clone());
            let matches = engine.search_store(importer.store().as_ref(), term)?;
            print!("{}", output.format_search(term, &matches)?);
            Ok(exit_code(&results))
        }
    }
}

async fn load_grammars(config: &Config) -> Result<GrammarSet> {
    SchemaLoader::new(&config.schemas)
        .load()
        .await
        .context("Failed to load grammars")
}

async fn import(
    path: &Path,
    grammars: GrammarSet,
    discovery: &FileDiscovery,
    config: &Config,
) -> Result<(Importer, ImportResults)> {
    let importer = Importer::new(grammars, Arc::new(InMemoryStore::new()));
    let files = discovery.discover_files(path).await?;
    let results = importer
        .import_files(
            &files,
            config.validation.grammar,
            config.validation.fail_fast,
        )
        .await;
    Ok((importer, results))
}

fn output_is_verbose(config: &Config) -> bool {
    config.output.verbose && config.output.format == OutputFormat::Human
}

fn exit_code(results: &ImportResults) -> u8 {
    if results.has_errors() {
        EXIT_REJECTED
    } else {
        EXIT_OK
    }
}

/// Print the namespaced `<video>` document for one JSON record
async fn convert(json_file: &Path) -> Result<u8> {
    let content = tokio::fs::read_to_string(json_file)
        .await
        .with_context(|| format!("Failed to read {}", json_file.display()))?;
    let record: Record = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a JSON record", json_file.display()))?;

    let document = DocumentConverter::new().to_internal(&record);
    debug!(id = record.id, "Converted record");
    print!("{}", write_video(&document));
    Ok(EXIT_OK)
}
