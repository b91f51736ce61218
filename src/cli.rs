use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::grammar::Grammar;

/// Verbosity levels for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum VerbosityLevel {
    /// Only show rejected documents and failures
    Quiet,
    /// Show standard information
    #[default]
    Normal,
    /// Show every violation and per-file timings
    Verbose,
}

impl VerbosityLevel {
    pub fn from_flags(verbose: bool, quiet: bool) -> Self {
        if quiet {
            VerbosityLevel::Quiet
        } else if verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }
}

/// How reports are rendered on stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
    Summary,
}

/// Validate, import and search video metadata documents
#[derive(Parser, Debug, Clone)]
#[command(name = "metadata-verify")]
#[command(
    about = "Validate video metadata XML against XSD and RelaxNG grammars, import it and search it"
)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (TOML or JSON)
    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// XML Schema to use instead of the built-in one
    #[arg(long = "xsd", global = true)]
    pub xsd: Option<PathBuf>,

    /// RelaxNG grammar to use instead of the built-in one
    #[arg(long = "rng", global = true)]
    pub rng: Option<PathBuf>,

    /// Grammar(s) documents are checked against
    #[arg(long = "grammar", value_enum, global = true)]
    pub grammar: Option<Grammar>,

    /// File extensions to process (comma-separated)
    #[arg(
        short = 'e',
        long = "extensions",
        global = true,
        help = "File extensions to process (e.g., 'xml,item')"
    )]
    pub extensions: Option<String>,

    /// Include file patterns (glob syntax)
    #[arg(long = "include", action = clap::ArgAction::Append, global = true)]
    pub include_patterns: Vec<String>,

    /// Exclude file patterns (glob syntax)
    #[arg(long = "exclude", action = clap::ArgAction::Append, global = true)]
    pub exclude_patterns: Vec<String>,

    /// Number of concurrent validation tasks
    #[arg(short = 't', long = "threads", global = true)]
    pub threads: Option<usize>,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    /// Quiet mode (rejections and errors only)
    #[arg(short = 'q', long = "quiet", conflicts_with = "verbose", global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(long = "format", value_enum, global = true)]
    pub format: Option<OutputFormat>,

    /// Stop scheduling files after the first rejected document
    #[arg(long = "fail-fast", global = true)]
    pub fail_fast: bool,

    /// Write each search snapshot to this file
    #[arg(long = "snapshot", global = true)]
    pub snapshot: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Validate every discovered document
    Validate {
        /// Directory or file to validate
        path: PathBuf,
    },
    /// Validate and import every discovered document into a store
    Import {
        /// Directory or file to import
        path: PathBuf,
    },
    /// Import the discovered documents, then search titles and authors
    Search {
        /// Directory or file to import before searching
        path: PathBuf,
        /// Case-insensitive substring to look for
        term: String,
    },
    /// Print the namespaced document for a JSON record
    Convert {
        /// JSON file holding one record
        json_file: PathBuf,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn get_extensions(&self) -> Option<Vec<String>> {
        self.extensions.as_ref().map(|extensions| {
            extensions
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
    }

    /// Input path of the subcommand
    pub fn path(&self) -> &PathBuf {
        match &self.command {
            Command::Validate { path } | Command::Import { path } | Command::Search { path, .. } => {
                path
            }
            Command::Convert { json_file } => json_file,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.path().exists() {
            return Err(format!("Path does not exist: {}", self.path().display()));
        }
        if let Some(threads) = self.threads
            && threads == 0
        {
            return Err("Number of threads must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn verbosity(&self) -> VerbosityLevel {
        VerbosityLevel::from_flags(self.verbose, self.quiet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_basic_cli_parsing() {
        let cli = Cli::try_parse_from(["metadata-verify", "validate", "/tmp"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Validate {
                path: PathBuf::from("/tmp")
            }
        );
        assert_eq!(cli.grammar, None);
        assert_eq!(cli.get_extensions(), None);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "metadata-verify",
            "search",
            "docs",
            "Paris",
            "--grammar",
            "both",
            "-e",
            "xml, item",
            "--format",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.grammar, Some(Grammar::Both));
        assert_eq!(
            cli.get_extensions(),
            Some(vec!["xml".to_string(), "item".to_string()])
        );
        assert_eq!(cli.format, Some(OutputFormat::Json));
        match cli.command {
            Command::Search { term, .. } => assert_eq!(term, "Paris"),
            other => panic!("Expected search, got {:?}", other),
        }
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["metadata-verify", "-v", "-q", "validate", "x"]).is_err());
    }

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(VerbosityLevel::from_flags(false, true), VerbosityLevel::Quiet);
        assert_eq!(VerbosityLevel::from_flags(true, false), VerbosityLevel::Verbose);
        assert!(VerbosityLevel::Quiet < VerbosityLevel::Normal);
    }
}
