//! CLI command definitions and parsing
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "caselens",
    version,
    about = "Hybrid search and recommendations over PRDs and test cases",
    long_about = "Caselens indexes product requirement documents and test cases, answers \
                  semantic and hybrid keyword queries over them, reranks hits with \
                  business signals, and recommends related documents."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/caselens/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Document type accepted on the command line
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum KindArg {
    Prd,
    #[value(name = "test_case", alias = "test-case")]
    TestCase,
}

/// Search scope accepted on the command line
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ScopeArg {
    Prd,
    #[value(name = "test_case", alias = "test-case")]
    TestCase,
    #[default]
    All,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search PRDs and test cases
    Search {
        /// Search query text
        query: String,

        /// Document type to search
        #[arg(short = 't', long = "type", value_enum, default_value_t = ScopeArg::All)]
        kind: ScopeArg,

        /// Maximum number of results (defaults to the stored setting)
        #[arg(short, long)]
        limit: Option<usize>,

        /// Minimum retrieval score in [0, 1]
        #[arg(long)]
        threshold: Option<f32>,

        /// Vector weight in [0, 1]; 1.0 is pure vector search
        #[arg(short, long)]
        alpha: Option<f32>,

        /// Restrict to a project
        #[arg(short, long)]
        project: Option<String>,

        /// Restrict to a module
        #[arg(short, long)]
        module: Option<String>,

        /// Restrict to an app version
        #[arg(long)]
        app_version: Option<String>,

        /// Restrict to a status
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Recommend documents similar to a PRD or test case
    Recommend {
        /// Type of the source document
        #[arg(value_enum)]
        kind: KindArg,

        /// Id of the source document
        id: String,

        /// Project the recommendations are drawn from
        #[arg(short, long)]
        project: String,

        /// Number of recommendations
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Embed every stored document and push it into the vector index
    Sync,

    /// Import PRDs and test cases from a JSON file
    Import {
        /// JSON file with `prds` and `test_cases` arrays
        file: PathBuf,

        /// Skip indexing the imported documents
        #[arg(long)]
        no_index: bool,
    },

    /// Manage run-time settings stored in the database
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum SettingsAction {
    /// List all settings
    List,

    /// Get a setting value
    Get {
        /// Setting key (e.g., "search_default_alpha")
        key: String,
    },

    /// Set a setting value
    Set {
        /// Setting key
        key: String,

        /// Value to set
        value: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
