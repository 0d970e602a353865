//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "ragmark",
    version,
    about = "RAG evaluation harness with rank metrics and LLM-as-judge scoring",
    long_about = "Ragmark sweeps embedding models, chunking parameters, and retrieval depths over \
                  a document corpus, scoring each configuration with Recall@K, NDCG@K, and an \
                  LLM judge. It also ships the surrounding workflow: ticket-export cleaning, \
                  corpus preparation, model verification, and an interactive RAG chat."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/ragmark/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the full evaluation sweep described by the config file
    Evaluate,

    /// Chat with the document corpus through the RAG pipeline
    Chat {
        /// Number of chunks to retrieve per question
        #[arg(short, long, default_value = "5")]
        k: usize,
    },

    /// Render a plain-text report from a persisted metrics file
    Report {
        /// Path to a metrics.json produced by an evaluation run
        #[arg(short, long)]
        metrics: PathBuf,

        /// Output path for the rendered report
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Clean and prepare ticket-export data for the corpus
    Data {
        #[command(subcommand)]
        action: DataAction,
    },

    /// Inspect the model registry
    Models {
        #[command(subcommand)]
        action: ModelsAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum DataAction {
    /// Anonymize PII in a raw ticket export
    Clean {
        /// Path to the raw export (JSON object with a "records" array)
        #[arg(short, long)]
        input: PathBuf,

        /// Path for the cleaned export
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Convert cleaned records into corpus JSONL for embedding
    Prepare {
        /// Path to the cleaned export
        #[arg(short, long)]
        input: PathBuf,

        /// Path for the prepared JSONL corpus
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
pub enum ModelsAction {
    /// Check that every registered model is present on disk
    Verify,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show {
        /// Show only a specific section
        #[arg(short, long)]
        section: Option<String>,
    },

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
