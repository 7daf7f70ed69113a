//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Spendlens - Understand where your money goes
#[derive(Parser)]
#[command(name = "spendlens")]
#[command(about = "Spending analytics, savings suggestions and challenges", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Analysis config file (TOML); defaults to the data-dir override or built-in config
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyse a transaction file and print the report
    Analyze {
        /// JSON file containing an array of transactions
        #[arg(short, long)]
        file: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// JSON object of per-category monthly baselines
        #[arg(long)]
        baselines: Option<PathBuf>,
    },

    /// Show monthly spend and income, month-over-month change and forecast
    Trends {
        /// JSON file containing an array of transactions
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Generate AI-written suggestions from the report
    Suggest {
        /// JSON file containing an array of transactions
        #[arg(short, long)]
        file: PathBuf,

        /// Prompt template (defaults to GEMINI_SUGGESTION_PROMPT, then the prompt library)
        #[arg(long)]
        prompt: Option<PathBuf>,

        /// AI backend (defaults to AI_BACKEND, then gemini)
        #[arg(long, value_enum)]
        backend: Option<Backend>,

        /// Model override, e.g. gemini-1.5-pro
        #[arg(long)]
        model: Option<String>,
    },

    /// Print the effective analysis configuration as TOML
    Config,

    /// Manage prompt templates
    Prompts {
        #[command(subcommand)]
        action: Option<PromptsAction>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    Gemini,
    Mock,
}

#[derive(Subcommand)]
pub enum PromptsAction {
    /// List all prompts and their override status
    List,

    /// Show the content of a prompt
    Show {
        /// Prompt ID (e.g., generate_suggestions)
        prompt_id: String,
    },

    /// Show the override directory path
    Path,
}
