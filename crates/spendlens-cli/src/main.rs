//! Spendlens CLI - Personal spending analyser
//!
//! Usage:
//!   spendlens analyze --file tx.json              Full report (text or JSON)
//!   spendlens trends --file tx.json               Monthly series and forecast
//!   spendlens suggest --file tx.json              AI-written suggestions
//!   spendlens config                              Effective configuration
//!   spendlens prompts [list|show|path]            Prompt library

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact().with_writer(std::io::stderr))
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Analyze {
            file,
            format,
            baselines,
        } => commands::cmd_analyze(config_path, &file, format, baselines.as_deref()),
        Commands::Trends { file } => commands::cmd_trends(config_path, &file),
        Commands::Suggest {
            file,
            prompt,
            backend,
            model,
        } => {
            commands::cmd_suggest(
                config_path,
                &file,
                prompt.as_deref(),
                backend,
                model.as_deref(),
            )
            .await
        }
        Commands::Config => commands::cmd_config(config_path),
        Commands::Prompts { action } => match action {
            None | Some(PromptsAction::List) => commands::cmd_prompts_list(),
            Some(PromptsAction::Show { prompt_id }) => commands::cmd_prompts_show(&prompt_id),
            Some(PromptsAction::Path) => commands::cmd_prompts_path(),
        },
    }
}
