use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use mad_portfolio::config::{Config, DEFAULT_CONFIG_PATH};
use mad_portfolio::pipeline;

#[derive(Parser)]
#[command(name = "mad_portfolio")]
#[command(about = "Mean-absolute-deviation portfolio optimization and reporting")]
#[command(version)]
struct Cli {
    /// Path to config.toml
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Solve once for a target expected return
    Optimize {
        /// Overrides optimizer.target_return
        #[arg(long)]
        target: Option<f64>,
    },

    /// Sweep target returns and write records, solver log and plot
    Frontier {
        #[arg(long)]
        min: Option<f64>,
        #[arg(long)]
        max: Option<f64>,
        #[arg(long)]
        step: Option<f64>,
    },

    /// Write the text and PDF reports
    Report {
        /// Read portfolios from a plain text solver log instead of the records
        #[arg(long)]
        log: Option<PathBuf>,
    },

    /// Frontier followed by reports
    Run,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Optimize { target } => {
            pipeline::optimize_target(
                &config,
                target.unwrap_or(config.optimizer.target_return),
            )?;
        }
        Command::Frontier { min, max, step } => {
            let frontier = &config.frontier;
            pipeline::trace_frontier(
                &config,
                min.unwrap_or(frontier.min_return),
                max.unwrap_or(frontier.max_return),
                step.unwrap_or(frontier.step),
            )?;
        }
        Command::Report { log } => pipeline::write_reports(&config, log.as_deref())?,
        Command::Run => pipeline::run(&config)?,
    }

    Ok(())
}
