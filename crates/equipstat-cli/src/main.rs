//! equipstat - Equipment telemetry upload and retention CLI
//!
//! Uploads CSV telemetry files, prints their summary statistics, and
//! manages the bounded window of retained datasets.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod cmd;
mod config;

use config::Config;
use equipstat_core::Ingestor;

#[derive(Parser)]
#[command(name = "equipstat")]
#[command(about = "Equipment telemetry upload and retention")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file path (default: ./equipstat.toml or ~/.config/equipstat/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory (overrides storage.data_dir)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Upload a CSV file and print its statistics
    Ingest(cmd::ingest::IngestArgs),
    /// Show the most recent uploads
    History(cmd::history::HistoryArgs),
    /// Browse and maintain stored datasets
    Datasets(cmd::datasets::DatasetsArgs),
    /// Show current configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    equipstat_core::init_logging(cli.quiet, cli.debug);

    let mut config = if let Some(path) = cli.config {
        Config::from_file(&path)?
    } else {
        Config::load()?
    };
    if let Some(dir) = cli.data_dir {
        config.storage.data_dir = dir;
    }

    if let Command::Config = cli.command {
        show_config(&config);
        return Ok(());
    }

    let ingestor = Ingestor::open(&config.storage.data_dir, config.retention.keep)?;

    match cli.command {
        Command::Ingest(args) => cmd::ingest::run(args, &ingestor),
        Command::History(args) => cmd::history::run(args, &ingestor, config.history.limit),
        Command::Datasets(args) => cmd::datasets::run(args, &ingestor),
        Command::Config => Ok(()),
    }
}

fn show_config(config: &Config) {
    use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Setting").fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);

    table.add_row(vec![
        "Data directory",
        &config.storage.data_dir.display().to_string(),
    ]);
    table.add_row(vec!["Datasets kept", &config.retention.keep.to_string()]);
    table.add_row(vec!["History limit", &config.history.limit.to_string()]);

    eprintln!("\n{table}");
}
