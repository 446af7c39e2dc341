//! `equipstat history` - most recent uploads as JSON

use anyhow::Result;
use clap::Args;

use equipstat_core::Ingestor;

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Number of entries (default: history.limit from config)
    #[arg(short, long)]
    pub limit: Option<usize>,
}

pub fn run(args: HistoryArgs, ingestor: &Ingestor, default_limit: usize) -> Result<()> {
    let history = ingestor.history(args.limit.unwrap_or(default_limit))?;
    println!("{}", serde_json::to_string_pretty(&history)?);
    Ok(())
}
