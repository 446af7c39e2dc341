//! `equipstat ingest` - upload a CSV file and print its statistics

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use equipstat_core::Ingestor;

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// CSV file to upload
    pub file: PathBuf,

    /// Name to store the upload under (default: the file's name)
    #[arg(long)]
    pub name: Option<String>,
}

pub fn run(args: IngestArgs, ingestor: &Ingestor) -> Result<()> {
    let bytes = std::fs::read(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let name = args.name.unwrap_or_else(|| {
        args.file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    });

    let payload = ingestor
        .ingest(&name, &bytes)
        .with_context(|| format!("upload of {} rejected", args.file.display()))?;

    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}
