//! `equipstat datasets` - browse and maintain stored datasets

use anyhow::Result;
use clap::{Args, Subcommand};
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

use equipstat_core::{Ingestor, VerifyResult};

#[derive(Args, Debug)]
pub struct DatasetsArgs {
    #[command(subcommand)]
    pub action: DatasetsAction,
}

#[derive(Subcommand, Debug)]
pub enum DatasetsAction {
    /// List stored datasets, newest first
    List,
    /// Delete a dataset and its file
    Delete {
        /// Dataset id
        id: u64,
    },
    /// Check stored files against their recorded hashes
    Verify,
    /// Remove files no dataset refers to
    Sweep {
        /// Actually delete (otherwise dry-run)
        #[arg(long)]
        confirm: bool,
    },
}

pub fn run(args: DatasetsArgs, ingestor: &Ingestor) -> Result<()> {
    match args.action {
        DatasetsAction::List => list(ingestor),
        DatasetsAction::Delete { id } => delete(ingestor, id),
        DatasetsAction::Verify => verify(ingestor),
        DatasetsAction::Sweep { confirm } => sweep(ingestor, confirm),
    }
}

fn short(hash: &str) -> &str {
    &hash[..std::cmp::min(8, hash.len())]
}

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(headers.iter().map(|h| Cell::new(h).fg(Color::Cyan)));
    table
}

fn list(ingestor: &Ingestor) -> Result<()> {
    let records = ingestor.records()?;

    if records.is_empty() {
        eprintln!("No datasets stored.");
        return Ok(());
    }

    let mut table = new_table(&["Id", "Dataset", "Uploaded", "Hash"]);
    for record in &records {
        table.add_row(vec![
            Cell::new(record.id),
            Cell::new(record.dataset_name()),
            Cell::new(record.uploaded_at.format("%Y-%m-%d %H:%M:%S")),
            Cell::new(short(&record.content_hash)),
        ]);
    }

    eprintln!("\n{table}");
    eprintln!(
        "{} of {} kept",
        records.len(),
        ingestor.retention().keep()
    );
    Ok(())
}

fn delete(ingestor: &Ingestor, id: u64) -> Result<()> {
    if !ingestor.delete(id)? {
        anyhow::bail!("dataset {id} not found");
    }
    eprintln!("Deleted dataset {id}.");
    Ok(())
}

fn verify(ingestor: &Ingestor) -> Result<()> {
    let results = ingestor.verify()?;
    if results.is_empty() {
        eprintln!("No datasets to verify.");
        return Ok(());
    }

    let mut table = new_table(&["Id", "Dataset", "Status"]);
    for r in &results {
        let status_cell = if r.ok {
            Cell::new("OK").fg(Color::Green)
        } else {
            Cell::new("FAIL").fg(Color::Red)
        };
        table.add_row(vec![Cell::new(r.id), Cell::new(&r.dataset_name), status_cell]);
    }
    eprintln!("\n{table}");

    print_mismatches(&results);

    if results.iter().all(|r| r.ok) {
        eprintln!("All datasets verified OK.");
        Ok(())
    } else {
        anyhow::bail!("some datasets have integrity issues")
    }
}

fn print_mismatches(results: &[VerifyResult]) {
    for r in results.iter().filter(|r| !r.ok) {
        eprintln!("  MISMATCH in dataset {}: {}", r.id, r.dataset_name);
        eprintln!("    expected: {}", short(&r.expected));
        eprintln!("    actual:   {}", short(&r.actual));
    }
}

fn sweep(ingestor: &Ingestor, confirm: bool) -> Result<()> {
    if !confirm {
        let orphans = ingestor.orphans()?;
        if orphans.is_empty() {
            eprintln!("No unreferenced files to remove.");
        } else {
            eprintln!("\nWould remove {} unreferenced files:", orphans.len());
            for name in &orphans {
                eprintln!("  {name}");
            }
            eprintln!("Run with --confirm to actually delete.");
        }
        return Ok(());
    }

    let removed = ingestor.sweep()?;
    if removed.is_empty() {
        eprintln!("Nothing to clean up.");
    } else {
        eprintln!("Removed {} files:", removed.len());
        for name in &removed {
            eprintln!("  {name}");
        }
    }
    Ok(())
}
