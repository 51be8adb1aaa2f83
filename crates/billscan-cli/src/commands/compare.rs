//! Compare command - score OCR texts the way the duplicate check does.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Args;
use console::style;

use billscan_core::duplicate::{best_match, similarity, DuplicateDetector};
use billscan_core::{InvoiceRecord, RecordFields};

use super::config::load_config;

/// Arguments for the compare command.
#[derive(Args)]
pub struct CompareArgs {
    /// Text of the new invoice
    new: PathBuf,

    /// Texts of stored invoices, in insertion order
    #[arg(required = true)]
    stored: Vec<PathBuf>,

    /// Duplicate threshold (0-100, default from config)
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(0..=100))]
    threshold: Option<u8>,
}

fn read_text(path: &Path) -> anyhow::Result<String> {
    fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))
}

pub async fn run(args: CompareArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let detector = DuplicateDetector::new(args.threshold.unwrap_or(config.duplicates.threshold));

    let new_text = read_text(&args.new)?;
    let mut stored = Vec::with_capacity(args.stored.len());
    for (i, path) in args.stored.iter().enumerate() {
        stored.push(InvoiceRecord {
            id: i as u32 + 1,
            fields: RecordFields::degraded(read_text(path)?),
        });
    }

    for (record, path) in stored.iter().zip(&args.stored) {
        let score = similarity(&new_text, &record.fields.extracted_text);
        println!(
            "#{} {}: similarity {}{}",
            record.id,
            path.display(),
            score,
            if detector.is_duplicate(score) { " (at threshold)" } else { "" }
        );
    }

    match detector.check(&new_text, &stored) {
        Some(found) => println!(
            "{} Duplicate of #{} (similarity {}, threshold {})",
            style("⚠").yellow(),
            found.id,
            found.score,
            detector.threshold()
        ),
        None => println!(
            "{} Not a duplicate (threshold {})",
            style("✓").green(),
            detector.threshold()
        ),
    }

    if let Some(best) = best_match(&new_text, &stored) {
        println!("Best match: #{} (similarity {})", best.id, best.score);
    }

    Ok(())
}
