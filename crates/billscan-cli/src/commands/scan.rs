//! Scan command - run invoice files through one session.

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::{style, Term};
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{debug, info, warn};

use billscan_core::duplicate::DuplicateMatch;
use billscan_core::invoice::rules::format_amount;
use billscan_core::models::config::BillscanConfig;
use billscan_core::report::{Kpis, ReportBuilder, SummaryTable, REPORT_MEDIA_TYPE};
use billscan_core::{
    DuplicateDetector, EntityExtractor, ForgeryDetector, ForgeryVerdict, GeminiClient,
    InvoiceRecord, Outcome, PageRenderer, PendingSubmission, ReplicateClient, Session,
    SuspectSubmission, TextExtractor, Upload, VisionClient,
};

use super::config::load_config;

const SUPPORTED_EXTENSIONS: [&str; 4] = ["pdf", "png", "jpg", "jpeg"];

/// Arguments for the scan command.
#[derive(Args)]
pub struct ScanArgs {
    /// Input files or glob patterns
    #[arg(required = true)]
    inputs: Vec<String>,

    /// What to do with uploads that look like a stored invoice
    #[arg(long, value_enum, default_value = "ask")]
    on_duplicate: HoldPolicy,

    /// What to do with uploads whose forgery heatmap is too bright
    #[arg(long, value_enum, default_value = "ask")]
    on_forgery: HoldPolicy,

    /// Write the PDF report to the configured output directory
    #[arg(long)]
    report: bool,

    /// Write the PDF report to this directory
    #[arg(long)]
    report_dir: Option<PathBuf>,

    /// Width of invoice image pages in the report, in millimetres
    #[arg(long)]
    image_width: Option<f32>,

    /// Bucket categories below this quantile of category totals as "Other"
    #[arg(long, value_parser = parse_quantile)]
    other_quantile: Option<f64>,

    /// Export the summary table as CSV
    #[arg(long)]
    export: Option<PathBuf>,

    /// Generate AI spending insights
    #[arg(long)]
    insights: bool,

    /// Run forgery detection on every upload
    #[arg(long)]
    forgery: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    format: OutputFormat,
}

/// Handling of uploads the session holds back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum HoldPolicy {
    /// Ask before continuing
    Ask,
    /// Discard the upload
    Skip,
    /// Continue anyway
    Save,
}

#[derive(Clone, Copy)]
struct Policies {
    duplicate: HoldPolicy,
    forgery: HoldPolicy,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON document
    Json,
}

/// What happened to one input file.
#[derive(Debug, Serialize)]
struct FileResult {
    file: String,
    status: FileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duplicate_of: Option<DuplicateMatch>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    heatmap: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    forgery: Option<ForgeryVerdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum FileStatus {
    Saved,
    DuplicateSaved,
    DuplicateSkipped,
    ForgerySkipped,
    Failed,
}

impl FileResult {
    fn new(path: &Path, status: FileStatus) -> Self {
        Self {
            file: path.display().to_string(),
            status,
            id: None,
            duplicate_of: None,
            warnings: Vec::new(),
            heatmap: None,
            forgery: None,
            error: None,
        }
    }
}

/// Everything the scan printed, for `--format json`.
#[derive(Serialize)]
struct ScanOutput<'a> {
    files: &'a [FileResult],
    records: &'a [InvoiceRecord],
    summary: &'a SummaryTable,
    kpis: &'a Kpis,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<&'a Path>,
    #[serde(skip_serializing_if = "Option::is_none")]
    insights: Option<&'a str>,
}

pub async fn run(args: ScanArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    let files = expand_inputs(&args.inputs)?;
    if files.is_empty() {
        anyhow::bail!("No matching files found for: {}", args.inputs.join(" "));
    }
    info!("Found {} files to scan", files.len());

    let ocr = VisionClient::from_config(&config.ocr)?;
    let llm = GeminiClient::from_config(&config.llm)?;
    let session = Session::new(
        ocr,
        llm.clone(),
        DuplicateDetector::new(config.duplicates.threshold),
    )
    .with_page_renderer(PageRenderer::from_config(&config.pdf))
    .with_forgery_threshold(config.forgery.intensity_threshold);

    if args.forgery || config.forgery.enabled {
        let forgery = ReplicateClient::from_config(&config.forgery)?;
        scan(session.with_forgery_detector(forgery), &files, &args, &config, &llm).await
    } else {
        scan(session, &files, &args, &config, &llm).await
    }
}

fn parse_quantile(value: &str) -> Result<f64, String> {
    let q: f64 = value.parse().map_err(|e| format!("{}", e))?;
    if (0.0..=1.0).contains(&q) {
        Ok(q)
    } else {
        Err(format!("{} is not between 0 and 1", q))
    }
}

/// Resolve literal paths and glob patterns to supported files, in order.
fn expand_inputs(inputs: &[String]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        let literal = PathBuf::from(input);
        let candidates: Vec<PathBuf> = if literal.is_file() {
            vec![literal]
        } else {
            glob(input)?.filter_map(|r| r.ok()).collect()
        };

        for path in candidates {
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("")
                .to_lowercase();
            if SUPPORTED_EXTENSIONS.contains(&ext.as_str()) && !files.contains(&path) {
                files.push(path);
            } else {
                debug!("Skipping {}", path.display());
            }
        }
    }
    Ok(files)
}

async fn scan<T, E, F>(
    mut session: Session<T, E, F>,
    files: &[PathBuf],
    args: &ScanArgs,
    config: &BillscanConfig,
    llm: &GeminiClient,
) -> anyhow::Result<()>
where
    T: TextExtractor,
    E: EntityExtractor,
    F: ForgeryDetector,
{
    let start = Instant::now();
    let output_dir = args
        .report_dir
        .clone()
        .unwrap_or_else(|| config.report.output_dir.clone());

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );

    let policies = Policies {
        duplicate: args.on_duplicate,
        forgery: args.on_forgery,
    };
    let mut results = Vec::with_capacity(files.len());
    for path in files {
        pb.set_message(
            path.file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string(),
        );
        let result = scan_file(&mut session, path, policies, &output_dir, &pb).await;
        results.push(result);
        pb.inc(1);
    }
    pb.finish_and_clear();

    let mut builder = ReportBuilder::new(session.store()).with_config(&config.report);
    if let Some(width) = args.image_width {
        builder = builder.with_image_width(width);
    }
    if let Some(q) = args.other_quantile {
        builder = builder.with_other_quantile(q);
    }
    let summary = builder.summary();
    let kpis = builder.kpis();

    if let Some(path) = &args.export {
        export_csv(path, &summary)?;
        eprintln!("{} Summary exported to {}", style("✓").green(), path.display());
    }

    let report_path = if args.report || args.report_dir.is_some() {
        std::fs::create_dir_all(&output_dir)?;
        let path = builder.write_pdf(&output_dir)?;
        info!(path = %path.display(), media_type = REPORT_MEDIA_TYPE, "Report ready");
        Some(path)
    } else {
        None
    };

    let insights = if args.insights {
        Some(session.insights(llm).await?)
    } else {
        None
    };

    match args.format {
        OutputFormat::Json => {
            let output = ScanOutput {
                files: &results,
                records: session.store().records(),
                summary: &summary,
                kpis: &kpis,
                report: report_path.as_deref(),
                insights: insights.as_deref(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            print_results(&results);
            print_summary(&summary);
            print_kpis(&kpis);
            if let Some(path) = &report_path {
                println!();
                println!("{} Report written to {}", style("✓").green(), path.display());
            }
            if let Some(text) = &insights {
                println!();
                println!("{}", style("AI Insights").bold());
                println!("{}", text.trim());
            }
            println!();
            println!(
                "{} Scanned {} files in {:.1?}",
                style("✓").green(),
                results.len(),
                start.elapsed()
            );
        }
    }

    Ok(())
}

async fn scan_file<T, E, F>(
    session: &mut Session<T, E, F>,
    path: &Path,
    policies: Policies,
    output_dir: &Path,
    pb: &ProgressBar,
) -> FileResult
where
    T: TextExtractor,
    E: EntityExtractor,
    F: ForgeryDetector,
{
    let upload = match Upload::from_path(path) {
        Ok(upload) => upload,
        Err(e) => return failed(path, e.to_string()),
    };
    let submission = match session.submit(&upload).await {
        Ok(submission) => submission,
        Err(e) => return failed(path, e.to_string()),
    };

    // Accepting a suspect yields Saved or Duplicate, so this loops at most twice
    let mut outcome = submission.outcome;
    let mut result = loop {
        match outcome {
            Outcome::Saved(record) => {
                let mut result = FileResult::new(path, FileStatus::Saved);
                result.id = Some(record.id);
                break result;
            }
            Outcome::Duplicate(pending) => {
                let existing = pending.existing;
                let save = match policies.duplicate {
                    HoldPolicy::Save => true,
                    HoldPolicy::Skip => false,
                    HoldPolicy::Ask => {
                        let stored = session.store().get(existing.id);
                        pb.suspend(|| ask_save_duplicate(&pending, stored))
                    }
                };

                let mut result = if save {
                    let mut result = FileResult::new(path, FileStatus::DuplicateSaved);
                    result.id = Some(session.confirm(pending));
                    result
                } else {
                    info!("Skipped duplicate {}", path.display());
                    FileResult::new(path, FileStatus::DuplicateSkipped)
                };
                result.duplicate_of = Some(existing);
                break result;
            }
            Outcome::Forged(suspect) => {
                let accept = match policies.forgery {
                    HoldPolicy::Save => true,
                    HoldPolicy::Skip => false,
                    HoldPolicy::Ask => pb.suspend(|| ask_accept_suspect(&suspect)),
                };
                if !accept {
                    info!("Skipped suspected forgery {}", path.display());
                    break FileResult::new(path, FileStatus::ForgerySkipped);
                }
                outcome = session.accept_suspect(suspect);
            }
        }
    };
    result.forgery = submission.forgery;

    if let Some(heatmap) = submission.heatmap {
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("invoice");
        let heatmap_path = output_dir.join(format!("{}_forgery.png", stem));
        match save_heatmap(&heatmap, &heatmap_path) {
            Ok(()) => result.heatmap = Some(heatmap_path),
            Err(e) => result.warnings.push(format!("Failed to save forgery heatmap: {}", e)),
        }
    }

    let mut warnings = submission.warnings;
    warnings.append(&mut result.warnings);
    result.warnings = warnings;
    for warning in &result.warnings {
        warn!("{}: {}", path.display(), warning);
    }
    result
}

fn save_heatmap(heatmap: &image::DynamicImage, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    heatmap.save(path)?;
    Ok(())
}

fn failed(path: &Path, error: String) -> FileResult {
    warn!("Failed to scan {}: {}", path.display(), error);
    let mut result = FileResult::new(path, FileStatus::Failed);
    result.error = Some(error);
    result
}

/// Ask on the terminal whether a duplicate should be saved. Defaults to no.
fn ask_save_duplicate(pending: &PendingSubmission, existing: Option<&InvoiceRecord>) -> bool {
    let term = Term::stderr();

    let _ = term.write_line(&format!(
        "{} {} looks like invoice #{} (similarity {})",
        style("⚠").yellow(),
        pending.name,
        pending.existing.id,
        pending.existing.score
    ));
    if let Some(record) = existing {
        let _ = term.write_line(&format!(
            "   existing: {} | {} | {}",
            record.fields.store_name, record.fields.date, record.fields.total_amount
        ));
    }
    let _ = term.write_line(&format!(
        "   new:      {} | {} | {}",
        pending.fields.store_name, pending.fields.date, pending.fields.total_amount
    ));
    let _ = term.write_str("Save anyway? [y/N] ");

    match term.read_line() {
        Ok(answer) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
        Err(e) => {
            debug!("No answer to duplicate prompt: {}", e);
            false
        }
    }
}

/// Ask on the terminal whether a suspected forgery should be accepted.
/// Defaults to no.
fn ask_accept_suspect(suspect: &SuspectSubmission) -> bool {
    let term = Term::stderr();

    let _ = term.write_line(&format!(
        "{} {} appears to be forged (heatmap intensity {:.2}, threshold {:.0})",
        style("⚠").red(),
        suspect.name,
        suspect.verdict.intensity,
        suspect.verdict.threshold
    ));
    let _ = term.write_line(&format!(
        "   {} | {} | {}",
        suspect.fields.store_name, suspect.fields.date, suspect.fields.total_amount
    ));
    let _ = term.write_str("Accept invoice anyway? [y/N] ");

    match term.read_line() {
        Ok(answer) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
        Err(e) => {
            debug!("No answer to forgery prompt: {}", e);
            false
        }
    }
}

fn export_csv(path: &Path, summary: &SummaryTable) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    for row in &summary.rows {
        wtr.serialize(row)?;
    }
    if summary.rows.is_empty() {
        wtr.write_record(billscan_core::report::SUMMARY_HEADERS)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Shorten `text` to at most `width` characters.
fn fit(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let mut short: String = text.chars().take(width.saturating_sub(1)).collect();
        short.push('…');
        short
    }
}

fn print_results(results: &[FileResult]) {
    for result in results {
        let line = match result.status {
            FileStatus::Saved => format!(
                "{} {} saved as #{}",
                style("✓").green(),
                result.file,
                result.id.unwrap_or_default()
            ),
            FileStatus::DuplicateSaved => format!(
                "{} {} saved as #{} (duplicate of #{})",
                style("⚠").yellow(),
                result.file,
                result.id.unwrap_or_default(),
                result.duplicate_of.map(|m| m.id).unwrap_or_default()
            ),
            FileStatus::DuplicateSkipped => format!(
                "{} {} skipped (duplicate of #{})",
                style("⚠").yellow(),
                result.file,
                result.duplicate_of.map(|m| m.id).unwrap_or_default()
            ),
            FileStatus::ForgerySkipped => format!(
                "{} {} skipped (suspected forgery)",
                style("✗").red(),
                result.file
            ),
            FileStatus::Failed => format!(
                "{} {}: {}",
                style("✗").red(),
                result.file,
                result.error.as_deref().unwrap_or("unknown error")
            ),
        };
        println!("{}", line);
        for warning in &result.warnings {
            println!("    {} {}", style("!").yellow(), warning);
        }
        if let Some(path) = &result.heatmap {
            println!("    forgery heatmap: {}", path.display());
        }
        if let Some(verdict) = &result.forgery {
            println!(
                "    heatmap average intensity: {:.2}{}",
                verdict.intensity,
                if verdict.forged { " (suspected forgery)" } else { "" }
            );
        }
    }
}

fn print_summary(summary: &SummaryTable) {
    println!();
    println!("{}", style("Invoice Summary").bold());
    println!(
        "{:>4}  {:<24}  {:<15}  {:<10}  {:<15}  {:>12}",
        "ID", "Store Name", "GSTIN", "Date", "Category", "Total Amount"
    );
    for row in &summary.rows {
        println!(
            "{:>4}  {:<24}  {:<15}  {:<10}  {:<15}  {:>12}",
            row.bill_id,
            fit(&row.store_name, 24),
            fit(&row.gstin, 15),
            fit(&row.date, 10),
            fit(&row.category, 15),
            row.total_amount
        );
    }
    println!(
        "{:>90}",
        format!("Total Amount: {}", summary.total_formatted())
    );
}

fn print_kpis(kpis: &Kpis) {
    println!();
    println!("Total Invoices:   {}", kpis.invoice_count);
    println!("Total Spending:   Rs. {}", format_amount(kpis.total_spend));
    println!("Average Invoice:  Rs. {}", format_amount(kpis.average_invoice));
    match &kpis.top_category {
        Some(top) => println!(
            "Top Category:     {} (Rs. {})",
            top.label,
            format_amount(top.value)
        ),
        None => println!("Top Category:     -"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit() {
        assert_eq!(fit("Cafe", 10), "Cafe");
        assert_eq!(fit("Metro Cash and Carry", 8), "Metro C…");
    }

    #[test]
    fn test_parse_quantile() {
        assert_eq!(parse_quantile("0.1"), Ok(0.1));
        assert!(parse_quantile("1.5").is_err());
        assert!(parse_quantile("tenth").is_err());
    }

    #[test]
    fn test_expand_inputs_filters_and_dedups() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.png", "b.PDF", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let pattern = format!("{}/*", dir.path().display());
        let literal = dir.path().join("a.png").display().to_string();

        let files = expand_inputs(&[literal, pattern]).unwrap();

        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.png", "b.PDF"]);
    }
}
