use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use std::path::PathBuf;

use exif_datefix::file_store::DirectoryStore;
use exif_datefix::{
    CorrectionApplier, DateInterval, FlaggedSet, MismatchScanner, ScanConfig, ScanOutcome, Tolerance,
};

#[derive(Parser)]
#[command(name = "exif-datefix")]
#[command(version)]
#[command(about = "Find and repair photo dates that disagree with their EXIF capture time")]
#[command(long_about = "Compares each image's recorded date (file modification time) with the \
DateTimeOriginal stored in its EXIF metadata, honouring OffsetTimeOriginal when present. \
Capture times without an offset are read in the local timezone of this machine.

Images without readable capture metadata are skipped silently.
Supported file types: JPG, JPEG, TIFF, HEIC/HEIF/HIF, PNG, WebP")]
struct Cli {
    /// Increase verbosity (-v=INFO, -vv=DEBUG, -vvv=TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List images whose recorded date disagrees with their capture date
    Scan {
        #[command(flatten)]
        scan: ScanArgs,
        /// Print flagged items as JSON
        #[arg(long)]
        json: bool,
    },
    /// Overwrite mismatched recorded dates with the capture date
    Fix {
        #[command(flatten)]
        scan: ScanArgs,
        /// Show what would change without writing anything
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Args)]
struct ScanArgs {
    /// Directories to scan
    #[arg(required = true)]
    directories: Vec<PathBuf>,
    /// Maximum allowed difference in seconds
    #[arg(short, long, default_value = "2")]
    tolerance: f64,
    /// Only consider images recorded on or after this day (YYYY-MM-DD, UTC)
    #[arg(long)]
    from: Option<String>,
    /// Only consider images recorded on or before this day (YYYY-MM-DD, UTC)
    #[arg(long)]
    to: Option<String>,
    /// Report progress every N images
    #[arg(long, default_value = "25")]
    progress_every: usize,
    /// Disable recursive directory traversal (only process files in immediate directory)
    #[arg(long)]
    no_recursive: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose)?;

    info!("Starting exif-datefix");

    match cli.command {
        Commands::Scan { scan, json } => {
            let (_, outcome) = run_scan(&scan).await?;
            // JSON mode keeps stdout machine-readable
            if json {
                println!("{}", render_json(&outcome.flagged)?);
            } else {
                print!("{}", render_flagged(&outcome.flagged));
                print_summary(&outcome);
            }
            Ok(())
        }
        Commands::Fix { scan, dry_run } => fix(&scan, dry_run).await,
    }
}

fn setup_logging(verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    Ok(())
}

async fn run_scan(args: &ScanArgs) -> Result<(DirectoryStore, ScanOutcome<PathBuf>)> {
    let tolerance = Tolerance::from_secs_f64(args.tolerance).context("Invalid --tolerance")?;
    let config = ScanConfig::new(tolerance)
        .with_progress_interval(args.progress_every)
        .context("Invalid --progress-every")?;
    let interval = DateInterval::from_days(args.from.as_deref(), args.to.as_deref())
        .context("Invalid date range")?;

    let store = DirectoryStore::new(args.directories.clone(), !args.no_recursive);
    let scanner = MismatchScanner::with_config(config);

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec:.1} files/s) ETA: {eta} {msg}")?
            .progress_chars("#>-"),
    );
    pb.set_message("Scanning images");

    let interval = (!interval.is_unbounded()).then_some(interval);
    let outcome = scanner
        .scan(&store, interval, |progress| {
            pb.set_length(progress.total as u64);
            pb.set_position(progress.position as u64);
            pb.set_message(format!("{} flagged", progress.flagged));
        })
        .await
        .context("Failed to enumerate images")?;

    pb.finish_with_message("Scan complete");
    Ok((store, outcome))
}

async fn fix(args: &ScanArgs, dry_run: bool) -> Result<()> {
    let (store, outcome) = run_scan(args).await?;
    let mut working_set = outcome.flagged;

    if working_set.is_empty() {
        println!("\nNo mismatched dates found.");
        return Ok(());
    }

    print!("{}", render_flagged(&working_set));

    if dry_run {
        println!("\nDry run: {} file(s) would be corrected.", working_set.len());
        return Ok(());
    }

    working_set.select_all(true);
    let report = CorrectionApplier::new()
        .apply_selected(&store, &mut working_set)
        .await
        .context("Correction batch was rejected; no dates were changed")?;

    println!("\nCorrection complete!");
    println!("Files corrected: {}", report.corrected.len());
    Ok(())
}

fn render_json(flagged: &FlaggedSet<PathBuf>) -> Result<String> {
    serde_json::to_string_pretty(flagged).context("Failed to serialize flagged items")
}

fn render_flagged(flagged: &FlaggedSet<PathBuf>) -> String {
    let mut out = String::new();
    for item in flagged {
        let drift = item.drift();
        out.push_str(&format!(
            "{}  recorded {}  captured {}  ({:+}s)\n",
            item.identifier,
            item.recorded_date.format("%Y-%m-%d %H:%M:%S"),
            item.extracted_date.format("%Y-%m-%d %H:%M:%S%.3f"),
            drift.num_seconds()
        ));
    }
    out
}

fn print_summary(outcome: &ScanOutcome<PathBuf>) {
    println!("\nScan complete!");
    println!("Files scanned: {}", outcome.scanned);
    println!("Mismatched: {}", outcome.flagged.len());
    println!("Without capture date: {}", outcome.skipped);
}
