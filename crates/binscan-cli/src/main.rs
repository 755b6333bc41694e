//! Binary triage scanner CLI.
//!
//! Usage:
//!   binscan scan C:\some\dir --database binary_info.db
//!   binscan scan ./sample.exe --all-files
//!   binscan query high-entropy -t 7.8 --format json
//!   binscan query missing-info
//!   binscan query text-section -t 7.0

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use binscan_core::report::{
    self, high_entropy, missing_info, print_report, print_scan_summary, text_section,
    OutputFormat, QueryReport,
};
use binscan_core::scan::{run_scan, ScanConfig, ScanProgress};
use binscan_core::store::Store;

const DEFAULT_DB: &str = "binary_info.db";

#[derive(Parser)]
#[command(name = "binscan")]
#[command(about = "Scan Windows binaries for version info and section entropy")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Walk paths, inspect each binary, and store the results
    Scan {
        /// Paths to scan (files or directories)
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Path to the SQLite database file
        #[arg(short, long, default_value = DEFAULT_DB)]
        database: PathBuf,

        /// Scan every file instead of just .exe/.dll/.cpl
        #[arg(long)]
        all_files: bool,
    },
    /// Run a canned anomaly query against an existing database
    Query {
        /// Path to the SQLite database file
        #[arg(short, long, default_value = DEFAULT_DB)]
        database: PathBuf,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,

        #[command(subcommand)]
        query: QueryKind,
    },
}

#[derive(Subcommand)]
enum QueryKind {
    /// Files with high average entropy (packed/encrypted)
    HighEntropy {
        /// Entropy threshold (0.0 to 8.0)
        #[arg(short, long, default_value_t = report::DEFAULT_HIGH_ENTROPY_THRESHOLD)]
        threshold: f64,
    },
    /// Files with missing version info (suspicious)
    MissingInfo,
    /// Files with a high-entropy .text section (packed)
    TextSection {
        /// Entropy threshold (0.0 to 8.0)
        #[arg(short, long, default_value_t = report::DEFAULT_TEXT_SECTION_THRESHOLD)]
        threshold: f64,
    },
}

fn cmd_scan(paths: Vec<PathBuf>, database: PathBuf, all_files: bool) -> Result<()> {
    let config = ScanConfig {
        target_paths: paths,
        all_files,
    };
    let progress = Arc::new(ScanProgress::new());

    eprintln!("[*] Scanning...");
    let outcome = run_scan(&config, &progress);
    eprintln!(
        "[*] Scanned {} files",
        progress.scanned_files.load(Ordering::Relaxed)
    );

    if outcome.records.is_empty() && outcome.unreadable.is_empty() {
        eprintln!("[*] No files to scan.");
        return Ok(());
    }

    let mut store = Store::open(&database)?;
    let written = store.upsert_all(&outcome.records)?;
    eprintln!("[*] Stored {} records in {}", written, database.display());

    print_scan_summary(&outcome);
    Ok(())
}

fn cmd_query(database: PathBuf, format: OutputFormat, query: QueryKind) -> Result<()> {
    if !database.exists() {
        bail!(
            "database not found at {}; run `binscan scan` first or pass --database",
            database.display()
        );
    }
    let store = Store::open(&database)?;

    let report = match query {
        QueryKind::HighEntropy { threshold } => {
            eprintln!("[*] Querying for files with avg. entropy > {threshold}...");
            QueryReport::HighEntropy(high_entropy(store.conn(), threshold)?)
        }
        QueryKind::MissingInfo => {
            eprintln!("[*] Querying for files with missing version info...");
            QueryReport::MissingInfo(missing_info(store.conn())?)
        }
        QueryKind::TextSection { threshold } => {
            eprintln!("[*] Querying for files with .text section entropy > {threshold}...");
            QueryReport::TextSection(text_section(store.conn(), threshold)?)
        }
    };

    print_report(&report, format);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Scan {
            paths,
            database,
            all_files,
        } => cmd_scan(paths, database, all_files),
        Command::Query {
            database,
            format,
            query,
        } => cmd_query(database, format, query),
    }
}
