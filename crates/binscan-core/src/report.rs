//! Canned anomaly queries over the scan database, with text/JSON output.
//!
//! These mirror the questions an analyst actually asks of the data: what is
//! packed (high whole-file entropy), what is pretending to be nothing
//! (missing version info), and what has an encrypted code section (high
//! `.text` entropy).

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;

use crate::record::ScanRecord;
use crate::scan::ScanOutcome;

pub const DEFAULT_HIGH_ENTROPY_THRESHOLD: f64 = 7.5;
pub const DEFAULT_TEXT_SECTION_THRESHOLD: f64 = 7.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {s}. Use 'text' or 'json'.")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HighEntropyRow {
    pub path: String,
    pub avg_entropy: f64,
    pub company_name: Option<String>,
    pub product_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MissingInfoRow {
    pub path: String,
    pub avg_entropy: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextSectionRow {
    pub path: String,
    pub text_entropy: f64,
    pub product_name: Option<String>,
}

/// Files whose whole-file entropy exceeds `threshold`, most suspicious
/// first. Packed and encrypted binaries cluster above 7.5.
pub fn high_entropy(conn: &Connection, threshold: f64) -> Result<Vec<HighEntropyRow>> {
    let mut stmt = conn.prepare(
        "SELECT path, avg_entropy, company_name, product_name
         FROM binaries
         WHERE avg_entropy > ?1
         ORDER BY avg_entropy DESC",
    )?;
    let rows = stmt
        .query_map([threshold], |row| {
            Ok(HighEntropyRow {
                path: row.get(0)?,
                avg_entropy: row.get(1)?,
                company_name: row.get(2)?,
                product_name: row.get(3)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Files with no publisher metadata at all. Legitimate software almost
/// always carries a version resource; its absence is a cheap tell.
pub fn missing_info(conn: &Connection) -> Result<Vec<MissingInfoRow>> {
    let mut stmt = conn.prepare(
        "SELECT path, avg_entropy
         FROM binaries
         WHERE company_name IS NULL
            OR file_description IS NULL
            OR product_name IS NULL
         ORDER BY avg_entropy DESC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(MissingInfoRow {
                path: row.get(0)?,
                avg_entropy: row.get(1)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Files whose `.text` section entropy exceeds `threshold`. Needs SQLite
/// built with the JSON1 functions, which the bundled library always is.
pub fn text_section(conn: &Connection, threshold: f64) -> Result<Vec<TextSectionRow>> {
    let mut stmt = conn
        .prepare(
            "SELECT
                b.path,
                json_extract(j.value, '$.entropy') AS text_entropy,
                b.product_name
             FROM
                binaries b,
                json_each(b.section_entropy_json) j
             WHERE
                json_extract(j.value, '$.name') = '.text'
                AND json_extract(j.value, '$.entropy') > ?1
             ORDER BY
                text_entropy DESC",
        )
        .context("json_each query failed to prepare; SQLite lacks JSON1?")?;
    let rows = stmt
        .query_map([threshold], |row| {
            Ok(TextSectionRow {
                path: row.get(0)?,
                text_entropy: row.get(1)?,
                product_name: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Result set of one canned query, ready for printing.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum QueryReport {
    HighEntropy(Vec<HighEntropyRow>),
    MissingInfo(Vec<MissingInfoRow>),
    TextSection(Vec<TextSectionRow>),
}

impl QueryReport {
    pub fn len(&self) -> usize {
        match self {
            QueryReport::HighEntropy(rows) => rows.len(),
            QueryReport::MissingInfo(rows) => rows.len(),
            QueryReport::TextSection(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn print_report(report: &QueryReport, format: OutputFormat) {
    match format {
        OutputFormat::Text => print_report_text(report),
        OutputFormat::Json => print_report_json(report),
    }
}

fn print_report_text(report: &QueryReport) {
    if report.is_empty() {
        println!("  -> No results found for this query.");
        return;
    }

    println!("\n  --- Found {} matching files ---", report.len());
    match report {
        QueryReport::HighEntropy(rows) => {
            println!("  {:<8} {:<24} {:<24} Path", "Entropy", "Company", "Product");
            println!("  {}", "-".repeat(70));
            for r in rows {
                println!(
                    "  {:<8.4} {:<24} {:<24} {}",
                    r.avg_entropy,
                    r.company_name.as_deref().unwrap_or("(null)"),
                    r.product_name.as_deref().unwrap_or("(null)"),
                    r.path,
                );
            }
        }
        QueryReport::MissingInfo(rows) => {
            println!("  {:<8} Path", "Entropy");
            println!("  {}", "-".repeat(70));
            for r in rows {
                println!("  {:<8.4} {}", r.avg_entropy, r.path);
            }
        }
        QueryReport::TextSection(rows) => {
            println!("  {:<8} {:<24} Path", ".text", "Product");
            println!("  {}", "-".repeat(70));
            for r in rows {
                println!(
                    "  {:<8.4} {:<24} {}",
                    r.text_entropy,
                    r.product_name.as_deref().unwrap_or("(null)"),
                    r.path,
                );
            }
        }
    }
}

fn print_report_json(report: &QueryReport) {
    let output = serde_json::json!({
        "count": report.len(),
        "results": report,
    });
    println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
}

/// Post-scan summary printed by the CLI.
pub fn print_scan_summary(outcome: &ScanOutcome) {
    let records = &outcome.records;
    let pe: Vec<&ScanRecord> = records.iter().filter(|r| r.is_pe()).collect();
    let with_version = pe.iter().filter(|r| r.version_info.is_some()).count();

    if !outcome.unreadable.is_empty() {
        println!("\nUNREADABLE FILES ({}):", outcome.unreadable.len());
        for (path, err) in &outcome.unreadable {
            println!("  [ERR ] {} -- {}", path.display(), err);
        }
    }

    println!("\nSUMMARY:");
    println!("  Total files scanned: {}", records.len());
    println!("  Valid PE images:     {}", pe.len());
    println!("  With version info:   {with_version}");
    println!("  Not PE / opaque:     {}", records.len() - pe.len());
    println!("  Unreadable:          {}", outcome.unreadable.len());
}
