//! SQLite persistence for scan records.
//!
//! One `binaries` table keyed by unique path. Per-section entropies are
//! stored as a JSON array so the canned reports can take them apart with
//! SQLite's `json_each`/`json_extract`.

use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use crate::record::ScanRecord;
use crate::version_info::VersionInfo;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS binaries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        path TEXT UNIQUE,
        company_name TEXT,
        file_description TEXT,
        file_version TEXT,
        internal_name TEXT,
        copyright TEXT,
        original_filename TEXT,
        product_name TEXT,
        product_version TEXT,
        comments TEXT,
        section_entropy_json TEXT,
        avg_entropy REAL
    );
";

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the scan database at `path` and ensure the schema
    /// exists.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("cannot open database at {}", path.display()))?;
        conn.execute_batch(SCHEMA).context("cannot create binaries table")?;
        Ok(Self { conn })
    }

    /// In-memory store, used by tests and throwaway scans.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Insert or replace one record, keyed by path. A rescan of the same
    /// file overwrites its previous row.
    pub fn upsert(&self, record: &ScanRecord) -> Result<()> {
        let empty = VersionInfo::default();
        let info = record.version_info.as_ref().unwrap_or(&empty);

        self.conn
            .execute(
                "INSERT OR REPLACE INTO binaries (
                    path, company_name, file_description, file_version,
                    internal_name, copyright, original_filename,
                    product_name, product_version, comments,
                    section_entropy_json, avg_entropy
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    record.path_str(),
                    info.company_name,
                    info.file_description,
                    info.file_version,
                    info.internal_name,
                    info.legal_copyright,
                    info.original_filename,
                    info.product_name,
                    info.product_version,
                    info.comments,
                    record.section_entropy_json(),
                    record.average_entropy,
                ],
            )
            .with_context(|| format!("cannot store record for {}", record.path_str()))?;
        Ok(())
    }

    /// Store a batch of records inside one transaction. Returns the number
    /// written.
    pub fn upsert_all(&mut self, records: &[ScanRecord]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO binaries (
                    path, company_name, file_description, file_version,
                    internal_name, copyright, original_filename,
                    product_name, product_version, comments,
                    section_entropy_json, avg_entropy
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            )?;
            for record in records {
                let empty = VersionInfo::default();
                let info = record.version_info.as_ref().unwrap_or(&empty);
                stmt.execute(params![
                    record.path_str(),
                    info.company_name,
                    info.file_description,
                    info.file_version,
                    info.internal_name,
                    info.legal_copyright,
                    info.original_filename,
                    info.product_name,
                    info.product_version,
                    info.comments,
                    record.section_entropy_json(),
                    record.average_entropy,
                ])?;
            }
        }
        tx.commit()?;
        Ok(records.len())
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}
