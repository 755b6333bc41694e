//! Scan orchestrator with progress tracking for CLI or embedding use.
//!
//! Walks the target paths, reads each candidate binary fully into memory,
//! and builds one [`ScanRecord`] per file in parallel. Record building is a
//! pure computation over an immutable buffer, so the rayon fan-out needs no
//! locks and holds no cross-file state.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use walkdir::WalkDir;

use crate::record::ScanRecord;

/// Extensions scanned by default, matching the Windows binary types the
/// database queries are tuned for.
const SCAN_EXTENSIONS: [&str; 3] = ["exe", "dll", "cpl"];

/// Configuration for a scan run.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub target_paths: Vec<PathBuf>,
    /// Scan every regular file instead of just `.exe`/`.dll`/`.cpl`.
    pub all_files: bool,
}

/// Atomic progress tracking -- no Mutex contention with a frontend thread.
pub struct ScanProgress {
    pub total_files: AtomicUsize,
    pub scanned_files: AtomicUsize,
    pub error_count: AtomicUsize,
    pub cancel: AtomicBool,
}

impl ScanProgress {
    pub fn new() -> Self {
        Self {
            total_files: AtomicUsize::new(0),
            scanned_files: AtomicUsize::new(0),
            error_count: AtomicUsize::new(0),
            cancel: AtomicBool::new(false),
        }
    }
}

impl Default for ScanProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a scan run produced: one record per readable file, plus the
/// paths that could not be read at all (which yield no record).
#[derive(Debug)]
pub struct ScanOutcome {
    pub records: Vec<ScanRecord>,
    pub unreadable: Vec<(PathBuf, String)>,
}

/// Whether a path carries one of the scanned binary extensions,
/// case-insensitively.
pub fn has_scan_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            SCAN_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}

/// Collect all candidate file paths from the given paths, expanding
/// directories recursively. Explicitly named files bypass the extension
/// filter: if the operator points at a file, scan it.
pub fn collect_files(paths: &[PathBuf], all_files: bool) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_file() {
            files.push(path.clone());
        } else if path.is_dir() {
            for entry in WalkDir::new(path).follow_links(false).into_iter().flatten() {
                let p = entry.into_path();
                if p.is_file() && (all_files || has_scan_extension(&p)) {
                    files.push(p);
                }
            }
        }
    }

    files
}

/// Run a full scan with progress tracking. Blocking -- call from a
/// background thread when embedding.
pub fn run_scan(config: &ScanConfig, progress: &Arc<ScanProgress>) -> ScanOutcome {
    let files = collect_files(&config.target_paths, config.all_files);
    progress.total_files.store(files.len(), Ordering::Relaxed);

    let results: Vec<Result<ScanRecord, (PathBuf, String)>> = files
        .par_iter()
        .filter_map(|path| {
            if progress.cancel.load(Ordering::Relaxed) {
                return None;
            }

            let result = match fs::read(path) {
                Ok(bytes) => Ok(ScanRecord::build(path.clone(), &bytes)),
                Err(e) => {
                    progress.error_count.fetch_add(1, Ordering::Relaxed);
                    Err((path.clone(), e.to_string()))
                }
            };

            progress.scanned_files.fetch_add(1, Ordering::Relaxed);
            Some(result)
        })
        .collect();

    let mut outcome = ScanOutcome {
        records: Vec::with_capacity(results.len()),
        unreadable: Vec::new(),
    };
    for result in results {
        match result {
            Ok(record) => outcome.records.push(record),
            Err(err) => outcome.unreadable.push(err),
        }
    }
    outcome
}
