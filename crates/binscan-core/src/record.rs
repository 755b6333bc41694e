//! Scan record builder: one immutable record per inspected file.
//!
//! Building a record never fails. Files that are not PE images at all are
//! still measured as opaque bytes, because a high-entropy blob with a bad
//! header is exactly the kind of thing the downstream queries look for.

use std::path::PathBuf;

use serde::Serialize;

use crate::entropy::shannon_entropy;
use crate::pe::{self, ParseError};
use crate::version_info::{self, VersionInfo};

/// Why a file could not be parsed structurally. The record still carries
/// whole-file entropy in either case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScanError {
    /// No MZ/PE magic: processed as opaque bytes.
    NotAPeFile,
    /// PE magic present but the headers run past the end of the file.
    TruncatedHeaders,
}

impl From<ParseError> for ScanError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::NotPe => ScanError::NotAPeFile,
            ParseError::Truncated(_) => ScanError::TruncatedHeaders,
        }
    }
}

/// Entropy of one section's raw data. `entropy` is `None` when the section
/// header declared a range outside the file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionEntropy {
    pub name: String,
    pub entropy: Option<f64>,
}

/// The unit of scanner output, handed to the persistence layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanRecord {
    pub path: PathBuf,
    pub file_size: u64,
    /// Shannon entropy of the whole file, always computed.
    pub average_entropy: f64,
    /// Per-section entropy in section-table order; empty when the file did
    /// not parse as PE.
    pub section_entropy: Vec<SectionEntropy>,
    pub version_info: Option<VersionInfo>,
    pub scan_error: Option<ScanError>,
}

impl ScanRecord {
    /// Inspect `data` and assemble the record for `path`. Performs no I/O;
    /// the caller supplies the full byte buffer.
    pub fn build(path: impl Into<PathBuf>, data: &[u8]) -> ScanRecord {
        let path = path.into();
        let file_size = data.len() as u64;
        let average_entropy = shannon_entropy(data);

        match pe::parse(data) {
            Ok(image) => {
                let section_entropy = image
                    .sections
                    .iter()
                    .map(|s| SectionEntropy {
                        name: s.name.clone(),
                        entropy: s
                            .raw_range()
                            .and_then(|range| data.get(range))
                            .map(shannon_entropy),
                    })
                    .collect();

                let version_info = image
                    .version_resource
                    .and_then(|loc| data.get(loc.offset..loc.offset + loc.size))
                    .and_then(version_info::decode);

                ScanRecord {
                    path,
                    file_size,
                    average_entropy,
                    section_entropy,
                    version_info,
                    scan_error: None,
                }
            }
            Err(err) => ScanRecord {
                path,
                file_size,
                average_entropy,
                section_entropy: Vec::new(),
                version_info: None,
                scan_error: Some(err.into()),
            },
        }
    }

    /// The per-section entropies as a JSON array of `{"name", "entropy"}`
    /// objects, the shape the `binaries` table stores and the canned
    /// queries take apart with `json_each`.
    pub fn section_entropy_json(&self) -> String {
        serde_json::to_string(&self.section_entropy).unwrap_or_else(|_| "[]".to_owned())
    }

    pub fn is_pe(&self) -> bool {
        self.scan_error.is_none()
    }

    pub fn path_str(&self) -> String {
        self.path.display().to_string()
    }
}
