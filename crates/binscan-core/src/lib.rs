//! binscan-core — PE inspection engine.
//!
//! Parses Windows binaries structurally, measures per-section and
//! whole-file Shannon entropy, decodes embedded VS_VERSIONINFO resources,
//! and persists one record per file to a SQLite database that the canned
//! anomaly reports query.

pub mod entropy;
pub mod pe;
pub mod record;
pub mod report;
pub mod scan;
pub mod store;
pub mod version_info;

#[cfg(test)]
pub(crate) mod testutil;
