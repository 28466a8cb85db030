//! LMDB database integrity checks.
//!
//! Run when a store opens, to detect corruption before the relay starts
//! voting or serving headers.

use std::path::Path;

use heed::Env;

use crate::LmdbError;

/// Summary of an integrity check run.
#[derive(Debug)]
pub struct IntegrityReport {
    pub databases_checked: u32,
    pub total_entries: u64,
    pub errors: Vec<String>,
}

impl IntegrityReport {
    /// Returns `true` if no errors were detected.
    pub fn is_healthy(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Count the entries of each expected named database.
///
/// Read failures are recorded in the report rather than returned, so the
/// caller sees every broken database at once. Missing databases are fine.
pub fn check_integrity(env: &Env, expected: &[&str]) -> Result<IntegrityReport, LmdbError> {
    let mut report = IntegrityReport {
        databases_checked: 0,
        total_entries: 0,
        errors: Vec::new(),
    };

    let rtxn = env.read_txn()?;

    for &db_name in expected {
        match env.open_database::<heed::types::Bytes, heed::types::Bytes>(&rtxn, Some(db_name)) {
            Ok(Some(db)) => {
                report.databases_checked += 1;
                match db.len(&rtxn) {
                    Ok(count) => report.total_entries += count,
                    Err(e) => report
                        .errors
                        .push(format!("failed to read database '{}': {}", db_name, e)),
                }
            }
            Ok(None) => {}
            Err(e) => report
                .errors
                .push(format!("failed to open database '{}': {}", db_name, e)),
        }
    }

    Ok(report)
}

/// Check that an existing store directory holds an LMDB data file.
///
/// A nonexistent directory is a fresh start and passes.
pub fn check_data_dir(path: &Path) -> Result<(), LmdbError> {
    if !path.exists() {
        return Ok(());
    }
    if !path.is_dir() {
        return Err(LmdbError::Io(format!(
            "store path {} exists and is not a directory",
            path.display()
        )));
    }
    let has_entries = std::fs::read_dir(path)?.next().is_some();
    if has_entries && !path.join("data.mdb").exists() {
        return Err(LmdbError::Io(format!(
            "store directory {} is not empty but data.mdb is missing",
            path.display()
        )));
    }
    Ok(())
}
