//! Mutable build report.
//!
//! The report is the user-visible surface for everything that goes wrong
//! below the whole-build level: per-line transformation failures, per-file
//! errors and warnings. Worker tasks append to it concurrently, so entries
//! sit behind a mutex.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Severity of a report entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportSeverity {
    /// Informational or degraded-but-continued condition.
    Warning,
    /// A recoverable failure; the affected line or file was skipped.
    Error,
}

/// One entry in the build report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    /// Severity of the entry.
    pub severity: ReportSeverity,
    /// The pipeline phase that recorded the entry.
    pub phase: String,
    /// The file being processed when the entry was recorded.
    pub file_name: String,
    /// Human-readable message.
    pub message: String,
    /// One-based line number, when the entry concerns a single line.
    pub line_number: Option<u64>,
}

/// Thread-safe collector of build warnings and errors.
#[derive(Debug, Default)]
pub struct BuildReport {
    entries: Mutex<Vec<ReportEntry>>,
}

impl BuildReport {
    /// Creates an empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an error entry.
    pub fn add_error(
        &self,
        phase: &str,
        file_name: &str,
        message: impl Into<String>,
        line_number: Option<u64>,
    ) {
        self.push(ReportSeverity::Error, phase, file_name, message, line_number);
    }

    /// Records a warning entry.
    pub fn add_warning(
        &self,
        phase: &str,
        file_name: &str,
        message: impl Into<String>,
        line_number: Option<u64>,
    ) {
        self.push(
            ReportSeverity::Warning,
            phase,
            file_name,
            message,
            line_number,
        );
    }

    fn push(
        &self,
        severity: ReportSeverity,
        phase: &str,
        file_name: &str,
        message: impl Into<String>,
        line_number: Option<u64>,
    ) {
        let mut entries = self.entries.lock().expect("report mutex poisoned");
        entries.push(ReportEntry {
            severity,
            phase: phase.to_string(),
            file_name: file_name.to_string(),
            message: message.into(),
            line_number,
        });
    }

    /// Returns a snapshot of all entries recorded so far.
    pub fn entries(&self) -> Vec<ReportEntry> {
        self.entries.lock().expect("report mutex poisoned").clone()
    }

    /// Returns true if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().expect("report mutex poisoned").is_empty()
    }

    /// Returns true if at least one error-severity entry was recorded.
    pub fn has_errors(&self) -> bool {
        self.entries
            .lock()
            .expect("report mutex poisoned")
            .iter()
            .any(|e| e.severity == ReportSeverity::Error)
    }
}
