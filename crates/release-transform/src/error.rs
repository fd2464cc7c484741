//! Error types for the transformation pipeline.

use thiserror::Error;

/// Classification of an identifier-service fault.
///
/// Retry logic dispatches on the kind rather than on concrete fault types:
/// only `Transient` faults are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Temporary condition; the call may succeed if repeated.
    Transient,
    /// The request is invalid and will never succeed.
    Permanent,
    /// The operation is not implemented by this service.
    Unsupported,
}

/// A fault raised by the remote identifier service.
#[derive(Error, Debug, Clone)]
#[error("identifier service fault ({kind:?}): {message}")]
pub struct IdServiceError {
    /// Classification used by retry logic.
    pub kind: FaultKind,
    /// Human-readable fault description.
    pub message: String,
}

impl IdServiceError {
    /// Creates a transient fault.
    pub fn transient(message: impl Into<String>) -> Self {
        IdServiceError {
            kind: FaultKind::Transient,
            message: message.into(),
        }
    }

    /// Creates a permanent fault.
    pub fn permanent(message: impl Into<String>) -> Self {
        IdServiceError {
            kind: FaultKind::Permanent,
            message: message.into(),
        }
    }

    /// Creates a not-implemented fault.
    pub fn unsupported(operation: &str) -> Self {
        IdServiceError {
            kind: FaultKind::Unsupported,
            message: format!("{operation} is not implemented by this identifier service"),
        }
    }
}

/// Error raised when an RF2 file name is not recognized.
///
/// Callers copy unrecognized files through unmodified rather than treating
/// this as fatal.
#[derive(Error, Debug, Clone)]
#[error("file name not recognised as RF2: {filename}")]
pub struct RecognitionError {
    /// The file name that failed recognition.
    pub filename: String,
}

/// A recoverable transformation failure.
///
/// Aborts only the current line, module group or file; the build report
/// records it and processing continues.
#[derive(Error, Debug)]
pub enum TransformError {
    /// A remote identifier call failed with a non-retryable fault.
    #[error("SCTID creation request failed: {0}")]
    IdAssignment(#[from] IdServiceError),

    /// A transient identifier fault persisted through every retry attempt.
    #[error("identifier call failed after {attempts} attempts: {source}")]
    RetryExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// The last transient fault observed.
        source: IdServiceError,
    },

    /// A component id column held a value that is neither an SCTID nor a UUID.
    #[error("invalid UUID '{value}'")]
    InvalidUuid {
        /// The offending column value.
        value: String,
    },

    /// A transformation addressed a column the row does not have.
    #[error("row has no column {index}")]
    MissingColumn {
        /// The column index that was addressed.
        index: usize,
    },

    /// A UUID was expected in the cache but no SCTID had been assigned.
    #[error("no SCTID cached for UUID {uuid}")]
    SctidNotCached {
        /// The unresolved UUID.
        uuid: String,
    },

    /// The batch identifier call returned no SCTID for a requested UUID.
    #[error("batch identifier call returned no SCTID for UUID {uuid}")]
    MissingBatchResult {
        /// The UUID absent from the batch result.
        uuid: String,
    },

    /// The legacy-id dependency graph contains a cyclic parent chain.
    ///
    /// Cycles are rejected rather than broken; see the dependency ordering
    /// requirement on SNOMED RT generation.
    #[error("dependency cycle detected in parent hierarchy at {node}")]
    DependencyCycle {
        /// A node on the detected cycle.
        node: String,
    },

    /// I/O failure while streaming a file.
    #[error("IO error during transformation: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed row in a tab-separated input read with the csv reader.
    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    /// Failure outside the other categories.
    #[error("{0}")]
    Other(String),
}
