//! # release-types
//!
//! Type definitions for SNOMED CT release builds.
//!
//! This crate provides the data model shared by the release build pipeline:
//! builds and their lifecycle state machine, build configuration, the mutable
//! build report, RF2 table schemas, and well-known RF2 constants.
//!
//! ## Usage
//!
//! ```rust
//! use release_types::{Build, BuildConfiguration, BuildStatus, ComponentType};
//!
//! let config = BuildConfiguration::new("20240101");
//! let mut build = Build::new("international", "snomed_release", "20240101120000", config);
//!
//! assert_eq!(build.status, BuildStatus::BeforeTrigger);
//! build.transition(BuildStatus::Queued).unwrap();
//! build.transition(BuildStatus::Building).unwrap();
//! ```

#![warn(missing_docs)]

mod build;
mod report;
pub mod rf2;
mod schema;
mod sctid;

pub use build::{
    Build, BuildConfiguration, BuildStatus, ExtensionConfig, StatusTransitionError,
};
pub use report::{BuildReport, ReportEntry, ReportSeverity};
pub use schema::{ComponentType, ReleaseType, TableSchema};
pub use sctid::{partition_id, PartitionKind, SctId};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_types_are_exported() {
        let _id: SctId = 73211009;
        let _component = ComponentType::Concept;
        let _release = ReleaseType::Delta;
        let _status = BuildStatus::BeforeTrigger;
        let _severity = ReportSeverity::Error;
    }

    #[test]
    fn test_well_known_accessible() {
        assert_eq!(rf2::IS_A_TYPE_ID, "116680003");
        assert_eq!(rf2::INTERNATIONAL_CORE_MODULE_ID, "900000000000207008");
    }
}
