//! # release-transform
//!
//! Streaming RF2 transformation engine and identifier assignment for SNOMED
//! CT release builds.
//!
//! Author-supplied delta files reference components by temporary UUIDs. This
//! crate assigns them permanent identifiers and reshapes each file into its
//! release form:
//!
//! - [`recognize_filename`] maps an RF2 file name to a [`TableSchema`].
//! - [`StreamingFileTransformation`] applies an ordered list of column-level
//!   transformations to a tab-separated file, one line at a time.
//! - [`TransformationFactory`] composes the per-component-type pipelines.
//! - [`idgen`] holds the identifier assignment subsystem: the remote client
//!   trait, the retrying single-flight [`CachedSctidFactory`] and the UUID
//!   generators.
//! - [`legacy`] holds the legacy-identifier machinery: parent lookup from
//!   stated relationships, the dependency graph with its topological sort and
//!   the bulk CTV3/SNOMED RT generator.
//!
//! [`TableSchema`]: release_types::TableSchema
//! [`CachedSctidFactory`]: idgen::CachedSctidFactory

#![warn(missing_docs)]

mod engine;
mod error;
mod factory;
pub mod idgen;
pub mod legacy;
mod line;
mod schema;

pub use engine::{StreamingFileTransformation, TransformationSummary};
pub use error::{FaultKind, IdServiceError, RecognitionError, TransformError};
pub use factory::TransformationFactory;
pub use line::{
    BatchLineTransformation, LineTransformation, RepeatableRelationshipUuidTransform,
    ReplaceValueLineTransformation, SctidFromCacheTransformation, SctidTransformation,
    UuidTransformation,
};
pub use schema::{effective_date_of, recognize_filename};

// Re-export release-types for convenience
pub use release_types;
