//! # release-service
//!
//! Orchestration layer of the release build pipeline.
//!
//! Input files live in a [`FileStore`]; a [`TransformationService`] runs the
//! build lifecycle over them: structural pre-checks, the sequential
//! identifier pre-assignment pass, the concurrent per-file transformation
//! pass, and the legacy-identifier augmentation post-pass. A finished build's
//! artifacts move to the published area through the [`PublishService`], which
//! guarantees a build is published at most once per process.

#![warn(missing_docs)]

mod legacy;
mod orchestrator;
mod paths;
mod publish;
mod store;
mod upload;

pub use legacy::LegacyIdAugmentationService;
pub use orchestrator::{BuildError, BuildOutcome, NewConcept, TransformationService};
pub use paths::BuildPaths;
pub use publish::{PublishError, PublishService};
pub use store::{FileStore, LocalFileStore, MemoryFileStore, StoreError};
pub use upload::AsyncUploadHandle;
