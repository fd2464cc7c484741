//! Identifier assignment subsystem.
//!
//! The remote identifier service hands out permanent SCTIDs and legacy
//! scheme identifiers in exchange for the temporary UUIDs used by authoring
//! tools. [`IdAssignmentClient`] abstracts the service; [`RestIdClient`]
//! talks to the real one over HTTP, [`OfflineDemoIdClient`] produces
//! deterministic identifiers for offline and demo runs.
//!
//! [`CachedSctidFactory`] sits in front of the client and guarantees
//! exactly-once assignment per UUID within one build execution.

mod cache;
mod offline;
mod rest;
mod uuid_gen;

use std::collections::HashMap;

use async_trait::async_trait;
use release_types::SctId;
use uuid::Uuid;

use crate::error::IdServiceError;

pub use cache::CachedSctidFactory;
pub use offline::OfflineDemoIdClient;
pub use rest::RestIdClient;
pub use uuid_gen::{uuid_generator_for, PseudoUuidGenerator, RandomUuidGenerator, UuidGenerator};

/// Client for the remote identifier service.
///
/// All calls may raise transient faults, which the caller retries, or
/// permanent/unsupported faults, which surface immediately.
#[async_trait]
pub trait IdAssignmentClient: Send + Sync {
    /// Assigns one SCTID for a component UUID.
    #[allow(clippy::too_many_arguments)]
    async fn create_sctid(
        &self,
        component_uuid: Uuid,
        namespace_id: u32,
        partition_id: &str,
        release_id: &str,
        execution_id: &str,
        module_id: &str,
    ) -> Result<SctId, IdServiceError>;

    /// Assigns SCTIDs for a batch of component UUIDs in one call.
    #[allow(clippy::too_many_arguments)]
    async fn create_sctid_list(
        &self,
        component_uuids: &[Uuid],
        namespace_id: u32,
        partition_id: &str,
        release_id: &str,
        execution_id: &str,
        module_id: &str,
    ) -> Result<HashMap<Uuid, SctId>, IdServiceError>;

    /// Generates CTV3 legacy identifiers in bulk.
    async fn create_ctv3_id_list(
        &self,
        component_uuids: &[Uuid],
    ) -> Result<HashMap<Uuid, String>, IdServiceError>;

    /// Generates SNOMED RT legacy identifiers in bulk.
    ///
    /// Pairs must arrive dependency-ordered: the service requires a parent's
    /// legacy identifier to exist before it can derive a child's, so every
    /// `(sctid, parent)` pair must be preceded by the pair that created the
    /// parent's identifier, when the parent is part of the same request.
    async fn create_snomed_id_list(
        &self,
        sctid_with_parent: &[(SctId, Option<SctId>)],
    ) -> Result<HashMap<SctId, String>, IdServiceError>;
}
