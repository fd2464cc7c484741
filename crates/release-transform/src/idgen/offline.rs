//! Deterministic identifier service for offline and demo runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use release_types::SctId;
use uuid::Uuid;

use crate::error::IdServiceError;
use crate::idgen::IdAssignmentClient;

const CTV3_ID_PREFIX: &str = "XUsW";
const SNOMED_ID_PREFIX: &str = "R-F";
const BOGUS_CHECK_DIGIT: &str = "1";
const SCTID_COUNTER_START: u64 = 800_000;

/// In-process identifier service producing deterministic identifiers.
///
/// SCTIDs count up from a fixed base with the partition identifier and a
/// bogus check digit appended; CTV3 ids cycle through the alphabet behind a
/// fixed prefix; SNOMED RT ids are a zero-padded hex counter. Lookup
/// operations are not implemented and fail with an `Unsupported` fault.
#[derive(Debug)]
pub struct OfflineDemoIdClient {
    sctid_counter: AtomicU64,
    ctv3_char: AtomicU32,
    snomed_id_counter: AtomicU32,
}

impl OfflineDemoIdClient {
    /// Creates a client with counters at their starting values.
    pub fn new() -> Self {
        OfflineDemoIdClient {
            sctid_counter: AtomicU64::new(SCTID_COUNTER_START),
            ctv3_char: AtomicU32::new(b'@' as u32),
            snomed_id_counter: AtomicU32::new(1),
        }
    }

    fn next_sctid(&self, partition_id: &str) -> Result<SctId, IdServiceError> {
        let n = self.sctid_counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{n}{partition_id}{BOGUS_CHECK_DIGIT}")
            .parse::<u64>()
            .map_err(|_| IdServiceError::permanent(format!("invalid partition id '{partition_id}'")))
    }

    fn next_ctv3_id(&self) -> String {
        // Cycle through ASCII alphabetic characters, wrapping after 'z'.
        loop {
            let candidate = self.ctv3_char.fetch_add(1, Ordering::Relaxed) + 1;
            if candidate > u32::from(b'z') {
                self.ctv3_char.store(b'@' as u32, Ordering::Relaxed);
                continue;
            }
            if let Some(c) = char::from_u32(candidate) {
                if c.is_ascii_alphabetic() {
                    return format!("{CTV3_ID_PREFIX}{c}");
                }
            }
        }
    }

    fn next_snomed_id(&self) -> String {
        let n = self.snomed_id_counter.fetch_add(1, Ordering::Relaxed);
        format!("{SNOMED_ID_PREFIX}{n:04x}")
    }
}

impl Default for OfflineDemoIdClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdAssignmentClient for OfflineDemoIdClient {
    async fn create_sctid(
        &self,
        _component_uuid: Uuid,
        _namespace_id: u32,
        partition_id: &str,
        _release_id: &str,
        _execution_id: &str,
        _module_id: &str,
    ) -> Result<SctId, IdServiceError> {
        self.next_sctid(partition_id)
    }

    async fn create_sctid_list(
        &self,
        component_uuids: &[Uuid],
        _namespace_id: u32,
        partition_id: &str,
        _release_id: &str,
        _execution_id: &str,
        _module_id: &str,
    ) -> Result<HashMap<Uuid, SctId>, IdServiceError> {
        let mut map = HashMap::with_capacity(component_uuids.len());
        for uuid in component_uuids {
            map.insert(*uuid, self.next_sctid(partition_id)?);
        }
        Ok(map)
    }

    async fn create_ctv3_id_list(
        &self,
        component_uuids: &[Uuid],
    ) -> Result<HashMap<Uuid, String>, IdServiceError> {
        Ok(component_uuids
            .iter()
            .map(|uuid| (*uuid, self.next_ctv3_id()))
            .collect())
    }

    async fn create_snomed_id_list(
        &self,
        sctid_with_parent: &[(SctId, Option<SctId>)],
    ) -> Result<HashMap<SctId, String>, IdServiceError> {
        Ok(sctid_with_parent
            .iter()
            .map(|(sctid, _parent)| (*sctid, self.next_snomed_id()))
            .collect())
    }
}
