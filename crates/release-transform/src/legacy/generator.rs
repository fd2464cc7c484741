//! Bulk CTV3 and SNOMED RT identifier generation.

use std::collections::HashMap;
use std::sync::Arc;

use release_types::SctId;
use uuid::Uuid;

use crate::error::{FaultKind, TransformError};
use crate::idgen::IdAssignmentClient;
use crate::legacy::DependencyGraph;

/// Legacy identifiers generated for a set of new concepts.
#[derive(Debug, Default)]
pub struct LegacyConceptIds {
    /// CTV3 id per concept.
    pub ctv3_ids: HashMap<SctId, String>,
    /// SNOMED RT id per concept.
    pub snomed_ids: HashMap<SctId, String>,
}

/// Generates CTV3 and SNOMED RT identifiers for new concepts in bulk.
pub struct LegacyIdGenerator {
    client: Arc<dyn IdAssignmentClient>,
}

impl LegacyIdGenerator {
    /// Creates a generator backed by the given identifier service.
    pub fn new(client: Arc<dyn IdAssignmentClient>) -> Self {
        LegacyIdGenerator { client }
    }

    /// Generates both legacy id schemes for the given concepts.
    ///
    /// `new_concepts` maps each concept's SCTID to the UUID it was authored
    /// under; `parent_ids` maps a concept to its parent where one is known.
    /// SNOMED RT requests are submitted parents-before-children, so a parent
    /// that is itself new has its id on record before any child asks for one.
    /// Cyclic parent data is rejected. A scheme the id service does not
    /// support is skipped with a warning and leaves its map empty.
    pub async fn generate(
        &self,
        new_concepts: &HashMap<SctId, Uuid>,
        parent_ids: &HashMap<SctId, SctId>,
    ) -> Result<LegacyConceptIds, TransformError> {
        if new_concepts.is_empty() {
            return Ok(LegacyConceptIds::default());
        }
        let ordered = self.order_concepts(new_concepts, parent_ids)?;

        Ok(LegacyConceptIds {
            ctv3_ids: self.generate_ctv3(new_concepts, &ordered).await?,
            snomed_ids: self.generate_snomed(parent_ids, &ordered).await?,
        })
    }

    /// Orders the new concepts so every parent precedes its children.
    fn order_concepts(
        &self,
        new_concepts: &HashMap<SctId, Uuid>,
        parent_ids: &HashMap<SctId, SctId>,
    ) -> Result<Vec<SctId>, TransformError> {
        let mut graph = DependencyGraph::new();
        for sctid in new_concepts.keys() {
            graph.add_node(*sctid);
            if let Some(parent) = parent_ids.get(sctid) {
                // Parents outside the new-concept set already have ids.
                if new_concepts.contains_key(parent) {
                    graph.add_edge(*parent, *sctid);
                }
            }
        }
        graph.topological_sort()
    }

    async fn generate_ctv3(
        &self,
        new_concepts: &HashMap<SctId, Uuid>,
        ordered: &[SctId],
    ) -> Result<HashMap<SctId, String>, TransformError> {
        let uuids: Vec<Uuid> = ordered
            .iter()
            .filter_map(|sctid| new_concepts.get(sctid).copied())
            .collect();
        let by_uuid = match self.client.create_ctv3_id_list(&uuids).await {
            Ok(map) => map,
            Err(fault) if fault.kind == FaultKind::Unsupported => {
                tracing::warn!("id service does not support CTV3 ids, skipping");
                return Ok(HashMap::new());
            }
            Err(fault) => return Err(TransformError::IdAssignment(fault)),
        };
        Ok(new_concepts
            .iter()
            .filter_map(|(sctid, uuid)| by_uuid.get(uuid).map(|id| (*sctid, id.clone())))
            .collect())
    }

    async fn generate_snomed(
        &self,
        parent_ids: &HashMap<SctId, SctId>,
        ordered: &[SctId],
    ) -> Result<HashMap<SctId, String>, TransformError> {
        let records: Vec<(SctId, Option<SctId>)> = ordered
            .iter()
            .map(|sctid| (*sctid, parent_ids.get(sctid).copied()))
            .collect();
        match self.client.create_snomed_id_list(&records).await {
            Ok(map) => Ok(map),
            Err(fault) if fault.kind == FaultKind::Unsupported => {
                tracing::warn!("id service does not support SNOMED RT ids, skipping");
                Ok(HashMap::new())
            }
            Err(fault) => Err(TransformError::IdAssignment(fault)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::IdServiceError;
    use crate::idgen::OfflineDemoIdClient;

    /// Records the order SNOMED RT requests arrive in.
    struct OrderRecordingClient {
        snomed_requests: Mutex<Vec<SctId>>,
    }

    #[async_trait]
    impl IdAssignmentClient for OrderRecordingClient {
        async fn create_sctid(
            &self,
            _component_uuid: Uuid,
            _namespace_id: u32,
            _partition_id: &str,
            _release_id: &str,
            _execution_id: &str,
            _module_id: &str,
        ) -> Result<SctId, IdServiceError> {
            Err(IdServiceError::unsupported("createSCTID"))
        }

        async fn create_sctid_list(
            &self,
            _component_uuids: &[Uuid],
            _namespace_id: u32,
            _partition_id: &str,
            _release_id: &str,
            _execution_id: &str,
            _module_id: &str,
        ) -> Result<HashMap<Uuid, SctId>, IdServiceError> {
            Err(IdServiceError::unsupported("createSCTIDList"))
        }

        async fn create_ctv3_id_list(
            &self,
            component_uuids: &[Uuid],
        ) -> Result<HashMap<Uuid, String>, IdServiceError> {
            Ok(component_uuids
                .iter()
                .map(|uuid| (*uuid, "XUsWA".to_string()))
                .collect())
        }

        async fn create_snomed_id_list(
            &self,
            sctid_with_parent: &[(SctId, Option<SctId>)],
        ) -> Result<HashMap<SctId, String>, IdServiceError> {
            let mut seen = self.snomed_requests.lock().unwrap();
            for (sctid, _) in sctid_with_parent {
                seen.push(*sctid);
            }
            Ok(sctid_with_parent
                .iter()
                .enumerate()
                .map(|(i, (sctid, _))| (*sctid, format!("R-F{i:04x}")))
                .collect())
        }
    }

    #[tokio::test]
    async fn test_parents_requested_before_children() {
        let client = Arc::new(OrderRecordingClient {
            snomed_requests: Mutex::new(Vec::new()),
        });
        let generator = LegacyIdGenerator::new(client.clone());

        // 300 is the parent of 200, which is the parent of 100.
        let new_concepts: HashMap<SctId, Uuid> = [
            (100, Uuid::new_v4()),
            (200, Uuid::new_v4()),
            (300, Uuid::new_v4()),
        ]
        .into();
        let parent_ids: HashMap<SctId, SctId> = [(100, 200), (200, 300)].into();

        let ids = generator.generate(&new_concepts, &parent_ids).await.unwrap();
        assert_eq!(ids.snomed_ids.len(), 3);
        assert_eq!(ids.ctv3_ids.len(), 3);
        assert_eq!(*client.snomed_requests.lock().unwrap(), vec![300, 200, 100]);
    }

    #[tokio::test]
    async fn test_cyclic_parents_rejected() {
        let generator = LegacyIdGenerator::new(Arc::new(OfflineDemoIdClient::new()));
        let new_concepts: HashMap<SctId, Uuid> =
            [(100, Uuid::new_v4()), (200, Uuid::new_v4())].into();
        let parent_ids: HashMap<SctId, SctId> = [(100, 200), (200, 100)].into();

        let err = generator
            .generate(&new_concepts, &parent_ids)
            .await
            .unwrap_err();
        assert!(matches!(err, TransformError::DependencyCycle { .. }));
    }

    #[tokio::test]
    async fn test_offline_client_generates_both_schemes() {
        let generator = LegacyIdGenerator::new(Arc::new(OfflineDemoIdClient::new()));
        let new_concepts: HashMap<SctId, Uuid> = [(800001001, Uuid::new_v4())].into();
        let parent_ids = HashMap::new();

        let ids = generator.generate(&new_concepts, &parent_ids).await.unwrap();
        assert_eq!(ids.ctv3_ids[&800001001], "XUsWA");
        assert_eq!(ids.snomed_ids[&800001001], "R-F0001");
    }

    #[tokio::test]
    async fn test_no_new_concepts_is_a_no_op() {
        let generator = LegacyIdGenerator::new(Arc::new(OfflineDemoIdClient::new()));
        let ids = generator
            .generate(&HashMap::new(), &HashMap::new())
            .await
            .unwrap();
        assert!(ids.ctv3_ids.is_empty());
        assert!(ids.snomed_ids.is_empty());
    }
}
