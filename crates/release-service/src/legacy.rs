//! Legacy identifier augmentation of the simple map refset delta.

use std::sync::Arc;

use release_transform::idgen::UuidGenerator;
use release_transform::legacy::LegacyConceptIds;
use release_types::rf2::{ACTIVE_FLAG, CTV3_ID_REFSET_ID, LINE_ENDING, SNOMED_ID_REFSET_ID};
use release_types::BuildReport;

use crate::orchestrator::NewConcept;
use crate::store::{FileStore, StoreError};

const LEGACY_PHASE: &str = "Legacy Ids";

/// Appends legacy identifier map rows to a transformed simple map refset
/// delta.
///
/// The file is renamed aside first, then rewritten with the original content
/// followed by the appended rows, so a failure part-way never leaves a
/// half-written file under the real key. Each new concept gets one row per
/// generated scheme; a concept the id service produced no identifier for is
/// a warning, not a failure.
pub struct LegacyIdAugmentationService {
    store: Arc<dyn FileStore>,
    uuid_generator: Arc<dyn UuidGenerator>,
}

impl LegacyIdAugmentationService {
    /// Creates the service over a store and member-id generator.
    pub fn new(store: Arc<dyn FileStore>, uuid_generator: Arc<dyn UuidGenerator>) -> Self {
        LegacyIdAugmentationService {
            store,
            uuid_generator,
        }
    }

    /// Rewrites the file at `simple_map_key` with legacy map rows appended.
    pub async fn augment(
        &self,
        simple_map_key: &str,
        new_concepts: &[NewConcept],
        ids: &LegacyConceptIds,
        effective_time: &str,
        report: &BuildReport,
    ) -> Result<(), StoreError> {
        if new_concepts.is_empty() {
            return Ok(());
        }
        let file_name = simple_map_key.rsplit('/').next().unwrap_or(simple_map_key);
        let aside_key = format!("{simple_map_key}.tmp");
        self.store.rename(simple_map_key, &aside_key).await?;

        let mut content = self.store.get(&aside_key).await?;
        if !content.ends_with(b"\n") {
            content.extend_from_slice(LINE_ENDING.as_bytes());
        }

        let mut appended = 0usize;
        for concept in new_concepts {
            match ids.ctv3_ids.get(&concept.sctid) {
                Some(ctv3_id) => {
                    self.append_row(&mut content, effective_time, concept, CTV3_ID_REFSET_ID, ctv3_id);
                    appended += 1;
                }
                None => report.add_warning(
                    LEGACY_PHASE,
                    file_name,
                    format!("no CTV3 id generated for concept {}", concept.sctid),
                    None,
                ),
            }
            match ids.snomed_ids.get(&concept.sctid) {
                Some(snomed_id) => {
                    self.append_row(
                        &mut content,
                        effective_time,
                        concept,
                        SNOMED_ID_REFSET_ID,
                        snomed_id,
                    );
                    appended += 1;
                }
                None => report.add_warning(
                    LEGACY_PHASE,
                    file_name,
                    format!("no SNOMED RT id generated for concept {}", concept.sctid),
                    None,
                ),
            }
        }

        self.store.put(simple_map_key, content).await?;
        self.store.delete(&aside_key).await?;
        tracing::info!(
            file = file_name,
            rows = appended,
            concepts = new_concepts.len(),
            "legacy id rows appended"
        );
        Ok(())
    }

    fn append_row(
        &self,
        content: &mut Vec<u8>,
        effective_time: &str,
        concept: &NewConcept,
        refset_id: &str,
        map_target: &str,
    ) {
        let row = format!(
            "{}\t{effective_time}\t{ACTIVE_FLAG}\t{}\t{refset_id}\t{}\t{map_target}{LINE_ENDING}",
            self.uuid_generator.uuid(),
            concept.module_id,
            concept.sctid,
        );
        content.extend_from_slice(row.as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use release_transform::idgen::PseudoUuidGenerator;

    use super::*;
    use crate::store::MemoryFileStore;

    const KEY: &str = "c/p/b/transformed/der2_sRefset_SimpleMapDelta_INT_20240101.txt";
    const HEADER: &str =
        "id\teffectiveTime\tactive\tmoduleId\trefsetId\treferencedComponentId\tmapTarget";

    fn service(store: Arc<MemoryFileStore>) -> LegacyIdAugmentationService {
        LegacyIdAugmentationService::new(store, Arc::new(PseudoUuidGenerator::new()))
    }

    fn ids(sctid: u64, ctv3: Option<&str>, snomed: Option<&str>) -> LegacyConceptIds {
        LegacyConceptIds {
            ctv3_ids: ctv3
                .map(|id| HashMap::from([(sctid, id.to_string())]))
                .unwrap_or_default(),
            snomed_ids: snomed
                .map(|id| HashMap::from([(sctid, id.to_string())]))
                .unwrap_or_default(),
        }
    }

    #[tokio::test]
    async fn test_appends_one_row_per_scheme() {
        let store = Arc::new(MemoryFileStore::new());
        store
            .put(KEY, format!("{HEADER}\r\n").into_bytes())
            .await
            .unwrap();
        let report = BuildReport::new();
        let new_concepts = vec![NewConcept {
            sctid: 800001001,
            module_id: "900000000000207008".to_string(),
        }];

        service(store.clone())
            .augment(
                KEY,
                &new_concepts,
                &ids(800001001, Some("XUsWA"), Some("R-F0001")),
                "20240101",
                &report,
            )
            .await
            .unwrap();

        let content = String::from_utf8(store.get(KEY).await.unwrap()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains(CTV3_ID_REFSET_ID));
        assert!(lines[1].ends_with("\t800001001\tXUsWA"));
        assert!(lines[2].contains(SNOMED_ID_REFSET_ID));
        assert!(lines[2].ends_with("\t800001001\tR-F0001"));
        assert!(report.is_empty());
        // The rename-aside copy is gone.
        assert!(!store.exists(&format!("{KEY}.tmp")).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_snomed_id_is_a_warning() {
        let store = Arc::new(MemoryFileStore::new());
        store
            .put(KEY, format!("{HEADER}\r\n").into_bytes())
            .await
            .unwrap();
        let report = BuildReport::new();
        let new_concepts = vec![NewConcept {
            sctid: 800001001,
            module_id: "900000000000207008".to_string(),
        }];

        service(store.clone())
            .augment(
                KEY,
                &new_concepts,
                &ids(800001001, Some("XUsWA"), None),
                "20240101",
                &report,
            )
            .await
            .unwrap();

        let content = String::from_utf8(store.get(KEY).await.unwrap()).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(!report.has_errors());
        assert_eq!(report.entries().len(), 1);
    }

    #[tokio::test]
    async fn test_no_new_concepts_leaves_file_untouched() {
        let store = Arc::new(MemoryFileStore::new());
        let original = format!("{HEADER}\r\n");
        store.put(KEY, original.clone().into_bytes()).await.unwrap();
        let report = BuildReport::new();

        service(store.clone())
            .augment(KEY, &[], &LegacyConceptIds::default(), "20240101", &report)
            .await
            .unwrap();

        assert_eq!(store.get(KEY).await.unwrap(), original.into_bytes());
    }
}
