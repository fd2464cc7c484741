//! Build orchestration: pre-checks, the two transformation passes and the
//! legacy post-pass.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use release_transform::idgen::{
    uuid_generator_for, CachedSctidFactory, IdAssignmentClient, UuidGenerator,
};
use release_transform::legacy::{find_parent_ids, LegacyIdGenerator};
use release_transform::{
    effective_date_of, recognize_filename, TransformError, TransformationFactory,
};
use release_types::rf2::{
    BETA_RELEASE_PREFIX, CONCEPT_DELTA, SIMPLE_MAP_REFSET_DELTA, STATED_RELATIONSHIP_DELTA,
};
use release_types::{
    Build, BuildConfiguration, BuildReport, BuildStatus, SctId, StatusTransitionError, TableSchema,
};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::legacy::LegacyIdAugmentationService;
use crate::paths::BuildPaths;
use crate::store::{FileStore, StoreError};
use crate::upload::AsyncUploadHandle;

const TRANSFORMATION_PHASE: &str = "File Transformation";
const LEGACY_PHASE: &str = "Legacy Ids";
const CONCEPT_SNAPSHOT_FRAGMENT: &str = "sct2_Concept_Snapshot";

/// Error that fails a whole build, as opposed to the per-line and per-file
/// failures collected in the build report.
#[derive(Error, Debug)]
pub enum BuildError {
    /// No manifest file was found under the build's manifest area.
    #[error("no manifest file found")]
    MissingManifest,
    /// A recognized input file carries a different effective time than the
    /// build configuration.
    #[error("{file} carries effective time {found}, build is configured for {expected}")]
    EffectiveTimeMismatch {
        /// The offending input file.
        file: String,
        /// The effective time in the file name.
        found: String,
        /// The configured effective time.
        expected: String,
    },
    /// The input-prepare report recorded errors during input gathering.
    #[error("input-prepare report contains {count} errors")]
    InputPrepareReportErrors {
        /// Number of errors in the report.
        count: usize,
    },
    /// The input-prepare report exists but could not be parsed.
    #[error("input-prepare report is unreadable: {0}")]
    InputPrepareReportUnreadable(String),
    /// A store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// A transformation failed outside the per-line recovery path.
    #[error(transparent)]
    Transform(#[from] TransformError),
    /// An illegal lifecycle transition was attempted.
    #[error(transparent)]
    Status(#[from] StatusTransitionError),
}

impl BuildError {
    /// The failure status a build moves to when this error aborts it.
    pub fn failure_status(&self) -> BuildStatus {
        match self {
            BuildError::MissingManifest | BuildError::EffectiveTimeMismatch { .. } => {
                BuildStatus::FailedPreConditions
            }
            BuildError::InputPrepareReportErrors { .. }
            | BuildError::InputPrepareReportUnreadable(_) => {
                BuildStatus::FailedInputPrepareReportValidation
            }
            _ => BuildStatus::Failed,
        }
    }
}

/// A concept whose SCTID was first assigned by this build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewConcept {
    /// The newly assigned concept SCTID.
    pub sctid: SctId,
    /// The concept's module, as a resolved SCTID string.
    pub module_id: String,
}

/// Result of one build run.
#[derive(Debug)]
pub struct BuildOutcome {
    /// The build's final status.
    pub status: BuildStatus,
    /// Everything recorded below the whole-build level.
    pub report: Arc<BuildReport>,
}

/// Report written by the input gathering stage, validated before any file
/// work starts.
#[derive(Debug, Deserialize)]
struct InputPrepareReport {
    #[serde(default)]
    errors: Vec<String>,
    #[serde(default)]
    warnings: Vec<String>,
}

enum RunEnd {
    Complete,
    Cancelled,
}

/// One recognized (or pass-through) input file.
#[derive(Clone)]
struct InputFile {
    name: String,
    schema: Option<TableSchema>,
    pre_processed: bool,
}

/// Runs the release build lifecycle over the files of one build.
///
/// Pass 1 assigns concept and description identifiers sequentially, so that
/// the shared cache holds every id the concurrent pass will reference. Pass
/// 2 transforms every input file on a bounded worker pool. Per-file problems
/// land in the build report; only structural failures abort the build. The
/// cancellation token is honoured at phase boundaries, never mid-file.
pub struct TransformationService {
    store: Arc<dyn FileStore>,
    id_client: Arc<dyn IdAssignmentClient>,
}

impl TransformationService {
    /// Creates the service over a store and identifier service client.
    pub fn new(store: Arc<dyn FileStore>, id_client: Arc<dyn IdAssignmentClient>) -> Self {
        TransformationService { store, id_client }
    }

    /// Runs one build to a terminal status.
    pub async fn run_build(
        &self,
        build: &mut Build,
        cancellation: &CancellationToken,
    ) -> BuildOutcome {
        let report = Arc::new(BuildReport::new());
        let status = match self.run_inner(build, cancellation, &report).await {
            Ok(_) => build.status,
            Err(error) => {
                let status = error.failure_status();
                tracing::error!(build = %build.unique_id(), %error, ?status, "build failed");
                report.add_error("Build", "", error.to_string(), None);
                // A failure transition is legal from any non-terminal status.
                let _ = build.transition(status);
                build.status
            }
        };
        BuildOutcome { status, report }
    }

    async fn run_inner(
        &self,
        build: &mut Build,
        cancellation: &CancellationToken,
        report: &Arc<BuildReport>,
    ) -> Result<RunEnd, BuildError> {
        build.transition(BuildStatus::Queued)?;
        build.transition(BuildStatus::Building)?;
        tracing::info!(build = %build.unique_id(), "build started");

        let paths = BuildPaths::new(build);
        let config = build.configuration.clone();
        let files = self.pre_checks(&paths, &config, report).await?;

        if cancellation.is_cancelled() {
            return self.cancel(build, &paths).await;
        }

        if config.just_package {
            for file in &files {
                self.store
                    .copy(
                        &paths.input_file(&file.name),
                        &paths.transformed_file(&file.name),
                    )
                    .await?;
            }
            return self.package_and_complete(build, &paths, report).await;
        }

        let sctid_factory = Arc::new(CachedSctidFactory::new(
            config.namespace_id(),
            &config.effective_time,
            build.unique_id(),
            self.id_client.clone(),
            config.id_gen_max_tries,
            Duration::from_millis(config.id_gen_retry_delay_ms),
        ));
        let uuid_generator = uuid_generator_for(config.offline_mode);
        let factory = Arc::new(TransformationFactory::new(
            &config.effective_time,
            config.namespace_id(),
            sctid_factory.clone(),
            uuid_generator.clone(),
            config.transform_buffer_size,
        ));

        self.pre_process_pass(&paths, &files, &factory, report)
            .await?;
        if cancellation.is_cancelled() {
            return self.cancel(build, &paths).await;
        }

        self.main_pass(&paths, &files, &factory, &config, report)
            .await;
        if cancellation.is_cancelled() {
            return self.cancel(build, &paths).await;
        }

        if config.create_legacy_ids {
            if let Err(error) = self
                .legacy_pass(&paths, &config, &sctid_factory, uuid_generator, report)
                .await
            {
                // Legacy id generation failing does not fail the build.
                tracing::warn!(%error, "legacy id generation failed");
                report.add_error(LEGACY_PHASE, "", error.to_string(), None);
            }
        }

        build.transition(BuildStatus::Built)?;
        self.package_and_complete(build, &paths, report).await
    }

    /// Structural pre-checks, run before any file work.
    async fn pre_checks(
        &self,
        paths: &BuildPaths,
        config: &BuildConfiguration,
        report: &BuildReport,
    ) -> Result<Vec<InputFile>, BuildError> {
        // Manifest presence, first-file convention.
        let manifest_files = self.store.list(&paths.manifest()).await?;
        match manifest_files.first() {
            Some(manifest) => tracing::debug!(manifest = %manifest, "using manifest"),
            None => return Err(BuildError::MissingManifest),
        }

        // Input-prepare report, when input gathering produced one.
        let report_key = paths.input_prepare_report();
        if self.store.exists(&report_key).await? {
            let bytes = self.store.get(&report_key).await?;
            let prepare: InputPrepareReport = serde_json::from_slice(&bytes)
                .map_err(|e| BuildError::InputPrepareReportUnreadable(e.to_string()))?;
            if !prepare.errors.is_empty() {
                return Err(BuildError::InputPrepareReportErrors {
                    count: prepare.errors.len(),
                });
            }
            for warning in prepare.warnings {
                report.add_warning("Input Prepare", "", warning, None);
            }
        }

        // Recognize input files; every recognized name must carry the
        // configured effective time.
        let mut files = Vec::new();
        for key in self.store.list(&paths.input()).await? {
            let name = key.rsplit('/').next().unwrap_or(&key).to_string();
            let schema = match recognize_filename(&name) {
                Ok(schema) => {
                    if let Some(found) = effective_date_of(&name) {
                        if found != config.effective_time {
                            let found = found.to_string();
                            return Err(BuildError::EffectiveTimeMismatch {
                                file: name,
                                found,
                                expected: config.effective_time.clone(),
                            });
                        }
                    }
                    Some(schema)
                }
                Err(_) => None,
            };
            files.push(InputFile {
                name,
                schema,
                pre_processed: false,
            });
        }
        Ok(files)
    }

    /// Pass 1: sequential identifier pre-assignment for concept and
    /// description files, into the intermediate area.
    async fn pre_process_pass(
        &self,
        paths: &BuildPaths,
        files: &[InputFile],
        factory: &TransformationFactory,
        report: &BuildReport,
    ) -> Result<(), BuildError> {
        for file in files {
            let Some(schema) = &file.schema else { continue };
            let Some(engine) = factory.pre_process_transformation(schema.component_type) else {
                continue;
            };
            tracing::info!(file = %file.name, "pre-assigning identifiers");
            let bytes = self.store.get(&paths.input_file(&file.name)).await?;
            let target_key = paths.transformed_input_file(&file.name);
            let mut handle = AsyncUploadHandle::new(self.store.clone(), target_key.clone());
            let result = engine
                .transform_file(&bytes[..], handle.writer(), &file.name, report)
                .await;
            match result {
                Ok(_) => handle.finish().await?,
                Err(error) => {
                    // A per-file failure is reported, not fatal; the main
                    // pass will fail the same file and keep it out of the
                    // release package.
                    tracing::warn!(file = %file.name, %error, "pre-assignment failed");
                    report.add_error(TRANSFORMATION_PHASE, &file.name, error.to_string(), None);
                    handle.abandon().await;
                    self.store.delete(&target_key).await?;
                }
            }
        }
        Ok(())
    }

    /// Pass 2: every input file transformed on a bounded worker pool.
    /// Per-file errors become report entries, never build failures.
    async fn main_pass(
        &self,
        paths: &BuildPaths,
        files: &[InputFile],
        factory: &Arc<TransformationFactory>,
        config: &BuildConfiguration,
        report: &Arc<BuildReport>,
    ) {
        // Pass 1 ran on the same file list, so recompute which files have
        // intermediates rather than thread its result through.
        let semaphore = Arc::new(Semaphore::new(config.parallelism.max(1)));
        let mut tasks = Vec::with_capacity(files.len());
        for file in files {
            let file = InputFile {
                pre_processed: file
                    .schema
                    .as_ref()
                    .is_some_and(|s| factory.pre_process_transformation(s.component_type).is_some()),
                ..file.clone()
            };
            let store = self.store.clone();
            let paths = paths.clone();
            let factory = factory.clone();
            let report = report.clone();
            let semaphore = semaphore.clone();
            let beta = config.beta_release;
            tasks.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("semaphore closed while tasks pending");
                if let Err(error) =
                    Self::transform_one(&store, &paths, &file, &factory, beta, &report).await
                {
                    tracing::warn!(file = %file.name, %error, "file transformation failed");
                    report.add_error(TRANSFORMATION_PHASE, &file.name, error.to_string(), None);
                }
            }));
        }
        for task in tasks {
            if let Err(join_error) = task.await {
                report.add_error(TRANSFORMATION_PHASE, "", join_error.to_string(), None);
            }
        }
    }

    async fn transform_one(
        store: &Arc<dyn FileStore>,
        paths: &BuildPaths,
        file: &InputFile,
        factory: &TransformationFactory,
        beta: bool,
        report: &BuildReport,
    ) -> Result<(), BuildError> {
        let Some(schema) = &file.schema else {
            // Unrecognized files pass through untouched.
            report.add_warning(
                TRANSFORMATION_PHASE,
                &file.name,
                "file name not recognized, copied through unmodified",
                None,
            );
            store
                .copy(
                    &paths.input_file(&file.name),
                    &paths.transformed_file(&file.name),
                )
                .await?;
            return Ok(());
        };

        let source_key = if file.pre_processed {
            paths.transformed_input_file(&file.name)
        } else {
            paths.input_file(&file.name)
        };
        let output_name = if beta {
            format!("{BETA_RELEASE_PREFIX}{}", schema.filename)
        } else {
            schema.filename.clone()
        };
        tracing::info!(file = %file.name, output = %output_name, "transforming");

        let engine = factory.transformation(schema.component_type);
        let bytes = store.get(&source_key).await?;
        let target_key = paths.transformed_file(&output_name);
        let mut handle = AsyncUploadHandle::new(store.clone(), target_key.clone());
        let result = engine
            .transform_file(&bytes[..], handle.writer(), &file.name, report)
            .await;
        let summary = match result {
            Ok(summary) => summary,
            Err(error) => {
                // A failed file must not reach the release package.
                handle.abandon().await;
                store.delete(&target_key).await?;
                return Err(error.into());
            }
        };
        handle.finish().await?;
        tracing::info!(
            file = %file.name,
            lines = summary.lines_written,
            failed = summary.lines_failed,
            "file transformed"
        );
        Ok(())
    }

    /// Post-pass: generate legacy CTV3/SNOMED RT ids for new concepts and
    /// append them to the simple map refset delta.
    async fn legacy_pass(
        &self,
        paths: &BuildPaths,
        config: &BuildConfiguration,
        sctid_factory: &CachedSctidFactory,
        uuid_generator: Arc<dyn UuidGenerator>,
        report: &BuildReport,
    ) -> Result<(), BuildError> {
        let transformed = self.store.list(&paths.transformed()).await?;
        let Some(simple_map_key) = transformed
            .iter()
            .find(|key| key.contains(SIMPLE_MAP_REFSET_DELTA))
        else {
            tracing::debug!("no simple map refset delta, skipping legacy ids");
            return Ok(());
        };
        let Some(concept_key) = transformed.iter().find(|key| key.contains(CONCEPT_DELTA))
        else {
            return Ok(());
        };

        let previous_ids = self.previous_concept_ids(paths, config).await?;
        let new_concepts =
            Self::detect_new_concepts(&self.store.get(concept_key).await?, &previous_ids);
        if new_concepts.is_empty() {
            return Ok(());
        }
        tracing::info!(count = new_concepts.len(), "new concepts found");

        // The UUID each new concept was authored under, from this run's
        // assignment cache.
        let uuid_by_sctid: HashMap<SctId, Uuid> = sctid_factory
            .resolved_entries()
            .into_iter()
            .filter_map(|(uuid, sctid)| Uuid::parse_str(&uuid).ok().map(|u| (sctid, u)))
            .collect();
        let mut with_uuid = HashMap::new();
        for concept in &new_concepts {
            match uuid_by_sctid.get(&concept.sctid) {
                Some(uuid) => {
                    with_uuid.insert(concept.sctid, *uuid);
                }
                None => report.add_warning(
                    LEGACY_PHASE,
                    "",
                    format!(
                        "concept {} was not assigned in this run, no legacy ids generated",
                        concept.sctid
                    ),
                    None,
                ),
            }
        }

        let wanted: HashSet<SctId> = with_uuid.keys().copied().collect();
        let parent_ids = match transformed
            .iter()
            .find(|key| key.contains(STATED_RELATIONSHIP_DELTA))
        {
            Some(stated_key) => {
                let bytes = self.store.get(stated_key).await?;
                find_parent_ids(&bytes[..], &wanted)?
            }
            None => HashMap::new(),
        };

        let generator = LegacyIdGenerator::new(self.id_client.clone());
        let ids = generator.generate(&with_uuid, &parent_ids).await?;

        let augmentation = LegacyIdAugmentationService::new(self.store.clone(), uuid_generator);
        let augmented: Vec<NewConcept> = new_concepts
            .into_iter()
            .filter(|c| with_uuid.contains_key(&c.sctid))
            .collect();
        augmentation
            .augment(
                simple_map_key,
                &augmented,
                &ids,
                &config.effective_time,
                report,
            )
            .await?;
        Ok(())
    }

    /// Concept ids present in the previously published concept snapshot.
    async fn previous_concept_ids(
        &self,
        paths: &BuildPaths,
        config: &BuildConfiguration,
    ) -> Result<HashSet<SctId>, BuildError> {
        let Some(package) = &config.previous_published_package else {
            return Ok(HashSet::new());
        };
        let prefix = format!("{}{package}/", paths.published());
        let files = self.store.list(&prefix).await?;
        let Some(snapshot_key) = files
            .iter()
            .find(|key| key.contains(CONCEPT_SNAPSHOT_FRAGMENT))
        else {
            tracing::warn!(package = %package, "previous package has no concept snapshot");
            return Ok(HashSet::new());
        };
        let bytes = self.store.get(snapshot_key).await?;
        let content = String::from_utf8_lossy(&bytes);
        Ok(content
            .lines()
            .skip(1)
            .filter_map(|line| line.split('\t').next())
            .filter_map(|id| id.parse().ok())
            .collect())
    }

    /// Rows of the transformed concept delta whose id is not in the previous
    /// snapshot, grouped with their module.
    fn detect_new_concepts(concept_delta: &[u8], previous_ids: &HashSet<SctId>) -> Vec<NewConcept> {
        let content = String::from_utf8_lossy(concept_delta);
        let mut new_concepts = Vec::new();
        for line in content.lines().skip(1) {
            let mut columns = line.split('\t');
            let Some(id) = columns.next().and_then(|v| v.parse::<SctId>().ok()) else {
                continue;
            };
            let module_id = columns.nth(2).unwrap_or_default().to_string();
            if !previous_ids.contains(&id) {
                new_concepts.push(NewConcept {
                    sctid: id,
                    module_id,
                });
            }
        }
        new_concepts
    }

    /// Copies the transformed files into the output area and moves the build
    /// to its completion status.
    async fn package_and_complete(
        &self,
        build: &mut Build,
        paths: &BuildPaths,
        report: &BuildReport,
    ) -> Result<RunEnd, BuildError> {
        for key in self.store.list(&paths.transformed()).await? {
            let name = key.rsplit('/').next().unwrap_or(&key);
            self.store.copy(&key, &paths.output_file(name)).await?;
        }
        // With online validation enabled the build passes through
        // RvfRunning before completion. `just_package` builds never reach
        // Built and skip it.
        if build.configuration.online_validation && build.status == BuildStatus::Built {
            build.transition(BuildStatus::RvfRunning)?;
            tracing::info!(build = %build.unique_id(), "release validation started");
        }
        let target = if report.has_errors() {
            BuildStatus::ReleaseCompleteWithWarnings
        } else {
            BuildStatus::ReleaseComplete
        };
        build.transition(target)?;
        tracing::info!(build = %build.unique_id(), status = ?build.status, "build complete");
        Ok(RunEnd::Complete)
    }

    /// Cancellation: delete transformed outputs and move to `Cancelled`.
    async fn cancel(&self, build: &mut Build, paths: &BuildPaths) -> Result<RunEnd, BuildError> {
        tracing::info!(build = %build.unique_id(), "cancelling build");
        build.transition(BuildStatus::CancelRequested)?;
        for prefix in [paths.transformed(), paths.transformed_input()] {
            for key in self.store.list(&prefix).await? {
                self.store.delete(&key).await?;
            }
        }
        build.transition(BuildStatus::Cancelled)?;
        Ok(RunEnd::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use release_transform::idgen::OfflineDemoIdClient;
    use release_transform::IdServiceError;
    use release_types::rf2::{CTV3_ID_REFSET_ID, SNOMED_ID_REFSET_ID};
    use release_types::ComponentType;

    use super::*;
    use crate::store::MemoryFileStore;

    const CONCEPT_HEADER: &str = "id\teffectiveTime\tactive\tmoduleId\tdefinitionStatusId";
    const RELATIONSHIP_HEADER: &str = "id\teffectiveTime\tactive\tmoduleId\tsourceId\t\
                                       destinationId\trelationshipGroup\ttypeId\t\
                                       characteristicTypeId\tmodifierId";
    const SIMPLE_MAP_HEADER: &str =
        "id\teffectiveTime\tactive\tmoduleId\trefsetId\treferencedComponentId\tmapTarget";
    const CORE_MODULE: &str = "900000000000207008";
    const UUID_A: &str = "11111111-1111-4111-8111-111111111111";
    const UUID_B: &str = "22222222-2222-4222-8222-222222222222";

    /// Id client answering every SCTID request with one fixed value.
    struct FixedIdClient(SctId);

    #[async_trait::async_trait]
    impl IdAssignmentClient for FixedIdClient {
        async fn create_sctid(
            &self,
            _component_uuid: Uuid,
            _namespace_id: u32,
            _partition_id: &str,
            _release_id: &str,
            _execution_id: &str,
            _module_id: &str,
        ) -> Result<SctId, IdServiceError> {
            Ok(self.0)
        }

        async fn create_sctid_list(
            &self,
            component_uuids: &[Uuid],
            _namespace_id: u32,
            _partition_id: &str,
            _release_id: &str,
            _execution_id: &str,
            _module_id: &str,
        ) -> Result<HashMap<Uuid, SctId>, IdServiceError> {
            Ok(component_uuids.iter().map(|u| (*u, self.0)).collect())
        }

        async fn create_ctv3_id_list(
            &self,
            _component_uuids: &[Uuid],
        ) -> Result<HashMap<Uuid, String>, IdServiceError> {
            Err(IdServiceError::unsupported("createCTV3IDList"))
        }

        async fn create_snomed_id_list(
            &self,
            _sctid_with_parent: &[(SctId, Option<SctId>)],
        ) -> Result<HashMap<SctId, String>, IdServiceError> {
            Err(IdServiceError::unsupported("createSNOMEDIDList"))
        }
    }

    fn offline_build() -> Build {
        let mut config = BuildConfiguration::new("20240101");
        config.offline_mode = true;
        config.id_gen_retry_delay_ms = 1;
        Build::new("international", "snomed_release", "20240101120000", config)
    }

    async fn seed_manifest(store: &MemoryFileStore, build: &Build) {
        let paths = BuildPaths::new(build);
        store
            .put(
                &format!("{}manifest.xml", paths.manifest()),
                b"<listing/>".to_vec(),
            )
            .await
            .unwrap();
    }

    async fn seed_input(store: &MemoryFileStore, build: &Build, name: &str, content: String) {
        let paths = BuildPaths::new(build);
        store
            .put(&paths.input_file(name), content.into_bytes())
            .await
            .unwrap();
    }

    async fn transformed(store: &MemoryFileStore, build: &Build, name: &str) -> String {
        let paths = BuildPaths::new(build);
        String::from_utf8(store.get(&paths.transformed_file(name)).await.unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_concept_row_transforms_to_assigned_sctid() {
        let store = Arc::new(MemoryFileStore::new());
        let mut build = offline_build();
        seed_manifest(&store, &build).await;
        seed_input(
            &store,
            &build,
            "rel2_Concept_Delta_INT_20240101.txt",
            format!("{CONCEPT_HEADER}\n{UUID_A}\t\t1\t{CORE_MODULE}\t900000000000074008\n"),
        )
        .await;

        let service =
            TransformationService::new(store.clone(), Arc::new(FixedIdClient(123456789010)));
        let outcome = service
            .run_build(&mut build, &CancellationToken::new())
            .await;

        assert_eq!(outcome.status, BuildStatus::ReleaseComplete);
        assert!(outcome.report.is_empty(), "{:?}", outcome.report.entries());
        let content = transformed(&store, &build, "sct2_Concept_Delta_INT_20240101.txt").await;
        assert_eq!(
            content,
            format!(
                "{CONCEPT_HEADER}\r\n123456789010\t20240101\t1\t{CORE_MODULE}\t900000000000074008\r\n"
            )
        );
    }

    #[tokio::test]
    async fn test_offline_build_with_legacy_ids() {
        let store = Arc::new(MemoryFileStore::new());
        let mut build = offline_build();
        build.configuration.create_legacy_ids = true;
        seed_manifest(&store, &build).await;
        seed_input(
            &store,
            &build,
            "rel2_Concept_Delta_INT_20240101.txt",
            format!(
                "{CONCEPT_HEADER}\n\
                 {UUID_A}\t\t1\t{CORE_MODULE}\t900000000000074008\n\
                 {UUID_B}\t\t1\t{CORE_MODULE}\t900000000000074008\n"
            ),
        )
        .await;
        // Concept A is stated to be a child of concept B.
        seed_input(
            &store,
            &build,
            "rel2_StatedRelationship_Delta_INT_20240101.txt",
            format!(
                "{RELATIONSHIP_HEADER}\n\
                 \t\t1\t{CORE_MODULE}\t{UUID_A}\t{UUID_B}\t0\t116680003\t\
                 900000000000010007\t900000000000451002\n"
            ),
        )
        .await;
        seed_input(
            &store,
            &build,
            "rel2_sRefset_SimpleMapDelta_INT_20240101.txt",
            format!(
                "{SIMPLE_MAP_HEADER}\n\
                 \t\t1\t{CORE_MODULE}\t{CTV3_ID_REFSET_ID}\t73211009\tXUabc\n"
            ),
        )
        .await;

        let service =
            TransformationService::new(store.clone(), Arc::new(OfflineDemoIdClient::new()));
        let outcome = service
            .run_build(&mut build, &CancellationToken::new())
            .await;

        assert_eq!(outcome.status, BuildStatus::ReleaseComplete);
        assert!(!outcome.report.has_errors(), "{:?}", outcome.report.entries());

        // Both concepts got SCTIDs in the concept partition.
        let concepts = transformed(&store, &build, "sct2_Concept_Delta_INT_20240101.txt").await;
        assert!(concepts.contains("\n800001001\t20240101"));
        assert!(concepts.contains("\n800002001\t20240101"));

        // The stated relationship resolved both concept references.
        let stated =
            transformed(&store, &build, "sct2_StatedRelationship_Delta_INT_20240101.txt").await;
        assert!(stated.contains("\t800001001\t800002001\t0\t116680003\t"));

        // Legacy rows: one CTV3 and one SNOMED RT map row per new concept.
        let simple_map =
            transformed(&store, &build, "der2_sRefset_SimpleMapDelta_INT_20240101.txt").await;
        let lines: Vec<&str> = simple_map.lines().collect();
        assert_eq!(lines.len(), 6);
        let ctv3_rows = lines
            .iter()
            .skip(2)
            .filter(|l| l.contains(CTV3_ID_REFSET_ID))
            .count();
        let snomed_rows = lines
            .iter()
            .filter(|l| l.contains(SNOMED_ID_REFSET_ID))
            .count();
        assert_eq!(ctv3_rows, 2);
        assert_eq!(snomed_rows, 2);
        // The parent concept got the first SNOMED RT id.
        assert!(simple_map.contains("\t800002001\tR-F0001"));

        // Packaged outputs mirror the transformed area.
        let paths = BuildPaths::new(&build);
        let outputs = store.list(&paths.output()).await.unwrap();
        assert_eq!(outputs.len(), 3);
    }

    #[tokio::test]
    async fn test_unrecognized_file_copied_through() {
        let store = Arc::new(MemoryFileStore::new());
        let mut build = offline_build();
        seed_manifest(&store, &build).await;
        seed_input(&store, &build, "Readme.txt", "notes\n".to_string()).await;

        let service =
            TransformationService::new(store.clone(), Arc::new(OfflineDemoIdClient::new()));
        let outcome = service
            .run_build(&mut build, &CancellationToken::new())
            .await;

        assert_eq!(outcome.status, BuildStatus::ReleaseComplete);
        assert_eq!(transformed(&store, &build, "Readme.txt").await, "notes\n");
        assert_eq!(outcome.report.entries().len(), 1);
        assert!(!outcome.report.has_errors());
    }

    #[tokio::test]
    async fn test_missing_manifest_fails_pre_conditions() {
        let store = Arc::new(MemoryFileStore::new());
        let mut build = offline_build();

        let service =
            TransformationService::new(store.clone(), Arc::new(OfflineDemoIdClient::new()));
        let outcome = service
            .run_build(&mut build, &CancellationToken::new())
            .await;

        assert_eq!(outcome.status, BuildStatus::FailedPreConditions);
        assert!(outcome.report.has_errors());
    }

    #[tokio::test]
    async fn test_effective_time_mismatch_fails_pre_conditions() {
        let store = Arc::new(MemoryFileStore::new());
        let mut build = offline_build();
        seed_manifest(&store, &build).await;
        seed_input(
            &store,
            &build,
            "rel2_Concept_Delta_INT_20230101.txt",
            format!("{CONCEPT_HEADER}\n"),
        )
        .await;

        let service =
            TransformationService::new(store.clone(), Arc::new(OfflineDemoIdClient::new()));
        let outcome = service
            .run_build(&mut build, &CancellationToken::new())
            .await;

        assert_eq!(outcome.status, BuildStatus::FailedPreConditions);
    }

    #[tokio::test]
    async fn test_input_prepare_report_errors_fail_validation() {
        let store = Arc::new(MemoryFileStore::new());
        let mut build = offline_build();
        seed_manifest(&store, &build).await;
        let paths = BuildPaths::new(&build);
        store
            .put(
                &paths.input_prepare_report(),
                br#"{"errors": ["source file missing"], "warnings": []}"#.to_vec(),
            )
            .await
            .unwrap();

        let service =
            TransformationService::new(store.clone(), Arc::new(OfflineDemoIdClient::new()));
        let outcome = service
            .run_build(&mut build, &CancellationToken::new())
            .await;

        assert_eq!(outcome.status, BuildStatus::FailedInputPrepareReportValidation);
    }

    #[tokio::test]
    async fn test_cancellation_deletes_outputs() {
        let store = Arc::new(MemoryFileStore::new());
        let mut build = offline_build();
        seed_manifest(&store, &build).await;
        seed_input(
            &store,
            &build,
            "rel2_Concept_Delta_INT_20240101.txt",
            format!("{CONCEPT_HEADER}\n{UUID_A}\t\t1\t{CORE_MODULE}\t900000000000074008\n"),
        )
        .await;

        let token = CancellationToken::new();
        token.cancel();
        let service =
            TransformationService::new(store.clone(), Arc::new(OfflineDemoIdClient::new()));
        let outcome = service.run_build(&mut build, &token).await;

        assert_eq!(outcome.status, BuildStatus::Cancelled);
        let paths = BuildPaths::new(&build);
        assert!(store.list(&paths.transformed()).await.unwrap().is_empty());
        assert!(store
            .list(&paths.transformed_input())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_just_package_skips_transformation() {
        let store = Arc::new(MemoryFileStore::new());
        let mut build = offline_build();
        build.configuration.just_package = true;
        seed_manifest(&store, &build).await;
        seed_input(
            &store,
            &build,
            "rel2_Concept_Delta_INT_20240101.txt",
            format!("{CONCEPT_HEADER}\n{UUID_A}\t\t1\t{CORE_MODULE}\t900000000000074008\n"),
        )
        .await;

        let service =
            TransformationService::new(store.clone(), Arc::new(OfflineDemoIdClient::new()));
        let outcome = service
            .run_build(&mut build, &CancellationToken::new())
            .await;

        assert_eq!(outcome.status, BuildStatus::ReleaseComplete);
        // The input is packaged as-is, UUID and blank effective time intact.
        let content = transformed(&store, &build, "rel2_Concept_Delta_INT_20240101.txt").await;
        assert!(content.contains(UUID_A));
    }

    #[tokio::test]
    async fn test_failed_file_is_excluded_from_package() {
        let store = Arc::new(MemoryFileStore::new());
        let mut build = offline_build();
        seed_manifest(&store, &build).await;
        // A zero-byte file fails transformation outside the per-line path.
        seed_input(
            &store,
            &build,
            "rel2_sRefset_SimpleMapDelta_INT_20240101.txt",
            String::new(),
        )
        .await;

        let service =
            TransformationService::new(store.clone(), Arc::new(OfflineDemoIdClient::new()));
        let outcome = service
            .run_build(&mut build, &CancellationToken::new())
            .await;

        assert_eq!(outcome.status, BuildStatus::ReleaseCompleteWithWarnings);
        assert!(outcome.report.has_errors());
        // The failed file never reaches the transformed area or the release
        // package.
        let paths = BuildPaths::new(&build);
        assert!(store.list(&paths.transformed()).await.unwrap().is_empty());
        assert!(store.list(&paths.output()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_concept_file_does_not_fail_build() {
        let store = Arc::new(MemoryFileStore::new());
        let mut build = offline_build();
        seed_manifest(&store, &build).await;
        seed_input(
            &store,
            &build,
            "rel2_Concept_Delta_INT_20240101.txt",
            String::new(),
        )
        .await;

        let service =
            TransformationService::new(store.clone(), Arc::new(OfflineDemoIdClient::new()));
        let outcome = service
            .run_build(&mut build, &CancellationToken::new())
            .await;

        // The pre-assignment failure is a per-file report entry, not a
        // build failure.
        assert_eq!(outcome.status, BuildStatus::ReleaseCompleteWithWarnings);
        assert!(outcome.report.has_errors());
        let paths = BuildPaths::new(&build);
        assert!(store.list(&paths.output()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_online_validation_passes_through_rvf() {
        let store = Arc::new(MemoryFileStore::new());
        let mut build = offline_build();
        build.configuration.online_validation = true;
        seed_manifest(&store, &build).await;
        seed_input(
            &store,
            &build,
            "rel2_Concept_Delta_INT_20240101.txt",
            format!("{CONCEPT_HEADER}\n{UUID_A}\t\t1\t{CORE_MODULE}\t900000000000074008\n"),
        )
        .await;

        let service =
            TransformationService::new(store.clone(), Arc::new(OfflineDemoIdClient::new()));
        let outcome = service
            .run_build(&mut build, &CancellationToken::new())
            .await;

        // Built -> RvfRunning -> ReleaseComplete is the only legal route
        // here, so completion proves the validation status was entered.
        assert_eq!(outcome.status, BuildStatus::ReleaseComplete);
        assert!(outcome.report.is_empty(), "{:?}", outcome.report.entries());
    }

    #[tokio::test]
    async fn test_previous_package_limits_legacy_ids() {
        let store = Arc::new(MemoryFileStore::new());
        let mut build = offline_build();
        build.configuration.create_legacy_ids = true;
        build.configuration.previous_published_package =
            Some("snomed_release_20230101120000".to_string());
        seed_manifest(&store, &build).await;
        // The previous release's concept snapshot, in the published package
        // layout the publish step writes.
        store
            .put(
                "published/international/snomed_release_20230101120000/sct2_Concept_Snapshot_INT_20230101.txt",
                format!(
                    "{CONCEPT_HEADER}\r\n73211009\t20230101\t1\t{CORE_MODULE}\t900000000000074008\r\n"
                )
                .into_bytes(),
            )
            .await
            .unwrap();
        seed_input(
            &store,
            &build,
            "rel2_Concept_Delta_INT_20240101.txt",
            format!(
                "{CONCEPT_HEADER}\n\
                 73211009\t20240101\t1\t{CORE_MODULE}\t900000000000074008\n\
                 {UUID_A}\t\t1\t{CORE_MODULE}\t900000000000074008\n"
            ),
        )
        .await;
        seed_input(
            &store,
            &build,
            "rel2_sRefset_SimpleMapDelta_INT_20240101.txt",
            format!("{SIMPLE_MAP_HEADER}\n"),
        )
        .await;

        let service =
            TransformationService::new(store.clone(), Arc::new(OfflineDemoIdClient::new()));
        let outcome = service
            .run_build(&mut build, &CancellationToken::new())
            .await;

        assert_eq!(outcome.status, BuildStatus::ReleaseComplete);
        assert!(!outcome.report.has_errors(), "{:?}", outcome.report.entries());

        // Only the genuinely new concept gets legacy map rows; the concept
        // already in the previous snapshot gets none.
        let simple_map =
            transformed(&store, &build, "der2_sRefset_SimpleMapDelta_INT_20240101.txt").await;
        let lines: Vec<&str> = simple_map.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(simple_map.contains("\t800001001\tXUsWA"));
        assert!(simple_map.contains("\t800001001\tR-F0001"));
        assert!(!simple_map.contains("\t73211009\t"));
    }

    #[test]
    fn test_new_concept_detection() {
        let delta = format!(
            "{CONCEPT_HEADER}\r\n\
             800001001\t20240101\t1\t{CORE_MODULE}\t900000000000074008\r\n\
             73211009\t20240101\t1\t{CORE_MODULE}\t900000000000074008\r\n"
        );
        let previous: HashSet<SctId> = [73211009].into();
        let new_concepts =
            TransformationService::detect_new_concepts(delta.as_bytes(), &previous);
        assert_eq!(
            new_concepts,
            vec![NewConcept {
                sctid: 800001001,
                module_id: CORE_MODULE.to_string(),
            }]
        );
    }

    #[test]
    fn test_failure_status_mapping() {
        assert_eq!(
            BuildError::MissingManifest.failure_status(),
            BuildStatus::FailedPreConditions
        );
        assert_eq!(
            BuildError::InputPrepareReportErrors { count: 2 }.failure_status(),
            BuildStatus::FailedInputPrepareReportValidation
        );
        let store_error = BuildError::Store(StoreError::NotFound {
            key: "x".to_string(),
        });
        assert_eq!(store_error.failure_status(), BuildStatus::Failed);
    }

    #[test]
    fn test_pre_process_only_for_concepts_and_descriptions() {
        // Guard over which component types take part in pass 1.
        for (component, expected) in [
            (ComponentType::Concept, true),
            (ComponentType::Description, true),
            (ComponentType::TextDefinition, false),
            (ComponentType::Relationship, false),
            (ComponentType::Refset, false),
        ] {
            let factory = test_factory();
            assert_eq!(
                factory.pre_process_transformation(component).is_some(),
                expected,
                "{component:?}"
            );
        }
    }

    fn test_factory() -> TransformationFactory {
        let sctid_factory = Arc::new(CachedSctidFactory::new(
            0,
            "20240101",
            "build-1",
            Arc::new(OfflineDemoIdClient::new()),
            3,
            Duration::from_millis(1),
        ));
        TransformationFactory::new(
            "20240101",
            0,
            sctid_factory,
            uuid_generator_for(true),
            100,
        )
    }
}
