//! Build entity, configuration and lifecycle state machine.
//!
//! A [`Build`] is one run of the release pipeline for a product and effective
//! time. Its identity derives from the owning product and the creation
//! timestamp, so two builds created for the same product in the same instant
//! collapse to the same unique id and the second creation must be rejected by
//! the caller. Status changes go through [`Build::transition`] which enforces
//! the guarded lifecycle transitions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rf2::{INTERNATIONAL_CORE_MODULE_ID, INTERNATIONAL_NAMESPACE_ID};

/// Lifecycle status of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildStatus {
    /// Created but not yet queued or triggered.
    BeforeTrigger,
    /// Waiting for a worker to pick the build up.
    Queued,
    /// The transformation pipeline is running.
    Building,
    /// All files processed and outputs written.
    Built,
    /// External release validation in progress.
    RvfRunning,
    /// Release finished cleanly.
    ReleaseComplete,
    /// Release finished with warnings recorded in the report.
    ReleaseCompleteWithWarnings,
    /// A pre-condition check failed before processing started.
    FailedPreConditions,
    /// A post-condition check failed after processing.
    FailedPostConditions,
    /// The input-prepare report contained errors.
    FailedInputPrepareReportValidation,
    /// The build failed with an unexpected pipeline error.
    Failed,
    /// Cancellation has been requested; in-flight work may still finish.
    CancelRequested,
    /// The build was cancelled and its outputs removed.
    Cancelled,
}

impl BuildStatus {
    /// Returns true for statuses that represent a failure.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            BuildStatus::FailedPreConditions
                | BuildStatus::FailedPostConditions
                | BuildStatus::FailedInputPrepareReportValidation
                | BuildStatus::Failed
        )
    }

    /// Returns true for statuses from which no further transition is legal.
    pub fn is_terminal(&self) -> bool {
        self.is_failure()
            || matches!(
                self,
                BuildStatus::ReleaseComplete
                    | BuildStatus::ReleaseCompleteWithWarnings
                    | BuildStatus::Cancelled
            )
    }

    /// Returns true if moving from `self` to `to` is a legal transition.
    ///
    /// Any non-terminal status may record a failure or a cancellation
    /// request; the forward path is `BeforeTrigger -> Queued -> Building ->
    /// Built -> RvfRunning -> ReleaseComplete[_WithWarnings]`, where
    /// `RvfRunning` only appears when online validation is enabled and the
    /// completion statuses are also reachable directly from `Building` and
    /// `Built`.
    pub fn can_transition_to(&self, to: BuildStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if to.is_failure() {
            return true;
        }
        if to == BuildStatus::CancelRequested {
            return *self != BuildStatus::CancelRequested;
        }
        match (self, to) {
            (BuildStatus::BeforeTrigger, BuildStatus::Queued)
            | (BuildStatus::BeforeTrigger, BuildStatus::Building)
            | (BuildStatus::Queued, BuildStatus::Building)
            | (BuildStatus::Building, BuildStatus::Built)
            | (BuildStatus::Building, BuildStatus::ReleaseComplete)
            | (BuildStatus::Building, BuildStatus::ReleaseCompleteWithWarnings)
            | (BuildStatus::Built, BuildStatus::RvfRunning)
            | (BuildStatus::Built, BuildStatus::ReleaseComplete)
            | (BuildStatus::Built, BuildStatus::ReleaseCompleteWithWarnings)
            | (BuildStatus::RvfRunning, BuildStatus::ReleaseComplete)
            | (BuildStatus::RvfRunning, BuildStatus::ReleaseCompleteWithWarnings)
            | (BuildStatus::CancelRequested, BuildStatus::Cancelled) => true,
            _ => false,
        }
    }
}

/// Error raised when an illegal status transition is attempted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("illegal build status transition from {from:?} to {to:?}")]
pub struct StatusTransitionError {
    /// The status the build was in.
    pub from: BuildStatus,
    /// The status that was requested.
    pub to: BuildStatus,
}

/// Extension release configuration.
///
/// Absent for International edition builds; present for extension builds,
/// where it supplies the namespace and module scoping used when requesting
/// new identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionConfig {
    /// The extension's namespace identifier.
    pub namespace_id: u32,
    /// The default module for newly assigned identifiers, if configured.
    pub default_module_id: Option<String>,
    /// All modules included in the extension release.
    pub module_ids: Vec<String>,
}

/// Effective configuration of one build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfiguration {
    /// Release effective time in `yyyymmdd` format.
    pub effective_time: String,
    /// Extension scoping, absent for International builds.
    pub extension_config: Option<ExtensionConfig>,
    /// Whether output file names carry the beta prefix.
    pub beta_release: bool,
    /// Whether this is the product's first release (no previous package).
    pub first_time_release: bool,
    /// Name of the previously published package, for delta comparison.
    pub previous_published_package: Option<String>,
    /// Whether legacy CTV3/SNOMED RT identifiers are generated.
    pub create_legacy_ids: bool,
    /// Offline mode: deterministic UUIDs and the demo identifier service.
    pub offline_mode: bool,
    /// Skip transformation entirely and package the input files as-is.
    pub just_package: bool,
    /// Whether the external release validation step runs after the build.
    pub online_validation: bool,
    /// Maximum number of files transformed concurrently.
    pub parallelism: usize,
    /// Maximum attempts for one remote identifier call.
    pub id_gen_max_tries: u32,
    /// Fixed delay between identifier call attempts, in milliseconds.
    pub id_gen_retry_delay_ms: u64,
    /// Number of rows grouped into one batched identifier request.
    pub transform_buffer_size: usize,
}

impl BuildConfiguration {
    /// Creates a configuration with defaults for the given effective time.
    pub fn new(effective_time: impl Into<String>) -> Self {
        BuildConfiguration {
            effective_time: effective_time.into(),
            extension_config: None,
            beta_release: false,
            first_time_release: true,
            previous_published_package: None,
            create_legacy_ids: false,
            offline_mode: false,
            just_package: false,
            online_validation: false,
            parallelism: 4,
            id_gen_max_tries: 3,
            id_gen_retry_delay_ms: 30_000,
            transform_buffer_size: 100,
        }
    }

    /// The namespace identifier in effect for this build.
    pub fn namespace_id(&self) -> u32 {
        self.extension_config
            .as_ref()
            .map(|ext| ext.namespace_id)
            .unwrap_or(INTERNATIONAL_NAMESPACE_ID)
    }

    /// The default module identifier for newly assigned identifiers.
    ///
    /// Falls back to the first configured extension module, then to the
    /// International core module.
    pub fn default_module_id(&self) -> &str {
        if let Some(ext) = &self.extension_config {
            if let Some(module) = &ext.default_module_id {
                return module;
            }
            if let Some(first) = ext.module_ids.first() {
                return first;
            }
        }
        INTERNATIONAL_CORE_MODULE_ID
    }
}

/// One run of the release pipeline for a product and effective time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Build {
    /// Key of the owning release center.
    pub release_center_key: String,
    /// Key of the owning product.
    pub product_key: String,
    /// Creation timestamp, `yyyymmddhhmmss`.
    pub creation_time: String,
    /// Current lifecycle status.
    pub status: BuildStatus,
    /// Effective configuration, frozen at trigger time.
    pub configuration: BuildConfiguration,
}

impl Build {
    /// Creates a build in the `BeforeTrigger` status.
    pub fn new(
        release_center_key: impl Into<String>,
        product_key: impl Into<String>,
        creation_time: impl Into<String>,
        configuration: BuildConfiguration,
    ) -> Self {
        Build {
            release_center_key: release_center_key.into(),
            product_key: product_key.into(),
            creation_time: creation_time.into(),
            status: BuildStatus::BeforeTrigger,
            configuration,
        }
    }

    /// The build's unique identity, derived from product and creation time.
    ///
    /// Two creations for the same product in the same instant produce the
    /// same id; callers persisting builds must reject the duplicate.
    pub fn unique_id(&self) -> String {
        format!("{}_{}", self.product_key, self.creation_time)
    }

    /// Moves the build to `to` if the transition is legal.
    pub fn transition(&mut self, to: BuildStatus) -> Result<(), StatusTransitionError> {
        if !self.status.can_transition_to(to) {
            return Err(StatusTransitionError {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}
