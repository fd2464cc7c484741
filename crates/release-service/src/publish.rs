//! Publish guard: a build's release files move to the published area at most
//! once.

use std::sync::Arc;

use dashmap::DashMap;
use release_types::Build;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::paths::BuildPaths;
use crate::store::{FileStore, StoreError};

/// Error raised by a publish attempt.
#[derive(Error, Debug)]
pub enum PublishError {
    /// The build has already been published.
    #[error("build {build_id} is already published")]
    AlreadyPublished {
        /// The build's unique id.
        build_id: String,
    },
    /// The build has no release files to publish.
    #[error("no release files found for build {build_id}")]
    ReleaseFilesNotFound {
        /// The build's unique id.
        build_id: String,
    },
    /// A store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Copies a build's output files into its package under the release
/// center's published area, where later builds look them up as their
/// previous release.
///
/// Publication is guarded per build id: concurrent callers for the same
/// build serialize on an async mutex, and the published marker is checked
/// inside the lock, so exactly one caller wins and every other caller —
/// concurrent or later — fails with [`PublishError::AlreadyPublished`]. The
/// guard is process-local; the marker in the store is what outlives the
/// process.
pub struct PublishService {
    store: Arc<dyn FileStore>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl PublishService {
    /// Creates the service over a store.
    pub fn new(store: Arc<dyn FileStore>) -> Self {
        PublishService {
            store,
            locks: DashMap::new(),
        }
    }

    /// Publishes the build's output files.
    pub async fn publish(&self, build: &Build) -> Result<(), PublishError> {
        let build_id = build.unique_id();
        let lock = self
            .locks
            .entry(build_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let paths = BuildPaths::new(build);
        let marker = self.marker_key(&paths, &build_id);
        if self.store.exists(&marker).await? {
            return Err(PublishError::AlreadyPublished { build_id });
        }

        let outputs = self.store.list(&paths.output()).await?;
        if outputs.is_empty() {
            return Err(PublishError::ReleaseFilesNotFound { build_id });
        }
        for key in &outputs {
            let name = key.rsplit('/').next().unwrap_or(key);
            self.store
                .copy(key, &paths.published_file(name))
                .await?;
        }
        self.store.put(&marker, Vec::new()).await?;
        tracing::info!(build = %build_id, files = outputs.len(), "build published");
        Ok(())
    }

    fn marker_key(&self, paths: &BuildPaths, build_id: &str) -> String {
        paths.published_file(&format!("{build_id}.published"))
    }
}
