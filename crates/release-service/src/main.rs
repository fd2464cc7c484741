//! Release builder binary.
//!
//! Runs one offline demo build end-to-end against a local file store: the
//! deterministic UUID generator, the offline identifier service and the full
//! pre-check / transform / legacy / publish pipeline.

use std::sync::Arc;

use release_service::{LocalFileStore, PublishService, TransformationService};
use release_transform::idgen::OfflineDemoIdClient;
use release_types::{Build, BuildConfiguration};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_STORE_PATH: &str = "./release-store";
const DEFAULT_RELEASE_CENTER: &str = "international";
const DEFAULT_PRODUCT: &str = "snomed_release";
const DEFAULT_EFFECTIVE_TIME: &str = "20240101";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let store_path =
        std::env::var("RELEASE_STORE_PATH").unwrap_or_else(|_| DEFAULT_STORE_PATH.to_string());
    let release_center =
        std::env::var("RELEASE_CENTER").unwrap_or_else(|_| DEFAULT_RELEASE_CENTER.to_string());
    let product = std::env::var("RELEASE_PRODUCT").unwrap_or_else(|_| DEFAULT_PRODUCT.to_string());
    let effective_time = std::env::var("RELEASE_EFFECTIVE_TIME")
        .unwrap_or_else(|_| DEFAULT_EFFECTIVE_TIME.to_string());

    tracing::info!("Using release store at: {}", store_path);

    let store = Arc::new(LocalFileStore::new(store_path));
    let id_client = Arc::new(OfflineDemoIdClient::new());
    let service = TransformationService::new(store.clone(), id_client);

    let mut configuration = BuildConfiguration::new(&effective_time);
    configuration.offline_mode = true;
    configuration.create_legacy_ids = true;
    let creation_time = chrono_free_timestamp();
    let mut build = Build::new(&release_center, &product, creation_time, configuration);

    tracing::info!("Starting build {}", build.unique_id());
    let outcome = service.run_build(&mut build, &CancellationToken::new()).await;

    for entry in outcome.report.entries() {
        tracing::warn!(
            "[{:?}] {} {}: {}",
            entry.severity,
            entry.phase,
            entry.file_name,
            entry.message
        );
    }
    tracing::info!("Build finished with status {:?}", outcome.status);

    if outcome.status.is_failure() {
        return Err(format!("build failed with status {:?}", outcome.status).into());
    }

    let publisher = PublishService::new(store);
    publisher.publish(&build).await?;
    tracing::info!("Build {} published", build.unique_id());

    Ok(())
}

/// Creation timestamp unique per run, from the Unix clock.
fn chrono_free_timestamp() -> String {
    let seconds = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    seconds.to_string()
}
