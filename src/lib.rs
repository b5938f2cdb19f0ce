//! Huawei Cloud ECS inventory reporter
//!
//! Lists every ECS instance in a project, resolves each server's flavor,
//! ports, security groups and volumes, and writes the result as a single
//! snapshot document.

pub mod cloud;
pub mod config;
pub mod error;
pub mod inventory;

use chrono::{DateTime, SubsecRound, Utc};
use cloud::client::HuaweiCloudClient;
use cloud::ComputeApi;
use config::Settings;
use error::RunError;
use inventory::{Aggregator, InventorySnapshot, RunStats, SnapshotMetadata};
use std::path::PathBuf;
use std::sync::Arc;

/// Outcome of a successful run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub path: PathBuf,
    pub stats: RunStats,
}

/// Collect the inventory against the live API and write the snapshot
pub async fn run(settings: &Settings) -> Result<RunReport, RunError> {
    let client = HuaweiCloudClient::new(settings).map_err(RunError::Client)?;
    run_with(Arc::new(client), settings, Utc::now().trunc_subsecs(0)).await
}

/// Collect the inventory through `api` and write the snapshot stamped with
/// `generated_at`. No file is written if the server listing fails.
pub async fn run_with(
    api: Arc<dyn ComputeApi>,
    settings: &Settings,
    generated_at: DateTime<Utc>,
) -> Result<RunReport, RunError> {
    tracing::info!(
        "Collecting ECS inventory for project {} in {}",
        settings.project_id,
        settings.region
    );

    let inventory = Aggregator::new(api, settings.page_size, settings.concurrency, settings.retry)
        .collect()
        .await
        .map_err(RunError::Listing)?;

    let snapshot = InventorySnapshot::new(
        SnapshotMetadata {
            account: settings.account.clone(),
            project_id: settings.project_id.clone(),
            region: settings.region.clone(),
            generated_at,
        },
        inventory,
    );

    let path = snapshot
        .write(&settings.output_dir, settings.format)
        .await?;
    Ok(RunReport {
        path,
        stats: snapshot.stats,
    })
}
