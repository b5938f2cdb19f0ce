//! Snapshot output
//!
//! The snapshot is built fully in memory and written once. Field order is
//! fixed by the struct layout and every map is ordered, so the same
//! inventory always encodes to the same bytes.

use super::aggregate::{Inventory, RunStats};
use crate::cloud::model::ServerRecord;
use crate::error::RunError;
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

const FILE_PREFIX: &str = "ecs_summary";
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Yaml => "yaml",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    pub account: String,
    pub project_id: String,
    pub region: String,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InventorySnapshot {
    pub metadata: SnapshotMetadata,
    pub servers: Vec<ServerRecord>,
    pub stats: RunStats,
}

impl InventorySnapshot {
    pub fn new(metadata: SnapshotMetadata, inventory: Inventory) -> Self {
        Self {
            metadata,
            servers: inventory.servers,
            stats: inventory.stats,
        }
    }

    /// `ecs_summary_{account}_{project}_{region}_{timestamp}.{ext}`
    pub fn file_name(&self, format: OutputFormat) -> String {
        format!(
            "{}_{}_{}_{}_{}.{}",
            FILE_PREFIX,
            file_component(&self.metadata.account),
            file_component(&self.metadata.project_id),
            file_component(&self.metadata.region),
            self.metadata.generated_at.format(TIMESTAMP_FORMAT),
            format.extension()
        )
    }

    pub fn encode(&self, format: OutputFormat) -> Result<Vec<u8>, RunError> {
        match format {
            OutputFormat::Json => {
                let mut bytes = serde_json::to_vec_pretty(self)
                    .map_err(|e| RunError::Encode(e.to_string()))?;
                bytes.push(b'\n');
                Ok(bytes)
            }
            OutputFormat::Yaml => serde_yaml::to_string(self)
                .map(String::into_bytes)
                .map_err(|e| RunError::Encode(e.to_string())),
        }
    }

    /// Write the snapshot into `dir` and return its path.
    ///
    /// The bytes go to a hidden temp file that is renamed into place, so the
    /// final name never holds a partial document.
    pub async fn write(&self, dir: &Path, format: OutputFormat) -> Result<PathBuf, RunError> {
        let name = self.file_name(format);
        let path = dir.join(&name);
        let tmp = dir.join(format!(".{}.tmp", name));
        let bytes = self.encode(format)?;

        if let Err(source) = write_atomic(dir, &tmp, &path, &bytes).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(RunError::Write { path, source });
        }

        tracing::info!("Snapshot written to {}", path.display());
        Ok(path)
    }
}

async fn write_atomic(dir: &Path, tmp: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    fs::create_dir_all(dir).await?;

    let mut file = fs::File::create(tmp).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(tmp, path).await
}

/// Keep file name parts to a portable character set
fn file_component(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '-'
            }
        })
        .collect();

    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}
