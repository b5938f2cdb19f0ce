//! Shared helpers for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use ecs_inventory::cloud::model::{
    FlavorRef, NetworkInterface, PageToken, SecurityGroupRef, ServerPage, ServerRecord, VolumeRef,
};
use ecs_inventory::cloud::ComputeApi;
use ecs_inventory::config::{Config, Overrides, Settings};
use ecs_inventory::error::ApiError;
use serde_json::json;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

pub const PROJECT: &str = "proj1";
pub const REGION: &str = "cn-north-4";

/// Settings pointed at a mock endpoint, writing into `output_dir`
pub fn test_settings(endpoint: Option<&str>, output_dir: &Path, page_size: usize) -> Settings {
    let file = Config {
        base_delay_ms: Some(1),
        output_dir: Some(output_dir.to_path_buf()),
        ..Default::default()
    };
    let overrides = Overrides {
        endpoint: endpoint.map(str::to_string),
        page_size: Some(page_size),
        ..Default::default()
    };

    Settings::resolve(&file, &overrides, |name| match name {
        "HUAWEI_ACCESS_KEY" => Some("AKTEST".to_string()),
        "HUAWEI_SECRET_KEY" => Some("sktest".to_string()),
        "HUAWEI_PROJECT_ID" => Some(PROJECT.to_string()),
        "HUAWEI_REGION" => Some(REGION.to_string()),
        _ => None,
    })
    .expect("test settings should be valid")
}

pub fn server_record(index: usize) -> ServerRecord {
    let raw = json!({
        "id": format!("srv-{}", index),
        "name": format!("vm-{}", index),
        "status": "ACTIVE",
        "created": "2024-01-01T00:00:00Z",
        "flavor": {"id": "s6.large.2"}
    });
    ServerRecord::from_api(&raw, PROJECT, REGION).expect("valid server json")
}

/// Listing-only API over `count` servers with optional transient failures
/// on the first attempts of a page
pub struct PagedServers {
    servers: Vec<ServerRecord>,
    transient_failures: Mutex<HashMap<usize, u32>>,
}

impl PagedServers {
    pub fn new(count: usize) -> Self {
        Self {
            servers: (1..=count).map(server_record).collect(),
            transient_failures: Mutex::new(HashMap::new()),
        }
    }

    /// Fail the page starting at `start` `times` times before serving it
    pub fn flaky_page(self, start: usize, times: u32) -> Self {
        self.transient_failures.lock().unwrap().insert(start, times);
        self
    }
}

#[async_trait]
impl ComputeApi for PagedServers {
    async fn list_servers(
        &self,
        page: Option<&PageToken>,
        limit: usize,
    ) -> Result<ServerPage, ApiError> {
        let start: usize = page.map(|t| t.0.parse().unwrap()).unwrap_or(0);

        if let Some(remaining) = self.transient_failures.lock().unwrap().get_mut(&start) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ApiError::transient("list_servers", "503 Service Unavailable"));
            }
        }

        let end = (start + limit).min(self.servers.len());
        Ok(ServerPage {
            servers: self.servers[start.min(end)..end].to_vec(),
            next: (end < self.servers.len()).then(|| PageToken(end.to_string())),
        })
    }

    async fn get_flavor(&self, flavor_id: &str) -> Result<FlavorRef, ApiError> {
        Ok(FlavorRef {
            id: flavor_id.to_string(),
            name: flavor_id.to_string(),
            vcpus: 2,
            ram_mb: 4096,
            disk_gb: 0,
        })
    }

    async fn list_ports(&self, _server_id: &str) -> Result<Vec<NetworkInterface>, ApiError> {
        Ok(Vec::new())
    }

    async fn get_security_group(&self, group_id: &str) -> Result<SecurityGroupRef, ApiError> {
        Err(ApiError::NotFound {
            kind: "security group",
            id: group_id.to_string(),
        })
    }

    async fn get_volume(&self, volume_id: &str) -> Result<VolumeRef, ApiError> {
        Err(ApiError::NotFound {
            kind: "volume",
            id: volume_id.to_string(),
        })
    }
}
