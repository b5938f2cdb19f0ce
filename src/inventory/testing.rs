//! In-memory [`ComputeApi`] for unit tests

use crate::cloud::model::{
    FlavorRef, NetworkInterface, PageToken, SecurityGroupRef, ServerPage, ServerRecord, VolumeRef,
};
use crate::cloud::ComputeApi;
use crate::error::ApiError;
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;

/// Injected failure for one call key (`"get_flavor:f-1"`, `"list_servers:0"`)
struct Failure {
    /// `None` fails forever
    remaining: Option<u32>,
    error: ApiError,
}

#[derive(Default)]
pub struct FakeCompute {
    pub servers: Vec<ServerRecord>,
    pub flavors: HashMap<String, FlavorRef>,
    pub ports: HashMap<String, Vec<NetworkInterface>>,
    pub groups: HashMap<String, SecurityGroupRef>,
    pub volumes: HashMap<String, VolumeRef>,
    /// Hand out a next-page token even after the last page
    pub dangling_token: bool,
    failures: Mutex<HashMap<String, Failure>>,
    calls: Mutex<Vec<String>>,
}

impl FakeCompute {
    /// `count` servers `srv-1..=srv-count`, each with its own flavor, one
    /// port, one security group and one volume
    pub fn with_servers(count: usize) -> Self {
        let mut fake = Self::default();
        for i in 1..=count {
            let id = format!("srv-{}", i);
            fake.servers.push(server(&id, &format!("flv-{}", i), &[&format!("sg-{}", i)], &[&format!("vol-{}", i)]));
            fake.flavors.insert(format!("flv-{}", i), flavor(&format!("flv-{}", i)));
            fake.ports.insert(id.clone(), vec![port(&format!("port-{}", i))]);
            fake.groups.insert(format!("sg-{}", i), group(&format!("sg-{}", i)));
            fake.volumes.insert(format!("vol-{}", i), volume(&format!("vol-{}", i)));
        }
        fake
    }

    /// Fail the first `times` calls for `key`
    pub fn fail_times(&self, key: &str, times: u32, error: ApiError) {
        self.failures.lock().unwrap().insert(
            key.to_string(),
            Failure {
                remaining: Some(times),
                error,
            },
        );
    }

    /// Fail every call for `key`
    pub fn fail_always(&self, key: &str, error: ApiError) {
        self.failures.lock().unwrap().insert(
            key.to_string(),
            Failure {
                remaining: None,
                error,
            },
        );
    }

    pub fn calls(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn check(&self, key: String) -> Result<(), ApiError> {
        self.calls.lock().unwrap().push(key.clone());

        let mut failures = self.failures.lock().unwrap();
        let Some(failure) = failures.get_mut(&key) else {
            return Ok(());
        };
        match failure.remaining.as_mut() {
            None => Err(failure.error.clone()),
            Some(0) => Ok(()),
            Some(n) => {
                *n -= 1;
                Err(failure.error.clone())
            }
        }
    }
}

#[async_trait]
impl ComputeApi for FakeCompute {
    async fn list_servers(
        &self,
        page: Option<&PageToken>,
        limit: usize,
    ) -> Result<ServerPage, ApiError> {
        let start: usize = page.map(|t| t.0.parse().unwrap()).unwrap_or(0);
        self.check(format!("list_servers:{}", start))?;

        let end = (start + limit).min(self.servers.len());
        let servers = self.servers[start.min(end)..end].to_vec();
        let next = (end < self.servers.len() || self.dangling_token)
            .then(|| PageToken(end.to_string()));
        Ok(ServerPage { servers, next })
    }

    async fn get_flavor(&self, flavor_id: &str) -> Result<FlavorRef, ApiError> {
        self.check(format!("get_flavor:{}", flavor_id))?;
        self.flavors.get(flavor_id).cloned().ok_or(ApiError::NotFound {
            kind: "flavor",
            id: flavor_id.to_string(),
        })
    }

    async fn list_ports(&self, server_id: &str) -> Result<Vec<NetworkInterface>, ApiError> {
        self.check(format!("list_ports:{}", server_id))?;
        Ok(self.ports.get(server_id).cloned().unwrap_or_default())
    }

    async fn get_security_group(&self, group_id: &str) -> Result<SecurityGroupRef, ApiError> {
        self.check(format!("get_security_group:{}", group_id))?;
        self.groups.get(group_id).cloned().ok_or(ApiError::NotFound {
            kind: "security group",
            id: group_id.to_string(),
        })
    }

    async fn get_volume(&self, volume_id: &str) -> Result<VolumeRef, ApiError> {
        self.check(format!("get_volume:{}", volume_id))?;
        self.volumes.get(volume_id).cloned().ok_or(ApiError::NotFound {
            kind: "volume",
            id: volume_id.to_string(),
        })
    }
}

pub fn server(id: &str, flavor_id: &str, groups: &[&str], volumes: &[&str]) -> ServerRecord {
    let raw = json!({
        "id": id,
        "name": format!("{}-name", id),
        "status": "ACTIVE",
        "created": "2024-01-01T00:00:00Z",
        "flavor": {"id": flavor_id},
        "security_groups": groups.iter().map(|g| json!({"id": g, "name": g})).collect::<Vec<_>>(),
        "os-extended-volumes:volumes_attached": volumes.iter().map(|v| json!({"id": v, "device": "/dev/vda"})).collect::<Vec<_>>(),
        "addresses": {
            "net-1": [
                {"addr": "121.36.0.1", "OS-EXT-IPS:type": "floating", "OS-EXT-IPS-MAC:mac_addr": format!("mac-{}", id)}
            ]
        }
    });
    ServerRecord::from_api(&raw, "proj", "cn-north-4").unwrap()
}

pub fn flavor(id: &str) -> FlavorRef {
    FlavorRef {
        id: id.to_string(),
        name: id.to_string(),
        vcpus: 2,
        ram_mb: 4096,
        disk_gb: 0,
    }
}

pub fn port(id: &str) -> NetworkInterface {
    NetworkInterface {
        port_id: id.to_string(),
        network_id: "net-1".to_string(),
        mac_address: None,
        private_ips: vec!["192.168.0.10".to_string()],
        public_ips: Vec::new(),
    }
}

pub fn group(id: &str) -> SecurityGroupRef {
    SecurityGroupRef {
        id: id.to_string(),
        name: format!("{}-name", id),
        description: None,
    }
}

pub fn volume(id: &str) -> VolumeRef {
    VolumeRef {
        id: id.to_string(),
        name: format!("{}-name", id),
        size_gb: 40,
        volume_type: Some("SSD".to_string()),
        bootable: false,
        device: None,
    }
}
