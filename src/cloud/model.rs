//! Typed records
//!
//! Raw API responses are translated into these structures at the adapter
//! boundary. Everything downstream works with typed values only.

use crate::error::ApiError;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Opaque cursor for the next page of a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageToken(pub String);

impl fmt::Display for PageToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One page of a server listing
#[derive(Debug, Clone)]
pub struct ServerPage {
    pub servers: Vec<ServerRecord>,
    /// `None` once the listing is exhausted
    pub next: Option<PageToken>,
}

/// How far enrichment got for a server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentStatus {
    #[default]
    Pending,
    Complete,
    Partial,
    Aborted,
}

/// Which cross-reference could not be resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Lookup {
    Flavor,
    NetworkInterfaces,
    SecurityGroups,
    Volumes,
    Enrichment,
}

impl Lookup {
    pub fn label(self) -> &'static str {
        match self {
            Lookup::Flavor => "flavor",
            Lookup::NetworkInterfaces => "network interface",
            Lookup::SecurityGroups => "security group",
            Lookup::Volumes => "volume",
            Lookup::Enrichment => "enrichment",
        }
    }
}

/// A sub-resource that failed to resolve for one server
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupFailure {
    pub field: Lookup,
    /// Id of the referenced resource, when the lookup was for a single one
    pub target: Option<String>,
    pub reason: String,
}

impl LookupFailure {
    /// Short annotation shown on the record
    pub fn summary(&self) -> String {
        match self.field {
            Lookup::Enrichment => "enrichment aborted".to_string(),
            field => format!("{} resolution failed", field.label()),
        }
    }
}

/// Resolved compute sizing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlavorRef {
    pub id: String,
    pub name: String,
    pub vcpus: u32,
    pub ram_mb: u64,
    pub disk_gb: u64,
}

impl FlavorRef {
    /// e.g. `s6.large.2 | 2 vCPUs | 4 GiB`
    pub fn describe(&self) -> String {
        format!(
            "{} | {} vCPUs | {} GiB",
            self.name,
            self.vcpus,
            self.ram_mb as f64 / 1024.0
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterface {
    pub port_id: String,
    pub network_id: String,
    pub mac_address: Option<String>,
    pub private_ips: Vec<String>,
    pub public_ips: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroupRef {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeRef {
    pub id: String,
    pub name: String,
    pub size_gb: u64,
    pub volume_type: Option<String>,
    pub bootable: bool,
    pub device: Option<String>,
}

/// Volume reference as listed on the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeAttachment {
    pub id: String,
    pub device: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressKind {
    Fixed,
    Floating,
}

/// Address as reported on the server itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerAddress {
    pub addr: String,
    pub version: Option<u8>,
    pub kind: AddressKind,
    pub mac_address: Option<String>,
    pub port_id: Option<String>,
}

impl ServerAddress {
    pub fn is_public(&self) -> bool {
        self.kind == AddressKind::Floating
    }
}

/// One ECS instance, from listing through enrichment
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerRecord {
    pub id: String,
    pub name: String,
    pub status: String,
    pub created: String,
    pub updated: Option<String>,
    pub project_id: String,
    pub region: String,
    pub availability_zone: Option<String>,
    pub image_id: Option<String>,
    pub key_name: Option<String>,
    pub flavor_id: String,
    pub flavor: Option<FlavorRef>,
    pub network_interfaces: Vec<NetworkInterface>,
    pub security_groups: Vec<SecurityGroupRef>,
    pub volumes: Vec<VolumeRef>,
    pub security_group_ids: Vec<String>,
    pub attached_volumes: Vec<VolumeAttachment>,
    pub addresses: BTreeMap<String, Vec<ServerAddress>>,
    pub metadata: BTreeMap<String, Value>,
    pub enrichment: EnrichmentStatus,
    pub error: Option<String>,
    pub failures: Vec<LookupFailure>,
}

impl ServerRecord {
    /// Translate one entry of a `cloudservers/detail` listing
    pub fn from_api(value: &Value, project_id: &str, region: &str) -> Result<Self, ApiError> {
        const OP: &str = "list_servers";

        let id = required_str(value, "id", OP)?;
        let flavor_id = value
            .get("flavor")
            .and_then(|f| f.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ApiError::fatal(OP, format!("server {} has no flavor id", id)))?;

        let mut security_group_ids = Vec::new();
        for group in array(value, "security_groups") {
            // v1 responses carry the id; older ones only the name
            let Some(group_id) = opt_str(group, "id").or_else(|| opt_str(group, "name")) else {
                continue;
            };
            if !security_group_ids.contains(&group_id) {
                security_group_ids.push(group_id);
            }
        }

        let attached_volumes = array(value, "os-extended-volumes:volumes_attached")
            .iter()
            .filter_map(|v| {
                Some(VolumeAttachment {
                    id: opt_str(v, "id")?,
                    device: opt_str(v, "device"),
                })
            })
            .collect();

        let addresses = value
            .get("addresses")
            .and_then(Value::as_object)
            .map(|nets| {
                nets.iter()
                    .map(|(network, addrs)| {
                        let list: Vec<ServerAddress> = addrs
                            .as_array()
                            .map(|a| a.iter().filter_map(ServerAddress::from_api).collect())
                            .unwrap_or_default();
                        (network.clone(), list)
                    })
                    .collect()
            })
            .unwrap_or_default();

        let metadata = value
            .get("metadata")
            .and_then(Value::as_object)
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();

        Ok(Self {
            name: required_str(value, "name", OP)?,
            status: required_str(value, "status", OP)?,
            created: opt_str(value, "created").unwrap_or_default(),
            updated: opt_str(value, "updated"),
            project_id: opt_str(value, "tenant_id").unwrap_or_else(|| project_id.to_string()),
            region: region.to_string(),
            availability_zone: opt_str(value, "OS-EXT-AZ:availability_zone"),
            image_id: value
                .get("image")
                .and_then(|i| i.get("id"))
                .and_then(Value::as_str)
                .map(str::to_string),
            key_name: opt_str(value, "key_name"),
            flavor_id,
            flavor: None,
            network_interfaces: Vec::new(),
            security_groups: Vec::new(),
            volumes: Vec::new(),
            security_group_ids,
            attached_volumes,
            addresses,
            metadata,
            enrichment: EnrichmentStatus::Pending,
            error: None,
            failures: Vec::new(),
            id,
        })
    }

    /// Floating addresses bound to the given MAC
    pub fn public_ips_for(&self, mac_address: &str) -> Vec<String> {
        self.addresses
            .values()
            .flatten()
            .filter(|a| a.is_public() && a.mac_address.as_deref() == Some(mac_address))
            .map(|a| a.addr.clone())
            .collect()
    }
}

impl ServerAddress {
    fn from_api(value: &Value) -> Option<Self> {
        let addr = opt_str(value, "addr")?;
        let kind = match value.get("OS-EXT-IPS:type").and_then(Value::as_str) {
            Some("floating") => AddressKind::Floating,
            Some(_) => AddressKind::Fixed,
            None if is_private_ip(&addr) => AddressKind::Fixed,
            None => AddressKind::Floating,
        };

        Some(Self {
            version: value
                .get("version")
                .and_then(as_u64_lenient)
                .and_then(|v| u8::try_from(v).ok()),
            kind,
            mac_address: opt_str(value, "OS-EXT-IPS-MAC:mac_addr"),
            port_id: opt_str(value, "OS-EXT-IPS:port_id"),
            addr,
        })
    }
}

impl FlavorRef {
    /// Translate a `flavors/{id}` response
    pub fn from_api(value: &Value) -> Result<Self, ApiError> {
        const OP: &str = "get_flavor";
        let flavor = value.get("flavor").unwrap_or(value);

        Ok(Self {
            id: required_str(flavor, "id", OP)?,
            name: required_str(flavor, "name", OP)?,
            vcpus: u32::try_from(required_u64(flavor, "vcpus", OP)?)
                .map_err(|_| ApiError::fatal(OP, "vcpus out of range"))?,
            ram_mb: required_u64(flavor, "ram", OP)?,
            disk_gb: flavor.get("disk").and_then(as_u64_lenient).unwrap_or(0),
        })
    }
}

impl NetworkInterface {
    /// Translate a `ports?device_id=` response, keeping API order
    pub fn list_from_api(value: &Value) -> Result<Vec<Self>, ApiError> {
        const OP: &str = "list_ports";
        let ports = value
            .get("ports")
            .and_then(Value::as_array)
            .ok_or_else(|| ApiError::fatal(OP, "response has no 'ports' array"))?;

        ports
            .iter()
            .map(|port| {
                Ok(Self {
                    port_id: required_str(port, "id", OP)?,
                    network_id: opt_str(port, "network_id").unwrap_or_default(),
                    mac_address: opt_str(port, "mac_address"),
                    private_ips: array(port, "fixed_ips")
                        .iter()
                        .filter_map(|ip| opt_str(ip, "ip_address"))
                        .collect(),
                    public_ips: Vec::new(),
                })
            })
            .collect()
    }
}

impl SecurityGroupRef {
    /// Translate a `security-groups/{id}` response
    pub fn from_api(value: &Value) -> Result<Self, ApiError> {
        const OP: &str = "get_security_group";
        let group = value.get("security_group").unwrap_or(value);

        Ok(Self {
            id: required_str(group, "id", OP)?,
            name: required_str(group, "name", OP)?,
            description: opt_str(group, "description").filter(|d| !d.is_empty()),
        })
    }
}

impl VolumeRef {
    /// Translate a `cloudvolumes/{id}` response
    pub fn from_api(value: &Value) -> Result<Self, ApiError> {
        const OP: &str = "get_volume";
        let volume = value.get("volume").unwrap_or(value);

        let bootable = match volume.get("bootable") {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        };

        Ok(Self {
            id: required_str(volume, "id", OP)?,
            name: opt_str(volume, "name").unwrap_or_default(),
            size_gb: required_u64(volume, "size", OP)?,
            volume_type: opt_str(volume, "volume_type"),
            bootable,
            device: None,
        })
    }
}

/// Special-purpose IPv4 blocks treated as non-public (IANA registry)
const PRIVATE_V4: &[([u8; 4], u32)] = &[
    ([0, 0, 0, 0], 8),
    ([10, 0, 0, 0], 8),
    ([127, 0, 0, 0], 8),
    ([169, 254, 0, 0], 16),
    ([172, 16, 0, 0], 12),
    ([192, 0, 0, 0], 29),
    ([192, 0, 0, 170], 31),
    ([192, 0, 2, 0], 24),
    ([192, 168, 0, 0], 16),
    ([198, 18, 0, 0], 15),
    ([198, 51, 100, 0], 24),
    ([203, 0, 113, 0], 24),
    ([240, 0, 0, 0], 4),
];

/// Globally reachable carve-outs inside 2001::/23
const GLOBAL_V6_IN_IETF: &[([u16; 8], u32)] = &[
    ([0x2001, 0x1, 0, 0, 0, 0, 0, 0x1], 128),
    ([0x2001, 0x1, 0, 0, 0, 0, 0, 0x2], 128),
    ([0x2001, 0x3, 0, 0, 0, 0, 0, 0], 32),
    ([0x2001, 0x4, 0x112, 0, 0, 0, 0, 0], 48),
    ([0x2001, 0x20, 0, 0, 0, 0, 0, 0], 28),
    ([0x2001, 0x30, 0, 0, 0, 0, 0, 0], 28),
];

const PRIVATE_V6: &[([u16; 8], u32)] = &[
    ([0x64, 0xff9b, 0x1, 0, 0, 0, 0, 0], 48),
    ([0x100, 0, 0, 0, 0, 0, 0, 0], 64),
    ([0x2001, 0xdb8, 0, 0, 0, 0, 0, 0], 32),
    ([0xfc00, 0, 0, 0, 0, 0, 0, 0], 7),
    ([0xfe80, 0, 0, 0, 0, 0, 0, 0], 10),
];

/// Whether an address is outside the public internet: RFC 1918 / RFC 4193,
/// loopback, link-local, documentation, benchmarking and reserved blocks.
/// IPv4-mapped IPv6 addresses are judged by their IPv4 part.
pub fn is_private_ip(ip: &str) -> bool {
    match ip.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => is_private_v4(v4),
        Ok(IpAddr::V6(v6)) => is_private_v6(v6),
        Err(_) => false,
    }
}

fn is_private_v4(addr: Ipv4Addr) -> bool {
    PRIVATE_V4
        .iter()
        .any(|(net, prefix)| in_v4_net(addr, Ipv4Addr::from(*net), *prefix))
}

fn is_private_v6(addr: Ipv6Addr) -> bool {
    if let Some(v4) = addr.to_ipv4_mapped() {
        return is_private_v4(v4);
    }
    if addr.is_unspecified() || addr.is_loopback() {
        return true;
    }

    let in_table = |table: &[([u16; 8], u32)]| {
        table
            .iter()
            .any(|(net, prefix)| in_v6_net(addr, Ipv6Addr::from(*net), *prefix))
    };

    let ietf = Ipv6Addr::new(0x2001, 0, 0, 0, 0, 0, 0, 0);
    (in_v6_net(addr, ietf, 23) && !in_table(GLOBAL_V6_IN_IETF)) || in_table(PRIVATE_V6)
}

fn in_v4_net(addr: Ipv4Addr, net: Ipv4Addr, prefix: u32) -> bool {
    let mask = u32::MAX.checked_shl(32 - prefix).unwrap_or(0);
    u32::from(addr) & mask == u32::from(net) & mask
}

fn in_v6_net(addr: Ipv6Addr, net: Ipv6Addr, prefix: u32) -> bool {
    let mask = u128::MAX.checked_shl(128 - prefix).unwrap_or(0);
    u128::from(addr) & mask == u128::from(net) & mask
}

fn opt_str(value: &Value, field: &str) -> Option<String> {
    value.get(field).and_then(Value::as_str).map(str::to_string)
}

fn required_str(value: &Value, field: &str, operation: &str) -> Result<String, ApiError> {
    opt_str(value, field)
        .ok_or_else(|| ApiError::fatal(operation, format!("response is missing '{}'", field)))
}

/// Some endpoints send counts as strings
fn as_u64_lenient(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn required_u64(value: &Value, field: &str, operation: &str) -> Result<u64, ApiError> {
    value
        .get(field)
        .and_then(as_u64_lenient)
        .ok_or_else(|| ApiError::fatal(operation, format!("response is missing '{}'", field)))
}

fn array<'a>(value: &'a Value, field: &str) -> &'a [Value] {
    value
        .get(field)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}
