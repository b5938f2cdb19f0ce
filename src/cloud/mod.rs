//! Huawei Cloud API interaction module
//!
//! Everything that talks to the provider lives here. The rest of the crate
//! only sees the [`ComputeApi`] trait and the typed records in [`model`].
//!
//! # Module Structure
//!
//! - [`auth`] - AK/SK credentials and request signing
//! - [`client`] - Signed client implementing [`ComputeApi`] over REST
//! - [`http`] - HTTP transport and error classification
//! - [`model`] - Typed records and translation from raw JSON
//!
//! # Example
//!
//! ```ignore
//! use ecs_inventory::cloud::{client::HuaweiCloudClient, ComputeApi};
//!
//! async fn example(settings: &ecs_inventory::config::Settings) -> anyhow::Result<()> {
//!     let client = HuaweiCloudClient::new(settings)?;
//!     let page = client.list_servers(None, 50).await?;
//!     println!("{} servers on the first page", page.servers.len());
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod http;
pub mod model;

use crate::error::ApiError;
use async_trait::async_trait;
use model::{FlavorRef, NetworkInterface, PageToken, SecurityGroupRef, ServerPage, VolumeRef};

/// Resource-listing operations the inventory needs from the provider.
///
/// Implementations must be safe to share between concurrent enrichment
/// tasks; connection pooling is their concern.
#[async_trait]
pub trait ComputeApi: Send + Sync {
    /// One page of servers. `page` is `None` for the first page.
    async fn list_servers(
        &self,
        page: Option<&PageToken>,
        limit: usize,
    ) -> Result<ServerPage, ApiError>;

    async fn get_flavor(&self, flavor_id: &str) -> Result<FlavorRef, ApiError>;

    /// Ports attached to a server, in attachment order
    async fn list_ports(&self, server_id: &str) -> Result<Vec<NetworkInterface>, ApiError>;

    async fn get_security_group(&self, group_id: &str) -> Result<SecurityGroupRef, ApiError>;

    async fn get_volume(&self, volume_id: &str) -> Result<VolumeRef, ApiError>;
}
