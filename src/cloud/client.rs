//! Huawei Cloud Client
//!
//! Main client for the provider APIs, combining request signing with the
//! HTTP transport and translating responses into typed records.

use super::auth::{Credentials, HEADER_PROJECT_ID, HEADER_SDK_DATE};
use super::http::CloudHttpClient;
use super::model::{
    FlavorRef, NetworkInterface, PageToken, SecurityGroupRef, ServerPage, ServerRecord, VolumeRef,
};
use super::ComputeApi;
use crate::config::Settings;
use crate::error::ApiError;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use url::Url;

/// Main Huawei Cloud client
#[derive(Clone)]
pub struct HuaweiCloudClient {
    credentials: Credentials,
    http: CloudHttpClient,
    pub project_id: String,
    pub region: String,
    endpoint: Option<Url>,
}

impl HuaweiCloudClient {
    /// Create a client scoped to the configured project and region
    pub fn new(settings: &Settings) -> Result<Self, ApiError> {
        Ok(Self {
            credentials: settings.credentials.clone(),
            http: CloudHttpClient::new()?,
            project_id: settings.project_id.clone(),
            region: settings.region.clone(),
            endpoint: settings.endpoint.clone(),
        })
    }

    /// Make a signed GET request
    async fn get(&self, operation: &str, url: &Url) -> Result<Value, ApiError> {
        let signature = self.credentials.sign(
            "GET",
            url,
            &[(HEADER_PROJECT_ID, self.project_id.as_str())],
            b"",
            Utc::now(),
        )?;

        self.http
            .get(
                operation,
                url,
                &[
                    (HEADER_PROJECT_ID, self.project_id.as_str()),
                    (HEADER_SDK_DATE, signature.sdk_date.as_str()),
                    ("Authorization", signature.authorization.as_str()),
                ],
            )
            .await
    }

    /// GET a single resource, naming it if it does not exist
    async fn get_resource(
        &self,
        operation: &str,
        kind: &'static str,
        id: &str,
        url: &Url,
    ) -> Result<Value, ApiError> {
        self.get(operation, url).await.map_err(|e| match e {
            ApiError::NotFound { .. } => ApiError::NotFound {
                kind,
                id: id.to_string(),
            },
            other => other,
        })
    }

    // =========================================================================
    // URL helpers
    // =========================================================================

    /// Base URL of a service, or the override when one is configured
    fn service_base(&self, service: &str) -> Result<Url, ApiError> {
        let mut base = match &self.endpoint {
            Some(url) => url.clone(),
            None => Url::parse(&format!("https://{}.{}.myhuaweicloud.com/", service, self.region))
                .map_err(|e| ApiError::fatal("build URL", e))?,
        };

        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(base)
    }

    /// Build a project-scoped service URL
    pub fn service_url(&self, service: &str, version: &str, path: &str) -> Result<Url, ApiError> {
        let relative = format!(
            "{}/{}/{}",
            version,
            urlencoding::encode(&self.project_id),
            path
        );
        self.service_base(service)?
            .join(&relative)
            .map_err(|e| ApiError::fatal("build URL", e))
    }

    /// Build ECS API URL
    pub fn ecs_url(&self, path: &str) -> Result<Url, ApiError> {
        self.service_url("ecs", "v1", path)
    }

    /// Build VPC API URL
    pub fn vpc_url(&self, path: &str) -> Result<Url, ApiError> {
        self.service_url("vpc", "v1", path)
    }

    /// Build EVS API URL
    pub fn evs_url(&self, path: &str) -> Result<Url, ApiError> {
        self.service_url("evs", "v2", path)
    }
}

/// Page tokens are 1-based page numbers for the ECS listing
fn page_number(page: Option<&PageToken>) -> Result<usize, ApiError> {
    match page {
        None => Ok(1),
        Some(token) => token
            .0
            .parse::<usize>()
            .ok()
            .filter(|n| *n >= 1)
            .ok_or_else(|| ApiError::fatal("list_servers", format!("invalid page token '{}'", token))),
    }
}

#[async_trait]
impl ComputeApi for HuaweiCloudClient {
    async fn list_servers(
        &self,
        page: Option<&PageToken>,
        limit: usize,
    ) -> Result<ServerPage, ApiError> {
        const OP: &str = "list_servers";
        let offset = page_number(page)?;

        let mut url = self.ecs_url("cloudservers/detail")?;
        url.query_pairs_mut()
            .append_pair("offset", &offset.to_string())
            .append_pair("limit", &limit.to_string());

        let response = self.get(OP, &url).await?;

        let raw = response
            .get("servers")
            .and_then(Value::as_array)
            .ok_or_else(|| ApiError::fatal(OP, "response has no 'servers' array"))?;

        let servers = raw
            .iter()
            .map(|s| ServerRecord::from_api(s, &self.project_id, &self.region))
            .collect::<Result<Vec<_>, _>>()?;

        let total = response.get("count").and_then(Value::as_u64);
        let exhausted = servers.len() < limit
            || total.is_some_and(|count| (offset * limit) as u64 >= count);
        let next = (!exhausted).then(|| PageToken((offset + 1).to_string()));

        tracing::debug!(
            "list_servers page {}: {} servers, total {:?}",
            offset,
            servers.len(),
            total
        );

        Ok(ServerPage { servers, next })
    }

    async fn get_flavor(&self, flavor_id: &str) -> Result<FlavorRef, ApiError> {
        let url = self.service_url("ecs", "v2.1", &format!("flavors/{}", urlencoding::encode(flavor_id)))?;
        let response = self.get_resource("get_flavor", "flavor", flavor_id, &url).await?;
        FlavorRef::from_api(&response)
    }

    async fn list_ports(&self, server_id: &str) -> Result<Vec<NetworkInterface>, ApiError> {
        let mut url = self.vpc_url("ports")?;
        url.query_pairs_mut().append_pair("device_id", server_id);

        let response = self.get("list_ports", &url).await?;
        NetworkInterface::list_from_api(&response)
    }

    async fn get_security_group(&self, group_id: &str) -> Result<SecurityGroupRef, ApiError> {
        let url = self.vpc_url(&format!("security-groups/{}", urlencoding::encode(group_id)))?;
        let response = self
            .get_resource("get_security_group", "security group", group_id, &url)
            .await?;
        SecurityGroupRef::from_api(&response)
    }

    async fn get_volume(&self, volume_id: &str) -> Result<VolumeRef, ApiError> {
        let url = self.evs_url(&format!("cloudvolumes/{}", urlencoding::encode(volume_id)))?;
        let response = self.get_resource("get_volume", "volume", volume_id, &url).await?;
        VolumeRef::from_api(&response)
    }
}
