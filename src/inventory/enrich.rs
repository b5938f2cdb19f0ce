//! Resource enrichment
//!
//! Resolves the cross-references on one server (flavor, ports, security
//! groups, volumes) into full records. The four lookups run concurrently
//! and fail independently: a lookup that still fails after retries leaves
//! its field empty and adds a [`LookupFailure`] to the record.

use super::retry::RetryPolicy;
use crate::cloud::model::{
    EnrichmentStatus, FlavorRef, Lookup, LookupFailure, NetworkInterface, SecurityGroupRef,
    ServerRecord, VolumeRef,
};
use crate::cloud::ComputeApi;
use crate::error::ApiError;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;

type Resolved<T> = Result<T, Vec<LookupFailure>>;

#[derive(Clone)]
pub struct Enricher {
    api: Arc<dyn ComputeApi>,
    retry: RetryPolicy,
}

impl Enricher {
    pub fn new(api: Arc<dyn ComputeApi>, retry: RetryPolicy) -> Self {
        Self { api, retry }
    }

    /// Enrich one server. Never fails; problems are recorded on the record.
    pub async fn enrich(&self, mut server: ServerRecord) -> ServerRecord {
        let (flavor, ports, groups, volumes) = futures::join!(
            self.resolve_flavor(&server),
            self.resolve_ports(&server),
            self.resolve_security_groups(&server),
            self.resolve_volumes(&server),
        );

        let mut failures = Vec::new();
        match flavor {
            Ok(flavor) => server.flavor = Some(flavor),
            Err(f) => failures.extend(f),
        }
        match ports {
            Ok(ports) => server.network_interfaces = ports,
            Err(f) => failures.extend(f),
        }
        match groups {
            Ok(groups) => server.security_groups = groups,
            Err(f) => failures.extend(f),
        }
        match volumes {
            Ok(volumes) => server.volumes = volumes,
            Err(f) => failures.extend(f),
        }

        if failures.is_empty() {
            server.enrichment = EnrichmentStatus::Complete;
        } else {
            tracing::warn!(
                "Server {} partially enriched: {}",
                server.id,
                failures
                    .iter()
                    .map(|f| f.reason.as_str())
                    .collect::<Vec<_>>()
                    .join("; ")
            );
            server.enrichment = EnrichmentStatus::Partial;
            server.error = Some(summarize(&failures));
            server.failures = failures;
        }

        server
    }

    async fn resolve_flavor(&self, server: &ServerRecord) -> Resolved<FlavorRef> {
        let id = server.flavor_id.as_str();
        self.retry
            .run("get_flavor", || self.api.get_flavor(id))
            .await
            .map_err(|e| vec![failure(Lookup::Flavor, Some(id), &e)])
    }

    async fn resolve_ports(&self, server: &ServerRecord) -> Resolved<Vec<NetworkInterface>> {
        let mut ports = self
            .retry
            .run("list_ports", || self.api.list_ports(&server.id))
            .await
            .map_err(|e| vec![failure(Lookup::NetworkInterfaces, None, &e)])?;

        for port in &mut ports {
            if let Some(mac) = &port.mac_address {
                port.public_ips = server.public_ips_for(mac);
            }
        }
        Ok(ports)
    }

    async fn resolve_security_groups(
        &self,
        server: &ServerRecord,
    ) -> Resolved<Vec<SecurityGroupRef>> {
        let results = join_all(server.security_group_ids.iter().map(|id| async move {
            self.retry
                .run("get_security_group", || self.api.get_security_group(id))
                .await
                .map_err(|e| failure(Lookup::SecurityGroups, Some(id.as_str()), &e))
        }))
        .await;

        let mut seen = HashSet::new();
        collect_all(results).map(|groups| {
            groups
                .into_iter()
                .filter(|g| seen.insert(g.id.clone()))
                .collect()
        })
    }

    async fn resolve_volumes(&self, server: &ServerRecord) -> Resolved<Vec<VolumeRef>> {
        let results = join_all(server.attached_volumes.iter().map(|attachment| async move {
            self.retry
                .run("get_volume", || self.api.get_volume(&attachment.id))
                .await
                .map(|mut volume| {
                    volume.device = attachment.device.clone();
                    volume
                })
                .map_err(|e| failure(Lookup::Volumes, Some(attachment.id.as_str()), &e))
        }))
        .await;

        collect_all(results)
    }
}

/// All successes, or every failure if there was any
fn collect_all<T>(results: Vec<Result<T, LookupFailure>>) -> Resolved<Vec<T>> {
    let mut values = Vec::with_capacity(results.len());
    let mut failures = Vec::new();
    for result in results {
        match result {
            Ok(value) => values.push(value),
            Err(f) => failures.push(f),
        }
    }

    if failures.is_empty() {
        Ok(values)
    } else {
        Err(failures)
    }
}

fn failure(field: Lookup, target: Option<&str>, error: &ApiError) -> LookupFailure {
    LookupFailure {
        field,
        target: target.map(str::to_string),
        reason: error.to_string(),
    }
}

/// One line per failed field, in first-seen order
fn summarize(failures: &[LookupFailure]) -> String {
    let mut lines: Vec<String> = Vec::new();
    for failure in failures {
        let line = failure.summary();
        if !lines.contains(&line) {
            lines.push(line);
        }
    }
    lines.join("; ")
}
