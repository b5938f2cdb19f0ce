//! Inventory aggregation
//!
//! Drives the server walk, fans enrichment out to a bounded pool of tasks
//! and collects the results back in listing order.

use super::enrich::Enricher;
use super::pager::walk_servers;
use super::retry::RetryPolicy;
use crate::cloud::model::{EnrichmentStatus, Lookup, LookupFailure, ServerRecord};
use crate::cloud::ComputeApi;
use crate::error::ApiError;
use futures::{StreamExt, TryStreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::AbortHandle;

/// Run-level tally
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    pub total: usize,
    pub fully_enriched: usize,
    pub partially_enriched: usize,
    pub fatally_failed: usize,
}

impl RunStats {
    fn record(&mut self, server: &ServerRecord) {
        self.total += 1;
        match server.enrichment {
            EnrichmentStatus::Complete => self.fully_enriched += 1,
            EnrichmentStatus::Partial => self.partially_enriched += 1,
            EnrichmentStatus::Aborted | EnrichmentStatus::Pending => self.fatally_failed += 1,
        }
    }
}

/// Enriched servers in listing order, plus their tally
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    pub servers: Vec<ServerRecord>,
    pub stats: RunStats,
}

pub struct Aggregator {
    api: Arc<dyn ComputeApi>,
    page_size: usize,
    concurrency: usize,
    retry: RetryPolicy,
}

impl Aggregator {
    pub fn new(
        api: Arc<dyn ComputeApi>,
        page_size: usize,
        concurrency: usize,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            api,
            page_size,
            concurrency: concurrency.max(1),
            retry,
        }
    }

    /// Walk and enrich every server.
    ///
    /// Fails only when the server listing itself fails; enrichment problems
    /// are recorded on the affected records.
    pub async fn collect(&self) -> Result<Inventory, ApiError> {
        let enricher = Enricher::new(self.api.clone(), self.retry);

        let mut enriched = walk_servers(self.api.clone(), self.page_size, self.retry)
            .map_ok(|server| {
                let enricher = enricher.clone();
                async move { Ok::<_, ApiError>(enrich_isolated(enricher, server).await) }
            })
            .try_buffered(self.concurrency);

        let mut inventory = Inventory::default();
        while let Some(server) = enriched.next().await {
            let server = server?;
            inventory.stats.record(&server);
            inventory.servers.push(server);
        }

        tracing::info!(
            "Collected {} servers ({} fully enriched, {} partial, {} failed)",
            inventory.stats.total,
            inventory.stats.fully_enriched,
            inventory.stats.partially_enriched,
            inventory.stats.fatally_failed
        );

        Ok(inventory)
    }
}

/// Cancels the task it guards when dropped
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Enrich on its own task so a panic only costs this one server. Dropping
/// the returned future (a listing failure ends the collection early)
/// cancels the task.
async fn enrich_isolated(enricher: Enricher, server: ServerRecord) -> ServerRecord {
    let fallback = server.clone();
    let handle = tokio::spawn(async move { enricher.enrich(server).await });
    let _guard = AbortOnDrop(handle.abort_handle());

    match handle.await {
        Ok(enriched) => enriched,
        Err(e) => {
            tracing::error!("Enrichment of server {} aborted: {}", fallback.id, e);
            aborted(fallback, e.to_string())
        }
    }
}

fn aborted(mut server: ServerRecord, reason: String) -> ServerRecord {
    let failure = LookupFailure {
        field: Lookup::Enrichment,
        target: None,
        reason,
    };
    server.enrichment = EnrichmentStatus::Aborted;
    server.error = Some(failure.summary());
    server.failures = vec![failure];
    server
}
