//! Inventory pipeline
//!
//! Turns the paged server listing into one enriched, ordered snapshot.
//!
//! # Architecture
//!
//! - [`pager`] - Walks the server listing page by page
//! - [`enrich`] - Resolves flavor, ports, security groups and volumes for one server
//! - [`aggregate`] - Runs enrichment over a bounded task pool and keeps listing order
//! - [`snapshot`] - Encodes the result and writes it atomically
//! - [`retry`] - Bounded exponential backoff shared by every API call

pub mod aggregate;
pub mod enrich;
pub mod pager;
pub mod retry;
pub mod snapshot;

#[cfg(test)]
pub(crate) mod testing;

pub use aggregate::{Aggregator, Inventory, RunStats};
pub use enrich::Enricher;
pub use pager::walk_servers;
pub use retry::RetryPolicy;
pub use snapshot::{InventorySnapshot, OutputFormat, SnapshotMetadata};
