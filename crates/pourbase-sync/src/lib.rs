//! Ingestion orchestration: configuration, batch persistence, the run
//! coordinator, run reports and catalog stats.

use std::sync::Arc;

use anyhow::Result;
use pourbase_storage::RecordStore;

pub mod config;
pub mod coordinator;
pub mod persist;
pub mod report;
pub mod stats;

pub use config::{clamp_chunk_size, IngestConfig, StatsSettings, DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};
pub use coordinator::{IngestionCoordinator, RunPhase};
pub use persist::{dedupe_by_natural_key, BatchPersister, PersistOutcome};
pub use report::{write_report_files, RunReport, SourceError, SourceOutcome};
pub use stats::{collect_stats, CatalogIssue, CatalogStats, CatalogStatus};

pub const CRATE_NAME: &str = "pourbase-sync";

/// Run every enabled source once (or only `only`, when non-empty).
pub async fn run_ingest(config: &IngestConfig, store: Arc<dyn RecordStore>, only: &[String]) -> Result<RunReport> {
    let mut coordinator = IngestionCoordinator::from_config(config, store)?;
    coordinator.retain_sources(only)?;
    Ok(coordinator.run_once().await)
}
