//! Catalog health snapshot built from store counts.

use std::collections::BTreeMap;

use chrono::Utc;
use pourbase_storage::{CountFacet, RecordStore, StoreError};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogStatus {
    Healthy,
    NeedsAttention,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogIssue {
    pub kind: String,
    pub message: String,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogStats {
    pub status: CatalogStatus,
    pub timestamp: String,
    pub connected: bool,
    pub total: u64,
    pub by_category: BTreeMap<String, u64>,
    pub by_source: BTreeMap<String, u64>,
    pub issues: Vec<CatalogIssue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Never fails: a store error is reported through `status` and `error`.
pub async fn collect_stats(store: &dyn RecordStore, min_expected: u64) -> CatalogStats {
    let mut stats = CatalogStats {
        status: CatalogStatus::Healthy,
        timestamp: Utc::now().to_rfc3339(),
        connected: false,
        total: 0,
        by_category: BTreeMap::new(),
        by_source: BTreeMap::new(),
        issues: Vec::new(),
        error: None,
    };

    if let Err(err) = fill_counts(store, &mut stats).await {
        warn!(error = %err, "catalog stats unavailable");
        stats.status = CatalogStatus::Error;
        stats.error = Some(err.to_string());
        return stats;
    }

    if stats.total < min_expected {
        stats.issues.push(CatalogIssue {
            kind: "low_record_count".to_string(),
            message: format!("only {} records stored (expected at least {min_expected})", stats.total),
            action: "trigger_ingest".to_string(),
        });
        stats.status = CatalogStatus::NeedsAttention;
    }
    stats
}

async fn fill_counts(store: &dyn RecordStore, stats: &mut CatalogStats) -> Result<(), StoreError> {
    stats.total = store.count().await?;
    stats.connected = true;
    stats.by_category = store.count_by(CountFacet::Category).await?;
    stats.by_source = store.count_by(CountFacet::Source).await?;
    Ok(())
}
