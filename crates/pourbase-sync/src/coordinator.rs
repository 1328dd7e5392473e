//! Runs every source adapter, isolates their failures and aggregates the run report.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::Utc;
use futures::future::join_all;
use pourbase_adapters::{enabled_adapters, AdapterContext, AdapterError, SourceAdapter};
use pourbase_core::CanonicalRecord;
use pourbase_storage::{HttpFetcher, RecordStore};
use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::IngestConfig;
use crate::persist::BatchPersister;
use crate::report::{write_report_files, RunReport, SourceError, SourceOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Running,
    Reported,
}

pub struct IngestionCoordinator {
    adapters: Vec<Box<dyn SourceAdapter>>,
    http: HttpFetcher,
    persister: BatchPersister,
    concurrent: bool,
    reports_dir: Option<PathBuf>,
    phase: RunPhase,
}

impl IngestionCoordinator {
    pub fn new(adapters: Vec<Box<dyn SourceAdapter>>, http: HttpFetcher, persister: BatchPersister) -> Self {
        Self {
            adapters,
            http,
            persister,
            concurrent: false,
            reports_dir: None,
            phase: RunPhase::Idle,
        }
    }

    /// Coordinator over every enabled source in `config`, persisting into `store`.
    pub fn from_config(config: &IngestConfig, store: Arc<dyn RecordStore>) -> Result<Self> {
        let http = HttpFetcher::new(config.http_client_config())?;
        let adapters = enabled_adapters(&config.sources(), config.bounds);
        Ok(Self::new(adapters, http, BatchPersister::new(store, config.chunk_size))
            .concurrent(config.concurrent_sources)
            .with_reports_dir(config.reports_dir.clone()))
    }

    pub fn concurrent(mut self, concurrent: bool) -> Self {
        self.concurrent = concurrent;
        self
    }

    pub fn with_reports_dir(mut self, reports_dir: Option<PathBuf>) -> Self {
        self.reports_dir = reports_dir;
        self
    }

    /// Keep only the named sources. Unknown or disabled names are an error.
    pub fn retain_sources(&mut self, names: &[String]) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }
        let available = self.sources();
        let unknown: Vec<_> = names
            .iter()
            .filter(|name| !available.contains(&name.as_str()))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            bail!(
                "unknown or disabled source(s): {} (available: {})",
                unknown.join(", "),
                available.join(", ")
            );
        }
        self.adapters
            .retain(|adapter| names.iter().any(|name| name == adapter.source()));
        Ok(())
    }

    pub fn sources(&self) -> Vec<&'static str> {
        self.adapters.iter().map(|adapter| adapter.source()).collect()
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// One full ingestion pass. Always yields a report; source and chunk
    /// failures are recorded in it rather than returned.
    pub async fn run_once(&mut self) -> RunReport {
        self.phase = RunPhase::Running;
        let report = self.execute().await;
        if let Some(root) = &self.reports_dir {
            match write_report_files(root, &report).await {
                Ok(dir) => info!(dir = %dir.display(), "run report written"),
                Err(err) => warn!(error = %err, "could not write run report files"),
            }
        }
        self.phase = RunPhase::Reported;
        report
    }

    async fn execute(&self) -> RunReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let ctx = AdapterContext::new(run_id);
        info!(%run_id, sources = self.adapters.len(), concurrent = self.concurrent, "ingest run started");

        let results: Vec<(&'static str, SourceOutcome, Vec<String>)> = if self.concurrent {
            join_all(
                self.adapters
                    .iter()
                    .map(|adapter| self.run_source(adapter.as_ref(), &ctx)),
            )
            .await
        } else {
            let mut results = Vec::with_capacity(self.adapters.len());
            for adapter in &self.adapters {
                results.push(self.run_source(adapter.as_ref(), &ctx).await);
            }
            results
        };

        let mut sources = BTreeMap::new();
        let mut chunk_errors = Vec::new();
        for (source, outcome, errors) in results {
            chunk_errors.extend(errors.into_iter().map(|error| SourceError {
                source: source.to_string(),
                error,
            }));
            sources.insert(source.to_string(), outcome);
        }

        let report = RunReport::assemble(run_id, started_at, Utc::now(), sources, chunk_errors);
        info!(
            %run_id,
            parsed = report.total_parsed,
            inserted = report.total_inserted,
            errors = report.errors.len(),
            elapsed_seconds = report.elapsed_seconds,
            "ingest run finished"
        );
        report
    }

    async fn run_source(
        &self,
        adapter: &dyn SourceAdapter,
        ctx: &AdapterContext,
    ) -> (&'static str, SourceOutcome, Vec<String>) {
        let source = adapter.source();
        async {
            let records = match fetch_and_parse(adapter, &self.http, ctx).await {
                Ok(records) => records,
                Err(err) => {
                    warn!(error = %err, "source failed");
                    return (
                        source,
                        SourceOutcome::Failed {
                            error: err.to_string(),
                        },
                        Vec::new(),
                    );
                }
            };
            let parsed = records.len();
            let outcome = self.persister.persist(source, records).await;
            info!(
                parsed,
                inserted = outcome.inserted,
                duplicates = outcome.duplicates,
                failed_chunks = outcome.failed_chunks,
                "source finished"
            );
            (
                source,
                SourceOutcome::Completed {
                    parsed,
                    inserted: outcome.inserted,
                    duplicates: outcome.duplicates,
                    failed_chunks: outcome.failed_chunks,
                },
                outcome.errors,
            )
        }
        .instrument(info_span!("source_run", source, run_id = %ctx.run_id))
        .await
    }
}

async fn fetch_and_parse(
    adapter: &dyn SourceAdapter,
    http: &HttpFetcher,
    ctx: &AdapterContext,
) -> Result<Vec<CanonicalRecord>, AdapterError> {
    let raw = adapter.fetch(http, ctx).await?;
    adapter.parse(&raw)
}
