//! Run report returned by every ingestion run, and its on-disk rendering.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use uuid::Uuid;

/// Per-source entry: counts on success, the error message on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceOutcome {
    Completed {
        parsed: usize,
        inserted: usize,
        duplicates: usize,
        failed_chunks: usize,
    },
    Failed {
        error: String,
    },
}

impl SourceOutcome {
    pub fn parsed(&self) -> usize {
        match self {
            SourceOutcome::Completed { parsed, .. } => *parsed,
            SourceOutcome::Failed { .. } => 0,
        }
    }

    pub fn inserted(&self) -> usize {
        match self {
            SourceOutcome::Completed { inserted, .. } => *inserted,
            SourceOutcome::Failed { .. } => 0,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SourceOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceError {
    pub source: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Completion time, RFC 3339.
    pub timestamp: String,
    pub sources: BTreeMap<String, SourceOutcome>,
    pub total_parsed: usize,
    pub total_inserted: usize,
    pub elapsed_seconds: f64,
    pub errors: Vec<SourceError>,
}

impl RunReport {
    /// Build the report from per-source outcomes plus any chunk-level errors
    /// collected from sources that otherwise completed.
    pub fn assemble(
        run_id: Uuid,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        sources: BTreeMap<String, SourceOutcome>,
        chunk_errors: Vec<SourceError>,
    ) -> Self {
        let total_parsed = sources.values().map(SourceOutcome::parsed).sum();
        let total_inserted = sources.values().map(SourceOutcome::inserted).sum();
        let mut errors: Vec<SourceError> = sources
            .iter()
            .filter_map(|(source, outcome)| match outcome {
                SourceOutcome::Failed { error } => Some(SourceError {
                    source: source.clone(),
                    error: error.clone(),
                }),
                SourceOutcome::Completed { .. } => None,
            })
            .collect();
        errors.extend(chunk_errors);

        let elapsed_seconds = (finished_at - started_at)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        Self {
            run_id,
            started_at,
            finished_at,
            timestamp: finished_at.to_rfc3339(),
            sources,
            total_parsed,
            total_inserted,
            elapsed_seconds,
            errors,
        }
    }

    pub fn summary_markdown(&self) -> String {
        let rows = self
            .sources
            .iter()
            .map(|(source, outcome)| match outcome {
                SourceOutcome::Completed {
                    parsed,
                    inserted,
                    duplicates,
                    failed_chunks,
                } => format!(
                    "- {source}: parsed {parsed}, inserted {inserted}, duplicates {duplicates}, failed chunks {failed_chunks}"
                ),
                SourceOutcome::Failed { error } => format!("- {source}: FAILED ({error})"),
            })
            .collect::<Vec<_>>()
            .join("\n");
        let errors = if self.errors.is_empty() {
            "none".to_string()
        } else {
            self.errors
                .iter()
                .map(|e| format!("- {}: {}", e.source, e.error))
                .collect::<Vec<_>>()
                .join("\n")
        };
        format!(
            "# Pourbase Ingest Run\n\n- Run ID: `{}`\n- Started: {}\n- Finished: {}\n- Elapsed: {:.1}s\n- Parsed: {}\n- Inserted: {}\n\n## Sources\n{}\n\n## Errors\n{}\n",
            self.run_id,
            self.started_at,
            self.finished_at,
            self.elapsed_seconds,
            self.total_parsed,
            self.total_inserted,
            rows,
            errors,
        )
    }
}

/// Write `run_report.json` and `summary.md` under `<root>/<run_id>/`.
pub async fn write_report_files(root: &Path, report: &RunReport) -> Result<PathBuf> {
    let dir = root.join(report.run_id.to_string());
    fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("creating {}", dir.display()))?;

    let json = serde_json::to_vec_pretty(report).context("serializing run report")?;
    fs::write(dir.join("run_report.json"), json)
        .await
        .context("writing run_report.json")?;
    fs::write(dir.join("summary.md"), report.summary_markdown())
        .await
        .context("writing summary.md")?;
    Ok(dir)
}
