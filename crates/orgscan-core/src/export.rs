use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::model::Finding;
use crate::store::{FindingFilter, StoreBackend};

/// A persisted finding reshaped into the partner-defined export schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedFinding {
    pub account_id: String,
    pub check_id: String,
    pub pillar: String,
    pub title: String,
    pub high_risk: bool,
    pub detail: String,
    pub region: String,
    pub observed_at: DateTime<Utc>,
    pub scan_execution_id: String,
}

impl From<&Finding> for ExportedFinding {
    fn from(f: &Finding) -> Self {
        Self {
            account_id: f.account_id.clone(),
            check_id: f.check_id.clone(),
            pillar: f.pillar.label().to_string(),
            title: f.check_name.clone(),
            high_risk: f.hri,
            detail: f.evidence.clone(),
            region: f.region.clone(),
            observed_at: f.timestamp,
            scan_execution_id: f.execution_id.clone(),
        }
    }
}

/// Destination the exporter republishes findings to. Rendering and
/// transport are owned by the sink implementation.
#[async_trait]
pub trait SinkWriter: Send + Sync {
    async fn write(&self, findings: &[ExportedFinding]) -> Result<()>;
}

/// Reads persisted findings by time range/account and republishes them
/// through a sink. Runs independently of scan runs; only ever reads the
/// store.
pub struct Exporter {
    backend: Arc<dyn StoreBackend>,
    sink: Arc<dyn SinkWriter>,
}

impl Exporter {
    pub fn new(backend: Arc<dyn StoreBackend>, sink: Arc<dyn SinkWriter>) -> Self {
        Self { backend, sink }
    }

    /// Export everything matching `filter`. Returns the number of
    /// findings republished.
    pub async fn export(&self, filter: &FindingFilter) -> Result<usize> {
        let findings = self.backend.query(filter).await?;
        let exported: Vec<ExportedFinding> = findings.iter().map(ExportedFinding::from).collect();

        if exported.is_empty() {
            info!("no findings matched export filter");
            return Ok(0);
        }

        self.sink.write(&exported).await?;
        info!(count = exported.len(), "exported findings");
        Ok(exported.len())
    }
}
