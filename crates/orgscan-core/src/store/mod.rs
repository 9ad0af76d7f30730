use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::model::Finding;
use crate::retry::RetryPolicy;

/// Filter for reading persisted findings back out of the store. Used by
/// the export sink and the CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FindingFilter {
    pub account_id: Option<String>,
    pub execution_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl FindingFilter {
    pub fn matches(&self, finding: &Finding) -> bool {
        if let Some(account_id) = &self.account_id {
            if &finding.account_id != account_id {
                return false;
            }
        }
        if let Some(execution_id) = &self.execution_id {
            if &finding.execution_id != execution_id {
                return false;
            }
        }
        if let Some(since) = self.since {
            if finding.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if finding.timestamp > until {
                return false;
            }
        }
        true
    }
}

/// Key-value backend for persisted findings, keyed by
/// (account_id, check_id). Must report rate limiting as
/// `StoreError::Throttled` so the store can tell it apart from
/// non-retryable rejections.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Idempotent upsert: create the record if absent, overwrite in place
    /// if present.
    async fn put_finding(&self, finding: &Finding) -> Result<(), StoreError>;

    async fn get_finding(
        &self,
        account_id: &str,
        check_id: &str,
    ) -> Result<Option<Finding>, StoreError>;

    async fn query(&self, filter: &FindingFilter) -> Result<Vec<Finding>, StoreError>;
}

/// In-memory backend for tests and local runs.
#[derive(Default)]
pub struct MemoryBackend {
    records: RwLock<BTreeMap<(String, String), Finding>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl StoreBackend for MemoryBackend {
    async fn put_finding(&self, finding: &Finding) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .insert(finding.storage_key(), finding.clone());
        Ok(())
    }

    async fn get_finding(
        &self,
        account_id: &str,
        check_id: &str,
    ) -> Result<Option<Finding>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .get(&(account_id.to_string(), check_id.to_string()))
            .cloned())
    }

    async fn query(&self, filter: &FindingFilter) -> Result<Vec<Finding>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|f| filter.matches(f))
            .cloned()
            .collect())
    }
}

/// File-backed backend persisting findings as a JSON map keyed by
/// `account_id/check_id`. Suitable for local runs and the CLI; a
/// production deployment implements `StoreBackend` against its own
/// key-value service.
pub struct JsonFileBackend {
    path: std::path::PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<BTreeMap<String, Finding>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| StoreError::Rejected(format!("corrupt store file: {e}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(StoreError::Rejected(format!("cannot read store file: {e}"))),
        }
    }

    async fn save(&self, records: &BTreeMap<String, Finding>) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(records)
            .map_err(|e| StoreError::Rejected(format!("cannot serialize store: {e}")))?;
        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|e| StoreError::Rejected(format!("cannot write store file: {e}")))
    }

    fn file_key(account_id: &str, check_id: &str) -> String {
        format!("{account_id}/{check_id}")
    }
}

#[async_trait]
impl StoreBackend for JsonFileBackend {
    async fn put_finding(&self, finding: &Finding) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        records.insert(
            Self::file_key(&finding.account_id, &finding.check_id),
            finding.clone(),
        );
        self.save(&records).await
    }

    async fn get_finding(
        &self,
        account_id: &str,
        check_id: &str,
    ) -> Result<Option<Finding>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self
            .load()
            .await?
            .remove(&Self::file_key(account_id, check_id)))
    }

    async fn query(&self, filter: &FindingFilter) -> Result<Vec<Finding>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self
            .load()
            .await?
            .into_values()
            .filter(|f| filter.matches(f))
            .collect())
    }
}

/// Counts from one batch write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStoreResult {
    pub success: usize,
    pub failed: usize,
    pub total: usize,
}

/// Accepts findings and persists them with an idempotent upsert, retrying
/// throttled writes with exponential backoff and jitter.
///
/// Validation happens before any write attempt: a finding with missing
/// required fields is rejected whole, never partially written. Any
/// non-throttle backend error fails immediately. The retry attempt counter
/// resets per finding.
pub struct ResilientFindingStore {
    backend: Arc<dyn StoreBackend>,
    retry: RetryPolicy,
}

impl ResilientFindingStore {
    pub fn new(backend: Arc<dyn StoreBackend>, retry: RetryPolicy) -> Self {
        Self { backend, retry }
    }

    pub fn backend(&self) -> &Arc<dyn StoreBackend> {
        &self.backend
    }

    pub async fn store(&self, finding: &Finding) -> Result<(), StoreError> {
        let missing = finding.missing_fields();
        if !missing.is_empty() {
            return Err(StoreError::Invalid(missing));
        }

        self.retry
            .call(StoreError::is_retryable, || self.backend.put_finding(finding))
            .await
    }

    /// Store each finding independently. Exhausted retries or rejections
    /// count that finding as failed; the batch always continues.
    pub async fn store_batch(&self, findings: &[Finding]) -> BatchStoreResult {
        self.note_key_collisions(findings);

        let mut success = 0usize;
        let mut failed = 0usize;

        for finding in findings {
            match self.store(finding).await {
                Ok(()) => success += 1,
                Err(err) => {
                    warn!(
                        account_id = %finding.account_id,
                        check_id = %finding.check_id,
                        %err,
                        "failed to store finding"
                    );
                    failed += 1;
                }
            }
        }

        BatchStoreResult {
            success,
            failed,
            total: findings.len(),
        }
    }

    /// Multiple findings for one (account_id, check_id) within a batch
    /// collapse to a single record; last write wins. Observable but kept:
    /// the storage key is deliberately not widened per resource.
    fn note_key_collisions(&self, findings: &[Finding]) {
        let mut seen = HashSet::new();
        for finding in findings {
            if !seen.insert(finding.storage_key()) {
                debug!(
                    account_id = %finding.account_id,
                    check_id = %finding.check_id,
                    "batch contains multiple findings for one storage key; last write wins"
                );
            }
        }
    }
}
