pub mod checks;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{AccessError, CheckError};
use crate::model::{Account, Finding, Pillar, UnscannableAccount};

/// Temporary credentials scoped to one target account, obtained through a
/// cross-account trust relationship. Bounded validity window.
#[derive(Debug, Clone)]
pub struct ScopedCredentials {
    pub account_id: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Capability that issues scoped credentials for a target account.
#[async_trait]
pub trait RoleBroker: Send + Sync {
    async fn assume_role(&self, account_id: &str) -> Result<ScopedCredentials, AccessError>;
}

/// An object-storage bucket as observed in the target account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketEvidence {
    pub name: String,
    pub region: String,
    pub has_public_access_block: bool,
}

/// A block-storage volume as observed in the target account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeEvidence {
    pub volume_id: String,
    pub region: String,
    pub encrypted: bool,
}

/// Root identity posture for the target account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootIdentityEvidence {
    pub mfa_device_count: u32,
}

/// A long-lived access key as observed in the target account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessKeyEvidence {
    pub user_name: String,
    pub key_id: String,
    pub active: bool,
    pub last_rotated: DateTime<Utc>,
}

/// Read-only resource enumeration within one target account, performed
/// with scoped credentials. Checks consume this and stay pure predicates.
#[async_trait]
pub trait EvidenceSource: Send + Sync {
    async fn list_buckets(
        &self,
        creds: &ScopedCredentials,
    ) -> Result<Vec<BucketEvidence>, CheckError>;

    async fn list_volumes(
        &self,
        creds: &ScopedCredentials,
    ) -> Result<Vec<VolumeEvidence>, CheckError>;

    async fn root_identity(
        &self,
        creds: &ScopedCredentials,
    ) -> Result<RootIdentityEvidence, CheckError>;

    async fn list_access_keys(
        &self,
        creds: &ScopedCredentials,
    ) -> Result<Vec<AccessKeyEvidence>, CheckError>;
}

/// One security check: given scoped credentials and an evidence source,
/// produce zero or more findings. Checks never mutate target-account state
/// and never abort sibling checks.
#[async_trait]
pub trait Check: Send + Sync {
    fn id(&self) -> &'static str;
    fn name(&self) -> &'static str;
    fn pillar(&self) -> Pillar;

    async fn run(
        &self,
        creds: &ScopedCredentials,
        evidence: &dyn EvidenceSource,
    ) -> Result<Vec<Finding>, CheckError>;
}

/// Outcome of scanning one account. Failures are captured here as data
/// rather than crossing the fan-out boundary as errors.
#[derive(Debug)]
pub enum AccountScanOutcome {
    Scanned {
        account_id: String,
        findings: Vec<Finding>,
        checks_skipped: usize,
    },
    Unscannable(UnscannableAccount),
}

/// Scans a single account: assume the scoped role, then run the check
/// battery in order, isolating each check's failure.
pub struct AccountScanner {
    broker: Arc<dyn RoleBroker>,
    evidence: Arc<dyn EvidenceSource>,
    checks: Vec<Box<dyn Check>>,
    check_deadline: Duration,
}

impl AccountScanner {
    pub fn new(
        broker: Arc<dyn RoleBroker>,
        evidence: Arc<dyn EvidenceSource>,
        checks: Vec<Box<dyn Check>>,
        check_deadline: Duration,
    ) -> Self {
        Self {
            broker,
            evidence,
            checks,
            check_deadline,
        }
    }

    /// Scan with the default battery.
    pub fn with_default_checks(
        broker: Arc<dyn RoleBroker>,
        evidence: Arc<dyn EvidenceSource>,
        check_deadline: Duration,
    ) -> Self {
        Self::new(broker, evidence, checks::default_battery(), check_deadline)
    }

    pub async fn scan(&self, account: &Account) -> AccountScanOutcome {
        let creds = match self.broker.assume_role(&account.id).await {
            Ok(creds) => creds,
            Err(err) => {
                warn!(account_id = %account.id, %err, "role assumption failed, account unscannable");
                return AccountScanOutcome::Unscannable(UnscannableAccount {
                    account_id: account.id.clone(),
                    reason: err.to_string(),
                });
            }
        };

        let mut findings = Vec::new();
        let mut skipped = 0usize;

        for check in &self.checks {
            let run = check.run(&creds, self.evidence.as_ref());
            match tokio::time::timeout(self.check_deadline, run).await {
                Ok(Ok(mut produced)) => {
                    debug!(
                        account_id = %account.id,
                        check_id = check.id(),
                        findings = produced.len(),
                        "check completed"
                    );
                    findings.append(&mut produced);
                }
                Ok(Err(err)) => {
                    warn!(
                        account_id = %account.id,
                        check_id = check.id(),
                        %err,
                        "check failed, skipping"
                    );
                    skipped += 1;
                }
                Err(_) => {
                    warn!(
                        account_id = %account.id,
                        check_id = check.id(),
                        "check exceeded deadline, skipping"
                    );
                    skipped += 1;
                }
            }
        }

        AccountScanOutcome::Scanned {
            account_id: account.id.clone(),
            findings,
            checks_skipped: skipped,
        }
    }
}
