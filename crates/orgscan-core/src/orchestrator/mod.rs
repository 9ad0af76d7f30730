use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::directory::{AccountDirectory, DirectoryClient};
use crate::error::ScanError;
use crate::model::{Finding, ScanRunResult, UnscannableAccount};
use crate::scanner::{AccountScanOutcome, AccountScanner};
use crate::store::ResilientFindingStore;

/// Fans the account scanner out over every active account, isolates
/// per-account failures, and aggregates one `ScanRunResult`.
///
/// Accounts are independent: no shared mutable state, no ordering
/// requirement between them. Concurrency is bounded to respect the
/// backing APIs' rate limits, not the account count.
pub struct ScanOrchestrator {
    directory: AccountDirectory<Arc<dyn DirectoryClient>>,
    scanner: Arc<AccountScanner>,
    store: Arc<ResilientFindingStore>,
    max_concurrent_accounts: usize,
    account_deadline: Duration,
}

impl ScanOrchestrator {
    pub fn new(
        directory_client: Arc<dyn DirectoryClient>,
        scanner: Arc<AccountScanner>,
        store: Arc<ResilientFindingStore>,
        max_concurrent_accounts: usize,
        account_deadline: Duration,
    ) -> Self {
        Self {
            directory: AccountDirectory::new(directory_client),
            scanner,
            store,
            max_concurrent_accounts: max_concurrent_accounts.max(1),
            account_deadline,
        }
    }

    /// Run one full scan. A fatal error here means the directory was
    /// unreachable; every other failure is captured inside the result.
    pub async fn run(&self) -> Result<ScanRunResult, ScanError> {
        let execution_id = Uuid::new_v4().to_string();
        let accounts = self.directory.list_active_accounts().await?;
        info!(
            execution_id = %execution_id,
            accounts = accounts.len(),
            "starting scan run"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_accounts));
        let mut tasks = JoinSet::new();
        let mut task_accounts: HashMap<tokio::task::Id, String> = HashMap::new();

        for account in &accounts {
            let task_account = account.clone();
            let scanner = Arc::clone(&self.scanner);
            let semaphore = Arc::clone(&semaphore);
            let deadline = self.account_deadline;

            let handle = tasks.spawn(async move {
                // the semaphore is never closed
                let _permit = semaphore.acquire_owned().await.ok();
                match tokio::time::timeout(deadline, scanner.scan(&task_account)).await {
                    Ok(outcome) => outcome,
                    Err(_) => AccountScanOutcome::Unscannable(UnscannableAccount {
                        account_id: task_account.id.clone(),
                        reason: "account scan deadline exceeded".to_string(),
                    }),
                }
            });
            task_accounts.insert(handle.id(), account.id.clone());
        }

        let mut findings: Vec<Finding> = Vec::new();
        let mut unscannable: Vec<UnscannableAccount> = Vec::new();

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, AccountScanOutcome::Scanned {
                    account_id,
                    findings: mut produced,
                    checks_skipped,
                })) => {
                    if checks_skipped > 0 {
                        warn!(account_id = %account_id, checks_skipped, "account scanned with skipped checks");
                    }
                    findings.append(&mut produced);
                }
                Ok((_, AccountScanOutcome::Unscannable(marker))) => {
                    unscannable.push(marker);
                }
                Err(join_err) => {
                    // a panicking scan task must not take the run down
                    let account_id = task_accounts
                        .get(&join_err.id())
                        .cloned()
                        .unwrap_or_else(|| "unknown".to_string());
                    warn!(account_id = %account_id, %join_err, "scan task failed");
                    unscannable.push(UnscannableAccount {
                        account_id,
                        reason: format!("scan task failed: {join_err}"),
                    });
                }
            }
        }

        for finding in &mut findings {
            finding.execution_id = execution_id.clone();
        }

        let batch = self.store.store_batch(&findings).await;
        let result = ScanRunResult {
            execution_id,
            accounts_attempted: accounts.len(),
            accounts_unscannable: unscannable.len(),
            findings_produced: findings.len(),
            findings_stored: batch.success,
            findings_failed: batch.failed,
            unscannable,
        };

        info!(
            execution_id = %result.execution_id,
            attempted = result.accounts_attempted,
            unscannable = result.accounts_unscannable,
            stored = result.findings_stored,
            failed = result.findings_failed,
            "scan run complete"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::AccountPage;
    use crate::error::CheckError;
    use crate::model::{Account, AccountStatus};
    use crate::retry::RetryPolicy;
    use crate::scanner::testutil::{FakeBroker, FakeEvidence};
    use crate::scanner::{
        AccessKeyEvidence, BucketEvidence, EvidenceSource, RootIdentityEvidence,
        ScopedCredentials, VolumeEvidence,
    };
    use crate::store::{FindingFilter, MemoryBackend, StoreBackend};
    use anyhow::Result as AnyResult;
    use async_trait::async_trait;

    struct StaticDirectory {
        accounts: Vec<Account>,
    }

    #[async_trait]
    impl DirectoryClient for StaticDirectory {
        async fn list_accounts(&self, _token: Option<&str>) -> AnyResult<AccountPage> {
            Ok(AccountPage {
                accounts: self.accounts.clone(),
                next_token: None,
            })
        }
    }

    struct DownDirectory;

    #[async_trait]
    impl DirectoryClient for DownDirectory {
        async fn list_accounts(&self, _token: Option<&str>) -> AnyResult<AccountPage> {
            anyhow::bail!("connection refused")
        }
    }

    fn account(id: &str) -> Account {
        Account {
            id: id.to_string(),
            name: format!("account-{id}"),
            status: AccountStatus::Active,
            ou_path: "/root/workloads".to_string(),
        }
    }

    fn violating_evidence() -> FakeEvidence {
        FakeEvidence {
            root_mfa_devices: 0,
            ..FakeEvidence::default()
        }
    }

    fn orchestrator_over(
        accounts: Vec<Account>,
        evidence: Arc<dyn EvidenceSource>,
        deny: Vec<String>,
        backend: Arc<MemoryBackend>,
    ) -> ScanOrchestrator {
        let scanner = Arc::new(AccountScanner::with_default_checks(
            Arc::new(FakeBroker { deny }),
            evidence,
            Duration::from_secs(30),
        ));
        let store = Arc::new(ResilientFindingStore::new(
            backend,
            RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(100)),
        ));
        ScanOrchestrator::new(
            Arc::new(StaticDirectory { accounts }),
            scanner,
            store,
            4,
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn one_failed_account_does_not_affect_the_others() {
        let accounts: Vec<Account> = (1..=4).map(|i| account(&format!("{i:012}"))).collect();
        let backend = Arc::new(MemoryBackend::new());
        let orchestrator = orchestrator_over(
            accounts,
            Arc::new(violating_evidence()),
            vec!["000000000002".to_string()],
            backend.clone(),
        );

        let result = orchestrator.run().await.unwrap();

        assert_eq!(result.accounts_attempted, 4);
        assert_eq!(result.accounts_unscannable, 1);
        assert_eq!(result.unscannable[0].account_id, "000000000002");
        // each of the 3 scanned accounts trips the root MFA check
        assert_eq!(result.findings_produced, 3);
        assert_eq!(result.findings_stored, 3);
        assert_eq!(result.findings_failed, 0);
        assert_eq!(backend.len().await, 3);
    }

    #[tokio::test]
    async fn unreachable_directory_aborts_the_run() {
        let scanner = Arc::new(AccountScanner::with_default_checks(
            Arc::new(FakeBroker { deny: vec![] }),
            Arc::new(FakeEvidence::default()),
            Duration::from_secs(30),
        ));
        let store = Arc::new(ResilientFindingStore::new(
            Arc::new(MemoryBackend::new()),
            RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(100)),
        ));
        let orchestrator = ScanOrchestrator::new(
            Arc::new(DownDirectory),
            scanner,
            store,
            4,
            Duration::from_secs(60),
        );

        let err = orchestrator.run().await.unwrap_err();
        assert!(matches!(err, ScanError::DirectoryUnavailable(_)));
    }

    #[tokio::test]
    async fn every_stored_finding_carries_the_run_execution_id() {
        let backend = Arc::new(MemoryBackend::new());
        let orchestrator = orchestrator_over(
            vec![account("000000000001")],
            Arc::new(violating_evidence()),
            vec![],
            backend.clone(),
        );

        let result = orchestrator.run().await.unwrap();
        assert!(!result.execution_id.is_empty());

        let stored = backend.query(&FindingFilter::default()).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored.iter().all(|f| f.execution_id == result.execution_id));
    }

    /// Evidence source that hangs long enough to blow the whole-account
    /// deadline.
    struct HangingEvidence;

    #[async_trait]
    impl EvidenceSource for HangingEvidence {
        async fn list_buckets(
            &self,
            _creds: &ScopedCredentials,
        ) -> Result<Vec<BucketEvidence>, CheckError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Vec::new())
        }

        async fn list_volumes(
            &self,
            _creds: &ScopedCredentials,
        ) -> Result<Vec<VolumeEvidence>, CheckError> {
            Ok(Vec::new())
        }

        async fn root_identity(
            &self,
            _creds: &ScopedCredentials,
        ) -> Result<RootIdentityEvidence, CheckError> {
            Ok(RootIdentityEvidence {
                mfa_device_count: 1,
            })
        }

        async fn list_access_keys(
            &self,
            _creds: &ScopedCredentials,
        ) -> Result<Vec<AccessKeyEvidence>, CheckError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expiry_marks_the_account_unscannable() {
        let backend = Arc::new(MemoryBackend::new());
        let scanner = Arc::new(AccountScanner::with_default_checks(
            Arc::new(FakeBroker { deny: vec![] }),
            Arc::new(HangingEvidence),
            // per-check deadline longer than the account deadline so the
            // whole-account timeout is the one that fires
            Duration::from_secs(7200),
        ));
        let store = Arc::new(ResilientFindingStore::new(
            backend.clone(),
            RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(100)),
        ));
        let orchestrator = ScanOrchestrator::new(
            Arc::new(StaticDirectory {
                accounts: vec![account("000000000009")],
            }),
            scanner,
            store,
            4,
            Duration::from_secs(10),
        );

        let result = orchestrator.run().await.unwrap();
        assert_eq!(result.accounts_unscannable, 1);
        assert!(result.unscannable[0].reason.contains("deadline"));
        assert_eq!(result.findings_produced, 0);
        assert!(backend.is_empty().await);
    }
}
