use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use orgscan_core::directory::{AccountPage, DirectoryClient};
use orgscan_core::error::{AccessError, CheckError};
use orgscan_core::scanner::{
    AccessKeyEvidence, BucketEvidence, EvidenceSource, RoleBroker, RootIdentityEvidence,
    ScopedCredentials, VolumeEvidence,
};
use orgscan_core::Account;

const PAGE_SIZE: usize = 10;

/// A local scan environment loaded from a JSON file: the organization's
/// accounts plus per-account resource listings. Lets the full pipeline run
/// end-to-end without live backing services.
#[derive(Debug, Deserialize)]
pub struct FixtureEnv {
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub evidence: HashMap<String, AccountEvidence>,
    /// Accounts for which role assumption should fail.
    #[serde(default)]
    pub unassumable: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AccountEvidence {
    #[serde(default)]
    pub buckets: Vec<BucketEvidence>,
    #[serde(default)]
    pub volumes: Vec<VolumeEvidence>,
    #[serde(default = "one")]
    pub root_mfa_devices: u32,
    #[serde(default)]
    pub access_keys: Vec<AccessKeyEvidence>,
}

fn one() -> u32 {
    1
}

impl FixtureEnv {
    pub fn load(path: &Path) -> Result<Arc<Self>> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixture file '{}'", path.display()))?;
        let env: FixtureEnv = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse fixture file '{}'", path.display()))?;
        Ok(Arc::new(env))
    }
}

/// Directory client over the fixture accounts, paged like the real
/// service so pagination is exercised locally too.
pub struct FixtureDirectory(pub Arc<FixtureEnv>);

#[async_trait]
impl DirectoryClient for FixtureDirectory {
    async fn list_accounts(&self, continuation_token: Option<&str>) -> Result<AccountPage> {
        let start = match continuation_token {
            None => 0,
            Some(token) => token
                .parse::<usize>()
                .context("malformed continuation token")?,
        };
        let end = (start + PAGE_SIZE).min(self.0.accounts.len());
        let next_token = (end < self.0.accounts.len()).then(|| end.to_string());

        Ok(AccountPage {
            accounts: self.0.accounts[start..end].to_vec(),
            next_token,
        })
    }
}

pub struct FixtureBroker(pub Arc<FixtureEnv>);

#[async_trait]
impl RoleBroker for FixtureBroker {
    async fn assume_role(&self, account_id: &str) -> Result<ScopedCredentials, AccessError> {
        if self.0.unassumable.iter().any(|a| a == account_id) {
            return Err(AccessError::TrustNotEstablished {
                account_id: account_id.to_string(),
            });
        }
        Ok(ScopedCredentials {
            account_id: account_id.to_string(),
            access_key_id: "ASIAFIXTURE".to_string(),
            secret_access_key: "fixture".to_string(),
            session_token: "fixture".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
        })
    }
}

pub struct FixtureEvidenceSource(pub Arc<FixtureEnv>);

impl FixtureEvidenceSource {
    fn for_account(&self, account_id: &str) -> Option<&AccountEvidence> {
        self.0.evidence.get(account_id)
    }
}

#[async_trait]
impl EvidenceSource for FixtureEvidenceSource {
    async fn list_buckets(
        &self,
        creds: &ScopedCredentials,
    ) -> Result<Vec<BucketEvidence>, CheckError> {
        Ok(self
            .for_account(&creds.account_id)
            .map(|e| e.buckets.clone())
            .unwrap_or_default())
    }

    async fn list_volumes(
        &self,
        creds: &ScopedCredentials,
    ) -> Result<Vec<VolumeEvidence>, CheckError> {
        Ok(self
            .for_account(&creds.account_id)
            .map(|e| e.volumes.clone())
            .unwrap_or_default())
    }

    async fn root_identity(
        &self,
        creds: &ScopedCredentials,
    ) -> Result<RootIdentityEvidence, CheckError> {
        Ok(RootIdentityEvidence {
            mfa_device_count: self
                .for_account(&creds.account_id)
                .map(|e| e.root_mfa_devices)
                .unwrap_or(1),
        })
    }

    async fn list_access_keys(
        &self,
        creds: &ScopedCredentials,
    ) -> Result<Vec<AccessKeyEvidence>, CheckError> {
        Ok(self
            .for_account(&creds.account_id)
            .map(|e| e.access_keys.clone())
            .unwrap_or_default())
    }
}
