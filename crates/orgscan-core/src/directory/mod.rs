use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::ScanError;
use crate::model::{Account, AccountStatus};

/// One page of accounts from the backing directory service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountPage {
    pub accounts: Vec<Account>,
    pub next_token: Option<String>,
}

/// Capability consumed from the organization's directory service.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    async fn list_accounts(&self, continuation_token: Option<&str>) -> Result<AccountPage>;
}

#[async_trait]
impl<T: DirectoryClient + ?Sized> DirectoryClient for std::sync::Arc<T> {
    async fn list_accounts(&self, continuation_token: Option<&str>) -> Result<AccountPage> {
        (**self).list_accounts(continuation_token).await
    }
}

/// Enumerates member accounts and filters to those in an operable
/// lifecycle state. Read-only; owns no account data.
pub struct AccountDirectory<C: DirectoryClient> {
    client: C,
}

impl<C: DirectoryClient> AccountDirectory<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    /// Page through the directory until no continuation token remains,
    /// then retain only accounts whose status is exactly Active.
    ///
    /// Suspended and closed accounts are excluded unconditionally. An
    /// unreachable directory is fatal for the run: there is nothing to
    /// scan without it.
    pub async fn list_active_accounts(&self) -> Result<Vec<Account>, ScanError> {
        let mut all = Vec::new();
        let mut token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = self
                .client
                .list_accounts(token.as_deref())
                .await
                .map_err(|e| ScanError::DirectoryUnavailable(format!("{e:#}")))?;

            pages += 1;
            debug!(page = pages, accounts = page.accounts.len(), "fetched directory page");
            all.extend(page.accounts);

            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        let total = all.len();
        all.retain(|a| a.status.is_scannable());
        debug!(total, active = all.len(), "filtered directory listing");
        Ok(all)
    }
}

/// HTTP client for a directory service exposing
/// `GET /v1/accounts?continuation_token=...`.
pub struct HttpDirectoryClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ListAccountsResponse {
    accounts: Vec<WireAccount>,
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireAccount {
    id: String,
    name: String,
    status: AccountStatus,
    #[serde(default)]
    ou_path: String,
}

impl HttpDirectoryClient {
    pub fn new(base_url: &str, token: Option<&str>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("orgscan/0.3.0"));

        if let Some(t) = token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", t))
                    .context("Invalid directory token")?,
            );
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl DirectoryClient for HttpDirectoryClient {
    async fn list_accounts(&self, continuation_token: Option<&str>) -> Result<AccountPage> {
        let url = format!("{}/v1/accounts", self.base_url);
        let mut request = self.client.get(&url);
        if let Some(token) = continuation_token {
            request = request.query(&[("continuation_token", token)]);
        }

        let response: ListAccountsResponse = request
            .send()
            .await
            .context("Failed to reach directory service")?
            .error_for_status()
            .context("Directory service returned error")?
            .json()
            .await
            .context("Failed to parse directory response")?;

        Ok(AccountPage {
            accounts: response
                .accounts
                .into_iter()
                .map(|a| Account {
                    id: a.id,
                    name: a.name,
                    status: a.status,
                    ou_path: a.ou_path,
                })
                .collect(),
            next_token: response.next_token,
        })
    }
}
