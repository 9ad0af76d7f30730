use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Scan configuration loaded from `orgscan.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Upper bound on accounts scanned concurrently. Sized to the backing
    /// APIs' rate limits, not to the account count.
    pub max_concurrent_accounts: usize,

    /// Whole-account deadline in seconds. On expiry the account is recorded
    /// as unscannable, same as a role-assumption failure.
    pub account_deadline_secs: u64,

    /// Per-check deadline in seconds. An overrunning check is skipped, not
    /// the whole account.
    pub check_deadline_secs: u64,

    pub retry: RetryConfig,

    /// Base URL of the directory service, when using the HTTP client.
    pub directory_endpoint: Option<String>,

    /// Bearer token for the directory service.
    pub directory_token: Option<String>,
}

/// Backoff parameters for retrying throttled writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_concurrent_accounts: 8,
            account_deadline_secs: 300,
            check_deadline_secs: 60,
            retry: RetryConfig::default(),
            directory_endpoint: None,
            directory_token: None,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 200,
            max_delay_ms: 10_000,
        }
    }
}

impl ScanConfig {
    /// Load configuration from a TOML file, falling back to defaults for
    /// any key not present.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file '{}'", path.display()))
    }

    pub fn account_deadline(&self) -> Duration {
        Duration::from_secs(self.account_deadline_secs)
    }

    pub fn check_deadline(&self) -> Duration {
        Duration::from_secs(self.check_deadline_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_applied() {
        let config = ScanConfig::default();
        assert_eq!(config.max_concurrent_accounts, 8);
        assert_eq!(config.retry.max_attempts, 5);
        assert!(config.directory_endpoint.is_none());
    }

    #[test]
    fn partial_toml_keeps_defaults_for_missing_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
max_concurrent_accounts = 2

[retry]
max_attempts = 3
"#
        )
        .unwrap();

        let config = ScanConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.max_concurrent_accounts, 2);
        assert_eq!(config.retry.max_attempts, 3);
        // untouched keys fall back to defaults
        assert_eq!(config.retry.base_delay_ms, 200);
        assert_eq!(config.account_deadline_secs, 300);
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "max_concurrent_accounts = \"lots\"").unwrap();
        assert!(ScanConfig::load_from_path(file.path()).is_err());
    }
}
