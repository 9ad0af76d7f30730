use thiserror::Error;

/// Fatal errors for a whole scan run.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The directory service could not be reached. There is nothing to scan
    /// without it, so the orchestrator aborts the run.
    #[error("directory service unavailable: {0}")]
    DirectoryUnavailable(String),
}

/// Role assumption failure for one account. Isolated: the account is
/// recorded as unscannable and the run continues.
#[derive(Debug, Clone, Error)]
pub enum AccessError {
    #[error("access denied assuming role in account {account_id}: {reason}")]
    Denied { account_id: String, reason: String },
    #[error("no cross-account trust established for account {account_id}")]
    TrustNotEstablished { account_id: String },
    #[error("session expired for account {account_id}")]
    SessionExpired { account_id: String },
}

/// A single check failing to complete. Isolated: the check is skipped and
/// the remaining checks in the account continue.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("api error during check: {0}")]
    Api(String),
    #[error("missing permission for check: {0}")]
    PermissionGap(String),
    #[error("check exceeded its deadline")]
    DeadlineExceeded,
}

/// Errors from the finding store backend. Only `Throttled` is retryable.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend signalled rate limiting. Retried with backoff.
    #[error("store backend throttled the write")]
    Throttled,
    /// Validation failure: required fields missing. Never written, never
    /// retried.
    #[error("finding rejected before write: missing fields {0:?}")]
    Invalid(Vec<&'static str>),
    /// Any non-throttle backend rejection (permission denied, malformed
    /// key). Never retried.
    #[error("store backend rejected the write: {0}")]
    Rejected(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Throttled)
    }
}
