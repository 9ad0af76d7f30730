use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sentinel region for checks that evaluate account-global state.
pub const GLOBAL_REGION: &str = "global";

/// Lifecycle status of a member account as reported by the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccountStatus {
    Active,
    Suspended,
    Closed,
    /// Any status string the directory emits that we do not recognize.
    /// Never scanned.
    #[serde(other)]
    Unknown,
}

impl AccountStatus {
    pub fn is_scannable(&self) -> bool {
        matches!(self, AccountStatus::Active)
    }
}

/// A member account discovered in the organization. Produced once per
/// discovery run and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    pub status: AccountStatus,
    pub ou_path: String,
}

/// Category grouping for a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pillar {
    Security,
    Cost,
    Reliability,
    Performance,
    Operations,
}

impl Pillar {
    pub fn label(&self) -> &str {
        match self {
            Pillar::Security => "Security",
            Pillar::Cost => "Cost Optimization",
            Pillar::Reliability => "Reliability",
            Pillar::Performance => "Performance",
            Pillar::Operations => "Operational Excellence",
        }
    }
}

/// A single check result observed in a target account.
///
/// The pair (`account_id`, `check_id`) is the natural identity: the store
/// upserts on it, so a rescan overwrites `evidence`, `timestamp`, `hri` and
/// `execution_id` in place rather than creating a duplicate record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub account_id: String,
    pub check_id: String,
    pub pillar: Pillar,
    pub check_name: String,
    /// High-risk indicator. Derived solely by the producing check; the
    /// store never infers or overrides it.
    pub hri: bool,
    pub evidence: String,
    pub region: String,
    pub timestamp: DateTime<Utc>,
    pub execution_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_tags: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_impact: Option<f64>,
}

impl Finding {
    /// Storage key for the idempotent upsert.
    pub fn storage_key(&self) -> (String, String) {
        (self.account_id.clone(), self.check_id.clone())
    }

    /// Returns the names of required fields that are empty, if any.
    /// A finding with missing fields is rejected before any write attempt.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.account_id.trim().is_empty() {
            missing.push("account_id");
        }
        if self.check_id.trim().is_empty() {
            missing.push("check_id");
        }
        if self.check_name.trim().is_empty() {
            missing.push("check_name");
        }
        if self.evidence.trim().is_empty() {
            missing.push("evidence");
        }
        if self.region.trim().is_empty() {
            missing.push("region");
        }
        if self.execution_id.trim().is_empty() {
            missing.push("execution_id");
        }
        missing
    }
}

/// Operational marker for an account that could not be scanned at all
/// (role assumption failed or the whole-account deadline expired).
/// Not a Finding: it records cause, not check output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnscannableAccount {
    pub account_id: String,
    pub reason: String,
}

/// Aggregate result of one orchestration run. Ephemeral; reported to the
/// caller and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRunResult {
    pub execution_id: String,
    pub accounts_attempted: usize,
    pub accounts_unscannable: usize,
    pub findings_produced: usize,
    pub findings_stored: usize,
    pub findings_failed: usize,
    pub unscannable: Vec<UnscannableAccount>,
}

impl ScanRunResult {
    pub fn accounts_scanned(&self) -> usize {
        self.accounts_attempted - self.accounts_unscannable
    }

    pub fn hri_summary(findings: &[Finding]) -> (usize, usize) {
        let high = findings.iter().filter(|f| f.hri).count();
        (high, findings.len() - high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding() -> Finding {
        Finding {
            account_id: "111122223333".to_string(),
            check_id: "s3-public-bucket".to_string(),
            pillar: Pillar::Security,
            check_name: "Public object-storage bucket".to_string(),
            hri: true,
            evidence: "bucket 'logs' has no public access block".to_string(),
            region: GLOBAL_REGION.to_string(),
            timestamp: Utc::now(),
            execution_id: "exec-1".to_string(),
            resource_tags: None,
            cost_impact: None,
        }
    }

    #[test]
    fn complete_finding_has_no_missing_fields() {
        assert!(finding().missing_fields().is_empty());
    }

    #[test]
    fn blank_required_fields_are_reported() {
        let mut f = finding();
        f.account_id = "  ".to_string();
        f.evidence = String::new();
        assert_eq!(f.missing_fields(), vec!["account_id", "evidence"]);
    }

    #[test]
    fn storage_key_pairs_account_and_check() {
        let f = finding();
        assert_eq!(
            f.storage_key(),
            ("111122223333".to_string(), "s3-public-bucket".to_string())
        );
    }

    #[test]
    fn only_active_accounts_are_scannable() {
        assert!(AccountStatus::Active.is_scannable());
        assert!(!AccountStatus::Suspended.is_scannable());
        assert!(!AccountStatus::Closed.is_scannable());
        assert!(!AccountStatus::Unknown.is_scannable());
    }

    #[test]
    fn unknown_status_string_deserializes_to_unknown() {
        let status: AccountStatus = serde_json::from_str("\"PENDING_CLOSURE\"").unwrap();
        assert_eq!(status, AccountStatus::Unknown);
    }
}
