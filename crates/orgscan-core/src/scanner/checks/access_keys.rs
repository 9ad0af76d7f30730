use async_trait::async_trait;
use chrono::{Duration, Utc};

use crate::error::CheckError;
use crate::model::{Finding, Pillar, GLOBAL_REGION};
use crate::scanner::{Check, EvidenceSource, ScopedCredentials};

use super::finding_for;

/// Flags active access keys that have not been rotated within the
/// staleness window. Stale-but-inactive keys are ignored.
pub struct StaleAccessKeyCheck {
    pub max_age_days: i64,
}

impl Default for StaleAccessKeyCheck {
    fn default() -> Self {
        Self { max_age_days: 90 }
    }
}

#[async_trait]
impl Check for StaleAccessKeyCheck {
    fn id(&self) -> &'static str {
        "iam-stale-access-key"
    }

    fn name(&self) -> &'static str {
        "Stale access key"
    }

    fn pillar(&self) -> Pillar {
        Pillar::Security
    }

    async fn run(
        &self,
        creds: &ScopedCredentials,
        evidence: &dyn EvidenceSource,
    ) -> Result<Vec<Finding>, CheckError> {
        let cutoff = Utc::now() - Duration::days(self.max_age_days);
        let keys = evidence.list_access_keys(creds).await?;

        Ok(keys
            .into_iter()
            .filter(|k| k.active && k.last_rotated < cutoff)
            .map(|k| {
                let age_days = (Utc::now() - k.last_rotated).num_days();
                finding_for(
                    self,
                    &creds.account_id,
                    GLOBAL_REGION,
                    format!(
                        "access key '{}' for user '{}' last rotated {} days ago",
                        k.key_id, k.user_name, age_days
                    ),
                    // old keys are risk; only flag as high once doubly stale
                    age_days >= self.max_age_days * 2,
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::testutil::{credentials, FakeEvidence};
    use crate::scanner::AccessKeyEvidence;

    fn key(key_id: &str, active: bool, age_days: i64) -> AccessKeyEvidence {
        AccessKeyEvidence {
            user_name: "deploy-bot".to_string(),
            key_id: key_id.to_string(),
            active,
            last_rotated: Utc::now() - Duration::days(age_days),
        }
    }

    #[tokio::test]
    async fn only_active_stale_keys_are_flagged() {
        let evidence = FakeEvidence {
            access_keys: vec![
                key("AKIAOLD", true, 120),
                key("AKIAINACTIVE", false, 400),
                key("AKIAFRESH", true, 10),
            ],
            ..FakeEvidence::default()
        };
        let creds = credentials("111122223333");

        let findings = StaleAccessKeyCheck::default()
            .run(&creds, &evidence)
            .await
            .unwrap();
        assert_eq!(findings.len(), 1);
        assert!(findings[0].evidence.contains("AKIAOLD"));
        // 120 days old: stale but below the double-window HRI threshold
        assert!(!findings[0].hri);
    }

    #[tokio::test]
    async fn doubly_stale_key_is_high_risk() {
        let evidence = FakeEvidence {
            access_keys: vec![key("AKIAANCIENT", true, 365)],
            ..FakeEvidence::default()
        };
        let creds = credentials("111122223333");

        let findings = StaleAccessKeyCheck::default()
            .run(&creds, &evidence)
            .await
            .unwrap();
        assert_eq!(findings.len(), 1);
        assert!(findings[0].hri);
    }
}
