use async_trait::async_trait;

use crate::error::CheckError;
use crate::model::{Finding, Pillar, GLOBAL_REGION};
use crate::scanner::{Check, EvidenceSource, ScopedCredentials};

use super::finding_for;

/// Flags accounts whose root identity has zero MFA devices enrolled.
/// Account-global: reported under the global region sentinel.
pub struct RootMfaCheck;

#[async_trait]
impl Check for RootMfaCheck {
    fn id(&self) -> &'static str {
        "iam-root-no-mfa"
    }

    fn name(&self) -> &'static str {
        "Root identity without multi-factor"
    }

    fn pillar(&self) -> Pillar {
        Pillar::Security
    }

    async fn run(
        &self,
        creds: &ScopedCredentials,
        evidence: &dyn EvidenceSource,
    ) -> Result<Vec<Finding>, CheckError> {
        let root = evidence.root_identity(creds).await?;

        if root.mfa_device_count > 0 {
            return Ok(Vec::new());
        }

        Ok(vec![finding_for(
            self,
            &creds.account_id,
            GLOBAL_REGION,
            "root identity has no MFA device enrolled".to_string(),
            true,
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::testutil::{credentials, FakeEvidence};

    #[tokio::test]
    async fn missing_root_mfa_is_a_global_hri_finding() {
        let evidence = FakeEvidence {
            root_mfa_devices: 0,
            ..FakeEvidence::default()
        };
        let creds = credentials("111122223333");

        let findings = RootMfaCheck.run(&creds, &evidence).await.unwrap();
        assert_eq!(findings.len(), 1);
        assert!(findings[0].hri);
        assert_eq!(findings[0].region, GLOBAL_REGION);
    }

    #[tokio::test]
    async fn enrolled_mfa_produces_nothing() {
        let evidence = FakeEvidence {
            root_mfa_devices: 2,
            ..FakeEvidence::default()
        };
        let creds = credentials("111122223333");

        let findings = RootMfaCheck.run(&creds, &evidence).await.unwrap();
        assert!(findings.is_empty());
    }
}
