use async_trait::async_trait;

use crate::error::CheckError;
use crate::model::{Finding, Pillar};
use crate::scanner::{Check, EvidenceSource, ScopedCredentials};

use super::finding_for;

/// Flags object-storage buckets with no public-access block configured.
pub struct PublicBucketCheck;

#[async_trait]
impl Check for PublicBucketCheck {
    fn id(&self) -> &'static str {
        "s3-public-bucket"
    }

    fn name(&self) -> &'static str {
        "Public object-storage bucket"
    }

    fn pillar(&self) -> Pillar {
        Pillar::Security
    }

    async fn run(
        &self,
        creds: &ScopedCredentials,
        evidence: &dyn EvidenceSource,
    ) -> Result<Vec<Finding>, CheckError> {
        let buckets = evidence.list_buckets(creds).await?;

        Ok(buckets
            .into_iter()
            .filter(|b| !b.has_public_access_block)
            .map(|b| {
                finding_for(
                    self,
                    &creds.account_id,
                    &b.region,
                    format!("bucket '{}' has no public access block configured", b.name),
                    true,
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::testutil::{credentials, FakeEvidence};
    use crate::scanner::BucketEvidence;

    #[tokio::test]
    async fn only_unblocked_buckets_are_flagged() {
        let evidence = FakeEvidence {
            buckets: vec![
                BucketEvidence {
                    name: "open".to_string(),
                    region: "eu-west-1".to_string(),
                    has_public_access_block: false,
                },
                BucketEvidence {
                    name: "closed".to_string(),
                    region: "eu-west-1".to_string(),
                    has_public_access_block: true,
                },
            ],
            ..FakeEvidence::default()
        };
        let creds = credentials("111122223333");

        let findings = PublicBucketCheck.run(&creds, &evidence).await.unwrap();
        assert_eq!(findings.len(), 1);
        assert!(findings[0].hri);
        assert!(findings[0].evidence.contains("open"));
        assert_eq!(findings[0].region, "eu-west-1");
    }
}
