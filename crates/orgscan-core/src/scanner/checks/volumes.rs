use async_trait::async_trait;

use crate::error::CheckError;
use crate::model::{Finding, Pillar};
use crate::scanner::{Check, EvidenceSource, ScopedCredentials};

use super::finding_for;

/// Flags block-storage volumes whose encrypted flag is false.
pub struct UnencryptedVolumeCheck;

#[async_trait]
impl Check for UnencryptedVolumeCheck {
    fn id(&self) -> &'static str {
        "ebs-unencrypted-volume"
    }

    fn name(&self) -> &'static str {
        "Unencrypted block volume"
    }

    fn pillar(&self) -> Pillar {
        Pillar::Security
    }

    async fn run(
        &self,
        creds: &ScopedCredentials,
        evidence: &dyn EvidenceSource,
    ) -> Result<Vec<Finding>, CheckError> {
        let volumes = evidence.list_volumes(creds).await?;

        Ok(volumes
            .into_iter()
            .filter(|v| !v.encrypted)
            .map(|v| {
                finding_for(
                    self,
                    &creds.account_id,
                    &v.region,
                    format!("volume '{}' is not encrypted at rest", v.volume_id),
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
    use crate::scanner::VolumeEvidence;

    #[tokio::test]
    async fn each_unencrypted_volume_yields_a_finding() {
        let evidence = FakeEvidence {
            volumes: vec![
                VolumeEvidence {
                    volume_id: "vol-1".to_string(),
                    region: "us-west-2".to_string(),
                    encrypted: false,
                },
                VolumeEvidence {
                    volume_id: "vol-2".to_string(),
                    region: "us-west-2".to_string(),
                    encrypted: false,
                },
                VolumeEvidence {
                    volume_id: "vol-3".to_string(),
                    region: "us-west-2".to_string(),
                    encrypted: true,
                },
            ],
            ..FakeEvidence::default()
        };
        let creds = credentials("111122223333");

        let findings = UnencryptedVolumeCheck.run(&creds, &evidence).await.unwrap();
        assert_eq!(findings.len(), 2);
        assert!(findings.iter().all(|f| f.check_id == "ebs-unencrypted-volume"));
    }
}
