pub mod access_keys;
pub mod buckets;
pub mod identity;
pub mod volumes;

use chrono::Utc;

use crate::model::Finding;

use super::Check;

/// The ordered battery run against every scanned account. New checks are
/// registered here; the orchestrator never changes.
pub fn default_battery() -> Vec<Box<dyn Check>> {
    vec![
        Box::new(buckets::PublicBucketCheck),
        Box::new(volumes::UnencryptedVolumeCheck),
        Box::new(identity::RootMfaCheck),
        Box::new(access_keys::StaleAccessKeyCheck::default()),
    ]
}

/// Build a finding for `check` against one violating resource. The
/// execution id is stamped later by the orchestrator, before storage.
pub(crate) fn finding_for(
    check: &dyn Check,
    account_id: &str,
    region: &str,
    evidence: String,
    hri: bool,
) -> Finding {
    Finding {
        account_id: account_id.to_string(),
        check_id: check.id().to_string(),
        pillar: check.pillar(),
        check_name: check.name().to_string(),
        hri,
        evidence,
        region: region.to_string(),
        timestamp: Utc::now(),
        execution_id: String::new(),
        resource_tags: None,
        cost_impact: None,
    }
}
