//! Offline collaborators backed by a JSON input document:
//!
//! ```json
//! {
//!   "recommendations": { "rds": [ ... ] },
//!   "savings_plans": { "compute": [ ... ] },
//!   "commitments": [ ... ]
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use commitpilot_core::domain::commitment::ExistingCommitment;
use commitpilot_core::domain::recommendation::SavingsPlanType;
use commitpilot_core::domain::service::ServiceKind;
use commitpilot_core::purchase::{InMemoryPurchaseClient, PurchaseClient};
use commitpilot_core::source::InMemoryRecommendationSource;
use serde::Deserialize;
use serde_json::Value;

pub const LIVE_PURCHASE_UNAVAILABLE: &str =
    "live purchases need a provider purchase client; offline input supports dry runs only";

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputDocument {
    pub recommendations: BTreeMap<ServiceKind, Vec<Value>>,
    pub savings_plans: BTreeMap<SavingsPlanType, Vec<Value>>,
    pub commitments: Vec<ExistingCommitment>,
}

impl InputDocument {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("could not read input document `{}`", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("could not parse input document `{}`", path.display()))
    }

    pub fn source(&self) -> InMemoryRecommendationSource {
        let source = self
            .recommendations
            .iter()
            .fold(InMemoryRecommendationSource::default(), |source, (service, records)| {
                source.with_records(*service, records.clone())
            });
        self.savings_plans.iter().fold(source, |source, (plan_type, records)| {
            source.with_savings_plans(*plan_type, records.clone())
        })
    }

    /// One client per service, each seeded with that service's commitments.
    pub fn purchase_clients(&self, dry_run: bool) -> Vec<Arc<dyn PurchaseClient>> {
        ServiceKind::ALL
            .into_iter()
            .map(|service| {
                let client =
                    InMemoryPurchaseClient::new(service).with_commitments(self.commitments.clone());
                let client = if dry_run {
                    client
                } else {
                    client.with_live_purchases_disabled(LIVE_PURCHASE_UNAVAILABLE)
                };
                Arc::new(client) as Arc<dyn PurchaseClient>
            })
            .collect()
    }
}
