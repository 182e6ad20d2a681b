use std::collections::BTreeSet;
use std::sync::Mutex;

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::commitment::ExistingCommitment;
use crate::domain::purchase::{OfferingDetails, PurchaseResult};
use crate::domain::recommendation::Recommendation;
use crate::domain::service::ServiceKind;

use super::{PurchaseClient, PurchaseError};

/// Offline purchase client. Offerings are priced per unit from the
/// recommendation's own cost fields.
pub struct InMemoryPurchaseClient {
    service: ServiceKind,
    commitments: Vec<ExistingCommitment>,
    inventory_error: Option<String>,
    failing_instance_types: BTreeSet<String>,
    missing_offerings: BTreeSet<String>,
    live_purchases_disabled: Option<String>,
    purchases: Mutex<Vec<String>>,
}

impl InMemoryPurchaseClient {
    pub fn new(service: ServiceKind) -> Self {
        Self {
            service,
            commitments: Vec::new(),
            inventory_error: None,
            failing_instance_types: BTreeSet::new(),
            missing_offerings: BTreeSet::new(),
            live_purchases_disabled: None,
            purchases: Mutex::new(Vec::new()),
        }
    }

    /// Keeps only commitments for this client's service.
    pub fn with_commitments(mut self, commitments: Vec<ExistingCommitment>) -> Self {
        let service = self.service;
        self.commitments
            .extend(commitments.into_iter().filter(|commitment| commitment.service == service));
        self
    }

    pub fn with_inventory_error(mut self, message: impl Into<String>) -> Self {
        self.inventory_error = Some(message.into());
        self
    }

    pub fn with_failing_instance_type(mut self, instance_type: impl Into<String>) -> Self {
        self.failing_instance_types.insert(instance_type.into().to_ascii_lowercase());
        self
    }

    pub fn without_offering_for(mut self, instance_type: impl Into<String>) -> Self {
        self.missing_offerings.insert(instance_type.into().to_ascii_lowercase());
        self
    }

    /// Every live purchase fails with `reason`; dry runs still price offerings.
    pub fn with_live_purchases_disabled(mut self, reason: impl Into<String>) -> Self {
        self.live_purchases_disabled = Some(reason.into());
        self
    }

    /// Descriptions of every recommendation passed to [`PurchaseClient::purchase`].
    pub fn purchase_calls(&self) -> Vec<String> {
        match self.purchases.lock() {
            Ok(calls) => calls.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn note_purchase(&self, description: &str) {
        match self.purchases.lock() {
            Ok(mut calls) => calls.push(description.to_string()),
            Err(poisoned) => poisoned.into_inner().push(description.to_string()),
        }
    }

    fn offering_for(&self, recommendation: &Recommendation) -> Result<OfferingDetails, PurchaseError> {
        let key = recommendation.instance_type.to_ascii_lowercase();
        if self.missing_offerings.contains(&key) {
            return Err(PurchaseError::OfferingNotFound(recommendation.description.clone()));
        }

        let units = Decimal::from(recommendation.count.max(1));
        let label = if recommendation.instance_type.is_empty() {
            "flexible"
        } else {
            recommendation.instance_type.as_str()
        };
        Ok(OfferingDetails {
            offering_id: format!(
                "{}-{label}-{}-{}mo",
                recommendation.service, recommendation.payment_option, recommendation.term_months
            ),
            upfront_price: recommendation.upfront_cost / units,
            recurring_monthly_price: recommendation.recurring_monthly_cost / units,
            currency: "USD".to_string(),
        })
    }
}

#[async_trait]
impl PurchaseClient for InMemoryPurchaseClient {
    fn service(&self) -> ServiceKind {
        self.service
    }

    async fn purchase(&self, recommendation: &Recommendation) -> PurchaseResult {
        self.note_purchase(&recommendation.description);

        if let Some(reason) = &self.live_purchases_disabled {
            return PurchaseResult::failed(recommendation.clone(), reason.clone());
        }
        if self.failing_instance_types.contains(&recommendation.instance_type.to_ascii_lowercase()) {
            return PurchaseResult::failed(
                recommendation.clone(),
                PurchaseError::Api(format!("purchase of {} rejected", recommendation.instance_type))
                    .to_string(),
            );
        }

        match self.offering_for(recommendation) {
            Ok(offering) => PurchaseResult::succeeded(
                recommendation.clone(),
                format!("purchase-{}", Uuid::new_v4()),
                Some(format!("ri-{}", Uuid::new_v4().simple())),
                offering.total_cost(recommendation.count, recommendation.term_months),
                format!("purchased {}", recommendation.description),
            ),
            Err(error) => PurchaseResult::failed(recommendation.clone(), error.to_string()),
        }
    }

    async fn validate_offering(&self, recommendation: &Recommendation) -> Result<(), PurchaseError> {
        self.offering_for(recommendation).map(|_| ())
    }

    async fn offering_details(
        &self,
        recommendation: &Recommendation,
    ) -> Result<OfferingDetails, PurchaseError> {
        self.offering_for(recommendation)
    }

    async fn list_existing_commitments(&self) -> Result<Vec<ExistingCommitment>, PurchaseError> {
        match &self.inventory_error {
            Some(message) => Err(PurchaseError::Inventory(message.clone())),
            None => Ok(self.commitments.clone()),
        }
    }
}
