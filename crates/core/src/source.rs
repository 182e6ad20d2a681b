use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::recommendation::SavingsPlanType;
use crate::domain::service::ServiceKind;
use crate::domain::terms::PaymentOption;

/// Request sent to the recommendation source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationParams {
    pub service: ServiceKind,
    /// Region filter; `None` asks for every region.
    pub region: Option<String>,
    pub payment_option: PaymentOption,
    pub term_years: u32,
    pub lookback_days: u32,
    pub account_id: Option<String>,
}

impl RecommendationParams {
    pub fn for_region(&self, region: Option<String>) -> Self {
        Self { region, ..self.clone() }
    }
}

/// One untyped page of provider recommendation records.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecommendationBatch {
    pub records: Vec<Value>,
}

impl RawRecommendationBatch {
    pub fn new(records: Vec<Value>) -> Self {
        Self { records }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("request throttled: {0}")]
    Throttled(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl SourceError {
    /// Only rate-limit signals are worth retrying.
    pub fn is_throttling(&self) -> bool {
        matches!(self, Self::Throttled(_))
    }
}

#[async_trait]
pub trait RecommendationSource: Send + Sync {
    async fn fetch(
        &self,
        params: &RecommendationParams,
    ) -> Result<RawRecommendationBatch, SourceError>;

    async fn fetch_savings_plans(
        &self,
        plan_type: SavingsPlanType,
        params: &RecommendationParams,
    ) -> Result<RawRecommendationBatch, SourceError>;
}

/// Fixture-backed source; returns the same records for every region.
#[derive(Clone, Debug, Default)]
pub struct InMemoryRecommendationSource {
    reservations: BTreeMap<ServiceKind, Vec<Value>>,
    savings_plans: BTreeMap<SavingsPlanType, Result<Vec<Value>, SourceError>>,
}

impl InMemoryRecommendationSource {
    pub fn with_records(mut self, service: ServiceKind, records: Vec<Value>) -> Self {
        self.reservations.entry(service).or_default().extend(records);
        self
    }

    pub fn with_savings_plans(mut self, plan_type: SavingsPlanType, records: Vec<Value>) -> Self {
        self.savings_plans.insert(plan_type, Ok(records));
        self
    }

    pub fn with_savings_plan_failure(
        mut self,
        plan_type: SavingsPlanType,
        error: SourceError,
    ) -> Self {
        self.savings_plans.insert(plan_type, Err(error));
        self
    }
}

#[async_trait]
impl RecommendationSource for InMemoryRecommendationSource {
    async fn fetch(
        &self,
        params: &RecommendationParams,
    ) -> Result<RawRecommendationBatch, SourceError> {
        let records = self.reservations.get(&params.service).cloned().unwrap_or_default();
        Ok(RawRecommendationBatch::new(records))
    }

    async fn fetch_savings_plans(
        &self,
        plan_type: SavingsPlanType,
        _params: &RecommendationParams,
    ) -> Result<RawRecommendationBatch, SourceError> {
        match self.savings_plans.get(&plan_type) {
            Some(Ok(records)) => Ok(RawRecommendationBatch::new(records.clone())),
            Some(Err(error)) => Err(error.clone()),
            None => Ok(RawRecommendationBatch::default()),
        }
    }
}
