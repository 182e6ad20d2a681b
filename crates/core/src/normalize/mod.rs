//! Provider recommendation records to canonical [`Recommendation`]s.
//!
//! A malformed record never fails its batch: it is skipped and reported as a
//! [`NormalizeWarning`]. Only retrieval failures propagate as errors.

pub mod extractors;
pub mod raw;
pub mod region;
pub mod savings_plans;
pub mod values;

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cancel::CancellationSignal;
use crate::domain::recommendation::{describe, Recommendation, SavingsPlanType};
use crate::domain::service::ServiceKind;
use crate::domain::terms::term_months;
use crate::errors::RecordError;
use crate::retrieval::{RateLimitedRetriever, RetrievalError};
use crate::source::{RawRecommendationBatch, RecommendationParams, RecommendationSource};

use self::extractors::{ExtractionInput, ExtractorRegistry};
use self::raw::RawReservationRecord;
use self::region::normalize_region;
use self::savings_plans::normalize_savings_plan;
use self::values::{non_empty, parse_amount, parse_quantity};

pub use self::region::looks_like_region_code;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum WarningReason {
    Record(String),
    Retrieval(String),
}

impl fmt::Display for WarningReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Record(message) => write!(f, "record skipped: {message}"),
            Self::Retrieval(message) => write!(f, "fetch skipped: {message}"),
        }
    }
}

/// Something the normalizer dropped without failing the batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NormalizeWarning {
    pub service: ServiceKind,
    pub index: Option<usize>,
    pub plan_type: Option<SavingsPlanType>,
    pub reason: WarningReason,
}

impl NormalizeWarning {
    fn record(service: ServiceKind, index: usize, error: &RecordError) -> Self {
        Self { service, index: Some(index), plan_type: None, reason: WarningReason::Record(error.to_string()) }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeOutcome {
    pub recommendations: Vec<Recommendation>,
    pub warnings: Vec<NormalizeWarning>,
}

impl NormalizeOutcome {
    /// Distinct non-empty regions, sorted.
    pub fn regions(&self) -> Vec<String> {
        self.recommendations
            .iter()
            .filter(|recommendation| !recommendation.region.is_empty())
            .map(|recommendation| recommendation.region.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// `true` when no region filter was requested or the normalized regions agree.
pub fn region_matches(filter: Option<&str>, region: &str) -> bool {
    match filter.map(str::trim).filter(|filter| !filter.is_empty()) {
        None => true,
        Some(filter) => normalize_region(filter).eq_ignore_ascii_case(region),
    }
}

#[derive(Default)]
pub struct Normalizer {
    registry: ExtractorRegistry,
}

impl Normalizer {
    pub fn new(registry: ExtractorRegistry) -> Self {
        Self { registry }
    }

    pub fn normalize(
        &self,
        batch: &RawRecommendationBatch,
        params: &RecommendationParams,
    ) -> NormalizeOutcome {
        self.normalize_at(batch, params, Utc::now())
    }

    pub fn normalize_at(
        &self,
        batch: &RawRecommendationBatch,
        params: &RecommendationParams,
        now: DateTime<Utc>,
    ) -> NormalizeOutcome {
        let mut outcome = NormalizeOutcome::default();

        for (index, record) in batch.records.iter().enumerate() {
            let normalized = if params.service == ServiceKind::SavingsPlans {
                Err(RecordError::UnsupportedService(ServiceKind::SavingsPlans))
            } else {
                self.normalize_record(record, params, now)
            };

            match normalized {
                Ok(recommendation)
                    if region_matches(params.region.as_deref(), &recommendation.region) =>
                {
                    outcome.recommendations.push(recommendation);
                }
                Ok(recommendation) => {
                    debug!(
                        service = %params.service,
                        index,
                        region = %recommendation.region,
                        "record outside requested region"
                    );
                }
                Err(error) => {
                    warn!(
                        event_name = "pipeline.normalize.record_skipped",
                        service = %params.service,
                        index,
                        error = %error,
                        "skipping malformed recommendation record"
                    );
                    outcome.warnings.push(NormalizeWarning::record(params.service, index, &error));
                }
            }
        }

        outcome
    }

    fn normalize_record(
        &self,
        record: &Value,
        params: &RecommendationParams,
        now: DateTime<Utc>,
    ) -> Result<Recommendation, RecordError> {
        if !record.is_object() {
            return Err(RecordError::Malformed(record.to_string()));
        }
        let raw: RawReservationRecord = serde_json::from_value(record.clone())
            .map_err(|error| RecordError::Malformed(error.to_string()))?;

        let count = parse_quantity(
            "RecommendedNumberOfInstancesToPurchase",
            raw.recommended_number_of_instances_to_purchase.as_ref(),
        )?;
        let extractor = self
            .registry
            .get(params.service)
            .ok_or(RecordError::UnsupportedService(params.service))?;
        let detail = extractor
            .extract(&ExtractionInput { instance_details: raw.instance_details.as_ref(), count })?;

        let mut recommendation = Recommendation {
            service: params.service,
            region: detail.region,
            instance_type: detail.instance_type,
            count,
            payment_option: params.payment_option,
            term_months: term_months(params.term_years),
            estimated_cost: parse_amount(
                "EstimatedMonthlySavingsAmount",
                raw.estimated_monthly_savings_amount.as_ref(),
            )?,
            savings_percent: parse_amount(
                "EstimatedMonthlySavingsPercentage",
                raw.estimated_monthly_savings_percentage.as_ref(),
            )?,
            upfront_cost: parse_amount("UpfrontCost", raw.upfront_cost.as_ref())?,
            recurring_monthly_cost: parse_amount(
                "RecurringStandardMonthlyCost",
                raw.recurring_standard_monthly_cost.as_ref(),
            )?,
            estimated_monthly_on_demand: parse_amount(
                "EstimatedMonthlyOnDemandCost",
                raw.estimated_monthly_on_demand_cost.as_ref(),
            )?,
            account_id: non_empty(raw.account_id).or_else(|| params.account_id.clone()),
            account_name: non_empty(raw.account_name),
            details: detail.details,
            description: String::new(),
            timestamp: now,
        };
        recommendation.ensure_consistent()?;
        recommendation.description = describe(&recommendation);
        Ok(recommendation)
    }

    /// Savings plans: every plan type is fetched independently and the
    /// results are unioned. A failed plan type becomes a warning; only
    /// cancellation aborts the union.
    pub async fn collect_savings_plans(
        &self,
        source: &dyn RecommendationSource,
        retriever: &RateLimitedRetriever,
        signal: &CancellationSignal,
        params: &RecommendationParams,
    ) -> Result<NormalizeOutcome, RetrievalError> {
        let mut outcome = NormalizeOutcome::default();
        let now = Utc::now();

        for plan_type in SavingsPlanType::ALL {
            let fetched = retriever
                .with_retry(signal, || source.fetch_savings_plans(plan_type, params))
                .await;
            let batch = match fetched {
                Ok(batch) => batch,
                Err(error @ RetrievalError::Cancelled { .. }) => return Err(error),
                Err(error) => {
                    warn!(
                        event_name = "pipeline.normalize.plan_type_failed",
                        plan_type = plan_type.as_str(),
                        error = %error,
                        "savings plan type fetch failed; continuing with remaining types"
                    );
                    outcome.warnings.push(NormalizeWarning {
                        service: ServiceKind::SavingsPlans,
                        index: None,
                        plan_type: Some(plan_type),
                        reason: WarningReason::Retrieval(error.to_string()),
                    });
                    continue;
                }
            };

            for (index, record) in batch.records.iter().enumerate() {
                match normalize_savings_plan(record, plan_type, params, now) {
                    Ok(recommendation)
                        if region_matches(params.region.as_deref(), &recommendation.region)
                            || recommendation.region.is_empty() =>
                    {
                        outcome.recommendations.push(recommendation);
                    }
                    Ok(_) => {}
                    Err(error) => {
                        warn!(
                            event_name = "pipeline.normalize.record_skipped",
                            service = %ServiceKind::SavingsPlans,
                            plan_type = plan_type.as_str(),
                            index,
                            error = %error,
                            "skipping malformed savings plan record"
                        );
                        outcome.warnings.push(NormalizeWarning {
                            plan_type: Some(plan_type),
                            ..NormalizeWarning::record(ServiceKind::SavingsPlans, index, &error)
                        });
                    }
                }
            }
        }

        Ok(outcome)
    }

    /// Fetches through the retriever and normalizes the result.
    pub async fn collect(
        &self,
        source: &dyn RecommendationSource,
        retriever: &RateLimitedRetriever,
        signal: &CancellationSignal,
        params: &RecommendationParams,
    ) -> Result<NormalizeOutcome, RetrievalError> {
        if params.service == ServiceKind::SavingsPlans {
            return self.collect_savings_plans(source, retriever, signal, params).await;
        }

        let batch = retriever.with_retry(signal, || source.fetch(params)).await?;
        let outcome = self.normalize(&batch, params);

        debug!(
            event_name = "pipeline.normalize.completed",
            service = %params.service,
            region = params.region.as_deref().unwrap_or("*"),
            records = batch.records.len(),
            recommendations = outcome.recommendations.len(),
            warnings = outcome.warnings.len(),
            "normalized recommendation batch"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use serde_json::{json, Value};

    use crate::cancel::CancellationSignal;
    use crate::domain::recommendation::{describe, SavingsPlanType};
    use crate::domain::service::ServiceKind;
    use crate::domain::terms::PaymentOption;
    use crate::retrieval::{RateLimitedRetriever, RetrievalError, RetryPolicy};
    use crate::source::{
        InMemoryRecommendationSource, RawRecommendationBatch, RecommendationParams, SourceError,
    };

    use super::{region_matches, Normalizer, WarningReason};

    fn params(service: ServiceKind, region: Option<&str>) -> RecommendationParams {
        RecommendationParams {
            service,
            region: region.map(str::to_string),
            payment_option: PaymentOption::NoUpfront,
            term_years: 1,
            lookback_days: 7,
            account_id: Some("123456789012".to_string()),
        }
    }

    fn rds_record(quantity: Value, region: &str) -> Value {
        json!({
            "RecommendedNumberOfInstancesToPurchase": quantity,
            "UpfrontCost": "0",
            "RecurringStandardMonthlyCost": "42.5",
            "EstimatedMonthlySavingsAmount": "18.25",
            "EstimatedMonthlySavingsPercentage": "30",
            "InstanceDetails": {"RDSInstanceDetails": {
                "InstanceType": "db.t3.micro",
                "Region": region,
                "DatabaseEngine": "MySQL",
                "DeploymentOption": "Single-AZ"
            }}
        })
    }

    #[test]
    fn malformed_records_become_warnings_without_failing_the_batch() {
        let batch = RawRecommendationBatch::new(vec![
            rds_record(json!("5.0"), "US East (N. Virginia)"),
            rds_record(json!("lots"), "us-east-1"),
            json!({"RecommendedNumberOfInstancesToPurchase": "2"}),
            json!(17),
            rds_record(json!("3"), "us-west-2"),
        ]);

        let outcome = Normalizer::default().normalize(&batch, &params(ServiceKind::Rds, None));

        assert_eq!(outcome.recommendations.len(), 2);
        assert_eq!(outcome.warnings.len(), 3);
        assert_eq!(
            outcome.warnings.iter().map(|warning| warning.index).collect::<Vec<_>>(),
            vec![Some(1), Some(2), Some(3)]
        );

        let first = &outcome.recommendations[0];
        assert_eq!(first.count, 5);
        assert_eq!(first.region, "us-east-1");
        assert_eq!(first.term_months, 12);
        assert_eq!(first.recurring_monthly_cost, Decimal::new(425, 1));
        assert_eq!(first.account_id.as_deref(), Some("123456789012"));
        assert_eq!(first.engine(), Some("mysql"));
        assert_eq!(first.description, describe(first));
    }

    #[test]
    fn region_filter_drops_other_regions_silently() {
        let batch = RawRecommendationBatch::new(vec![
            rds_record(json!("1"), "us-east-1"),
            rds_record(json!("2"), "Europe (Ireland)"),
        ]);

        let outcome =
            Normalizer::default().normalize(&batch, &params(ServiceKind::Rds, Some("eu-west-1")));

        assert_eq!(outcome.recommendations.len(), 1);
        assert_eq!(outcome.recommendations[0].region, "eu-west-1");
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn discovered_regions_are_distinct_and_sorted() {
        let batch = RawRecommendationBatch::new(vec![
            rds_record(json!("1"), "us-west-2"),
            rds_record(json!("1"), "eu-west-1"),
            rds_record(json!("1"), "US West (Oregon)"),
        ]);

        let outcome = Normalizer::default().normalize(&batch, &params(ServiceKind::Rds, None));

        assert_eq!(outcome.regions(), vec!["eu-west-1".to_string(), "us-west-2".to_string()]);
    }

    #[test]
    fn region_filter_matching_normalizes_the_filter() {
        assert!(region_matches(None, "us-east-1"));
        assert!(region_matches(Some(""), "us-east-1"));
        assert!(region_matches(Some("US East (N. Virginia)"), "us-east-1"));
        assert!(!region_matches(Some("us-east-2"), "us-east-1"));
    }

    #[tokio::test]
    async fn savings_plan_types_are_unioned_despite_one_failure() {
        let source = InMemoryRecommendationSource::default()
            .with_savings_plans(
                SavingsPlanType::Compute,
                vec![json!({"HourlyCommitmentToPurchase": "1.0"})],
            )
            .with_savings_plan_failure(
                SavingsPlanType::Ec2Instance,
                SourceError::Transport("connection reset".to_string()),
            )
            .with_savings_plans(
                SavingsPlanType::SageMaker,
                vec![json!({"HourlyCommitmentToPurchase": "0.25"}), json!([])],
            );
        let retriever = RateLimitedRetriever::new(RetryPolicy::immediate(0));

        let outcome = Normalizer::default()
            .collect(
                &source,
                &retriever,
                &CancellationSignal::new(),
                &params(ServiceKind::SavingsPlans, None),
            )
            .await
            .expect("union of plan types");

        assert_eq!(outcome.recommendations.len(), 2);
        assert_eq!(outcome.warnings.len(), 2);
        assert!(outcome.warnings.iter().any(|warning| {
            warning.plan_type == Some(SavingsPlanType::Ec2Instance)
                && matches!(warning.reason, WarningReason::Retrieval(_))
        }));
    }

    #[tokio::test]
    async fn cancellation_aborts_savings_plan_collection() {
        let source = InMemoryRecommendationSource::default();
        let signal = CancellationSignal::new();
        signal.cancel();

        let result = Normalizer::default()
            .collect(
                &source,
                &RateLimitedRetriever::new(RetryPolicy::immediate(0)),
                &signal,
                &params(ServiceKind::SavingsPlans, None),
            )
            .await;

        assert!(matches!(result, Err(RetrievalError::Cancelled { .. })));
    }

    #[tokio::test]
    async fn collect_normalizes_fetched_reservations() {
        let source = InMemoryRecommendationSource::default()
            .with_records(ServiceKind::Rds, vec![rds_record(json!("4.0"), "us-east-1")]);

        let outcome = Normalizer::default()
            .collect(
                &source,
                &RateLimitedRetriever::new(RetryPolicy::immediate(1)),
                &CancellationSignal::new(),
                &params(ServiceKind::Rds, Some("us-east-1")),
            )
            .await
            .expect("collect rds");

        assert_eq!(outcome.recommendations.len(), 1);
        assert_eq!(outcome.recommendations[0].count, 4);
    }
}
