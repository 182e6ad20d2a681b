use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

use crate::domain::recommendation::{
    describe, Recommendation, SavingsPlanDetails, SavingsPlanType, ServiceDetails,
};
use crate::domain::service::ServiceKind;
use crate::domain::terms::term_months;
use crate::errors::RecordError;
use crate::normalize::raw::RawSavingsPlanRecord;
use crate::normalize::region::normalize_region;
use crate::normalize::values::{non_empty, parse_amount};
use crate::source::RecommendationParams;

/// Billing hours per month used to turn an hourly commitment into a monthly cost.
pub const HOURS_PER_MONTH: u32 = 730;

/// Savings plans are a single commitment with a regional scope at most:
/// count is always 1 and there is no instance type.
pub fn normalize_savings_plan(
    record: &Value,
    plan_type: SavingsPlanType,
    params: &RecommendationParams,
    now: DateTime<Utc>,
) -> Result<Recommendation, RecordError> {
    if !record.is_object() {
        return Err(RecordError::Malformed(record.to_string()));
    }
    let raw: RawSavingsPlanRecord = serde_json::from_value(record.clone())
        .map_err(|error| RecordError::Malformed(error.to_string()))?;

    let hourly_commitment =
        parse_amount("HourlyCommitmentToPurchase", raw.hourly_commitment_to_purchase.as_ref())?;
    let details = raw.savings_plans_details.unwrap_or_default();
    let region = non_empty(details.region).map(|region| normalize_region(&region)).unwrap_or_default();

    let mut recommendation = Recommendation {
        service: ServiceKind::SavingsPlans,
        region,
        instance_type: String::new(),
        count: 1,
        payment_option: params.payment_option,
        term_months: term_months(params.term_years),
        estimated_cost: parse_amount(
            "EstimatedMonthlySavingsAmount",
            raw.estimated_monthly_savings_amount.as_ref(),
        )?,
        savings_percent: parse_amount(
            "EstimatedSavingsPercentage",
            raw.estimated_savings_percentage.as_ref(),
        )?,
        upfront_cost: parse_amount("UpfrontCost", raw.upfront_cost.as_ref())?,
        recurring_monthly_cost: hourly_commitment * Decimal::from(HOURS_PER_MONTH),
        estimated_monthly_on_demand: parse_amount(
            "EstimatedOnDemandCost",
            raw.estimated_on_demand_cost.as_ref(),
        )?,
        account_id: non_empty(raw.account_id).or_else(|| params.account_id.clone()),
        account_name: non_empty(raw.account_name),
        details: ServiceDetails::SavingsPlans(SavingsPlanDetails {
            plan_type,
            hourly_commitment,
            instance_family: non_empty(details.instance_family),
            offering_id: non_empty(details.offering_id),
        }),
        description: String::new(),
        timestamp: now,
    };
    recommendation.description = describe(&recommendation);
    Ok(recommendation)
}
