use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::recommendation::Recommendation;

/// Outcome of exactly one purchase attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseResult {
    pub recommendation: Recommendation,
    pub success: bool,
    pub purchase_id: Option<String>,
    pub reservation_id: Option<String>,
    pub message: String,
    pub actual_cost: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl PurchaseResult {
    pub fn succeeded(
        recommendation: Recommendation,
        purchase_id: impl Into<String>,
        reservation_id: Option<String>,
        actual_cost: Decimal,
        message: impl Into<String>,
    ) -> Self {
        Self {
            recommendation,
            success: true,
            purchase_id: Some(purchase_id.into()),
            reservation_id,
            message: message.into(),
            actual_cost,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(recommendation: Recommendation, message: impl Into<String>) -> Self {
        Self {
            recommendation,
            success: false,
            purchase_id: None,
            reservation_id: None,
            message: message.into(),
            actual_cost: Decimal::ZERO,
            timestamp: Utc::now(),
        }
    }
}

/// Per-unit pricing of the offering a recommendation would be bought from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferingDetails {
    pub offering_id: String,
    pub upfront_price: Decimal,
    pub recurring_monthly_price: Decimal,
    pub currency: String,
}

impl OfferingDetails {
    /// Full cost of `count` units held for `term_months`.
    pub fn total_cost(&self, count: u32, term_months: u32) -> Decimal {
        let per_unit = self.upfront_price + self.recurring_monthly_price * Decimal::from(term_months);
        per_unit * Decimal::from(count)
    }
}
