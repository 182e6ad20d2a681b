//! Scales recommended quantities down to a target coverage percentage.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::domain::recommendation::Recommendation;

const FULL_COVERAGE: Decimal = Decimal::ONE_HUNDRED;

/// `coverage_percent >= 100` is the identity and `<= 0` yields nothing.
/// Otherwise each count becomes `ceil(count * coverage / 100)`, so positive
/// coverage of positive counts never rounds to zero. Absolute money fields
/// shrink by `coverage / 100`; percentages are untouched.
pub fn scale(recommendations: &[Recommendation], coverage_percent: Decimal) -> Vec<Recommendation> {
    if coverage_percent >= FULL_COVERAGE {
        return recommendations.to_vec();
    }
    if coverage_percent <= Decimal::ZERO {
        return Vec::new();
    }

    let fraction = coverage_percent / FULL_COVERAGE;
    recommendations.iter().filter_map(|recommendation| scale_one(recommendation, fraction)).collect()
}

fn scale_one(recommendation: &Recommendation, fraction: Decimal) -> Option<Recommendation> {
    if recommendation.count == 0 {
        return None;
    }

    let adjusted = (Decimal::from(recommendation.count) * fraction).ceil().to_u32()?;
    if adjusted == 0 {
        return None;
    }

    let mut scaled = recommendation.with_count(adjusted);
    // Money follows the coverage fraction, not adjusted/original: 5 units
    // costing 500 at 50% become 3 units costing 250.
    scaled.upfront_cost = recommendation.upfront_cost * fraction;
    scaled.recurring_monthly_cost = recommendation.recurring_monthly_cost * fraction;
    scaled.estimated_cost = recommendation.estimated_cost * fraction;
    scaled.estimated_monthly_on_demand = recommendation.estimated_monthly_on_demand * fraction;
    Some(scaled)
}
