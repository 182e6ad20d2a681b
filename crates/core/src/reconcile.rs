//! Subtracts recently purchased capacity from new recommendations.

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::domain::commitment::ExistingCommitment;
use crate::domain::recommendation::Recommendation;
use crate::domain::terms::{normalize_payment, PaymentOption};
use crate::normalize::region::normalize_region;
use crate::normalize::values::normalize_engine;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub reduced: usize,
    pub removed: usize,
}

pub fn reconcile(
    recommendations: &[Recommendation],
    commitments: &[ExistingCommitment],
    lookback_hours: u32,
) -> Vec<Recommendation> {
    reconcile_at(recommendations, commitments, lookback_hours, Utc::now()).0
}

/// Pure form of [`reconcile`] with an explicit clock.
pub fn reconcile_at(
    recommendations: &[Recommendation],
    commitments: &[ExistingCommitment],
    lookback_hours: u32,
    now: DateTime<Utc>,
) -> (Vec<Recommendation>, ReconcileReport) {
    let cutoff = now - Duration::hours(i64::from(lookback_hours));
    let recent = commitments
        .iter()
        .filter(|commitment| commitment.state.is_reconcilable() && commitment.start_time > cutoff)
        .collect::<Vec<_>>();

    let mut report = ReconcileReport::default();
    let mut kept = Vec::with_capacity(recommendations.len());
    for recommendation in recommendations {
        if recommendation.count == 0 {
            report.removed += 1;
            continue;
        }

        let owned = recent
            .iter()
            .filter(|commitment| matches(recommendation, commitment))
            .fold(0_u32, |total, commitment| total.saturating_add(commitment.count));

        if owned == 0 {
            kept.push(recommendation.clone());
            continue;
        }

        let remaining = recommendation.count.saturating_sub(owned);
        if remaining == 0 {
            report.removed += 1;
        } else {
            report.reduced += 1;
            kept.push(recommendation.with_count(remaining));
        }
    }

    if report.reduced > 0 || report.removed > 0 {
        info!(
            event_name = "pipeline.reconcile.applied",
            reduced = report.reduced,
            removed = report.removed,
            lookback_hours,
            "reconciled recommendations against recent commitments"
        );
    }

    (kept, report)
}

/// Whether `commitment` covers the same capacity as `recommendation`.
///
/// Engines are compared only when both sides report one: a missing label on
/// either side does not prevent a match.
pub fn matches(recommendation: &Recommendation, commitment: &ExistingCommitment) -> bool {
    if commitment.service != recommendation.service
        || commitment.term_months != recommendation.term_months
        || !commitment.instance_type.trim().eq_ignore_ascii_case(&recommendation.instance_type)
        || !normalize_region(commitment.region.trim()).eq_ignore_ascii_case(&recommendation.region)
    {
        return false;
    }

    if let (Some(ours), Some(theirs)) = (recommendation.engine(), commitment.engine.as_deref()) {
        if !theirs.trim().is_empty() && normalize_engine(ours) != normalize_engine(theirs) {
            return false;
        }
    }

    payment_matches(recommendation.payment_option, &commitment.payment_option)
}

fn payment_matches(ours: PaymentOption, theirs: &str) -> bool {
    normalize_payment(ours.as_str()) == normalize_payment(theirs)
        || PaymentOption::parse(theirs) == Some(ours)
}
