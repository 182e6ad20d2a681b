//! Purchase capability port and the batch orchestrator that drives it.

pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, TracingAuditSink};
use crate::cancel::{sleep_or_cancel, CancellationSignal};
use crate::domain::commitment::ExistingCommitment;
use crate::domain::purchase::{OfferingDetails, PurchaseResult};
use crate::domain::recommendation::Recommendation;
use crate::domain::service::ServiceKind;

pub use memory::InMemoryPurchaseClient;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PurchaseError {
    #[error("no offering matches the recommendation: {0}")]
    OfferingNotFound(String),
    #[error("invalid recommendation: {0}")]
    InvalidRecommendation(String),
    #[error("provider api error: {0}")]
    Api(String),
    #[error("commitment inventory unavailable: {0}")]
    Inventory(String),
}

/// Per-service purchase capability.
#[async_trait]
pub trait PurchaseClient: Send + Sync {
    fn service(&self) -> ServiceKind;

    /// Buys the recommended quantity. Failures are reported in the result,
    /// never raised.
    async fn purchase(&self, recommendation: &Recommendation) -> PurchaseResult;

    async fn validate_offering(&self, recommendation: &Recommendation) -> Result<(), PurchaseError>;

    async fn offering_details(
        &self,
        recommendation: &Recommendation,
    ) -> Result<OfferingDetails, PurchaseError>;

    async fn list_existing_commitments(&self) -> Result<Vec<ExistingCommitment>, PurchaseError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PurchaseMode {
    Live { validate_offerings: bool },
    /// Prices each item from its offering without buying anything.
    DryRun,
}

impl PurchaseMode {
    pub fn is_dry_run(&self) -> bool {
        matches!(self, Self::DryRun)
    }
}

/// Cancellation stopped a batch part-way; `completed` holds every result
/// produced before the stop, in input order.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("purchase batch cancelled after {} of {total} item(s)", .completed.len())]
pub struct PurchaseInterrupted {
    pub completed: Vec<PurchaseResult>,
    pub total: usize,
}

/// Buys each recommendation independently, in order, pausing between items.
pub struct BatchPurchaseOrchestrator {
    client: Arc<dyn PurchaseClient>,
    mode: PurchaseMode,
    delay_between: Duration,
    audit: Arc<dyn AuditSink>,
    run_id: String,
}

impl BatchPurchaseOrchestrator {
    pub fn new(client: Arc<dyn PurchaseClient>, mode: PurchaseMode) -> Self {
        Self {
            client,
            mode,
            delay_between: Duration::ZERO,
            audit: Arc::new(TracingAuditSink),
            run_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn with_delay(mut self, delay_between: Duration) -> Self {
        self.delay_between = delay_between;
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>, run_id: impl Into<String>) -> Self {
        self.audit = audit;
        self.run_id = run_id.into();
        self
    }

    pub fn mode(&self) -> PurchaseMode {
        self.mode
    }

    /// One result per input, same order. A failed item never stops the
    /// items after it; only cancellation does.
    pub async fn batch_purchase(
        &self,
        recommendations: &[Recommendation],
        signal: &CancellationSignal,
    ) -> Result<Vec<PurchaseResult>, PurchaseInterrupted> {
        let total = recommendations.len();
        let mut results = Vec::with_capacity(total);

        for (index, recommendation) in recommendations.iter().enumerate() {
            if signal.is_cancelled() {
                return Err(PurchaseInterrupted { completed: results, total });
            }

            let result = self.attempt(recommendation).await;
            self.record(index, &result);
            results.push(result);

            let is_last = index + 1 == total;
            if !is_last && sleep_or_cancel(self.delay_between, signal).await.is_err() {
                return Err(PurchaseInterrupted { completed: results, total });
            }
        }

        Ok(results)
    }

    async fn attempt(&self, recommendation: &Recommendation) -> PurchaseResult {
        if let Err(error) = self.check(recommendation) {
            return PurchaseResult::failed(recommendation.clone(), error.to_string());
        }

        match self.mode {
            PurchaseMode::DryRun => match self.client.offering_details(recommendation).await {
                Ok(offering) => {
                    let cost = offering.total_cost(recommendation.count, recommendation.term_months);
                    PurchaseResult::succeeded(
                        recommendation.clone(),
                        format!("dryrun-{}", Uuid::new_v4()),
                        None,
                        cost,
                        format!(
                            "dry run: would purchase {} via offering {} for {cost} {}",
                            recommendation.description, offering.offering_id, offering.currency
                        ),
                    )
                }
                Err(error) => PurchaseResult::failed(recommendation.clone(), error.to_string()),
            },
            PurchaseMode::Live { validate_offerings } => {
                if validate_offerings {
                    if let Err(error) = self.client.validate_offering(recommendation).await {
                        return PurchaseResult::failed(
                            recommendation.clone(),
                            format!("offering validation failed: {error}"),
                        );
                    }
                }
                self.client.purchase(recommendation).await
            }
        }
    }

    fn check(&self, recommendation: &Recommendation) -> Result<(), PurchaseError> {
        recommendation
            .ensure_consistent()
            .map_err(|error| PurchaseError::InvalidRecommendation(error.to_string()))?;

        let service = self.client.service();
        if recommendation.service != service {
            return Err(PurchaseError::InvalidRecommendation(format!(
                "{} recommendation routed to {service} purchase client",
                recommendation.service
            )));
        }
        if recommendation.count == 0 {
            return Err(PurchaseError::InvalidRecommendation("quantity is zero".to_string()));
        }
        Ok(())
    }

    fn record(&self, index: usize, result: &PurchaseResult) {
        let recommendation = &result.recommendation;
        let outcome = match (result.success, self.mode) {
            (false, _) => AuditOutcome::Failed,
            (true, PurchaseMode::DryRun) => AuditOutcome::Simulated,
            (true, PurchaseMode::Live { .. }) => AuditOutcome::Success,
        };

        if result.success {
            info!(
                event_name = "pipeline.purchase.succeeded",
                service = %recommendation.service,
                index,
                region = %recommendation.region,
                count = recommendation.count,
                dry_run = self.mode.is_dry_run(),
                actual_cost = %result.actual_cost,
                "{}",
                recommendation.description
            );
        } else {
            warn!(
                event_name = "pipeline.purchase.failed",
                service = %recommendation.service,
                index,
                region = %recommendation.region,
                count = recommendation.count,
                reason = %result.message,
                "{}",
                recommendation.description
            );
        }

        let mut event = AuditEvent::new(
            self.run_id.clone(),
            "purchase.attempted",
            AuditCategory::Purchase,
            "batch-orchestrator",
            outcome,
        )
        .for_service(recommendation.service)
        .with_metadata("description", recommendation.description.clone())
        .with_metadata("region", recommendation.region.clone())
        .with_metadata("instance_type", recommendation.instance_type.clone())
        .with_metadata("count", recommendation.count.to_string())
        .with_metadata("actual_cost", result.actual_cost.to_string())
        .with_metadata("message", result.message.clone());
        if let Some(purchase_id) = &result.purchase_id {
            event = event.with_metadata("purchase_id", purchase_id.clone());
        }
        self.audit.emit(event);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use chrono::Utc;
    use rust_decimal::Decimal;

    use crate::audit::{AuditOutcome, InMemoryAuditSink};
    use crate::cancel::CancellationSignal;
    use crate::domain::recommendation::{
        describe, Ec2Details, MemoryDbDetails, Recommendation, ReservationScope, ServiceDetails,
        Tenancy,
    };
    use crate::domain::service::ServiceKind;
    use crate::domain::terms::PaymentOption;

    use super::{BatchPurchaseOrchestrator, InMemoryPurchaseClient, PurchaseMode};

    fn ec2(instance_type: &str, count: u32) -> Recommendation {
        let mut recommendation = Recommendation {
            service: ServiceKind::Ec2,
            region: "us-east-1".to_string(),
            instance_type: instance_type.to_string(),
            count,
            payment_option: PaymentOption::PartialUpfront,
            term_months: 12,
            estimated_cost: Decimal::new(25, 0),
            savings_percent: Decimal::new(20, 0),
            upfront_cost: Decimal::new(100, 0) * Decimal::from(count),
            recurring_monthly_cost: Decimal::new(10, 0) * Decimal::from(count),
            estimated_monthly_on_demand: Decimal::new(60, 0),
            account_id: None,
            account_name: None,
            details: ServiceDetails::Ec2(Ec2Details {
                platform: "Linux/UNIX".to_string(),
                tenancy: Tenancy::Shared,
                scope: ReservationScope::Region,
            }),
            description: String::new(),
            timestamp: Utc::now(),
        };
        recommendation.description = describe(&recommendation);
        recommendation
    }

    fn live() -> PurchaseMode {
        PurchaseMode::Live { validate_offerings: false }
    }

    #[tokio::test]
    async fn failure_in_the_middle_does_not_stop_the_batch() {
        let client = Arc::new(
            InMemoryPurchaseClient::new(ServiceKind::Ec2).with_failing_instance_type("c5.large"),
        );
        let orchestrator = BatchPurchaseOrchestrator::new(client.clone(), live());
        let batch = vec![ec2("m5.large", 1), ec2("c5.large", 2), ec2("r5.large", 3)];

        let results = orchestrator
            .batch_purchase(&batch, &CancellationSignal::new())
            .await
            .expect("batch completes");

        assert_eq!(results.len(), 3);
        assert_eq!(
            results.iter().map(|result| result.success).collect::<Vec<_>>(),
            vec![true, false, true]
        );
        assert_eq!(
            results.iter().map(|result| result.recommendation.instance_type.as_str()).collect::<Vec<_>>(),
            vec!["m5.large", "c5.large", "r5.large"]
        );
        assert_eq!(client.purchase_calls().len(), 3);
        assert!(!results[1].message.is_empty());
    }

    #[tokio::test]
    async fn empty_batch_makes_no_calls() {
        let client = Arc::new(InMemoryPurchaseClient::new(ServiceKind::Ec2));
        let orchestrator = BatchPurchaseOrchestrator::new(client.clone(), live())
            .with_delay(Duration::from_secs(60));

        let started = Instant::now();
        let results = orchestrator
            .batch_purchase(&[], &CancellationSignal::new())
            .await
            .expect("empty batch");

        assert!(results.is_empty());
        assert!(client.purchase_calls().is_empty());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn no_delay_follows_the_last_item() {
        let client = Arc::new(InMemoryPurchaseClient::new(ServiceKind::Ec2));
        let orchestrator = BatchPurchaseOrchestrator::new(client, live())
            .with_delay(Duration::from_secs(60));

        let started = Instant::now();
        let results = orchestrator
            .batch_purchase(&[ec2("m5.large", 1)], &CancellationSignal::new())
            .await
            .expect("single item");

        assert_eq!(results.len(), 1);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn dry_run_prices_from_offering_without_buying() {
        let client = Arc::new(InMemoryPurchaseClient::new(ServiceKind::Ec2));
        let audit = Arc::new(InMemoryAuditSink::default());
        let orchestrator = BatchPurchaseOrchestrator::new(client.clone(), PurchaseMode::DryRun)
            .with_audit(audit.clone(), "run-dry");

        let results = orchestrator
            .batch_purchase(&[ec2("m5.large", 2)], &CancellationSignal::new())
            .await
            .expect("dry run");

        assert!(results[0].success);
        assert!(results[0].purchase_id.as_deref().is_some_and(|id| id.starts_with("dryrun-")));
        // (100 upfront + 10 * 12 recurring) per unit, two units.
        assert_eq!(results[0].actual_cost, Decimal::new(440, 0));
        assert!(client.purchase_calls().is_empty());

        let events = audit.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "purchase.attempted");
        assert_eq!(events[0].outcome, AuditOutcome::Simulated);
        assert_eq!(events[0].run_id, "run-dry");
    }

    #[tokio::test]
    async fn validation_failure_skips_the_purchase_call() {
        let client = Arc::new(
            InMemoryPurchaseClient::new(ServiceKind::Ec2).without_offering_for("x1e.32xlarge"),
        );
        let orchestrator = BatchPurchaseOrchestrator::new(
            client.clone(),
            PurchaseMode::Live { validate_offerings: true },
        );

        let results = orchestrator
            .batch_purchase(&[ec2("x1e.32xlarge", 1), ec2("m5.large", 1)], &CancellationSignal::new())
            .await
            .expect("batch completes");

        assert!(!results[0].success);
        assert!(results[0].message.contains("offering validation failed"));
        assert!(results[1].success);
        assert_eq!(client.purchase_calls(), vec![results[1].recommendation.description.clone()]);
    }

    #[tokio::test]
    async fn mismatched_recommendations_are_failed_locally() {
        let client = Arc::new(InMemoryPurchaseClient::new(ServiceKind::Ec2));
        let orchestrator = BatchPurchaseOrchestrator::new(client.clone(), live());
        let mut broken = ec2("m5.large", 1);
        broken.details =
            ServiceDetails::MemoryDb(MemoryDbDetails { node_type: "db.r6g.large".to_string(), shard_count: 1 });

        let results = orchestrator
            .batch_purchase(&[broken], &CancellationSignal::new())
            .await
            .expect("batch completes");

        assert!(!results[0].success);
        assert!(results[0].message.contains("invalid recommendation"));
        assert!(client.purchase_calls().is_empty());
    }

    #[tokio::test]
    async fn cancellation_during_delay_returns_completed_prefix() {
        let client = Arc::new(InMemoryPurchaseClient::new(ServiceKind::Ec2));
        let orchestrator = BatchPurchaseOrchestrator::new(client.clone(), live())
            .with_delay(Duration::from_secs(60));
        let signal = CancellationSignal::new();
        let canceller = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let interrupted = orchestrator
            .batch_purchase(&[ec2("m5.large", 1), ec2("m5.xlarge", 1)], &signal)
            .await
            .expect_err("cancelled mid-batch");

        assert_eq!(interrupted.completed.len(), 1);
        assert_eq!(interrupted.total, 2);
        assert_eq!(client.purchase_calls().len(), 1);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
