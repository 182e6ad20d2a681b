//! Composition root: runs every configured service through
//! normalize, filter, reconcile, scale and purchase.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, TracingAuditSink};
use crate::cancel::CancellationSignal;
use crate::config::AppConfig;
use crate::coverage;
use crate::domain::purchase::PurchaseResult;
use crate::domain::recommendation::Recommendation;
use crate::domain::service::ServiceKind;
use crate::domain::terms::PaymentOption;
use crate::errors::PipelineError;
use crate::filter::RecommendationFilter;
use crate::normalize::region::normalize_region;
use crate::normalize::{region_matches, NormalizeWarning, Normalizer};
use crate::purchase::{BatchPurchaseOrchestrator, PurchaseClient, PurchaseMode};
use crate::reconcile::reconcile_at;
use crate::retrieval::{RateLimitedRetriever, RetryPolicy};
use crate::source::{RecommendationParams, RecommendationSource};

pub const EXIT_OK: u8 = 0;
pub const EXIT_PIPELINE_FAILURE: u8 = 5;
pub const EXIT_PURCHASE_FAILURE: u8 = 6;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineSettings {
    pub services: Vec<ServiceKind>,
    pub regions: Vec<String>,
    pub payment_option: PaymentOption,
    pub term_years: u32,
    pub lookback_days: u32,
    pub coverage_percent: Decimal,
    pub account_id: Option<String>,
    pub filter: RecommendationFilter,
    pub purchase_mode: PurchaseMode,
    pub delay_between: Duration,
    pub duplicate_lookback_hours: u32,
    pub retry: RetryPolicy,
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let pipeline = &config.pipeline;
        let purchase_mode = if config.purchase.dry_run {
            PurchaseMode::DryRun
        } else {
            PurchaseMode::Live { validate_offerings: config.purchase.validate_offerings }
        };

        Self {
            services: pipeline.services.clone(),
            regions: pipeline.regions.clone(),
            payment_option: pipeline.payment_option,
            term_years: pipeline.term_years,
            lookback_days: pipeline.lookback_days,
            coverage_percent: pipeline.coverage_percent,
            account_id: pipeline.account_id.clone(),
            filter: RecommendationFilter {
                include_instance_types: pipeline.include_instance_types.clone(),
                exclude_instance_types: pipeline.exclude_instance_types.clone(),
                include_regions: pipeline.include_regions.clone(),
                exclude_regions: pipeline.exclude_regions.clone(),
            },
            purchase_mode,
            delay_between: Duration::from_millis(config.purchase.delay_between_ms),
            duplicate_lookback_hours: config.purchase.duplicate_lookback_hours,
            retry: RetryPolicy {
                max_retries: config.retry.max_retries,
                base_delay_ms: config.retry.base_delay_ms,
                max_delay_ms: config.retry.max_delay_ms,
            },
        }
    }

    pub fn params(&self, service: ServiceKind) -> RecommendationParams {
        RecommendationParams {
            service,
            region: None,
            payment_option: self.payment_option,
            term_years: self.term_years,
            lookback_days: self.lookback_days,
            account_id: self.account_id.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ServiceStats {
    pub service: ServiceKind,
    pub regions_processed: usize,
    pub recommendations_found: usize,
    pub recommendations_selected: usize,
    pub instances: u64,
    pub purchases_succeeded: usize,
    pub purchases_failed: usize,
    pub records_skipped: usize,
    pub estimated_savings: Decimal,
    pub actual_cost: Decimal,
    pub error: Option<String>,
    pub error_class: Option<String>,
    pub warnings: Vec<NormalizeWarning>,
    pub results: Vec<PurchaseResult>,
}

impl ServiceStats {
    pub fn new(service: ServiceKind) -> Self {
        Self {
            service,
            regions_processed: 0,
            recommendations_found: 0,
            recommendations_selected: 0,
            instances: 0,
            purchases_succeeded: 0,
            purchases_failed: 0,
            records_skipped: 0,
            estimated_savings: Decimal::ZERO,
            actual_cost: Decimal::ZERO,
            error: None,
            error_class: None,
            warnings: Vec::new(),
            results: Vec::new(),
        }
    }

    fn select(&mut self, selected: &[Recommendation]) {
        self.recommendations_selected += selected.len();
        for recommendation in selected {
            self.instances += u64::from(recommendation.count);
            self.estimated_savings += recommendation.estimated_cost;
        }
    }

    fn absorb(&mut self, results: Vec<PurchaseResult>) {
        for result in &results {
            if result.success {
                self.purchases_succeeded += 1;
                self.actual_cost += result.actual_cost;
            } else {
                self.purchases_failed += 1;
            }
        }
        self.results.extend(results);
    }

    fn fail(&mut self, error: &PipelineError) {
        self.error = Some(error.to_string());
        self.error_class = Some(error.error_class().to_string());
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub dry_run: bool,
    pub cancelled: bool,
    pub services: Vec<ServiceStats>,
}

impl RunSummary {
    pub fn regions_processed(&self) -> usize {
        self.services.iter().map(|stats| stats.regions_processed).sum()
    }

    pub fn recommendations_found(&self) -> usize {
        self.services.iter().map(|stats| stats.recommendations_found).sum()
    }

    pub fn recommendations_selected(&self) -> usize {
        self.services.iter().map(|stats| stats.recommendations_selected).sum()
    }

    pub fn instances(&self) -> u64 {
        self.services.iter().map(|stats| stats.instances).sum()
    }

    pub fn purchases_succeeded(&self) -> usize {
        self.services.iter().map(|stats| stats.purchases_succeeded).sum()
    }

    pub fn purchases_failed(&self) -> usize {
        self.services.iter().map(|stats| stats.purchases_failed).sum()
    }

    pub fn estimated_savings(&self) -> Decimal {
        self.services.iter().map(|stats| stats.estimated_savings).sum()
    }

    pub fn failed_services(&self) -> Vec<ServiceKind> {
        self.services.iter().filter(|stats| stats.error.is_some()).map(|stats| stats.service).collect()
    }

    /// 6 when any attempted purchase failed, 5 when a service or the run
    /// itself could not complete, 0 otherwise.
    pub fn exit_code(&self) -> u8 {
        if self.purchases_failed() > 0 {
            EXIT_PURCHASE_FAILURE
        } else if self.cancelled || !self.failed_services().is_empty() {
            EXIT_PIPELINE_FAILURE
        } else {
            EXIT_OK
        }
    }
}

pub struct ServiceProcessor {
    source: Arc<dyn RecommendationSource>,
    clients: BTreeMap<ServiceKind, Arc<dyn PurchaseClient>>,
    normalizer: Normalizer,
    retriever: RateLimitedRetriever,
    audit: Arc<dyn AuditSink>,
    settings: PipelineSettings,
    run_id: String,
}

impl ServiceProcessor {
    pub fn new(source: Arc<dyn RecommendationSource>, settings: PipelineSettings) -> Self {
        Self {
            source,
            clients: BTreeMap::new(),
            normalizer: Normalizer::default(),
            retriever: RateLimitedRetriever::new(settings.retry.clone()),
            audit: Arc::new(TracingAuditSink),
            settings,
            run_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn with_client(mut self, client: Arc<dyn PurchaseClient>) -> Self {
        self.clients.insert(client.service(), client);
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Processes every configured service in order. A failing service is
    /// recorded and the run moves on; cancellation stops the run.
    pub async fn run(&self, signal: &CancellationSignal) -> RunSummary {
        let mut summary = RunSummary {
            run_id: self.run_id.clone(),
            dry_run: self.settings.purchase_mode.is_dry_run(),
            cancelled: false,
            services: Vec::with_capacity(self.settings.services.len()),
        };

        for service in &self.settings.services {
            if signal.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let mut stats = ServiceStats::new(*service);
            if let Err(error) = self.process_service(*service, signal, &mut stats).await {
                stats.fail(&error);
                if error.is_cancelled() {
                    warn!(
                        event_name = "pipeline.run.cancelled",
                        service = %service,
                        "run cancelled; remaining services skipped"
                    );
                    summary.services.push(stats);
                    summary.cancelled = true;
                    break;
                }
                error!(
                    event_name = "pipeline.service.failed",
                    service = %service,
                    error_class = error.error_class(),
                    error = %error,
                    "service processing failed; continuing with next service"
                );
                self.record_failure(*service, &error);
            }
            summary.services.push(stats);
        }

        let outcome = match summary.exit_code() {
            EXIT_OK if summary.dry_run => AuditOutcome::Simulated,
            EXIT_OK => AuditOutcome::Success,
            _ => AuditOutcome::Failed,
        };
        self.audit.emit(
            AuditEvent::new(
                self.run_id.clone(),
                "pipeline.run.completed",
                AuditCategory::System,
                "service-processor",
                outcome,
            )
            .with_metadata("services", summary.services.len().to_string())
            .with_metadata("selected", summary.recommendations_selected().to_string())
            .with_metadata("succeeded", summary.purchases_succeeded().to_string())
            .with_metadata("failed", summary.purchases_failed().to_string())
            .with_metadata("cancelled", summary.cancelled.to_string()),
        );

        summary
    }

    fn record_failure(&self, service: ServiceKind, error: &PipelineError) {
        let category = match error {
            PipelineError::Retrieval(_) => AuditCategory::Retrieval,
            _ => AuditCategory::System,
        };
        let mut event = AuditEvent::new(
            self.run_id.clone(),
            "pipeline.service.failed",
            category,
            "service-processor",
            AuditOutcome::Failed,
        )
        .for_service(service)
        .with_metadata("error_class", error.error_class())
        .with_metadata("error", error.to_string());
        if let PipelineError::Retrieval(retrieval) = error {
            event = event.with_metadata("attempts", retrieval.attempts().to_string());
        }
        self.audit.emit(event);
    }

    pub async fn process_service(
        &self,
        service: ServiceKind,
        signal: &CancellationSignal,
        stats: &mut ServiceStats,
    ) -> Result<(), PipelineError> {
        let client =
            self.clients.get(&service).cloned().ok_or(PipelineError::MissingPurchaseClient(service))?;
        let params = self.settings.params(service);
        info!(event_name = "pipeline.service.started", service = %service, "processing service");

        let regions = self.resolve_regions(service, &params, signal).await?;
        let commitments = client
            .list_existing_commitments()
            .await
            .map_err(|source| PipelineError::Inventory { service, source })?;

        let mut collected = Vec::new();
        for region in &regions {
            if signal.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            let outcome = self
                .normalizer
                .collect(self.source.as_ref(), &self.retriever, signal, &params.for_region(region.clone()))
                .await?;
            let owned = outcome
                .recommendations
                .into_iter()
                .filter(|recommendation| in_pass(service, region.as_deref(), recommendation))
                .collect::<Vec<_>>();
            stats.regions_processed += 1;
            stats.recommendations_found += owned.len();
            stats.records_skipped += outcome.warnings.len();
            stats.warnings.extend(outcome.warnings);
            collected.extend(self.settings.filter.apply(owned));
        }

        let (reconciled, report) = reconcile_at(
            &collected,
            &commitments,
            self.settings.duplicate_lookback_hours,
            Utc::now(),
        );
        if report.removed > 0 || report.reduced > 0 {
            self.audit.emit(
                AuditEvent::new(
                    self.run_id.clone(),
                    "pipeline.reconcile.applied",
                    AuditCategory::Reconcile,
                    "service-processor",
                    AuditOutcome::Success,
                )
                .for_service(service)
                .with_metadata("reduced", report.reduced.to_string())
                .with_metadata("removed", report.removed.to_string()),
            );
        }

        let orchestrator = BatchPurchaseOrchestrator::new(client, self.settings.purchase_mode)
            .with_delay(self.settings.delay_between)
            .with_audit(self.audit.clone(), self.run_id.clone());

        for region in &regions {
            let in_region = reconciled
                .iter()
                .filter(|recommendation| in_pass(service, region.as_deref(), recommendation))
                .cloned()
                .collect::<Vec<_>>();
            let selected = coverage::scale(&in_region, self.settings.coverage_percent);
            stats.select(&selected);

            let results = orchestrator.batch_purchase(&selected, signal).await;
            let interrupted = results.is_err();
            stats.absorb(match results {
                Ok(results) => results,
                Err(interrupted) => interrupted.completed,
            });
            if interrupted {
                return Err(PipelineError::Cancelled);
            }

            info!(
                event_name = "pipeline.region.processed",
                service = %service,
                region = region.as_deref().unwrap_or("*"),
                candidates = in_region.len(),
                selected = selected.len(),
                "region processed"
            );
        }

        info!(
            event_name = "pipeline.service.completed",
            service = %service,
            regions = stats.regions_processed,
            found = stats.recommendations_found,
            selected = stats.recommendations_selected,
            instances = stats.instances,
            succeeded = stats.purchases_succeeded,
            failed = stats.purchases_failed,
            estimated_savings = %stats.estimated_savings,
            "service processed"
        );
        Ok(())
    }

    /// Savings plans always take one `None` pass. Otherwise explicit regions
    /// win over discovery, and discovery appends a `None` pass when some
    /// records carry no region.
    async fn resolve_regions(
        &self,
        service: ServiceKind,
        params: &RecommendationParams,
        signal: &CancellationSignal,
    ) -> Result<Vec<Option<String>>, PipelineError> {
        if service.is_region_flexible() {
            return Ok(vec![None]);
        }

        if !self.settings.regions.is_empty() {
            let mut seen = BTreeSet::new();
            return Ok(self
                .settings
                .regions
                .iter()
                .map(|region| normalize_region(region.trim()))
                .filter(|region| seen.insert(region.clone()))
                .map(Some)
                .collect());
        }

        let discovery = self
            .normalizer
            .collect(self.source.as_ref(), &self.retriever, signal, &params.for_region(None))
            .await?;
        let regions = discovery.regions();
        let regionless = discovery
            .recommendations
            .iter()
            .filter(|recommendation| recommendation.region.is_empty())
            .count();
        info!(
            event_name = "pipeline.regions.discovered",
            service = %service,
            regions = %regions.join(","),
            "discovered regions"
        );

        let mut passes = regions.into_iter().map(Some).collect::<Vec<_>>();
        if regionless > 0 {
            warn!(
                event_name = "pipeline.regions.unattributed",
                service = %service,
                recommendations = regionless,
                "recommendations without a region are purchased once in a region-less pass"
            );
            passes.push(None);
        }
        Ok(passes)
    }
}

/// Whether `recommendation` belongs to the pass for `region`. The `None`
/// pass owns everything for region-flexible services and only the
/// region-less remainder otherwise.
fn in_pass(service: ServiceKind, region: Option<&str>, recommendation: &Recommendation) -> bool {
    match region {
        Some(region) => region_matches(Some(region), &recommendation.region),
        None if service.is_region_flexible() => true,
        None => recommendation.region.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};
    use rust_decimal::Decimal;
    use serde_json::{json, Value};

    use crate::audit::{AuditCategory, AuditOutcome, InMemoryAuditSink};
    use crate::cancel::CancellationSignal;
    use crate::config::AppConfig;
    use crate::domain::commitment::{CommitmentState, ExistingCommitment};
    use crate::domain::recommendation::SavingsPlanType;
    use crate::domain::service::ServiceKind;
    use crate::domain::terms::PaymentOption;
    use crate::filter::RecommendationFilter;
    use crate::purchase::{InMemoryPurchaseClient, PurchaseMode};
    use crate::retrieval::RetryPolicy;
    use crate::source::{
        InMemoryRecommendationSource, RawRecommendationBatch, RecommendationParams,
        RecommendationSource, SourceError,
    };

    use super::{PipelineSettings, ServiceProcessor, EXIT_OK, EXIT_PIPELINE_FAILURE, EXIT_PURCHASE_FAILURE};

    fn settings(services: Vec<ServiceKind>) -> PipelineSettings {
        PipelineSettings {
            services,
            regions: Vec::new(),
            payment_option: PaymentOption::NoUpfront,
            term_years: 1,
            lookback_days: 7,
            coverage_percent: Decimal::ONE_HUNDRED,
            account_id: None,
            filter: RecommendationFilter::default(),
            purchase_mode: PurchaseMode::Live { validate_offerings: true },
            delay_between: Duration::ZERO,
            duplicate_lookback_hours: 24,
            retry: RetryPolicy::immediate(0),
        }
    }

    fn rds_record(instance_type: &str, region: &str, quantity: &str) -> Value {
        json!({
            "RecommendedNumberOfInstancesToPurchase": quantity,
            "UpfrontCost": "0",
            "RecurringStandardMonthlyCost": "30",
            "EstimatedMonthlySavingsAmount": "12.5",
            "EstimatedMonthlySavingsPercentage": "25",
            "InstanceDetails": {"RDSInstanceDetails": {
                "InstanceType": instance_type,
                "Region": region,
                "DatabaseEngine": "MySQL"
            }}
        })
    }

    fn rds_source() -> InMemoryRecommendationSource {
        InMemoryRecommendationSource::default().with_records(
            ServiceKind::Rds,
            vec![
                rds_record("db.t3.micro", "us-west-2", "4"),
                rds_record("db.r6g.large", "US East (N. Virginia)", "2.0"),
                rds_record("db.t3.micro", "us-east-1", "5"),
                json!({"RecommendedNumberOfInstancesToPurchase": "x"}),
            ],
        )
    }

    fn recent_commitment() -> ExistingCommitment {
        ExistingCommitment {
            commitment_id: "ri-recent".to_string(),
            service: ServiceKind::Rds,
            instance_type: "db.t3.micro".to_string(),
            region: "us-east-1".to_string(),
            engine: Some("mysql".to_string()),
            payment_option: "No Upfront".to_string(),
            term_months: 12,
            count: 5,
            state: CommitmentState::Active,
            start_time: Utc::now() - ChronoDuration::hours(3),
        }
    }

    #[tokio::test]
    async fn discovers_regions_reconciles_and_purchases_in_order() {
        let client = Arc::new(
            InMemoryPurchaseClient::new(ServiceKind::Rds).with_commitments(vec![recent_commitment()]),
        );
        let audit = Arc::new(InMemoryAuditSink::default());
        let processor = ServiceProcessor::new(Arc::new(rds_source()), settings(vec![ServiceKind::Rds]))
            .with_client(client.clone())
            .with_audit(audit.clone());

        let summary = processor.run(&CancellationSignal::new()).await;
        let stats = &summary.services[0];

        assert_eq!(stats.error, None);
        assert_eq!(stats.regions_processed, 2);
        assert_eq!(stats.recommendations_found, 3);
        assert_eq!(stats.records_skipped, 2, "bad record is skipped in each region pass");
        assert_eq!(stats.recommendations_selected, 2);
        assert_eq!(stats.instances, 6);
        assert_eq!(stats.purchases_succeeded, 2);
        assert_eq!(stats.estimated_savings, Decimal::new(25, 0));
        assert_eq!(
            stats.results.iter().map(|result| result.recommendation.region.as_str()).collect::<Vec<_>>(),
            vec!["us-east-1", "us-west-2"]
        );
        assert_eq!(summary.exit_code(), EXIT_OK);
        assert_eq!(client.purchase_calls().len(), 2);
        assert!(audit.events().iter().any(|event| event.event_type == "pipeline.reconcile.applied"));
        assert!(audit.events().iter().any(|event| event.event_type == "pipeline.run.completed"));
    }

    #[tokio::test]
    async fn zero_quantity_records_never_reach_the_purchase_client() {
        let source = InMemoryRecommendationSource::default().with_records(
            ServiceKind::Rds,
            vec![rds_record("db.t3.micro", "us-west-2", "0"), rds_record("db.r6g.large", "us-west-2", "3")],
        );
        let client = Arc::new(InMemoryPurchaseClient::new(ServiceKind::Rds));
        let audit = Arc::new(InMemoryAuditSink::default());
        let processor = ServiceProcessor::new(Arc::new(source), settings(vec![ServiceKind::Rds]))
            .with_client(client.clone())
            .with_audit(audit.clone());

        let summary = processor.run(&CancellationSignal::new()).await;
        let stats = &summary.services[0];

        assert_eq!(stats.recommendations_found, 2);
        assert_eq!(stats.recommendations_selected, 1);
        assert_eq!(stats.instances, 3);
        assert_eq!(stats.purchases_failed, 0);
        assert_eq!(client.purchase_calls().len(), 1);
        assert_eq!(summary.exit_code(), EXIT_OK);
        assert!(audit.events().iter().any(|event| {
            event.event_type == "pipeline.reconcile.applied"
                && event.metadata.get("removed").map(String::as_str) == Some("1")
        }));
    }

    fn memorydb_record(node_type: Option<&str>, region: &str, quantity: &str) -> Value {
        let mut record = json!({
            "RecommendedNumberOfInstancesToPurchase": quantity,
            "UpfrontCost": "0",
            "RecurringStandardMonthlyCost": "120",
            "EstimatedMonthlySavingsAmount": "40"
        });
        if let Some(node_type) = node_type {
            record["InstanceDetails"] =
                json!({"MemoryDBInstanceDetails": {"NodeType": node_type, "Region": region}});
        }
        record
    }

    #[tokio::test]
    async fn regionless_memorydb_records_are_bought_once() {
        let source = InMemoryRecommendationSource::default().with_records(
            ServiceKind::MemoryDb,
            vec![
                memorydb_record(Some("db.r6g.large"), "us-east-1", "1"),
                memorydb_record(Some("db.r6g.large"), "eu-west-1", "1"),
                memorydb_record(None, "", "7"),
            ],
        );
        let source = Arc::new(source);
        let client = Arc::new(InMemoryPurchaseClient::new(ServiceKind::MemoryDb));
        let processor = ServiceProcessor::new(source.clone(), settings(vec![ServiceKind::MemoryDb]))
            .with_client(client.clone());

        let summary = processor.run(&CancellationSignal::new()).await;
        let stats = &summary.services[0];

        assert_eq!(stats.error, None);
        assert_eq!(stats.regions_processed, 3, "two regions plus one region-less pass");
        assert_eq!(stats.instances, 9);
        assert_eq!(
            stats.results.iter().map(|result| result.recommendation.count).collect::<Vec<_>>(),
            vec![1, 1, 7]
        );
        assert_eq!(client.purchase_calls().len(), 3);
        assert_eq!(summary.exit_code(), EXIT_OK);

        let mut explicit = settings(vec![ServiceKind::MemoryDb]);
        explicit.regions = vec!["us-east-1".to_string()];
        let scoped = ServiceProcessor::new(source, explicit)
            .with_client(Arc::new(InMemoryPurchaseClient::new(ServiceKind::MemoryDb)));
        let summary = scoped.run(&CancellationSignal::new()).await;
        assert_eq!(summary.instances(), 1, "explicit regions leave region-less records out");
    }

    #[tokio::test]
    async fn coverage_and_filters_shape_the_selection() {
        let mut settings = settings(vec![ServiceKind::Rds]);
        settings.coverage_percent = Decimal::new(50, 0);
        settings.regions = vec!["us-west-2".to_string(), "US West (Oregon)".to_string()];
        settings.filter.exclude_instance_types = vec!["db.r6g.large".to_string()];
        let client = Arc::new(InMemoryPurchaseClient::new(ServiceKind::Rds));
        let processor =
            ServiceProcessor::new(Arc::new(rds_source()), settings).with_client(client.clone());

        let summary = processor.run(&CancellationSignal::new()).await;
        let stats = &summary.services[0];

        assert_eq!(stats.regions_processed, 1, "duplicate regions collapse after normalization");
        assert_eq!(stats.recommendations_selected, 1);
        assert_eq!(stats.instances, 2);
        assert_eq!(stats.results[0].recommendation.count, 2);
    }

    #[tokio::test]
    async fn failed_purchases_set_exit_code_six() {
        let client = Arc::new(
            InMemoryPurchaseClient::new(ServiceKind::Rds).with_failing_instance_type("db.r6g.large"),
        );
        let processor = ServiceProcessor::new(Arc::new(rds_source()), settings(vec![ServiceKind::Rds]))
            .with_client(client);

        let summary = processor.run(&CancellationSignal::new()).await;

        assert_eq!(summary.purchases_failed(), 1);
        assert_eq!(summary.purchases_succeeded(), 2);
        assert_eq!(summary.exit_code(), EXIT_PURCHASE_FAILURE);
    }

    #[tokio::test]
    async fn service_failures_are_recorded_and_the_run_continues() {
        let rds = Arc::new(InMemoryPurchaseClient::new(ServiceKind::Rds).with_inventory_error("AccessDenied"));
        let processor = ServiceProcessor::new(
            Arc::new(rds_source()),
            settings(vec![ServiceKind::Ec2, ServiceKind::Rds, ServiceKind::Redshift]),
        )
        .with_client(rds)
        .with_client(Arc::new(InMemoryPurchaseClient::new(ServiceKind::Redshift)));

        let summary = processor.run(&CancellationSignal::new()).await;

        assert_eq!(summary.services.len(), 3);
        assert_eq!(summary.services[0].error_class.as_deref(), Some("configuration"));
        assert_eq!(summary.services[1].error_class.as_deref(), Some("commitment_inventory"));
        assert_eq!(summary.services[2].error, None);
        assert_eq!(summary.failed_services(), vec![ServiceKind::Ec2, ServiceKind::Rds]);
        assert_eq!(summary.exit_code(), EXIT_PIPELINE_FAILURE);
    }

    #[tokio::test]
    async fn savings_plans_take_a_single_regionless_pass() {
        let source = InMemoryRecommendationSource::default()
            .with_savings_plans(SavingsPlanType::Compute, vec![json!({"HourlyCommitmentToPurchase": "2"})])
            .with_savings_plan_failure(
                SavingsPlanType::SageMaker,
                SourceError::Rejected("not subscribed".to_string()),
            );
        let mut settings = settings(vec![ServiceKind::SavingsPlans]);
        settings.purchase_mode = PurchaseMode::DryRun;
        let processor = ServiceProcessor::new(Arc::new(source), settings)
            .with_client(Arc::new(InMemoryPurchaseClient::new(ServiceKind::SavingsPlans)));

        let summary = processor.run(&CancellationSignal::new()).await;
        let stats = &summary.services[0];

        assert_eq!(stats.regions_processed, 1);
        assert_eq!(stats.recommendations_selected, 1);
        assert_eq!(stats.records_skipped, 1);
        assert!(summary.dry_run);
        assert!(stats.results[0].purchase_id.as_deref().is_some_and(|id| id.starts_with("dryrun-")));
        assert_eq!(summary.exit_code(), EXIT_OK);
    }

    struct ThrottledSource;

    #[async_trait]
    impl RecommendationSource for ThrottledSource {
        async fn fetch(
            &self,
            _params: &RecommendationParams,
        ) -> Result<RawRecommendationBatch, SourceError> {
            Err(SourceError::Throttled("Rate exceeded".to_string()))
        }

        async fn fetch_savings_plans(
            &self,
            _plan_type: SavingsPlanType,
            _params: &RecommendationParams,
        ) -> Result<RawRecommendationBatch, SourceError> {
            Err(SourceError::Throttled("Rate exceeded".to_string()))
        }
    }

    #[tokio::test]
    async fn exhausted_retrieval_reports_attempts() {
        let mut settings = settings(vec![ServiceKind::Rds]);
        settings.retry = RetryPolicy::immediate(2);
        let audit = Arc::new(InMemoryAuditSink::default());
        let processor = ServiceProcessor::new(Arc::new(ThrottledSource), settings)
            .with_client(Arc::new(InMemoryPurchaseClient::new(ServiceKind::Rds)))
            .with_audit(audit.clone());

        let summary = processor.run(&CancellationSignal::new()).await;

        assert_eq!(summary.services[0].error_class.as_deref(), Some("retrieval"));
        assert!(summary.services[0].error.as_deref().is_some_and(|error| error.contains("3 attempt")));

        let events = audit.events();
        let failure = events.iter().find(|event| event.event_type == "pipeline.service.failed");
        assert!(failure.is_some_and(|event| {
            event.category == AuditCategory::Retrieval
                && event.outcome == AuditOutcome::Failed
                && event.metadata.get("attempts").map(String::as_str) == Some("3")
        }));
    }

    #[tokio::test]
    async fn cancelled_signal_stops_before_any_service() {
        let signal = CancellationSignal::new();
        signal.cancel();
        let processor = ServiceProcessor::new(Arc::new(rds_source()), settings(vec![ServiceKind::Rds]))
            .with_client(Arc::new(InMemoryPurchaseClient::new(ServiceKind::Rds)));

        let summary = processor.run(&signal).await;

        assert!(summary.cancelled);
        assert!(summary.services.is_empty());
        assert_eq!(summary.exit_code(), EXIT_PIPELINE_FAILURE);
    }

    #[test]
    fn settings_follow_config_purchase_mode() {
        let mut config = AppConfig::default();
        assert_eq!(PipelineSettings::from_config(&config).purchase_mode, PurchaseMode::DryRun);

        config.purchase.dry_run = false;
        config.purchase.validate_offerings = false;
        let settings = PipelineSettings::from_config(&config);
        assert_eq!(settings.purchase_mode, PurchaseMode::Live { validate_offerings: false });
        assert_eq!(settings.delay_between, Duration::from_millis(5_000));
        assert_eq!(settings.params(ServiceKind::Ec2).term_years, 3);
    }
}
