pub mod audit;
pub mod cancel;
pub mod config;
pub mod coverage;
pub mod domain;
pub mod errors;
pub mod filter;
pub mod normalize;
pub mod processor;
pub mod purchase;
pub mod reconcile;
pub mod retrieval;
pub mod source;

pub use audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use cancel::CancellationSignal;
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use domain::commitment::{CommitmentState, ExistingCommitment};
pub use domain::purchase::{OfferingDetails, PurchaseResult};
pub use domain::recommendation::{Recommendation, SavingsPlanType, ServiceDetails};
pub use domain::service::ServiceKind;
pub use domain::terms::PaymentOption;
pub use errors::{PipelineError, RecordError};
pub use filter::RecommendationFilter;
pub use normalize::{NormalizeOutcome, NormalizeWarning, Normalizer};
pub use processor::{PipelineSettings, RunSummary, ServiceProcessor, ServiceStats};
pub use purchase::{
    BatchPurchaseOrchestrator, InMemoryPurchaseClient, PurchaseClient, PurchaseError,
    PurchaseInterrupted, PurchaseMode,
};
pub use reconcile::{reconcile, ReconcileReport};
pub use retrieval::{RateLimitedRetriever, RetrievalError, RetryPolicy};
pub use source::{
    InMemoryRecommendationSource, RawRecommendationBatch, RecommendationParams,
    RecommendationSource, SourceError,
};
