use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::service::ServiceKind;
use crate::domain::terms::PaymentOption;
use crate::errors::RecordError;

/// Node type recorded when the provider does not report one.
pub const UNKNOWN_NODE_TYPE: &str = "unknown";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AzConfig {
    SingleAz,
    MultiAz,
}

impl AzConfig {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SingleAz => "single-az",
            Self::MultiAz => "multi-az",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tenancy {
    Shared,
    Dedicated,
    Host,
}

impl Tenancy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shared => "shared",
            Self::Dedicated => "dedicated",
            Self::Host => "host",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationScope {
    Region,
    AvailabilityZone(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClusterType {
    SingleNode,
    MultiNode,
}

impl ClusterType {
    pub fn for_nodes(number_of_nodes: u32) -> Self {
        if number_of_nodes > 1 {
            Self::MultiNode
        } else {
            Self::SingleNode
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SingleNode => "single-node",
            Self::MultiNode => "multi-node",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SavingsPlanType {
    Compute,
    Ec2Instance,
    SageMaker,
}

impl SavingsPlanType {
    pub const ALL: [SavingsPlanType; 3] = [Self::Compute, Self::Ec2Instance, Self::SageMaker];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compute => "compute",
            Self::Ec2Instance => "ec2_instance",
            Self::SageMaker => "sagemaker",
        }
    }

    pub fn provider_label(&self) -> &'static str {
        match self {
            Self::Compute => "COMPUTE_SP",
            Self::Ec2Instance => "EC2_INSTANCE_SP",
            Self::SageMaker => "SAGEMAKER_SP",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "compute" | "compute_sp" => Some(Self::Compute),
            "ec2_instance" | "ec2_instance_sp" | "ec2" => Some(Self::Ec2Instance),
            "sagemaker" | "sagemaker_sp" => Some(Self::SageMaker),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RdsDetails {
    pub engine: String,
    pub az_config: AzConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElastiCacheDetails {
    pub engine: String,
    pub node_type: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ec2Details {
    pub platform: String,
    pub tenancy: Tenancy,
    pub scope: ReservationScope,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenSearchDetails {
    pub instance_type: String,
    pub instance_count: u32,
    pub master_enabled: bool,
    pub master_type: Option<String>,
    pub master_count: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedshiftDetails {
    pub node_type: String,
    pub cluster_type: ClusterType,
    pub number_of_nodes: u32,
}

/// Only `shard_count` is trustworthy: the recommendation API does not expose
/// MemoryDB instance detail, so the node type may be [`UNKNOWN_NODE_TYPE`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryDbDetails {
    pub node_type: String,
    pub shard_count: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavingsPlanDetails {
    pub plan_type: SavingsPlanType,
    pub hourly_commitment: Decimal,
    pub instance_family: Option<String>,
    pub offering_id: Option<String>,
}

/// Service-specific shape of a recommendation. The variant is the
/// discriminant: it must agree with [`Recommendation::service`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServiceDetails {
    Rds(RdsDetails),
    ElastiCache(ElastiCacheDetails),
    Ec2(Ec2Details),
    OpenSearch(OpenSearchDetails),
    Redshift(RedshiftDetails),
    MemoryDb(MemoryDbDetails),
    SavingsPlans(SavingsPlanDetails),
}

impl ServiceDetails {
    pub fn service_kind(&self) -> ServiceKind {
        match self {
            Self::Rds(_) => ServiceKind::Rds,
            Self::ElastiCache(_) => ServiceKind::ElastiCache,
            Self::Ec2(_) => ServiceKind::Ec2,
            Self::OpenSearch(_) => ServiceKind::OpenSearch,
            Self::Redshift(_) => ServiceKind::Redshift,
            Self::MemoryDb(_) => ServiceKind::MemoryDb,
            Self::SavingsPlans(_) => ServiceKind::SavingsPlans,
        }
    }

    /// Engine label, for services that have one.
    pub fn engine(&self) -> Option<&str> {
        match self {
            Self::Rds(details) => Some(details.engine.as_str()),
            Self::ElastiCache(details) => Some(details.engine.as_str()),
            Self::Ec2(_)
            | Self::OpenSearch(_)
            | Self::Redshift(_)
            | Self::MemoryDb(_)
            | Self::SavingsPlans(_) => None,
        }
    }

    pub fn description(&self) -> String {
        match self {
            Self::Rds(details) => format!("{} {}", details.engine, details.az_config.as_str()),
            Self::ElastiCache(details) => details.engine.clone(),
            Self::Ec2(details) => {
                let scope = match &details.scope {
                    ReservationScope::Region => "regional".to_string(),
                    ReservationScope::AvailabilityZone(zone) => format!("zonal {zone}"),
                };
                format!("{} {} {scope}", details.platform, details.tenancy.as_str())
            }
            Self::OpenSearch(details) => {
                let mut text = format!("{} data node(s)", details.instance_count);
                if details.master_enabled {
                    let master_type = details.master_type.as_deref().unwrap_or(UNKNOWN_NODE_TYPE);
                    text.push_str(&format!(", {} x {master_type} master", details.master_count));
                }
                text
            }
            Self::Redshift(details) => {
                format!("{} {} node(s)", details.cluster_type.as_str(), details.number_of_nodes)
            }
            Self::MemoryDb(details) => format!("{} shard(s)", details.shard_count),
            Self::SavingsPlans(details) => {
                let mut text =
                    format!("{} {}/h", details.plan_type.as_str(), details.hourly_commitment);
                if let Some(family) = &details.instance_family {
                    text.push_str(&format!(" {family}"));
                }
                text
            }
        }
    }

    /// Rewrites the fields that are derived from the purchased quantity.
    pub fn with_count(&self, count: u32) -> Self {
        match self {
            Self::OpenSearch(details) => {
                Self::OpenSearch(OpenSearchDetails { instance_count: count, ..details.clone() })
            }
            Self::Redshift(details) => Self::Redshift(RedshiftDetails {
                cluster_type: ClusterType::for_nodes(count),
                number_of_nodes: count,
                ..details.clone()
            }),
            Self::MemoryDb(details) => {
                Self::MemoryDb(MemoryDbDetails { shard_count: count, ..details.clone() })
            }
            other => other.clone(),
        }
    }
}

/// Canonical, service-agnostic purchase suggestion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub service: ServiceKind,
    /// Normalized region code; empty for region-flexible commitments.
    pub region: String,
    /// Empty for savings plans.
    pub instance_type: String,
    pub count: u32,
    pub payment_option: PaymentOption,
    pub term_months: u32,
    /// Estimated monthly savings reported upstream.
    pub estimated_cost: Decimal,
    pub savings_percent: Decimal,
    pub upfront_cost: Decimal,
    pub recurring_monthly_cost: Decimal,
    pub estimated_monthly_on_demand: Decimal,
    pub account_id: Option<String>,
    pub account_name: Option<String>,
    pub details: ServiceDetails,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

impl Recommendation {
    pub fn ensure_consistent(&self) -> Result<(), RecordError> {
        let detail = self.details.service_kind();
        if detail != self.service {
            return Err(RecordError::DetailMismatch { declared: self.service, detail });
        }
        Ok(())
    }

    /// New value with `count` replaced and every count-derived field resynced.
    pub fn with_count(&self, count: u32) -> Self {
        let mut next =
            Self { count, details: self.details.with_count(count), ..self.clone() };
        next.description = describe(&next);
        next
    }

    pub fn engine(&self) -> Option<&str> {
        self.details.engine()
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

/// Deterministic audit description of a recommendation.
pub fn describe(recommendation: &Recommendation) -> String {
    let mut parts = vec![recommendation.service.display_name().to_string()];
    if !recommendation.instance_type.is_empty() {
        parts.push(format!("{}x {}", recommendation.count, recommendation.instance_type));
    }
    parts.push(recommendation.details.description());

    let location =
        if recommendation.region.is_empty() { "any region" } else { &recommendation.region };
    format!(
        "{} ({location}, {}, {}mo)",
        parts.join(" "),
        recommendation.payment_option,
        recommendation.term_months
    )
}
