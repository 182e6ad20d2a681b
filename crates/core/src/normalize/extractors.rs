use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::domain::recommendation::{
    AzConfig, ClusterType, Ec2Details, ElastiCacheDetails, MemoryDbDetails, OpenSearchDetails,
    RdsDetails, RedshiftDetails, ReservationScope, ServiceDetails, Tenancy, UNKNOWN_NODE_TYPE,
};
use crate::domain::service::ServiceKind;
use crate::errors::RecordError;
use crate::normalize::raw::{
    RawEc2Details, RawElastiCacheDetails, RawMemoryDbDetails, RawOpenSearchDetails, RawRdsDetails,
    RawRedshiftDetails,
};
use crate::normalize::region::normalize_region;
use crate::normalize::values::{non_empty, normalize_engine, required};
pub const DEFAULT_EC2_PLATFORM: &str = "Linux/UNIX";
pub const DEFAULT_CACHE_ENGINE: &str = "redis";

pub struct ExtractionInput<'a> {
    pub instance_details: Option<&'a Value>,
    pub count: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractedDetail {
    pub region: String,
    pub instance_type: String,
    pub details: ServiceDetails,
}

/// Reads one service's nested detail object out of a raw record.
pub trait DetailExtractor: Send + Sync {
    fn service(&self) -> ServiceKind;
    fn extract(&self, input: &ExtractionInput<'_>) -> Result<ExtractedDetail, RecordError>;
}

/// Extractors keyed by service; adding a service means registering one more.
pub struct ExtractorRegistry {
    extractors: BTreeMap<ServiceKind, Box<dyn DetailExtractor>>,
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(RdsExtractor);
        registry.register(ElastiCacheExtractor);
        registry.register(Ec2Extractor);
        registry.register(OpenSearchExtractor);
        registry.register(RedshiftExtractor);
        registry.register(MemoryDbExtractor);
        registry
    }
}

impl ExtractorRegistry {
    pub fn empty() -> Self {
        Self { extractors: BTreeMap::new() }
    }

    pub fn register(&mut self, extractor: impl DetailExtractor + 'static) {
        self.extractors.insert(extractor.service(), Box::new(extractor));
    }

    pub fn get(&self, service: ServiceKind) -> Option<&dyn DetailExtractor> {
        self.extractors.get(&service).map(|extractor| extractor.as_ref())
    }

    pub fn services(&self) -> Vec<ServiceKind> {
        self.extractors.keys().copied().collect()
    }
}

fn nested<T: DeserializeOwned>(
    input: &ExtractionInput<'_>,
    service: ServiceKind,
    key: &'static str,
) -> Result<T, RecordError> {
    let value = input
        .instance_details
        .and_then(|details| details.get(key))
        .filter(|value| !value.is_null())
        .ok_or(RecordError::MissingDetail { service, field: key })?;

    serde_json::from_value(value.clone())
        .map_err(|error| RecordError::Malformed(format!("{key}: {error}")))
}

fn region(value: Option<String>) -> Result<String, RecordError> {
    required(value, "Region").map(|region| normalize_region(&region))
}

pub struct RdsExtractor;

impl DetailExtractor for RdsExtractor {
    fn service(&self) -> ServiceKind {
        ServiceKind::Rds
    }

    fn extract(&self, input: &ExtractionInput<'_>) -> Result<ExtractedDetail, RecordError> {
        let raw: RawRdsDetails = nested(input, ServiceKind::Rds, "RDSInstanceDetails")?;
        let az_config = match non_empty(raw.deployment_option) {
            Some(option) if option.to_ascii_lowercase().contains("multi") => AzConfig::MultiAz,
            _ => AzConfig::SingleAz,
        };

        Ok(ExtractedDetail {
            region: region(raw.region)?,
            instance_type: required(raw.instance_type, "InstanceType")?,
            details: ServiceDetails::Rds(RdsDetails {
                engine: normalize_engine(&required(raw.database_engine, "DatabaseEngine")?),
                az_config,
            }),
        })
    }
}

pub struct ElastiCacheExtractor;

impl DetailExtractor for ElastiCacheExtractor {
    fn service(&self) -> ServiceKind {
        ServiceKind::ElastiCache
    }

    fn extract(&self, input: &ExtractionInput<'_>) -> Result<ExtractedDetail, RecordError> {
        let raw: RawElastiCacheDetails =
            nested(input, ServiceKind::ElastiCache, "ElastiCacheInstanceDetails")?;
        let node_type = required(raw.node_type, "NodeType")?;
        let engine = non_empty(raw.product_description)
            .map(|label| normalize_engine(&label))
            .unwrap_or_else(|| DEFAULT_CACHE_ENGINE.to_string());

        Ok(ExtractedDetail {
            region: region(raw.region)?,
            instance_type: node_type.clone(),
            details: ServiceDetails::ElastiCache(ElastiCacheDetails { engine, node_type }),
        })
    }
}

pub struct Ec2Extractor;

impl DetailExtractor for Ec2Extractor {
    fn service(&self) -> ServiceKind {
        ServiceKind::Ec2
    }

    fn extract(&self, input: &ExtractionInput<'_>) -> Result<ExtractedDetail, RecordError> {
        let raw: RawEc2Details = nested(input, ServiceKind::Ec2, "EC2InstanceDetails")?;
        let tenancy = match non_empty(raw.tenancy).map(|value| value.to_ascii_lowercase()) {
            Some(value) if value == "dedicated" => Tenancy::Dedicated,
            Some(value) if value == "host" => Tenancy::Host,
            _ => Tenancy::Shared,
        };
        let scope = match non_empty(raw.availability_zone) {
            Some(zone) => ReservationScope::AvailabilityZone(zone),
            None => ReservationScope::Region,
        };

        Ok(ExtractedDetail {
            region: region(raw.region)?,
            instance_type: required(raw.instance_type, "InstanceType")?,
            details: ServiceDetails::Ec2(Ec2Details {
                platform: non_empty(raw.platform)
                    .unwrap_or_else(|| DEFAULT_EC2_PLATFORM.to_string()),
                tenancy,
                scope,
            }),
        })
    }
}

pub struct OpenSearchExtractor;

impl DetailExtractor for OpenSearchExtractor {
    fn service(&self) -> ServiceKind {
        ServiceKind::OpenSearch
    }

    fn extract(&self, input: &ExtractionInput<'_>) -> Result<ExtractedDetail, RecordError> {
        let raw: RawOpenSearchDetails = nested(input, ServiceKind::OpenSearch, "ESInstanceDetails")?;
        let class = required(raw.instance_class, "InstanceClass")?;
        let instance_type = if class.contains('.') {
            class
        } else {
            format!("{class}.{}.search", required(raw.instance_size, "InstanceSize")?)
        };

        Ok(ExtractedDetail {
            region: region(raw.region)?,
            instance_type: instance_type.clone(),
            details: ServiceDetails::OpenSearch(OpenSearchDetails {
                instance_type,
                instance_count: input.count,
                master_enabled: false,
                master_type: None,
                master_count: 0,
            }),
        })
    }
}

pub struct RedshiftExtractor;

impl DetailExtractor for RedshiftExtractor {
    fn service(&self) -> ServiceKind {
        ServiceKind::Redshift
    }

    fn extract(&self, input: &ExtractionInput<'_>) -> Result<ExtractedDetail, RecordError> {
        let raw: RawRedshiftDetails =
            nested(input, ServiceKind::Redshift, "RedshiftInstanceDetails")?;
        let node_type = required(raw.node_type, "NodeType")?;

        Ok(ExtractedDetail {
            region: region(raw.region)?,
            instance_type: node_type.clone(),
            details: ServiceDetails::Redshift(RedshiftDetails {
                node_type,
                cluster_type: ClusterType::for_nodes(input.count),
                number_of_nodes: input.count,
            }),
        })
    }
}

/// The recommendation API exposes no MemoryDB instance detail yet. When the
/// nested object is absent the record is still accepted: region comes from
/// the request and the node type is [`UNKNOWN_NODE_TYPE`].
pub struct MemoryDbExtractor;

impl DetailExtractor for MemoryDbExtractor {
    fn service(&self) -> ServiceKind {
        ServiceKind::MemoryDb
    }

    fn extract(&self, input: &ExtractionInput<'_>) -> Result<ExtractedDetail, RecordError> {
        let raw = match nested::<RawMemoryDbDetails>(
            input,
            ServiceKind::MemoryDb,
            "MemoryDBInstanceDetails",
        ) {
            Ok(raw) => raw,
            Err(RecordError::MissingDetail { .. }) => RawMemoryDbDetails::default(),
            Err(error) => return Err(error),
        };

        // Left empty without a detail region; the processor buys these once.
        let region = non_empty(raw.region).map(|region| normalize_region(&region)).unwrap_or_default();
        let node_type = non_empty(raw.node_type).unwrap_or_else(|| UNKNOWN_NODE_TYPE.to_string());

        Ok(ExtractedDetail {
            region,
            instance_type: node_type.clone(),
            details: ServiceDetails::MemoryDb(MemoryDbDetails {
                node_type,
                shard_count: input.count,
            }),
        })
    }
}
