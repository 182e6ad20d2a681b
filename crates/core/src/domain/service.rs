use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed set of services the pipeline knows how to buy commitments for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ServiceKind {
    Rds,
    ElastiCache,
    Ec2,
    OpenSearch,
    Redshift,
    MemoryDb,
    SavingsPlans,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 7] = [
        Self::Rds,
        Self::ElastiCache,
        Self::Ec2,
        Self::OpenSearch,
        Self::Redshift,
        Self::MemoryDb,
        Self::SavingsPlans,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rds => "rds",
            Self::ElastiCache => "elasticache",
            Self::Ec2 => "ec2",
            Self::OpenSearch => "opensearch",
            Self::Redshift => "redshift",
            Self::MemoryDb => "memorydb",
            Self::SavingsPlans => "savingsplans",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Rds => "RDS",
            Self::ElastiCache => "ElastiCache",
            Self::Ec2 => "EC2",
            Self::OpenSearch => "OpenSearch",
            Self::Redshift => "Redshift",
            Self::MemoryDb => "MemoryDB",
            Self::SavingsPlans => "Savings Plans",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let normalized: String = value
            .trim()
            .chars()
            .filter(|ch| !matches!(ch, '-' | '_' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "rds" => Some(Self::Rds),
            "elasticache" => Some(Self::ElastiCache),
            "ec2" => Some(Self::Ec2),
            "opensearch" | "elasticsearch" | "es" => Some(Self::OpenSearch),
            "redshift" => Some(Self::Redshift),
            "memorydb" => Some(Self::MemoryDb),
            "savingsplans" | "savingsplan" | "sp" => Some(Self::SavingsPlans),
            _ => None,
        }
    }

    /// Savings plans are bought once per account rather than per region.
    pub fn is_region_flexible(&self) -> bool {
        matches!(self, Self::SavingsPlans)
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for ServiceKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| {
            format!(
                "unsupported service `{value}` (expected rds|elasticache|ec2|opensearch|redshift|memorydb|savingsplans)"
            )
        })
    }
}

impl From<ServiceKind> for String {
    fn from(value: ServiceKind) -> Self {
        value.as_str().to_string()
    }
}
