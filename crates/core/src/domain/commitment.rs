use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::service::ServiceKind;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CommitmentState {
    Active,
    PaymentPending,
    Other(String),
}

impl CommitmentState {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Active => "active",
            Self::PaymentPending => "payment-pending",
            Self::Other(value) => value.as_str(),
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "active" => Self::Active,
            "payment-pending" => Self::PaymentPending,
            _ => Self::Other(value.trim().to_string()),
        }
    }

    /// Only owned or about-to-be-owned capacity counts against new purchases.
    pub fn is_reconcilable(&self) -> bool {
        matches!(self, Self::Active | Self::PaymentPending)
    }
}

impl From<String> for CommitmentState {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<CommitmentState> for String {
    fn from(value: CommitmentState) -> Self {
        value.as_str().to_string()
    }
}

/// An already-owned reservation, read fresh from the provider on every run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingCommitment {
    pub commitment_id: String,
    pub service: ServiceKind,
    pub instance_type: String,
    pub region: String,
    #[serde(default)]
    pub engine: Option<String>,
    pub payment_option: String,
    pub term_months: u32,
    pub count: u32,
    pub state: CommitmentState,
    pub start_time: DateTime<Utc>,
}
