use thiserror::Error;

use crate::domain::service::ServiceKind;
use crate::purchase::PurchaseError;
use crate::retrieval::RetrievalError;

/// A single provider record that cannot be normalized. Always recovered
/// locally: the record is skipped and surfaced as a warning.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("record is not a recommendation object: {0}")]
    Malformed(String),
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("{service} record has no `{field}` detail object")]
    MissingDetail { service: ServiceKind, field: &'static str },
    #[error("invalid recommended quantity `{0}`")]
    InvalidQuantity(String),
    #[error("invalid amount for `{field}`: `{value}`")]
    InvalidAmount { field: &'static str, value: String },
    #[error("detail declares {detail} but recommendation is {declared}")]
    DetailMismatch { declared: ServiceKind, detail: ServiceKind },
    #[error("no detail extractor registered for {0}")]
    UnsupportedService(ServiceKind),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
    #[error("commitment inventory for {service} is unavailable: {source}")]
    Inventory {
        service: ServiceKind,
        #[source]
        source: PurchaseError,
    },
    #[error("no purchase client configured for {0}")]
    MissingPurchaseClient(ServiceKind),
    #[error("pipeline run was cancelled")]
    Cancelled,
}

impl PipelineError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Retrieval(RetrievalError::Cancelled { .. }) | Self::Cancelled => "cancelled",
            Self::Retrieval(_) => "retrieval",
            Self::Inventory { .. } => "commitment_inventory",
            Self::MissingPurchaseClient(_) => "configuration",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.error_class() == "cancelled"
    }
}
