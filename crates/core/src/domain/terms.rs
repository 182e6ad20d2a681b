use std::fmt;

use serde::{Deserialize, Serialize};

/// Lowercases a payment-option label and strips spaces and hyphens, so that
/// `No Upfront`, `no-upfront` and `NoUpfront` compare equal.
pub fn normalize_payment(value: &str) -> String {
    value.chars().filter(|ch| *ch != ' ' && *ch != '-').flat_map(char::to_lowercase).collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PaymentOption {
    AllUpfront,
    PartialUpfront,
    NoUpfront,
}

impl PaymentOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AllUpfront => "all-upfront",
            Self::PartialUpfront => "partial-upfront",
            Self::NoUpfront => "no-upfront",
        }
    }

    /// Label used by the provider's recommendation API.
    pub fn provider_label(&self) -> &'static str {
        match self {
            Self::AllUpfront => "ALL_UPFRONT",
            Self::PartialUpfront => "PARTIAL_UPFRONT",
            Self::NoUpfront => "NO_UPFRONT",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match normalize_payment(value.trim()).replace('_', "").as_str() {
            "allupfront" => Some(Self::AllUpfront),
            "partialupfront" => Some(Self::PartialUpfront),
            "noupfront" => Some(Self::NoUpfront),
            _ => None,
        }
    }
}

impl fmt::Display for PaymentOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for PaymentOption {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| {
            format!(
                "unsupported payment option `{value}` (expected all-upfront|partial-upfront|no-upfront)"
            )
        })
    }
}

impl From<PaymentOption> for String {
    fn from(value: PaymentOption) -> Self {
        value.as_str().to_string()
    }
}

pub fn term_months(term_years: u32) -> u32 {
    term_years * 12
}
