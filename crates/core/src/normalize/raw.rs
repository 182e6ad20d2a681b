//! Fields the pipeline reads from provider recommendation records. Every
//! field is optional; numeric fields stay untyped until parsed tolerantly.

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawReservationRecord {
    pub account_id: Option<String>,
    pub account_name: Option<String>,
    pub instance_details: Option<Value>,
    pub recommended_number_of_instances_to_purchase: Option<Value>,
    pub upfront_cost: Option<Value>,
    pub recurring_standard_monthly_cost: Option<Value>,
    pub estimated_monthly_savings_amount: Option<Value>,
    pub estimated_monthly_savings_percentage: Option<Value>,
    pub estimated_monthly_on_demand_cost: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawRdsDetails {
    pub instance_type: Option<String>,
    pub region: Option<String>,
    pub database_engine: Option<String>,
    pub deployment_option: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawElastiCacheDetails {
    pub node_type: Option<String>,
    pub region: Option<String>,
    pub product_description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawEc2Details {
    pub instance_type: Option<String>,
    pub region: Option<String>,
    pub availability_zone: Option<String>,
    pub platform: Option<String>,
    pub tenancy: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawOpenSearchDetails {
    pub instance_class: Option<String>,
    pub instance_size: Option<String>,
    pub region: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawRedshiftDetails {
    pub node_type: Option<String>,
    pub region: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawMemoryDbDetails {
    pub node_type: Option<String>,
    pub region: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawSavingsPlanRecord {
    pub account_id: Option<String>,
    pub account_name: Option<String>,
    pub savings_plans_details: Option<RawSavingsPlanDetails>,
    pub hourly_commitment_to_purchase: Option<Value>,
    pub upfront_cost: Option<Value>,
    pub estimated_monthly_savings_amount: Option<Value>,
    pub estimated_savings_percentage: Option<Value>,
    pub estimated_on_demand_cost: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawSavingsPlanDetails {
    pub region: Option<String>,
    pub instance_family: Option<String>,
    pub offering_id: Option<String>,
}
