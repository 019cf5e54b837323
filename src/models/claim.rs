use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    pub price: f64,
}

/// Coverage rules for one medical-aid scheme.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SchemeConfig {
    pub coverage_rate: f64,
    pub limit_per_order: f64,
    #[serde(default)]
    pub requires_pre_auth: Vec<String>,
}

impl SchemeConfig {
    /// Applied to schemes missing from the registry: nothing is covered.
    pub fn zero_coverage() -> Self {
        Self {
            coverage_rate: 0.0,
            limit_per_order: 0.0,
            requires_pre_auth: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AdjudicationStatus {
    Success,
    #[serde(rename = "Pended (Exceeds Limit)")]
    Pended,
}

impl fmt::Display for AdjudicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdjudicationStatus::Success => f.write_str("Success"),
            AdjudicationStatus::Pended => f.write_str("Pended (Exceeds Limit)"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjudicatedItem {
    pub name: String,
    pub cost: f64,
    pub benefit_cover: f64,
    pub patient_portion: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjudicationSummary {
    pub total_value: f64,
    pub benefit_paid: f64,
    pub patient_co_payment: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Adjudication {
    pub transaction_id: String,
    pub scheme: String,
    pub scheme_recognised: bool,
    pub coverage_rate: f64,
    pub requires_pre_auth: Vec<String>,
    pub status: AdjudicationStatus,
    pub summary: AdjudicationSummary,
    pub items: Vec<AdjudicatedItem>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Approved,
    Pended,
    Rejected,
}

impl ClaimStatus {
    pub fn from_adjudication(adjudication: &Adjudication) -> Self {
        if !adjudication.scheme_recognised {
            return ClaimStatus::Rejected;
        }
        match adjudication.status {
            AdjudicationStatus::Success => ClaimStatus::Approved,
            AdjudicationStatus::Pended => ClaimStatus::Pended,
        }
    }
}

/// A payer's cost-sharing outcome for one delivery. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub id: Uuid,
    pub delivery_id: Uuid,
    pub order_id: Uuid,
    pub scheme: String,
    pub claim_amount: f64,
    pub medical_aid_paid: f64,
    pub patient_co_payment: f64,
    pub auth_number: String,
    pub status: ClaimStatus,
    pub created_at: DateTime<Utc>,
}

impl Claim {
    pub fn from_adjudication(delivery_id: Uuid, order_id: Uuid, adjudication: &Adjudication) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            delivery_id,
            order_id,
            scheme: adjudication.scheme.clone(),
            claim_amount: adjudication.summary.total_value,
            medical_aid_paid: adjudication.summary.benefit_paid,
            patient_co_payment: adjudication.summary.patient_co_payment,
            auth_number: format!("AUTH-{}", short_code(&id)),
            status: ClaimStatus::from_adjudication(adjudication),
            created_at: Utc::now(),
        }
    }

    pub fn settlement_action(&self) -> &'static str {
        if self.patient_co_payment > 0.0 {
            "CO_PAYMENT_REQUIRED"
        } else {
            "FULLY_COVERED"
        }
    }
}

/// Nine uppercase characters derived from a UUID, e.g. for `EDI-` and
/// `AUTH-` references.
pub fn short_code(id: &Uuid) -> String {
    id.simple().to_string()[..9].to_uppercase()
}
