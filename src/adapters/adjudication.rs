use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::adapters::{simulate_latency, ClaimAdjudicator};
use crate::error::AppError;
use crate::models::claim::{
    short_code, AdjudicatedItem, Adjudication, AdjudicationStatus, AdjudicationSummary, LineItem,
    SchemeConfig,
};

/// Coverage table keyed by scheme name.
#[derive(Debug, Clone)]
pub struct SchemeRegistry {
    schemes: HashMap<String, SchemeConfig>,
}

impl SchemeRegistry {
    pub fn new(schemes: HashMap<String, SchemeConfig>) -> Self {
        Self { schemes }
    }

    /// Loads a JSON object of `{ "<scheme>": { coverageRate, limitPerOrder, requiresPreAuth } }`.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            AppError::Internal(format!("failed to read scheme table {}: {err}", path.display()))
        })?;
        let schemes: HashMap<String, SchemeConfig> = serde_json::from_str(&raw).map_err(|err| {
            AppError::Internal(format!("invalid scheme table {}: {err}", path.display()))
        })?;
        Ok(Self::new(schemes))
    }

    pub fn get(&self, scheme: &str) -> Option<&SchemeConfig> {
        self.schemes.get(scheme)
    }

    pub fn len(&self) -> usize {
        self.schemes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemes.is_empty()
    }
}

impl Default for SchemeRegistry {
    fn default() -> Self {
        let scheme = |coverage_rate: f64, limit_per_order: f64, pre_auth: &[&str]| SchemeConfig {
            coverage_rate,
            limit_per_order,
            requires_pre_auth: pre_auth.iter().map(|s| s.to_string()).collect(),
        };

        let schemes = HashMap::from([
            (
                "Discovery Health".to_string(),
                scheme(0.92, 5000.0, &["opioids", "oncology"]),
            ),
            ("GEMS".to_string(), scheme(1.0, 3000.0, &["specialized"])),
            ("Bonitas".to_string(), scheme(0.85, 4000.0, &[])),
            ("Momentum".to_string(), scheme(0.90, 4500.0, &["chronic"])),
            ("DHMS".to_string(), scheme(0.95, 10000.0, &[])),
        ]);

        Self::new(schemes)
    }
}

fn cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Computes cost sharing from the registry. Unknown schemes fall back to
/// zero coverage and a zero limit, so they never pay out.
pub struct SchemeAdjudicator {
    registry: SchemeRegistry,
    latency: Duration,
}

impl SchemeAdjudicator {
    pub fn new(registry: SchemeRegistry, latency: Duration) -> Self {
        Self { registry, latency }
    }

    pub fn compute(&self, scheme: &str, items: &[LineItem]) -> Result<Adjudication, AppError> {
        if let Some(item) = items
            .iter()
            .find(|item| !item.price.is_finite() || item.price < 0.0)
        {
            return Err(AppError::BadRequest(format!(
                "invalid price for {}: {}",
                item.name, item.price
            )));
        }

        let recognised = self.registry.get(scheme);
        let config = recognised.cloned().unwrap_or_else(SchemeConfig::zero_coverage);

        let adjudicated: Vec<AdjudicatedItem> = items
            .iter()
            .map(|item| {
                let covered = item.price * config.coverage_rate;
                AdjudicatedItem {
                    name: item.name.clone(),
                    cost: cents(item.price),
                    benefit_cover: cents(covered),
                    patient_portion: cents(item.price - covered),
                }
            })
            .collect();

        let total_value: f64 = items.iter().map(|item| item.price).sum();
        let benefit_paid = total_value * config.coverage_rate;

        let status = if total_value > config.limit_per_order {
            AdjudicationStatus::Pended
        } else {
            AdjudicationStatus::Success
        };

        Ok(Adjudication {
            transaction_id: format!("EDI-{}", short_code(&Uuid::new_v4())),
            scheme: scheme.to_string(),
            scheme_recognised: recognised.is_some(),
            coverage_rate: config.coverage_rate,
            requires_pre_auth: config.requires_pre_auth,
            status,
            summary: AdjudicationSummary {
                total_value: cents(total_value),
                benefit_paid: cents(benefit_paid),
                patient_co_payment: cents(total_value - benefit_paid),
            },
            items: adjudicated,
            timestamp: Utc::now(),
        })
    }
}

#[async_trait]
impl ClaimAdjudicator for SchemeAdjudicator {
    async fn adjudicate(&self, scheme: &str, items: &[LineItem]) -> Result<Adjudication, AppError> {
        simulate_latency(self.latency).await;
        self.compute(scheme, items)
    }
}
