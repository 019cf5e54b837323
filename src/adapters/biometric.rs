use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::adapters::{simulate_latency, BiometricVerifier};
use crate::error::AppError;
use crate::models::delivery::Delivery;

/// Proof that a recipient was confirmed for one delivery. Only a
/// [`BiometricVerifier`] can produce one, and the ledger requires it to
/// complete a delivery.
#[derive(Debug, Clone, Serialize)]
pub struct BiometricReceipt {
    delivery_id: Uuid,
    driver_id: String,
    audit_hash: String,
    confirmed_at: DateTime<Utc>,
}

impl BiometricReceipt {
    pub(crate) fn issue(delivery: &Delivery, biometric_hash: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(delivery.id.to_string().as_bytes());
        hasher.update(biometric_hash.as_bytes());

        Self {
            delivery_id: delivery.id,
            driver_id: delivery.driver_id.clone(),
            audit_hash: hex::encode(hasher.finalize()),
            confirmed_at: Utc::now(),
        }
    }

    pub fn delivery_id(&self) -> Uuid {
        self.delivery_id
    }

    pub fn driver_id(&self) -> &str {
        &self.driver_id
    }

    pub fn audit_hash(&self) -> &str {
        &self.audit_hash
    }
}

/// Placeholder decision policy: any hash longer than `min_length` matches.
/// This is not biometric matching and provides no security guarantee.
pub struct ThresholdBiometricVerifier {
    min_length: usize,
    latency: Duration,
}

impl ThresholdBiometricVerifier {
    pub fn new(min_length: usize, latency: Duration) -> Self {
        Self {
            min_length,
            latency,
        }
    }
}

#[async_trait]
impl BiometricVerifier for ThresholdBiometricVerifier {
    async fn confirm(
        &self,
        delivery: &Delivery,
        driver_id: &str,
        biometric_hash: &str,
    ) -> Result<BiometricReceipt, AppError> {
        if delivery.driver_id != driver_id {
            return Err(AppError::Unauthorized(format!(
                "driver {driver_id} is not assigned to delivery {}",
                delivery.id
            )));
        }

        simulate_latency(self.latency).await;

        if biometric_hash.is_empty() || biometric_hash.len() <= self.min_length {
            return Err(AppError::BiometricMismatch);
        }

        Ok(BiometricReceipt::issue(delivery, biometric_hash))
    }
}
