//! External verification adapters.
//!
//! Every provider the orchestrator depends on sits behind one of the traits
//! below and is called through [`guarded`], which bounds the call with a
//! timeout. The bundled implementations stand in for the real payment
//! gateway, EDI switch, identity provider and biometric vault.

pub mod adjudication;
pub mod biometric;
pub mod identity;
pub mod payment;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::AppError;
use crate::models::claim::{Adjudication, LineItem};
use crate::models::delivery::Delivery;

pub use adjudication::{SchemeAdjudicator, SchemeRegistry};
pub use biometric::{BiometricReceipt, ThresholdBiometricVerifier};
pub use identity::{IdentityReport, SaIdVerifier};
pub use payment::{HmacPaymentVerifier, PaymentEvent};

#[async_trait]
pub trait PaymentVerifier: Send + Sync {
    /// Checks the provider signature over the raw payload and decodes it.
    async fn verify(&self, signature: &str, payload: &[u8]) -> Result<PaymentEvent, AppError>;
}

#[async_trait]
pub trait ClaimAdjudicator: Send + Sync {
    async fn adjudicate(&self, scheme: &str, items: &[LineItem]) -> Result<Adjudication, AppError>;
}

#[async_trait]
pub trait BiometricVerifier: Send + Sync {
    async fn confirm(
        &self,
        delivery: &Delivery,
        driver_id: &str,
        biometric_hash: &str,
    ) -> Result<BiometricReceipt, AppError>;
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, id_number: &str) -> Result<IdentityReport, AppError>;
}

#[derive(Clone)]
pub struct Adapters {
    pub payment: Arc<dyn PaymentVerifier>,
    pub adjudication: Arc<dyn ClaimAdjudicator>,
    pub biometric: Arc<dyn BiometricVerifier>,
    pub identity: Arc<dyn IdentityVerifier>,
}

/// Runs an adapter call under `timeout`. Elapsing is reported as
/// [`AppError::AdapterTimeout`], never as success.
pub async fn guarded<T, F>(adapter: &'static str, timeout: Duration, call: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(AppError::AdapterTimeout {
            adapter,
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

pub(crate) async fn simulate_latency(latency: Duration) {
    if !latency.is_zero() {
        tokio::time::sleep(latency).await;
    }
}
