use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha512;
use uuid::Uuid;

use crate::adapters::PaymentVerifier;
use crate::error::AppError;

type HmacSha512 = Hmac<Sha512>;

pub const CHARGE_SUCCESS: &str = "charge.success";

#[derive(Debug, Deserialize)]
struct WebhookBody {
    event: String,
    #[serde(default)]
    data: WebhookData,
}

// Only `charge.success` is guaranteed to carry an amount; other event types
// (subscriptions, transfers) have their own `data` shapes.
#[derive(Debug, Default, Deserialize)]
struct WebhookData {
    /// Minor units (cents).
    #[serde(default)]
    amount: Option<i64>,
    #[serde(default)]
    reference: Option<String>,
    #[serde(default)]
    metadata: Option<WebhookMetadata>,
}

#[derive(Debug, Deserialize)]
struct WebhookMetadata {
    order_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct PaymentEvent {
    pub event: String,
    pub order_id: Option<Uuid>,
    /// Major units, converted from the cents on the wire.
    pub amount: Option<f64>,
    pub reference: Option<String>,
}

impl PaymentEvent {
    pub fn is_charge_success(&self) -> bool {
        self.event == CHARGE_SUCCESS
    }
}

/// Verifies Paystack-style webhooks: hex HMAC-SHA512 of the raw body.
pub struct HmacPaymentVerifier {
    secret: Vec<u8>,
}

impl HmacPaymentVerifier {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    fn check(&self, signature: &str, payload: &[u8]) -> Result<(), AppError> {
        let provided = hex::decode(signature.trim()).map_err(|_| AppError::InvalidSignature)?;
        let mut mac = HmacSha512::new_from_slice(&self.secret)
            .map_err(|err| AppError::Internal(format!("invalid webhook secret: {err}")))?;
        mac.update(payload);
        // constant-time, and rejects a signature of the wrong length
        mac.verify_slice(&provided)
            .map_err(|_| AppError::InvalidSignature)
    }
}

#[async_trait]
impl PaymentVerifier for HmacPaymentVerifier {
    async fn verify(&self, signature: &str, payload: &[u8]) -> Result<PaymentEvent, AppError> {
        self.check(signature, payload)?;

        let body: WebhookBody = serde_json::from_slice(payload)
            .map_err(|err| AppError::BadRequest(format!("malformed webhook payload: {err}")))?;

        Ok(PaymentEvent {
            event: body.event,
            order_id: body.data.metadata.and_then(|metadata| metadata.order_id),
            amount: body.data.amount.map(|cents| cents as f64 / 100.0),
            reference: body.data.reference,
        })
    }
}
