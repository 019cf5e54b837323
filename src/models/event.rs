use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::actor::Actor;
use crate::models::delivery::{Condition, Delivery, DeliveryStatus};
use crate::models::order::{Order, OrderStatus};
use crate::models::tracking::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PrescriptionIssued,
    PaymentConfirmed,
    OrderAccepted,
    DriverAssigned,
    DeliveryUpdated,
    DeliveryCompleted,
    ClaimRecorded,
}

impl EventKind {
    pub fn action(&self) -> &'static str {
        match self {
            EventKind::PrescriptionIssued => "prescription.issue",
            EventKind::PaymentConfirmed => "payment.confirm",
            EventKind::OrderAccepted => "order.accept",
            EventKind::DriverAssigned => "order.assign_driver",
            EventKind::DeliveryUpdated => "delivery.update",
            EventKind::DeliveryCompleted => "delivery.verify_biometric",
            EventKind::ClaimRecorded => "claim.submit",
        }
    }
}

/// A committed ledger mutation. Produced by the ledger, consumed by
/// post-commit hooks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub kind: EventKind,
    pub actor_id: String,
    pub origin: String,
    pub order_id: Uuid,
    pub delivery_id: Option<Uuid>,
    pub claim_id: Option<Uuid>,
    pub order_status: OrderStatus,
    pub delivery_status: Option<DeliveryStatus>,
    pub temperature: Option<f64>,
    pub location: Option<GeoPoint>,
    pub condition: Option<Condition>,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent {
    pub fn new(kind: EventKind, actor: &Actor, order: &Order, message: impl Into<String>) -> Self {
        Self {
            kind,
            actor_id: actor.user_id.clone(),
            origin: actor.origin.clone(),
            order_id: order.id,
            delivery_id: None,
            claim_id: None,
            order_status: order.status,
            delivery_status: None,
            temperature: None,
            location: None,
            condition: None,
            message: message.into(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_delivery(mut self, delivery: &Delivery) -> Self {
        self.delivery_id = Some(delivery.id);
        self.delivery_status = Some(delivery.status);
        self
    }

    /// The record the mutation targeted, for the audit trail.
    pub fn resource(&self) -> (&'static str, Uuid) {
        match (self.kind, self.claim_id, self.delivery_id) {
            (EventKind::ClaimRecorded, Some(claim_id), _) => ("claim", claim_id),
            (EventKind::DeliveryUpdated | EventKind::DeliveryCompleted, _, Some(delivery_id)) => {
                ("delivery", delivery_id)
            }
            _ => ("order", self.order_id),
        }
    }
}
