use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Forward-only lifecycle of a medication order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    PendingVerification,
    Paid,
    Processing,
    OutForDelivery,
    InTransit,
    Delivered,
}

impl OrderStatus {
    pub const LIFECYCLE: [OrderStatus; 6] = [
        OrderStatus::PendingVerification,
        OrderStatus::Paid,
        OrderStatus::Processing,
        OrderStatus::OutForDelivery,
        OrderStatus::InTransit,
        OrderStatus::Delivered,
    ];

    pub fn next(&self) -> Option<OrderStatus> {
        match self {
            OrderStatus::PendingVerification => Some(OrderStatus::Paid),
            OrderStatus::Paid => Some(OrderStatus::Processing),
            OrderStatus::Processing => Some(OrderStatus::OutForDelivery),
            OrderStatus::OutForDelivery => Some(OrderStatus::InTransit),
            OrderStatus::InTransit => Some(OrderStatus::Delivered),
            OrderStatus::Delivered => None,
        }
    }

    pub fn can_advance_to(&self, to: &OrderStatus) -> bool {
        self.next().as_ref() == Some(to)
    }

    pub fn is_terminal(&self) -> bool {
        self.next().is_none()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrderStatus::PendingVerification => "pending_verification",
            OrderStatus::Paid => "paid",
            OrderStatus::Processing => "processing",
            OrderStatus::OutForDelivery => "out_for_delivery",
            OrderStatus::InTransit => "in_transit",
            OrderStatus::Delivered => "delivered",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Medication {
    pub name: String,
    #[serde(default)]
    pub dosage: Option<String>,
    #[serde(default)]
    pub quantity: Option<u32>,
    #[serde(default)]
    pub price: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prescription {
    #[serde(default)]
    pub reference: Option<String>,
    pub medications: Vec<Medication>,
    #[serde(default)]
    pub is_refrigerated: bool,
    #[serde(default)]
    pub is_controlled_substance: bool,
}

/// A prescription-to-delivery fulfillment request ("package").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub pharmacy_id: String,
    pub patient_id: Option<String>,
    pub prescribed_by: String,
    pub prescription: Prescription,
    pub status: OrderStatus,
    pub amount_paid: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(
        pharmacy_id: String,
        patient_id: Option<String>,
        prescribed_by: String,
        prescription: Prescription,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            pharmacy_id,
            patient_id,
            prescribed_by,
            prescription,
            status: OrderStatus::PendingVerification,
            amount_paid: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::OrderStatus;

    #[test]
    fn lifecycle_advances_one_step_at_a_time() {
        for pair in OrderStatus::LIFECYCLE.windows(2) {
            assert!(pair[0].can_advance_to(&pair[1]));
            assert!(!pair[1].can_advance_to(&pair[0]));
        }
        assert!(!OrderStatus::Paid.can_advance_to(&OrderStatus::OutForDelivery));
    }

    #[test]
    fn only_delivered_is_terminal() {
        let terminal: Vec<_> = OrderStatus::LIFECYCLE
            .iter()
            .filter(|status| status.is_terminal())
            .collect();
        assert_eq!(terminal, vec![&OrderStatus::Delivered]);
    }

    #[test]
    fn serializes_as_snake_case() {
        let json = serde_json::to_string(&OrderStatus::OutForDelivery).unwrap();
        assert_eq!(json, "\"out_for_delivery\"");
    }
}
