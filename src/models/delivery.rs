use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::tracking::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Assigned,
    // IoT cold-chain bags report "CRITICAL" as their status; the server
    // recomputes the condition from the reading itself.
    #[serde(alias = "IN_TRANSIT", alias = "critical", alias = "CRITICAL")]
    InTransit,
    Delivered,
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeliveryStatus::Assigned => "assigned",
            DeliveryStatus::InTransit => "in_transit",
            DeliveryStatus::Delivered => "delivered",
        };
        f.write_str(name)
    }
}

/// Advisory overlay on an in-transit delivery. Never blocks progress.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Condition {
    Nominal,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    pub id: Uuid,
    pub order_id: Uuid,
    pub driver_id: String,
    pub status: DeliveryStatus,
    pub temperature_max: Option<f64>,
    pub last_location: Option<GeoPoint>,
    pub scheduled_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl Delivery {
    pub fn assign(order_id: Uuid, driver_id: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            driver_id,
            status: DeliveryStatus::Assigned,
            temperature_max: None,
            last_location: None,
            scheduled_at: Utc::now(),
            delivered_at: None,
        }
    }
}

/// Coordinates as sent by a driver app; either half may be missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocationInput {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

impl LocationInput {
    pub fn complete(&self) -> Option<GeoPoint> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryUpdate {
    #[serde(default)]
    pub status: Option<DeliveryStatus>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub location: Option<LocationInput>,
}
