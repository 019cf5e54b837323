use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// Append-only driver position sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationSample {
    pub id: Uuid,
    pub driver_id: String,
    pub location: GeoPoint,
    pub recorded_at: DateTime<Utc>,
}

/// Append-only compliance trail entry. Never read back by the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub actor_id: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Uuid,
    pub origin: String,
    pub recorded_at: DateTime<Utc>,
}

/// Durable record of a temperature reading above the cold-chain threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColdChainAlert {
    pub id: Uuid,
    pub delivery_id: Uuid,
    pub order_id: Uuid,
    pub reading_celsius: f64,
    pub threshold_celsius: f64,
    pub recorded_at: DateTime<Utc>,
}
