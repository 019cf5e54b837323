use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One stocked product line of a pharmacy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: Uuid,
    pub pharmacy_id: String,
    pub name: String,
    pub quantity: u32,
    pub is_refrigerated: bool,
    pub last_updated: DateTime<Utc>,
}

impl InventoryItem {
    pub fn new(pharmacy_id: String, name: String, quantity: u32, is_refrigerated: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            pharmacy_id,
            name,
            quantity,
            is_refrigerated,
            last_updated: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewInventoryItem {
    pub name: String,
    #[serde(default)]
    pub quantity: u32,
    #[serde(default)]
    pub is_refrigerated: bool,
}
