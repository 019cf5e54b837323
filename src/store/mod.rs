pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::claim::Claim;
use crate::models::delivery::{Delivery, DeliveryStatus};
use crate::models::inventory::InventoryItem;
use crate::models::order::{Order, OrderStatus};
use crate::models::tracking::{AuditEntry, ColdChainAlert, LocationSample};

pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unreachable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::StorageUnavailable(err.to_string())
    }
}

/// Row guard for `UPDATE orders ... WHERE id = ? AND status = ? [AND pharmacy_id = ?]`.
#[derive(Debug, Clone)]
pub struct OrderGuard {
    pub id: Uuid,
    pub status: OrderStatus,
    pub pharmacy_id: Option<String>,
}

impl OrderGuard {
    fn matches(&self, order: &Order) -> bool {
        order.status == self.status
            && self
                .pharmacy_id
                .as_ref()
                .is_none_or(|pharmacy_id| *pharmacy_id == order.pharmacy_id)
    }
}

/// Row guard for `UPDATE deliveries ... WHERE id = ? AND driver_id = ? AND status = ?`.
#[derive(Debug, Clone)]
pub struct DeliveryGuard {
    pub id: Uuid,
    pub driver_id: String,
    pub status: DeliveryStatus,
}

impl DeliveryGuard {
    fn matches(&self, delivery: &Delivery) -> bool {
        delivery.driver_id == self.driver_id && delivery.status == self.status
    }
}

/// Row guard for `UPDATE inventory ... WHERE id = ? AND pharmacy_id = ?`.
#[derive(Debug, Clone)]
pub struct InventoryGuard {
    pub id: Uuid,
    pub pharmacy_id: String,
}

/// Changes applied to a delivery row, and optionally its parent order, in
/// one atomic step.
#[derive(Debug, Clone)]
pub struct DeliveryChange {
    pub status: DeliveryStatus,
    pub order_status: Option<(OrderStatus, OrderStatus)>,
    pub temperature: Option<f64>,
    /// Appended to the location series and copied to `last_location`.
    pub location: Option<LocationSample>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub alert: Option<ColdChainAlert>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub orders: usize,
    pub deliveries: usize,
    pub claims: usize,
}

/// Persistent store for ledger records.
///
/// Conditional updates return `Ok(None)` when the guard matched zero rows;
/// callers decide which error that means.
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_order(&self, order: Order) -> Result<(), StoreError>;

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, StoreError>;

    async fn list_orders(
        &self,
        pharmacy_id: &str,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, StoreError>;

    async fn list_patient_orders(&self, patient_id: &str) -> Result<Vec<Order>, StoreError>;

    async fn update_order_status(
        &self,
        guard: &OrderGuard,
        to: OrderStatus,
        amount_paid: Option<f64>,
    ) -> Result<Option<Order>, StoreError>;

    /// Advances the order and inserts its delivery together.
    async fn dispatch_order(
        &self,
        guard: &OrderGuard,
        delivery: Delivery,
    ) -> Result<Option<(Order, Delivery)>, StoreError>;

    async fn get_delivery(&self, id: Uuid) -> Result<Option<Delivery>, StoreError>;

    async fn delivery_for_order(&self, order_id: Uuid) -> Result<Option<Delivery>, StoreError>;

    async fn list_driver_deliveries(&self, driver_id: &str) -> Result<Vec<Delivery>, StoreError>;

    async fn update_delivery(
        &self,
        guard: &DeliveryGuard,
        change: DeliveryChange,
    ) -> Result<Option<(Order, Delivery)>, StoreError>;

    /// Returns `false` when the delivery already has a claim.
    async fn insert_claim(&self, claim: Claim) -> Result<bool, StoreError>;

    async fn claim_for_delivery(&self, delivery_id: Uuid) -> Result<Option<Claim>, StoreError>;

    async fn alerts_for_delivery(&self, delivery_id: Uuid) -> Result<Vec<ColdChainAlert>, StoreError>;

    async fn insert_inventory_item(&self, item: InventoryItem) -> Result<(), StoreError>;

    async fn list_inventory(&self, pharmacy_id: &str) -> Result<Vec<InventoryItem>, StoreError>;

    async fn update_stock(
        &self,
        guard: &InventoryGuard,
        quantity: u32,
    ) -> Result<Option<InventoryItem>, StoreError>;

    async fn append_audit(&self, entry: AuditEntry) -> Result<(), StoreError>;

    async fn stats(&self) -> Result<StoreStats, StoreError>;
}
