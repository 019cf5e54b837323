use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::models::claim::Claim;
use crate::models::delivery::{Delivery, DeliveryStatus};
use crate::models::inventory::InventoryItem;
use crate::models::order::{Order, OrderStatus};
use crate::models::tracking::{AuditEntry, ColdChainAlert, LocationSample};
use crate::store::{
    DeliveryChange, DeliveryGuard, InventoryGuard, OrderGuard, Store, StoreError, StoreStats,
};

/// In-process tables backed by `DashMap`.
///
/// Row locks are always taken orders first, then deliveries, so the two
/// multi-row operations cannot deadlock each other.
#[derive(Default)]
pub struct MemoryStore {
    orders: DashMap<Uuid, Order>,
    deliveries: DashMap<Uuid, Delivery>,
    delivery_by_order: DashMap<Uuid, Uuid>,
    claims: DashMap<Uuid, Claim>,
    claim_by_delivery: DashMap<Uuid, Uuid>,
    alerts: DashMap<Uuid, ColdChainAlert>,
    locations: DashMap<Uuid, LocationSample>,
    audit: DashMap<Uuid, AuditEntry>,
    inventory: DashMap<Uuid, InventoryItem>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        let mut entries: Vec<AuditEntry> =
            self.audit.iter().map(|entry| entry.value().clone()).collect();
        entries.sort_by_key(|entry| entry.recorded_at);
        entries
    }

    pub fn location_samples(&self, driver_id: &str) -> Vec<LocationSample> {
        let mut samples: Vec<LocationSample> = self
            .locations
            .iter()
            .filter(|entry| entry.value().driver_id == driver_id)
            .map(|entry| entry.value().clone())
            .collect();
        samples.sort_by_key(|sample| sample.recorded_at);
        samples
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_order(&self, order: Order) -> Result<(), StoreError> {
        self.orders.insert(order.id, order);
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.orders.get(&id).map(|entry| entry.value().clone()))
    }

    async fn list_orders(
        &self,
        pharmacy_id: &str,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, StoreError> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| {
                let order = entry.value();
                order.pharmacy_id == pharmacy_id && status.is_none_or(|s| s == order.status)
            })
            .map(|entry| entry.value().clone())
            .collect();
        orders.sort_by_key(|order| order.created_at);
        Ok(orders)
    }

    async fn list_patient_orders(&self, patient_id: &str) -> Result<Vec<Order>, StoreError> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| entry.value().patient_id.as_deref() == Some(patient_id))
            .map(|entry| entry.value().clone())
            .collect();
        orders.sort_by_key(|order| order.created_at);
        Ok(orders)
    }

    async fn update_order_status(
        &self,
        guard: &OrderGuard,
        to: OrderStatus,
        amount_paid: Option<f64>,
    ) -> Result<Option<Order>, StoreError> {
        let Some(mut order) = self.orders.get_mut(&guard.id) else {
            return Ok(None);
        };
        if !guard.matches(&order) {
            return Ok(None);
        }

        order.status = to;
        if amount_paid.is_some() {
            order.amount_paid = amount_paid;
        }
        order.updated_at = Utc::now();
        Ok(Some(order.clone()))
    }

    async fn dispatch_order(
        &self,
        guard: &OrderGuard,
        delivery: Delivery,
    ) -> Result<Option<(Order, Delivery)>, StoreError> {
        let Some(mut order) = self.orders.get_mut(&guard.id) else {
            return Ok(None);
        };
        if !guard.matches(&order) || self.delivery_by_order.contains_key(&order.id) {
            return Ok(None);
        }

        order.status = OrderStatus::OutForDelivery;
        order.updated_at = Utc::now();
        self.delivery_by_order.insert(order.id, delivery.id);
        self.deliveries.insert(delivery.id, delivery.clone());

        Ok(Some((order.clone(), delivery)))
    }

    async fn get_delivery(&self, id: Uuid) -> Result<Option<Delivery>, StoreError> {
        Ok(self.deliveries.get(&id).map(|entry| entry.value().clone()))
    }

    async fn delivery_for_order(&self, order_id: Uuid) -> Result<Option<Delivery>, StoreError> {
        let Some(delivery_id) = self.delivery_by_order.get(&order_id).map(|entry| *entry.value())
        else {
            return Ok(None);
        };
        self.get_delivery(delivery_id).await
    }

    async fn list_driver_deliveries(&self, driver_id: &str) -> Result<Vec<Delivery>, StoreError> {
        let mut deliveries: Vec<Delivery> = self
            .deliveries
            .iter()
            .filter(|entry| {
                let delivery = entry.value();
                delivery.driver_id == driver_id && delivery.status != DeliveryStatus::Delivered
            })
            .map(|entry| entry.value().clone())
            .collect();
        deliveries.sort_by_key(|delivery| delivery.scheduled_at);
        Ok(deliveries)
    }

    async fn update_delivery(
        &self,
        guard: &DeliveryGuard,
        change: DeliveryChange,
    ) -> Result<Option<(Order, Delivery)>, StoreError> {
        let Some(order_id) = self.deliveries.get(&guard.id).map(|entry| entry.order_id) else {
            return Ok(None);
        };
        let Some(mut order) = self.orders.get_mut(&order_id) else {
            return Ok(None);
        };
        let Some(mut delivery) = self.deliveries.get_mut(&guard.id) else {
            return Ok(None);
        };
        if !guard.matches(&delivery) {
            return Ok(None);
        }
        if let Some((from, _)) = change.order_status {
            if order.status != from {
                return Ok(None);
            }
        }

        let now = Utc::now();
        if let Some((_, to)) = change.order_status {
            order.status = to;
            order.updated_at = now;
        }

        delivery.status = change.status;
        if let Some(reading) = change.temperature {
            delivery.temperature_max = Some(match delivery.temperature_max {
                Some(stored) => stored.max(reading),
                None => reading,
            });
        }
        if let Some(sample) = change.location {
            delivery.last_location = Some(sample.location);
            self.locations.insert(sample.id, sample);
        }
        if change.delivered_at.is_some() {
            delivery.delivered_at = change.delivered_at;
        }
        if let Some(alert) = change.alert {
            self.alerts.insert(alert.id, alert);
        }

        Ok(Some((order.clone(), delivery.clone())))
    }

    async fn insert_claim(&self, claim: Claim) -> Result<bool, StoreError> {
        match self.claim_by_delivery.entry(claim.delivery_id) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(claim.id);
                self.claims.insert(claim.id, claim);
                Ok(true)
            }
        }
    }

    async fn claim_for_delivery(&self, delivery_id: Uuid) -> Result<Option<Claim>, StoreError> {
        let Some(claim_id) = self.claim_by_delivery.get(&delivery_id).map(|entry| *entry.value())
        else {
            return Ok(None);
        };
        Ok(self.claims.get(&claim_id).map(|entry| entry.value().clone()))
    }

    async fn alerts_for_delivery(&self, delivery_id: Uuid) -> Result<Vec<ColdChainAlert>, StoreError> {
        let mut alerts: Vec<ColdChainAlert> = self
            .alerts
            .iter()
            .filter(|entry| entry.value().delivery_id == delivery_id)
            .map(|entry| entry.value().clone())
            .collect();
        alerts.sort_by_key(|alert| alert.recorded_at);
        Ok(alerts)
    }

    async fn insert_inventory_item(&self, item: InventoryItem) -> Result<(), StoreError> {
        self.inventory.insert(item.id, item);
        Ok(())
    }

    async fn list_inventory(&self, pharmacy_id: &str) -> Result<Vec<InventoryItem>, StoreError> {
        let mut items: Vec<InventoryItem> = self
            .inventory
            .iter()
            .filter(|entry| entry.value().pharmacy_id == pharmacy_id)
            .map(|entry| entry.value().clone())
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(items)
    }

    async fn update_stock(
        &self,
        guard: &InventoryGuard,
        quantity: u32,
    ) -> Result<Option<InventoryItem>, StoreError> {
        let Some(mut item) = self.inventory.get_mut(&guard.id) else {
            return Ok(None);
        };
        if item.pharmacy_id != guard.pharmacy_id {
            return Ok(None);
        }

        item.quantity = quantity;
        item.last_updated = Utc::now();
        Ok(Some(item.clone()))
    }

    async fn append_audit(&self, entry: AuditEntry) -> Result<(), StoreError> {
        self.audit.insert(entry.id, entry);
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        Ok(StoreStats {
            orders: self.orders.len(),
            deliveries: self.deliveries.len(),
            claims: self.claims.len(),
        })
    }
}
