//! Order ledger: owns orders, deliveries and claims and the only code
//! allowed to move them through their lifecycles.
//!
//! Every mutation is a single guarded store update. When the guard matches
//! zero rows the ledger re-reads the record to report why: the record is
//! missing or belongs elsewhere (`NotFound`), another actor owns it
//! (`Unauthorized`), or it is no longer in the expected state
//! (`InvalidTransition`).

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adapters::BiometricReceipt;
use crate::error::AppError;
use crate::models::actor::Actor;
use crate::models::claim::{Adjudication, Claim};
use crate::models::delivery::{Condition, Delivery, DeliveryStatus, TelemetryUpdate};
use crate::models::event::{DomainEvent, EventKind};
use crate::models::order::{Order, OrderStatus, Prescription};
use crate::models::tracking::{ColdChainAlert, GeoPoint, LocationSample};
use crate::store::{DeliveryChange, DeliveryGuard, OrderGuard, Store};

#[derive(Debug, Clone, Copy)]
pub struct ColdChainPolicy {
    pub max_celsius: f64,
}

impl ColdChainPolicy {
    /// Judged on the reading alone, not on the stored maximum.
    pub fn condition(&self, reading: f64) -> Condition {
        if reading > self.max_celsius {
            Condition::Critical
        } else {
            Condition::Nominal
        }
    }
}

/// A committed mutation together with the event describing it.
#[derive(Debug, Clone)]
pub struct Committed<T> {
    pub value: T,
    pub event: DomainEvent,
}

#[derive(Debug, Clone, Serialize)]
pub struct TelemetryReceipt {
    pub delivery: Delivery,
    pub order_status: OrderStatus,
    pub temperature: Option<f64>,
    pub condition: Option<Condition>,
    /// Present only when the update carried both coordinates.
    pub location: Option<GeoPoint>,
}

pub struct OrderLedger {
    store: Arc<dyn Store>,
    cold_chain: ColdChainPolicy,
}

impl OrderLedger {
    pub fn new(store: Arc<dyn Store>, cold_chain: ColdChainPolicy) -> Self {
        Self { store, cold_chain }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub async fn issue(
        &self,
        actor: &Actor,
        pharmacy_id: String,
        patient_id: Option<String>,
        prescription: Prescription,
    ) -> Result<Committed<Order>, AppError> {
        if pharmacy_id.trim().is_empty() {
            return Err(AppError::BadRequest("pharmacy_id cannot be empty".to_string()));
        }
        if prescription.medications.is_empty() {
            return Err(AppError::BadRequest(
                "prescription must list at least one medication".to_string(),
            ));
        }

        let order = Order::new(pharmacy_id, patient_id, actor.user_id.clone(), prescription);
        self.store.insert_order(order.clone()).await?;

        info!(order_id = %order.id, pharmacy_id = %order.pharmacy_id, "prescription issued");
        let event = DomainEvent::new(
            EventKind::PrescriptionIssued,
            actor,
            &order,
            "Digital script issued. Awaiting payment.",
        );
        Ok(Committed { value: order, event })
    }

    pub async fn confirm_payment(
        &self,
        actor: &Actor,
        order_id: Uuid,
        amount: f64,
    ) -> Result<Committed<Order>, AppError> {
        let guard = OrderGuard {
            id: order_id,
            status: OrderStatus::PendingVerification,
            pharmacy_id: None,
        };
        let order = self.advance(&guard, OrderStatus::Paid, Some(amount)).await?;

        info!(order_id = %order.id, amount, "payment confirmed");
        let event = DomainEvent::new(
            EventKind::PaymentConfirmed,
            actor,
            &order,
            "Payment confirmed. Starting cold-chain dispatch.",
        );
        Ok(Committed { value: order, event })
    }

    pub async fn accept(
        &self,
        actor: &Actor,
        order_id: Uuid,
        pharmacy_id: &str,
    ) -> Result<Committed<Order>, AppError> {
        let guard = OrderGuard {
            id: order_id,
            status: OrderStatus::Paid,
            pharmacy_id: Some(pharmacy_id.to_string()),
        };
        let order = self.advance(&guard, OrderStatus::Processing, None).await?;

        info!(order_id = %order.id, pharmacy_id, "order accepted");
        let event = DomainEvent::new(
            EventKind::OrderAccepted,
            actor,
            &order,
            "Your pharmacist is preparing your medication.",
        );
        Ok(Committed { value: order, event })
    }

    /// Moves the order to `out_for_delivery` and creates its delivery in the
    /// same store operation.
    pub async fn dispatch(
        &self,
        actor: &Actor,
        order_id: Uuid,
        pharmacy_id: &str,
        driver_id: &str,
    ) -> Result<Committed<(Order, Delivery)>, AppError> {
        if driver_id.trim().is_empty() {
            return Err(AppError::BadRequest("driver_id cannot be empty".to_string()));
        }

        let guard = OrderGuard {
            id: order_id,
            status: OrderStatus::Processing,
            pharmacy_id: Some(pharmacy_id.to_string()),
        };
        let delivery = Delivery::assign(order_id, driver_id.to_string());

        let Some((order, delivery)) = self.store.dispatch_order(&guard, delivery).await? else {
            return Err(self
                .explain_order_miss(&guard, OrderStatus::OutForDelivery)
                .await);
        };

        info!(order_id = %order.id, delivery_id = %delivery.id, driver_id, "driver assigned");
        let event = DomainEvent::new(
            EventKind::DriverAssigned,
            actor,
            &order,
            format!("Driver {driver_id} assigned."),
        )
        .with_delivery(&delivery);
        Ok(Committed {
            value: (order, delivery),
            event,
        })
    }

    /// Applies a driver status/telemetry update. The first `in_transit`
    /// update also moves the order to `in_transit`; later ones only record
    /// readings.
    pub async fn record_telemetry(
        &self,
        actor: &Actor,
        delivery_id: Uuid,
        update: &TelemetryUpdate,
    ) -> Result<Committed<TelemetryReceipt>, AppError> {
        if let Some(reading) = update.temperature {
            if !reading.is_finite() {
                return Err(AppError::BadRequest(format!("invalid temperature: {reading}")));
            }
        }

        let now = Utc::now();
        let location = update
            .location
            .as_ref()
            .and_then(|input| input.complete())
            .map(|point| LocationSample {
                id: Uuid::new_v4(),
                driver_id: actor.user_id.clone(),
                location: point,
                recorded_at: now,
            });
        let condition = update
            .temperature
            .map(|reading| self.cold_chain.condition(reading));

        let mut delivery = self.driver_delivery(actor, delivery_id).await?;
        let mut retried = false;
        let (order, delivery) = loop {
            let current = delivery.status;
            let target = update.status.unwrap_or(current);
            let order_status = telemetry_order_step(delivery_id, current, target)?;

            let alert = match (update.temperature, condition) {
                (Some(reading), Some(Condition::Critical)) => Some(ColdChainAlert {
                    id: Uuid::new_v4(),
                    delivery_id,
                    order_id: delivery.order_id,
                    reading_celsius: reading,
                    threshold_celsius: self.cold_chain.max_celsius,
                    recorded_at: now,
                }),
                _ => None,
            };
            let guard = DeliveryGuard {
                id: delivery_id,
                driver_id: actor.user_id.clone(),
                status: current,
            };
            let change = DeliveryChange {
                status: target,
                order_status,
                temperature: update.temperature,
                location: location.clone(),
                delivered_at: None,
                alert,
            };

            if let Some(updated) = self.store.update_delivery(&guard, change).await? {
                break updated;
            }

            // A concurrent update moved the row; re-evaluate once against it
            // so the reading is not lost.
            if !retried {
                if let Some(fresh) = self.store.get_delivery(delivery_id).await? {
                    if fresh.driver_id == actor.user_id && fresh.status != current {
                        debug!(
                            delivery_id = %delivery_id,
                            from = %current,
                            now = %fresh.status,
                            "delivery changed concurrently, retrying update"
                        );
                        delivery = fresh;
                        retried = true;
                        continue;
                    }
                }
            }
            return Err(self.explain_delivery_miss(&guard, target).await);
        };

        if condition == Some(Condition::Critical) {
            warn!(
                delivery_id = %delivery.id,
                order_id = %order.id,
                temperature = update.temperature,
                threshold = self.cold_chain.max_celsius,
                "cold chain breach"
            );
        } else {
            info!(delivery_id = %delivery.id, status = %delivery.status, "delivery updated");
        }

        let point = location.map(|sample| sample.location);
        let mut event = DomainEvent::new(
            EventKind::DeliveryUpdated,
            actor,
            &order,
            match condition {
                Some(Condition::Critical) => "Cold chain breach detected.",
                _ => "Logistics data synchronized.",
            },
        )
        .with_delivery(&delivery);
        event.temperature = update.temperature;
        event.location = point;
        event.condition = condition;

        Ok(Committed {
            value: TelemetryReceipt {
                delivery,
                order_status: order.status,
                temperature: update.temperature,
                condition,
                location: point,
            },
            event,
        })
    }

    /// Final hand-over. Requires a receipt from a biometric verifier.
    pub async fn complete(
        &self,
        actor: &Actor,
        receipt: &BiometricReceipt,
    ) -> Result<Committed<(Order, Delivery)>, AppError> {
        if receipt.driver_id() != actor.user_id {
            return Err(AppError::Unauthorized(
                "biometric receipt was issued to another driver".to_string(),
            ));
        }

        let guard = DeliveryGuard {
            id: receipt.delivery_id(),
            driver_id: actor.user_id.clone(),
            status: DeliveryStatus::InTransit,
        };
        let change = DeliveryChange {
            status: DeliveryStatus::Delivered,
            order_status: Some((OrderStatus::InTransit, OrderStatus::Delivered)),
            temperature: None,
            location: None,
            delivered_at: Some(Utc::now()),
            alert: None,
        };

        let Some((order, delivery)) = self.store.update_delivery(&guard, change).await? else {
            return Err(self
                .explain_delivery_miss(&guard, DeliveryStatus::Delivered)
                .await);
        };

        info!(order_id = %order.id, delivery_id = %delivery.id, "delivery completed");
        let event = DomainEvent::new(
            EventKind::DeliveryCompleted,
            actor,
            &order,
            "Biometric identity verified. Package delivered.",
        )
        .with_delivery(&delivery);
        Ok(Committed {
            value: (order, delivery),
            event,
        })
    }

    pub async fn record_claim(
        &self,
        actor: &Actor,
        order: &Order,
        delivery: &Delivery,
        adjudication: &Adjudication,
    ) -> Result<Committed<Claim>, AppError> {
        let claim = Claim::from_adjudication(delivery.id, order.id, adjudication);
        if !self.store.insert_claim(claim.clone()).await? {
            return Err(AppError::Conflict(format!(
                "delivery {} already has a claim",
                delivery.id
            )));
        }

        info!(
            claim_id = %claim.id,
            order_id = %order.id,
            scheme = %claim.scheme,
            status = ?claim.status,
            "claim recorded"
        );
        let mut event = DomainEvent::new(
            EventKind::ClaimRecorded,
            actor,
            order,
            format!("Claim {} recorded.", claim.auth_number),
        )
        .with_delivery(delivery);
        event.claim_id = Some(claim.id);
        Ok(Committed { value: claim, event })
    }

    async fn advance(
        &self,
        guard: &OrderGuard,
        to: OrderStatus,
        amount_paid: Option<f64>,
    ) -> Result<Order, AppError> {
        if !guard.status.can_advance_to(&to) {
            return Err(AppError::order_transition(&guard.status, &to));
        }
        match self.store.update_order_status(guard, to, amount_paid).await? {
            Some(order) => Ok(order),
            None => Err(self.explain_order_miss(guard, to).await),
        }
    }

    async fn explain_order_miss(&self, guard: &OrderGuard, to: OrderStatus) -> AppError {
        let order = match self.store.get_order(guard.id).await {
            Ok(order) => order,
            Err(err) => return err.into(),
        };
        match order {
            Some(order)
                if guard
                    .pharmacy_id
                    .as_ref()
                    .is_none_or(|pharmacy_id| *pharmacy_id == order.pharmacy_id) =>
            {
                AppError::order_transition(&order.status, &to)
            }
            _ => AppError::NotFound(format!("order {} not found", guard.id)),
        }
    }

    async fn driver_delivery(&self, actor: &Actor, delivery_id: Uuid) -> Result<Delivery, AppError> {
        let delivery = self
            .store
            .get_delivery(delivery_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("delivery {delivery_id} not found")))?;
        if delivery.driver_id != actor.user_id {
            return Err(AppError::Unauthorized(format!(
                "driver {} is not assigned to delivery {delivery_id}",
                actor.user_id
            )));
        }
        Ok(delivery)
    }

    async fn explain_delivery_miss(&self, guard: &DeliveryGuard, to: DeliveryStatus) -> AppError {
        let delivery = match self.store.get_delivery(guard.id).await {
            Ok(delivery) => delivery,
            Err(err) => return err.into(),
        };
        match delivery {
            None => AppError::NotFound(format!("delivery {} not found", guard.id)),
            Some(delivery) if delivery.driver_id != guard.driver_id => AppError::Unauthorized(
                format!("driver {} is not assigned to delivery {}", guard.driver_id, guard.id),
            ),
            Some(delivery) if delivery.status == to => AppError::InvalidTransition(format!(
                "delivery {} was updated concurrently and is already {to}",
                guard.id
            )),
            Some(delivery) => AppError::delivery_transition(&delivery.status, &to),
        }
    }
}

/// Which order step, if any, accompanies a driver moving a delivery from
/// `current` to `target`. Completion is reserved for biometric confirmation.
fn telemetry_order_step(
    delivery_id: Uuid,
    current: DeliveryStatus,
    target: DeliveryStatus,
) -> Result<Option<(OrderStatus, OrderStatus)>, AppError> {
    match (current, target) {
        (DeliveryStatus::Delivered, _) => Err(AppError::InvalidTransition(format!(
            "delivery {delivery_id} is already delivered"
        ))),
        (_, DeliveryStatus::Delivered) => Err(AppError::InvalidTransition(
            "delivery can only be completed by biometric confirmation".to_string(),
        )),
        (DeliveryStatus::InTransit, DeliveryStatus::Assigned) => {
            Err(AppError::delivery_transition(&current, &target))
        }
        (DeliveryStatus::Assigned, DeliveryStatus::InTransit) => {
            Ok(Some((OrderStatus::OutForDelivery, OrderStatus::InTransit)))
        }
        _ => Ok(None),
    }
}
