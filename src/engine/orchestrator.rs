use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::adapters::{guarded, Adapters, IdentityReport};
use crate::engine::hooks::{run_hooks, PostCommitHook};
use crate::error::AppError;
use crate::ledger::{Committed, OrderLedger, TelemetryReceipt};
use crate::models::actor::{Actor, Role};
use crate::models::claim::{Adjudication, Claim, LineItem};
use crate::models::delivery::{Condition, Delivery, TelemetryUpdate};
use crate::models::inventory::{InventoryItem, NewInventoryItem};
use crate::models::order::{Order, OrderStatus, Prescription};
use crate::models::tracking::ColdChainAlert;
use crate::notify::Channel;
use crate::observability::metrics::Metrics;
use crate::store::{InventoryGuard, StoreStats};

const PHARMACY_STAFF: &[Role] = &[Role::Pharmacist, Role::Dispatcher];

#[derive(Debug, Clone, Deserialize)]
pub struct IssuePrescription {
    pub pharmacy_id: String,
    #[serde(default)]
    pub patient_id: Option<String>,
    #[serde(flatten)]
    pub prescription: Prescription,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PaymentOutcome {
    Confirmed { order: Order },
    Ignored { event: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct Completion {
    pub order: Order,
    pub delivery: Delivery,
    pub audit_hash: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClaimOutcome {
    pub claim: Claim,
    pub adjudication: Adjudication,
    pub action: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryView {
    pub delivery: Delivery,
    pub alerts: Vec<ColdChainAlert>,
    pub claim: Option<Claim>,
}

/// Sequences each request: authorize, at most one adapter call, one ledger
/// mutation, then the post-commit hooks. Nothing runs in parallel within a
/// request.
pub struct Orchestrator {
    ledger: OrderLedger,
    adapters: Adapters,
    hooks: Vec<Arc<dyn PostCommitHook>>,
    adapter_timeout: Duration,
    metrics: Metrics,
}

impl Orchestrator {
    pub fn new(
        ledger: OrderLedger,
        adapters: Adapters,
        hooks: Vec<Arc<dyn PostCommitHook>>,
        adapter_timeout: Duration,
        metrics: Metrics,
    ) -> Self {
        Self {
            ledger,
            adapters,
            hooks,
            adapter_timeout,
            metrics,
        }
    }

    pub async fn issue_prescription(
        &self,
        actor: &Actor,
        request: IssuePrescription,
    ) -> Result<Order, AppError> {
        require_role(actor, &[Role::Doctor])?;
        let result = self
            .ledger
            .issue(actor, request.pharmacy_id, request.patient_id, request.prescription)
            .await;
        self.commit("issue_prescription", result).await
    }

    pub async fn handle_payment_webhook(
        &self,
        origin: &str,
        signature: Option<&str>,
        payload: &[u8],
    ) -> Result<PaymentOutcome, AppError> {
        let signature = signature.ok_or(AppError::InvalidSignature)?;
        let event = self
            .call_adapter(
                "payment_verification",
                self.adapters.payment.verify(signature, payload),
            )
            .await?;

        if !event.is_charge_success() {
            info!(event = %event.event, "ignoring payment webhook event");
            return Ok(PaymentOutcome::Ignored { event: event.event });
        }

        let order_id = event
            .order_id
            .ok_or_else(|| AppError::BadRequest("webhook metadata has no order_id".to_string()))?;
        let amount = event
            .amount
            .ok_or_else(|| AppError::BadRequest("charge.success event has no amount".to_string()))?;
        let actor = Actor::payment_provider(origin);
        let result = self
            .ledger
            .confirm_payment(&actor, order_id, amount)
            .await;
        let order = self.commit("confirm_payment", result).await?;
        Ok(PaymentOutcome::Confirmed { order })
    }

    pub async fn accept_order(&self, actor: &Actor, order_id: Uuid) -> Result<Order, AppError> {
        require_role(actor, &[Role::Pharmacist])?;
        let pharmacy_id = require_pharmacy(actor)?;
        let result = self.ledger.accept(actor, order_id, pharmacy_id).await;
        self.commit("accept_order", result).await
    }

    pub async fn assign_driver(
        &self,
        actor: &Actor,
        order_id: Uuid,
        driver_id: &str,
    ) -> Result<(Order, Delivery), AppError> {
        require_role(actor, PHARMACY_STAFF)?;
        let pharmacy_id = require_pharmacy(actor)?;
        let result = self
            .ledger
            .dispatch(actor, order_id, pharmacy_id, driver_id)
            .await;
        self.commit("assign_driver", result).await
    }

    pub async fn update_delivery(
        &self,
        actor: &Actor,
        delivery_id: Uuid,
        update: &TelemetryUpdate,
    ) -> Result<TelemetryReceipt, AppError> {
        require_role(actor, &[Role::Driver])?;
        let result = self.ledger.record_telemetry(actor, delivery_id, update).await;
        if let Ok(committed) = &result {
            if committed.value.condition == Some(Condition::Critical) {
                self.metrics.cold_chain_breaches_total.inc();
            }
        }
        self.commit("update_delivery", result).await
    }

    pub async fn verify_biometric(
        &self,
        actor: &Actor,
        delivery_id: Uuid,
        biometric_hash: &str,
    ) -> Result<Completion, AppError> {
        require_role(actor, &[Role::Driver])?;
        let delivery = self
            .ledger
            .store()
            .get_delivery(delivery_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("delivery {delivery_id} not found")))?;

        let receipt = self
            .call_adapter(
                "biometric_confirmation",
                self.adapters.biometric.confirm(&delivery, &actor.user_id, biometric_hash),
            )
            .await?;

        let result = self.ledger.complete(actor, &receipt).await;
        let (order, delivery) = self.commit("verify_biometric", result).await?;
        Ok(Completion {
            order,
            delivery,
            audit_hash: receipt.audit_hash().to_string(),
        })
    }

    pub async fn submit_claim(
        &self,
        actor: &Actor,
        order_id: Uuid,
        scheme: &str,
        items: Vec<LineItem>,
    ) -> Result<ClaimOutcome, AppError> {
        require_role(actor, &[Role::Pharmacist, Role::Admin])?;
        let order = self.visible_order(actor, order_id).await?;
        let store = self.ledger.store();
        let delivery = store
            .delivery_for_order(order.id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} has no delivery yet")))?;
        if store.claim_for_delivery(delivery.id).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "delivery {} already has a claim",
                delivery.id
            )));
        }

        let items = if items.is_empty() {
            line_items_from(&order.prescription)?
        } else {
            items
        };

        let adjudication = self
            .call_adapter(
                "claim_adjudication",
                self.adapters.adjudication.adjudicate(scheme, &items),
            )
            .await?;

        let result = self
            .ledger
            .record_claim(actor, &order, &delivery, &adjudication)
            .await;
        let claim = self.commit("submit_claim", result).await?;
        let action = claim.settlement_action();
        Ok(ClaimOutcome {
            claim,
            adjudication,
            action,
        })
    }

    /// Adjudication without recording a claim.
    pub async fn preview_adjudication(
        &self,
        actor: &Actor,
        scheme: &str,
        items: &[LineItem],
    ) -> Result<Adjudication, AppError> {
        require_role(actor, &[Role::Pharmacist, Role::Admin])?;
        if items.is_empty() {
            return Err(AppError::BadRequest("at least one line item is required".to_string()));
        }
        self.call_adapter(
            "claim_adjudication",
            self.adapters.adjudication.adjudicate(scheme, items),
        )
        .await
    }

    pub async fn verify_identity(
        &self,
        actor: &Actor,
        id_number: &str,
    ) -> Result<IdentityReport, AppError> {
        require_role(
            actor,
            &[Role::Patient, Role::Doctor, Role::Pharmacist, Role::Admin],
        )?;
        self.call_adapter(
            "identity_verification",
            self.adapters.identity.verify(id_number),
        )
        .await
    }

    pub async fn list_orders(
        &self,
        actor: &Actor,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, AppError> {
        let store = self.ledger.store();
        if actor.role == Role::Patient {
            let mut orders = store.list_patient_orders(&actor.user_id).await?;
            orders.retain(|order| status.is_none_or(|status| status == order.status));
            return Ok(orders);
        }

        require_role(actor, PHARMACY_STAFF)?;
        let pharmacy_id = require_pharmacy(actor)?;
        Ok(store.list_orders(pharmacy_id, status).await?)
    }

    pub async fn get_order(&self, actor: &Actor, order_id: Uuid) -> Result<Order, AppError> {
        self.visible_order(actor, order_id).await
    }

    pub async fn driver_tasks(&self, actor: &Actor) -> Result<Vec<Delivery>, AppError> {
        require_role(actor, &[Role::Driver])?;
        Ok(self
            .ledger
            .store()
            .list_driver_deliveries(&actor.user_id)
            .await?)
    }

    pub async fn get_delivery(&self, actor: &Actor, delivery_id: Uuid) -> Result<DeliveryView, AppError> {
        let store = self.ledger.store();
        let delivery = self.visible_delivery(actor, delivery_id).await?;
        let alerts = store.alerts_for_delivery(delivery.id).await?;
        let claim = store.claim_for_delivery(delivery.id).await?;
        Ok(DeliveryView {
            delivery,
            alerts,
            claim,
        })
    }

    pub async fn inventory(&self, actor: &Actor) -> Result<Vec<InventoryItem>, AppError> {
        require_role(actor, &[Role::Pharmacist])?;
        let pharmacy_id = require_pharmacy(actor)?;
        Ok(self.ledger.store().list_inventory(pharmacy_id).await?)
    }

    pub async fn add_inventory_item(
        &self,
        actor: &Actor,
        request: NewInventoryItem,
    ) -> Result<InventoryItem, AppError> {
        require_role(actor, &[Role::Pharmacist])?;
        let pharmacy_id = require_pharmacy(actor)?;
        if request.name.trim().is_empty() {
            return Err(AppError::BadRequest("item name cannot be empty".to_string()));
        }

        let item = InventoryItem::new(
            pharmacy_id.to_string(),
            request.name,
            request.quantity,
            request.is_refrigerated,
        );
        self.ledger.store().insert_inventory_item(item.clone()).await?;
        info!(item_id = %item.id, pharmacy_id, "inventory item added");
        Ok(item)
    }

    /// Sets the stock level of one of the caller's pharmacy items. Items of
    /// other pharmacies are reported as missing.
    pub async fn update_stock(
        &self,
        actor: &Actor,
        item_id: Uuid,
        quantity: u32,
    ) -> Result<InventoryItem, AppError> {
        require_role(actor, &[Role::Pharmacist])?;
        let guard = InventoryGuard {
            id: item_id,
            pharmacy_id: require_pharmacy(actor)?.to_string(),
        };
        let item = self
            .ledger
            .store()
            .update_stock(&guard, quantity)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("inventory item {item_id} not found")))?;
        info!(item_id = %item.id, quantity, "stock updated");
        Ok(item)
    }

    /// Decides whether `actor` may subscribe to the channel called `name`.
    /// Order and delivery channels follow the same visibility as reads; the
    /// global stream is for facility dashboards.
    pub async fn authorize_channel(&self, actor: &Actor, name: &str) -> Result<Channel, AppError> {
        let channel = Channel::parse(name)
            .ok_or_else(|| AppError::BadRequest(format!("unknown channel {name}")))?;
        match channel {
            Channel::Global => {
                require_role(actor, &[Role::Admin, Role::Pharmacist, Role::Dispatcher])?;
            }
            Channel::Order(order_id) if actor.role == Role::Driver => {
                let assigned = self
                    .ledger
                    .store()
                    .delivery_for_order(order_id)
                    .await?
                    .is_some_and(|delivery| delivery.driver_id == actor.user_id);
                if !assigned {
                    return Err(AppError::NotFound(format!("order {order_id} not found")));
                }
            }
            Channel::Order(order_id) => {
                self.visible_order(actor, order_id).await?;
            }
            Channel::Delivery(delivery_id) => {
                self.visible_delivery(actor, delivery_id).await?;
            }
        }
        Ok(channel)
    }

    pub async fn stats(&self) -> Result<StoreStats, AppError> {
        Ok(self.ledger.store().stats().await?)
    }

    async fn visible_order(&self, actor: &Actor, order_id: Uuid) -> Result<Order, AppError> {
        let order = self
            .ledger
            .store()
            .get_order(order_id)
            .await?
            .filter(|order| can_view(actor, order))
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;
        Ok(order)
    }

    async fn visible_delivery(&self, actor: &Actor, delivery_id: Uuid) -> Result<Delivery, AppError> {
        let store = self.ledger.store();
        let not_found = || AppError::NotFound(format!("delivery {delivery_id} not found"));
        let delivery = store.get_delivery(delivery_id).await?.ok_or_else(not_found)?;

        let visible = match actor.role {
            Role::Admin => true,
            Role::Driver => delivery.driver_id == actor.user_id,
            Role::Pharmacist | Role::Dispatcher => {
                let order = store.get_order(delivery.order_id).await?;
                order.is_some_and(|order| Some(&order.pharmacy_id) == actor.pharmacy_id.as_ref())
            }
            _ => false,
        };
        if !visible {
            return Err(not_found());
        }
        Ok(delivery)
    }

    async fn commit<T>(
        &self,
        operation: &'static str,
        result: Result<Committed<T>, AppError>,
    ) -> Result<T, AppError> {
        match result {
            Ok(committed) => {
                self.metrics
                    .transitions_total
                    .with_label_values(&[operation, "committed"])
                    .inc();
                run_hooks(&self.hooks, &committed.event, &self.metrics).await;
                Ok(committed.value)
            }
            Err(err) => {
                self.metrics
                    .transitions_total
                    .with_label_values(&[operation, err.code()])
                    .inc();
                info!(operation, error = %err, "transition rejected");
                Err(err)
            }
        }
    }

    async fn call_adapter<T, F>(&self, adapter: &'static str, call: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        let started = Instant::now();
        let result = guarded(adapter, self.adapter_timeout, call).await;
        self.metrics
            .adapter_latency_seconds
            .with_label_values(&[adapter])
            .observe(started.elapsed().as_secs_f64());

        let outcome = match &result {
            Ok(_) => "ok",
            Err(err) => err.code(),
        };
        self.metrics
            .adapter_calls_total
            .with_label_values(&[adapter, outcome])
            .inc();
        if let Err(err @ (AppError::AdapterTimeout { .. } | AppError::AdapterUnavailable { .. })) =
            &result
        {
            warn!(adapter, error = %err, "external adapter failed");
        }
        result
    }
}

fn require_role(actor: &Actor, roles: &[Role]) -> Result<(), AppError> {
    if actor.has_role(roles) {
        Ok(())
    } else {
        Err(AppError::Unauthorized(format!(
            "role {} may not perform this operation",
            actor.role
        )))
    }
}

fn require_pharmacy(actor: &Actor) -> Result<&str, AppError> {
    actor
        .pharmacy_id
        .as_deref()
        .filter(|pharmacy_id| !pharmacy_id.is_empty())
        .ok_or_else(|| AppError::Unauthorized("no pharmacy is linked to this account".to_string()))
}

fn can_view(actor: &Actor, order: &Order) -> bool {
    match actor.role {
        Role::Admin => true,
        Role::Pharmacist | Role::Dispatcher => actor.pharmacy_id.as_ref() == Some(&order.pharmacy_id),
        Role::Doctor => order.prescribed_by == actor.user_id,
        Role::Patient => order.patient_id.as_ref() == Some(&actor.user_id),
        Role::Driver | Role::PaymentProvider => false,
    }
}

fn line_items_from(prescription: &Prescription) -> Result<Vec<LineItem>, AppError> {
    prescription
        .medications
        .iter()
        .map(|medication| {
            medication
                .price
                .map(|price| LineItem {
                    name: medication.name.clone(),
                    price,
                })
                .ok_or_else(|| {
                    AppError::BadRequest(format!(
                        "no price for {}; supply line items explicitly",
                        medication.name
                    ))
                })
        })
        .collect()
}
