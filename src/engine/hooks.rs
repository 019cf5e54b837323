use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::models::event::DomainEvent;
use crate::models::tracking::AuditEntry;
use crate::notify::{delivery_channel, order_channel, Notification, PublishError, Publisher, GLOBAL_CHANNEL};
use crate::observability::metrics::Metrics;
use crate::store::{Store, StoreError};

#[derive(Debug, Error)]
pub enum HookError {
    #[error("audit write failed: {0}")]
    Store(#[from] StoreError),

    #[error("publish failed: {0}")]
    Publish(#[from] PublishError),
}

/// Side effect run after a ledger mutation has been committed. Failures are
/// logged by the caller and never reach the client.
#[async_trait]
pub trait PostCommitHook: Send + Sync {
    fn name(&self) -> &'static str;

    async fn after_commit(&self, event: &DomainEvent) -> Result<(), HookError>;
}

pub async fn run_hooks(hooks: &[Arc<dyn PostCommitHook>], event: &DomainEvent, metrics: &Metrics) {
    for hook in hooks {
        if let Err(err) = hook.after_commit(event).await {
            metrics
                .hook_failures_total
                .with_label_values(&[hook.name()])
                .inc();
            warn!(
                hook = hook.name(),
                order_id = %event.order_id,
                error = %err,
                "post-commit hook failed"
            );
        }
    }
}

pub struct AuditHook {
    store: Arc<dyn Store>,
}

impl AuditHook {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PostCommitHook for AuditHook {
    fn name(&self) -> &'static str {
        "audit"
    }

    async fn after_commit(&self, event: &DomainEvent) -> Result<(), HookError> {
        let (resource_type, resource_id) = event.resource();
        let entry = AuditEntry {
            id: Uuid::new_v4(),
            actor_id: event.actor_id.clone(),
            action: event.kind.action().to_string(),
            resource_type: resource_type.to_string(),
            resource_id,
            origin: event.origin.clone(),
            recorded_at: event.occurred_at,
        };
        self.store.append_audit(entry).await?;
        Ok(())
    }
}

/// Forwards each event once to the order channel, the delivery channel when
/// there is one, and the global stream.
pub struct NotificationHook {
    publisher: Arc<dyn Publisher>,
    metrics: Metrics,
}

impl NotificationHook {
    pub fn new(publisher: Arc<dyn Publisher>, metrics: Metrics) -> Self {
        Self { publisher, metrics }
    }
}

#[async_trait]
impl PostCommitHook for NotificationHook {
    fn name(&self) -> &'static str {
        "notification"
    }

    async fn after_commit(&self, event: &DomainEvent) -> Result<(), HookError> {
        let mut channels = vec![order_channel(event.order_id)];
        if let Some(delivery_id) = event.delivery_id {
            channels.push(delivery_channel(delivery_id));
        }
        channels.push(GLOBAL_CHANNEL.to_string());

        let mut first_error = None;
        for channel in &channels {
            match self
                .publisher
                .publish(channel, Notification::from_event(channel, event))
            {
                Ok(report) => {
                    self.metrics
                        .notifications_total
                        .with_label_values(&["delivered"])
                        .inc_by(report.delivered as u64);
                    self.metrics
                        .notifications_total
                        .with_label_values(&["dropped"])
                        .inc_by(report.dropped as u64);
                }
                Err(err) => {
                    warn!(channel = %channel, error = %err, "notification publish failed");
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }

        match first_error {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{run_hooks, AuditHook, NotificationHook, PostCommitHook};
    use crate::models::actor::{Actor, Role};
    use crate::models::event::{DomainEvent, EventKind};
    use crate::models::order::{Order, Prescription};
    use crate::notify::{order_channel, FanOut, Publisher, GLOBAL_CHANNEL};
    use crate::observability::metrics::Metrics;
    use crate::store::MemoryStore;

    fn event() -> DomainEvent {
        let order = Order::new(
            "PHARM-1".to_string(),
            None,
            "DOC-1".to_string(),
            Prescription {
                reference: None,
                medications: Vec::new(),
                is_refrigerated: false,
                is_controlled_substance: false,
            },
        );
        let actor = Actor {
            user_id: "PHA-1".to_string(),
            role: Role::Pharmacist,
            pharmacy_id: Some("PHARM-1".to_string()),
            origin: "10.0.0.7".to_string(),
        };
        DomainEvent::new(EventKind::OrderAccepted, &actor, &order, "accepted")
    }

    #[tokio::test]
    async fn audit_hook_records_actor_action_and_origin() {
        let store = Arc::new(MemoryStore::new());
        let hook = AuditHook::new(store.clone());
        let event = event();

        hook.after_commit(&event).await.unwrap();

        let entries = store.audit_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].actor_id, "PHA-1");
        assert_eq!(entries[0].action, "order.accept");
        assert_eq!(entries[0].resource_type, "order");
        assert_eq!(entries[0].resource_id, event.order_id);
        assert_eq!(entries[0].origin, "10.0.0.7");
    }

    #[tokio::test]
    async fn notification_hook_reaches_order_and_global_subscribers() {
        let fanout = Arc::new(FanOut::new(8));
        let event = event();
        let (order_sub, mut order_rx) = fanout.connect();
        let (global_sub, mut global_rx) = fanout.connect();
        fanout.join(order_sub, &order_channel(event.order_id)).unwrap();
        fanout.join(global_sub, GLOBAL_CHANNEL).unwrap();

        let publisher: Arc<dyn Publisher> = fanout.clone();
        let hook = NotificationHook::new(publisher, Metrics::new());
        hook.after_commit(&event).await.unwrap();

        assert_eq!(order_rx.recv().await.unwrap().order_id, event.order_id);
        assert_eq!(global_rx.recv().await.unwrap().channel, GLOBAL_CHANNEL);
    }

    struct Broken;

    #[async_trait::async_trait]
    impl PostCommitHook for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn after_commit(&self, _event: &DomainEvent) -> Result<(), super::HookError> {
            Err(super::HookError::Publish(crate::notify::PublishError::Unavailable(
                "socket layer down".to_string(),
            )))
        }
    }

    #[tokio::test]
    async fn failing_hook_does_not_stop_the_rest() {
        let store = Arc::new(MemoryStore::new());
        let metrics = Metrics::new();
        let hooks: Vec<Arc<dyn PostCommitHook>> =
            vec![Arc::new(Broken), Arc::new(AuditHook::new(store.clone()))];

        run_hooks(&hooks, &event(), &metrics).await;

        assert_eq!(store.audit_entries().len(), 1);
        assert_eq!(
            metrics
                .hook_failures_total
                .with_label_values(&["broken"])
                .get(),
            1
        );
    }
}
