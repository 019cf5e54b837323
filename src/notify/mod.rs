//! Notification fan-out.
//!
//! Connections register with the [`FanOut`] and receive a bounded queue.
//! They join logical channels (`order-{id}`, `delivery-{id}` or the global
//! stream) and every publish to a channel is pushed once, best effort, to
//! whichever connections are members at that moment. Nothing is buffered
//! for late joiners and full queues drop the notification.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::delivery::{Condition, DeliveryStatus};
use crate::models::event::{DomainEvent, EventKind};
use crate::models::order::OrderStatus;
use crate::models::tracking::GeoPoint;

pub const GLOBAL_CHANNEL: &str = "global-logistics-update";

pub type ConnectionId = Uuid;

pub fn order_channel(order_id: Uuid) -> String {
    format!("order-{order_id}")
}

pub fn delivery_channel(delivery_id: Uuid) -> String {
    format!("delivery-{delivery_id}")
}

/// A channel name a client asked to join, decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Global,
    Order(Uuid),
    Delivery(Uuid),
}

impl Channel {
    pub fn parse(name: &str) -> Option<Self> {
        if name == GLOBAL_CHANNEL {
            return Some(Channel::Global);
        }
        if let Some(id) = name.strip_prefix("order-") {
            return id.parse().ok().map(Channel::Order);
        }
        if let Some(id) = name.strip_prefix("delivery-") {
            return id.parse().ok().map(Channel::Delivery);
        }
        None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub channel: String,
    pub event: EventKind,
    pub order_id: Uuid,
    pub delivery_id: Option<Uuid>,
    pub status: OrderStatus,
    pub delivery_status: Option<DeliveryStatus>,
    pub temperature: Option<f64>,
    pub location: Option<GeoPoint>,
    pub condition: Option<Condition>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn from_event(channel: &str, event: &DomainEvent) -> Self {
        Self {
            channel: channel.to_string(),
            event: event.kind,
            order_id: event.order_id,
            delivery_id: event.delivery_id,
            status: event.order_status,
            delivery_status: event.delivery_status,
            temperature: event.temperature,
            location: event.location,
            condition: event.condition,
            message: event.message.clone(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),

    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub dropped: usize,
}

/// The transport boundary the notification hook publishes through.
pub trait Publisher: Send + Sync {
    fn publish(&self, channel: &str, notification: Notification) -> Result<PublishReport, PublishError>;
}

/// In-process subscriber registry.
pub struct FanOut {
    connections: DashMap<ConnectionId, mpsc::Sender<Notification>>,
    channels: DashMap<String, HashSet<ConnectionId>>,
    buffer: usize,
}

impl FanOut {
    pub fn new(buffer: usize) -> Self {
        Self {
            connections: DashMap::new(),
            channels: DashMap::new(),
            buffer: buffer.max(1),
        }
    }

    pub fn connect(&self) -> (ConnectionId, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = Uuid::new_v4();
        self.connections.insert(id, tx);
        debug!(connection_id = %id, "subscriber connected");
        (id, rx)
    }

    pub fn join(&self, connection: ConnectionId, channel: &str) -> Result<(), PublishError> {
        if !self.connections.contains_key(&connection) {
            return Err(PublishError::UnknownConnection(connection));
        }
        self.channels
            .entry(channel.to_string())
            .or_default()
            .insert(connection);
        debug!(connection_id = %connection, channel, "joined channel");
        Ok(())
    }

    pub fn leave(&self, connection: ConnectionId, channel: &str) {
        let now_empty = match self.channels.get_mut(channel) {
            Some(mut members) => {
                members.remove(&connection);
                members.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.channels.remove_if(channel, |_, members| members.is_empty());
        }
    }

    pub fn disconnect(&self, connection: ConnectionId) {
        self.connections.remove(&connection);
        self.channels.retain(|_, members| {
            members.remove(&connection);
            !members.is_empty()
        });
        debug!(connection_id = %connection, "subscriber disconnected");
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .get(channel)
            .map(|members| members.len())
            .unwrap_or(0)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

impl Publisher for FanOut {
    fn publish(&self, channel: &str, notification: Notification) -> Result<PublishReport, PublishError> {
        let members: Vec<ConnectionId> = match self.channels.get(channel) {
            Some(members) => members.iter().copied().collect(),
            None => return Ok(PublishReport::default()),
        };

        let mut report = PublishReport::default();
        let mut closed = Vec::new();

        for connection in members {
            let Some(tx) = self.connections.get(&connection).map(|entry| entry.value().clone())
            else {
                continue;
            };
            match tx.try_send(notification.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    report.dropped += 1;
                    warn!(connection_id = %connection, channel, "subscriber queue full; notification dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    report.dropped += 1;
                    closed.push(connection);
                }
            }
        }

        for connection in closed {
            self.disconnect(connection);
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{
        delivery_channel, order_channel, Channel, FanOut, Notification, Publisher, GLOBAL_CHANNEL,
    };
    use crate::models::actor::Actor;
    use crate::models::event::{DomainEvent, EventKind};
    use crate::models::order::{Order, Prescription};

    fn notification(channel: &str) -> Notification {
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
        let event = DomainEvent::new(
            EventKind::OrderAccepted,
            &Actor::payment_provider("test"),
            &order,
            "accepted",
        );
        Notification::from_event(channel, &event)
    }

    #[tokio::test]
    async fn only_members_of_the_channel_receive() {
        let fanout = FanOut::new(8);
        let channel = order_channel(Uuid::new_v4());
        let (member, mut member_rx) = fanout.connect();
        let (_outsider, mut outsider_rx) = fanout.connect();
        fanout.join(member, &channel).unwrap();

        let report = fanout.publish(&channel, notification(&channel)).unwrap();

        assert_eq!(report.delivered, 1);
        assert_eq!(member_rx.recv().await.unwrap().channel, channel);
        assert!(outsider_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn late_joiner_gets_no_replay() {
        let fanout = FanOut::new(8);
        let (conn, mut rx) = fanout.connect();

        fanout
            .publish(GLOBAL_CHANNEL, notification(GLOBAL_CHANNEL))
            .unwrap();
        fanout.join(conn, GLOBAL_CHANNEL).unwrap();

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let fanout = FanOut::new(1);
        let (conn, _rx) = fanout.connect();
        fanout.join(conn, GLOBAL_CHANNEL).unwrap();

        let first = fanout.publish(GLOBAL_CHANNEL, notification(GLOBAL_CHANNEL)).unwrap();
        let second = fanout.publish(GLOBAL_CHANNEL, notification(GLOBAL_CHANNEL)).unwrap();

        assert_eq!(first.delivered, 1);
        assert_eq!(second.dropped, 1);
    }

    #[tokio::test]
    async fn closed_receivers_are_pruned() {
        let fanout = FanOut::new(4);
        let (conn, rx) = fanout.connect();
        fanout.join(conn, GLOBAL_CHANNEL).unwrap();
        drop(rx);

        let report = fanout.publish(GLOBAL_CHANNEL, notification(GLOBAL_CHANNEL)).unwrap();

        assert_eq!(report.dropped, 1);
        assert_eq!(fanout.connection_count(), 0);
        assert_eq!(fanout.subscriber_count(GLOBAL_CHANNEL), 0);
    }

    #[test]
    fn leave_and_unknown_connection() {
        let fanout = FanOut::new(4);
        let (conn, _rx) = fanout.connect();
        fanout.join(conn, GLOBAL_CHANNEL).unwrap();
        fanout.leave(conn, GLOBAL_CHANNEL);
        assert_eq!(fanout.subscriber_count(GLOBAL_CHANNEL), 0);

        assert!(fanout.join(Uuid::new_v4(), GLOBAL_CHANNEL).is_err());
    }

    #[test]
    fn parses_known_channel_names() {
        let id = Uuid::new_v4();
        assert_eq!(Channel::parse(GLOBAL_CHANNEL), Some(Channel::Global));
        assert_eq!(Channel::parse(&order_channel(id)), Some(Channel::Order(id)));
        assert_eq!(Channel::parse(&delivery_channel(id)), Some(Channel::Delivery(id)));
        assert_eq!(Channel::parse("order-not-a-uuid"), None);
        assert_eq!(Channel::parse("lobby"), None);
    }
}
