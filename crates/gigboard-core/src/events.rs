//! Real-time channel wire events and the in-process store event bus.
//!
//! Two layers live here:
//!
//! - **Channel frames**: the JSON text frames exchanged with the server over
//!   the notification WebSocket. Every frame is a [`ChannelFrame`]; events
//!   carry an `event` name, ack-style requests add an `ackId`, and ack
//!   replies carry only `ackId` + `data`.
//! - **Store events**: what the notification store broadcasts to local
//!   consumers (terminal front end, tests) after each state change, wrapped
//!   in an [`EventEnvelope`] and distributed by [`EventBus`].
//!
//! ## Wire Format
//!
//! ```text
//! {"event":"notification:new","data":{...}}
//! {"event":"notification:getUnreadCount","data":null,"ackId":7}
//! {"ackId":7,"data":{"count":3}}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Notification, NotificationType, UnreadCount};

// ============================================================================
// Channel event names
// ============================================================================

/// Server → client: a new notification (payload: full notification).
pub const EVENT_NOTIFICATION_NEW: &str = "notification:new";

/// Server → client: authoritative unread count (payload: `{count}`).
pub const EVENT_UNREAD_COUNT: &str = "notification:unreadCount";

/// Client → server, ack-style: request the unread count.
pub const EVENT_GET_UNREAD_COUNT: &str = "notification:getUnreadCount";

/// Client → server: mark one notification read.
pub const EVENT_MARK_READ: &str = "notification:markRead";

/// Client → server: mark every notification read.
pub const EVENT_MARK_ALL_READ: &str = "notification:markAllRead";

// ============================================================================
// Channel frames
// ============================================================================

/// One JSON text frame on the real-time channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default)]
    pub data: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack_id: Option<u64>,
}

impl ChannelFrame {
    /// Named event without acknowledgement.
    pub fn event(name: &str, data: JsonValue) -> Self {
        Self {
            event: Some(name.to_string()),
            data,
            ack_id: None,
        }
    }

    /// Reply to an ack-style request.
    pub fn ack(ack_id: u64, data: JsonValue) -> Self {
        Self {
            event: None,
            data,
            ack_id: Some(ack_id),
        }
    }

    /// True for frames that answer an earlier ack-style request.
    pub fn is_ack_reply(&self) -> bool {
        self.event.is_none() && self.ack_id.is_some()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Events the client consumes from the channel.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    NotificationNew(Box<Notification>),
    UnreadCount(u64),
}

impl InboundEvent {
    /// Decode a server event frame. Unknown event names yield `Ok(None)`.
    pub fn from_frame(frame: &ChannelFrame) -> Result<Option<Self>> {
        let Some(name) = frame.event.as_deref() else {
            return Ok(None);
        };
        match name {
            EVENT_NOTIFICATION_NEW => {
                let notification: Notification = serde_json::from_value(frame.data.clone())?;
                Ok(Some(Self::NotificationNew(Box::new(notification))))
            }
            EVENT_UNREAD_COUNT => {
                let payload: UnreadCount = serde_json::from_value(frame.data.clone())?;
                Ok(Some(Self::UnreadCount(payload.count)))
            }
            _ => Ok(None),
        }
    }
}

/// Mutations and queries the client emits over the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelCommand {
    GetUnreadCount,
    MarkRead { notification_id: String },
    MarkAllRead,
}

impl ChannelCommand {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::GetUnreadCount => EVENT_GET_UNREAD_COUNT,
            Self::MarkRead { .. } => EVENT_MARK_READ,
            Self::MarkAllRead => EVENT_MARK_ALL_READ,
        }
    }

    /// Frame for this command, with `ack_id` attached when a reply is wanted.
    pub fn to_frame(&self, ack_id: Option<u64>) -> ChannelFrame {
        let data = match self {
            Self::MarkRead { notification_id } => {
                serde_json::json!({ "notificationId": notification_id })
            }
            Self::GetUnreadCount | Self::MarkAllRead => JsonValue::Null,
        };
        ChannelFrame {
            event: Some(self.event_name().to_string()),
            data,
            ack_id,
        }
    }
}

/// Decode the `{count}` payload of an unread-count ack reply.
pub fn parse_unread_ack(data: &JsonValue) -> Result<u64> {
    let payload: UnreadCount = serde_json::from_value(data.clone())
        .map_err(|e| Error::Channel(format!("malformed unread count ack: {}", e)))?;
    Ok(payload.count)
}

// ============================================================================
// Store events
// ============================================================================

/// Change notifications published by the notification store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum StoreEvent {
    /// A pushed notification was prepended to the list.
    NotificationReceived {
        notification_id: String,
        kind: NotificationType,
        title: String,
        chime: bool,
    },
    /// The list was replaced (initial fetch) or extended (load more).
    ListUpdated { len: usize, has_more: bool },
    /// One or more notifications were marked read.
    MarkedRead {
        #[serde(skip_serializing_if = "Option::is_none")]
        notification_id: Option<String>,
    },
    /// A notification was removed from view.
    Deleted { notification_id: String },
    /// The unread count changed.
    UnreadCountChanged { count: u64 },
    /// The live channel connected or disconnected.
    ConnectionChanged { connected: bool },
    /// All notification state was dropped (logout).
    Cleared,
    /// A backend call behind an action failed; state may have been rolled back.
    ActionFailed {
        action: String,
        error: String,
        rolled_back: bool,
    },
}

impl StoreEvent {
    /// Dot-namespaced name (e.g. `"notification.received"`).
    pub fn event_type(&self) -> &'static str {
        match self {
            StoreEvent::NotificationReceived { .. } => "notification.received",
            StoreEvent::ListUpdated { .. } => "notification.list_updated",
            StoreEvent::MarkedRead { .. } => "notification.marked_read",
            StoreEvent::Deleted { .. } => "notification.deleted",
            StoreEvent::UnreadCountChanged { .. } => "notification.unread_count",
            StoreEvent::ConnectionChanged { .. } => "channel.connection",
            StoreEvent::Cleared => "notification.cleared",
            StoreEvent::ActionFailed { .. } => "notification.action_failed",
        }
    }
}

/// Envelope around a [`StoreEvent`] with ordering metadata.
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    /// Unique event identifier (UUIDv7 for temporal ordering).
    pub event_id: Uuid,
    /// Namespaced event type.
    pub event_type: String,
    /// When the event occurred (UTC).
    pub occurred_at: DateTime<Utc>,
    pub payload: StoreEvent,
}

impl EventEnvelope {
    pub fn new(event: StoreEvent) -> Self {
        Self {
            event_id: crate::uuid_utils::new_v7(),
            event_type: event.event_type().to_string(),
            occurred_at: Utc::now(),
            payload: event,
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Broadcast-based event bus for distributing store events to local consumers.
///
/// Slow receivers that fall behind get a `Lagged` error and miss events;
/// consumers that need exact state read a store snapshot instead.
pub struct EventBus {
    tx: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit an event to all subscribers. Dropped silently without subscribers.
    pub fn emit(&self, event: StoreEvent) {
        let envelope = EventEnvelope::new(event);
        tracing::trace!(
            event_type = %envelope.event_type,
            event_id = %envelope.event_id,
            subscriber_count = self.tx.receiver_count(),
            "EventBus emit"
        );
        let _ = self.tx.send(envelope);
    }

    /// Subscribe to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::defaults::EVENT_BUS_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification_payload() -> JsonValue {
        serde_json::json!({
            "id": "n9",
            "recipient": "u1",
            "type": "payment_received",
            "title": "Payment received",
            "message": "$120 for milestone 2",
            "createdAt": "2026-10-01T12:00:00Z"
        })
    }

    #[test]
    fn test_frame_json_shapes() {
        let frame = ChannelCommand::GetUnreadCount.to_frame(Some(7));
        let json: JsonValue = serde_json::from_str(&frame.to_json().unwrap()).unwrap();
        assert_eq!(json["event"], "notification:getUnreadCount");
        assert_eq!(json["ackId"], 7);

        let ack = ChannelFrame::ack(7, serde_json::json!({"count": 3}));
        let json: JsonValue = serde_json::from_str(&ack.to_json().unwrap()).unwrap();
        assert!(json.get("event").is_none());
        assert!(ack.is_ack_reply());
    }

    #[test]
    fn test_mark_read_frame_carries_id() {
        let frame = ChannelCommand::MarkRead {
            notification_id: "n1".into(),
        }
        .to_frame(None);
        assert_eq!(frame.event.as_deref(), Some(EVENT_MARK_READ));
        assert_eq!(frame.data["notificationId"], "n1");
        assert!(frame.ack_id.is_none());
    }

    #[test]
    fn test_inbound_notification_new() {
        let frame = ChannelFrame::event(EVENT_NOTIFICATION_NEW, notification_payload());
        match InboundEvent::from_frame(&frame).unwrap() {
            Some(InboundEvent::NotificationNew(n)) => {
                assert_eq!(n.id, "n9");
                assert_eq!(n.kind, NotificationType::PaymentReceived);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_inbound_unread_count() {
        let text = r#"{"event":"notification:unreadCount","data":{"count":12}}"#;
        let frame = ChannelFrame::from_json(text).unwrap();
        assert_eq!(
            InboundEvent::from_frame(&frame).unwrap(),
            Some(InboundEvent::UnreadCount(12))
        );
    }

    #[test]
    fn test_inbound_unknown_event_is_ignored() {
        let frame = ChannelFrame::event("presence:update", JsonValue::Null);
        assert_eq!(InboundEvent::from_frame(&frame).unwrap(), None);
    }

    #[test]
    fn test_inbound_malformed_payload_errors() {
        let frame = ChannelFrame::event(EVENT_UNREAD_COUNT, serde_json::json!({"count": -1}));
        assert!(InboundEvent::from_frame(&frame).is_err());
    }

    #[test]
    fn test_parse_unread_ack() {
        assert_eq!(parse_unread_ack(&serde_json::json!({"count": 4})).unwrap(), 4);
        assert!(matches!(
            parse_unread_ack(&JsonValue::Null),
            Err(Error::Channel(_))
        ));
    }

    #[tokio::test]
    async fn test_event_bus_emit_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit(StoreEvent::UnreadCountChanged { count: 2 });

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.event_type, "notification.unread_count");
        assert_eq!(envelope.payload, StoreEvent::UnreadCountChanged { count: 2 });
    }

    #[tokio::test]
    async fn test_event_bus_no_subscribers_ok() {
        let bus = EventBus::new(16);
        bus.emit(StoreEvent::Cleared);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_event_bus_lagged_receiver() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();

        for count in 0..5 {
            bus.emit(StoreEvent::UnreadCountChanged { count });
        }

        match rx.recv().await {
            Err(broadcast::error::RecvError::Lagged(n)) => assert!(n > 0),
            other => panic!("expected lag, got {:?}", other),
        }
    }

    #[test]
    fn test_store_event_json_tag() {
        let json = serde_json::to_value(StoreEvent::ConnectionChanged { connected: true }).unwrap();
        assert_eq!(json["type"], "ConnectionChanged");
        assert_eq!(json["connected"], true);
    }
}
