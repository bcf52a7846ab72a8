//! Creation events and the in-process bus that fans them out.
//!
//! Delivery is at-least-once from the consumer's point of view and carries
//! no ordering guarantee relative to query responses; the client cache is
//! built to absorb both.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use crate::types::{Conversation, Message};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    RecordCreated,
}

/// The record a creation event announces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "camelCase")]
pub enum CreatedRecord {
    Conversation(Conversation),
    Message(Message),
}

impl CreatedRecord {
    pub fn id(&self) -> &str {
        match self {
            CreatedRecord::Conversation(c) => &c.id,
            CreatedRecord::Message(m) => &m.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationEvent {
    pub event_type: EventType,
    pub record: CreatedRecord,
    /// Owning record, e.g. the conversation of a message. `None` for
    /// top-level records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_key: Option<String>,
}

impl CreationEvent {
    pub fn conversation_created(conversation: Conversation) -> Self {
        Self {
            event_type: EventType::RecordCreated,
            record: CreatedRecord::Conversation(conversation),
            parent_key: None,
        }
    }

    pub fn message_created(message: Message) -> Self {
        let parent_key = Some(message.conversation_id.clone());
        Self {
            event_type: EventType::RecordCreated,
            record: CreatedRecord::Message(message),
            parent_key,
        }
    }
}

/// An event together with the users entitled to see it.
#[derive(Debug, Clone)]
pub struct Published {
    pub audience: Vec<String>,
    pub event: CreationEvent,
}

impl Published {
    pub fn is_visible_to(&self, user_id: &str) -> bool {
        self.audience.iter().any(|member| member == user_id)
    }
}

/// Broadcast fan-out of creation events to every live subscriber.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Published>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Returns how many subscribers received the event. Zero subscribers is
    /// not an error: nobody is watching.
    pub fn publish(&self, audience: Vec<String>, event: CreationEvent) -> usize {
        let id = event.record.id().to_string();
        let delivered = self.tx.send(Published { audience, event }).unwrap_or(0);
        trace!(record_id = %id, delivered, "published creation event");
        delivered
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Published> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SortKey;
    use chrono::Utc;

    fn message() -> Message {
        Message {
            id: "m1".to_string(),
            sort_key: SortKey(3),
            conversation_id: "c1".to_string(),
            sender_id: "u1".to_string(),
            content: "hey".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn message_events_carry_their_parent() {
        let event = CreationEvent::message_created(message());
        assert_eq!(event.parent_key.as_deref(), Some("c1"));

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["eventType"], "RecordCreated");
        assert_eq!(json["record"]["kind"], "message");
        assert_eq!(json["parentKey"], "c1");
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_silent() {
        let bus = EventBus::new(4);
        assert_eq!(bus.publish(vec![], CreationEvent::message_created(message())), 0);

        let mut rx = bus.subscribe();
        assert_eq!(
            bus.publish(vec!["u1".into()], CreationEvent::message_created(message())),
            1
        );
        let got = rx.recv().await.unwrap();
        assert!(got.is_visible_to("u1"));
        assert!(!got.is_visible_to("u2"));
    }
}
