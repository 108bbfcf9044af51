//! Event system infrastructure for the chat platform.
//!
//! This crate provides the event system that enables loose coupling between
//! the message/conversation CRUD layer and infrastructure concerns (like
//! realtime socket push).
//!
//! # Architecture
//!
//! - **DomainEvent**: Enum representing all business events in the system
//! - **EventHandler**: Trait for implementing event handlers
//! - **EventPublisher**: Publishes events to registered handlers
//!
//! This crate has no dependencies on internal crates, avoiding circular
//! dependencies. Entity data (e.g. the full message record) is carried as
//! serialized JSON values.
//!
//! Events are published *after* the corresponding mutation has been durably
//! persisted. A handler that fails to deliver a push never fails the
//! mutation that produced the event.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// A type alias for entity identifiers (user ids, conversation ids).
/// Identifiers are opaque strings on this platform.
pub type Id = String;

/// Domain events that represent business-level changes in the system.
/// These events are emitted when domain operations complete successfully.
///
/// Events include the ids needed for notification routing. The CRUD layer
/// is responsible for determining the affected conversation and its
/// participants and includes them in the event.
#[derive(Debug, Clone)]
pub enum DomainEvent {
    /// Emitted after a new message has been durably persisted.
    /// Triggers a realtime push to the conversation room and to each
    /// participant's personal room.
    MessageCreated {
        /// Conversation the message belongs to (also the room id).
        conversation_id: Id,
        /// Complete serialized message entity (includes id, body, sender,
        /// read state, etc.). Sent to clients as the push payload so the
        /// frontend can render without a follow-up fetch.
        message: Value,
        /// Ids of all conversation participants that have not left.
        /// The realtime layer routes to these users' personal rooms.
        participant_ids: Vec<Id>,
        /// The message author. The author's personal room is not targeted;
        /// their own clients see the message from the mutation response.
        sender_id: Option<Id>,
    },
    /// Emitted when a user is added to a conversation.
    ParticipantJoined {
        /// Conversation the user joined.
        conversation_id: Id,
        /// The user that joined.
        user_id: Id,
    },
    /// Emitted when a user leaves (or is removed from) a conversation.
    ParticipantLeft {
        /// Conversation the user left.
        conversation_id: Id,
        /// The user that left.
        user_id: Id,
    },
}

/// Trait for handling domain events.
/// Implementations can perform side effects like sending realtime
/// notifications, updating caches, logging, etc.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &DomainEvent);
}

/// Publishes domain events to registered handlers.
/// Handlers are called sequentially in registration order.
#[derive(Clone)]
pub struct EventPublisher {
    handlers: Arc<Vec<Arc<dyn EventHandler>>>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Vec::new()),
        }
    }

    /// Register a new event handler.
    /// Note: This creates a new publisher instance with the additional handler.
    /// Store the returned publisher in your application state.
    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        let mut handlers = (*self.handlers).clone();
        handlers.push(handler);
        self.handlers = Arc::new(handlers);
        self
    }

    /// Publish an event to all registered handlers.
    /// Handlers are called sequentially; a handler's side-effect failures
    /// are its own concern and never abort the remaining handlers.
    pub async fn publish(&self, event: DomainEvent) {
        for handler in self.handlers.iter() {
            handler.handle(&event).await;
        }
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EventHandler for CountingHandler {
        async fn handle(&self, _event: &DomainEvent) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn publish_reaches_every_registered_handler() {
        let first = Arc::new(CountingHandler {
            calls: AtomicUsize::new(0),
        });
        let second = Arc::new(CountingHandler {
            calls: AtomicUsize::new(0),
        });

        let publisher = EventPublisher::new()
            .with_handler(first.clone())
            .with_handler(second.clone());

        publisher
            .publish(DomainEvent::ParticipantJoined {
                conversation_id: "conv1".to_string(),
                user_id: "u1".to_string(),
            })
            .await;

        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn publish_with_no_handlers_is_a_no_op() {
        let publisher = EventPublisher::new();
        publisher
            .publish(DomainEvent::ParticipantLeft {
                conversation_id: "conv1".to_string(),
                user_id: "u1".to_string(),
            })
            .await;
    }
}
