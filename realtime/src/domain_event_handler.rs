use crate::manager::{FanoutEvent, Manager};
use crate::message::Event;
use async_trait::async_trait;
use chrono::Utc;
use events::{DomainEvent, EventHandler};
use log::*;
use std::sync::Arc;

/// Handles domain events by converting them to socket pushes.
///
/// This handler is the post-commit hook between the CRUD layer and the
/// fan-out core: the CRUD layer persists a mutation, publishes a
/// `DomainEvent`, and this handler translates it into one dispatch. A
/// failed push never propagates back to the mutation.
pub struct RealtimeDomainEventHandler {
    manager: Arc<Manager>,
}

impl RealtimeDomainEventHandler {
    pub fn new(manager: Arc<Manager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl EventHandler for RealtimeDomainEventHandler {
    async fn handle(&self, event: &DomainEvent) {
        match event {
            DomainEvent::MessageCreated {
                conversation_id,
                message,
                participant_ids,
                sender_id,
            } => {
                debug!("Handling MessageCreated event for conversation {conversation_id}");

                // The sender's personal room is skipped; their own clients
                // already have the message from the mutation response.
                // (They may still hear it through the conversation room,
                // exactly like the previous HTTP emit path.)
                let recipients: Vec<events::Id> = participant_ids
                    .iter()
                    .filter(|id| Some(*id) != sender_id.as_ref())
                    .cloned()
                    .collect();

                let report = self.manager.notify_message_created(
                    message.clone(),
                    conversation_id,
                    &recipients,
                    None,
                );

                debug!(
                    "Pushed new message in {conversation_id} to {}/{} connection(s)",
                    report.delivered, report.attempted
                );
            }

            DomainEvent::ParticipantJoined {
                conversation_id,
                user_id,
            } => {
                debug!("Handling ParticipantJoined event for conversation {conversation_id}");

                self.manager.dispatch(FanoutEvent::to_rooms(
                    Event::UserJoined {
                        conversation_id: conversation_id.clone(),
                        user_id: Some(user_id.clone()),
                        timestamp: Utc::now().to_rfc3339(),
                    },
                    [conversation_id.clone()],
                ));
            }

            DomainEvent::ParticipantLeft {
                conversation_id,
                user_id,
            } => {
                debug!("Handling ParticipantLeft event for conversation {conversation_id}");

                self.manager.dispatch(FanoutEvent::to_rooms(
                    Event::UserLeft {
                        conversation_id: conversation_id.clone(),
                        user_id: Some(user_id.clone()),
                    },
                    [conversation_id.clone()],
                ));
            }
        }
    }
}
