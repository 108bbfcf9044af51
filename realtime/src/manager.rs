use crate::message::{Event, EventType};
use crate::participant_source::ParticipantRoomSource;
use crate::registry::{ConnectionId, ConnectionInfo, ConnectionRegistry, RoomId};
use crate::Id;
use axum::extract::ws::Message as WsMessage;
use chrono::Utc;
use log::*;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

/// One fan-out push: an event, the set of rooms it targets and an optional
/// connection to exclude (the common case: don't echo a message back to its
/// sender's own socket).
///
/// Target rooms are a set; duplicates collapse and order is irrelevant.
#[derive(Debug, Clone)]
pub struct FanoutEvent {
    pub event: Event,
    pub target_rooms: HashSet<RoomId>,
    pub exclude: Option<ConnectionId>,
}

impl FanoutEvent {
    pub fn to_rooms<I, S>(event: Event, rooms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<RoomId>,
    {
        Self {
            event,
            target_rooms: rooms.into_iter().map(Into::into).collect(),
            exclude: None,
        }
    }

    pub fn excluding(mut self, connection_id: ConnectionId) -> Self {
        self.exclude = Some(connection_id);
        self
    }
}

/// Outcome of one dispatch call. Individual send failures are collected
/// here and logged; they are never surfaced to the event producer.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Recipients resolved from the registry snapshot (after exclusion).
    pub attempted: usize,
    /// Sends accepted by a live connection's outbound queue.
    pub delivered: usize,
    /// Connections whose send failed (queue closed or connection gone
    /// between resolution and send).
    pub failed: Vec<ConnectionId>,
}

/// High-level realtime fan-out manager.
///
/// Owns the [`ConnectionRegistry`] explicitly (no ambient global state), so
/// tests can run any number of isolated managers. Delivery is fire-and-
/// forget: no acknowledgement, retry or replay. A connection that joins a
/// room after a dispatch does not retroactively receive it.
pub struct Manager {
    registry: Arc<ConnectionRegistry>,
}

impl Manager {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(ConnectionRegistry::new()),
        }
    }

    /// Register a new connection and return its unique id.
    ///
    /// A connection with a non-anonymous identity is immediately joined to
    /// its personal room (room id == identity), before any explicit join
    /// can occur.
    pub fn register_connection(
        &self,
        identity: Option<Id>,
        sender: UnboundedSender<WsMessage>,
    ) -> ConnectionId {
        let authenticated = identity.is_some();
        let connection_id = self.registry.register(ConnectionInfo {
            identity: identity.clone(),
            authenticated,
            connected_at: Utc::now(),
            sender,
        });

        if let Some(identity) = identity {
            self.registry.join(&connection_id, &identity);
            info!("Registered socket connection for user {identity}");
        } else {
            info!("Registered anonymous socket connection");
        }

        connection_id
    }

    /// Unregister a connection by id. Called exactly once, at transport
    /// teardown; removes the connection from every room it belongs to.
    pub fn unregister_connection(&self, connection_id: &ConnectionId) {
        match self.registry.identity_of(connection_id) {
            Some(identity) => debug!(
                "Unregistering socket connection {} for user {identity}",
                connection_id.as_str()
            ),
            None => debug!("Unregistering socket connection {}", connection_id.as_str()),
        }
        self.registry.drop_connection(connection_id);
    }

    /// Explicit client-initiated room join. Idempotent.
    pub fn join_room(&self, connection_id: &ConnectionId, room_id: &RoomId) {
        self.registry.join(connection_id, room_id);
    }

    /// Explicit client-initiated room leave. Idempotent.
    pub fn leave_room(&self, connection_id: &ConnectionId, room_id: &RoomId) {
        self.registry.leave(connection_id, room_id);
    }

    /// Seed conversation-room memberships from durable participant records.
    ///
    /// Awaited once per connection, right after authentication. A lookup
    /// failure degrades to an empty seed: the connection stays up and still
    /// receives pushes through its personal room.
    pub async fn seed_participant_rooms(
        &self,
        connection_id: &ConnectionId,
        identity: &Id,
        source: &dyn ParticipantRoomSource,
    ) {
        let rooms = source.participant_rooms(identity).await;
        debug!(
            "Seeding {} conversation room(s) for user {identity}",
            rooms.len()
        );

        for room_id in rooms {
            self.registry.join(connection_id, &room_id);
        }
    }

    /// Send one event to a single connection, bypassing room resolution.
    /// Used for direct replies such as PONG. Returns false if the
    /// connection is gone or its queue is closed.
    pub fn send_to_connection(&self, connection_id: &ConnectionId, event: Event) -> bool {
        let Some(text) = serialize(&event) else {
            return false;
        };
        match self.registry.sender_for(connection_id) {
            Some(sender) => sender.send(WsMessage::Text(text)).is_ok(),
            None => false,
        }
    }

    /// Fan an event out to every connection joined to any of the target
    /// rooms.
    ///
    /// The recipient set is the union of the target rooms' member
    /// snapshots, deduplicated by connection: a connection in several
    /// target rooms receives exactly one copy. The excluded connection, if
    /// any, never receives the event.
    ///
    /// Liveness is re-checked immediately before each individual send; a
    /// connection dropped between resolution and send is counted as failed
    /// without aborting delivery to the others.
    pub fn dispatch(&self, fanout: FanoutEvent) -> DispatchReport {
        let Some(text) = serialize(&fanout.event) else {
            return DispatchReport::default();
        };

        let mut recipients: HashSet<ConnectionId> = HashSet::new();
        for room_id in &fanout.target_rooms {
            recipients.extend(self.registry.members_of(room_id));
        }
        if let Some(exclude) = &fanout.exclude {
            recipients.remove(exclude);
        }

        let mut report = DispatchReport {
            attempted: recipients.len(),
            ..DispatchReport::default()
        };

        for connection_id in recipients {
            let sent = self
                .registry
                .sender_for(&connection_id)
                .is_some_and(|sender| sender.send(WsMessage::Text(text.clone())).is_ok());

            if sent {
                report.delivered += 1;
            } else {
                warn!(
                    "Failed to deliver {} event to connection {}",
                    fanout.event.event_type(),
                    connection_id.as_str()
                );
                report.failed.push(connection_id);
            }
        }

        trace!(
            "Dispatched {} to {}/{} connection(s) across {} room(s)",
            fanout.event.event_type(),
            report.delivered,
            report.attempted,
            fanout.target_rooms.len()
        );

        report
    }

    /// Post-commit hook for message creation.
    ///
    /// Targets the conversation room *and* each participant's personal room
    /// in a single dispatch. The double targeting is deliberate redundancy:
    /// a participant connected but not currently joined to the conversation
    /// room is still reached through their personal room, and the dedup in
    /// [`dispatch`](Self::dispatch) keeps it to one copy per connection.
    pub fn notify_message_created(
        &self,
        message: Value,
        conversation_room_id: &RoomId,
        participant_identities: &[Id],
        exclude: Option<&ConnectionId>,
    ) -> DispatchReport {
        let mut target_rooms: HashSet<RoomId> = participant_identities.iter().cloned().collect();
        target_rooms.insert(conversation_room_id.clone());

        self.dispatch(FanoutEvent {
            event: Event::NewMessage(message),
            target_rooms,
            exclude: exclude.cloned(),
        })
    }

    /// The underlying registry handle, for transport-layer liveness checks
    /// and diagnostics.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

fn serialize(event: &Event) -> Option<String> {
    match serde_json::to_string(event) {
        Ok(json) => Some(json),
        Err(e) => {
            error!("Failed to serialize {} event: {e}", event.event_type());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn connect(manager: &Manager, identity: Option<&str>) -> (ConnectionId, UnboundedReceiver<WsMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = manager.register_connection(identity.map(str::to_string), tx);
        (id, rx)
    }

    fn recv_event(rx: &mut UnboundedReceiver<WsMessage>) -> Event {
        match rx.try_recv().unwrap() {
            WsMessage::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[test]
    fn authenticated_connection_auto_joins_personal_room() {
        let manager = Manager::new();
        let (conn, _rx) = connect(&manager, Some("u1"));

        assert_eq!(
            manager.registry().members_of(&"u1".to_string()),
            vec![conn]
        );
    }

    #[test]
    fn anonymous_connection_joins_no_rooms() {
        let manager = Manager::new();
        let (conn, _rx) = connect(&manager, None);

        assert!(manager.registry().rooms_of(&conn).is_empty());
    }

    #[test]
    fn overlapping_rooms_deliver_exactly_one_copy() {
        let manager = Manager::new();
        let (conn, mut rx) = connect(&manager, Some("u1"));
        manager.join_room(&conn, &"conv1".to_string());

        // u1 is in both target rooms: personal room "u1" and "conv1"
        let report = manager.dispatch(FanoutEvent::to_rooms(
            Event::NewMessage(json!({"id": "m1"})),
            ["u1", "conv1"],
        ));

        assert_eq!(report.attempted, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(recv_event(&mut rx), Event::NewMessage(json!({"id": "m1"})));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn excluded_connection_never_receives() {
        let manager = Manager::new();
        let (sender_conn, mut sender_rx) = connect(&manager, Some("u1"));
        let (other_conn, mut other_rx) = connect(&manager, Some("u2"));
        manager.join_room(&sender_conn, &"conv1".to_string());
        manager.join_room(&other_conn, &"conv1".to_string());

        let report = manager.dispatch(
            FanoutEvent::to_rooms(Event::NewMessage(json!({"id": "m1"})), ["conv1"])
                .excluding(sender_conn),
        );

        assert_eq!(report.delivered, 1);
        assert!(sender_rx.try_recv().is_err());
        assert_eq!(recv_event(&mut other_rx), Event::NewMessage(json!({"id": "m1"})));
    }

    #[test]
    fn dead_connection_does_not_abort_delivery_to_others() {
        let manager = Manager::new();
        let (dead_conn, dead_rx) = connect(&manager, Some("u1"));
        let (live_conn, mut live_rx) = connect(&manager, Some("u2"));
        manager.join_room(&dead_conn, &"conv1".to_string());
        manager.join_room(&live_conn, &"conv1".to_string());

        // Simulate a half-closed transport: receiver gone, registry entry
        // not yet cleaned up.
        drop(dead_rx);

        let report = manager.dispatch(FanoutEvent::to_rooms(
            Event::NewMessage(json!({"id": "m1"})),
            ["conv1"],
        ));

        assert_eq!(report.attempted, 2);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, vec![dead_conn]);
        assert_eq!(recv_event(&mut live_rx), Event::NewMessage(json!({"id": "m1"})));
    }

    #[test]
    fn dispatch_to_empty_rooms_reaches_nobody() {
        let manager = Manager::new();
        let report = manager.dispatch(FanoutEvent::to_rooms(
            Event::NewMessage(json!({})),
            ["nobody-here"],
        ));

        assert_eq!(report.attempted, 0);
        assert_eq!(report.delivered, 0);
        assert!(report.failed.is_empty());
    }

    #[test]
    fn notify_message_created_targets_conversation_and_personal_rooms() {
        let manager = Manager::new();
        // u2 is connected but NOT joined to conv1; reached via personal room
        let (_u2_conn, mut u2_rx) = connect(&manager, Some("u2"));

        let report = manager.notify_message_created(
            json!({"id": "m1", "content": "hi"}),
            &"conv1".to_string(),
            &["u1".to_string(), "u2".to_string()],
            None,
        );

        assert_eq!(report.delivered, 1);
        assert_eq!(
            recv_event(&mut u2_rx),
            Event::NewMessage(json!({"id": "m1", "content": "hi"}))
        );
    }

    #[test]
    fn multi_device_identity_receives_on_every_connection() {
        let manager = Manager::new();
        let (_phone, mut phone_rx) = connect(&manager, Some("u1"));
        let (_laptop, mut laptop_rx) = connect(&manager, Some("u1"));

        let report = manager.dispatch(FanoutEvent::to_rooms(
            Event::NewMessage(json!({"id": "m1"})),
            ["u1"],
        ));

        assert_eq!(report.delivered, 2);
        assert_eq!(recv_event(&mut phone_rx), Event::NewMessage(json!({"id": "m1"})));
        assert_eq!(recv_event(&mut laptop_rx), Event::NewMessage(json!({"id": "m1"})));
    }

    #[test]
    fn per_connection_order_matches_dispatch_order() {
        let manager = Manager::new();
        let (_conn, mut rx) = connect(&manager, Some("u1"));

        for n in 0..5 {
            manager.dispatch(FanoutEvent::to_rooms(
                Event::NewMessage(json!({"seq": n})),
                ["u1"],
            ));
        }

        for n in 0..5 {
            assert_eq!(recv_event(&mut rx), Event::NewMessage(json!({"seq": n})));
        }
    }
}
