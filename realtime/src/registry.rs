use axum::extract::ws::Message as WsMessage;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashSet;
use tokio::sync::mpsc::UnboundedSender;

use crate::Id;

/// A room identifier. Rooms are distinguished only by naming convention:
/// a *personal room* is named after an identity, a *conversation room*
/// after a conversation id.
pub type RoomId = String;

/// Unique identifier for a connection (server-generated)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-connection state held by the registry.
///
/// The identity is set exactly once, at registration, and never changes for
/// the connection's lifetime. `sender` is the connection's outbound queue;
/// the transport task drains it in FIFO order, so per-connection delivery
/// order matches dispatch order.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub identity: Option<Id>,
    pub authenticated: bool,
    pub connected_at: DateTime<Utc>,
    pub sender: UnboundedSender<WsMessage>,
}

/// In-memory bidirectional room/connection membership index.
///
/// Three indices, all O(1) per operation:
/// - `connections`: primary storage, lookup by connection id
/// - `rooms`: room id -> member connection ids, for fan-out resolution
/// - `memberships`: connection id -> joined room ids, for cleanup on
///   disconnect
///
/// A room has no independent lifecycle: it exists while at least one
/// connection is joined and its entry is removed when the last member
/// leaves. State is process-local and rebuilt from zero on restart.
///
/// All membership mutation goes through [`join`](Self::join),
/// [`leave`](Self::leave) and [`drop_connection`](Self::drop_connection);
/// no other code path touches these maps.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, ConnectionInfo>,
    rooms: DashMap<RoomId, HashSet<ConnectionId>>,
    memberships: DashMap<ConnectionId, HashSet<RoomId>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            rooms: DashMap::new(),
            memberships: DashMap::new(),
        }
    }

    /// Register a new connection - O(1)
    pub fn register(&self, info: ConnectionInfo) -> ConnectionId {
        let connection_id = ConnectionId::new();
        self.connections.insert(connection_id.clone(), info);
        connection_id
    }

    /// Join a connection to a room. Idempotent: joining an already-joined
    /// room is a no-op. Joining on behalf of an unknown (already dropped)
    /// connection is also a no-op, so a disconnect racing a join cannot
    /// leave a dangling membership.
    pub fn join(&self, connection_id: &ConnectionId, room_id: &RoomId) {
        if !self.connections.contains_key(connection_id) {
            return;
        }

        self.rooms
            .entry(room_id.clone())
            .or_default()
            .insert(connection_id.clone());
        self.memberships
            .entry(connection_id.clone())
            .or_default()
            .insert(room_id.clone());

        // A disconnect may have run between the liveness check and the
        // inserts above. Connection ids are never reused, so undoing the
        // join here cannot clobber anyone else's membership.
        if !self.connections.contains_key(connection_id) {
            self.leave(connection_id, room_id);
        }
    }

    /// Remove a connection from a room. Idempotent: leaving a room the
    /// connection is not in is a no-op, not an error.
    pub fn leave(&self, connection_id: &ConnectionId, room_id: &RoomId) {
        if let Some(mut members) = self.rooms.get_mut(room_id) {
            members.remove(connection_id);
        }
        // Empty rooms cease to exist. Emptiness is re-checked under the
        // entry lock so a join landing after the get_mut above cannot be
        // swept away with the room.
        self.rooms.remove_if(room_id, |_, members| members.is_empty());

        if let Some(mut joined) = self.memberships.get_mut(connection_id) {
            joined.remove(room_id);
        }
        self.memberships
            .remove_if(connection_id, |_, joined| joined.is_empty());
    }

    /// Remove a connection entirely: primary entry, every room membership
    /// and the reverse index. Called exactly once, at disconnect.
    pub fn drop_connection(&self, connection_id: &ConnectionId) {
        self.connections.remove(connection_id);

        let joined = self
            .memberships
            .remove(connection_id)
            .map(|(_, rooms)| rooms)
            .unwrap_or_default();

        for room_id in joined {
            if let Some(mut members) = self.rooms.get_mut(&room_id) {
                members.remove(connection_id);
            }
            self.rooms.remove_if(&room_id, |_, members| members.is_empty());
        }
    }

    /// Snapshot of the connection ids currently joined to a room.
    /// May be empty; a room nobody joined is indistinguishable from one
    /// everybody left.
    pub fn members_of(&self, room_id: &RoomId) -> Vec<ConnectionId> {
        self.rooms
            .get(room_id)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of the rooms a connection is currently joined to.
    pub fn rooms_of(&self, connection_id: &ConnectionId) -> Vec<RoomId> {
        self.memberships
            .get(connection_id)
            .map(|joined| joined.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The outbound queue for a connection, if it is still registered.
    /// Used by the dispatcher to re-check liveness immediately before each
    /// individual send.
    pub fn sender_for(&self, connection_id: &ConnectionId) -> Option<UnboundedSender<WsMessage>> {
        self.connections
            .get(connection_id)
            .map(|info| info.sender.clone())
    }

    /// The identity a connection registered with, if any.
    pub fn identity_of(&self, connection_id: &ConnectionId) -> Option<Id> {
        self.connections
            .get(connection_id)
            .and_then(|info| info.identity.clone())
    }

    /// Number of live connections (diagnostics).
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
