use async_trait::async_trait;

use crate::registry::RoomId;
use crate::Id;

/// External collaborator boundary over durable conversation-participant
/// records.
///
/// Implemented by the persistence layer; the realtime core never touches a
/// database itself. Called once per connection, right after authentication,
/// to seed conversation-room memberships.
///
/// Implementations should return the conversations where the user is a
/// participant that has not left. Lookup problems should degrade to an
/// empty list (and log); a failed seed must not fail the connection.
#[async_trait]
pub trait ParticipantRoomSource: Send + Sync {
    async fn participant_rooms(&self, identity: &Id) -> Vec<RoomId>;
}

/// A source that seeds nothing. Used in tests and in deployments that rely
/// purely on explicit joins plus personal-room delivery.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoParticipantRooms;

#[async_trait]
impl ParticipantRoomSource for NoParticipantRooms {
    async fn participant_rooms(&self, _identity: &Id) -> Vec<RoomId> {
        Vec::new()
    }
}
