use config::Config;
use events::EventPublisher;
use realtime::participant_source::{NoParticipantRooms, ParticipantRoomSource};
use realtime::Manager;
use std::sync::Arc;

pub mod config;
pub mod logging;

// Service-level state containing only infrastructure concerns
// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub realtime_manager: Arc<Manager>,
    pub participant_source: Arc<dyn ParticipantRoomSource>,
    pub event_publisher: EventPublisher,
}

impl AppState {
    pub fn new(app_config: Config, realtime_manager: &Arc<Manager>) -> Self {
        Self {
            config: app_config,
            realtime_manager: Arc::clone(realtime_manager),
            // Deployments with a persistence layer install their own source
            // via `set_participant_source`.
            participant_source: Arc::new(NoParticipantRooms),
            event_publisher: EventPublisher::new(),
        }
    }

    /// Install the durable-storage-backed participant lookup used to seed
    /// conversation rooms at connect time.
    pub fn set_participant_source(&mut self, source: Arc<dyn ParticipantRoomSource>) {
        self.participant_source = source;
    }

    pub fn set_event_publisher(&mut self, publisher: EventPublisher) {
        self.event_publisher = publisher;
    }
}
