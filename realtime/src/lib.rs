//! Realtime message-delivery core for the chat platform.
//!
//! This crate is the socket-facing heart of the backend: it authenticates
//! realtime connections, maintains room membership and fans newly created
//! messages out to the right set of connected clients.
//!
//! # Architecture
//!
//! - **Authenticator** (`auth`): derives an identity from the handshake
//!   credential (auth field or `token` cookie). The token payload is
//!   decoded, not verified; see the module docs for the security caveat.
//! - **Registry** (`registry`): in-memory bidirectional room/connection
//!   membership index over `DashMap`, O(1) join/leave/cleanup.
//! - **Manager** (`manager`): the fan-out dispatcher. Resolves target rooms
//!   to a deduplicated connection set and pushes to each independently.
//! - **Rooms**: named broadcast groups distinguished only by convention.
//!   Every authenticated connection auto-joins its *personal room* (named
//!   after the identity); *conversation rooms* (named after conversation
//!   ids) are joined by connect-time seeding and explicit join frames.
//!
//! # Delivery semantics
//!
//! - Fire-and-forget: no ack, retry, buffering or replay. An offline client
//!   catches up through the pull-based fetch API, not through this crate.
//! - Recipients are resolved from one registry snapshot per dispatch and
//!   liveness is re-checked immediately before each individual send.
//! - Per-connection FIFO (unbounded mpsc queue per transport); no ordering
//!   guarantee across connections or across concurrent dispatchers.
//! - An event targeting several rooms that share a connection delivers to
//!   that connection exactly once.
//!
//! # Message flow
//!
//! 1. Client opens a WebSocket; the web layer captures the credential and
//!    calls [`auth::authenticate`]
//! 2. On success the connection is registered with the [`Manager`]
//!    (implicit personal-room join), then conversation rooms are seeded via
//!    [`participant_source::ParticipantRoomSource`]
//! 3. The CRUD layer persists a message and publishes
//!    `events::DomainEvent::MessageCreated`
//! 4. [`domain_event_handler::RealtimeDomainEventHandler`] translates it
//!    into one dispatch targeting the conversation room plus every
//!    participant's personal room
//! 5. Connected participants receive a `NEW_MESSAGE` frame

pub mod auth;
pub mod domain_event_handler;
pub mod manager;
pub mod message;
pub mod participant_source;
pub mod registry;

/// The authenticated user's unique identifier string.
pub type Id = String;

pub use manager::Manager;
