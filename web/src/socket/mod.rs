//! WebSocket HTTP handler for the web layer.
//!
//! This module contains only the Axum upgrade handler and socket pump.
//! The core realtime infrastructure (Manager, ConnectionRegistry, wire
//! message types) lives in the `realtime` crate to avoid circular
//! dependencies.

pub mod handler;
