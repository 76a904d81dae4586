//! Shared-canvas synchronization server.
//!
//! Clients connect over a websocket, receive the room's stroke log as a
//! snapshot, and from then on see every draw and clear in the order the
//! room applied it, plus live presence counts.

pub mod config;
pub mod frame;
pub mod routes;
pub mod services;
pub mod state;
