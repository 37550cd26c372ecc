//! # WebSocket Gateway (C13)
//!
//! A single `/ws/events` route carrying a JSON-frame RPC/event protocol
//! (spec §4.12): a client connects, receives a nonce challenge, presents a
//! JWT (or password) signed over that nonce, and from then on sends scoped
//! `req` frames dispatched through the [`crate::command_bus`] and receives
//! `res`/`error`/`event` frames back, including fan-out from the
//! [`crate::event_bus`].

mod auth;
mod connection;
pub mod protocol;
mod server;

pub use auth::{AuthClaims, GatewayAuth, NONCE_TTL_SECS};
pub use connection::{ConnectionInfo, ConnectionManager};
pub use server::{GatewayServer, SharedGateway, StatusProvider};
