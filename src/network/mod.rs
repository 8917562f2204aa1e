//! Network Layer
//!
//! WebSocket front end. All round state lives behind the engine actor;
//! this layer only translates frames to requests and events to frames.

pub mod protocol;
pub mod server;

pub use protocol::{ClientMessage, ServerMessage, ServerError, PlaceBet};
pub use server::{GameServer, ServerConfig, GameServerError};
