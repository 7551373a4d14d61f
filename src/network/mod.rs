//! Network Layer
//!
//! WebSocket server for real-time duel communication.
//! This layer is **non-deterministic** - all game logic runs through
//! `game/` and is coordinated by `sync/`.

pub mod auth;
pub mod protocol;
pub mod server;

pub use auth::{AuthConfig, TokenClaims, AuthError, validate_token};
