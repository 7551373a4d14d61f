//! # Trace Duel Game Server
//!
//! Authoritative turn-synchronization server for Trace Duel, a two-player
//! positional game over persistent WebSocket connections.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   TRACE DUEL SERVER                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  game/           - Deterministic duel core                   │
//! │  ├── movement.rs - Command decode/validate, path integration │
//! │  └── duel.rs     - Per-pair turn state machine               │
//! │                                                              │
//! │  sync/           - Turn synchronization                      │
//! │  ├── registry.rs - FIFO matchmaking, participant→duel map    │
//! │  └── engine.rs   - submit/advance round resolution           │
//! │                                                              │
//! │  network/        - Networking (non-deterministic)            │
//! │  ├── server.rs   - WebSocket server                          │
//! │  ├── protocol.rs - Message types                             │
//! │  └── auth.rs     - JWT validation, participant identity      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Turn Guarantee
//!
//! The `game/` and `sync/` modules enforce strict alternation:
//! - Only the recorded mover's buffered submission is ever applied
//! - One shared round counter per pair, +1 per applied move
//! - Command lists validate as a whole; no partial application
//! - Resolved paths are delivered only to the opponent
//!
//! Movement integration is pure: identical submissions from an identical
//! position produce identical paths on any platform.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod game;
pub mod sync;
pub mod network;

// Re-export commonly used types
pub use game::movement::{Direction, MovementCommand, MoveRules, Position};
pub use game::duel::{DuelId, DuelPhase, DuelState, ParticipantId};
pub use sync::engine::{Broadcasts, SyncEngine};
pub use sync::registry::SessionRegistry;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
