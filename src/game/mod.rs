//! Game Logic Module
//!
//! Deterministic duel core. No I/O, no clocks, no locks.
//!
//! ## Module Structure
//!
//! - `movement`: command decoding, validation, path integration
//! - `duel`: per-pair turn state machine

pub mod movement;
pub mod duel;

// Re-export key types
pub use movement::{Direction, MovementCommand, MoveRules, Position, DecodeError};
pub use duel::{DuelId, DuelPhase, DuelState, DuelError, ParticipantId};
