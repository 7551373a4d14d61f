//! Turn Synchronization Layer
//!
//! Shared-state coordination between connection handlers: FIFO
//! matchmaking into per-pair duel state, and the submit/advance engine
//! that resolves rounds. Locking is per-duel so unrelated matches never
//! contend; the registry's queue and mapping mutate under one lock so
//! pairing is atomic.

pub mod registry;
pub mod engine;

pub use registry::{Pairing, Removal, SessionRegistry, SharedDuel};
pub use engine::{Broadcasts, DiscardReason, SyncEngine};
