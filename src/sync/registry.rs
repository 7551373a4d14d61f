//! Session Registry
//!
//! Matchmaking and lookup: waiting participants are paired strictly FIFO
//! into shared duel state, and both halves of a pair map to the same
//! instance. The queue and the participant map mutate only under one
//! exclusive section so pairing rewrites both mappings atomically.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::game::duel::{DuelId, DuelState, ParticipantId};
use crate::game::movement::MoveRules;

/// A duel shared by both participants and the sync engine.
///
/// Per-duel locking: unrelated duels never contend with each other.
pub type SharedDuel = Arc<Mutex<DuelState>>;

/// Result of pairing two waiting participants.
#[derive(Clone)]
pub struct Pairing {
    /// The freshly created duel.
    pub duel: SharedDuel,
    /// Duel identifier.
    pub duel_id: DuelId,
    /// Longest-waiting participant; takes the opening move.
    pub first: ParticipantId,
    /// Second participant; waits for the opening move.
    pub second: ParticipantId,
}

/// Outcome of removing a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// The participant was neither queued nor paired.
    NotFound,
    /// The participant was only waiting and has been evicted from the queue.
    Unqueued,
    /// The participant's duel was torn down; the opponent's connection
    /// should now be closed by the transport.
    Ended {
        /// The paired opponent whose mapping was removed alongside.
        opponent: ParticipantId,
    },
}

struct RegistryInner {
    /// Participants awaiting an opponent, oldest first.
    waiting: VecDeque<ParticipantId>,
    /// Both participants of a pair map to the same duel.
    duels: BTreeMap<ParticipantId, SharedDuel>,
}

/// Matchmaking registry: FIFO pairing plus participant→duel lookup.
///
/// Explicitly owned and injectable (no process-global state) so tests can
/// construct isolated instances.
pub struct SessionRegistry {
    rules: MoveRules,
    inner: Mutex<RegistryInner>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new(rules: MoveRules) -> Self {
        Self {
            rules,
            inner: Mutex::new(RegistryInner {
                waiting: VecDeque::new(),
                duels: BTreeMap::new(),
            }),
        }
    }

    /// Movement rules duels are created with.
    pub fn rules(&self) -> &MoveRules {
        &self.rules
    }

    /// Add a participant to the waiting queue and pair if possible.
    ///
    /// Idempotent: re-enqueuing an already-queued or already-paired
    /// participant is a no-op. When two participants are waiting, the two
    /// longest-waiting are paired and both identities map to the new duel.
    pub async fn enqueue(&self, participant: ParticipantId) -> Option<Pairing> {
        let mut inner = self.inner.lock().await;

        if inner.duels.contains_key(&participant) {
            debug!(%participant, "enqueue ignored: already in a duel");
            return None;
        }
        if inner.waiting.contains(&participant) {
            debug!(%participant, "enqueue ignored: already waiting");
            return None;
        }

        inner.waiting.push_back(participant);
        if inner.waiting.len() < 2 {
            debug!(%participant, "waiting for an opponent");
            return None;
        }

        // Strict FIFO: the two longest-waiting participants pair up.
        let first = inner.waiting.pop_front().expect("queue holds two entries");
        let second = inner.waiting.pop_front().expect("queue holds two entries");

        let duel_id = DuelId::new_v4();
        let duel: SharedDuel = Arc::new(Mutex::new(DuelState::new(
            duel_id, first, second, &self.rules,
        )));
        inner.duels.insert(first, duel.clone());
        inner.duels.insert(second, duel.clone());

        info!(%duel_id, %first, %second, "duel created");

        Some(Pairing { duel, duel_id, first, second })
    }

    /// Look up the duel a participant belongs to.
    ///
    /// `None` means the participant is unpaired or unknown.
    pub async fn lookup(&self, participant: ParticipantId) -> Option<SharedDuel> {
        let inner = self.inner.lock().await;
        inner.duels.get(&participant).cloned()
    }

    /// Remove a participant.
    ///
    /// A queued-only participant is evicted from the queue. A paired
    /// participant tears down the whole duel: the duel is marked ended
    /// under its own lock, both mappings are removed, and the opponent is
    /// reported so the caller can close the other connection.
    pub async fn remove(&self, participant: ParticipantId) -> Removal {
        let mut inner = self.inner.lock().await;

        if let Some(duel) = inner.duels.remove(&participant) {
            // Lock order is always registry -> duel, so an in-flight apply
            // for this duel finishes before the teardown is observable.
            let opponent = {
                let mut state = duel.lock().await;
                state.end();
                state.opponent_of(participant)
            };

            let opponent = match opponent {
                Some(op) => op,
                // A duel always has two sides; defend against a stale
                // mapping anyway.
                None => return Removal::NotFound,
            };

            inner.duels.remove(&opponent);
            info!(%participant, %opponent, "duel torn down");
            return Removal::Ended { opponent };
        }

        let before = inner.waiting.len();
        inner.waiting.retain(|&p| p != participant);
        if inner.waiting.len() < before {
            debug!(%participant, "evicted from waiting queue");
            Removal::Unqueued
        } else {
            Removal::NotFound
        }
    }

    /// Snapshot of all live duels, one entry per pair.
    pub async fn active_duels(&self) -> Vec<SharedDuel> {
        let inner = self.inner.lock().await;
        let mut seen: Vec<*const Mutex<DuelState>> = Vec::new();
        let mut duels = Vec::new();
        for duel in inner.duels.values() {
            let ptr = Arc::as_ptr(duel);
            if !seen.contains(&ptr) {
                seen.push(ptr);
                duels.push(duel.clone());
            }
        }
        duels
    }

    /// Number of participants awaiting pairing.
    pub async fn waiting_count(&self) -> usize {
        self.inner.lock().await.waiting.len()
    }

    /// Number of live duels.
    pub async fn duel_count(&self) -> usize {
        self.active_duels().await.len()
    }
}

// =============================================================================
// TESTS
// =============================================================================
