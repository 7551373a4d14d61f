//! Sync Engine
//!
//! Turn resolution for all live duels. `submit` buffers decoded movement
//! submissions; `advance` applies the current mover's buffered submission
//! per duel and collects the broadcast instructions for the transport.
//!
//! Resolving turns on an explicit `advance` pass, instead of immediately
//! on arrival, decouples message timing jitter from round progression: a
//! participant may send its move early and it is honored once the turn
//! comes around.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::game::duel::{DuelError, DuelPhase, ParticipantId};
use crate::game::movement::{self, Position};
use crate::sync::registry::SessionRegistry;

/// Why a submission was dropped without advancing the round.
///
/// None of these are faults: out-of-turn sends happen in normal races and
/// malformed payloads simply leave the sender's turn open. The legacy
/// server never pushed a "resend" prompt to the client either; the only
/// trace of a drop is this observability event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Submitter has no active duel.
    UnknownParticipant,
    /// Payload failed to decode (bad direction code, magnitude, framing).
    MalformedSubmission,
    /// Submission owner is not the current mover.
    OutOfTurn,
    /// The duel already ended.
    SessionOver,
}

impl std::fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DiscardReason::UnknownParticipant => "unknown_participant",
            DiscardReason::MalformedSubmission => "malformed_submission",
            DiscardReason::OutOfTurn => "out_of_turn",
            DiscardReason::SessionOver => "session_over",
        };
        f.write_str(s)
    }
}

/// Broadcast instructions from one `advance` pass: each recipient is the
/// participant who did NOT move, mapped to the mover's resolved path.
pub type Broadcasts = BTreeMap<ParticipantId, Vec<Position>>;

/// Orchestrates submission buffering and round resolution.
pub struct SyncEngine {
    registry: Arc<SessionRegistry>,
}

impl SyncEngine {
    /// Create an engine over a registry.
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// The registry this engine resolves duels from.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Buffer a raw movement submission for a participant.
    ///
    /// Resolution failures are silent no-ops: an unknown participant or a
    /// malformed payload leaves every duel untouched and is visible only
    /// as a [`DiscardReason`] trace event. A successfully decoded
    /// submission replaces any unconsumed earlier one from the same
    /// participant. Never blocks on network I/O.
    pub async fn submit(&self, participant: ParticipantId, raw: &[i64]) {
        let duel = match self.registry.lookup(participant).await {
            Some(duel) => duel,
            None => {
                discarded(participant, DiscardReason::UnknownParticipant);
                return;
            }
        };

        let commands = match movement::decode(raw, self.registry.rules()) {
            Ok(commands) => commands,
            Err(err) => {
                debug!(%participant, error = %err, "submission failed to decode");
                discarded(participant, DiscardReason::MalformedSubmission);
                return;
            }
        };

        let mut state = duel.lock().await;
        if let Err(err) = state.buffer_submission(participant, commands) {
            let reason = match err {
                DuelError::SessionOver => DiscardReason::SessionOver,
                _ => DiscardReason::UnknownParticipant,
            };
            discarded(participant, reason);
        }
    }

    /// Resolve one round per duel where the current mover has a buffered
    /// submission, and return the broadcast instructions.
    ///
    /// Duels without a pending mover submission are skipped untouched; a
    /// pending submission from the waiter stays buffered until its owner
    /// holds the move. Each entry maps the former waiter to the mover's
    /// integrated path; the caller delivers each path only to its named
    /// recipient.
    pub async fn advance(&self) -> Broadcasts {
        let mut broadcasts = Broadcasts::new();

        for duel in self.registry.active_duels().await {
            let mut state = duel.lock().await;
            if state.phase() == DuelPhase::Ended {
                continue;
            }

            let commands = match state.take_mover_pending() {
                Some(commands) => commands,
                None => continue,
            };

            let mover = state.mover();
            let waiter = state.waiter();
            match state.apply(mover, &commands) {
                Ok(path) => {
                    debug!(
                        duel_id = %state.id,
                        %mover,
                        round = state.round(),
                        steps = path.len(),
                        "round applied"
                    );
                    broadcasts.insert(waiter, path);
                }
                // Unreachable via take_mover_pending, but a concurrent
                // teardown between the take and the apply is defended the
                // same way: drop the pending entry, change nothing.
                Err(DuelError::SessionOver) => discarded(mover, DiscardReason::SessionOver),
                Err(_) => discarded(mover, DiscardReason::OutOfTurn),
            }
        }

        broadcasts
    }
}

/// Emit the observability event for a dropped submission.
fn discarded(participant: ParticipantId, reason: DiscardReason) {
    debug!(%participant, %reason, "submission discarded");
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::movement::MoveRules;
    use crate::sync::registry::Removal;

    fn engine() -> SyncEngine {
        SyncEngine::new(Arc::new(SessionRegistry::new(MoveRules::default())))
    }

    async fn paired_engine() -> (SyncEngine, ParticipantId, ParticipantId) {
        let engine = engine();
        let a = ParticipantId(1);
        let b = ParticipantId(2);
        engine.registry().enqueue(a).await;
        engine.registry().enqueue(b).await;
        (engine, a, b)
    }

    async fn round_of(engine: &SyncEngine, p: ParticipantId) -> u64 {
        let duel = engine.registry().lookup(p).await.unwrap();
        let state = duel.lock().await;
        state.round()
    }

    #[tokio::test]
    async fn test_full_duel_scenario() {
        let (engine, a, b) = paired_engine().await;

        // A opens: east 6 from (10,10).
        engine.submit(a, &[0, 6]).await;
        let broadcasts = engine.advance().await;
        assert_eq!(broadcasts.len(), 1);
        assert_eq!(broadcasts[&b], vec![Position::new(16, 10)]);
        assert_eq!(round_of(&engine, a).await, 1);
        assert_eq!(round_of(&engine, b).await, 1);

        // B answers with a two-command path; granularity is preserved.
        engine.submit(b, &[0, 1, 2, 1]).await;
        let broadcasts = engine.advance().await;
        assert_eq!(broadcasts.len(), 1);
        assert_eq!(
            broadcasts[&a],
            vec![Position::new(11, 10), Position::new(10, 10)]
        );
        assert_eq!(round_of(&engine, a).await, 2);
    }

    #[tokio::test]
    async fn test_waiter_submission_produces_nothing() {
        let (engine, a, b) = paired_engine().await;

        // B is the waiter: repeated submissions never resolve a round.
        for _ in 0..3 {
            engine.submit(b, &[0, 2]).await;
            assert!(engine.advance().await.is_empty());
            assert_eq!(round_of(&engine, a).await, 0);
        }
    }

    #[tokio::test]
    async fn test_early_submission_is_honored_on_turn() {
        let (engine, a, b) = paired_engine().await;

        // B sends before its turn; the submission waits.
        engine.submit(b, &[1, 3]).await;
        assert!(engine.advance().await.is_empty());

        // A moves; the swap makes B the mover, so B's buffered move
        // resolves on the following pass without a resubmission.
        engine.submit(a, &[0, 1]).await;
        let first = engine.advance().await;
        assert_eq!(first[&b], vec![Position::new(11, 10)]);

        let second = engine.advance().await;
        assert_eq!(second[&a], vec![Position::new(10, 13)]);
        assert_eq!(round_of(&engine, a).await, 2);
    }

    #[tokio::test]
    async fn test_malformed_submission_leaves_turn_open() {
        let (engine, a, b) = paired_engine().await;

        // Unknown direction code: dropped whole, round untouched.
        engine.submit(a, &[9, 2]).await;
        assert!(engine.advance().await.is_empty());
        assert_eq!(round_of(&engine, a).await, 0);

        // A corrected resubmission succeeds normally.
        engine.submit(a, &[2, 2]).await;
        let broadcasts = engine.advance().await;
        assert_eq!(broadcasts[&b], vec![Position::new(8, 10)]);
        assert_eq!(round_of(&engine, a).await, 1);
    }

    #[tokio::test]
    async fn test_resubmission_replaces_pending() {
        let (engine, a, b) = paired_engine().await;

        engine.submit(a, &[0, 1]).await;
        engine.submit(a, &[0, 6]).await;
        let broadcasts = engine.advance().await;

        // Only the latest submission resolves, exactly once.
        assert_eq!(broadcasts[&b], vec![Position::new(16, 10)]);
        assert_eq!(round_of(&engine, a).await, 1);
        assert!(engine.advance().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_participant_is_a_no_op() {
        let (engine, a, _) = paired_engine().await;

        engine.submit(ParticipantId(99), &[0, 1]).await;
        assert!(engine.advance().await.is_empty());
        assert_eq!(round_of(&engine, a).await, 0);
    }

    #[tokio::test]
    async fn test_advance_with_no_duels() {
        let engine = engine();
        assert!(engine.advance().await.is_empty());
    }

    #[tokio::test]
    async fn test_removal_silences_the_duel() {
        let (engine, a, b) = paired_engine().await;

        engine.submit(a, &[0, 6]).await;
        let removal = engine.registry().remove(b).await;
        assert_eq!(removal, Removal::Ended { opponent: a });

        // The pending submission dies with the duel.
        assert!(engine.advance().await.is_empty());
        engine.submit(a, &[0, 6]).await;
        assert!(engine.advance().await.is_empty());
    }

    #[tokio::test]
    async fn test_unrelated_duels_resolve_in_one_pass() {
        let engine = engine();
        let ids: Vec<ParticipantId> = (1..=4).map(ParticipantId).collect();
        for &id in &ids {
            engine.registry().enqueue(id).await;
        }

        engine.submit(ids[0], &[0, 2]).await;
        engine.submit(ids[2], &[1, 5]).await;
        let broadcasts = engine.advance().await;

        assert_eq!(broadcasts.len(), 2);
        assert_eq!(broadcasts[&ids[1]], vec![Position::new(12, 10)]);
        assert_eq!(broadcasts[&ids[3]], vec![Position::new(10, 15)]);
    }
}
