//! Duel State
//!
//! Turn state for one paired duel: the two participants, who currently
//! holds the move, last known position per side, the shared round counter,
//! and at most one buffered submission per side. All mutation goes through
//! the owning lock in the sync layer; nothing here touches the network.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::game::movement::{self, MovementCommand, MoveRules, Position};

/// Unique duel identifier.
pub type DuelId = uuid::Uuid;

/// Opaque stable participant identity.
///
/// Supplied by the identity layer; the game core only uses it as a key
/// and never authenticates or mutates it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParticipantId(pub u64);

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Duel lifecycle phase.
///
/// The pre-pairing "waiting for an opponent" state is owned by the
/// registry queue and never appears here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuelPhase {
    /// Active; the recorded mover may submit.
    AwaitingMove,
    /// A participant left. Terminal: every further apply fails.
    Ended,
}

/// Duel state errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DuelError {
    /// The participant is not the current mover.
    #[error("participant {0} is not the current mover")]
    OutOfTurn(ParticipantId),

    /// The duel has ended; no further moves are accepted.
    #[error("duel has ended")]
    SessionOver,

    /// The participant does not belong to this duel.
    #[error("participant {0} is not in this duel")]
    UnknownParticipant(ParticipantId),
}

/// State of one paired duel.
pub struct DuelState {
    /// Unique duel identifier.
    pub id: DuelId,
    phase: DuelPhase,
    /// Participant currently allowed to move.
    mover: ParticipantId,
    /// Participant waiting for the mover's resolved path.
    waiter: ParticipantId,
    /// Rounds completed so far. One shared counter for both sides.
    round: u64,
    /// Last known position per participant.
    positions: BTreeMap<ParticipantId, Position>,
    /// At most one decoded, not-yet-applied submission per participant.
    pending: BTreeMap<ParticipantId, Vec<MovementCommand>>,
}

impl DuelState {
    /// Create a duel between two distinct participants.
    ///
    /// `first` is the earlier-queued participant and takes the opening
    /// move. Both sides start at the configured starting position.
    pub fn new(id: DuelId, first: ParticipantId, second: ParticipantId, rules: &MoveRules) -> Self {
        debug_assert_ne!(first, second, "a duel needs two distinct participants");

        let mut positions = BTreeMap::new();
        positions.insert(first, rules.start_position);
        positions.insert(second, rules.start_position);

        Self {
            id,
            phase: DuelPhase::AwaitingMove,
            mover: first,
            waiter: second,
            round: 0,
            positions,
            pending: BTreeMap::new(),
        }
    }

    /// Current phase.
    pub fn phase(&self) -> DuelPhase {
        self.phase
    }

    /// Participant currently allowed to move.
    pub fn mover(&self) -> ParticipantId {
        self.mover
    }

    /// Participant waiting on the mover.
    pub fn waiter(&self) -> ParticipantId {
        self.waiter
    }

    /// Rounds completed. Identical from either participant's view.
    pub fn round(&self) -> u64 {
        self.round
    }

    /// Whether the participant belongs to this duel.
    pub fn contains(&self, participant: ParticipantId) -> bool {
        participant == self.mover || participant == self.waiter
    }

    /// The other half of the pair.
    pub fn opponent_of(&self, participant: ParticipantId) -> Option<ParticipantId> {
        if participant == self.mover {
            Some(self.waiter)
        } else if participant == self.waiter {
            Some(self.mover)
        } else {
            None
        }
    }

    /// Last known position of a participant.
    pub fn position_of(&self, participant: ParticipantId) -> Option<Position> {
        self.positions.get(&participant).copied()
    }

    /// Buffer a decoded submission for a participant, replacing any
    /// unconsumed prior one. Buffering is allowed for either side; turn
    /// ownership is checked at application time.
    pub fn buffer_submission(
        &mut self,
        participant: ParticipantId,
        commands: Vec<MovementCommand>,
    ) -> Result<(), DuelError> {
        if self.phase == DuelPhase::Ended {
            return Err(DuelError::SessionOver);
        }
        if !self.contains(participant) {
            return Err(DuelError::UnknownParticipant(participant));
        }
        self.pending.insert(participant, commands);
        Ok(())
    }

    /// Remove and return the current mover's pending submission, if any.
    pub fn take_mover_pending(&mut self) -> Option<Vec<MovementCommand>> {
        let mover = self.mover;
        self.pending.remove(&mover)
    }

    /// Whether a pending submission is buffered for the current mover.
    pub fn has_mover_pending(&self) -> bool {
        self.pending.contains_key(&self.mover)
    }

    /// Apply a validated submission for `participant`.
    ///
    /// Legal only while awaiting a move and only for the current mover.
    /// On success: the mover's position advances to the end of the path,
    /// the round counter increments by one, the roles swap, and the full
    /// path is returned for delivery to the former waiter.
    pub fn apply(
        &mut self,
        participant: ParticipantId,
        commands: &[MovementCommand],
    ) -> Result<Vec<Position>, DuelError> {
        if self.phase == DuelPhase::Ended {
            return Err(DuelError::SessionOver);
        }
        if participant != self.mover {
            return if self.contains(participant) {
                Err(DuelError::OutOfTurn(participant))
            } else {
                Err(DuelError::UnknownParticipant(participant))
            };
        }

        let start = self.positions[&participant];
        let path = movement::integrate(start, commands);
        if let Some(last) = path.last() {
            self.positions.insert(participant, *last);
        }

        self.round += 1;
        std::mem::swap(&mut self.mover, &mut self.waiter);

        Ok(path)
    }

    /// End the duel. Idempotent; every later apply fails with
    /// [`DuelError::SessionOver`].
    pub fn end(&mut self) {
        self.phase = DuelPhase::Ended;
        self.pending.clear();
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::movement::Direction;

    fn new_duel() -> (DuelState, ParticipantId, ParticipantId) {
        let a = ParticipantId(1);
        let b = ParticipantId(2);
        let duel = DuelState::new(DuelId::new_v4(), a, b, &MoveRules::default());
        (duel, a, b)
    }

    #[test]
    fn test_new_duel_initial_state() {
        let (duel, a, b) = new_duel();
        assert_eq!(duel.phase(), DuelPhase::AwaitingMove);
        assert_eq!(duel.mover(), a);
        assert_eq!(duel.waiter(), b);
        assert_eq!(duel.round(), 0);
        assert_eq!(duel.position_of(a), Some(Position::new(10, 10)));
        assert_eq!(duel.position_of(b), Some(Position::new(10, 10)));
    }

    #[test]
    fn test_apply_advances_round_and_swaps_roles() {
        let (mut duel, a, b) = new_duel();

        let path = duel
            .apply(a, &[MovementCommand::new(Direction::East, 6)])
            .unwrap();
        assert_eq!(path, vec![Position::new(16, 10)]);
        assert_eq!(duel.position_of(a), Some(Position::new(16, 10)));
        assert_eq!(duel.position_of(b), Some(Position::new(10, 10)));
        assert_eq!(duel.round(), 1);
        assert_eq!(duel.mover(), b);
        assert_eq!(duel.waiter(), a);
    }

    #[test]
    fn test_strict_alternation() {
        let (mut duel, a, b) = new_duel();
        let step = [MovementCommand::new(Direction::North, 1)];

        duel.apply(a, &step).unwrap();
        // A cannot move twice before B has moved once.
        assert_eq!(duel.apply(a, &step), Err(DuelError::OutOfTurn(a)));
        assert_eq!(duel.round(), 1);

        duel.apply(b, &step).unwrap();
        assert_eq!(duel.round(), 2);
        assert_eq!(duel.mover(), a);
    }

    #[test]
    fn test_waiter_apply_rejected_without_state_change() {
        let (mut duel, a, b) = new_duel();
        let step = [MovementCommand::new(Direction::East, 3)];

        for _ in 0..5 {
            assert_eq!(duel.apply(b, &step), Err(DuelError::OutOfTurn(b)));
        }
        assert_eq!(duel.round(), 0);
        assert_eq!(duel.mover(), a);
        assert_eq!(duel.position_of(b), Some(Position::new(10, 10)));
    }

    #[test]
    fn test_foreign_participant_rejected() {
        let (mut duel, _, _) = new_duel();
        let intruder = ParticipantId(99);
        assert_eq!(
            duel.apply(intruder, &[]),
            Err(DuelError::UnknownParticipant(intruder))
        );
        assert!(!duel.contains(intruder));
        assert_eq!(duel.opponent_of(intruder), None);
    }

    #[test]
    fn test_ended_duel_rejects_everything() {
        let (mut duel, a, _) = new_duel();
        duel.end();
        duel.end(); // idempotent

        assert_eq!(duel.phase(), DuelPhase::Ended);
        assert_eq!(
            duel.apply(a, &[MovementCommand::new(Direction::East, 1)]),
            Err(DuelError::SessionOver)
        );
        assert_eq!(
            duel.buffer_submission(a, vec![]),
            Err(DuelError::SessionOver)
        );
    }

    #[test]
    fn test_buffer_replaces_unconsumed_submission() {
        let (mut duel, a, _) = new_duel();

        duel.buffer_submission(a, vec![MovementCommand::new(Direction::East, 1)])
            .unwrap();
        duel.buffer_submission(a, vec![MovementCommand::new(Direction::West, 2)])
            .unwrap();

        let pending = duel.take_mover_pending().unwrap();
        assert_eq!(pending, vec![MovementCommand::new(Direction::West, 2)]);
        assert!(duel.take_mover_pending().is_none());
    }

    #[test]
    fn test_waiter_pending_is_held_not_taken() {
        let (mut duel, _, b) = new_duel();

        duel.buffer_submission(b, vec![MovementCommand::new(Direction::North, 2)])
            .unwrap();
        // B is the waiter; its submission stays buffered.
        assert!(!duel.has_mover_pending());
        assert!(duel.take_mover_pending().is_none());
    }

    #[test]
    fn test_empty_path_still_counts_as_a_move() {
        let (mut duel, a, b) = new_duel();

        let path = duel.apply(a, &[]).unwrap();
        assert!(path.is_empty());
        assert_eq!(duel.round(), 1);
        assert_eq!(duel.mover(), b);
        assert_eq!(duel.position_of(a), Some(Position::new(10, 10)));
    }
}
