//! Movement Decoding and Integration
//!
//! Translates the compact wire encoding of a movement submission into
//! validated commands, and integrates commands into absolute positions.
//! Everything in this module is pure: identical input produces identical
//! output on any platform.

use serde::{Serialize, Deserialize};
use thiserror::Error;

// =============================================================================
// GRID TYPES
// =============================================================================

/// Absolute position on the duel grid.
///
/// Deliberately a distinct type from [`MovementCommand`] even though both
/// are a pair of integers; conflating the two was a recurring bug source
/// in the legacy implementation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    /// X coordinate.
    pub x: i32,
    /// Y coordinate.
    pub y: i32,
}

impl Position {
    /// Create a position from coordinates.
    #[inline]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Position after walking `magnitude` unit steps along `direction`.
    #[inline]
    pub fn stepped(self, direction: Direction, magnitude: u16) -> Self {
        let (dx, dy) = direction.delta();
        Self {
            x: self.x + dx * i32::from(magnitude),
            y: self.y + dy * i32::from(magnitude),
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Compass direction of a movement command.
///
/// Wire codes are fixed: 0 = East, 1 = North, 2 = West, 3 = South.
/// Code 0 is pinned by legacy behavior (it advances +x); the remaining
/// assignments are this server's documented convention.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Direction {
    /// +x
    East = 0,
    /// +y
    North = 1,
    /// -x
    West = 2,
    /// -y
    South = 3,
}

impl Direction {
    /// All directions in wire-code order.
    pub const ALL: [Direction; 4] = [
        Direction::East,
        Direction::North,
        Direction::West,
        Direction::South,
    ];

    /// Parse a wire code.
    #[inline]
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Direction::East),
            1 => Some(Direction::North),
            2 => Some(Direction::West),
            3 => Some(Direction::South),
            _ => None,
        }
    }

    /// Wire code of this direction.
    #[inline]
    pub fn code(self) -> i64 {
        self as u8 as i64
    }

    /// Unit delta (dx, dy) for one step.
    #[inline]
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::East => (1, 0),
            Direction::North => (0, 1),
            Direction::West => (-1, 0),
            Direction::South => (0, -1),
        }
    }
}

// =============================================================================
// MOVEMENT COMMANDS
// =============================================================================

/// A single validated movement command: a direction and a step count.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementCommand {
    /// Compass direction to walk.
    pub direction: Direction,
    /// Number of unit steps (0..=MoveRules::max_magnitude).
    pub magnitude: u16,
}

impl MovementCommand {
    /// Create a command.
    pub const fn new(direction: Direction, magnitude: u16) -> Self {
        Self { direction, magnitude }
    }
}

/// Movement validation bounds and the shared starting position.
///
/// The legacy material does not fully pin these values down, so they are
/// explicit configuration rather than hard-coded into the codec.
#[derive(Debug, Clone, Copy)]
pub struct MoveRules {
    /// Largest step count a single command may carry.
    pub max_magnitude: u16,
    /// Position both participants occupy when a duel begins.
    pub start_position: Position,
}

impl Default for MoveRules {
    fn default() -> Self {
        Self {
            max_magnitude: 16,
            start_position: Position::new(10, 10),
        }
    }
}

/// Errors from decoding a raw movement submission.
///
/// Decoding is all-or-nothing: one bad entry rejects the whole list and
/// no partial command sequence is ever returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The flat array has an odd number of entries.
    #[error("truncated command list: {len} values do not form (direction, magnitude) pairs")]
    TruncatedList {
        /// Raw array length.
        len: usize,
    },

    /// A direction code outside the compass set.
    #[error("unknown direction code {code} at command {index}")]
    UnknownDirection {
        /// Command index within the submission.
        index: usize,
        /// Offending wire code.
        code: i64,
    },

    /// A magnitude outside the configured bounds.
    #[error("magnitude {magnitude} at command {index} outside 0..={max}")]
    MagnitudeOutOfRange {
        /// Command index within the submission.
        index: usize,
        /// Offending raw value.
        magnitude: i64,
        /// Configured maximum.
        max: u16,
    },
}

// =============================================================================
// CODEC
// =============================================================================

/// Decode a flat wire array `[dir0, mag0, dir1, mag1, ...]` into commands.
///
/// Fails as a whole on the first invalid entry; the round is not advanced
/// by the caller on failure and the submitter keeps the turn.
pub fn decode(raw: &[i64], rules: &MoveRules) -> Result<Vec<MovementCommand>, DecodeError> {
    if raw.len() % 2 != 0 {
        return Err(DecodeError::TruncatedList { len: raw.len() });
    }

    let mut commands = Vec::with_capacity(raw.len() / 2);
    for (index, pair) in raw.chunks_exact(2).enumerate() {
        let direction = Direction::from_code(pair[0])
            .ok_or(DecodeError::UnknownDirection { index, code: pair[0] })?;

        let magnitude = pair[1];
        if magnitude < 0 || magnitude > i64::from(rules.max_magnitude) {
            return Err(DecodeError::MagnitudeOutOfRange {
                index,
                magnitude,
                max: rules.max_magnitude,
            });
        }

        commands.push(MovementCommand::new(direction, magnitude as u16));
    }

    Ok(commands)
}

/// Encode commands back into the flat wire array.
///
/// Inverse of [`decode`]: `decode(&encode(cmds), rules)` returns `cmds`
/// for every list that decodes cleanly.
pub fn encode(commands: &[MovementCommand]) -> Vec<i64> {
    let mut raw = Vec::with_capacity(commands.len() * 2);
    for command in commands {
        raw.push(command.direction.code());
        raw.push(i64::from(command.magnitude));
    }
    raw
}

/// Integrate a command list against a starting position.
///
/// Returns one absolute position per command (not just the endpoint), so
/// the receiving side can render every intermediate stop of the path.
pub fn integrate(start: Position, commands: &[MovementCommand]) -> Vec<Position> {
    let mut path = Vec::with_capacity(commands.len());
    let mut current = start;
    for command in commands {
        current = current.stepped(command.direction, command.magnitude);
        path.push(current);
    }
    path
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rules() -> MoveRules {
        MoveRules::default()
    }

    #[test]
    fn test_direction_codes_round_trip() {
        for direction in Direction::ALL {
            assert_eq!(Direction::from_code(direction.code()), Some(direction));
        }
        assert_eq!(Direction::from_code(4), None);
        assert_eq!(Direction::from_code(-1), None);
    }

    #[test]
    fn test_decode_single_command() {
        let commands = decode(&[0, 6], &rules()).unwrap();
        assert_eq!(commands, vec![MovementCommand::new(Direction::East, 6)]);
    }

    #[test]
    fn test_decode_preserves_order() {
        let commands = decode(&[0, 1, 2, 1, 3, 0], &rules()).unwrap();
        assert_eq!(commands.len(), 3);
        assert_eq!(commands[0], MovementCommand::new(Direction::East, 1));
        assert_eq!(commands[1], MovementCommand::new(Direction::West, 1));
        assert_eq!(commands[2], MovementCommand::new(Direction::South, 0));
    }

    #[test]
    fn test_decode_rejects_unknown_direction() {
        let err = decode(&[7, 3], &rules()).unwrap_err();
        assert_eq!(err, DecodeError::UnknownDirection { index: 0, code: 7 });
    }

    #[test]
    fn test_decode_rejects_magnitude_out_of_range() {
        let err = decode(&[0, 17], &rules()).unwrap_err();
        assert_eq!(err, DecodeError::MagnitudeOutOfRange {
            index: 0,
            magnitude: 17,
            max: 16,
        });

        let err = decode(&[0, -1], &rules()).unwrap_err();
        assert!(matches!(err, DecodeError::MagnitudeOutOfRange { magnitude: -1, .. }));
    }

    #[test]
    fn test_decode_rejects_odd_length() {
        let err = decode(&[0, 6, 1], &rules()).unwrap_err();
        assert_eq!(err, DecodeError::TruncatedList { len: 3 });
    }

    #[test]
    fn test_decode_is_all_or_nothing() {
        // One bad entry among valid ones rejects the whole list.
        let err = decode(&[0, 6, 9, 1, 2, 3], &rules()).unwrap_err();
        assert_eq!(err, DecodeError::UnknownDirection { index: 1, code: 9 });
    }

    #[test]
    fn test_decode_empty_list() {
        assert_eq!(decode(&[], &rules()).unwrap(), vec![]);
    }

    #[test]
    fn test_integrate_single_step() {
        let path = integrate(
            Position::new(10, 10),
            &[MovementCommand::new(Direction::East, 6)],
        );
        assert_eq!(path, vec![Position::new(16, 10)]);
    }

    #[test]
    fn test_integrate_keeps_path_granularity() {
        let path = integrate(
            Position::new(10, 10),
            &[
                MovementCommand::new(Direction::East, 1),
                MovementCommand::new(Direction::West, 1),
            ],
        );
        // One entry per command, including the intermediate stop.
        assert_eq!(path, vec![Position::new(11, 10), Position::new(10, 10)]);
    }

    #[test]
    fn test_integrate_all_directions() {
        let start = Position::new(0, 0);
        let path = integrate(start, &[
            MovementCommand::new(Direction::East, 2),
            MovementCommand::new(Direction::North, 3),
            MovementCommand::new(Direction::West, 5),
            MovementCommand::new(Direction::South, 1),
        ]);
        assert_eq!(path, vec![
            Position::new(2, 0),
            Position::new(2, 3),
            Position::new(-3, 3),
            Position::new(-3, 2),
        ]);
    }

    #[test]
    fn test_integrate_is_deterministic() {
        let commands = decode(&[0, 4, 1, 2, 2, 7], &rules()).unwrap();
        let start = Position::new(10, 10);
        let first = integrate(start, &commands);
        for _ in 0..100 {
            assert_eq!(integrate(start, &commands), first);
        }
        assert_eq!(first.len(), commands.len());
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let commands = vec![
            MovementCommand::new(Direction::East, 6),
            MovementCommand::new(Direction::North, 0),
            MovementCommand::new(Direction::South, 16),
        ];
        assert_eq!(decode(&encode(&commands), &rules()).unwrap(), commands);
    }

    proptest! {
        #[test]
        fn prop_codec_round_trip(raw in prop::collection::vec((0i64..4, 0i64..=16), 0..32)) {
            let rules = MoveRules::default();
            let flat: Vec<i64> = raw.iter().flat_map(|&(d, m)| [d, m]).collect();
            let commands = decode(&flat, &rules).unwrap();
            prop_assert_eq!(encode(&commands), flat);
        }

        #[test]
        fn prop_integrate_length_matches(raw in prop::collection::vec((0i64..4, 0i64..=16), 0..32)) {
            let rules = MoveRules::default();
            let flat: Vec<i64> = raw.iter().flat_map(|&(d, m)| [d, m]).collect();
            let commands = decode(&flat, &rules).unwrap();
            let path = integrate(rules.start_position, &commands);
            prop_assert_eq!(path.len(), commands.len());
        }
    }
}
