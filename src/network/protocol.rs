//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! All messages are serialized as JSON for debugging ease,
//! with binary (bincode) available for the flat payload structs.

use serde::{Serialize, Deserialize};

use crate::game::duel::DuelId;
use crate::game::movement::Position;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Authenticate with the server.
    Auth(AuthRequest),

    /// Enter the waiting queue for an opponent.
    Play,

    /// Submit a movement for the current round.
    Move(MoveSubmission),

    /// Ping for latency measurement.
    Ping { timestamp: u64 },

    /// Leave the queue or the current duel.
    Leave,
}

/// Authentication request.
///
/// Identity comes from the externally issued token, never from a
/// client-chosen field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRequest {
    /// Authentication token (JWT from the external auth provider).
    pub token: String,
    /// Client version for compatibility check.
    pub client_version: String,
}

/// A movement submission: the compact flat encoding
/// `[dir0, mag0, dir1, mag1, ...]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveSubmission {
    /// Flat (direction, magnitude) pairs.
    pub path: Vec<i64>,
}

impl MoveSubmission {
    /// Serialize to binary.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from binary.
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Authentication result.
    AuthResult(AuthResult),

    /// Waiting in the matchmaking queue.
    Queued,

    /// A duel was created for this participant.
    DuelStart(DuelStartInfo),

    /// The opponent's resolved movement path for the round just applied.
    Path(PathUpdate),

    /// The opponent disconnected; the duel is over.
    OpponentLeft,

    /// Pong response.
    Pong { timestamp: u64, server_time: u64 },

    /// Error message.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown { reason: String },
}

/// Authentication result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResult {
    /// Whether auth succeeded.
    pub success: bool,
    /// Resolved participant identity if successful.
    pub participant_id: Option<u64>,
    /// Error message if failed.
    pub error: Option<String>,
    /// Server version.
    pub server_version: String,
}

/// Information when a duel starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuelStartInfo {
    /// Duel identifier.
    pub duel_id: DuelId,
    /// The paired opponent.
    pub opponent_id: u64,
    /// Whether the recipient holds the opening move.
    pub your_turn: bool,
    /// Starting position of both sides.
    pub start: Position,
}

/// One resolved round, delivered only to the participant who did not move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathUpdate {
    /// Absolute positions, one per movement command, in order.
    pub path: Vec<Position>,
}

/// Server error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Authentication failed.
    AuthFailed,
    /// Not authenticated.
    NotAuthenticated,
    /// JWT token has expired.
    TokenExpired,
    /// Invalid JWT token (signature, format, claims).
    InvalidToken,
    /// Invalid input.
    InvalidInput,
    /// Not currently in a duel.
    NotInDuel,
    /// Internal error.
    InternalError,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
