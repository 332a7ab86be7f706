//! Error types
//!
//! Every registry, presence and stats operation returns [`Result`]. Errors are
//! plain values; no operation mutates state when it fails.

use crate::presence::ParticipantId;
use crate::registry::SessionId;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for registry and presence operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// No session with this id (never created, or already purged)
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// The session exists but has no record of this participant
    #[error("participant {participant} not found in session {session}")]
    ParticipantNotFound {
        session: SessionId,
        participant: ParticipantId,
    },

    /// Caller is not allowed to perform the action on this session
    #[error("caller {caller} may not modify session {session}")]
    Forbidden { session: SessionId, caller: String },

    /// Broadcaster already owns a session that has not ended
    #[error("broadcaster {broadcaster} already has live session {existing}")]
    AlreadyActive {
        broadcaster: String,
        existing: SessionId,
    },

    /// Session has ended and accepts no further mutation
    #[error("session is no longer active: {0}")]
    SessionInactive(SessionId),
}

/// Coarse error classification for transport layers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    AlreadyActive,
    SessionInactive,
}

impl Error {
    /// Collapse the error into its kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::SessionNotFound(_) | Error::ParticipantNotFound { .. } => ErrorKind::NotFound,
            Error::Forbidden { .. } => ErrorKind::Forbidden,
            Error::AlreadyActive { .. } => ErrorKind::AlreadyActive,
            Error::SessionInactive(_) => ErrorKind::SessionInactive,
        }
    }
}
