//! Session identifiers, status and snapshots

use std::collections::BTreeSet;

use tokio::time::Instant;

use crate::presence::ParticipantId;

/// Opaque unique identifier for a session
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap an existing identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of a session
///
/// `WaitingForBroadcaster -> Active -> Ended`. `Ended` is terminal; the
/// session is removed from the registry once its grace period runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    /// Created, no audio producer attached yet
    WaitingForBroadcaster,
    /// Broadcaster attached and streaming
    Active,
    /// Ended, awaiting purge
    Ended,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::WaitingForBroadcaster => "waiting_for_broadcaster",
            SessionStatus::Active => "active",
            SessionStatus::Ended => "ended",
        }
    }

    /// Any status other than `Ended`
    pub fn is_live(&self) -> bool {
        *self != SessionStatus::Ended
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptive metadata supplied when creating a session
#[derive(Debug, Clone, Default)]
pub struct NewSession {
    /// Source language spoken by the broadcaster
    pub language: String,
    pub title: String,
    pub description: String,
}

impl NewSession {
    pub fn new(language: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            title: title.into(),
            description: String::new(),
        }
    }

    /// Set the description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Point-in-time copy of a session record
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub session_id: SessionId,
    pub broadcaster_id: String,
    pub status: SessionStatus,
    pub language: String,
    pub title: String,
    pub description: String,
    /// Participants currently joined
    pub participants: BTreeSet<ParticipantId>,
    pub started_at: Instant,
    /// Set once the session ends
    pub ended_at: Option<Instant>,
}

impl Session {
    /// Number of participants currently joined
    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    /// Whether the session has ended
    pub fn is_ended(&self) -> bool {
        self.status == SessionStatus::Ended
    }
}
