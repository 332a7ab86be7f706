//! Session entry
//!
//! This module defines the per-session state stored in the registry. Each
//! entry sits behind its own lock so traffic on one session never waits on
//! another.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::presence::{Participant, ParticipantId};

use super::session::{NewSession, Session, SessionId, SessionStatus};

/// Entry for a single session in the registry
#[derive(Debug)]
pub struct SessionEntry {
    pub session_id: SessionId,

    /// Account that owns the session
    pub broadcaster_id: String,

    pub status: SessionStatus,

    pub language: String,
    pub title: String,
    pub description: String,

    /// Ids of the participants currently joined
    pub active: BTreeSet<ParticipantId>,

    /// Every participant that ever joined, keyed by id
    pub participants: HashMap<ParticipantId, Participant>,

    pub started_at: Instant,

    /// When the session ended (drives the retention grace period)
    pub ended_at: Option<Instant>,
}

impl SessionEntry {
    /// Create a new entry waiting for its broadcaster
    pub(super) fn new(
        session_id: SessionId,
        broadcaster_id: String,
        details: NewSession,
        now: Instant,
    ) -> Self {
        Self {
            session_id,
            broadcaster_id,
            status: SessionStatus::WaitingForBroadcaster,
            language: details.language,
            title: details.title,
            description: details.description,
            active: BTreeSet::new(),
            participants: HashMap::new(),
            started_at: now,
            ended_at: None,
        }
    }

    /// Copy the entry into a read-only snapshot
    pub fn snapshot(&self) -> Session {
        Session {
            session_id: self.session_id.clone(),
            broadcaster_id: self.broadcaster_id.clone(),
            status: self.status,
            language: self.language.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            participants: self.active.clone(),
            started_at: self.started_at,
            ended_at: self.ended_at,
        }
    }

    /// Fail with `SessionInactive` once the session has ended
    pub fn ensure_live(&self) -> Result<()> {
        if self.status.is_live() {
            Ok(())
        } else {
            Err(Error::SessionInactive(self.session_id.clone()))
        }
    }

    pub fn participant(&self, id: &ParticipantId) -> Result<&Participant> {
        self.participants
            .get(id)
            .ok_or_else(|| self.participant_not_found(id))
    }

    pub fn participant_mut(&mut self, id: &ParticipantId) -> Result<&mut Participant> {
        match self.participants.get_mut(id) {
            Some(participant) => Ok(participant),
            None => Err(Error::ParticipantNotFound {
                session: self.session_id.clone(),
                participant: id.clone(),
            }),
        }
    }

    fn participant_not_found(&self, id: &ParticipantId) -> Error {
        Error::ParticipantNotFound {
            session: self.session_id.clone(),
            participant: id.clone(),
        }
    }

    /// Whether the grace period has run out for an ended session
    pub(super) fn is_expired(&self, now: Instant, grace_period: Duration) -> bool {
        match (self.status, self.ended_at) {
            (SessionStatus::Ended, Some(ended_at)) => {
                now.saturating_duration_since(ended_at) >= grace_period
            }
            _ => false,
        }
    }

    /// How long the session has been (or was) running
    pub fn duration(&self, now: Instant) -> Duration {
        self.ended_at
            .unwrap_or(now)
            .saturating_duration_since(self.started_at)
    }
}
