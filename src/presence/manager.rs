//! Presence manager
//!
//! Join, leave and per-listener updates against a session. Each operation
//! resolves the session through the registry, takes that session's write lock,
//! validates, then mutates and records the event in one step. A failed
//! validation leaves the session untouched.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::Result;
use crate::history::HistoryRecord;
use crate::registry::{SessionId, SessionRegistry};

use super::participant::{
    ConnectionInfo, Participant, ParticipantId, Preferences, PreferencesUpdate,
};

/// Parameters for joining a session
#[derive(Debug, Clone)]
pub struct JoinRequest {
    pub participant_id: ParticipantId,
    pub preferred_language: String,
    pub secondary_language: Option<String>,
    /// Account id for signed-in listeners
    pub user_id: Option<String>,
    pub connection: ConnectionInfo,
}

impl JoinRequest {
    pub fn new(participant_id: ParticipantId, preferred_language: impl Into<String>) -> Self {
        Self {
            participant_id,
            preferred_language: preferred_language.into(),
            secondary_language: None,
            user_id: None,
            connection: ConnectionInfo::default(),
        }
    }

    /// Attach the listener's account id
    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn secondary_language(mut self, language: impl Into<String>) -> Self {
        self.secondary_language = Some(language.into());
        self
    }

    pub fn connection(mut self, connection: ConnectionInfo) -> Self {
        self.connection = connection;
        self
    }
}

/// Participant operations on top of the session registry
#[derive(Clone)]
pub struct PresenceManager {
    registry: Arc<SessionRegistry>,
}

impl PresenceManager {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Join a listener to a session
    ///
    /// Joining while already active only refreshes the activity timestamp. A
    /// listener who left earlier is reactivated on the same record.
    pub async fn join(&self, session_id: &SessionId, request: JoinRequest) -> Result<Participant> {
        let entry_arc = self.registry.entry(session_id).await?;
        let mut entry = entry_arc.write().await;
        entry.ensure_live()?;

        let now = Instant::now();
        let id = request.participant_id.clone();

        if let Some(existing) = entry.participants.get_mut(&id) {
            if existing.is_active {
                existing.touch(now);
                tracing::trace!(
                    session_id = %session_id,
                    participant = %id,
                    "Duplicate join ignored"
                );
                return Ok(existing.clone());
            }

            existing.rejoin(request, now);
            let participant = existing.clone();
            entry.active.insert(id.clone());

            tracing::debug!(
                session_id = %session_id,
                participant = %id,
                active = entry.active.len(),
                "Participant rejoined"
            );
            return Ok(participant);
        }

        let mut preferences = Preferences::new(request.preferred_language);
        preferences.secondary_language = request.secondary_language;

        let participant = Participant::join(
            id.clone(),
            session_id.clone(),
            request.user_id,
            preferences,
            request.connection,
            now,
        );
        entry.participants.insert(id.clone(), participant.clone());
        entry.active.insert(id.clone());

        tracing::debug!(
            session_id = %session_id,
            participant = %id,
            language = %participant.preferred_language(),
            active = entry.active.len(),
            "Participant joined"
        );

        Ok(participant)
    }

    /// Remove a listener from the active set
    ///
    /// The record is kept until the session is purged. Leaving again after
    /// having left records a zero-length `left` event and is not forwarded
    /// to history a second time.
    pub async fn leave(
        &self,
        session_id: &SessionId,
        participant_id: &ParticipantId,
    ) -> Result<Participant> {
        let participant = {
            let entry_arc = self.registry.entry(session_id).await?;
            let mut entry = entry_arc.write().await;
            entry.ensure_live()?;

            let participant = entry.participant_mut(participant_id)?;
            if !participant.is_active {
                participant.leave(Instant::now());
                return Ok(participant.clone());
            }

            let stint = participant.leave(Instant::now());
            let participant = participant.clone();
            entry.active.remove(participant_id);

            tracing::debug!(
                session_id = %session_id,
                participant = %participant_id,
                duration_secs = stint.as_secs(),
                active = entry.active.len(),
                "Participant left"
            );
            participant
        };

        self.registry
            .history()
            .forward(HistoryRecord::ParticipantLeft(participant.clone()));

        Ok(participant)
    }

    /// Record a transient network drop; the listener stays joined
    pub async fn record_disconnection(
        &self,
        session_id: &SessionId,
        participant_id: &ParticipantId,
    ) -> Result<Participant> {
        self.update(session_id, participant_id, |participant, now| {
            participant.record_disconnection(now);
            tracing::debug!(
                session_id = %session_id,
                participant = %participant_id,
                disconnections = participant.quality.disconnection_count,
                "Participant disconnected"
            );
        })
        .await
    }

    /// Record a reconnection, optionally with an observed latency sample
    pub async fn record_reconnection(
        &self,
        session_id: &SessionId,
        participant_id: &ParticipantId,
        latency: Option<Duration>,
    ) -> Result<Participant> {
        self.update(session_id, participant_id, |participant, now| {
            participant.record_reconnection(latency, now);
            tracing::debug!(
                session_id = %session_id,
                participant = %participant_id,
                stability = participant.quality.stability_score,
                "Participant reconnected"
            );
        })
        .await
    }

    /// Switch a listener's preferred language
    pub async fn change_language(
        &self,
        session_id: &SessionId,
        participant_id: &ParticipantId,
        language: impl Into<String>,
    ) -> Result<Participant> {
        let language = language.into();
        self.update(session_id, participant_id, |participant, now| {
            let from = participant.change_language(language, now);
            tracing::debug!(
                session_id = %session_id,
                participant = %participant_id,
                from = %from,
                to = %participant.preferred_language(),
                "Participant changed language"
            );
        })
        .await
    }

    /// Merge a partial preference update
    pub async fn update_preferences(
        &self,
        session_id: &SessionId,
        participant_id: &ParticipantId,
        update: PreferencesUpdate,
    ) -> Result<Participant> {
        self.update(session_id, participant_id, |participant, now| {
            participant.update_preferences(update, now);
        })
        .await
    }

    /// Get a participant record
    pub async fn participant(
        &self,
        session_id: &SessionId,
        participant_id: &ParticipantId,
    ) -> Result<Participant> {
        let entry_arc = self.registry.entry(session_id).await?;
        let entry = entry_arc.read().await;
        entry.participant(participant_id).cloned()
    }

    /// All participant records of a session, active or not, ordered by id
    pub async fn participants(&self, session_id: &SessionId) -> Result<Vec<Participant>> {
        let entry_arc = self.registry.entry(session_id).await?;
        let entry = entry_arc.read().await;

        let mut participants: Vec<_> = entry.participants.values().cloned().collect();
        participants.sort_by(|a, b| a.participant_id.cmp(&b.participant_id));
        Ok(participants)
    }

    /// Active listeners grouped by preferred language
    ///
    /// This is the view a fan-out layer uses to deliver one translation per
    /// language group.
    pub async fn listeners_by_language(
        &self,
        session_id: &SessionId,
    ) -> Result<BTreeMap<String, Vec<ParticipantId>>> {
        let entry_arc = self.registry.entry(session_id).await?;
        let entry = entry_arc.read().await;

        let mut groups: BTreeMap<String, Vec<ParticipantId>> = BTreeMap::new();
        for id in &entry.active {
            let participant = entry.participant(id)?;
            groups
                .entry(participant.preferred_language().to_string())
                .or_default()
                .push(id.clone());
        }
        Ok(groups)
    }

    /// Apply `f` to one participant of a live session under its write lock
    async fn update<F>(
        &self,
        session_id: &SessionId,
        participant_id: &ParticipantId,
        f: F,
    ) -> Result<Participant>
    where
        F: FnOnce(&mut Participant, Instant),
    {
        let entry_arc = self.registry.entry(session_id).await?;
        let mut entry = entry_arc.write().await;
        entry.ensure_live()?;

        let participant = entry.participant_mut(participant_id)?;
        f(participant, Instant::now());
        Ok(participant.clone())
    }
}
