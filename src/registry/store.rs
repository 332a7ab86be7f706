//! Session registry implementation
//!
//! The central registry that owns every session and its participants.
//!
//! Locking: the outer table lock is held only long enough to look up, insert or
//! remove an entry; all per-session work happens under that entry's own lock.
//! Lock order is `live_broadcasters -> sessions -> entry`, and no code path
//! waits on an outer lock while holding an entry lock.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::history::{ChannelSink, HistoryRecord, HistorySink, NoopSink};
use crate::identity::Caller;
use crate::stats::SessionStats;

use super::config::RegistryConfig;
use super::entry::SessionEntry;
use super::session::{NewSession, Session, SessionId, SessionStatus};

/// Central registry for all sessions
pub struct SessionRegistry {
    /// Map of session id to session entry
    sessions: RwLock<HashMap<SessionId, Arc<RwLock<SessionEntry>>>>,

    /// Broadcaster id -> id of their most recent session that was not ended
    live_broadcasters: Mutex<HashMap<String, SessionId>>,

    /// Where left participants and ended sessions are forwarded
    history: Arc<dyn HistorySink>,

    config: RegistryConfig,
}

impl SessionRegistry {
    /// Create a new registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new registry with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        Self::with_sink(config, NoopSink)
    }

    /// Create a new registry that forwards history to `sink`
    pub fn with_sink(config: RegistryConfig, sink: impl HistorySink) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            live_broadcasters: Mutex::new(HashMap::new()),
            history: Arc::new(sink),
            config,
        }
    }

    /// Create a new registry that queues history on a channel
    ///
    /// The channel holds `config.history_capacity` records. The returned
    /// receiver is meant for a storage writer task.
    pub fn with_history_channel(
        config: RegistryConfig,
    ) -> (Self, mpsc::Receiver<HistoryRecord>) {
        let (sink, rx) = ChannelSink::new(config.history_capacity);
        (Self::with_sink(config, sink), rx)
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub(crate) fn history(&self) -> &dyn HistorySink {
        self.history.as_ref()
    }

    /// Look up the locked entry for a session
    pub(crate) async fn entry(
        &self,
        session_id: &SessionId,
    ) -> Result<Arc<RwLock<SessionEntry>>> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| Error::SessionNotFound(session_id.clone()))
    }

    /// Create a session owned by `caller`
    ///
    /// Fails with `AlreadyActive` if the caller already owns a session that
    /// has not ended.
    pub async fn create(&self, caller: &Caller, details: NewSession) -> Result<Session> {
        let mut live = self.live_broadcasters.lock().await;

        if let Some(existing) = live.get(&caller.id) {
            // The index may briefly lag behind an `end` that has not yet
            // cleared it, so confirm against the entry itself.
            if let Ok(entry_arc) = self.entry(existing).await {
                if entry_arc.read().await.status.is_live() {
                    tracing::warn!(
                        broadcaster = %caller.id,
                        existing = %existing,
                        "Session create rejected, broadcaster already live"
                    );
                    return Err(Error::AlreadyActive {
                        broadcaster: caller.id.clone(),
                        existing: existing.clone(),
                    });
                }
            }
        }

        let session_id = SessionId::generate();
        let entry = SessionEntry::new(
            session_id.clone(),
            caller.id.clone(),
            details,
            Instant::now(),
        );
        let snapshot = entry.snapshot();

        self.sessions
            .write()
            .await
            .insert(session_id.clone(), Arc::new(RwLock::new(entry)));
        live.insert(caller.id.clone(), session_id.clone());

        tracing::info!(
            session_id = %session_id,
            broadcaster = %caller.id,
            language = %snapshot.language,
            "Session created"
        );

        Ok(snapshot)
    }

    /// Get a snapshot of a session
    pub async fn get(&self, session_id: &SessionId) -> Result<Session> {
        let entry_arc = self.entry(session_id).await?;
        let entry = entry_arc.read().await;
        Ok(entry.snapshot())
    }

    /// Snapshots of every session that has not ended
    pub async fn list_active(&self) -> Vec<Session> {
        let entries: Vec<_> = self.sessions.read().await.values().cloned().collect();

        let mut live = Vec::with_capacity(entries.len());
        for entry_arc in entries {
            let entry = entry_arc.read().await;
            if entry.status.is_live() {
                live.push(entry.snapshot());
            }
        }
        live
    }

    /// Mark the broadcaster's audio producer as attached
    ///
    /// Moves `waiting_for_broadcaster` to `active`. Attaching to an already
    /// active session is a no-op.
    pub async fn attach_broadcaster(
        &self,
        session_id: &SessionId,
        caller: &Caller,
    ) -> Result<Session> {
        let entry_arc = self.entry(session_id).await?;
        let mut entry = entry_arc.write().await;

        if !caller.is(&entry.broadcaster_id) {
            return Err(forbidden(session_id, caller));
        }
        entry.ensure_live()?;

        if entry.status == SessionStatus::WaitingForBroadcaster {
            entry.status = SessionStatus::Active;
            tracing::info!(
                session_id = %session_id,
                participants = entry.active.len(),
                "Broadcaster attached"
            );
        }

        Ok(entry.snapshot())
    }

    /// End a session
    ///
    /// Only the owning broadcaster may end a session. Ending an ended session
    /// returns the existing record unchanged. The session stays readable until
    /// the retention sweeper purges it after the grace period.
    pub async fn end(&self, session_id: &SessionId, caller: &Caller) -> Result<Session> {
        let entry_arc = self.entry(session_id).await?;

        let (snapshot, stats) = {
            let mut entry = entry_arc.write().await;

            if !caller.is(&entry.broadcaster_id) {
                return Err(forbidden(session_id, caller));
            }
            if entry.status == SessionStatus::Ended {
                return Ok(entry.snapshot());
            }

            let now = Instant::now();
            entry.status = SessionStatus::Ended;
            entry.ended_at = Some(now);

            (entry.snapshot(), SessionStats::from_entry(&entry, now))
        };

        {
            let mut live = self.live_broadcasters.lock().await;
            if live.get(&snapshot.broadcaster_id) == Some(session_id) {
                live.remove(&snapshot.broadcaster_id);
            }
        }

        tracing::info!(
            session_id = %session_id,
            participants = stats.total_participants,
            grace_period_secs = self.config.grace_period.as_secs(),
            "Session ended"
        );

        self.history.forward(HistoryRecord::SessionEnded {
            session: snapshot.clone(),
            stats,
        });

        Ok(snapshot)
    }

    /// Remove an ended session whose grace period has elapsed
    ///
    /// Returns `true` if the session was removed. Sessions that are live, still
    /// inside their grace period, or already gone are left alone.
    pub async fn purge(&self, session_id: &SessionId) -> bool {
        let mut sessions = self.sessions.write().await;

        let expired = match sessions.get(session_id) {
            Some(entry_arc) => entry_arc
                .read()
                .await
                .is_expired(Instant::now(), self.config.grace_period),
            None => false,
        };

        if expired {
            sessions.remove(session_id);
            tracing::info!(session_id = %session_id, "Session purged");
        }
        expired
    }

    /// Run one retention pass
    ///
    /// Purges every session whose grace period has elapsed and returns how
    /// many were removed.
    pub async fn sweep(&self) -> usize {
        let entries: Vec<_> = self
            .sessions
            .read()
            .await
            .iter()
            .map(|(id, entry_arc)| (id.clone(), Arc::clone(entry_arc)))
            .collect();

        let now = Instant::now();
        let mut candidates = Vec::new();
        for (id, entry_arc) in entries {
            // Entries busy with a mutation are retried on the next tick
            if let Ok(entry) = entry_arc.try_read() {
                if entry.is_expired(now, self.config.grace_period) {
                    candidates.push(id);
                }
            }
        }

        let mut purged = 0;
        for id in candidates {
            if self.purge(&id).await {
                purged += 1;
            }
        }

        if purged > 0 {
            tracing::debug!(purged, "Retention sweep complete");
        }
        purged
    }

    /// Get total number of sessions held, including ended ones
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn forbidden(session_id: &SessionId, caller: &Caller) -> Error {
    tracing::warn!(
        session_id = %session_id,
        caller = %caller.id,
        "Caller does not own session"
    );
    Error::Forbidden {
        session: session_id.clone(),
        caller: caller.id.clone(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn details() -> NewSession {
        NewSession::new("Arabic", "Friday khutbah").description("Weekly sermon")
    }

    #[tokio::test]
    async fn test_create_session() {
        let registry = SessionRegistry::new();
        let owner = Caller::broadcaster("mosqueA");

        let session = registry.create(&owner, details()).await.unwrap();

        assert_eq!(session.broadcaster_id, "mosqueA");
        assert_eq!(session.status, SessionStatus::WaitingForBroadcaster);
        assert_eq!(session.language, "Arabic");
        assert_eq!(session.description, "Weekly sermon");
        assert!(session.ended_at.is_none());
        assert_eq!(registry.get(&session.session_id).await.unwrap(), session);
    }

    #[tokio::test]
    async fn test_one_live_session_per_broadcaster() {
        let registry = SessionRegistry::new();
        let owner = Caller::broadcaster("mosqueA");

        let first = registry.create(&owner, details()).await.unwrap();
        registry
            .attach_broadcaster(&first.session_id, &owner)
            .await
            .unwrap();

        let result = registry.create(&owner, details()).await;
        assert_eq!(
            result,
            Err(Error::AlreadyActive {
                broadcaster: "mosqueA".into(),
                existing: first.session_id.clone(),
            })
        );

        let current = registry.get(&first.session_id).await.unwrap();
        assert_eq!(current.status, SessionStatus::Active);
        assert_eq!(registry.session_count().await, 1);

        // Other broadcasters are unaffected
        assert!(registry
            .create(&Caller::broadcaster("mosqueB"), details())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_create_after_end() {
        let registry = SessionRegistry::new();
        let owner = Caller::broadcaster("mosqueA");

        let first = registry.create(&owner, details()).await.unwrap();
        registry.end(&first.session_id, &owner).await.unwrap();

        let second = registry.create(&owner, details()).await.unwrap();
        assert_ne!(first.session_id, second.session_id);

        let live = registry.list_active().await;
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].session_id, second.session_id);
    }

    #[tokio::test]
    async fn test_concurrent_create_single_winner() {
        let registry = Arc::new(SessionRegistry::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    registry
                        .create(&Caller::broadcaster("mosqueA"), details())
                        .await
                })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                created += 1;
            }
        }

        assert_eq!(created, 1);
        assert_eq!(registry.list_active().await.len(), 1);
    }

    #[tokio::test]
    async fn test_get_unknown_session() {
        let registry = SessionRegistry::new();
        let id = SessionId::new("nope");

        assert_eq!(registry.get(&id).await, Err(Error::SessionNotFound(id)));
    }

    #[tokio::test]
    async fn test_attach_broadcaster() {
        let registry = SessionRegistry::new();
        let owner = Caller::broadcaster("mosqueA");
        let session = registry.create(&owner, details()).await.unwrap();

        let stranger = Caller::broadcaster("mosqueB");
        assert!(matches!(
            registry.attach_broadcaster(&session.session_id, &stranger).await,
            Err(Error::Forbidden { .. })
        ));

        let attached = registry
            .attach_broadcaster(&session.session_id, &owner)
            .await
            .unwrap();
        assert_eq!(attached.status, SessionStatus::Active);

        // Attaching again is harmless
        let again = registry
            .attach_broadcaster(&session.session_id, &owner)
            .await
            .unwrap();
        assert_eq!(again.status, SessionStatus::Active);

        registry.end(&session.session_id, &owner).await.unwrap();
        assert_eq!(
            registry.attach_broadcaster(&session.session_id, &owner).await,
            Err(Error::SessionInactive(session.session_id.clone()))
        );
    }

    #[tokio::test]
    async fn test_end_requires_owner() {
        let registry = SessionRegistry::new();
        let owner = Caller::broadcaster("mosqueA");
        let session = registry.create(&owner, details()).await.unwrap();

        let result = registry
            .end(&session.session_id, &Caller::listener("someone"))
            .await;
        assert!(matches!(result, Err(Error::Forbidden { .. })));

        let current = registry.get(&session.session_id).await.unwrap();
        assert_eq!(current.status, SessionStatus::WaitingForBroadcaster);
    }

    #[tokio::test]
    async fn test_end_is_idempotent() {
        let registry = SessionRegistry::new();
        let owner = Caller::broadcaster("mosqueA");
        let session = registry.create(&owner, details()).await.unwrap();

        let first = registry.end(&session.session_id, &owner).await.unwrap();
        let second = registry.end(&session.session_id, &owner).await.unwrap();

        assert_eq!(first.status, SessionStatus::Ended);
        assert!(first.ended_at.is_some());
        assert_eq!(first.ended_at, second.ended_at);
        assert!(registry.list_active().await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_end() {
        let registry = Arc::new(SessionRegistry::new());
        let owner = Caller::broadcaster("mosqueA");
        let session = registry.create(&owner, details()).await.unwrap();

        let a = {
            let registry = Arc::clone(&registry);
            let id = session.session_id.clone();
            let owner = owner.clone();
            tokio::spawn(async move { registry.end(&id, &owner).await })
        };
        let b = {
            let registry = Arc::clone(&registry);
            let id = session.session_id.clone();
            let owner = owner.clone();
            tokio::spawn(async move { registry.end(&id, &owner).await })
        };

        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();
        assert_eq!(a.ended_at, b.ended_at);
        assert!(a.ended_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_respects_grace_period() {
        let registry = SessionRegistry::new();
        let owner = Caller::broadcaster("mosqueA");
        let session = registry.create(&owner, details()).await.unwrap();
        let id = session.session_id;

        // Live sessions are never purged
        assert!(!registry.purge(&id).await);

        registry.end(&id, &owner).await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(!registry.purge(&id).await);
        assert!(registry.get(&id).await.is_ok());

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(registry.purge(&id).await);
        assert_eq!(registry.get(&id).await, Err(Error::SessionNotFound(id.clone())));

        // Second purge finds nothing
        assert!(!registry.purge(&id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_only_removes_expired() {
        let config = RegistryConfig::default().grace_period(Duration::from_secs(10));
        let registry = SessionRegistry::with_config(config);
        let a = Caller::broadcaster("mosqueA");
        let b = Caller::broadcaster("mosqueB");
        let c = Caller::broadcaster("mosqueC");

        let ended_early = registry.create(&a, details()).await.unwrap().session_id;
        let ended_late = registry.create(&b, details()).await.unwrap().session_id;
        let live = registry.create(&c, details()).await.unwrap().session_id;

        registry.end(&ended_early, &a).await.unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;
        registry.end(&ended_late, &b).await.unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(registry.sweep().await, 1);
        assert!(registry.get(&ended_early).await.is_err());
        assert!(registry.get(&ended_late).await.is_ok());
        assert!(registry.get(&live).await.is_ok());

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(registry.sweep().await, 1);
        assert_eq!(registry.sweep().await, 0);
        assert_eq!(registry.session_count().await, 1);
    }
}
