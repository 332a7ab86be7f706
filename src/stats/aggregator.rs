//! Session statistics
//!
//! Rollups are computed on demand from a session's participant table while
//! holding the session's read lock. Nothing here mutates a record.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::Result;
use crate::registry::{SessionEntry, SessionId, SessionRegistry, SessionStatus};

/// Aggregate statistics for one session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStats {
    pub session_id: SessionId,
    pub status: SessionStatus,
    /// Everyone who ever joined, active or not
    pub total_participants: usize,
    /// Participants currently joined
    pub active_participants: usize,
    /// Mean time spent by participants who have left (0.0 if nobody has)
    pub average_duration_seconds: f64,
    /// Preferred language -> number of participants holding it
    pub language_distribution: BTreeMap<String, usize>,
    /// Time since the session started, frozen once it ends
    pub session_duration: Duration,
}

impl SessionStats {
    /// Compute stats from a locked entry
    pub fn from_entry(entry: &SessionEntry, now: Instant) -> Self {
        let mut language_distribution = BTreeMap::new();
        let mut left = 0u32;
        let mut left_total = Duration::ZERO;

        for participant in entry.participants.values() {
            *language_distribution
                .entry(participant.preferred_language().to_string())
                .or_insert(0) += 1;

            if !participant.is_active {
                left += 1;
                left_total += participant.total_duration;
            }
        }

        let average_duration_seconds = if left > 0 {
            left_total.as_secs_f64() / f64::from(left)
        } else {
            0.0
        };

        Self {
            session_id: entry.session_id.clone(),
            status: entry.status,
            total_participants: entry.participants.len(),
            active_participants: entry.active.len(),
            average_duration_seconds,
            language_distribution,
            session_duration: entry.duration(now),
        }
    }
}

/// On-demand stats over the registry
#[derive(Clone)]
pub struct StatsAggregator {
    registry: Arc<SessionRegistry>,
}

impl StatsAggregator {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Compute statistics for a session
    pub async fn session_stats(&self, session_id: &SessionId) -> Result<SessionStats> {
        let entry_arc = self.registry.entry(session_id).await?;
        let entry = entry_arc.read().await;
        Ok(SessionStats::from_entry(&entry, Instant::now()))
    }
}
