//! Participant records
//!
//! A participant is one listener's presence inside one session. Records are
//! owned by the session entry they belong to and are only mutated while that
//! entry's lock is held. Every mutating method appends exactly one event, so
//! a reader holding the lock never sees a state change without its event.

use std::net::IpAddr;
use std::time::Duration;

use tokio::time::Instant;

use crate::registry::SessionId;

use super::manager::JoinRequest;

/// Stability score a fresh connection starts with
pub const MAX_STABILITY_SCORE: u8 = 100;

/// Score lost per disconnection
const DISCONNECT_PENALTY: u8 = 10;

/// Score regained per reconnection
const RECONNECT_CREDIT: u8 = 5;

/// Opaque unique identifier for a participant
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transport metadata captured at join time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub address: Option<IpAddr>,
    pub user_agent: Option<String>,
    /// Free-form device class reported by the client ("mobile", "web", ...)
    pub device_type: Option<String>,
}

/// Listener preferences
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preferences {
    /// Language translations are delivered in
    pub preferred_language: String,
    /// Fallback language
    pub secondary_language: Option<String>,
    pub audio_enabled: bool,
    pub subtitles_enabled: bool,
    /// Playback volume, 0..=100
    pub volume: u8,
}

impl Preferences {
    pub fn new(preferred_language: impl Into<String>) -> Self {
        Self {
            preferred_language: preferred_language.into(),
            secondary_language: None,
            audio_enabled: true,
            subtitles_enabled: true,
            volume: 100,
        }
    }
}

/// Partial preference update
///
/// `None` leaves the field unchanged. `secondary_language: Some(None)` clears
/// the fallback language.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreferencesUpdate {
    pub preferred_language: Option<String>,
    pub secondary_language: Option<Option<String>>,
    pub audio_enabled: Option<bool>,
    pub subtitles_enabled: Option<bool>,
    pub volume: Option<u8>,
}

impl PreferencesUpdate {
    pub fn preferred_language(mut self, language: impl Into<String>) -> Self {
        self.preferred_language = Some(language.into());
        self
    }

    pub fn secondary_language(mut self, language: Option<String>) -> Self {
        self.secondary_language = Some(language);
        self
    }

    pub fn audio_enabled(mut self, enabled: bool) -> Self {
        self.audio_enabled = Some(enabled);
        self
    }

    pub fn subtitles_enabled(mut self, enabled: bool) -> Self {
        self.subtitles_enabled = Some(enabled);
        self
    }

    pub fn volume(mut self, volume: u8) -> Self {
        self.volume = Some(volume);
        self
    }
}

/// Connection quality bookkeeping
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionQuality {
    /// 0..=100, lowered by disconnections
    pub stability_score: u8,
    /// Running mean of latency samples reported on reconnection
    pub average_latency: Option<Duration>,
    pub latency_samples: u32,
    pub disconnection_count: u32,
    pub last_disconnection_at: Option<Instant>,
}

impl Default for ConnectionQuality {
    fn default() -> Self {
        Self {
            stability_score: MAX_STABILITY_SCORE,
            average_latency: None,
            latency_samples: 0,
            disconnection_count: 0,
            last_disconnection_at: None,
        }
    }
}

impl ConnectionQuality {
    fn add_latency_sample(&mut self, sample: Duration) {
        let n = self.latency_samples;
        let mean = match self.average_latency {
            Some(avg) => running_mean(avg, n, sample),
            None => sample,
        };
        self.average_latency = Some(mean);
        self.latency_samples = n.saturating_add(1);
    }
}

/// `(avg * n + sample) / (n + 1)` in u128 nanoseconds
///
/// The result never exceeds `max(avg, sample)`, so it always fits a `Duration`.
fn running_mean(avg: Duration, n: u32, sample: Duration) -> Duration {
    const NANOS_PER_SEC: u128 = 1_000_000_000;

    let n = u128::from(n);
    let total = avg.as_nanos() * n + sample.as_nanos();
    let mean = total / (n + 1);
    Duration::new((mean / NANOS_PER_SEC) as u64, (mean % NANOS_PER_SEC) as u32)
}

/// What happened to a participant
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    Joined {
        language: String,
    },
    Left {
        /// Length of the stint that just ended
        duration: Duration,
    },
    Disconnected {
        disconnection_count: u32,
    },
    Reconnected {
        latency: Option<Duration>,
    },
    LanguageChanged {
        from: String,
        to: String,
    },
    PreferencesUpdated {
        /// Names of the fields present in the update
        fields: Vec<&'static str>,
    },
}

impl EventKind {
    /// Wire name of the event type
    pub fn event_type(&self) -> &'static str {
        match self {
            EventKind::Joined { .. } => "joined",
            EventKind::Left { .. } => "left",
            EventKind::Disconnected { .. } => "disconnected",
            EventKind::Reconnected { .. } => "reconnected",
            EventKind::LanguageChanged { .. } => "language_changed",
            EventKind::PreferencesUpdated { .. } => "preferences_updated",
        }
    }
}

/// One entry in a participant's audit trail
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantEvent {
    pub at: Instant,
    pub kind: EventKind,
}

/// A listener's presence record within a session
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    pub participant_id: ParticipantId,
    pub session_id: SessionId,
    /// Account id, `None` for anonymous listeners
    pub user_id: Option<String>,
    pub preferences: Preferences,
    pub connection: ConnectionInfo,
    pub quality: ConnectionQuality,
    pub joined_at: Instant,
    pub left_at: Option<Instant>,
    pub last_activity_at: Instant,
    pub is_active: bool,
    /// Time spent joined across all completed stints
    pub total_duration: Duration,
    /// Append-only audit trail
    pub events: Vec<ParticipantEvent>,
}

impl Participant {
    /// Create an active participant and record its `joined` event
    pub(crate) fn join(
        participant_id: ParticipantId,
        session_id: SessionId,
        user_id: Option<String>,
        preferences: Preferences,
        connection: ConnectionInfo,
        now: Instant,
    ) -> Self {
        let language = preferences.preferred_language.clone();
        let mut participant = Self {
            participant_id,
            session_id,
            user_id,
            preferences,
            connection,
            quality: ConnectionQuality::default(),
            joined_at: now,
            left_at: None,
            last_activity_at: now,
            is_active: true,
            total_duration: Duration::ZERO,
            events: Vec::new(),
        };
        participant.push(now, EventKind::Joined { language });
        participant
    }

    pub fn preferred_language(&self) -> &str {
        &self.preferences.preferred_language
    }

    pub fn secondary_language(&self) -> Option<&str> {
        self.preferences.secondary_language.as_deref()
    }

    /// Whole seconds spent in the session over completed stints
    pub fn total_duration_seconds(&self) -> u64 {
        self.total_duration.as_secs()
    }

    /// The most recent event
    pub fn last_event(&self) -> Option<&ParticipantEvent> {
        self.events.last()
    }

    fn push(&mut self, at: Instant, kind: EventKind) {
        self.last_activity_at = at;
        self.events.push(ParticipantEvent { at, kind });
    }

    /// Refresh the activity timestamp without recording an event
    pub(crate) fn touch(&mut self, now: Instant) {
        self.last_activity_at = now;
    }

    /// Reactivate a participant that previously left
    ///
    /// The request's language and connection replace the stored ones. A
    /// secondary language or user id is only replaced when the request has one.
    pub(crate) fn rejoin(&mut self, request: JoinRequest, now: Instant) {
        self.is_active = true;
        self.joined_at = now;
        self.left_at = None;
        self.connection = request.connection;
        if request.secondary_language.is_some() {
            self.preferences.secondary_language = request.secondary_language;
        }
        if request.user_id.is_some() {
            self.user_id = request.user_id;
        }
        self.preferences.preferred_language = request.preferred_language.clone();
        self.push(
            now,
            EventKind::Joined {
                language: request.preferred_language,
            },
        );
    }

    /// Mark the participant as gone; returns the length of the finished stint
    ///
    /// Leaving again while inactive records a zero-length `left` event and
    /// keeps `left_at` and `total_duration` as they were.
    pub(crate) fn leave(&mut self, now: Instant) -> Duration {
        if !self.is_active {
            self.push(now, EventKind::Left { duration: Duration::ZERO });
            return Duration::ZERO;
        }

        let stint = now.saturating_duration_since(self.joined_at);
        self.is_active = false;
        self.left_at = Some(now);
        self.total_duration += stint;
        self.push(now, EventKind::Left { duration: stint });
        stint
    }

    pub(crate) fn record_disconnection(&mut self, now: Instant) {
        let quality = &mut self.quality;
        quality.disconnection_count = quality.disconnection_count.saturating_add(1);
        quality.last_disconnection_at = Some(now);
        quality.stability_score = quality.stability_score.saturating_sub(DISCONNECT_PENALTY);

        let disconnection_count = quality.disconnection_count;
        self.push(now, EventKind::Disconnected { disconnection_count });
    }

    pub(crate) fn record_reconnection(&mut self, latency: Option<Duration>, now: Instant) {
        let quality = &mut self.quality;
        if let Some(sample) = latency {
            quality.add_latency_sample(sample);
        }
        quality.stability_score = quality
            .stability_score
            .saturating_add(RECONNECT_CREDIT)
            .min(MAX_STABILITY_SCORE);
        self.push(now, EventKind::Reconnected { latency });
    }

    /// Switch preferred language; returns the previous one
    pub(crate) fn change_language(&mut self, language: String, now: Instant) -> String {
        let from = std::mem::replace(&mut self.preferences.preferred_language, language.clone());
        self.push(
            now,
            EventKind::LanguageChanged {
                from: from.clone(),
                to: language,
            },
        );
        from
    }

    /// Merge a partial update into the preferences
    pub(crate) fn update_preferences(&mut self, update: PreferencesUpdate, now: Instant) {
        let prefs = &mut self.preferences;
        let mut fields = Vec::new();

        if let Some(language) = update.preferred_language {
            prefs.preferred_language = language;
            fields.push("preferred_language");
        }
        if let Some(language) = update.secondary_language {
            prefs.secondary_language = language;
            fields.push("secondary_language");
        }
        if let Some(enabled) = update.audio_enabled {
            prefs.audio_enabled = enabled;
            fields.push("audio_enabled");
        }
        if let Some(enabled) = update.subtitles_enabled {
            prefs.subtitles_enabled = enabled;
            fields.push("subtitles_enabled");
        }
        if let Some(volume) = update.volume {
            prefs.volume = volume.min(100);
            fields.push("volume");
        }

        self.push(now, EventKind::PreferencesUpdated { fields });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(now: Instant) -> Participant {
        Participant::join(
            ParticipantId::new("p1"),
            SessionId::new("s1"),
            None,
            Preferences::new("en"),
            ConnectionInfo::default(),
            now,
        )
    }

    #[test]
    fn test_join_records_event() {
        let now = Instant::now();
        let p = participant(now);

        assert!(p.is_active);
        assert_eq!(p.events.len(), 1);
        assert_eq!(p.events[0].kind.event_type(), "joined");
        assert_eq!(p.quality.stability_score, MAX_STABILITY_SCORE);
    }

    #[test]
    fn test_leave_accumulates_duration() {
        let start = Instant::now();
        let mut p = participant(start);

        let stint = p.leave(start + Duration::from_secs(30));
        assert_eq!(stint, Duration::from_secs(30));

        let request = JoinRequest::new(ParticipantId::new("p1"), "en");
        p.rejoin(request, start + Duration::from_secs(40));
        p.leave(start + Duration::from_secs(50));

        assert_eq!(p.total_duration_seconds(), 40);
        assert!(!p.is_active);
        let types: Vec<_> = p.events.iter().map(|e| e.kind.event_type()).collect();
        assert_eq!(types, ["joined", "left", "joined", "left"]);
    }

    #[test]
    fn test_quality_score_clamped() {
        let now = Instant::now();
        let mut p = participant(now);

        for _ in 0..12 {
            p.record_disconnection(now);
        }
        assert_eq!(p.quality.stability_score, 0);
        assert_eq!(p.quality.disconnection_count, 12);

        for _ in 0..30 {
            p.record_reconnection(None, now);
        }
        assert_eq!(p.quality.stability_score, MAX_STABILITY_SCORE);
        assert!(p.is_active);
    }

    #[test]
    fn test_latency_running_mean() {
        let now = Instant::now();
        let mut p = participant(now);

        p.record_reconnection(Some(Duration::from_millis(100)), now);
        p.record_reconnection(Some(Duration::from_millis(200)), now);
        p.record_reconnection(None, now);

        assert_eq!(p.quality.average_latency, Some(Duration::from_millis(150)));
        assert_eq!(p.quality.latency_samples, 2);
    }

    #[test]
    fn test_repeated_leave_records_zero_stint() {
        let start = Instant::now();
        let mut p = participant(start);
        p.leave(start + Duration::from_secs(10));

        let stint = p.leave(start + Duration::from_secs(25));

        assert_eq!(stint, Duration::ZERO);
        assert_eq!(p.total_duration_seconds(), 10);
        assert_eq!(p.left_at, Some(start + Duration::from_secs(10)));
        assert_eq!(p.events.len(), 3);
        assert_eq!(
            p.last_event().map(|e| e.kind.clone()),
            Some(EventKind::Left {
                duration: Duration::ZERO
            })
        );
    }

    #[test]
    fn test_rejoin_applies_request() {
        let now = Instant::now();
        let mut p = participant(now);
        p.user_id = Some("u1".into());
        p.leave(now);

        p.rejoin(JoinRequest::new(ParticipantId::new("p1"), "fr"), now);
        assert_eq!(p.user_id.as_deref(), Some("u1"));
        assert_eq!(p.secondary_language(), None);
        p.leave(now);

        let request = JoinRequest::new(ParticipantId::new("p1"), "fr")
            .secondary_language("ar")
            .user("u9");
        p.rejoin(request, now);

        assert_eq!(p.preferred_language(), "fr");
        assert_eq!(p.secondary_language(), Some("ar"));
        assert_eq!(p.user_id.as_deref(), Some("u9"));
    }

    #[test]
    fn test_extreme_latency_samples() {
        let now = Instant::now();
        let mut p = participant(now);
        p.record_disconnection(now);
        let huge = Duration::from_secs(u64::MAX / 2 + 1);

        p.record_reconnection(Some(huge), now);
        p.record_reconnection(Some(huge), now);
        p.record_reconnection(Some(Duration::MAX), now);

        assert_eq!(p.quality.latency_samples, 3);
        let avg = p.quality.average_latency.unwrap();
        assert!(avg >= huge && avg <= Duration::MAX);
        assert_eq!(p.quality.stability_score, MAX_STABILITY_SCORE);
        assert_eq!(p.events.len(), 5);
    }

    #[test]
    fn test_preferences_merge() {
        let now = Instant::now();
        let mut p = participant(now);
        p.preferences.secondary_language = Some("ar".into());

        p.update_preferences(PreferencesUpdate::default().volume(150).audio_enabled(false), now);

        assert_eq!(p.preferences.volume, 100);
        assert!(!p.preferences.audio_enabled);
        assert!(p.preferences.subtitles_enabled);
        assert_eq!(p.preferred_language(), "en");
        assert_eq!(p.secondary_language(), Some("ar"));
        assert_eq!(
            p.last_event().map(|e| e.kind.clone()),
            Some(EventKind::PreferencesUpdated {
                fields: vec!["audio_enabled", "volume"]
            })
        );
    }
}
