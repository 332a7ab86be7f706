//! Participant presence
//!
//! Listeners join and leave sessions, drop and regain their connection, and
//! change language while a session runs. Every one of these transitions is
//! applied under the owning session's lock and appended to the participant's
//! event log in the same step.

pub mod manager;
pub mod participant;

pub use manager::{JoinRequest, PresenceManager};
pub use participant::{
    ConnectionInfo, ConnectionQuality, EventKind, Participant, ParticipantEvent, ParticipantId,
    Preferences, PreferencesUpdate,
};
