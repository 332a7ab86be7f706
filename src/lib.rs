//! Session presence and lifecycle registry for live translated broadcasts
//!
//! A mosque broadcasts a session; listeners join it, each with their own
//! language preference. This crate tracks who is in which session and how the
//! session moves through its lifecycle, under concurrent access from request
//! handlers and real-time connection events.
//!
//! - [`SessionRegistry`] creates, ends and purges sessions and enforces one
//!   live session per broadcaster.
//! - [`PresenceManager`] handles join, leave, reconnection and preference
//!   changes for listeners.
//! - [`RetentionSweeper`] purges ended sessions after their grace period.
//! - [`StatsAggregator`] computes read-only rollups.
//!
//! Transport, authentication and durable storage are left to the caller.
//!
//! ```no_run
//! use std::sync::Arc;
//! use session_presence::{
//!     Caller, JoinRequest, NewSession, ParticipantId, PresenceManager, SessionRegistry,
//! };
//!
//! # async fn demo() -> session_presence::Result<()> {
//! let registry = Arc::new(SessionRegistry::new());
//! let _sweeper = registry.spawn_sweeper();
//! let presence = PresenceManager::new(Arc::clone(&registry));
//!
//! let mosque = Caller::broadcaster("mosqueA");
//! let session = registry.create(&mosque, NewSession::new("Arabic", "Jumu'ah")).await?;
//! presence
//!     .join(&session.session_id, JoinRequest::new(ParticipantId::new("p1"), "en"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod history;
pub mod identity;
pub mod presence;
pub mod registry;
pub mod stats;

pub use error::{Error, ErrorKind, Result};
pub use history::{ChannelSink, HistoryRecord, HistorySink, NoopSink};
pub use identity::{AccountType, Caller};
pub use presence::{
    ConnectionInfo, EventKind, JoinRequest, Participant, ParticipantId, PreferencesUpdate,
    PresenceManager,
};
pub use registry::{
    NewSession, RegistryConfig, RetentionSweeper, Session, SessionId, SessionRegistry,
    SessionStatus,
};
pub use stats::{SessionStats, StatsAggregator};
