//! Session registry
//!
//! The registry owns every session and its participant table and is the only
//! synchronization boundary for session state. Callers never hold a session
//! directly; they look it up by id and receive snapshots.
//!
//! # Architecture
//!
//! ```text
//!                        Arc<SessionRegistry>
//!                 ┌───────────────────────────────┐
//!                 │ sessions: HashMap<SessionId,  │
//!                 │   RwLock<SessionEntry {       │
//!                 │     status, active,           │
//!                 │     participants,             │
//!                 │   }>                          │
//!                 │ >                             │
//!                 │ live_broadcasters             │
//!                 └───────────────┬───────────────┘
//!                                 │
//!         ┌───────────────────────┼───────────────────────┐
//!         │                       │                       │
//!         ▼                       ▼                       ▼
//!   [PresenceManager]      [StatsAggregator]      [RetentionSweeper]
//!   join / leave           session_stats()        sweep() every tick
//! ```
//!
//! # Lifecycle
//!
//! `waiting_for_broadcaster -> active -> ended -> purged`. An ended session
//! rejects every mutation and stays readable for the grace period, after
//! which the sweeper removes it together with its participants.

pub mod config;
pub mod entry;
pub mod session;
pub mod store;
pub mod sweeper;

pub use config::RegistryConfig;
pub use entry::SessionEntry;
pub use session::{NewSession, Session, SessionId, SessionStatus};
pub use store::SessionRegistry;
pub use sweeper::RetentionSweeper;
