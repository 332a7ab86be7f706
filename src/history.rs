//! Durable history forwarding
//!
//! Long-term storage of participant records and session summaries lives
//! outside this crate. The registry hands finished records to a
//! [`HistorySink`] after the in-memory mutation has committed. Sinks must not
//! block: a sink that cannot accept a record drops it and logs, and the
//! in-memory state stays authoritative.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::presence::Participant;
use crate::registry::Session;
use crate::stats::SessionStats;

/// A record bound for durable storage
#[derive(Debug, Clone)]
pub enum HistoryRecord {
    /// A participant left; carries the full record including its events
    ParticipantLeft(Participant),
    /// A session ended
    SessionEnded {
        session: Session,
        stats: SessionStats,
    },
}

impl HistoryRecord {
    pub fn kind(&self) -> &'static str {
        match self {
            HistoryRecord::ParticipantLeft(_) => "participant_left",
            HistoryRecord::SessionEnded { .. } => "session_ended",
        }
    }
}

/// Destination for history records
///
/// `forward` is called from inside registry operations and must return
/// without waiting on I/O.
pub trait HistorySink: Send + Sync + 'static {
    fn forward(&self, record: HistoryRecord);
}

/// Sink that discards every record
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl HistorySink for NoopSink {
    fn forward(&self, _record: HistoryRecord) {}
}

/// Sink that queues records on a bounded channel for a writer task
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<HistoryRecord>,
}

impl ChannelSink {
    /// Create a sink and the receiver a storage writer should drain
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<HistoryRecord>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl HistorySink for ChannelSink {
    fn forward(&self, record: HistoryRecord) {
        match self.tx.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(record)) => {
                tracing::warn!(kind = record.kind(), "History queue full, record dropped");
            }
            Err(TrySendError::Closed(record)) => {
                tracing::warn!(kind = record.kind(), "History writer gone, record dropped");
            }
        }
    }
}
