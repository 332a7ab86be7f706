//! Retention sweeper
//!
//! Ended sessions stay readable for the configured grace period. The sweeper
//! wakes on a fixed interval and purges the ones whose grace period has run
//! out. A tick that finds an entry locked skips it; the next tick picks it up.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::store::SessionRegistry;

/// Background task that purges expired sessions
pub struct RetentionSweeper {
    registry: Arc<SessionRegistry>,
    interval: Duration,
}

impl RetentionSweeper {
    /// Create a sweeper using the registry's configured interval
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        let interval = registry.config().sweep_interval;
        Self { registry, interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Sweep forever
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            self.registry.sweep().await;
        }
    }

    /// Sweep until `shutdown` resolves
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tracing::debug!(
            interval_ms = self.interval.as_millis() as u64,
            "Retention sweeper started"
        );

        tokio::select! {
            _ = shutdown => {
                tracing::debug!("Retention sweeper stopped");
            }
            _ = self.run() => {}
        }
    }

    /// Spawn the sweeper on the current runtime
    ///
    /// Returns a handle that can be used to abort the task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

impl SessionRegistry {
    /// Spawn a background retention sweeper for this registry
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        RetentionSweeper::new(Arc::clone(self)).spawn()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::identity::Caller;
    use crate::registry::{NewSession, RegistryConfig};

    #[tokio::test(start_paused = true)]
    async fn test_spawned_sweeper_purges_after_grace_period() {
        let registry = Arc::new(SessionRegistry::new());
        let owner = Caller::broadcaster("mosqueA");
        let session = registry
            .create(&owner, NewSession::new("Arabic", "Asr"))
            .await
            .unwrap();
        let id = session.session_id;

        let handle = registry.spawn_sweeper();
        registry.end(&id, &owner).await.unwrap();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(registry.get(&id).await.is_ok());

        tokio::time::sleep(Duration::from_secs(45)).await;
        assert_eq!(registry.get(&id).await, Err(Error::SessionNotFound(id.clone())));

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_stops_on_shutdown() {
        let config = RegistryConfig::default().sweep_interval(Duration::from_secs(1));
        let registry = Arc::new(SessionRegistry::with_config(config));
        let sweeper = RetentionSweeper::new(Arc::clone(&registry));
        assert_eq!(sweeper.interval(), Duration::from_secs(1));

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(sweeper.run_until(async move {
            let _ = rx.await;
        }));

        tokio::time::sleep(Duration::from_secs(3)).await;
        tx.send(()).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_leaves_live_sessions() {
        let registry = Arc::new(SessionRegistry::new());
        let owner = Caller::broadcaster("mosqueA");
        let session = registry
            .create(&owner, NewSession::new("Arabic", "Asr"))
            .await
            .unwrap();

        let handle = registry.spawn_sweeper();
        tokio::time::sleep(Duration::from_secs(600)).await;

        assert!(registry.get(&session.session_id).await.is_ok());
        handle.abort();
    }
}
