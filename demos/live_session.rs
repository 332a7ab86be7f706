//! Live translation session walkthrough
//!
//! Run with: cargo run --example live_session
//!
//! Creates a session for one mosque, lets a handful of listeners join in
//! different languages, simulates connection trouble and a language switch,
//! then ends the session and waits for the retention sweeper to purge it.
//! History records are printed as a storage writer would receive them.

use std::sync::Arc;
use std::time::Duration;

use session_presence::{
    Caller, HistoryRecord, JoinRequest, NewSession, ParticipantId, PresenceManager,
    RegistryConfig, SessionRegistry, StatsAggregator,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("session_presence=debug".parse()?)
                .add_directive("live_session=debug".parse()?),
        )
        .init();

    // Short grace period so the demo finishes quickly
    let config = RegistryConfig::default()
        .grace_period(Duration::from_secs(2))
        .sweep_interval(Duration::from_millis(500));
    let (registry, mut history) = SessionRegistry::with_history_channel(config);
    let registry = Arc::new(registry);
    let sweeper = registry.spawn_sweeper();

    let presence = PresenceManager::new(Arc::clone(&registry));
    let stats = StatsAggregator::new(Arc::clone(&registry));

    // Storage writer stand-in
    let writer = tokio::spawn(async move {
        while let Some(record) = history.recv().await {
            match record {
                HistoryRecord::ParticipantLeft(p) => println!(
                    "[history] {} left after {}s ({} events)",
                    p.participant_id,
                    p.total_duration_seconds(),
                    p.events.len()
                ),
                HistoryRecord::SessionEnded { session, stats } => println!(
                    "[history] session {} ended with {} participants",
                    session.session_id, stats.total_participants
                ),
            }
        }
    });

    let mosque = Caller::broadcaster("mosqueA");
    let session = registry
        .create(
            &mosque,
            NewSession::new("Arabic", "Friday khutbah").description("Live translated sermon"),
        )
        .await?;
    let id = session.session_id.clone();
    registry.attach_broadcaster(&id, &mosque).await?;

    let listeners = [("amina", "en"), ("yusuf", "fr"), ("bilal", "ur"), ("sara", "en")];
    for (listener, language) in listeners {
        presence
            .join(&id, JoinRequest::new(ParticipantId::new(listener), language))
            .await?;
    }

    tokio::time::sleep(Duration::from_secs(1)).await;

    let yusuf = ParticipantId::new("yusuf");
    presence.record_disconnection(&id, &yusuf).await?;
    presence
        .record_reconnection(&id, &yusuf, Some(Duration::from_millis(120)))
        .await?;
    presence
        .change_language(&id, &ParticipantId::new("bilal"), "en")
        .await?;
    presence.leave(&id, &ParticipantId::new("sara")).await?;

    for (language, listeners) in presence.listeners_by_language(&id).await? {
        println!("{}: {} listener(s)", language, listeners.len());
    }

    let s = stats.session_stats(&id).await?;
    println!(
        "total={} active={} avg_duration={:.1}s languages={:?}",
        s.total_participants,
        s.active_participants,
        s.average_duration_seconds,
        s.language_distribution
    );

    registry.end(&id, &mosque).await?;
    println!("active sessions after end: {}", registry.list_active().await.len());

    tokio::time::sleep(Duration::from_secs(3)).await;
    println!("session still present: {}", registry.get(&id).await.is_ok());

    // Release every handle on the registry so the history channel closes
    sweeper.abort();
    let _ = sweeper.await;
    drop(presence);
    drop(stats);
    drop(registry);
    writer.await?;

    Ok(())
}
