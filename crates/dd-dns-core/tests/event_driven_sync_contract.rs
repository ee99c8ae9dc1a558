//! Contract Test: Event-Driven Sync
//!
//! This test verifies how the engine turns container inventory and
//! lifecycle events into store operations.
//!
//! Constraints verified:
//! - Startup reconciles the store against every running labelled container
//! - A start event publishes, a die event retracts (reference counted)
//! - Containers that cannot be resolved are skipped, not fatal
//! - Publisher, listing and event stream failures stop the engine
//! - An idle engine makes no publisher calls
//!
//! If this test fails, records go stale or the daemon keeps running with
//! a DNS zone it no longer tracks.

mod common;

use common::*;
use dd_dns_core::traits::{ContainerAction, ContainerEvent};
use dd_dns_core::{EngineConfig, EngineEvent, Error, MappingStore, SyncEngine};
use std::net::Ipv4Addr;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Duration, timeout};

struct Harness {
    source: ScriptedEventSource,
    publisher: RecordingPublisher,
    store: CountingStore,
    events: mpsc::Receiver<EngineEvent>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<dd_dns_core::Result<()>>,
}

/// Spawn an engine over the given doubles
fn spawn_engine(
    source: ScriptedEventSource,
    publisher: RecordingPublisher,
    store: CountingStore,
    config: EngineConfig,
) -> Harness {
    let (engine, events) = SyncEngine::new(
        Box::new(source.handle()),
        Box::new(RecordingPublisher::sharing_counters_with(&publisher)),
        Box::new(CountingStore::sharing_counters_with(&store)),
        &config,
    )
    .expect("engine construction succeeds");

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle = tokio::spawn(async move { engine.run_with_shutdown(Some(shutdown_rx)).await });

    Harness {
        source,
        publisher,
        store,
        events,
        shutdown: Some(shutdown_tx),
        handle,
    }
}

impl Harness {
    fn start(source: ScriptedEventSource) -> Self {
        spawn_engine(
            source,
            RecordingPublisher::new(),
            CountingStore::new(),
            engine_config(),
        )
    }

    /// Wait for the first engine event matching `predicate`
    async fn wait_for(&mut self, predicate: impl Fn(&EngineEvent) -> bool) -> EngineEvent {
        timeout(Duration::from_secs(5), async {
            loop {
                match self.events.recv().await {
                    Some(event) if predicate(&event) => return event,
                    Some(_) => continue,
                    None => panic!("engine event channel closed"),
                }
            }
        })
        .await
        .expect("engine event arrives in time")
    }

    async fn stop(mut self) -> dd_dns_core::Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("engine stops in time")
            .expect("engine task does not panic")
    }

    async fn finish(self) -> dd_dns_core::Result<()> {
        timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("engine stops on its own")
            .expect("engine task does not panic")
    }
}

fn is_reconciled(event: &EngineEvent) -> bool {
    matches!(event, EngineEvent::Reconciled { .. })
}

#[tokio::test]
async fn startup_reconciles_running_containers() {
    let source = ScriptedEventSource::new();
    source.set_running(mapping("a.example.com", [10, 0, 0, 1], "a"));
    source.set_running(mapping("b.example.com", [10, 0, 0, 2], "b"));

    // Left over from a previous run; its container is gone
    let store = CountingStore::new();
    let publisher = RecordingPublisher::new();
    store
        .insert_mapping(&mapping("stale.example.com", [10, 0, 0, 9], "gone"), &publisher)
        .await
        .unwrap();
    publisher.clear_calls();

    let mut harness = spawn_engine(source, publisher, store, engine_config());

    let event = harness.wait_for(is_reconciled).await;
    assert_eq!(
        event,
        EngineEvent::Reconciled {
            containers: 2,
            records: 2
        }
    );

    assert_eq!(
        harness.publisher.calls(),
        vec![
            PublisherCall::Present("a.example.com".to_string(), Ipv4Addr::new(10, 0, 0, 1)),
            PublisherCall::Present("b.example.com".to_string(), Ipv4Addr::new(10, 0, 0, 2)),
            PublisherCall::Absent("stale.example.com".to_string(), Ipv4Addr::new(10, 0, 0, 9)),
        ]
    );
    assert_eq!(harness.source.list_call_count(), 1);

    harness.stop().await.unwrap();
}

#[tokio::test]
async fn start_event_publishes_and_die_event_retracts() {
    let mut harness = Harness::start(ScriptedEventSource::new());
    harness.wait_for(is_reconciled).await;

    let web = mapping("web.example.com", [10, 0, 0, 5], "c1");
    harness.source.start(web.clone());
    let inserted = harness
        .wait_for(|e| matches!(e, EngineEvent::MappingInserted { .. }))
        .await;
    assert_eq!(inserted, EngineEvent::MappingInserted { mapping: web });
    assert_eq!(
        harness.publisher.live_records(),
        vec![("web.example.com".to_string(), Ipv4Addr::new(10, 0, 0, 5))]
    );

    harness.source.stop("c1");
    harness
        .wait_for(|e| matches!(e, EngineEvent::MappingRemoved { .. }))
        .await;
    assert!(harness.publisher.live_records().is_empty());
    assert!(harness.store.aggregates().await.unwrap().is_empty());

    harness.stop().await.unwrap();
}

#[tokio::test]
async fn shared_name_survives_one_container_dying() {
    let mut harness = Harness::start(ScriptedEventSource::new());
    harness.wait_for(is_reconciled).await;

    harness.source.start(mapping("web.example.com", [10, 0, 0, 5], "c1"));
    harness.source.start(mapping("web.example.com", [10, 0, 0, 5], "c2"));
    harness.source.stop("c1");
    harness
        .wait_for(|e| matches!(e, EngineEvent::MappingRemoved { .. }))
        .await;

    assert_eq!(harness.publisher.present_count(), 1);
    assert_eq!(harness.publisher.absent_count(), 0);
    let aggregates = harness.store.aggregates().await.unwrap();
    assert_eq!(aggregates[0].container_ids, vec!["c2"]);

    harness.stop().await.unwrap();
}

#[tokio::test]
async fn unresolvable_start_is_skipped() {
    let mut harness = Harness::start(ScriptedEventSource::new());
    harness.wait_for(is_reconciled).await;

    // Container already gone by the time it is inspected
    harness.source.send(ContainerEvent::new(
        ContainerAction::Start,
        "vanished",
        Some("gone.example.com".to_string()),
    ));
    let skipped = harness
        .wait_for(|e| matches!(e, EngineEvent::EventSkipped { .. }))
        .await;
    match skipped {
        EngineEvent::EventSkipped { container_id, .. } => assert_eq!(container_id, "vanished"),
        other => panic!("unexpected event: {:?}", other),
    }

    // Engine keeps serving events
    harness.source.start(mapping("web.example.com", [10, 0, 0, 5], "c1"));
    harness
        .wait_for(|e| matches!(e, EngineEvent::MappingInserted { .. }))
        .await;
    assert_eq!(harness.publisher.present_count(), 1);

    harness.stop().await.unwrap();
}

#[tokio::test]
async fn die_of_untracked_container_is_harmless() {
    let mut harness = Harness::start(ScriptedEventSource::new());
    harness.wait_for(is_reconciled).await;

    harness.source.stop("never-seen");
    let skipped = harness
        .wait_for(|e| {
            matches!(e, EngineEvent::MappingRemoved { .. } | EngineEvent::EventSkipped { .. })
        })
        .await;
    assert_eq!(
        skipped,
        EngineEvent::EventSkipped {
            container_id: "never-seen".to_string(),
            reason: "container not tracked".to_string(),
        }
    );
    assert_eq!(harness.publisher.call_count(), 0);

    harness.stop().await.unwrap();
}

#[tokio::test]
async fn publisher_failure_stops_engine_and_cleans_up() {
    let mut harness = Harness::start(ScriptedEventSource::new());
    harness.wait_for(is_reconciled).await;

    harness.publisher.fail_present(true);
    harness.source.start(mapping("web.example.com", [10, 0, 0, 5], "c1"));

    let stopped = harness
        .wait_for(|e| matches!(e, EngineEvent::Stopped { .. }))
        .await;
    assert!(matches!(stopped, EngineEvent::Stopped { reason } if reason.contains("Publish failed")));

    let store_clean_ups = harness.store.clean_up_count();
    let result = harness.finish().await;
    assert!(matches!(result, Err(Error::Publish { .. })), "got {:?}", result);
    assert_eq!(store_clean_ups, 1);
}

#[tokio::test]
async fn event_stream_error_is_fatal() {
    let harness = Harness::start(ScriptedEventSource::new());

    harness
        .source
        .send_error(Error::event_source("docker daemon went away"));

    let store = CountingStore::sharing_counters_with(&harness.store);
    let result = harness.finish().await;
    assert!(matches!(result, Err(Error::EventSource(_))), "got {:?}", result);
    assert_eq!(store.clean_up_count(), 1);
}

#[tokio::test]
async fn listing_failure_at_startup_is_fatal() {
    let source = ScriptedEventSource::new();
    source.fail_listing(true);
    let harness = Harness::start(source);

    let store = CountingStore::sharing_counters_with(&harness.store);
    let result = harness.finish().await;
    assert!(matches!(result, Err(Error::EventSource(_))), "got {:?}", result);
    assert_eq!(store.clean_up_count(), 1);
}

#[tokio::test]
async fn idle_engine_makes_no_publisher_calls() {
    let mut harness = Harness::start(ScriptedEventSource::new());
    harness.wait_for(is_reconciled).await;

    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(harness.publisher.call_count(), 0);
    assert_eq!(harness.source.list_call_count(), 1, "no polling without resync");
    assert_eq!(harness.source.resolve_call_count(), 0);

    harness.stop().await.unwrap();
}

#[tokio::test]
async fn periodic_resync_picks_up_missed_containers() {
    let config = EngineConfig {
        resync_interval_secs: 1,
        event_channel_capacity: 100,
    };
    let mut harness = spawn_engine(
        ScriptedEventSource::new(),
        RecordingPublisher::new(),
        CountingStore::new(),
        config,
    );
    harness.wait_for(is_reconciled).await;

    // Started without an event reaching us
    harness
        .source
        .set_running(mapping("web.example.com", [10, 0, 0, 5], "c1"));

    let event = harness.wait_for(is_reconciled).await;
    assert_eq!(
        event,
        EngineEvent::Reconciled {
            containers: 1,
            records: 1
        }
    );
    assert!(harness.source.list_call_count() >= 2);
    assert_eq!(harness.publisher.present_count(), 1);

    harness.stop().await.unwrap();
}
