//! Test doubles and common utilities for contract tests
//!
//! This module provides minimal test doubles that record how the core
//! drives its collaborators without implementing real functionality.

#![allow(dead_code)]

use dd_dns_core::error::{Error, Result};
use dd_dns_core::traits::{
    ContainerAction, ContainerEvent, ContainerEventSource, ContainerEventStream, DnsPublisher,
    MappingStore,
};
use dd_dns_core::{ContainerMapping, EngineConfig, MappingAggregate, MemoryMappingStore};
use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// One publisher call, as seen by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublisherCall {
    Present(String, Ipv4Addr),
    Absent(String, Ipv4Addr),
}

/// A DnsPublisher that records calls and can be told to fail
pub struct RecordingPublisher {
    calls: Arc<Mutex<Vec<PublisherCall>>>,
    /// Records currently live at the simulated provider
    live: Arc<Mutex<BTreeSet<(String, Ipv4Addr)>>>,
    fail_present: Arc<AtomicBool>,
    fail_absent: Arc<AtomicBool>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            live: Arc::new(Mutex::new(BTreeSet::new())),
            fail_present: Arc::new(AtomicBool::new(false)),
            fail_absent: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a publisher that shares calls, records and switches with another
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            calls: Arc::clone(&other.calls),
            live: Arc::clone(&other.live),
            fail_present: Arc::clone(&other.fail_present),
            fail_absent: Arc::clone(&other.fail_absent),
        }
    }

    pub fn calls(&self) -> Vec<PublisherCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn present_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, PublisherCall::Present(..)))
            .count()
    }

    pub fn absent_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, PublisherCall::Absent(..)))
            .count()
    }

    /// Records live at the simulated provider, ordered
    pub fn live_records(&self) -> Vec<(String, Ipv4Addr)> {
        self.live.lock().unwrap().iter().cloned().collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn fail_present(&self, fail: bool) {
        self.fail_present.store(fail, Ordering::SeqCst);
    }

    pub fn fail_absent(&self, fail: bool) {
        self.fail_absent.store(fail, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl DnsPublisher for RecordingPublisher {
    async fn ensure_present(&self, name: &str, address: Ipv4Addr) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(PublisherCall::Present(name.to_string(), address));
        if self.fail_present.load(Ordering::SeqCst) {
            return Err(Error::publish("recording", "injected publish failure"));
        }
        self.live.lock().unwrap().insert((name.to_string(), address));
        Ok(())
    }

    async fn ensure_absent(&self, name: &str, address: Ipv4Addr) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(PublisherCall::Absent(name.to_string(), address));
        if self.fail_absent.load(Ordering::SeqCst) {
            return Err(Error::publish("recording", "injected retract failure"));
        }
        self.live.lock().unwrap().remove(&(name.to_string(), address));
        Ok(())
    }

    fn publisher_name(&self) -> &'static str {
        "recording"
    }
}

/// A ContainerEventSource driven by the test
///
/// `start`/`stop` change the simulated set of running containers and emit
/// the matching event.
pub struct ScriptedEventSource {
    running: Arc<Mutex<BTreeMap<String, ContainerMapping>>>,
    event_tx: mpsc::UnboundedSender<Result<ContainerEvent>>,
    event_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<Result<ContainerEvent>>>>>,
    list_call_count: Arc<AtomicUsize>,
    resolve_call_count: Arc<AtomicUsize>,
    fail_listing: Arc<AtomicBool>,
}

impl ScriptedEventSource {
    pub fn new() -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            running: Arc::new(Mutex::new(BTreeMap::new())),
            event_tx,
            event_rx: Arc::new(Mutex::new(Some(event_rx))),
            list_call_count: Arc::new(AtomicUsize::new(0)),
            resolve_call_count: Arc::new(AtomicUsize::new(0)),
            fail_listing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle sharing the running set, event channel and counters
    pub fn handle(&self) -> Self {
        Self {
            running: Arc::clone(&self.running),
            event_tx: self.event_tx.clone(),
            event_rx: Arc::clone(&self.event_rx),
            list_call_count: Arc::clone(&self.list_call_count),
            resolve_call_count: Arc::clone(&self.resolve_call_count),
            fail_listing: Arc::clone(&self.fail_listing),
        }
    }

    /// Mark a container as running without emitting an event
    pub fn set_running(&self, mapping: ContainerMapping) {
        self.running
            .lock()
            .unwrap()
            .insert(mapping.container_id.clone(), mapping);
    }

    /// Start a container and emit its start event
    pub fn start(&self, mapping: ContainerMapping) {
        let id = mapping.container_id.clone();
        let name = mapping.name.clone();
        self.set_running(mapping);
        self.send(ContainerEvent::new(ContainerAction::Start, id, Some(name)));
    }

    /// Stop a container and emit its die event
    pub fn stop(&self, container_id: &str) {
        self.running.lock().unwrap().remove(container_id);
        self.send(ContainerEvent::new(ContainerAction::Die, container_id, None));
    }

    /// Emit a raw event
    pub fn send(&self, event: ContainerEvent) {
        let _ = self.event_tx.send(Ok(event));
    }

    /// Emit a stream error
    pub fn send_error(&self, error: Error) {
        let _ = self.event_tx.send(Err(error));
    }

    pub fn fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    pub fn list_call_count(&self) -> usize {
        self.list_call_count.load(Ordering::SeqCst)
    }

    pub fn resolve_call_count(&self) -> usize {
        self.resolve_call_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ContainerEventSource for ScriptedEventSource {
    async fn list_running(&self) -> Result<Vec<ContainerMapping>> {
        self.list_call_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(Error::event_source("injected listing failure"));
        }
        Ok(self.running.lock().unwrap().values().cloned().collect())
    }

    async fn resolve(&self, event: &ContainerEvent) -> Result<ContainerMapping> {
        self.resolve_call_count.fetch_add(1, Ordering::SeqCst);
        self.running
            .lock()
            .unwrap()
            .get(&event.container_id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("container {}", event.container_id)))
    }

    fn watch(&self) -> ContainerEventStream {
        let rx = self
            .event_rx
            .lock()
            .unwrap()
            .take()
            .expect("watch() can only be called once");

        Box::pin(tokio_stream::wrappers::UnboundedReceiverStream::new(rx))
    }
}

/// A MemoryMappingStore that counts clean_up() calls
pub struct CountingStore {
    inner: MemoryMappingStore,
    clean_up_count: Arc<AtomicUsize>,
}

impl CountingStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryMappingStore::new(),
            clean_up_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create a store sharing the table and counter with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            inner: other.inner.clone(),
            clean_up_count: Arc::clone(&other.clean_up_count),
        }
    }

    pub fn clean_up_count(&self) -> usize {
        self.clean_up_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl MappingStore for CountingStore {
    async fn insert_mapping(
        &self,
        mapping: &ContainerMapping,
        publisher: &dyn DnsPublisher,
    ) -> Result<()> {
        self.inner.insert_mapping(mapping, publisher).await
    }

    async fn remove_container(&self, container_id: &str, publisher: &dyn DnsPublisher) -> Result<bool> {
        self.inner.remove_container(container_id, publisher).await
    }

    async fn replace_mappings(
        &self,
        observed: &[ContainerMapping],
        publisher: &dyn DnsPublisher,
    ) -> Result<()> {
        self.inner.replace_mappings(observed, publisher).await
    }

    async fn aggregates(&self) -> Result<Vec<MappingAggregate>> {
        self.inner.aggregates().await
    }

    async fn clean_up(&self) -> Result<()> {
        self.clean_up_count.fetch_add(1, Ordering::SeqCst);
        self.inner.clean_up().await
    }
}

/// Shorthand for a mapping
pub fn mapping(name: &str, address: [u8; 4], container_id: &str) -> ContainerMapping {
    ContainerMapping::new(name, Ipv4Addr::from(address), container_id)
}

/// Engine configuration with periodic resync disabled
pub fn engine_config() -> EngineConfig {
    EngineConfig {
        resync_interval_secs: 0,
        event_channel_capacity: 100,
    }
}

/// Give the engine task time to drain its queue
pub async fn settle() {
    tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
}
