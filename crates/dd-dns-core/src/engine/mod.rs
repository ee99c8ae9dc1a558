//! Container sync engine
//!
//! The SyncEngine is responsible for:
//! - Reconciling the mapping store against the running containers at startup
//! - Turning container start/die events into store insertions and removals
//! - Optionally re-reconciling on a fixed interval
//! - Flushing the store on shutdown
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │ ContainerEventSource │─── ContainerEvent ───┐
//! └──────────────────────┘                      │
//!                                               ▼
//!                                      ┌──────────────┐
//!                                      │  SyncEngine  │
//!                                      └──────────────┘
//!                                               │
//!                     ┌─────────────────────────┼──────────────────┐
//!                     │                         │                  │
//!                     ▼                         ▼                  ▼
//!             ┌──────────────┐         ┌──────────────┐    ┌─────────────┐
//!             │ MappingStore │────────▶│ DnsPublisher │    │   Events    │
//!             │ (refcount)   │         │ (A records)  │    │  (notify)   │
//!             └──────────────┘         └──────────────┘    └─────────────┘
//! ```
//!
//! ## Event Flow
//!
//! 1. Start event: resolve the container to a mapping, insert it
//! 2. Die event: remove the container by id
//! 3. The store decides whether the publisher is called
//! 4. Emit event for monitoring/logging
//!
//! ## Failure Handling
//!
//! A container that cannot be resolved (gone already, no address) is
//! skipped. Store and publisher failures stop the engine: the store is left
//! consistent, and the next startup reconciliation picks up where it failed.

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::model::ContainerMapping;
use crate::traits::{
    ContainerAction, ContainerEvent, ContainerEventSource, DnsPublisher, MappingStore,
};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

/// Events emitted by the SyncEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Engine started, event subscription open
    Started,

    /// Full reconciliation finished
    Reconciled {
        /// Running labelled containers observed
        containers: usize,
        /// Records published after the pass
        records: usize,
    },

    /// A started container was inserted into the store
    MappingInserted { mapping: ContainerMapping },

    /// A dead container was removed from the store
    MappingRemoved { container_id: String },

    /// An event was ignored: the container could not be resolved, or a
    /// die event named a container the store does not track
    EventSkipped { container_id: String, reason: String },

    /// Engine stopped
    Stopped { reason: String },
}

/// Core sync engine
///
/// ## Lifecycle
///
/// 1. Create with [`SyncEngine::new()`]
/// 2. Start with [`SyncEngine::run()`]
/// 3. Engine runs until a shutdown signal or a fatal error
/// 4. The store is cleaned up before `run` returns, on every path
pub struct SyncEngine {
    /// Source of container inventory and lifecycle events
    event_source: Box<dyn ContainerEventSource>,

    /// DNS publisher handed to the store
    publisher: Box<dyn DnsPublisher>,

    /// Reference-counting store
    store: Box<dyn MappingStore>,

    /// Periodic reconciliation interval (None disables it)
    resync_interval: Option<Duration>,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl SyncEngine {
    /// Create a new sync engine
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        event_source: Box<dyn ContainerEventSource>,
        publisher: Box<dyn DnsPublisher>,
        store: Box<dyn MappingStore>,
        config: &EngineConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let resync_interval = match config.resync_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        let engine = Self {
            event_source,
            publisher,
            store,
            resync_interval,
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Run the engine until SIGINT
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Clean shutdown
    /// - `Err(Error)`: Fatal error (the store was still cleaned up)
    pub async fn run(&self) -> Result<()> {
        self.run_internal(None).await
    }

    /// Run the engine until `shutdown_rx` fires (or its sender is dropped)
    ///
    /// With `None` this behaves like [`SyncEngine::run()`]. The daemon uses
    /// it to map SIGTERM and SIGINT onto one shutdown path.
    pub async fn run_with_shutdown(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        self.run_internal(shutdown_rx).await
    }

    async fn run_internal(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        let outcome = self.sync_loop(shutdown_rx).await;

        let cleanup = self.store.clean_up().await;
        if let Err(e) = &cleanup {
            error!("Failed to clean up mapping store: {}", e);
        }

        let reason = match &outcome {
            Ok(reason) => reason.clone(),
            Err(e) => format!("Fatal error: {}", e),
        };
        self.emit_event(EngineEvent::Stopped { reason });

        outcome?;
        cleanup?;
        info!("Mapping store cleaned up, engine stopped");
        Ok(())
    }

    /// Main loop; returns the shutdown reason
    async fn sync_loop(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<String> {
        // Subscribe first so nothing that happens during the initial pass is lost
        let mut events = self.event_source.watch();
        self.emit_event(EngineEvent::Started);

        self.reconcile().await?;

        let shutdown = async move {
            match shutdown_rx {
                Some(rx) => {
                    let _ = rx.await;
                }
                None => {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!("Failed to listen for SIGINT: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
        };
        tokio::pin!(shutdown);

        let mut resync = self.resync_interval.map(|period| {
            let mut timer = tokio::time::interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            timer
        });

        loop {
            tokio::select! {
                event = events.next() => match event {
                    Some(Ok(event)) => self.handle_event(event).await?,
                    Some(Err(e)) => {
                        error!("Container event stream failed: {}", e);
                        return Err(e);
                    }
                    None => {
                        return Err(Error::event_source("container event stream ended"));
                    }
                },

                _ = async {
                    match resync.as_mut() {
                        Some(timer) => {
                            timer.tick().await;
                        }
                        None => std::future::pending::<()>().await,
                    }
                } => {
                    debug!("Periodic resync");
                    self.reconcile().await?;
                }

                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    return Ok("Shutdown signal".to_string());
                }
            }
        }
    }

    /// Full pass: diff the store against every running labelled container
    async fn reconcile(&self) -> Result<()> {
        let observed = self.event_source.list_running().await?;
        self.store
            .replace_mappings(&observed, self.publisher.as_ref())
            .await?;

        let records = self.store.aggregates().await?.len();
        info!(
            "Reconciled {} running containers into {} records",
            observed.len(),
            records
        );
        self.emit_event(EngineEvent::Reconciled {
            containers: observed.len(),
            records,
        });
        Ok(())
    }

    /// Handle one container lifecycle event
    async fn handle_event(&self, event: ContainerEvent) -> Result<()> {
        debug!("Container event: {} {}", event.action, event.container_id);

        match event.action {
            ContainerAction::Start => {
                let mapping = match self.event_source.resolve(&event).await {
                    Ok(mapping) => mapping,
                    Err(e) if !e.is_fatal() => {
                        warn!("Skipping start of {}: {}", event.container_id, e);
                        self.emit_event(EngineEvent::EventSkipped {
                            container_id: event.container_id,
                            reason: e.to_string(),
                        });
                        return Ok(());
                    }
                    Err(e) => return Err(e),
                };

                self.store
                    .insert_mapping(&mapping, self.publisher.as_ref())
                    .await?;
                self.emit_event(EngineEvent::MappingInserted { mapping });
            }
            ContainerAction::Die => {
                let removed = self
                    .store
                    .remove_container(&event.container_id, self.publisher.as_ref())
                    .await?;
                if removed {
                    self.emit_event(EngineEvent::MappingRemoved {
                        container_id: event.container_id,
                    });
                } else {
                    self.emit_event(EngineEvent::EventSkipped {
                        container_id: event.container_id,
                        reason: "container not tracked".to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        // Full channel: drop the event rather than block the loop
        if self.event_tx.try_send(event).is_err() {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}
