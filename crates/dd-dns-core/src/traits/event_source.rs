// # Container Event Source Trait
//
// Defines the interface for listing labelled containers and watching their
// lifecycle.
//
// ## Implementations
//
// - Docker Engine: `dd-dns-docker` crate
//
// ## Usage
//
// ```rust,ignore
// use dd_dns_core::ContainerEventSource;
// use tokio_stream::StreamExt;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let source = /* ContainerEventSource implementation */;
//
//     // Full inventory
//     let running = source.list_running().await?;
//
//     // Lifecycle events
//     let mut events = source.watch();
//     while let Some(event) = events.next().await {
//         println!("container event: {:?}", event?);
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::fmt;
use std::pin::Pin;
use tokio_stream::Stream;

use crate::model::ContainerMapping;

/// Lifecycle transition of a labelled container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerAction {
    /// Container started
    Start,
    /// Container exited
    Die,
}

impl ContainerAction {
    /// Parse an engine action name; unsupported actions yield `None`
    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "start" => Some(Self::Start),
            "die" => Some(Self::Die),
            _ => None,
        }
    }
}

impl fmt::Display for ContainerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => f.write_str("start"),
            Self::Die => f.write_str("die"),
        }
    }
}

/// A lifecycle event for a container carrying the configured label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerEvent {
    /// What happened
    pub action: ContainerAction,
    /// Container identifier
    pub container_id: String,
    /// Value of the configured label (the DNS name), if the event carried it
    pub label_value: Option<String>,
}

impl ContainerEvent {
    /// Create a new container event
    pub fn new(
        action: ContainerAction,
        container_id: impl Into<String>,
        label_value: Option<String>,
    ) -> Self {
        Self {
            action,
            container_id: container_id.into(),
            label_value,
        }
    }
}

/// Stream of container events; an `Err` item ends the subscription
pub type ContainerEventStream =
    Pin<Box<dyn Stream<Item = Result<ContainerEvent, crate::Error>> + Send + 'static>>;

/// Trait for container event source implementations
///
/// # Trust Level: Semi-Trusted
///
/// Event sources observe the container runtime. They resolve addresses and
/// report lifecycle transitions, but never touch DNS or the mapping store.
#[async_trait]
pub trait ContainerEventSource: Send + Sync {
    /// List running containers carrying the label, resolved to mappings
    ///
    /// Containers whose address cannot be resolved are skipped (and logged)
    /// rather than failing the whole listing.
    async fn list_running(&self) -> Result<Vec<ContainerMapping>, crate::Error>;

    /// Resolve a start event to the mapping it should publish
    ///
    /// # Returns
    ///
    /// - `Ok(ContainerMapping)`: name, address and container id
    /// - `Err(Error::NotFound)`: the container is already gone
    /// - `Err(Error::AddressResolution)`: no address could be determined
    async fn resolve(&self, event: &ContainerEvent) -> Result<ContainerMapping, crate::Error>;

    /// Subscribe to start/die events for labelled containers
    ///
    /// The stream should run indefinitely. Dropping it must release the
    /// subscription.
    fn watch(&self) -> ContainerEventStream;
}
