// # Docker Container Event Source
//
// This crate provides a Docker Engine implementation of
// `ContainerEventSource`, built on `bollard`.
//
// ## Behavior
//
// - `list_running`: running containers carrying the configured label,
//   resolved to mappings; unresolvable containers are logged and skipped
// - `watch`: start/die events for labelled containers, local and swarm scope
// - `resolve`: inspect a container by id and pick the address to publish
//
// ## Trust Level: Semi-Trusted (Event Source)
//
// - Reads from the Docker Engine API only
// - Never touches DNS or the mapping store
// - A failed or closed event stream is reported, never reconnected here

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{InspectContainerOptions, ListContainersOptions};
use bollard::errors::Error as DockerError;
use bollard::models::{ContainerSummary, EndpointSettings, EventMessage};
use bollard::system::EventsOptions;
use dd_dns_core::traits::{ContainerAction, ContainerEvent, ContainerEventSource, ContainerEventStream};
use dd_dns_core::{AddressMode, ContainerMapping, Error, Result};
use futures_util::stream::StreamExt;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Container event source backed by the local Docker Engine
pub struct DockerEventSource {
    docker: Docker,
    label: String,
    address_mode: AddressMode,
}

impl std::fmt::Debug for DockerEventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockerEventSource")
            .field("label", &self.label)
            .field("address_mode", &self.address_mode)
            .finish()
    }
}

impl DockerEventSource {
    /// Connect to the Docker daemon using local defaults
    ///
    /// Honors `DOCKER_HOST`, falling back to the unix socket.
    pub fn connect(label: impl Into<String>, address_mode: AddressMode) -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| Error::event_source(format!("Failed to connect to Docker: {}", e)))?;
        Ok(Self::with_client(docker, label, address_mode))
    }

    /// Wrap an existing client
    pub fn with_client(docker: Docker, label: impl Into<String>, address_mode: AddressMode) -> Self {
        Self {
            docker,
            label: label.into(),
            address_mode,
        }
    }

    /// Check that the daemon answers
    pub async fn ping(&self) -> Result<()> {
        self.docker
            .ping()
            .await
            .map_err(|e| Error::event_source(format!("Docker daemon unreachable: {}", e)))?;
        Ok(())
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

#[async_trait]
impl ContainerEventSource for DockerEventSource {
    async fn list_running(&self) -> Result<Vec<ContainerMapping>> {
        let options = ListContainersOptions::<String> {
            all: false,
            filters: list_filters(&self.label),
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| Error::event_source(format!("Failed to list containers: {}", e)))?;

        tracing::debug!("Docker reported {} labelled containers", containers.len());

        let mut mappings = Vec::with_capacity(containers.len());
        for container in &containers {
            match mapping_from_summary(container, &self.label, &self.address_mode) {
                Ok(Some(mapping)) => mappings.push(mapping),
                Ok(None) => {}
                Err(e) => tracing::error!(
                    "Failed to obtain address for container {}: {}",
                    container.id.as_deref().unwrap_or("<unknown>"),
                    e
                ),
            }
        }

        Ok(mappings)
    }

    async fn resolve(&self, event: &ContainerEvent) -> Result<ContainerMapping> {
        let detail = self
            .docker
            .inspect_container(&event.container_id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| inspect_error(&event.container_id, e))?;

        let name = event
            .label_value
            .as_deref()
            .or_else(|| {
                detail
                    .config
                    .as_ref()
                    .and_then(|config| config.labels.as_ref())
                    .and_then(|labels| labels.get(&self.label))
                    .map(String::as_str)
            })
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                Error::not_found(format!(
                    "label {} on container {}",
                    self.label, event.container_id
                ))
            })?;

        let networks = detail
            .network_settings
            .as_ref()
            .and_then(|settings| settings.networks.as_ref());
        let address = self.address_mode.resolve(network_addresses(networks))?;

        Ok(ContainerMapping::new(name, address, event.container_id.clone()))
    }

    fn watch(&self) -> ContainerEventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let docker = self.docker.clone();
        let label = self.label.clone();

        tokio::spawn(async move {
            let options = EventsOptions::<String> {
                filters: event_filters(&label),
                ..Default::default()
            };
            let mut stream = Box::pin(docker.events(Some(options)));
            tracing::info!("Listening for Docker events (label: {})", label);

            loop {
                tokio::select! {
                    // Subscriber dropped the stream
                    _ = tx.closed() => {
                        tracing::debug!("Docker event subscription released");
                        return;
                    }
                    message = stream.next() => {
                        let item = match message {
                            Some(Ok(message)) => match to_container_event(message, &label) {
                                Some(event) => Ok(event),
                                None => continue,
                            },
                            Some(Err(e)) => Err(Error::event_source(format!(
                                "Docker event stream failed: {}",
                                e
                            ))),
                            None => {
                                tracing::warn!("Docker event stream ended");
                                return;
                            }
                        };

                        let failed = item.is_err();
                        if tx.send(item).is_err() || failed {
                            return;
                        }
                    }
                }
            }
        });

        Box::pin(UnboundedReceiverStream::new(rx))
    }
}

/// Filters for listing running labelled containers
fn list_filters(label: &str) -> HashMap<String, Vec<String>> {
    HashMap::from([
        ("label".to_string(), vec![label.to_string()]),
        ("status".to_string(), vec!["running".to_string()]),
    ])
}

/// Filters for the event subscription
fn event_filters(label: &str) -> HashMap<String, Vec<String>> {
    HashMap::from([
        (
            "scope".to_string(),
            vec!["swarm".to_string(), "local".to_string()],
        ),
        ("type".to_string(), vec!["container".to_string()]),
        (
            "event".to_string(),
            vec!["start".to_string(), "die".to_string()],
        ),
        ("label".to_string(), vec![label.to_string()]),
    ])
}

/// Convert an engine event into a container event
///
/// Unsupported actions and events without an actor id yield `None`.
fn to_container_event(message: EventMessage, label: &str) -> Option<ContainerEvent> {
    let action = message.action.as_deref().and_then(ContainerAction::parse);
    let Some(action) = action else {
        tracing::warn!("Unsupported Docker event: {:?}", message.action);
        return None;
    };

    let actor = message.actor?;
    let id = actor.id.filter(|id| !id.is_empty())?;
    let label_value = actor
        .attributes
        .and_then(|mut attributes| attributes.remove(label));

    tracing::debug!("Container event: {} for {}", action, id);
    Some(ContainerEvent::new(action, id, label_value))
}

/// `(network, address)` pairs for address resolution
fn network_addresses(
    networks: Option<&HashMap<String, EndpointSettings>>,
) -> Vec<(&str, Option<&str>)> {
    networks
        .into_iter()
        .flatten()
        .map(|(name, endpoint)| (name.as_str(), endpoint.ip_address.as_deref()))
        .collect()
}

/// Resolve a listed container; `Ok(None)` when it has no usable label value
fn mapping_from_summary(
    container: &ContainerSummary,
    label: &str,
    mode: &AddressMode,
) -> Result<Option<ContainerMapping>> {
    let Some(id) = container.id.as_deref().filter(|id| !id.is_empty()) else {
        return Ok(None);
    };

    let name = container
        .labels
        .as_ref()
        .and_then(|labels| labels.get(label))
        .map(|name| name.trim())
        .filter(|name| !name.is_empty());
    let Some(name) = name else {
        tracing::warn!("Container {} has an empty {} label, skipping", id, label);
        return Ok(None);
    };

    let networks = container
        .network_settings
        .as_ref()
        .and_then(|settings| settings.networks.as_ref());
    let address = mode.resolve(network_addresses(networks))?;

    Ok(Some(ContainerMapping::new(name, address, id)))
}

fn inspect_error(container_id: &str, error: DockerError) -> Error {
    match error {
        DockerError::DockerResponseServerError {
            status_code: 404, ..
        } => Error::not_found(format!("container {}", container_id)),
        other => Error::event_source(format!(
            "Failed to inspect container {}: {}",
            container_id, other
        )),
    }
}
