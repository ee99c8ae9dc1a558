//! Container-to-DNS mapping model
//!
//! - [`MappingKey`]: identifies one address record, a `(name, address)` pair
//! - [`ContainerMapping`]: one observed container and the record it justifies
//! - [`MappingAggregate`]: the stored record together with every container
//!   currently justifying it. The container list is the record's reference
//!   count.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// Identifies a DNS address record
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MappingKey {
    /// DNS name (e.g. "svc.example.com")
    pub name: String,
    /// Published address
    pub address: Ipv4Addr,
}

impl MappingKey {
    /// Create a new key
    pub fn new(name: impl Into<String>, address: Ipv4Addr) -> Self {
        Self {
            name: name.into(),
            address,
        }
    }

    /// Encode the key for use as a storage key.
    ///
    /// The name is length-prefixed, so `("foo", 1.2.3.4)` and
    /// `("foo1", 2.3.4.x)` can never produce the same encoding.
    pub fn encode(&self) -> String {
        format!("{}:{}/{}", self.name.len(), self.name, self.address)
    }
}

impl fmt::Display for MappingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} A {}", self.name, self.address)
    }
}

/// A running container and the record it maps to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerMapping {
    /// DNS name taken from the container label
    pub name: String,
    /// Address to publish
    pub address: Ipv4Addr,
    /// Container identifier
    pub container_id: String,
}

impl ContainerMapping {
    /// Create a new mapping
    pub fn new(name: impl Into<String>, address: Ipv4Addr, container_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address,
            container_id: container_id.into(),
        }
    }

    /// The record this container justifies
    pub fn key(&self) -> MappingKey {
        MappingKey::new(self.name.clone(), self.address)
    }
}

impl fmt::Display for ContainerMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} A {} (container {})", self.name, self.address, self.container_id)
    }
}

/// A stored record and the containers that keep it alive
///
/// Invariant (enforced by the stores): `container_ids` is never empty and
/// never holds duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingAggregate {
    /// DNS name
    pub name: String,
    /// Published address
    pub address: Ipv4Addr,
    /// Containers justifying the record, in insertion order
    pub container_ids: Vec<String>,
}

impl MappingAggregate {
    /// Start a new aggregate owned by a single container
    pub(crate) fn new(mapping: &ContainerMapping) -> Self {
        Self {
            name: mapping.name.clone(),
            address: mapping.address,
            container_ids: vec![mapping.container_id.clone()],
        }
    }

    /// The record this aggregate stands for
    pub fn key(&self) -> MappingKey {
        MappingKey::new(self.name.clone(), self.address)
    }

    /// Whether the container is one of the owners
    pub fn contains(&self, container_id: &str) -> bool {
        self.container_ids.iter().any(|id| id == container_id)
    }

    /// Whether no container justifies the record anymore
    pub fn is_empty(&self) -> bool {
        self.container_ids.is_empty()
    }

    /// One mapping per owning container
    pub fn mappings(&self) -> impl Iterator<Item = ContainerMapping> + '_ {
        self.container_ids
            .iter()
            .map(|id| ContainerMapping::new(self.name.clone(), self.address, id.clone()))
    }

    /// Add an owner; returns false if it was already present
    pub(crate) fn attach(&mut self, container_id: &str) -> bool {
        if self.contains(container_id) {
            return false;
        }
        self.container_ids.push(container_id.to_string());
        true
    }

    /// Remove an owner, preserving the order of the rest
    pub(crate) fn detach(&mut self, container_id: &str) -> bool {
        let before = self.container_ids.len();
        self.container_ids.retain(|id| id != container_id);
        self.container_ids.len() != before
    }
}
