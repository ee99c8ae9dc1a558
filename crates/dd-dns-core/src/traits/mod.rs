//! Core traits for the dd-dns system
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`DnsPublisher`]: Publish and retract address records at a DNS provider
//! - [`MappingStore`]: Reference-counted table of container-to-DNS aggregates
//! - [`ContainerEventSource`]: List and watch labelled containers

pub mod dns_publisher;
pub mod event_source;
pub mod mapping_store;

pub use dns_publisher::{DnsPublisher, DnsPublisherFactory};
pub use event_source::{ContainerAction, ContainerEvent, ContainerEventSource, ContainerEventStream};
pub use mapping_store::{MappingStore, MappingStoreFactory};
