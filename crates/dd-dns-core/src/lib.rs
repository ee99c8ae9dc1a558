// # dd-dns-core
//
// Core library for keeping DNS address records in sync with running
// containers.
//
// ## Architecture Overview
//
// - **ContainerEventSource**: Trait for listing labelled containers and
//   watching their start/die events
// - **DnsPublisher**: Trait for creating and deleting A records at a provider
// - **MappingStore**: Reference-counting store between containers and
//   records; decides when the publisher is called
// - **SyncEngine**: Event loop driving the store from container events
// - **PublisherRegistry**: Plugin-based registry for publishers and stores
//
// ## Design Principles
//
// 1. **One record, many containers**: a record stays published while at
//    least one container justifies it
// 2. **Publish before mutate**: the store never records a change the
//    provider has not accepted
// 3. **Plugin-Based**: publishers are registered dynamically, no hard-coded
//    if-else
// 4. **Library-First**: all core functionality can be used as a library

pub mod address;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod publisher;
pub mod registry;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use address::AddressMode;
pub use config::{DdDnsConfig, EngineConfig, PublisherConfig, StoreConfig};
pub use engine::{EngineEvent, SyncEngine};
pub use error::{Error, Result};
pub use model::{ContainerMapping, MappingAggregate, MappingKey};
pub use registry::PublisherRegistry;
pub use state::{FileMappingStore, MemoryMappingStore};
pub use traits::{
    ContainerAction, ContainerEvent, ContainerEventSource, ContainerEventStream, DnsPublisher,
    MappingStore,
};
