//! Plugin-based publisher registry
//!
//! The registry maps publisher and store type names to factories, so the
//! daemon can build its components from configuration without hardcoded
//! if-else chains.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dd_dns_core::registry::PublisherRegistry;
//! use dd_dns_core::config::{PublisherConfig, StoreConfig};
//!
//! // Built-in dryrun publisher plus memory and file stores
//! let registry = PublisherRegistry::with_builtins();
//!
//! // Provider crates add themselves
//! dd_dns_provider_cloudflare::register(&registry);
//!
//! let publisher = registry.create_publisher(&PublisherConfig::DryRun)?;
//! let store = registry.create_store(&StoreConfig::Memory).await?;
//! ```

use crate::config::{PublisherConfig, StoreConfig};
use crate::error::{Error, Result};
use crate::publisher::DryRunPublisherFactory;
use crate::state::{FileMappingStoreFactory, MemoryMappingStoreFactory};
use crate::traits::{DnsPublisher, DnsPublisherFactory, MappingStore, MappingStoreFactory};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Registry for plugin-based publisher and store creation
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct PublisherRegistry {
    /// Registered DNS publisher factories
    publishers: RwLock<HashMap<String, Box<dyn DnsPublisherFactory>>>,

    /// Registered mapping store factories
    stores: RwLock<HashMap<String, Arc<dyn MappingStoreFactory>>>,
}

// Factories are only ever inserted whole, so a poisoned map is still usable
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl PublisherRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with everything the core crate ships: the `dryrun`
    /// publisher and the `memory` and `file` stores
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register_publisher("dryrun", Box::new(DryRunPublisherFactory));
        registry.register_store("memory", Box::new(MemoryMappingStoreFactory));
        registry.register_store("file", Box::new(FileMappingStoreFactory));
        registry
    }

    /// Register a DNS publisher factory
    ///
    /// # Parameters
    ///
    /// - `name`: Publisher type name (e.g., "cloudflare", "dryrun")
    /// - `factory`: Factory object for creating publisher instances
    pub fn register_publisher(
        &self,
        name: impl Into<String>,
        factory: Box<dyn DnsPublisherFactory>,
    ) {
        write(&self.publishers).insert(name.into(), factory);
    }

    /// Register a mapping store factory
    pub fn register_store(&self, name: impl Into<String>, factory: Box<dyn MappingStoreFactory>) {
        write(&self.stores).insert(name.into(), Arc::from(factory));
    }

    /// Create a DNS publisher from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn DnsPublisher>)`: Created publisher instance
    /// - `Err(Error::Config)`: If the publisher type is not registered
    /// - `Err(Error)`: If the factory rejects the configuration
    pub fn create_publisher(&self, config: &PublisherConfig) -> Result<Box<dyn DnsPublisher>> {
        let publisher_type = config.type_name();
        let publishers = read(&self.publishers);

        let factory = publishers.get(publisher_type).ok_or_else(|| {
            Error::config(format!("Unknown publisher type: {}", publisher_type))
        })?;

        factory.create(config)
    }

    /// Create a mapping store from configuration
    pub async fn create_store(&self, config: &StoreConfig) -> Result<Box<dyn MappingStore>> {
        let store_type = config.type_name();

        // Release the lock before calling async create
        let factory = read(&self.stores)
            .get(store_type)
            .cloned()
            .ok_or_else(|| Error::config(format!("Unknown store type: {}", store_type)))?;

        factory.create(config).await
    }

    /// List all registered publisher types
    pub fn list_publishers(&self) -> Vec<String> {
        let mut names: Vec<String> = read(&self.publishers).keys().cloned().collect();
        names.sort();
        names
    }

    /// List all registered store types
    pub fn list_stores(&self) -> Vec<String> {
        let mut names: Vec<String> = read(&self.stores).keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a publisher type is registered
    pub fn has_publisher(&self, name: &str) -> bool {
        read(&self.publishers).contains_key(name)
    }

    /// Check if a store type is registered
    pub fn has_store(&self, name: &str) -> bool {
        read(&self.stores).contains_key(name)
    }
}
