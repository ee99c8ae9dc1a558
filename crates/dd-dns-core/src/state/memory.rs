// # Memory Mapping Store
//
// In-memory implementation of MappingStore.
//
// ## Crash Behavior
//
// - All aggregates are lost on restart
// - The startup reconciliation republishes every running container's record
// - Records whose containers died while the daemon was down are never
//   retracted (there is nothing left to diff against)
//
// Use the file store when stale records after a restart matter.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::table::{Change, MappingTable};
use crate::Error;
use crate::model::{ContainerMapping, MappingAggregate};
use crate::traits::{DnsPublisher, MappingStore, MappingStoreFactory};

/// In-memory mapping store
///
/// The table is guarded by a single RwLock. Writers hold it across their
/// publisher calls, so mutations are serialized.
///
/// # Example
///
/// ```rust,no_run
/// use dd_dns_core::publisher::DryRunPublisher;
/// use dd_dns_core::state::MemoryMappingStore;
/// use dd_dns_core::{ContainerMapping, MappingStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryMappingStore::new();
///     let publisher = DryRunPublisher::new();
///
///     let web = ContainerMapping::new("web.example.com", "10.0.0.5".parse()?, "c1");
///     store.insert_mapping(&web, &publisher).await?;
///
///     assert_eq!(store.len().await, 1);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryMappingStore {
    inner: Arc<RwLock<MappingTable>>,
}

impl MemoryMappingStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of aggregates (published records)
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Whether no record is published
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl MappingStore for MemoryMappingStore {
    async fn insert_mapping(
        &self,
        mapping: &ContainerMapping,
        publisher: &dyn DnsPublisher,
    ) -> Result<(), Error> {
        let mut table = self.inner.write().await;
        table.insert(mapping, publisher).await?;
        Ok(())
    }

    async fn remove_container(
        &self,
        container_id: &str,
        publisher: &dyn DnsPublisher,
    ) -> Result<bool, Error> {
        let mut table = self.inner.write().await;
        let change = table.remove(container_id, publisher).await?;
        Ok(change != Change::Unknown)
    }

    async fn replace_mappings(
        &self,
        observed: &[ContainerMapping],
        publisher: &dyn DnsPublisher,
    ) -> Result<(), Error> {
        let mut table = self.inner.write().await;

        let missing = table.missing_from(observed);
        tracing::debug!(
            "Reconciling {} observed containers, {} stored containers missing",
            observed.len(),
            missing.len()
        );

        for mapping in observed {
            table.insert(mapping, publisher).await?;
        }
        for mapping in &missing {
            table.remove(&mapping.container_id, publisher).await?;
        }

        Ok(())
    }

    async fn aggregates(&self) -> Result<Vec<MappingAggregate>, Error> {
        Ok(self.inner.read().await.aggregates())
    }

    async fn clean_up(&self) -> Result<(), Error> {
        // Nothing to flush
        Ok(())
    }
}

/// Factory for the in-memory store
pub struct MemoryMappingStoreFactory;

#[async_trait]
impl MappingStoreFactory for MemoryMappingStoreFactory {
    async fn create(
        &self,
        config: &crate::config::StoreConfig,
    ) -> Result<Box<dyn MappingStore>, Error> {
        match config {
            crate::config::StoreConfig::Memory => Ok(Box::new(MemoryMappingStore::new())),
            other => Err(Error::config(format!(
                "Memory store factory cannot build a `{}` store",
                other.type_name()
            ))),
        }
    }
}
