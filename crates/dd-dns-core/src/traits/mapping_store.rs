// # Mapping Store Trait
//
// Defines the interface for the table of container-to-DNS aggregates.
//
// ## Purpose
//
// The mapping store is the reference counter between containers and DNS
// records:
// - The first container for a `(name, address)` pair publishes the record
// - Further containers only join the aggregate
// - The last container to leave retracts the record
//
// This keeps calls to the DNS provider to one per record transition and
// lets a restarted daemon diff its stored view against the running
// containers.
//
// ## Implementations
//
// - In-memory: `MemoryMappingStore`
// - File-based: `FileMappingStore` (JSON, atomic writes)

use async_trait::async_trait;

use crate::model::{ContainerMapping, MappingAggregate};
use crate::traits::DnsPublisher;

/// Trait for mapping store implementations
///
/// # Thread Safety
///
/// All mutations are serialized behind a single write lock per store, and
/// the publisher is called while that lock is held. Two mutations never
/// interleave, and `replace_mappings` scans a consistent snapshot.
///
/// # Failure Semantics
///
/// Every publisher call happens before the state change it justifies. When
/// the call fails, the operation returns the error and the store is left
/// exactly as it was:
/// - a record that failed to publish is never stored
/// - a record that failed to retract stays stored with all its owners, so
///   a later removal or reconciliation retries the retraction
///
/// # Trust Level: Trusted (Core Component)
///
/// Stores may perform I/O for persistence and hold locks, but must not
/// decide when containers start or stop (owned by `SyncEngine`).
#[async_trait]
pub trait MappingStore: Send + Sync {
    /// Register that a container justifies `mapping`'s record
    ///
    /// - New record: `publisher.ensure_present` is called, then the
    ///   aggregate `[container_id]` is stored
    /// - Known record, known container: no-op
    /// - Known record, new container: the container joins the aggregate
    /// - Container currently owned by another record: the container moves.
    ///   The new record is published first (if new), then the old record is
    ///   retracted if the container was its last owner
    async fn insert_mapping(
        &self,
        mapping: &ContainerMapping,
        publisher: &dyn DnsPublisher,
    ) -> Result<(), crate::Error>;

    /// Remove the container's membership from whatever record it owns
    ///
    /// Lookup is by `mapping.container_id` only. Unknown containers are
    /// logged and ignored.
    async fn remove_mapping(
        &self,
        mapping: &ContainerMapping,
        publisher: &dyn DnsPublisher,
    ) -> Result<(), crate::Error> {
        self.remove_container(&mapping.container_id, publisher)
            .await
            .map(|_| ())
    }

    /// Remove a container by id
    ///
    /// If it was the last owner of its record, `publisher.ensure_absent` is
    /// called before the aggregate is deleted.
    ///
    /// Returns `false` when the container was not tracked (nothing changed).
    async fn remove_container(
        &self,
        container_id: &str,
        publisher: &dyn DnsPublisher,
    ) -> Result<bool, crate::Error>;

    /// Reconcile the store against a full list of observed containers
    ///
    /// Every observed mapping is inserted first, then every stored
    /// container missing from `observed` is removed.
    async fn replace_mappings(
        &self,
        observed: &[ContainerMapping],
        publisher: &dyn DnsPublisher,
    ) -> Result<(), crate::Error>;

    /// Consistent snapshot of all aggregates, ordered by key
    async fn aggregates(&self) -> Result<Vec<MappingAggregate>, crate::Error>;

    /// Flush pending state and release resources
    ///
    /// Called once at shutdown. Safe to call more than once.
    async fn clean_up(&self) -> Result<(), crate::Error>;
}

/// Helper trait for constructing mapping stores from configuration
#[async_trait]
pub trait MappingStoreFactory: Send + Sync {
    /// Create a MappingStore instance from configuration
    async fn create(
        &self,
        config: &crate::config::StoreConfig,
    ) -> Result<Box<dyn MappingStore>, crate::Error>;
}
