// # Mapping Table
//
// The reference-counting algorithm shared by every mapping store backend.
//
// Two indexes are kept in step:
// - primary: `MappingKey -> MappingAggregate` (one aggregate per record)
// - secondary: `container id -> MappingKey` (one record per container)
//
// Every operation first runs its publisher calls, and only mutates the
// indexes once all of them succeeded. A failed call therefore leaves the
// table untouched.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::model::{ContainerMapping, MappingAggregate, MappingKey};
use crate::traits::DnsPublisher;

/// What a single table operation did
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Change {
    /// New record published, aggregate created
    Published,
    /// Container joined an existing aggregate
    Joined,
    /// Container moved away from `from` (retracted if it was the last owner)
    Moved { from: MappingKey, retracted: bool },
    /// Container already owned the record
    Unchanged,
    /// Container left an aggregate that still has owners
    Left,
    /// Last owner left; record retracted and aggregate deleted
    Retracted,
    /// Container was not in the table
    Unknown,
}

impl Change {
    /// Whether the table contents changed
    pub(crate) fn is_mutation(&self) -> bool {
        !matches!(self, Change::Unchanged | Change::Unknown)
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MappingTable {
    by_key: BTreeMap<MappingKey, MappingAggregate>,
    by_container: HashMap<String, MappingKey>,
}

impl MappingTable {
    /// Rebuild a table from stored aggregates, checking every invariant
    pub(crate) fn from_aggregates<I>(aggregates: I) -> Result<Self>
    where
        I: IntoIterator<Item = MappingAggregate>,
    {
        let mut table = Self::default();

        for aggregate in aggregates {
            let key = aggregate.key();

            if aggregate.is_empty() {
                return Err(Error::invalid_state(format!(
                    "aggregate {} has no containers",
                    key
                )));
            }
            if table.by_key.contains_key(&key) {
                return Err(Error::invalid_state(format!("duplicate aggregate {}", key)));
            }

            let mut seen = HashSet::new();
            for container_id in &aggregate.container_ids {
                if !seen.insert(container_id.as_str()) {
                    return Err(Error::invalid_state(format!(
                        "container {} listed twice in {}",
                        container_id, key
                    )));
                }
                if let Some(other) = table.by_container.get(container_id) {
                    return Err(Error::invalid_state(format!(
                        "container {} owned by both {} and {}",
                        container_id, other, key
                    )));
                }
                table.by_container.insert(container_id.clone(), key.clone());
            }

            table.by_key.insert(key, aggregate);
        }

        Ok(table)
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// All aggregates, ordered by key
    pub(crate) fn aggregates(&self) -> Vec<MappingAggregate> {
        self.by_key.values().cloned().collect()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&MappingKey, &MappingAggregate)> {
        self.by_key.iter()
    }

    /// Stored memberships whose container is absent from `observed`
    pub(crate) fn missing_from(&self, observed: &[ContainerMapping]) -> Vec<ContainerMapping> {
        let observed_ids: HashSet<&str> = observed
            .iter()
            .map(|mapping| mapping.container_id.as_str())
            .collect();

        self.by_key
            .values()
            .flat_map(|aggregate| aggregate.mappings())
            .filter(|mapping| !observed_ids.contains(mapping.container_id.as_str()))
            .collect()
    }

    /// Register that `mapping.container_id` justifies `mapping`'s record
    pub(crate) async fn insert(
        &mut self,
        mapping: &ContainerMapping,
        publisher: &dyn DnsPublisher,
    ) -> Result<Change> {
        let key = mapping.key();
        let container_id = mapping.container_id.as_str();
        let previous = self.by_container.get(container_id).cloned();

        if previous.as_ref() == Some(&key) {
            debug!("Container {} already maps to {}", container_id, key);
            return Ok(Change::Unchanged);
        }

        let is_new = match self.by_key.get(&key) {
            Some(aggregate) if aggregate.is_empty() => {
                return Err(Error::invalid_state(format!(
                    "aggregate {} has no containers",
                    key
                )));
            }
            Some(_) => false,
            None => true,
        };

        if is_new {
            info!("Publishing {} for container {}", key, container_id);
            publisher.ensure_present(&key.name, key.address).await?;
        }

        // A container owns one record at a time; a re-observed container with
        // a new name or address leaves its old record after the new one is up.
        let mut retract_previous = false;
        if let Some(previous_key) = &previous {
            let owner = self.owner(previous_key, container_id)?;
            if owner.container_ids.len() == 1 {
                info!(
                    "Container {} moved to {}, retracting {}",
                    container_id, key, previous_key
                );
                publisher
                    .ensure_absent(&previous_key.name, previous_key.address)
                    .await?;
                retract_previous = true;
            }
        }

        if let Some(previous_key) = &previous {
            if retract_previous {
                self.by_key.remove(previous_key);
            } else if let Some(owner) = self.by_key.get_mut(previous_key) {
                owner.detach(container_id);
            }
        }

        match self.by_key.get_mut(&key) {
            Some(aggregate) => {
                aggregate.attach(container_id);
                debug!(
                    "Container {} joined {} ({} owners)",
                    container_id,
                    key,
                    aggregate.container_ids.len()
                );
            }
            None => {
                self.by_key.insert(key.clone(), MappingAggregate::new(mapping));
            }
        }
        self.by_container.insert(container_id.to_string(), key);

        Ok(match previous {
            Some(from) => Change::Moved {
                from,
                retracted: retract_previous,
            },
            None if is_new => Change::Published,
            None => Change::Joined,
        })
    }

    /// Drop a container's membership, retracting its record if it was the
    /// last owner
    pub(crate) async fn remove(
        &mut self,
        container_id: &str,
        publisher: &dyn DnsPublisher,
    ) -> Result<Change> {
        let Some(key) = self.by_container.get(container_id).cloned() else {
            warn!(
                "Tried to remove a mapping that is not in the store (container: {})",
                container_id
            );
            return Ok(Change::Unknown);
        };

        let owner = self.owner(&key, container_id)?;

        if owner.container_ids.len() == 1 {
            info!("Retracting {} (last container {} left)", key, container_id);
            publisher.ensure_absent(&key.name, key.address).await?;
            self.by_key.remove(&key);
            self.by_container.remove(container_id);
            return Ok(Change::Retracted);
        }

        if let Some(owner) = self.by_key.get_mut(&key) {
            owner.detach(container_id);
            debug!(
                "Container {} left {} ({} owners remain)",
                container_id,
                key,
                owner.container_ids.len()
            );
        }
        self.by_container.remove(container_id);

        Ok(Change::Left)
    }

    /// The aggregate the secondary index points at, checked for consistency
    fn owner(&self, key: &MappingKey, container_id: &str) -> Result<&MappingAggregate> {
        let aggregate = self.by_key.get(key).ok_or_else(|| {
            Error::invalid_state(format!(
                "container {} indexed under missing aggregate {}",
                container_id, key
            ))
        })?;

        if aggregate.is_empty() {
            return Err(Error::invalid_state(format!(
                "aggregate {} has no containers",
                key
            )));
        }
        if !aggregate.contains(container_id) {
            return Err(Error::invalid_state(format!(
                "container {} indexed under {} but not a member",
                container_id, key
            )));
        }

        Ok(aggregate)
    }
}
