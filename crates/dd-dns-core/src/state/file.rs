// # File Mapping Store
//
// File-based implementation of MappingStore with crash recovery.
//
// ## Purpose
//
// Keeps the container-to-record aggregates across daemon restarts, so the
// startup reconciliation can retract records whose containers died while
// the daemon was down.
//
// ## Crash Recovery
//
// - Atomic writes: every committed mutation is written to a temp file, then
//   renamed over the store file
// - Backup: the previous store file is kept as `.backup`
// - Corruption detection: JSON parse errors and broken invariants on load
// - Recovery: falls back to the backup, then to an empty table
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "saved_at": "2025-01-09T12:00:00Z",
//   "mappings": {
//     "15:web.example.com/10.0.0.5": {
//       "name": "web.example.com",
//       "address": "10.0.0.5",
//       "container_ids": ["3f2a...", "9c1b..."]
//     }
//   }
// }
// ```
//
// Map keys are `MappingKey::encode()`, which cannot collide for distinct
// `(name, address)` pairs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use super::table::{Change, MappingTable};
use crate::Error;
use crate::model::{ContainerMapping, MappingAggregate};
use crate::traits::{DnsPublisher, MappingStore, MappingStoreFactory};

/// Store file format version
const STORE_FILE_VERSION: &str = "1.0";

/// File-based mapping store with crash recovery
///
/// Every mutation is applied to a working copy of the table, written to
/// disk, and only then swapped in. A failed publisher call or a failed
/// write leaves both the in-memory table and the file untouched.
///
/// A write failure after a successful publisher call leaves the provider
/// ahead of the store; the next reconciliation repeats the call.
///
/// # Example
///
/// ```rust,no_run
/// use dd_dns_core::publisher::DryRunPublisher;
/// use dd_dns_core::state::FileMappingStore;
/// use dd_dns_core::{ContainerMapping, MappingStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileMappingStore::new("/var/lib/dd-dns/dd-dns.json").await?;
///     let publisher = DryRunPublisher::new();
///
///     // Published, then atomically written to disk
///     let web = ContainerMapping::new("web.example.com", "10.0.0.5".parse()?, "c1");
///     store.insert_mapping(&web, &publisher).await?;
///
///     store.clean_up().await?;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileMappingStore {
    path: PathBuf,
    state: Arc<RwLock<FileState>>,
}

#[derive(Debug)]
struct FileState {
    table: MappingTable,
    /// Loaded contents differ from what is on disk (recovered or migrated)
    dirty: bool,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct StoreFileFormat {
    version: String,
    saved_at: DateTime<Utc>,
    mappings: BTreeMap<String, MappingAggregate>,
}

impl FileMappingStore {
    /// Create or load a file mapping store
    ///
    /// This will:
    /// 1. Create parent directories if needed
    /// 2. Load the store file, if any
    /// 3. If the file is not valid JSON, load the backup instead
    /// 4. If neither parses, start with an empty table
    ///
    /// A file that parses but breaks a table invariant (empty aggregate,
    /// container in two aggregates, mismatched key) is `Error::InvalidState`
    /// and is returned to the caller untouched.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::persistence(format!(
                    "Failed to create data directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let (table, dirty) = Self::load_with_recovery(&path).await?;
        tracing::info!(
            "Opened mapping store {} ({} records)",
            path.display(),
            table.len()
        );

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(FileState { table, dirty })),
        })
    }

    /// Path of the store file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the table, falling back to the backup when the file is corrupt
    async fn load_with_recovery(path: &Path) -> Result<(MappingTable, bool), Error> {
        let err = match Self::load(path).await {
            Ok(loaded) => return Ok(loaded),
            Err(e) if Self::is_corruption(&e) => e,
            Err(e) => return Err(e),
        };

        tracing::warn!(
            "Store file {} appears corrupted: {}. Attempting recovery from backup.",
            path.display(),
            err
        );

        let backup_path = Self::backup_path(path);
        if !backup_path.exists() {
            tracing::warn!("No backup file found. Starting with empty store.");
            return Ok((MappingTable::default(), true));
        }

        match Self::load(&backup_path).await {
            Ok((table, _)) => {
                tracing::info!("Recovered {} records from backup", table.len());
                if let Err(restore_err) = fs::copy(&backup_path, path).await {
                    tracing::error!(
                        "Failed to restore store file from backup: {}",
                        restore_err
                    );
                }
                Ok((table, true))
            }
            Err(backup_err) if !Self::is_corruption(&backup_err) => Err(backup_err),
            Err(backup_err) => {
                tracing::error!(
                    "Backup also unusable: {}. Starting with empty store.",
                    backup_err
                );
                Ok((MappingTable::default(), true))
            }
        }
    }

    fn is_corruption(err: &Error) -> bool {
        matches!(err, Error::Json(_))
    }

    /// Load and validate a store file; a missing file is an empty table
    async fn load(path: &Path) -> Result<(MappingTable, bool), Error> {
        if !path.exists() {
            tracing::debug!("Store file does not exist: {}", path.display());
            return Ok((MappingTable::default(), false));
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::persistence(format!(
                "Failed to read store file {}: {}",
                path.display(),
                e
            ))
        })?;

        let file: StoreFileFormat = serde_json::from_str(&content)?;

        let migrate = file.version != STORE_FILE_VERSION;
        if migrate {
            tracing::warn!(
                "Store file version mismatch: expected {}, got {}. Loading anyway.",
                STORE_FILE_VERSION,
                file.version
            );
        }

        for (encoded, aggregate) in &file.mappings {
            let expected = aggregate.key().encode();
            if *encoded != expected {
                return Err(Error::invalid_state(format!(
                    "entry `{}` holds aggregate for `{}`",
                    encoded, expected
                )));
            }
        }

        tracing::debug!(
            "Loaded store saved at {} with {} records",
            file.saved_at.to_rfc3339(),
            file.mappings.len()
        );

        let table = MappingTable::from_aggregates(file.mappings.into_values())?;
        Ok((table, migrate))
    }

    /// Write a table to `path` atomically, keeping the previous file as backup
    async fn write_table(path: &Path, table: &MappingTable) -> Result<(), Error> {
        let file = StoreFileFormat {
            version: STORE_FILE_VERSION.to_string(),
            saved_at: Utc::now(),
            mappings: table
                .iter()
                .map(|(key, aggregate)| (key.encode(), aggregate.clone()))
                .collect(),
        };

        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| Error::persistence(format!("Failed to serialize store: {}", e)))?;

        let temp_path = Self::temp_path(path);
        {
            let mut temp = fs::File::create(&temp_path).await.map_err(|e| {
                Error::persistence(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            temp.write_all(json.as_bytes()).await.map_err(|e| {
                Error::persistence(format!(
                    "Failed to write temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            temp.sync_all().await.map_err(|e| {
                Error::persistence(format!(
                    "Failed to sync temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if path.exists()
            && let Err(e) = fs::copy(path, Self::backup_path(path)).await
        {
            tracing::warn!("Failed to create backup: {}", e);
        }

        fs::rename(&temp_path, path).await.map_err(|e| {
            Error::persistence(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                path.display(),
                e
            ))
        })?;

        tracing::trace!("Store written to {}", path.display());
        Ok(())
    }

    /// Persist `next` and make it the current table
    async fn commit(&self, state: &mut FileState, next: MappingTable) -> Result<(), Error> {
        Self::write_table(&self.path, &next).await?;
        state.table = next;
        state.dirty = false;
        Ok(())
    }

    fn temp_path(path: &Path) -> PathBuf {
        let mut temp = path.to_path_buf();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl MappingStore for FileMappingStore {
    async fn insert_mapping(
        &self,
        mapping: &ContainerMapping,
        publisher: &dyn DnsPublisher,
    ) -> Result<(), Error> {
        let mut state = self.state.write().await;
        let mut next = state.table.clone();
        if next.insert(mapping, publisher).await?.is_mutation() {
            self.commit(&mut state, next).await?;
        }
        Ok(())
    }

    async fn remove_container(
        &self,
        container_id: &str,
        publisher: &dyn DnsPublisher,
    ) -> Result<bool, Error> {
        let mut state = self.state.write().await;
        let mut next = state.table.clone();
        let change = next.remove(container_id, publisher).await?;
        if change.is_mutation() {
            self.commit(&mut state, next).await?;
        }
        Ok(change != Change::Unknown)
    }

    async fn replace_mappings(
        &self,
        observed: &[ContainerMapping],
        publisher: &dyn DnsPublisher,
    ) -> Result<(), Error> {
        let mut state = self.state.write().await;

        let missing = state.table.missing_from(observed);
        tracing::debug!(
            "Reconciling {} observed containers, {} stored containers missing",
            observed.len(),
            missing.len()
        );

        // Each step commits on its own, so a failure part-way keeps every
        // earlier step both published and on disk.
        for mapping in observed {
            let mut next = state.table.clone();
            if next.insert(mapping, publisher).await?.is_mutation() {
                self.commit(&mut state, next).await?;
            }
        }
        for mapping in &missing {
            let mut next = state.table.clone();
            if next
                .remove(&mapping.container_id, publisher)
                .await?
                .is_mutation()
            {
                self.commit(&mut state, next).await?;
            }
        }

        Ok(())
    }

    async fn aggregates(&self) -> Result<Vec<MappingAggregate>, Error> {
        Ok(self.state.read().await.table.aggregates())
    }

    async fn clean_up(&self) -> Result<(), Error> {
        let mut state = self.state.write().await;
        if state.dirty {
            Self::write_table(&self.path, &state.table).await?;
            state.dirty = false;
        }
        tracing::debug!("Mapping store {} closed", self.path.display());
        Ok(())
    }
}

/// Factory for file stores
pub struct FileMappingStoreFactory;

#[async_trait]
impl MappingStoreFactory for FileMappingStoreFactory {
    async fn create(
        &self,
        config: &crate::config::StoreConfig,
    ) -> Result<Box<dyn MappingStore>, Error> {
        match config {
            crate::config::StoreConfig::File { path } => {
                Ok(Box::new(FileMappingStore::new(path).await?))
            }
            other => Err(Error::config(format!(
                "File store factory cannot build a `{}` store",
                other.type_name()
            ))),
        }
    }
}
