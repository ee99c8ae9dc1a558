//! Configuration types for the dd-dns system
//!
//! This module defines all configuration structures used throughout the crate.
//! The configuration is built once at startup and handed to the components
//! that need it; nothing reads process-wide settings after that.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

pub use crate::address::AddressMode;

/// Default container label holding the DNS name
pub const DEFAULT_DOCKER_LABEL: &str = "dd-dns.hostname";

/// File name of the durable store inside the data directory
pub const STORE_FILE_NAME: &str = "dd-dns.json";

/// Main dd-dns configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DdDnsConfig {
    /// DNS publisher configuration
    pub publisher: PublisherConfig,

    /// Mapping store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Container label whose value is the DNS name
    #[serde(default = "default_docker_label")]
    pub docker_label: String,

    /// How container addresses are determined
    #[serde(default)]
    pub address_mode: AddressMode,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl DdDnsConfig {
    /// Create a new configuration with defaults
    pub fn new(publisher: PublisherConfig) -> Self {
        Self {
            publisher,
            store: StoreConfig::default(),
            docker_label: default_docker_label(),
            address_mode: AddressMode::default(),
            engine: EngineConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.docker_label.trim().is_empty() {
            return Err(crate::Error::config("Docker label cannot be empty"));
        }

        self.publisher.validate()?;
        self.store.validate()?;
        self.engine.validate()?;

        Ok(())
    }
}

/// DNS publisher configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PublisherConfig {
    /// Cloudflare publisher
    Cloudflare {
        /// Account email; when set, the secret is sent as a global API key
        #[serde(default)]
        account_name: Option<String>,
        /// API key or API token
        account_secret: String,
        /// Zone ID (optional, looked up from the record name otherwise)
        #[serde(default)]
        zone_id: Option<String>,
    },

    /// Simulated publisher that only logs and keeps an in-memory zone
    #[serde(rename = "dryrun")]
    DryRun,
}

impl PublisherConfig {
    /// Validate the publisher configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            PublisherConfig::Cloudflare { account_secret, .. } => {
                if account_secret.is_empty() {
                    return Err(crate::Error::config(
                        "Cloudflare account secret cannot be empty",
                    ));
                }
                Ok(())
            }
            PublisherConfig::DryRun => Ok(()),
        }
    }

    /// Get the publisher type name
    pub fn type_name(&self) -> &'static str {
        match self {
            PublisherConfig::Cloudflare { .. } => "cloudflare",
            PublisherConfig::DryRun => "dryrun",
        }
    }
}

// Custom Debug implementation that hides the account secret
impl fmt::Debug for PublisherConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublisherConfig::Cloudflare {
                account_name,
                zone_id,
                ..
            } => f
                .debug_struct("Cloudflare")
                .field("account_name", account_name)
                .field("account_secret", &"****")
                .field("zone_id", zone_id)
                .finish(),
            PublisherConfig::DryRun => f.write_str("DryRun"),
        }
    }
}

/// Mapping store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// In-memory store (not persistent)
    #[default]
    Memory,

    /// File-based store
    File {
        /// Path to the store file
        path: PathBuf,
    },
}

impl StoreConfig {
    /// File store located in a data directory
    pub fn file_in(data_directory: impl AsRef<Path>) -> Self {
        StoreConfig::File {
            path: data_directory.as_ref().join(STORE_FILE_NAME),
        }
    }

    /// Validate the store configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StoreConfig::File { path } if path.as_os_str().is_empty() => {
                Err(crate::Error::config("File store path cannot be empty"))
            }
            _ => Ok(()),
        }
    }

    /// Get the store type name
    pub fn type_name(&self) -> &'static str {
        match self {
            StoreConfig::Memory => "memory",
            StoreConfig::File { .. } => "file",
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Interval between full reconciliation passes (in seconds)
    ///
    /// The startup pass always runs. Set to 0 to disable periodic resyncs.
    #[serde(default)]
    pub resync_interval_secs: u64,

    /// Capacity of the engine event channel
    ///
    /// When full, new engine events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            resync_interval_secs: 0,
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_docker_label() -> String {
    DEFAULT_DOCKER_LABEL.to_string()
}

fn default_event_channel_capacity() -> usize {
    1000
}
