//! Dry-run publisher
//!
//! Keeps a simulated zone in memory and logs every change instead of
//! calling a DNS provider. Useful to try a label setup against a live
//! Docker host before handing out API credentials.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::{Mutex, MutexGuard};

use crate::config::PublisherConfig;
use crate::traits::{DnsPublisher, DnsPublisherFactory};
use crate::{Error, Result};

/// Publisher that records A records in a local zone map
#[derive(Debug, Default)]
pub struct DryRunPublisher {
    zone: Mutex<BTreeMap<String, Vec<Ipv4Addr>>>,
}

impl DryRunPublisher {
    /// Create a publisher with an empty zone
    pub fn new() -> Self {
        Self::default()
    }

    /// Addresses currently published under `name`, in publish order
    pub fn zone_addresses(&self, name: &str) -> Vec<Ipv4Addr> {
        self.lock_zone().get(name).cloned().unwrap_or_default()
    }

    /// Copy of the whole simulated zone
    pub fn zone(&self) -> BTreeMap<String, Vec<Ipv4Addr>> {
        self.lock_zone().clone()
    }

    fn lock_zone(&self) -> MutexGuard<'_, BTreeMap<String, Vec<Ipv4Addr>>> {
        // A poisoned zone is still a valid map; keep serving it
        self.zone.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn render(addresses: &[Ipv4Addr]) -> String {
    addresses
        .iter()
        .map(Ipv4Addr::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl DnsPublisher for DryRunPublisher {
    async fn ensure_present(&self, name: &str, address: Ipv4Addr) -> Result<()> {
        tracing::info!("[DRY-RUN] Adding record: {}\tA\t{}", name, address);

        let mut zone = self.lock_zone();
        let record = zone.entry(name.to_string()).or_default();
        if !record.contains(&address) {
            record.push(address);
        }

        tracing::info!("[DRY-RUN] Resulting record: {}\tA\t{}", name, render(record));
        Ok(())
    }

    async fn ensure_absent(&self, name: &str, address: Ipv4Addr) -> Result<()> {
        tracing::info!("[DRY-RUN] Removing record: {}\tA\t{}", name, address);

        let mut zone = self.lock_zone();
        let Some(record) = zone.get_mut(name) else {
            tracing::warn!("[DRY-RUN] Attempting to remove an unmapped address");
            return Ok(());
        };
        let Some(index) = record.iter().position(|ip| *ip == address) else {
            tracing::warn!("[DRY-RUN] Attempting to remove an unmapped address");
            return Ok(());
        };

        record.remove(index);
        let remaining = render(record);
        if record.is_empty() {
            zone.remove(name);
        }

        tracing::info!("[DRY-RUN] Resulting record: {}\tA\t{}", name, remaining);
        Ok(())
    }

    fn publisher_name(&self) -> &'static str {
        "dryrun"
    }
}

/// Factory for dry-run publishers
pub struct DryRunPublisherFactory;

impl DnsPublisherFactory for DryRunPublisherFactory {
    fn create(&self, config: &PublisherConfig) -> Result<Box<dyn DnsPublisher>> {
        match config {
            PublisherConfig::DryRun => {
                tracing::warn!("Dry-run publisher selected - no DNS changes will be made");
                Ok(Box::new(DryRunPublisher::new()))
            }
            other => Err(Error::config(format!(
                "Invalid config for dryrun publisher: {}",
                other.type_name()
            ))),
        }
    }
}
