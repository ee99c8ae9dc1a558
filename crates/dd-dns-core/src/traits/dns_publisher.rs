// # DNS Publisher Trait
//
// Defines the capability the mapping store uses to make address records
// exist (or stop existing) at the DNS provider.
//
// ## Implementations
//
// - Cloudflare: `dd-dns-provider-cloudflare` crate
// - Dry run: `dd_dns_core::publisher::DryRunPublisher`
//
// ## Usage
//
// ```rust,ignore
// use dd_dns_core::DnsPublisher;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let publisher = /* DnsPublisher implementation */;
//
//     publisher.ensure_present("svc.example.com", "10.0.0.5".parse()?).await?;
//     publisher.ensure_absent("svc.example.com", "10.0.0.5".parse()?).await?;
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::net::Ipv4Addr;

/// Trait for DNS publisher implementations
///
/// A publisher knows nothing about containers or reference counts. The
/// mapping store decides when a record must appear or disappear and calls
/// the publisher exactly once per transition.
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// # Trust Level: Untrusted
///
/// Publishers talk to external APIs and must stay single-shot:
///
/// - Perform the API calls needed for one transition, then return
/// - Return an error on failure; never retry or back off internally
/// - Never spawn tasks or cache zone state between calls
/// - Never access the mapping store
///
/// # Idempotency
///
/// Calling `ensure_present` for a record that already exists, or
/// `ensure_absent` for one that does not, should succeed. The store avoids
/// redundant calls itself, but does not rely on this.
#[async_trait]
pub trait DnsPublisher: Send + Sync {
    /// Make sure an A record `name -> address` exists
    ///
    /// # Returns
    ///
    /// - `Ok(())`: The record exists at the provider
    /// - `Err(Error::Publish)`: The provider call failed
    async fn ensure_present(&self, name: &str, address: Ipv4Addr) -> Result<(), crate::Error>;

    /// Make sure no A record `name -> address` exists
    ///
    /// Other addresses published under the same name are left alone.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: The record is gone (or never existed)
    /// - `Err(Error::Publish)`: The provider call failed
    async fn ensure_absent(&self, name: &str, address: Ipv4Addr) -> Result<(), crate::Error>;

    /// Get the publisher name (for logging/debugging)
    fn publisher_name(&self) -> &'static str;
}

/// Helper trait for constructing DNS publishers from configuration
pub trait DnsPublisherFactory: Send + Sync {
    /// Create a DnsPublisher instance from configuration
    fn create(
        &self,
        config: &crate::config::PublisherConfig,
    ) -> Result<Box<dyn DnsPublisher>, crate::Error>;
}
