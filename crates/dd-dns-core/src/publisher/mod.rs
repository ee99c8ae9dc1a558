// # Built-in DNS Publishers
//
// Publishers that ship with the core crate. Provider-backed publishers
// live in their own crates (e.g. `dd-dns-provider-cloudflare`) and are
// registered with the `PublisherRegistry` at startup.

pub mod dryrun;

pub use dryrun::{DryRunPublisher, DryRunPublisherFactory};
