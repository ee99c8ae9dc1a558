//! Address resolution for containers
//!
//! The address published for a container is either its own address on one of
//! its networks, or a fixed host address shared by every container.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use crate::error::{Error, Result};

/// How to determine the address published for a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AddressMode {
    /// Use the container's own address on its networks
    #[default]
    Container,
    /// Publish the same literal address for every container
    Fixed(Ipv4Addr),
}

impl AddressMode {
    /// Pick the address to publish given the container's networks.
    ///
    /// `networks` yields `(network name, address)` pairs as reported by the
    /// container runtime. Networks are visited in name order, so the result
    /// does not depend on the runtime's map ordering. Empty and non-IPv4
    /// addresses are skipped.
    pub fn resolve<'a, I>(&self, networks: I) -> Result<Ipv4Addr>
    where
        I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
    {
        match self {
            AddressMode::Fixed(address) => Ok(*address),
            AddressMode::Container => {
                let mut candidates: Vec<(&str, Option<&str>)> = networks.into_iter().collect();
                candidates.sort_by(|a, b| a.0.cmp(b.0));

                for (network, address) in candidates {
                    let Some(address) = address.map(str::trim).filter(|a| !a.is_empty()) else {
                        continue;
                    };
                    tracing::debug!("Candidate address on network {}: {}", network, address);
                    match address.parse::<Ipv4Addr>() {
                        Ok(ip) => return Ok(ip),
                        Err(_) => {
                            tracing::debug!("Skipping non-IPv4 address {} on {}", address, network)
                        }
                    }
                }

                Err(Error::address_resolution(
                    "container has no IPv4 address on any attached network",
                ))
            }
        }
    }
}

impl FromStr for AddressMode {
    type Err = Error;

    /// Accepts `container` (the default when empty) or an IPv4 literal.
    /// Input is trimmed and lower-cased first.
    fn from_str(value: &str) -> Result<Self> {
        let value = value.trim().to_lowercase();
        match value.as_str() {
            "" | "container" => Ok(AddressMode::Container),
            other => match other.parse::<IpAddr>() {
                Ok(IpAddr::V4(ip)) => Ok(AddressMode::Fixed(ip)),
                _ => Err(Error::config(format!(
                    "Invalid dns-content `{}`: must be a valid IPv4 address or `container`",
                    other
                ))),
            },
        }
    }
}

impl TryFrom<String> for AddressMode {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<AddressMode> for String {
    fn from(mode: AddressMode) -> Self {
        mode.to_string()
    }
}

impl fmt::Display for AddressMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressMode::Container => f.write_str("container"),
            AddressMode::Fixed(ip) => write!(f, "{}", ip),
        }
    }
}
