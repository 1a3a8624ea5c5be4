//! Admission filters: which addresses and tiers may join the ring.
//!
//! Filters are loaded once at startup and never change afterwards. An empty
//! filter admits everything.

use std::collections::BTreeSet;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use crate::error::ClusterError;

/// An IPv4 or IPv6 network in CIDR notation.
///
/// A bare address parses as a single-host network (`/32` or `/128`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetRange {
    network: IpAddr,
    prefix: u8,
}

impl NetRange {
    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Whether `ip` lies inside this network.
    ///
    /// IPv4-mapped IPv6 addresses are compared as IPv4.
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.network, ip.to_canonical()) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = v4_mask(self.prefix);
                u32::from(ip) & mask == u32::from(net)
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = v6_mask(self.prefix);
                u128::from(ip) & mask == u128::from(net)
            }
            _ => false,
        }
    }
}

impl FromStr for NetRange {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ClusterError::Config(format!("invalid CIDR {s:?}: {reason}"));

        let (addr, prefix) = match s.trim().split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s.trim(), None),
        };
        let ip: IpAddr = addr.parse().map_err(|_| invalid("bad address"))?;
        let ip = ip.to_canonical();
        let max = if ip.is_ipv4() { 32 } else { 128 };
        let prefix = match prefix {
            Some(p) => p.parse::<u8>().map_err(|_| invalid("bad prefix length"))?,
            None => max,
        };
        if prefix > max {
            return Err(invalid("prefix length out of range"));
        }

        let network = match ip {
            IpAddr::V4(v4) => IpAddr::V4((u32::from(v4) & v4_mask(prefix)).into()),
            IpAddr::V6(v6) => IpAddr::V6((u128::from(v6) & v6_mask(prefix)).into()),
        };
        Ok(Self { network, prefix })
    }
}

impl fmt::Display for NetRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

fn v4_mask(prefix: u8) -> u32 {
    u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0)
}

fn v6_mask(prefix: u8) -> u128 {
    u128::MAX.checked_shl(128 - u32::from(prefix)).unwrap_or(0)
}

/// Extract the IP of a node address.
///
/// Accepts `ip:port`, `[v6]:port`, a bare IP or a bracketed bare IPv6.
/// Hostnames yield `None` and never match a network filter.
fn address_ip(addr: &str) -> Option<IpAddr> {
    let addr = addr.trim();
    if let Ok(sa) = addr.parse::<SocketAddr>() {
        return Some(sa.ip());
    }
    if let Ok(ip) = addr.parse::<IpAddr>() {
        return Some(ip);
    }
    addr.strip_prefix('[')
        .and_then(|a| a.strip_suffix(']'))
        .and_then(|a| a.parse().ok())
}

/// Network-range and tier allow-lists.
#[derive(Debug, Clone, Default)]
pub struct AdmissionFilters {
    nets: Vec<NetRange>,
    tiers: BTreeSet<String>,
}

impl AdmissionFilters {
    pub fn new(nets: Vec<NetRange>, tiers: impl IntoIterator<Item = String>) -> Self {
        Self {
            nets,
            tiers: tiers.into_iter().collect(),
        }
    }

    /// Build filters from configuration strings. Any malformed CIDR fails.
    pub fn parse(nets: &[String], tiers: &[String]) -> Result<Self, ClusterError> {
        let nets = nets
            .iter()
            .map(|n| n.parse())
            .collect::<Result<Vec<NetRange>, _>>()?;
        Ok(Self::new(nets, tiers.iter().cloned()))
    }

    pub fn nets(&self) -> &[NetRange] {
        &self.nets
    }

    pub fn tiers(&self) -> impl Iterator<Item = &str> {
        self.tiers.iter().map(String::as_str)
    }

    /// Admit a node if at least one address lies in an allowed network and
    /// at least one tier is allowed. Each check is skipped when its list is
    /// empty.
    pub fn check(&self, addresses: &[String], tiers: &[String]) -> Result<(), ClusterError> {
        if !self.nets.is_empty() {
            let admitted = addresses
                .iter()
                .filter_map(|a| address_ip(a))
                .any(|ip| self.nets.iter().any(|net| net.contains(ip)));
            if !admitted {
                return Err(ClusterError::FilterRejected(format!(
                    "no address of {addresses:?} is in an allowed network"
                )));
            }
        }
        if !self.tiers.is_empty() && !tiers.iter().any(|t| self.tiers.contains(t)) {
            return Err(ClusterError::FilterRejected(format!(
                "none of tiers {tiers:?} is allowed"
            )));
        }
        Ok(())
    }
}
