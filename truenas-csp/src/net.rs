//! Network address helpers for initiator access control.
//!
//! CORE and legacy FreeNAS restrict initiators with per-initiator
//! `auth_network` entries holding plain host addresses, while SCALE puts
//! CIDR-form `auth_networks` on the target itself. These helpers convert
//! between the two worlds and resolve portal listen addresses to their
//! enclosing networks using the appliance's interface table.

use std::net::IpAddr;
use std::str::FromStr;

use ipnet::{IpNet, Ipv4Net};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetError {
    #[error("invalid address or CIDR '{0}'")]
    InvalidCidr(String),

    #[error("'{0}' is not a network address")]
    HostBitsSet(String),

    #[error("invalid netmask '{0}'")]
    InvalidNetmask(String),
}

pub type Result<T> = std::result::Result<T, NetError>;

/// One entry of the appliance `interface` resource, reduced to the alias
/// list the adapter needs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterfaceEntry {
    #[serde(default)]
    pub aliases: Vec<InterfaceAlias>,
}

/// An address bound to an interface. The netmask is a prefix length on
/// current appliances but older releases report a dotted quad.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceAlias {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub netmask: Option<serde_json::Value>,
}

/// Reduce CIDRs to their host address (`10.0.0.5/24` -> `10.0.0.5`).
/// Plain addresses pass through unchanged.
pub fn cidrs_to_hosts(cidrs: &[String]) -> Result<Vec<String>> {
    let mut hosts = Vec::with_capacity(cidrs.len());

    for cidr in cidrs {
        if let Ok(net) = IpNet::from_str(cidr) {
            hosts.push(net.addr().to_string());
        } else if IpAddr::from_str(cidr).is_ok() {
            hosts.push(cidr.clone());
        } else {
            return Err(NetError::InvalidCidr(cidr.clone()));
        }
    }

    Ok(hosts)
}

/// Validate a comma-separated list of CIDRs supplied through the volume
/// config. Each entry must be a proper network address (no host bits).
pub fn parse_auth_networks(csv: &str) -> Result<Vec<String>> {
    let mut networks = Vec::new();

    for entry in csv.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }

        let net = IpNet::from_str(entry).map_err(|_| NetError::InvalidCidr(entry.to_string()))?;
        if net.addr() != net.network() {
            return Err(NetError::HostBitsSet(entry.to_string()));
        }
        networks.push(entry.to_string());
    }

    Ok(networks)
}

/// Map each portal listen address to its enclosing network in prefix-len
/// form, by locating the interface alias that carries the address.
/// Addresses with no matching alias are skipped.
pub fn addrs_to_networks(ipaddrs: &[String], interfaces: &[InterfaceEntry]) -> Result<Vec<String>> {
    let mut networks = Vec::new();

    for ip in ipaddrs {
        for interface in interfaces {
            for alias in &interface.aliases {
                if alias.address.as_deref() != Some(ip.as_str()) {
                    continue;
                }
                let Some(netmask) = &alias.netmask else {
                    continue;
                };

                let prefix = prefix_len(netmask)?;
                let addr = ip
                    .parse()
                    .map_err(|_| NetError::InvalidCidr(ip.clone()))?;
                let net = Ipv4Net::new(addr, prefix)
                    .map_err(|_| NetError::InvalidNetmask(prefix.to_string()))?;
                networks.push(net.trunc().to_string());
            }
        }
    }

    Ok(networks)
}

/// Prefix length from an appliance netmask value: an integer, an integer
/// string, or a dotted quad.
fn prefix_len(netmask: &serde_json::Value) -> Result<u8> {
    if let Some(n) = netmask.as_u64() {
        if n <= 32 {
            return Ok(n as u8);
        }
        return Err(NetError::InvalidNetmask(n.to_string()));
    }

    let s = netmask
        .as_str()
        .ok_or_else(|| NetError::InvalidNetmask(netmask.to_string()))?;

    if let Ok(n) = s.parse::<u8>() {
        if n <= 32 {
            return Ok(n);
        }
        return Err(NetError::InvalidNetmask(s.to_string()));
    }

    match std::net::Ipv4Addr::from_str(s) {
        Ok(mask) => {
            let bits = u32::from(mask);
            // A valid mask is a run of ones followed by zeroes.
            if bits.leading_ones() + bits.trailing_zeros() != 32 {
                return Err(NetError::InvalidNetmask(s.to_string()));
            }
            Ok(bits.leading_ones() as u8)
        }
        Err(_) => Err(NetError::InvalidNetmask(s.to_string())),
    }
}
