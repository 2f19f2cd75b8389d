use anyhow::Result;
use if_addrs::{get_if_addrs, IfAddr};
use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use tracing::{debug, warn};

/// Detect local non-loopback IPv4 interface addresses.
///
/// Duplicates are removed and the list is sorted numerically for stable output.
pub fn detect_local_addrs() -> Result<Vec<Ipv4Addr>> {
    let mut set = BTreeSet::<Ipv4Addr>::new();
    for iface in get_if_addrs()? {
        if let IfAddr::V4(v4) = iface.addr {
            if v4.ip.is_loopback() {
                continue;
            }
            set.insert(v4.ip);
        }
    }
    Ok(set.into_iter().collect())
}

/// Local addresses as scan targets, or an empty set if discovery fails.
pub fn local_targets_or_empty() -> Vec<String> {
    match detect_local_addrs() {
        Ok(addrs) => {
            debug!(count = addrs.len(), "discovered local addresses");
            addrs.into_iter().map(|ip| ip.to_string()).collect()
        }
        Err(e) => {
            warn!(error = %e, "local address discovery failed, using no default targets");
            Vec::new()
        }
    }
}

/// Split a comma-separated list of extra targets.
///
/// Entries are trimmed and empty ones dropped. Everything else is kept verbatim
/// as a host string; one that is not a reachable host simply probes closed.
pub fn parse_extra_targets(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
