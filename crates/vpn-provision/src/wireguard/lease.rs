//! Address leases from the private peer pool.

use std::collections::HashSet;
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;

/// IPv4 pool handing out `/32` peer addresses.
///
/// The network, broadcast and first host (the server's own address) are
/// never leased.
#[derive(Debug, Clone, Copy)]
pub struct LeasePool {
    net: Ipv4Net,
}

impl LeasePool {
    pub fn new(net: Ipv4Net) -> Self {
        Self { net: net.trunc() }
    }

    /// Server address inside the pool.
    pub fn gateway(&self) -> Option<Ipv4Addr> {
        self.net.hosts().next()
    }

    /// Lowest address not in `used`.
    pub fn allocate(&self, used: &HashSet<Ipv4Addr>) -> Option<Ipv4Addr> {
        let gateway = self.gateway();
        self.net
            .hosts()
            .filter(|ip| Some(*ip) != gateway)
            .find(|ip| !used.contains(ip))
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        self.net.contains(&ip)
    }

    /// Number of leasable addresses.
    pub fn capacity(&self) -> usize {
        self.net.hosts().count().saturating_sub(1)
    }
}
