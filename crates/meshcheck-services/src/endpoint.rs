//! Endpoints of a running node.

use std::{
    fmt,
    net::{IpAddr, SocketAddr},
};

use serde::{Deserialize, Serialize};

/// The default port nodes expose their JSON-RPC API on.
pub const DEFAULT_HTTP_PORT: u16 = 9650;

/// The default port nodes gossip (stake) with each other on.
pub const DEFAULT_STAKING_PORT: u16 = 9651;

/// Anything that other nodes can bootstrap from.
///
/// Every node-like service variant implements this so that launch commands
/// can be built from a list of dependencies without knowing their concrete
/// type.
pub trait GossipEndpoint {
    /// The socket other nodes gossip with.
    fn gossip_socket(&self) -> SocketAddr;
}

/// Describes how to reach one running node.
///
/// The ports are fixed for a given node image, so they are carried
/// alongside the address rather than discovered.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct NodeService {
    ip: IpAddr,
    http_port: u16,
    staking_port: u16,
}

impl NodeService {
    /// Creates a service reachable at `ip` on the given ports.
    pub fn new(ip: IpAddr, http_port: u16, staking_port: u16) -> Self {
        Self {
            ip,
            http_port,
            staking_port,
        }
    }

    /// Returns the node's IP address.
    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    /// The socket used for staking/gossip traffic.
    pub fn staking_socket(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.staking_port)
    }

    /// The socket serving the node's JSON-RPC API.
    pub fn rpc_socket(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.http_port)
    }
}

impl GossipEndpoint for NodeService {
    fn gossip_socket(&self) -> SocketAddr {
        self.staking_socket()
    }
}

impl<T: GossipEndpoint + ?Sized> GossipEndpoint for &T {
    fn gossip_socket(&self) -> SocketAddr {
        (**self).gossip_socket()
    }
}

impl fmt::Display for NodeService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (api {}, staking {})",
            self.ip, self.http_port, self.staking_port
        )
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    #[test]
    fn test_sockets() {
        let ip = IpAddr::V4(Ipv4Addr::new(172, 23, 0, 2));
        let svc = NodeService::new(ip, DEFAULT_HTTP_PORT, DEFAULT_STAKING_PORT);
        assert_eq!(svc.rpc_socket().to_string(), "172.23.0.2:9650");
        assert_eq!(svc.staking_socket().to_string(), "172.23.0.2:9651");
        assert_eq!(svc.gossip_socket(), svc.staking_socket());
    }
}
