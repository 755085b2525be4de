//! Node launch commands.

use std::net::IpAddr;

use tracing::{debug, info};

use crate::{config::FactoryConfig, endpoint::GossipEndpoint};

/// Path of the node binary inside the image.
pub const NODE_BINARY: &str = "/gecko/build/ava";

/// The network every test node joins.
pub const NETWORK_ID: &str = "local";

impl FactoryConfig {
    /// Builds the argument list used to launch a node reachable at
    /// `public_ip`.
    ///
    /// When `dependencies` is non-empty the node is told to bootstrap from
    /// each dependency's gossip socket. Nodes wait for their bootstrap peers
    /// on their own, so no readiness check is needed here.
    ///
    /// `--staking-tls-enabled` is always emitted as `false`, whatever the
    /// configuration says.
    pub fn start_command<D>(&self, public_ip: IpAddr, dependencies: &[D]) -> Vec<String>
    where
        D: GossipEndpoint,
    {
        if self.staking_tls_enabled() {
            debug!("staking TLS requested but launch command disables it");
        }

        let mut command = vec![
            NODE_BINARY.to_owned(),
            format!("--public-ip={public_ip}"),
            format!("--network-id={NETWORK_ID}"),
            format!("--http-port={}", self.http_port()),
            format!("--staking-port={}", self.staking_port()),
            format!("--log-level={}", self.log_level()),
            format!("--snow-sample-size={}", self.snow_sample_size()),
            format!("--snow-quorum-size={}", self.snow_quorum_size()),
            format!("--staking-tls-enabled={}", false),
        ];

        if !dependencies.is_empty() {
            let sockets = dependencies
                .iter()
                .map(|dep| dep.gossip_socket().to_string())
                .collect::<Vec<_>>()
                .join(",");
            command.push(format!("--bootstrap-ips={sockets}"));
        }

        info!(?command, "built node start command");
        command
    }
}
