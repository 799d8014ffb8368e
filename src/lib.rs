//! Coordination layer for a ring-election chat node: peer discovery, ring
//! topology maintenance, Chang–Roberts leader election, heartbeat-based
//! failure detection, and leader-gated chat client admission.

pub mod client;
pub mod config;
pub mod discovery;
pub mod error;
pub mod node;
pub mod peer;
pub mod ring;
pub mod shutdown;
pub mod topology;

pub use error::{Error, Result};
pub use node::Node;

use std::net::IpAddr;
use std::sync::Arc;

use tracing::info;

/// Wire up and run every task a node needs until `node.trigger_shutdown()`
/// is called (or the returned `Arc<Node>`'s shutdown broadcast otherwise
/// fires). Listeners are bound first, so `HELLO` always advertises live
/// ports.
pub async fn run(id: u64, host: IpAddr, config: config::NodeConfig) -> Result<Arc<Node>> {
    let (node, listeners) = Node::bind(id, host, config).await?;

    let discovery_sender_socket = discovery::bind_sender(config.multicast_ttl)?;
    let discovery_listener_socket = discovery::bind_listener(config.multicast_group, config.multicast_port)?;

    tokio::spawn(discovery::run_sender(node.clone(), discovery_sender_socket));
    tokio::spawn(discovery::run_listener(node.clone(), discovery_listener_socket));
    tokio::spawn(ring::transport::run(node.clone(), listeners.ring_listener));
    tokio::spawn(client::run(node.clone(), listeners.client_listener));
    tokio::spawn(topology::run(node.clone()));
    tokio::spawn(ring::election::heartbeat_loop(node.clone()));

    {
        let node = node.clone();
        let delay = config.startup_election_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if node.leader_id().await.is_none() {
                ring::election::try_start_election(&node).await;
            }
        });
    }

    info!(id, "node started");
    Ok(node)
}
