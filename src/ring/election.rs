use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::node::Node;
use crate::ring::message::RingMessage;
use crate::ring::transport::send_to_right_neighbor;

/// Send `ELECTION <self_id>` to the right neighbor. Called at startup
/// (after [`super::super::config`]'s `startup_election_delay`) and by the
/// topology manager when a topology change leaves the leader unknown.
pub async fn start_election(node: &Node) {
    info!(id = node.id, "initiating election");
    send_to_right_neighbor(node, RingMessage::Election(node.id)).await;
}

/// Dispatch a received ring message to the LCR/heartbeat state machine.
/// Runs to completion before the connection reads its next line, so
/// message order on a single ring connection is preserved.
pub async fn handle(node: &Arc<Node>, msg: RingMessage) {
    match msg {
        RingMessage::Election(eid) => on_election(node, eid).await,
        RingMessage::Leader(lid) => on_leader(node, lid).await,
        RingMessage::Heartbeat(lid) => on_heartbeat(node, lid).await,
    }
}

async fn on_election(node: &Arc<Node>, eid: u64) {
    if eid == node.id {
        // The token made it all the way around: we win.
        {
            let mut leader = node.leader.write().await;
            leader.leader_id = Some(node.id);
            leader.in_election = false;
        }
        info!(id = node.id, "became leader");
        send_to_right_neighbor(node, RingMessage::Leader(node.id)).await;
    } else if eid > node.id {
        send_to_right_neighbor(node, RingMessage::Election(eid)).await;
    } else {
        // LCR suppression: replace the smaller token with our own id.
        send_to_right_neighbor(node, RingMessage::Election(node.id)).await;
    }
}

async fn on_leader(node: &Arc<Node>, lid: u64) {
    {
        let mut leader = node.leader.write().await;
        leader.leader_id = Some(lid);
        leader.in_election = false;
        leader.last_heartbeat = Instant::now();
    }
    if lid != node.id {
        send_to_right_neighbor(node, RingMessage::Leader(lid)).await;
    }
}

async fn on_heartbeat(node: &Arc<Node>, lid: u64) {
    {
        let mut leader = node.leader.write().await;
        leader.leader_id = Some(lid);
        leader.last_heartbeat = Instant::now();
    }
    if lid != node.id {
        send_to_right_neighbor(node, RingMessage::Heartbeat(lid)).await;
    }
}

/// Attempt to start an election, honoring the election cooldown. Returns
/// `true` if an election was actually (re)started. Shared by the topology
/// manager (on neighbor change with no known leader) and the heartbeat loop
/// (on timeout).
pub async fn try_start_election(node: &Node) -> bool {
    let now = Instant::now();
    let mut leader = node.leader.write().await;
    let cooldown_elapsed = now.duration_since(leader.last_election_start) > node.config.election_cooldown;
    if leader.leader_id.is_some() || leader.in_election || !cooldown_elapsed {
        return false;
    }
    leader.in_election = true;
    leader.last_election_start = now;
    drop(leader);
    start_election(node).await;
    true
}

/// Runs forever: the leader emits heartbeats on `heartbeat_interval`;
/// followers watch for `heartbeat_timeout` since the last heartbeat and
/// start a fresh election if it elapses.
pub async fn heartbeat_loop(node: Arc<Node>) {
    let mut shutdown = node.shutdown_handle();
    let mut tick = tokio::time::interval(node.config.heartbeat_interval);

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = shutdown.recv() => break,
        }

        if node.is_leader().await {
            send_to_right_neighbor(&node, RingMessage::Heartbeat(node.id)).await;
            continue;
        }

        let timed_out = {
            let leader = node.leader.read().await;
            leader.leader_id.is_some()
                && leader.last_heartbeat.elapsed() > node.config.heartbeat_timeout
        };
        if timed_out {
            warn!(id = node.id, "leader heartbeat timed out, starting election");
            {
                let mut leader = node.leader.write().await;
                leader.leader_id = None;
                leader.in_election = true;
                leader.last_election_start = Instant::now();
            }
            start_election(&node).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;
    use std::net::Ipv4Addr;

    async fn test_node() -> Arc<Node> {
        let (node, listeners) = Node::bind(5, Ipv4Addr::LOCALHOST.into(), NodeConfig::default())
            .await
            .unwrap();
        drop(listeners);
        node
    }

    #[tokio::test]
    async fn election_token_returning_to_originator_wins() {
        let node = test_node().await;
        on_election(&node, 5).await;
        assert_eq!(node.leader_id().await, Some(5));
        assert!(!node.leader.read().await.in_election);
    }

    #[tokio::test]
    async fn heartbeat_is_idempotent_on_leader_and_timestamp() {
        let node = test_node().await;
        on_heartbeat(&node, 9).await;
        let after_first = node.leader.read().await.last_heartbeat;
        on_heartbeat(&node, 9).await;
        let after_second = node.leader.read().await.last_heartbeat;
        assert_eq!(node.leader_id().await, Some(9));
        assert!(after_second >= after_first);
    }

    #[tokio::test]
    async fn leader_message_sets_leader_and_heartbeat() {
        let node = test_node().await;
        on_leader(&node, 3).await;
        assert_eq!(node.leader_id().await, Some(3));
        assert!(!node.leader.read().await.in_election);
    }
}
