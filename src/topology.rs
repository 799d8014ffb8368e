use std::sync::Arc;

use tracing::info;

use crate::node::Node;
use crate::peer::compute_neighbors;
use crate::ring::election::try_start_election;

/// Ring topology manager: on a fixed tick, evict stale peers, recompute
/// neighbors from the live id set, and kick off an election if the
/// topology changed and no leader is known.
pub async fn run(node: Arc<Node>) {
    let mut shutdown = node.shutdown_handle();
    // Fixed 1s cadence, independent of the staleness threshold (which
    // governs eviction, not how often we check for it).
    let mut tick = tokio::time::interval(std::time::Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = shutdown.recv() => break,
        }

        let evicted = node.peers.evict_stale(node.config.peer_staleness);
        for id in evicted {
            info!(id, "evicted stale peer");
        }

        let (new_left, new_right) = compute_neighbors(&node.peers, node.id);

        let changed = {
            let mut neighbors = node.neighbors.write().await;
            let changed = *neighbors != (new_left, new_right);
            *neighbors = (new_left, new_right);
            changed
        };

        if changed {
            info!(?new_left, ?new_right, "neighbors updated");

            if new_right.is_some() && node.leader_id().await.is_none() {
                info!(id = node.id, "no leader after neighbor update, starting election");
                try_start_election(&node).await;
            }
        }
    }
}
