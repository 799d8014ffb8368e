use std::net::IpAddr;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// What we know about a peer: its advertised address and when we last heard
/// a `HELLO` from it. `last_seen` drives eviction; see [`PeerTable::evict_stale`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeerRecord {
    pub host: IpAddr,
    pub ring_port: u16,
    pub client_port: u16,
    pub last_seen: Instant,
}

/// `{id, host, ring_port}` — everything a node needs to open a one-shot ring
/// connection to a neighbor. Deliberately not a reference to another `Node`:
/// the ring is logical, nodes only ever hold descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborInfo {
    pub id: u64,
    pub host: IpAddr,
    pub ring_port: u16,
}

/// The peer table: a freshness-indexed map of discovered nodes, keyed by id.
/// Lock-free (`DashMap`) since it's read on every topology tick, every
/// discovery datagram, and written only by the discovery listener and the
/// staleness sweep.
#[derive(Debug)]
pub struct PeerTable {
    self_id: u64,
    peers: DashMap<u64, PeerRecord>,
}

impl PeerTable {
    pub fn new(self_id: u64, self_record: PeerRecord) -> Self {
        let peers = DashMap::new();
        peers.insert(self_id, self_record);
        PeerTable { self_id, peers }
    }

    /// Insert or refresh a peer entry from a received `HELLO`.
    pub fn upsert(&self, id: u64, record: PeerRecord) {
        self.peers.insert(id, record);
    }

    /// Refresh self's own entry, e.g. if ports changed (they never do after
    /// startup, but this keeps the invariant "the peer table always
    /// contains self with current ports" explicit rather than assumed).
    pub fn refresh_self(&self, record: PeerRecord) {
        self.peers.insert(self.self_id, record);
    }

    /// Evict peers not seen within `staleness`, except self. Returns the
    /// evicted ids, for logging.
    pub fn evict_stale(&self, staleness: Duration) -> Vec<u64> {
        let now = Instant::now();
        let stale: Vec<u64> = self
            .peers
            .iter()
            .filter(|entry| {
                *entry.key() != self.self_id && now.duration_since(entry.last_seen) > staleness
            })
            .map(|entry| *entry.key())
            .collect();
        for id in &stale {
            self.peers.remove(id);
        }
        stale
    }

    /// Ascending ids of all currently-live peers (includes self).
    pub fn live_ids_sorted(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.peers.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn get(&self, id: u64) -> Option<PeerRecord> {
        self.peers.get(&id).map(|e| *e.value())
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }
}

/// Derive `(left, right)` from the live id set, by ascending sort with
/// wraparound. A single live peer (self alone) yields `right = left = self`,
/// so a lone node can still send itself `ELECTION <self_id>` and win.
pub fn compute_neighbors(
    table: &PeerTable,
    self_id: u64,
) -> (Option<NeighborInfo>, Option<NeighborInfo>) {
    let ids = table.live_ids_sorted();
    if ids.is_empty() {
        return (None, None);
    }
    let i = match ids.iter().position(|&id| id == self_id) {
        Some(i) => i,
        None => return (None, None),
    };
    let n = ids.len();
    let right_id = ids[(i + 1) % n];
    let left_id = ids[(i + n - 1) % n];

    let right = table.get(right_id).map(|r| NeighborInfo {
        id: right_id,
        host: r.host,
        ring_port: r.ring_port,
    });
    let left = table.get(left_id).map(|r| NeighborInfo {
        id: left_id,
        host: r.host,
        ring_port: r.ring_port,
    });
    (left, right)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn rec(port: u16) -> PeerRecord {
        PeerRecord {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            ring_port: port,
            client_port: port + 1,
            last_seen: Instant::now(),
        }
    }

    #[test]
    fn single_peer_is_its_own_neighbor() {
        let table = PeerTable::new(5, rec(100));
        let (left, right) = compute_neighbors(&table, 5);
        assert_eq!(left.unwrap().id, 5);
        assert_eq!(right.unwrap().id, 5);
    }

    #[test]
    fn neighbors_wrap_around_sorted_ids() {
        let table = PeerTable::new(5, rec(100));
        table.upsert(3, rec(200));
        table.upsert(7, rec(300));

        let (left, right) = compute_neighbors(&table, 5);
        assert_eq!(right.unwrap().id, 7);
        assert_eq!(left.unwrap().id, 3);

        let (left, right) = compute_neighbors(&table, 7);
        assert_eq!(right.unwrap().id, 3, "right of max id wraps to min id");
        assert_eq!(left.unwrap().id, 5);

        let (left, right) = compute_neighbors(&table, 3);
        assert_eq!(right.unwrap().id, 5);
        assert_eq!(left.unwrap().id, 7, "left of min id wraps to max id");
    }

    #[test]
    fn stale_peers_are_evicted_except_self() {
        let table = PeerTable::new(1, rec(100));
        let mut stale = rec(200);
        stale.last_seen = Instant::now() - Duration::from_secs(20);
        table.upsert(2, stale);

        let evicted = table.evict_stale(Duration::from_secs(10));
        assert_eq!(evicted, vec![2]);
        assert_eq!(table.len(), 1);
        assert!(table.get(1).is_some(), "self is never evicted");
    }
}
