use std::net::IpAddr;
use std::time::Instant;

use tokio::net::TcpListener;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::info;

use crate::client::ClientHandle;
use crate::config::NodeConfig;
use crate::error::Result;
use crate::peer::{NeighborInfo, PeerRecord, PeerTable};
use crate::shutdown::Shutdown;

/// `(leader_id, last_heartbeat, in_election, last_election_start)`. Kept as
/// one struct behind one `RwLock` so every compound read-modify-write
/// (election start, heartbeat timeout, leader assignment) takes the lock
/// once.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LeaderState {
    pub leader_id: Option<u64>,
    pub last_heartbeat: Instant,
    pub in_election: bool,
    pub last_election_start: Instant,
}

impl Default for LeaderState {
    fn default() -> Self {
        let epoch = Instant::now() - std::time::Duration::from_secs(3600);
        LeaderState {
            leader_id: None,
            last_heartbeat: epoch,
            in_election: false,
            last_election_start: epoch,
        }
    }
}

/// The node supervisor. Owns every piece of shared state and the listeners
/// the rest of the node needs, built before discovery ever announces so
/// `HELLO` always advertises real, bound ports.
pub struct Node {
    pub id: u64,
    pub host: IpAddr,
    pub ring_port: u16,
    pub client_port: u16,
    pub config: NodeConfig,

    pub(crate) peers: PeerTable,
    pub(crate) neighbors: RwLock<(Option<NeighborInfo>, Option<NeighborInfo>)>,
    pub(crate) leader: RwLock<LeaderState>,
    pub(crate) clients: Mutex<Vec<ClientHandle>>,

    shutdown_tx: broadcast::Sender<()>,
}

/// The two listeners a node binds before it announces itself, plus the
/// supervisor they belong to. Built together so startup bind failures are
/// fatal and visible before any background task is spawned.
pub struct Listeners {
    pub ring_listener: TcpListener,
    pub client_listener: TcpListener,
}

impl Node {
    /// Bind the ring and client TCP listeners and construct the supervisor.
    /// Ports are OS-chosen (`:0`) and recorded for use in `HELLO`.
    pub async fn bind(id: u64, host: IpAddr, config: NodeConfig) -> Result<(std::sync::Arc<Node>, Listeners)> {
        let ring_listener = TcpListener::bind((host, 0)).await?;
        let client_listener = TcpListener::bind((host, 0)).await?;

        let ring_port = ring_listener.local_addr()?.port();
        let client_port = client_listener.local_addr()?.port();

        let self_record = PeerRecord {
            host,
            ring_port,
            client_port,
            last_seen: Instant::now(),
        };

        let (shutdown_tx, _) = broadcast::channel(1);

        let node = Node {
            id,
            host,
            ring_port,
            client_port,
            config,
            peers: PeerTable::new(id, self_record),
            neighbors: RwLock::new((None, None)),
            leader: RwLock::new(LeaderState::default()),
            clients: Mutex::new(Vec::new()),
            shutdown_tx,
        };

        info!(id, ring_port, client_port, %host, "node listening");

        Ok((std::sync::Arc::new(node), Listeners { ring_listener, client_listener }))
    }

    pub fn shutdown_handle(&self) -> Shutdown {
        Shutdown::new(self.shutdown_tx.subscribe())
    }

    /// Trigger shutdown of every background loop.
    pub fn trigger_shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    pub async fn is_leader(&self) -> bool {
        self.leader.read().await.leader_id == Some(self.id)
    }

    pub async fn leader_id(&self) -> Option<u64> {
        self.leader.read().await.leader_id
    }

    pub async fn right_neighbor(&self) -> Option<NeighborInfo> {
        self.neighbors.read().await.1
    }

    pub async fn left_neighbor(&self) -> Option<NeighborInfo> {
        self.neighbors.read().await.0
    }
}
