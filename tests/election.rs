//! End-to-end scenarios driven over real loopback TCP and UDP multicast.
//! Each test picks its own multicast port so parallel test binaries don't
//! interfere with each other.

use std::net::Ipv4Addr;
use std::time::Duration;

use ringchat::config::NodeConfig;

fn config_on_port(port: u16) -> NodeConfig {
    let mut cfg = NodeConfig::default();
    cfg.multicast_port = port;
    // Speed the protocol up so the test doesn't spend real wall-clock
    // minutes waiting on 1s/2s/6s production cadences.
    cfg.hello_interval = Duration::from_millis(50);
    cfg.heartbeat_interval = Duration::from_millis(100);
    cfg.heartbeat_timeout = Duration::from_millis(400);
    cfg.peer_staleness = Duration::from_secs(2);
    cfg.election_cooldown = Duration::from_millis(100);
    cfg.startup_election_delay = Duration::from_millis(200);
    cfg.connect_timeout = Duration::from_secs(1);
    cfg
}

async fn wait_for<F, Fut>(timeout: Duration, mut poll: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if poll().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn three_node_ring_converges_on_max_id_leader() {
    let port = 45100;
    let cfg = config_on_port(port);

    let n3 = ringchat::run(3, Ipv4Addr::LOCALHOST.into(), cfg).await.unwrap();
    let n7 = ringchat::run(7, Ipv4Addr::LOCALHOST.into(), cfg).await.unwrap();
    let n5 = ringchat::run(5, Ipv4Addr::LOCALHOST.into(), cfg).await.unwrap();

    let converged = wait_for(Duration::from_secs(10), || async {
        n3.leader_id().await == Some(7) && n5.leader_id().await == Some(7) && n7.leader_id().await == Some(7)
    })
    .await;
    assert!(converged, "all three nodes should converge on leader 7");

    n3.trigger_shutdown();
    n5.trigger_shutdown();
    n7.trigger_shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn non_leader_rejects_chat_client() {
    let port = 45101;
    let cfg = config_on_port(port);

    let n3 = ringchat::run(3, Ipv4Addr::LOCALHOST.into(), cfg).await.unwrap();
    let n7 = ringchat::run(7, Ipv4Addr::LOCALHOST.into(), cfg).await.unwrap();

    wait_for(Duration::from_secs(10), || async {
        n3.leader_id().await == Some(7)
    })
    .await;

    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpStream;

    let loser_port = n3.client_port;
    let mut stream = TcpStream::connect((Ipv4Addr::LOCALHOST, loser_port)).await.unwrap();
    let mut reader = BufReader::new(&mut stream);
    let mut line = String::new();
    reader.read_line(&mut line).await.unwrap();
    assert_eq!(line, "NOT_LEADER\n");

    let winner_port = n7.client_port;
    let mut stream = TcpStream::connect((Ipv4Addr::LOCALHOST, winner_port)).await.unwrap();
    let mut reader = BufReader::new(&mut stream);
    let mut line = String::new();
    reader.read_line(&mut line).await.unwrap();
    assert_eq!(line, "WELCOME\n");

    stream.write_all(b"hi\n").await.unwrap();
    let mut echoed = String::new();
    reader.read_line(&mut echoed).await.unwrap();
    assert_eq!(echoed, "[7] hi\n");

    n3.trigger_shutdown();
    n7.trigger_shutdown();
}
