use std::net::IpAddr;

use anyhow::Context;
use clap::Parser;
use rand::Rng;
use tracing::info;

/// A ring-election chat node.
#[derive(Parser, Debug)]
#[command(name = "ringchat-node")]
struct Cli {
    /// Optional node id. If omitted, a random id in [1, 10000] is chosen.
    #[arg(long)]
    id: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::try_init().map_err(|err| anyhow::anyhow!(err))?;

    let cli = Cli::parse();
    let id = cli.id.unwrap_or_else(|| rand::thread_rng().gen_range(1..=10000));

    let config = ringchat::config::load().context("loading node configuration")?;
    let host = local_ip(config.multicast_group, config.multicast_port);

    let node = ringchat::run(id, host, config)
        .await
        .context("starting node")?;

    info!(id, "running until interrupted");
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;

    node.trigger_shutdown();
    info!(id, "shutting down");
    Ok(())
}

/// Detect the local IP by opening a UDP socket toward the multicast group
/// and reading back its local address; no packet is actually sent. Falls
/// back to loopback if no route is available (e.g. a sandboxed/offline
/// host).
fn local_ip(group: std::net::Ipv4Addr, port: u16) -> IpAddr {
    use std::net::UdpSocket;
    let probe = || -> std::io::Result<IpAddr> {
        let sock = UdpSocket::bind("0.0.0.0:0")?;
        sock.connect((group, port))?;
        Ok(sock.local_addr()?.ip())
    };
    probe().unwrap_or(IpAddr::V4(std::net::Ipv4Addr::LOCALHOST))
}
