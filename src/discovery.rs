use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::node::Node;
use crate::peer::PeerRecord;

/// Build the socket the discovery sender uses: bound to an ephemeral port,
/// with the multicast TTL set so packets stay link-local.
pub fn bind_sender(ttl: u32) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0).into())?;
    socket.set_multicast_ttl_v4(ttl)?;
    let std_socket: std::net::UdpSocket = socket.into();
    Ok(UdpSocket::from_std(std_socket)?)
}

/// Build the socket the discovery listener uses: bound to the well-known
/// discovery port and joined to the multicast group.
pub fn bind_listener(group: Ipv4Addr, port: u16) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(not(target_os = "windows"))]
    socket.set_reuse_port(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port).into())?;
    socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)?;
    let std_socket: std::net::UdpSocket = socket.into();
    Ok(UdpSocket::from_std(std_socket)?)
}

/// Periodically announce this node: `HELLO <id> <host> <ring_port>
/// <client_port>` to the multicast group, every `hello_interval`.
pub async fn run_sender(node: Arc<Node>, socket: UdpSocket) {
    let mut shutdown = node.shutdown_handle();
    let mut tick = tokio::time::interval(node.config.hello_interval);
    let dest = SocketAddr::V4(SocketAddrV4::new(node.config.multicast_group, node.config.multicast_port));

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = shutdown.recv() => break,
        }

        let msg = format!(
            "HELLO {} {} {} {}",
            node.id, node.host, node.ring_port, node.client_port
        );
        if let Err(err) = socket.send_to(msg.as_bytes(), dest).await {
            debug!(%err, "discovery send failed");
        }
    }

    info!("discovery sender stopped");
}

/// Listen for `HELLO` datagrams and update the peer table. Malformed
/// datagrams are dropped silently. At-least-once semantics suffice because
/// freshness is timestamp-based.
pub async fn run_listener(node: Arc<Node>, socket: UdpSocket) {
    let mut shutdown = node.shutdown_handle();
    let mut buf = [0u8; 512];

    loop {
        let (len, _src) = tokio::select! {
            res = socket.recv_from(&mut buf) => match res {
                Ok(pair) => pair,
                Err(err) => {
                    warn!(%err, "discovery recv error");
                    continue;
                }
            },
            _ = shutdown.recv() => break,
        };

        match parse_hello(&buf[..len]) {
            Some((id, record)) if id != node.id => {
                node.peers.upsert(id, record);
            }
            Some(_) => {
                // our own HELLO, looped back by the OS; ignore.
            }
            None => {
                debug!("dropping malformed HELLO datagram");
            }
        }
    }

    info!("discovery listener stopped");
}

fn parse_hello(data: &[u8]) -> Option<(u64, PeerRecord)> {
    let text = std::str::from_utf8(data).ok()?;
    let mut parts = text.trim().split_whitespace();
    if parts.next()? != "HELLO" {
        return None;
    }
    let id: u64 = parts.next()?.parse().ok()?;
    let host: std::net::IpAddr = parts.next()?.parse().ok()?;
    let ring_port: u16 = parts.next()?.parse().ok()?;
    let client_port: u16 = parts.next()?.parse().ok()?;

    Some((
        id,
        PeerRecord {
            host,
            ring_port,
            client_port,
            last_seen: std::time::Instant::now(),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_hello() {
        let (id, record) = parse_hello(b"HELLO 7 127.0.0.1 9000 9001").unwrap();
        assert_eq!(id, 7);
        assert_eq!(record.ring_port, 9000);
        assert_eq!(record.client_port, 9001);
    }

    #[test]
    fn rejects_malformed_datagrams() {
        assert!(parse_hello(b"HELLO 7 127.0.0.1 9000").is_none());
        assert!(parse_hello(b"NOTHELLO 7 127.0.0.1 9000 9001").is_none());
        assert!(parse_hello(b"HELLO notanid 127.0.0.1 9000 9001").is_none());
        assert!(parse_hello(b"\xff\xfe garbage").is_none());
    }
}
