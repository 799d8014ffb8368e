use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpListener;
use tracing::{debug, info, instrument, warn};

use crate::node::Node;

/// A connected chat client, held only while this node is leader. Order in
/// the owning `Vec` is insertion order, so broadcasts fan out in the order
/// clients joined.
pub struct ClientHandle {
    addr: SocketAddr,
    writer: OwnedWriteHalf,
}

/// Accept chat-client TCP connections on `client_port`.
#[instrument(skip(node, listener))]
pub async fn run(node: Arc<Node>, listener: TcpListener) {
    let mut shutdown = node.shutdown_handle();
    info!(port = node.client_port, "client listener started");

    loop {
        let (socket, addr) = tokio::select! {
            res = listener.accept() => match res {
                Ok(pair) => pair,
                Err(err) => {
                    warn!(%err, "client accept failed");
                    continue;
                }
            },
            _ = shutdown.recv() => break,
        };

        let node = node.clone();
        tokio::spawn(async move {
            if let Err(err) = admit(node, socket, addr).await {
                debug!(%addr, %err, "client connection ended with error");
            }
        });
    }

    info!("client listener stopped");
}

async fn admit(node: Arc<Node>, socket: tokio::net::TcpStream, addr: SocketAddr) -> crate::error::Result<()> {
    let (read_half, mut write_half) = socket.into_split();

    if !node.is_leader().await {
        write_half.write_all(b"NOT_LEADER\n").await?;
        return Ok(());
    }

    write_half.write_all(b"WELCOME\n").await?;
    info!(%addr, "client admitted");

    {
        let mut clients = node.clients.lock().await;
        clients.push(ClientHandle { addr, writer: write_half });
    }

    let mut shutdown = node.shutdown_handle();
    let mut lines = BufReader::new(read_half).lines();
    loop {
        let line = tokio::select! {
            res = lines.next_line() => res?,
            _ = shutdown.recv() => break,
        };
        let line = match line {
            Some(l) => l,
            None => break,
        };
        if line.is_empty() {
            continue;
        }
        broadcast(&node, &format!("[{}] {}\n", node.id, line)).await;
    }

    remove_client(&node, addr).await;
    Ok(())
}

/// Fan out `text` (already newline-terminated) to every attached client,
/// including the sender. Best-effort: a client whose write fails or times
/// out is dropped.
async fn broadcast(node: &Node, text: &str) {
    let mut clients = node.clients.lock().await;
    let mut dead = Vec::new();
    for (idx, client) in clients.iter_mut().enumerate() {
        let write = tokio::time::timeout(
            node.config.client_write_timeout,
            client.writer.write_all(text.as_bytes()),
        )
        .await;
        match write {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                debug!(addr = %client.addr, %err, "client write failed, dropping");
                dead.push(idx);
            }
            Err(_) => {
                debug!(addr = %client.addr, "client write timed out, dropping");
                dead.push(idx);
            }
        }
    }
    for idx in dead.into_iter().rev() {
        clients.remove(idx);
    }
}

async fn remove_client(node: &Node, addr: SocketAddr) {
    let mut clients = node.clients.lock().await;
    clients.retain(|c| c.addr != addr);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;
    use std::net::Ipv4Addr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn test_node() -> Arc<Node> {
        let (node, listeners) = Node::bind(1, Ipv4Addr::LOCALHOST.into(), NodeConfig::default())
            .await
            .unwrap();
        drop(listeners);
        node
    }

    #[tokio::test]
    async fn non_leader_rejects_with_not_leader_and_no_client_mutation() {
        let node = test_node().await;
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let node_clone = node.clone();
        tokio::spawn(async move {
            let (socket, addr) = listener.accept().await.unwrap();
            admit(node_clone, socket, addr).await.unwrap();
        });

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut buf = [0u8; 32];
        let n = stream.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"NOT_LEADER\n");
        assert_eq!(node.clients.lock().await.len(), 0);
    }

    #[tokio::test]
    async fn leader_welcomes_and_broadcasts_to_sender() {
        let node = test_node().await;
        node.leader.write().await.leader_id = Some(node.id);

        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let node_clone = node.clone();
        tokio::spawn(async move {
            let (socket, addr) = listener.accept().await.unwrap();
            let _ = admit(node_clone, socket, addr).await;
        });

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut buf = [0u8; 64];
        let n = stream.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"WELCOME\n");

        stream.write_all(b"hello\n").await.unwrap();
        let n = stream.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], format!("[{}] hello\n", node.id).as_bytes());
    }
}
