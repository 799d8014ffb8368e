use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, instrument, warn};

use crate::node::Node;
use crate::ring::message::RingMessage;

/// Accept incoming ring connections and dispatch each well-formed line to
/// the election engine. Multiple concurrent inbound connections are
/// permitted; each gets its own task.
#[instrument(skip(node, listener))]
pub async fn run(node: Arc<Node>, listener: TcpListener) {
    let mut shutdown = node.shutdown_handle();
    info!(port = node.ring_port, "ring listener started");

    loop {
        let (socket, addr) = tokio::select! {
            res = listener.accept() => match res {
                Ok(pair) => pair,
                Err(err) => {
                    warn!(%err, "ring accept failed");
                    continue;
                }
            },
            _ = shutdown.recv() => break,
        };
        debug!(%addr, "accepted ring connection");

        let node = node.clone();
        tokio::spawn(async move {
            handle_connection(node, socket).await;
        });
    }

    info!("ring listener stopped");
}

async fn handle_connection(node: Arc<Node>, socket: TcpStream) {
    let mut shutdown = node.shutdown_handle();
    let mut lines = BufReader::new(socket).lines();
    loop {
        let line = tokio::select! {
            res = lines.next_line() => res,
            _ = shutdown.recv() => break,
        };
        let line = match line {
            Ok(Some(l)) => l,
            Ok(None) => break,
            Err(err) => {
                debug!(%err, "ring connection read error");
                break;
            }
        };
        match line.parse::<RingMessage>() {
            Ok(msg) => {
                debug!(?msg, "received ring message");
                crate::ring::election::handle(&node, msg).await;
            }
            Err(err) => {
                // malformed input: ignore the message, keep the connection alive.
                debug!(%err, line = %line, "ignoring malformed ring message");
            }
        }
    }
}

/// Send a ring message to `addr` as a one-shot operation: connect (bounded
/// by `connect_timeout`), write `<msg>\n`, close. Connection failures are
/// swallowed (logged) — the next heartbeat or topology tick will retry.
pub async fn send(node: &Node, host: std::net::IpAddr, port: u16, msg: RingMessage) {
    let addr = (host, port);
    let connect = tokio::time::timeout(node.config.connect_timeout, TcpStream::connect(addr)).await;
    let mut stream = match connect {
        Ok(Ok(stream)) => stream,
        Ok(Err(err)) => {
            debug!(%host, port, %err, "ring send: connect failed");
            return;
        }
        Err(_) => {
            debug!(%host, port, "ring send: connect timed out");
            return;
        }
    };

    let line = format!("{}\n", msg);
    if let Err(err) = stream.write_all(line.as_bytes()).await {
        debug!(%host, port, %err, "ring send: write failed");
    }
    // `stream` is dropped here, closing the connection; no long-lived
    // outbound ring link is kept.
}

/// Send `msg` to the current right neighbor, if one is known.
pub async fn send_to_right_neighbor(node: &Node, msg: RingMessage) {
    match node.right_neighbor().await {
        Some(neighbor) => send(node, neighbor.host, neighbor.ring_port, msg).await,
        None => debug!(?msg, "no right neighbor known, dropping ring send"),
    }
}
