//! Node Server
//!
//! The TCP front door of a node. Accepts connections, reads request frames,
//! and hands them to the dispatcher in `handlers`. Each connection is served
//! by its own task; a framing error closes the connection. The listener
//! drains on an admin shutdown after the node has left the ring.

pub mod handlers;


use crate::proto::{self, FrameError, OpCode};
use crate::ring::node::RingNode;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub struct Server {
    listener: TcpListener,
    node: Arc<RingNode>,
    shutdown_tx: watch::Sender<bool>,
}

impl Server {
    pub fn new(listener: TcpListener, node: Arc<RingNode>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            listener,
            node,
            shutdown_tx,
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle for stopping the listener from outside (signal handling).
    pub fn shutdown_signal(&self) -> watch::Sender<bool> {
        self.shutdown_tx.clone()
    }

    /// Accept loop. Returns once a shutdown has been signalled, either
    /// externally or by an `ADMIN_SHUTDOWN` request.
    pub async fn run(self) {
        let address = match self.local_addr() {
            Ok(address) => address.to_string(),
            Err(_) => "<unknown>".to_string(),
        };
        info!("listening on {}", address);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let node = self.node.clone();
                        let shutdown = self.shutdown_tx.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, node, shutdown).await;
                        });
                    }
                    Err(e) => warn!("accept failed: {}", e),
                },
                _ = shutdown_rx.changed() => break,
            }
        }
        info!("listener on {} closed", address);
    }
}

/// Serves one connection: frames in, responses out, until the peer hangs up
/// or sends something unparseable.
async fn handle_connection(
    mut stream: TcpStream,
    node: Arc<RingNode>,
    shutdown: watch::Sender<bool>,
) {
    loop {
        let request = match proto::read_request(&mut stream).await {
            Ok(request) => request,
            Err(FrameError::Io(_)) => return,
            Err(e) => {
                debug!("closing connection after framing error: {}", e);
                return;
            }
        };
        let opcode = request.opcode;
        let response = handlers::dispatch(&node, request).await;
        if proto::write_response(&mut stream, &response).await.is_err() {
            return;
        }
        if opcode == OpCode::AdminShutdown {
            // the client has its acknowledgement; now leave and stop
            node.leave().await;
            let _ = shutdown.send(true);
            return;
        }
    }
}
