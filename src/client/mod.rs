//! Peer RPC Client
//!
//! Invokes operations on remote nodes over the binary wire protocol. Every
//! call opens a short-lived connection, bounded by a connect timeout and by
//! per-operation send/receive timeouts, so a wedged peer can never pin a
//! caller for longer than the configured budget. Failures surface as typed
//! errors; callers decide whether to report the peer to the failure detector.


use crate::ident::Id;
use crate::proto::{self, OpCode, REPLICA_DELETE, REPLICA_PUT, Request, Response, Status};
use crate::ring::types::PeerInfo;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Budget for establishing the TCP connection.
    pub connect_timeout: Duration,
    /// Budget for each send and each receive on an established connection.
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(1),
            request_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("timed out talking to {0}")]
    TimedOut(String),
    #[error("connection to {0} failed: {1}")]
    Connect(String, std::io::Error),
    #[error(transparent)]
    Frame(#[from] proto::FrameError),
    #[error("peer answered {0:?}")]
    Failed(Status),
    #[error("malformed peer payload")]
    BadPayload,
}

pub struct PeerClient {
    config: ClientConfig,
}

impl PeerClient {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    /// Sends one request to `endpoint` over a fresh connection and reads the
    /// response. The connection is dropped afterwards.
    pub async fn call(&self, endpoint: &str, request: Request) -> Result<Response, RpcError> {
        let mut stream = timeout(self.config.connect_timeout, TcpStream::connect(endpoint))
            .await
            .map_err(|_| RpcError::TimedOut(endpoint.to_string()))?
            .map_err(|e| RpcError::Connect(endpoint.to_string(), e))?;

        timeout(
            self.config.request_timeout,
            proto::write_request(&mut stream, &request),
        )
        .await
        .map_err(|_| RpcError::TimedOut(endpoint.to_string()))??;

        let response = timeout(
            self.config.request_timeout,
            proto::read_response(&mut stream),
        )
        .await
        .map_err(|_| RpcError::TimedOut(endpoint.to_string()))??;

        Ok(response)
    }

    fn expect_success(response: Response) -> Result<Response, RpcError> {
        if response.status == Status::Success {
            Ok(response)
        } else {
            Err(RpcError::Failed(response.status))
        }
    }

    fn peer_from_value(value: &[u8]) -> Result<PeerInfo, RpcError> {
        let text = std::str::from_utf8(value).map_err(|_| RpcError::BadPayload)?;
        PeerInfo::parse(text).ok_or(RpcError::BadPayload)
    }

    // ---- ring control operations ----

    pub async fn find_successor(&self, peer: &PeerInfo, id: &Id) -> Result<PeerInfo, RpcError> {
        let request = Request::new(OpCode::FindSuccessor, id.as_bytes().to_vec(), Vec::new());
        let response = Self::expect_success(self.call(&peer.endpoint(), request).await?)?;
        Self::peer_from_value(&response.value)
    }

    pub async fn closest_preceding(&self, peer: &PeerInfo, id: &Id) -> Result<PeerInfo, RpcError> {
        let request = Request::new(OpCode::ClosestPreceding, id.as_bytes().to_vec(), Vec::new());
        let response = Self::expect_success(self.call(&peer.endpoint(), request).await?)?;
        Self::peer_from_value(&response.value)
    }

    /// Asks a peer for its predecessor. `None` means the peer has no
    /// predecessor yet, which is a normal answer, not a failure.
    pub async fn get_predecessor(&self, peer: &PeerInfo) -> Result<Option<PeerInfo>, RpcError> {
        let request = Request::new(OpCode::GetPredecessor, Vec::new(), Vec::new());
        let response = self.call(&peer.endpoint(), request).await?;
        match response.status {
            Status::Success => Ok(Some(Self::peer_from_value(&response.value)?)),
            Status::KeyNotFound => Ok(None),
            other => Err(RpcError::Failed(other)),
        }
    }

    pub async fn get_successor(&self, peer: &PeerInfo) -> Result<PeerInfo, RpcError> {
        let request = Request::new(OpCode::GetSuccessor, Vec::new(), Vec::new());
        let response = Self::expect_success(self.call(&peer.endpoint(), request).await?)?;
        Self::peer_from_value(&response.value)
    }

    pub async fn notify(&self, peer: &PeerInfo, about: &PeerInfo) -> Result<(), RpcError> {
        let request = Request::new(
            OpCode::Notify,
            Vec::new(),
            about.endpoint().into_bytes(),
        );
        Self::expect_success(self.call(&peer.endpoint(), request).await?)?;
        Ok(())
    }

    pub async fn ping(&self, peer: &PeerInfo) -> Result<(), RpcError> {
        let request = Request::new(OpCode::Ping, Vec::new(), Vec::new());
        Self::expect_success(self.call(&peer.endpoint(), request).await?)?;
        Ok(())
    }

    pub async fn node_info(&self, endpoint: &str) -> Result<PeerInfo, RpcError> {
        let request = Request::new(OpCode::NodeInfo, Vec::new(), Vec::new());
        let response = Self::expect_success(self.call(endpoint, request).await?)?;
        Self::peer_from_value(&response.value)
    }

    /// Hands a key over to `peer`, which stores it without any ownership
    /// routing. Used for join and leave transfers.
    pub async fn transfer_key(
        &self,
        peer: &PeerInfo,
        key: &[u8],
        value: &[u8],
    ) -> Result<(), RpcError> {
        let request = Request::new(OpCode::TransferKey, key.to_vec(), value.to_vec());
        Self::expect_success(self.call(&peer.endpoint(), request).await?)?;
        Ok(())
    }

    pub async fn replicate_put(
        &self,
        peer: &PeerInfo,
        key: &[u8],
        value: &[u8],
    ) -> Result<(), RpcError> {
        let mut payload = Vec::with_capacity(1 + value.len());
        payload.push(REPLICA_PUT);
        payload.extend_from_slice(value);
        let request = Request::new(OpCode::Replicate, key.to_vec(), payload);
        Self::expect_success(self.call(&peer.endpoint(), request).await?)?;
        Ok(())
    }

    pub async fn replicate_delete(&self, peer: &PeerInfo, key: &[u8]) -> Result<(), RpcError> {
        let request = Request::new(OpCode::Replicate, key.to_vec(), vec![REPLICA_DELETE]);
        Self::expect_success(self.call(&peer.endpoint(), request).await?)?;
        Ok(())
    }

    // ---- client data operations ----
    //
    // These return the raw response so forwarding nodes can relay whatever
    // the owner answered, and so the command-line client can observe a
    // REDIRECT and follow it.

    pub async fn put(&self, endpoint: &str, key: &[u8], value: &[u8]) -> Result<Response, RpcError> {
        self.call(endpoint, Request::new(OpCode::Put, key.to_vec(), value.to_vec()))
            .await
    }

    pub async fn get(&self, endpoint: &str, key: &[u8]) -> Result<Response, RpcError> {
        self.call(endpoint, Request::new(OpCode::Get, key.to_vec(), Vec::new()))
            .await
    }

    pub async fn delete(&self, endpoint: &str, key: &[u8]) -> Result<Response, RpcError> {
        self.call(endpoint, Request::new(OpCode::Delete, key.to_vec(), Vec::new()))
            .await
    }

    pub async fn admin_shutdown(&self, endpoint: &str) -> Result<(), RpcError> {
        let request = Request::new(OpCode::AdminShutdown, Vec::new(), Vec::new());
        Self::expect_success(self.call(endpoint, request).await?)?;
        Ok(())
    }
}

impl Default for PeerClient {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}
