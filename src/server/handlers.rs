//! Request Dispatcher
//!
//! Maps every inbound operation onto the corresponding ring-node method and
//! serializes the result. Client data operations route through the node's
//! ownership logic, which forwards to the responsible peer when this node is
//! not the owner; peer control operations answer from local ring state.

use crate::ident::Id;
use crate::proto::{OpCode, REPLICA_DELETE, REPLICA_PUT, Request, Response};
use crate::ring::node::{KvError, RingNode};
use crate::ring::types::PeerInfo;
use std::sync::Arc;
use tracing::debug;

pub async fn dispatch(node: &Arc<RingNode>, request: Request) -> Response {
    match request.opcode {
        OpCode::Get => handle_get(node, &request.key).await,
        OpCode::Put => handle_put(node, &request.key, &request.value).await,
        OpCode::Delete => handle_delete(node, &request.key).await,
        OpCode::Ping => Response::ok(),
        OpCode::FindSuccessor => handle_find_successor(node, &request.key).await,
        OpCode::FindPredecessor => handle_find_predecessor(node, &request.key).await,
        OpCode::GetPredecessor => match node.predecessor() {
            Some(peer) => Response::success(peer.endpoint().into_bytes()),
            None => Response::key_not_found(),
        },
        OpCode::GetSuccessor => Response::success(node.successor().endpoint().into_bytes()),
        OpCode::ClosestPreceding => match Id::from_slice(&request.key) {
            Some(target) => {
                Response::success(node.closest_preceding(&target).endpoint().into_bytes())
            }
            None => Response::error(),
        },
        OpCode::NodeInfo => Response::success(node.info().endpoint().into_bytes()),
        OpCode::Notify => handle_notify(node, &request.value).await,
        OpCode::TransferKey => {
            node.accept_key(request.key, request.value);
            Response::ok()
        }
        OpCode::Replicate => handle_replicate(node, request),
        OpCode::Join => handle_join(node, &request.value).await,
        OpCode::Stabilize => {
            node.stabilize().await;
            Response::ok()
        }
        // acknowledged here; the connection handler performs the teardown
        OpCode::AdminShutdown => Response::ok(),
    }
}

fn status_for(error: &KvError) -> Response {
    match error {
        KvError::KeyNotFound => Response::key_not_found(),
        _ => Response::error(),
    }
}

async fn handle_get(node: &Arc<RingNode>, key: &[u8]) -> Response {
    match node.retrieve_value(key).await {
        Ok(value) => Response::success(value),
        Err(e) => {
            debug!("GET failed: {}", e);
            status_for(&e)
        }
    }
}

async fn handle_put(node: &Arc<RingNode>, key: &[u8], value: &[u8]) -> Response {
    match node.store_value(key, value).await {
        Ok(()) => Response::ok(),
        Err(e) => {
            debug!("PUT failed: {}", e);
            status_for(&e)
        }
    }
}

async fn handle_delete(node: &Arc<RingNode>, key: &[u8]) -> Response {
    match node.remove_value(key).await {
        Ok(()) => Response::ok(),
        Err(e) => {
            debug!("DELETE failed: {}", e);
            status_for(&e)
        }
    }
}

async fn handle_find_successor(node: &Arc<RingNode>, key: &[u8]) -> Response {
    let Some(target) = Id::from_slice(key) else {
        return Response::error();
    };
    let successor = node.find_successor(&target).await;
    Response::success(successor.endpoint().into_bytes())
}

async fn handle_find_predecessor(node: &Arc<RingNode>, key: &[u8]) -> Response {
    let Some(target) = Id::from_slice(key) else {
        return Response::error();
    };
    let predecessor = node.find_predecessor(&target).await;
    Response::success(predecessor.endpoint().into_bytes())
}

async fn handle_notify(node: &Arc<RingNode>, value: &[u8]) -> Response {
    let Some(candidate) = parse_peer(value) else {
        return Response::error();
    };
    node.notify(Arc::new(candidate)).await;
    Response::ok()
}

/// Replica write pushed by an owner. Applied to the local store directly:
/// replicas are by definition not the owner, so this path must bypass the
/// ownership routing that client PUT/DELETE go through.
fn handle_replicate(node: &Arc<RingNode>, request: Request) -> Response {
    match request.value.split_first() {
        Some((&REPLICA_PUT, value)) => {
            node.store().put(request.key, value.to_vec());
            Response::ok()
        }
        Some((&REPLICA_DELETE, _)) => {
            node.store().remove(&request.key);
            Response::ok()
        }
        _ => Response::error(),
    }
}

async fn handle_join(node: &Arc<RingNode>, value: &[u8]) -> Response {
    let Some(bootstrap) = parse_peer(value) else {
        return Response::error();
    };
    match node.join(Arc::new(bootstrap)).await {
        Ok(()) => Response::ok(),
        Err(e) => {
            debug!("JOIN failed: {}", e);
            Response::error()
        }
    }
}

fn parse_peer(value: &[u8]) -> Option<PeerInfo> {
    let text = std::str::from_utf8(value).ok()?;
    PeerInfo::parse(text)
}
