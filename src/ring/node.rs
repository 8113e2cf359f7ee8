use crate::client::{ClientConfig, PeerClient};
use crate::ident::{ID_BITS, Id, in_interval};
use crate::proto::Status;
use crate::replication::detector::{FailureConfig, FailureDetector};
use crate::replication::engine::{ReplicationConfig, ReplicationEngine, ReplicationError};
use crate::ring::types::PeerInfo;
use crate::storage::memory::LocalStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

/// Successors cached for fault tolerance. Entry 0 is the immediate successor.
pub const SUCCESSOR_LIST_SIZE: usize = 8;

const STABILIZE_INTERVAL: Duration = Duration::from_secs(1);
const FIX_FINGERS_INTERVAL: Duration = Duration::from_millis(500);
const FAILURE_CHECK_INTERVAL: Duration = Duration::from_secs(2);
const STATUS_REPORT_INTERVAL: Duration = Duration::from_secs(30);
const DETECTOR_ENTRY_MAX_AGE: Duration = Duration::from_secs(30 * 60);

/// Hop bound for the iterative predecessor walk.
const LOOKUP_MAX_HOPS: usize = ID_BITS;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("key not found")]
    KeyNotFound,
    #[error("replication fell short: {0}")]
    Replication(#[from] ReplicationError),
    #[error("peer {0} unreachable")]
    Unreachable(String),
    #[error("remote peer answered {0:?}")]
    Remote(Status),
    #[error("node is shutting down")]
    ShuttingDown,
}

/// Routing state guarded by the single routing mutex. Nothing in here ever
/// performs I/O; every network operation snapshots what it needs, drops the
/// lock, and re-acquires it to apply updates.
struct Routing {
    predecessor: Option<Arc<PeerInfo>>,
    successors: Vec<Arc<PeerInfo>>,
    fingers: Vec<Arc<PeerInfo>>,
    next_finger: usize,
}

/// One node of the ring: routing state, the local store, the replication
/// engine and the failure detector, plus the maintenance tasks that keep the
/// ring converged under churn.
pub struct RingNode {
    info: Arc<PeerInfo>,
    routing: Mutex<Routing>,
    store: Arc<LocalStore>,
    replication: Arc<ReplicationEngine>,
    detector: Arc<FailureDetector>,
    client: Arc<PeerClient>,
    running: AtomicBool,
    maintenance_started: AtomicBool,
    shutdown: Notify,
}

impl RingNode {
    pub fn new(address: &str, port: u16, replication_config: ReplicationConfig) -> Arc<Self> {
        let info = Arc::new(PeerInfo::from_endpoint(address, port));
        let client = Arc::new(PeerClient::new(ClientConfig::default()));
        let replication = ReplicationEngine::new(client.clone(), replication_config);
        let detector = Arc::new(FailureDetector::new(
            client.clone(),
            FailureConfig::default(),
        ));
        let routing = Routing {
            predecessor: None,
            successors: vec![info.clone(); SUCCESSOR_LIST_SIZE],
            fingers: vec![info.clone(); ID_BITS],
            next_finger: 0,
        };
        Arc::new(Self {
            info,
            routing: Mutex::new(routing),
            store: Arc::new(LocalStore::new()),
            replication,
            detector,
            client,
            running: AtomicBool::new(true),
            maintenance_started: AtomicBool::new(false),
            shutdown: Notify::new(),
        })
    }

    pub fn info(&self) -> Arc<PeerInfo> {
        self.info.clone()
    }

    pub fn id(&self) -> Id {
        self.info.id
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    pub fn detector(&self) -> &Arc<FailureDetector> {
        &self.detector
    }

    pub fn replication(&self) -> &Arc<ReplicationEngine> {
        &self.replication
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // ---- lifecycle ----

    /// Initializes a single-node ring: no predecessor, every successor and
    /// finger slot pointing at this node.
    pub fn create(&self) {
        let mut routing = self.routing.lock().unwrap();
        routing.predecessor = None;
        routing.successors.fill(self.info.clone());
        routing.fingers.fill(self.info.clone());
        drop(routing);
        info!("created new ring as {}", self.info);
    }

    /// Joins the ring that `bootstrap` belongs to. The immediate successor
    /// comes from one remote lookup; correct predecessors and fingers emerge
    /// from subsequent stabilization and finger repair. The new node pulls no
    /// data; its successor pushes the appropriate subrange on notify.
    pub async fn join(&self, bootstrap: Arc<PeerInfo>) -> Result<(), KvError> {
        if bootstrap.id == self.info.id {
            self.create();
            return Ok(());
        }
        let successor = self
            .client
            .find_successor(&bootstrap, &self.info.id)
            .await
            .map_err(|e| {
                warn!("join via {} failed: {}", bootstrap, e);
                KvError::Unreachable(bootstrap.endpoint())
            })?;
        let successor = Arc::new(successor);

        let mut routing = self.routing.lock().unwrap();
        routing.predecessor = None;
        routing.successors.fill(successor.clone());
        routing.fingers.fill(successor.clone());
        drop(routing);

        info!("{} joined ring via {}", self.info, bootstrap);
        Ok(())
    }

    /// Spawns the stabilize, fix-fingers, failure-detection and status tasks
    /// plus the replication worker. Idempotent.
    pub fn start_maintenance(self: &Arc<Self>) {
        if self.maintenance_started.swap(true, Ordering::SeqCst) {
            return;
        }
        self.replication.start();

        let node = self.clone();
        tokio::spawn(async move { node.stabilize_loop().await });
        let node = self.clone();
        tokio::spawn(async move { node.fix_fingers_loop().await });
        let node = self.clone();
        tokio::spawn(async move { node.failure_loop().await });
        let node = self.clone();
        tokio::spawn(async move { node.status_loop().await });

        info!("started maintenance tasks for {}", self.info);
    }

    /// Graceful departure: stop the background work, hand every stored key
    /// to the successor, and collapse back to single-node state. Maintenance
    /// tasks are detached, not joined, so a stuck remote call cannot block
    /// shutdown; their bounded timeouts let them observe the flag shortly.
    pub async fn leave(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shutdown.notify_waiters();
        self.replication.stop();

        let successor = self.successor();
        if successor.id != self.info.id {
            let entries = self.store.snapshot();
            info!(
                "{} leaving ring, handing {} keys to {}",
                self.info,
                entries.len(),
                successor
            );
            let mut moved = 0usize;
            for (key, value) in &entries {
                match self.client.transfer_key(&successor, key, value).await {
                    Ok(()) => {
                        self.store.remove(key);
                        moved += 1;
                    }
                    Err(e) => warn!("leave handoff to {} failed: {}", successor, e),
                }
            }
            info!("handed over {}/{} keys", moved, entries.len());
        }

        {
            let mut routing = self.routing.lock().unwrap();
            routing.predecessor = None;
            routing.successors.fill(self.info.clone());
            routing.fingers.fill(self.info.clone());
        }

        // give detached tasks a beat to observe the flag
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    // ---- routing state accessors ----

    pub fn successor(&self) -> Arc<PeerInfo> {
        self.routing.lock().unwrap().successors[0].clone()
    }

    pub fn predecessor(&self) -> Option<Arc<PeerInfo>> {
        self.routing.lock().unwrap().predecessor.clone()
    }

    pub fn successor_list(&self) -> Vec<Arc<PeerInfo>> {
        self.routing.lock().unwrap().successors.clone()
    }

    /// Snapshot of the finger table, for inspection and tests.
    pub fn finger_table(&self) -> Vec<Arc<PeerInfo>> {
        self.routing.lock().unwrap().fingers.clone()
    }

    /// True iff this node owns `key_id`: the key lies in
    /// `(predecessor, self]`, or there is no predecessor (single-node ring).
    pub fn is_primary_for(&self, key_id: &Id) -> bool {
        let routing = self.routing.lock().unwrap();
        match &routing.predecessor {
            None => true,
            Some(predecessor) => in_interval(key_id, &predecessor.id, &self.info.id, true),
        }
    }

    /// Scans the finger table from the top for the entry closest below
    /// `target`, falling back to this node.
    pub fn closest_preceding(&self, target: &Id) -> Arc<PeerInfo> {
        let routing = self.routing.lock().unwrap();
        for finger in routing.fingers.iter().rev() {
            if finger.id != self.info.id && in_interval(&finger.id, &self.info.id, target, false) {
                return finger.clone();
            }
        }
        self.info.clone()
    }

    /// The first R-1 distinct successors that are not this node: the replica
    /// set for any key this node owns.
    pub fn replica_set(&self) -> Vec<Arc<PeerInfo>> {
        let want = self.replication.replication_factor().saturating_sub(1);
        let routing = self.routing.lock().unwrap();
        let mut replicas: Vec<Arc<PeerInfo>> = Vec::with_capacity(want);
        for successor in &routing.successors {
            if replicas.len() == want {
                break;
            }
            if successor.id == self.info.id {
                continue;
            }
            if replicas.iter().any(|peer| peer.id == successor.id) {
                continue;
            }
            replicas.push(successor.clone());
        }
        replicas
    }

    // ---- lookup ----

    /// Routes `target` to the node that owns it. One remote hop at most from
    /// here: the chosen finger recurses on its own table. A failed hop marks
    /// the finger in the failure detector and falls back to the immediate
    /// successor, which is always a safe (if slow) answer.
    pub async fn find_successor(&self, target: &Id) -> Arc<PeerInfo> {
        let s0 = self.successor();
        if in_interval(target, &self.info.id, &s0.id, true) {
            return s0;
        }
        let hop = self.closest_preceding(target);
        if hop.id == self.info.id {
            return s0;
        }
        match self.client.find_successor(&hop, target).await {
            Ok(found) => {
                self.detector.mark_alive(&hop);
                Arc::new(found)
            }
            Err(e) => {
                debug!("find_successor via {} failed: {}", hop, e);
                self.detector.mark_dead(&hop);
                s0
            }
        }
    }

    /// Iterative walk to the node that immediately precedes `target`.
    pub async fn find_predecessor(&self, target: &Id) -> Arc<PeerInfo> {
        let mut current = self.info.clone();
        let mut successor = self.successor();
        let mut hops = 0usize;
        while !in_interval(target, &current.id, &successor.id, true) && hops < LOOKUP_MAX_HOPS {
            hops += 1;
            let next = if current.id == self.info.id {
                self.closest_preceding(target)
            } else {
                match self.client.closest_preceding(&current, target).await {
                    Ok(peer) => Arc::new(peer),
                    Err(e) => {
                        debug!("predecessor walk stalled at {}: {}", current, e);
                        self.detector.report_failure(&current);
                        break;
                    }
                }
            };
            if next.id == current.id {
                break;
            }
            successor = if next.id == self.info.id {
                self.successor()
            } else {
                match self.client.get_successor(&next).await {
                    Ok(peer) => Arc::new(peer),
                    Err(e) => {
                        debug!("predecessor walk stalled at {}: {}", next, e);
                        self.detector.report_failure(&next);
                        break;
                    }
                }
            };
            current = next;
        }
        current
    }

    // ---- maintenance protocols ----

    /// One stabilization round: learn the successor's predecessor, adopt it
    /// if it sits between us, then notify the successor about us and refresh
    /// the successor-list tail. All RPCs happen with the routing lock
    /// released.
    pub async fn stabilize(&self) {
        let successor = self.successor();

        if successor.id == self.info.id {
            // Degenerate ring: the first node only ever learns of its first
            // peer through notify, so adopt a known predecessor as successor.
            let adopted = {
                let mut routing = self.routing.lock().unwrap();
                match routing.predecessor.clone() {
                    Some(predecessor) if predecessor.id != self.info.id => {
                        routing.successors[0] = predecessor.clone();
                        Some(predecessor)
                    }
                    _ => None,
                }
            };
            if let Some(peer) = adopted {
                info!("adopted predecessor {} as successor", peer);
                if let Err(e) = self.client.notify(&peer, &self.info).await {
                    debug!("notify {} failed: {}", peer, e);
                    self.detector.report_failure(&peer);
                }
            }
            return;
        }

        match self.client.get_predecessor(&successor).await {
            Ok(candidate) => {
                self.detector.mark_alive(&successor);
                if let Some(candidate) = candidate
                    && candidate.id != self.info.id
                    && in_interval(&candidate.id, &self.info.id, &successor.id, false)
                {
                    let mut routing = self.routing.lock().unwrap();
                    routing.successors[0] = Arc::new(candidate);
                }
            }
            Err(e) => {
                debug!("stabilize: successor {} unreachable: {}", successor, e);
                self.detector.report_failure(&successor);
            }
        }

        let current = self.successor();
        if current.id != self.info.id {
            if let Err(e) = self.client.notify(&current, &self.info).await {
                debug!("notify {} failed: {}", current, e);
                self.detector.report_failure(&current);
            }
        }

        self.refresh_successor_tail().await;
    }

    /// Rebuilds the successor list by walking `get_successor` from the
    /// immediate successor, stopping at this node, a repeat, or the first
    /// unreachable peer. Slots past the live chain fall back to this node.
    async fn refresh_successor_tail(&self) {
        let head = self.successor();
        if head.id == self.info.id {
            return;
        }
        let mut chain: Vec<Arc<PeerInfo>> = vec![head];
        while chain.len() < SUCCESSOR_LIST_SIZE {
            let last = chain.last().cloned().unwrap_or_else(|| self.info.clone());
            let next = match self.client.get_successor(&last).await {
                Ok(peer) => Arc::new(peer),
                Err(_) => break,
            };
            if next.id == self.info.id || chain.iter().any(|peer| peer.id == next.id) {
                break;
            }
            chain.push(next);
        }

        let mut routing = self.routing.lock().unwrap();
        // only apply if the head is still what we walked from
        if routing.successors[0].id != chain[0].id {
            return;
        }
        for slot in 0..SUCCESSOR_LIST_SIZE {
            routing.successors[slot] = chain
                .get(slot)
                .cloned()
                .unwrap_or_else(|| self.info.clone());
        }
    }

    /// Inbound notify: `candidate` believes it is our predecessor. Accept it
    /// if we have none, or if it sits between the old predecessor and us;
    /// then, outside the lock, push it the keys it now owns.
    pub async fn notify(&self, candidate: Arc<PeerInfo>) {
        if candidate.id == self.info.id {
            return;
        }
        let handoff = {
            let mut routing = self.routing.lock().unwrap();
            let accept = match &routing.predecessor {
                None => true,
                Some(predecessor) => {
                    in_interval(&candidate.id, &predecessor.id, &self.info.id, false)
                }
            };
            if accept {
                let old = routing.predecessor.replace(candidate.clone());
                Some(old)
            } else {
                None
            }
        };
        if let Some(old_predecessor) = handoff {
            info!("{} adopted predecessor {}", self.info, candidate);
            // keys in (old predecessor, new predecessor] belong to the new
            // predecessor now; with no old predecessor the lower bound is us
            let lower = old_predecessor
                .map(|peer| peer.id)
                .unwrap_or(self.info.id);
            self.push_range(&candidate, &lower, &candidate.id).await;
        }
    }

    /// Pushes every stored key whose id lies in `(lower, upper]` to `target`,
    /// removing each locally only after a successful push. Failed keys stay
    /// put; the next notify round retries them.
    async fn push_range(&self, target: &Arc<PeerInfo>, lower: &Id, upper: &Id) {
        let entries = self
            .store
            .filter(|key| in_interval(&Id::hash(key), lower, upper, true));
        if entries.is_empty() {
            return;
        }
        let mut moved = 0usize;
        for (key, value) in &entries {
            match self.client.transfer_key(target, key, value).await {
                Ok(()) => {
                    self.store.remove(key);
                    moved += 1;
                }
                Err(e) => warn!("key transfer to {} failed: {}", target, e),
            }
        }
        info!("transferred {}/{} keys to {}", moved, entries.len(), target);
    }

    /// One finger-repair round: advance the rotating index, look up the
    /// finger target with the lock released, and store the result.
    pub async fn fix_fingers(&self) {
        let (index, target) = {
            let mut routing = self.routing.lock().unwrap();
            routing.next_finger = (routing.next_finger + 1) % ID_BITS;
            (routing.next_finger, self.info.id.add_pow2(routing.next_finger))
        };
        let successor = self.find_successor(&target).await;
        let mut routing = self.routing.lock().unwrap();
        routing.fingers[index] = successor;
    }

    // ---- failure handling ----

    /// One failure-detection round: probe the predecessor and every distinct
    /// successor (network I/O outside all ring locks), repair around any
    /// peer the detector now reports failed, then drop stale entries.
    pub async fn check_peers(&self) {
        let peers: Vec<Arc<PeerInfo>> = {
            let routing = self.routing.lock().unwrap();
            let mut peers: Vec<Arc<PeerInfo>> = Vec::new();
            for successor in &routing.successors {
                if successor.id != self.info.id
                    && !peers.iter().any(|peer| peer.id == successor.id)
                {
                    peers.push(successor.clone());
                }
            }
            if let Some(predecessor) = &routing.predecessor
                && predecessor.id != self.info.id
                && !peers.iter().any(|peer| peer.id == predecessor.id)
            {
                peers.push(predecessor.clone());
            }
            peers
        };

        let mut failed: Vec<Arc<PeerInfo>> = Vec::new();
        for peer in peers {
            if !self.is_running() {
                return;
            }
            self.detector.probe(&peer).await;
            if self.detector.is_failed(&peer) {
                failed.push(peer);
            }
        }
        for peer in failed {
            if !self.is_running() {
                return;
            }
            self.handle_failure(&peer).await;
        }
        self.detector.evict_older_than(DETECTOR_ENTRY_MAX_AGE);
    }

    /// Repairs the routing state around a failed peer: drop it from the
    /// successor list (shifting survivors left), forget it as predecessor,
    /// rewrite fingers that point at it, and re-replicate what we own when
    /// the replica set has fallen below strength.
    pub async fn handle_failure(&self, failed: &PeerInfo) {
        warn!("handling failure of {}", failed);
        let lost_successor = {
            let mut routing = self.routing.lock().unwrap();
            let mut lost = false;
            while let Some(position) = routing
                .successors
                .iter()
                .position(|peer| peer.id == failed.id)
            {
                routing.successors.remove(position);
                lost = true;
            }
            while routing.successors.len() < SUCCESSOR_LIST_SIZE {
                let pad = routing
                    .successors
                    .first()
                    .cloned()
                    .unwrap_or_else(|| self.info.clone());
                routing.successors.push(pad);
            }
            if routing
                .predecessor
                .as_ref()
                .is_some_and(|peer| peer.id == failed.id)
            {
                routing.predecessor = None;
                debug!("predecessor failed, stabilization will repair it");
            }
            let fallback = routing.successors[0].clone();
            for finger in routing.fingers.iter_mut() {
                if finger.id == failed.id {
                    *finger = fallback.clone();
                }
            }
            lost
        };

        if lost_successor {
            // refill the tail with a fresh lookup, outside the lock
            let fresh = self.find_successor(&self.info.id).await;
            let mut routing = self.routing.lock().unwrap();
            if let Some(last) = routing.successors.last_mut() {
                *last = fresh;
            }
        }

        let want = self.replication.replication_factor().saturating_sub(1);
        if self.replica_set().len() < want {
            self.re_replicate().await;
        }
    }

    /// Pushes every key this node owns to its current replica set. Runs when
    /// a failure leaves the set smaller than the replication factor calls
    /// for.
    pub async fn re_replicate(&self) {
        let replicas = self.replica_set();
        if replicas.is_empty() {
            return;
        }
        let mut pushed = 0usize;
        for (key, value) in self.store.snapshot() {
            let key_id = Id::hash(&key);
            if !self.is_primary_for(&key_id) {
                continue;
            }
            match self.replication.replicate_put(&key, &value, &replicas).await {
                Ok(()) => pushed += 1,
                Err(e) => debug!("re-replication shortfall: {}", e),
            }
        }
        if pushed > 0 {
            info!("re-replicated {} keys to {} replicas", pushed, replicas.len());
        }
    }

    // ---- client data operations ----

    /// PUT: store on the owner and fan out to its replica set. When this
    /// node is not the owner the request is forwarded and the owner's answer
    /// relayed. In synchronous mode a replication shortfall rolls the local
    /// write back.
    pub async fn store_value(&self, key: &[u8], value: &[u8]) -> Result<(), KvError> {
        if !self.is_running() {
            return Err(KvError::ShuttingDown);
        }
        let key_id = Id::hash(key);
        if self.is_primary_for(&key_id) {
            return self.store_as_primary(key, value).await;
        }
        let owner = self.find_successor(&key_id).await;
        if owner.id == self.info.id {
            return self.store_as_primary(key, value).await;
        }
        match self.client.put(&owner.endpoint(), key, value).await {
            Ok(response) => match response.status {
                Status::Success => Ok(()),
                Status::KeyNotFound => Err(KvError::KeyNotFound),
                other => Err(KvError::Remote(other)),
            },
            Err(e) => {
                warn!("PUT forward to {} failed: {}", owner, e);
                self.detector.report_failure(&owner);
                Err(KvError::Unreachable(owner.endpoint()))
            }
        }
    }

    async fn store_as_primary(&self, key: &[u8], value: &[u8]) -> Result<(), KvError> {
        self.store.put(key.to_vec(), value.to_vec());
        let replicas = self.replica_set();
        if replicas.is_empty() {
            return Ok(());
        }
        match self.replication.replicate_put(key, value, &replicas).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // synchronous shortfall: roll back so the client never sees
                // a write the replicas do not have
                self.store.remove(key);
                error!("synchronous replication failed, rolled back local write: {}", e);
                Err(KvError::Replication(e))
            }
        }
    }

    /// GET: owners read locally and fall back to their replica set; a
    /// non-owner that holds a replica copy answers from it, and otherwise
    /// forwards to the owner.
    pub async fn retrieve_value(&self, key: &[u8]) -> Result<Vec<u8>, KvError> {
        if !self.is_running() {
            return Err(KvError::ShuttingDown);
        }
        let key_id = Id::hash(key);
        if self.is_primary_for(&key_id) {
            return self.retrieve_as_primary(key).await;
        }
        if let Some(value) = self.store.get(key) {
            // replica copy held locally
            return Ok(value);
        }
        let owner = self.find_successor(&key_id).await;
        if owner.id == self.info.id {
            return self.retrieve_as_primary(key).await;
        }
        match self.client.get(&owner.endpoint(), key).await {
            Ok(response) => match response.status {
                Status::Success => Ok(response.value),
                Status::KeyNotFound => Err(KvError::KeyNotFound),
                other => Err(KvError::Remote(other)),
            },
            Err(e) => {
                warn!("GET forward to {} failed: {}", owner, e);
                self.detector.report_failure(&owner);
                Err(KvError::Unreachable(owner.endpoint()))
            }
        }
    }

    async fn retrieve_as_primary(&self, key: &[u8]) -> Result<Vec<u8>, KvError> {
        if let Some(value) = self.store.get(key) {
            return Ok(value);
        }
        let replicas = self.replica_set();
        if !replicas.is_empty()
            && let Some(value) = self.replication.read_from_replicas(key, &replicas).await
        {
            return Ok(value);
        }
        Err(KvError::KeyNotFound)
    }

    /// DELETE: the owner verifies the key exists somewhere (locally or on a
    /// replica), removes it locally, and pushes the delete to the replica
    /// set. Replica inconsistencies are logged, never surfaced.
    pub async fn remove_value(&self, key: &[u8]) -> Result<(), KvError> {
        if !self.is_running() {
            return Err(KvError::ShuttingDown);
        }
        let key_id = Id::hash(key);
        if self.is_primary_for(&key_id) {
            return self.remove_as_primary(key).await;
        }
        let owner = self.find_successor(&key_id).await;
        if owner.id == self.info.id {
            return self.remove_as_primary(key).await;
        }
        match self.client.delete(&owner.endpoint(), key).await {
            Ok(response) => match response.status {
                Status::Success => Ok(()),
                Status::KeyNotFound => Err(KvError::KeyNotFound),
                other => Err(KvError::Remote(other)),
            },
            Err(e) => {
                warn!("DELETE forward to {} failed: {}", owner, e);
                self.detector.report_failure(&owner);
                Err(KvError::Unreachable(owner.endpoint()))
            }
        }
    }

    async fn remove_as_primary(&self, key: &[u8]) -> Result<(), KvError> {
        let replicas = self.replica_set();
        let exists_here = self.store.exists(key);
        if !exists_here {
            let on_replica = !replicas.is_empty()
                && self
                    .replication
                    .read_from_replicas(key, &replicas)
                    .await
                    .is_some();
            if !on_replica {
                return Err(KvError::KeyNotFound);
            }
        }
        self.store.remove(key);
        if !replicas.is_empty()
            && let Err(e) = self.replication.replicate_delete(key, &replicas).await
        {
            warn!(
                "replica delete incomplete, some replicas may be inconsistent: {}",
                e
            );
        }
        Ok(())
    }

    /// Stores a key handed over by a peer (join or leave transfer), without
    /// any ownership routing.
    pub fn accept_key(&self, key: Vec<u8>, value: Vec<u8>) {
        self.store.put(key, value);
    }

    // ---- background loops ----

    async fn stabilize_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(STABILIZE_INTERVAL);
        while self.is_running() {
            tokio::select! {
                _ = interval.tick() => self.stabilize().await,
                _ = self.shutdown.notified() => break,
            }
        }
        debug!("stabilize task exited");
    }

    async fn fix_fingers_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(FIX_FINGERS_INTERVAL);
        while self.is_running() {
            tokio::select! {
                _ = interval.tick() => self.fix_fingers().await,
                _ = self.shutdown.notified() => break,
            }
        }
        debug!("fix-fingers task exited");
    }

    async fn failure_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(FAILURE_CHECK_INTERVAL);
        while self.is_running() {
            tokio::select! {
                _ = interval.tick() => self.check_peers().await,
                _ = self.shutdown.notified() => break,
            }
        }
        debug!("failure-detection task exited");
    }

    async fn status_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(STATUS_REPORT_INTERVAL);
        while self.is_running() {
            tokio::select! {
                _ = interval.tick() => {
                    let predecessor = self.predecessor();
                    let successor = self.successor();
                    info!(
                        "ring status: predecessor={} successor={} keys={}",
                        predecessor
                            .map(|peer| peer.to_string())
                            .unwrap_or_else(|| "unknown".to_string()),
                        successor,
                        self.store.len()
                    );
                }
                _ = self.shutdown.notified() => break,
            }
        }
    }
}
