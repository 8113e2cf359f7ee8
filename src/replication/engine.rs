use crate::client::PeerClient;
use crate::proto::Status;
use crate::ring::types::PeerInfo;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Notify, mpsc};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct ReplicationConfig {
    /// Total copies of each key, primary included.
    pub replication_factor: usize,
    /// Budget for one remote write attempt.
    pub request_timeout: Duration,
    /// How often a failed asynchronous task is re-enqueued before it is
    /// dropped.
    pub max_retries: u32,
    /// Asynchronous mode enqueues writes and returns immediately; a single
    /// background worker drains the queue.
    pub async_mode: bool,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            replication_factor: 3,
            request_timeout: Duration::from_secs(5),
            max_retries: 3,
            async_mode: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ReplicationError {
    #[error("replicated to {reached}/{required} peers")]
    Shortfall { reached: usize, required: usize },
}

#[derive(Debug, Clone)]
enum ReplicaOp {
    Put(Vec<u8>),
    Delete,
}

struct ReplicationTask {
    op: ReplicaOp,
    key: Vec<u8>,
    replicas: Vec<Arc<PeerInfo>>,
    retry_count: u32,
}

/// Pushes writes and deletes to a replica set.
///
/// In synchronous mode the caller waits for every attempted remote write and
/// gets a shortfall error if any of them failed. In asynchronous mode the
/// call enqueues a task and returns; the worker retries failed tasks with a
/// doubling backoff until `max_retries`. No lock is ever held across the
/// remote writes.
pub struct ReplicationEngine {
    config: ReplicationConfig,
    client: Arc<PeerClient>,
    queue: mpsc::UnboundedSender<ReplicationTask>,
    inbox: Mutex<Option<mpsc::UnboundedReceiver<ReplicationTask>>>,
    running: AtomicBool,
    shutdown: Notify,
}

impl ReplicationEngine {
    pub fn new(client: Arc<PeerClient>, config: ReplicationConfig) -> Arc<Self> {
        let (queue, inbox) = mpsc::unbounded_channel();
        Arc::new(Self {
            config,
            client,
            queue,
            inbox: Mutex::new(Some(inbox)),
            running: AtomicBool::new(false),
            shutdown: Notify::new(),
        })
    }

    pub fn replication_factor(&self) -> usize {
        self.config.replication_factor
    }

    pub fn is_async(&self) -> bool {
        self.config.async_mode
    }

    /// Spawns the background worker. A no-op in synchronous mode and when
    /// already started.
    pub fn start(self: &Arc<Self>) {
        if !self.config.async_mode {
            return;
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(inbox) = self.inbox.lock().unwrap().take() else {
            return;
        };
        let engine = self.clone();
        tokio::spawn(async move {
            engine.worker_loop(inbox).await;
        });
    }

    /// Signals the worker to stop after its current task.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.notify_waiters();
    }

    pub async fn replicate_put(
        &self,
        key: &[u8],
        value: &[u8],
        replicas: &[Arc<PeerInfo>],
    ) -> Result<(), ReplicationError> {
        if replicas.is_empty() {
            return Ok(());
        }
        if self.config.async_mode {
            let _ = self.queue.send(ReplicationTask {
                op: ReplicaOp::Put(value.to_vec()),
                key: key.to_vec(),
                replicas: replicas.to_vec(),
                retry_count: 0,
            });
            return Ok(());
        }
        self.fan_out(&ReplicaOp::Put(value.to_vec()), key, replicas)
            .await
    }

    pub async fn replicate_delete(
        &self,
        key: &[u8],
        replicas: &[Arc<PeerInfo>],
    ) -> Result<(), ReplicationError> {
        if replicas.is_empty() {
            return Ok(());
        }
        if self.config.async_mode {
            let _ = self.queue.send(ReplicationTask {
                op: ReplicaOp::Delete,
                key: key.to_vec(),
                replicas: replicas.to_vec(),
                retry_count: 0,
            });
            return Ok(());
        }
        self.fan_out(&ReplicaOp::Delete, key, replicas).await
    }

    /// Tries the replicas in order until one returns a value.
    pub async fn read_from_replicas(
        &self,
        key: &[u8],
        replicas: &[Arc<PeerInfo>],
    ) -> Option<Vec<u8>> {
        for replica in replicas {
            match timeout(
                self.config.request_timeout,
                self.client.get(&replica.endpoint(), key),
            )
            .await
            {
                Ok(Ok(response)) if response.status == Status::Success => {
                    return Some(response.value);
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => debug!("replica read from {} failed: {}", replica, e),
                Err(_) => debug!("replica read from {} timed out", replica),
            }
        }
        None
    }

    /// Re-homes keys that were replicated to a peer that has since failed:
    /// each key is pushed to the first reachable peer in `new_replicas` that
    /// is not the failed one.
    pub async fn handle_replica_failure(
        &self,
        failed: &PeerInfo,
        new_replicas: &[Arc<PeerInfo>],
        keys: &[(Vec<u8>, Vec<u8>)],
    ) {
        let mut moved = 0usize;
        for (key, value) in keys {
            for candidate in new_replicas {
                if candidate.id == failed.id {
                    continue;
                }
                match timeout(
                    self.config.request_timeout,
                    self.client.replicate_put(candidate, key, value),
                )
                .await
                {
                    Ok(Ok(())) => {
                        moved += 1;
                        break;
                    }
                    Ok(Err(e)) => debug!("re-replication to {} failed: {}", candidate, e),
                    Err(_) => debug!("re-replication to {} timed out", candidate),
                }
            }
        }
        info!(
            "re-replicated {}/{} keys after failure of {}",
            moved,
            keys.len(),
            failed
        );
    }

    /// One fan-out round: up to min(R-1, |replicas|) remote writes, success
    /// iff every attempted write succeeded. Sibling failures never cancel
    /// each other.
    async fn fan_out(
        &self,
        op: &ReplicaOp,
        key: &[u8],
        replicas: &[Arc<PeerInfo>],
    ) -> Result<(), ReplicationError> {
        let required = self
            .config
            .replication_factor
            .saturating_sub(1)
            .min(replicas.len());
        let mut reached = 0usize;
        for replica in &replicas[..required] {
            let attempt = match op {
                ReplicaOp::Put(value) => {
                    timeout(
                        self.config.request_timeout,
                        self.client.replicate_put(replica, key, value),
                    )
                    .await
                }
                ReplicaOp::Delete => {
                    timeout(
                        self.config.request_timeout,
                        self.client.replicate_delete(replica, key),
                    )
                    .await
                }
            };
            match attempt {
                Ok(Ok(())) => reached += 1,
                Ok(Err(e)) => warn!("replication to {} failed: {}", replica, e),
                Err(_) => warn!("replication to {} timed out", replica),
            }
        }
        if reached == required {
            Ok(())
        } else {
            Err(ReplicationError::Shortfall { reached, required })
        }
    }

    async fn worker_loop(self: Arc<Self>, mut inbox: mpsc::UnboundedReceiver<ReplicationTask>) {
        info!("replication worker started");
        loop {
            let task = tokio::select! {
                _ = self.shutdown.notified() => break,
                task = inbox.recv() => match task {
                    Some(task) => task,
                    None => break,
                },
            };
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            if task.retry_count > 0 {
                // doubling backoff, capped, with a little jitter
                let delay = (150u64 << (task.retry_count - 1).min(3)).min(1200);
                let jitter = rand::random::<u64>() % 50;
                tokio::time::sleep(Duration::from_millis(delay + jitter)).await;
            }
            if let Err(e) = self.fan_out(&task.op, &task.key, &task.replicas).await {
                if task.retry_count < self.config.max_retries {
                    warn!(
                        "replication task failed ({}), retry {}/{}",
                        e,
                        task.retry_count + 1,
                        self.config.max_retries
                    );
                    let _ = self.queue.send(ReplicationTask {
                        retry_count: task.retry_count + 1,
                        ..task
                    });
                } else {
                    error!(
                        "replication task dropped after {} retries ({})",
                        self.config.max_retries, e
                    );
                }
            }
        }
        info!("replication worker stopped");
    }
}
