use crate::client::PeerClient;
use crate::ring::types::PeerInfo;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::info;

#[derive(Debug, Clone)]
pub struct FailureConfig {
    /// Upper bound on a single liveness probe.
    pub probe_timeout: Duration,
    /// Consecutive failed probes before a peer is considered failed. A peer
    /// becomes suspected at half this count.
    pub failure_threshold: u32,
}

impl Default for FailureConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(5),
            failure_threshold: 3,
        }
    }
}

#[derive(Debug, Clone)]
struct PeerStatus {
    last_contact: Instant,
    consecutive_failures: u32,
    suspected: bool,
    failed: bool,
}

impl PeerStatus {
    fn healthy() -> Self {
        Self {
            last_contact: Instant::now(),
            consecutive_failures: 0,
            suspected: false,
            failed: false,
        }
    }
}

/// Tracks per-peer liveness with consecutive-failure thresholding.
///
/// The state machine starts `healthy`. Each failed probe increments the
/// counter; at half the threshold the peer becomes suspected, at the full
/// threshold it becomes failed. Any successful probe resets it to healthy.
pub struct FailureDetector {
    config: FailureConfig,
    client: Arc<PeerClient>,
    statuses: DashMap<String, PeerStatus>,
}

impl FailureDetector {
    pub fn new(client: Arc<PeerClient>, config: FailureConfig) -> Self {
        Self {
            config,
            client,
            statuses: DashMap::new(),
        }
    }

    /// Issues a liveness probe and records the outcome. The network round
    /// trip happens before the status map is touched, so probing never
    /// blocks other status readers.
    pub async fn probe(&self, peer: &PeerInfo) -> bool {
        let alive = matches!(
            timeout(self.config.probe_timeout, self.client.ping(peer)).await,
            Ok(Ok(()))
        );
        if alive {
            self.mark_alive(peer);
        } else {
            self.report_failure(peer);
        }
        alive
    }

    /// Resets the peer to healthy.
    pub fn mark_alive(&self, peer: &PeerInfo) {
        self.statuses.insert(peer.endpoint(), PeerStatus::healthy());
    }

    /// Records one failed contact and applies the thresholds.
    pub fn report_failure(&self, peer: &PeerInfo) {
        let mut status = self
            .statuses
            .entry(peer.endpoint())
            .or_insert_with(PeerStatus::healthy);
        status.consecutive_failures += 1;
        if status.consecutive_failures >= self.config.failure_threshold {
            if !status.failed {
                info!("peer {} marked as failed", peer);
            }
            status.failed = true;
            status.suspected = true;
        } else if status.consecutive_failures >= (self.config.failure_threshold / 2).max(1) {
            status.suspected = true;
        }
    }

    /// Forces the peer into the failed state, counter included, so the
    /// failed/threshold relationship stays intact.
    pub fn mark_dead(&self, peer: &PeerInfo) {
        let mut status = self
            .statuses
            .entry(peer.endpoint())
            .or_insert_with(PeerStatus::healthy);
        status.consecutive_failures = status
            .consecutive_failures
            .max(self.config.failure_threshold);
        status.suspected = true;
        status.failed = true;
    }

    pub fn is_failed(&self, peer: &PeerInfo) -> bool {
        self.statuses
            .get(&peer.endpoint())
            .map(|status| status.failed)
            .unwrap_or(false)
    }

    pub fn is_suspected(&self, peer: &PeerInfo) -> bool {
        self.statuses
            .get(&peer.endpoint())
            .map(|status| status.suspected)
            .unwrap_or(false)
    }

    /// Snapshot of the peers currently in the failed state.
    pub fn failed_peers(&self) -> Vec<PeerInfo> {
        self.statuses
            .iter()
            .filter(|entry| entry.value().failed)
            .filter_map(|entry| PeerInfo::parse(entry.key()))
            .collect()
    }

    /// Garbage-collects entries not contacted within `max_age`.
    pub fn evict_older_than(&self, max_age: Duration) {
        // nothing can be older than the process itself
        let Some(cutoff) = Instant::now().checked_sub(max_age) else {
            return;
        };
        self.statuses
            .retain(|_, status| status.last_contact >= cutoff);
    }
}
