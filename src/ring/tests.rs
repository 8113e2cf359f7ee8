#[cfg(test)]
mod tests {
    use crate::ident::Id;
    use crate::replication::engine::ReplicationConfig;
    use crate::ring::node::{KvError, RingNode, SUCCESSOR_LIST_SIZE};
    use crate::ring::types::PeerInfo;
    use crate::server::Server;
    use std::sync::Arc;

    // Node with a live listener, for tests that exercise peer RPCs.
    async fn spawn_server(
        replication_factor: usize,
    ) -> (Arc<RingNode>, tokio::task::JoinHandle<()>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let config = ReplicationConfig {
            replication_factor,
            ..ReplicationConfig::default()
        };
        let node = RingNode::new("127.0.0.1", port, config);
        node.create();
        let server = Server::new(listener, node.clone());
        let handle = tokio::spawn(server.run());
        (node, handle)
    }

    // Three live nodes joined into one converged ring.
    async fn spawn_ring_of_three(
        replication_factor: usize,
    ) -> ([Arc<RingNode>; 3], [tokio::task::JoinHandle<()>; 3]) {
        let (a, ha) = spawn_server(replication_factor).await;
        let (b, hb) = spawn_server(replication_factor).await;
        let (c, hc) = spawn_server(replication_factor).await;
        b.join(a.info()).await.unwrap();
        c.join(a.info()).await.unwrap();
        for _ in 0..8 {
            b.stabilize().await;
            c.stabilize().await;
            a.stabilize().await;
        }
        ([a, b, c], [ha, hb, hc])
    }

    // A key the given node owns, found by scanning candidate names.
    fn owned_key(node: &RingNode) -> Vec<u8> {
        (0u32..10_000)
            .map(|i| format!("probe{}", i).into_bytes())
            .find(|key| node.is_primary_for(&Id::hash(key)))
            .expect("no key owned by node")
    }

    // Finds an address whose ring identifier starts below `limit` (or at or
    // above it, when `below` is false), so tests can place crafted peers on
    // a known side of the node.
    fn endpoint_with_leading_byte(limit: u8, below: bool) -> (String, u16) {
        for i in 0..4000u32 {
            let address = format!("10.0.{}.{}", i / 250, i % 250);
            let port = (9000 + i % 1000) as u16;
            let lead = Id::for_endpoint(&address, port).as_bytes()[0];
            if (below && lead < limit) || (!below && lead >= limit) {
                return (address, port);
            }
        }
        panic!("no suitable endpoint found");
    }

    fn peer_at(lead: u8) -> Arc<PeerInfo> {
        let mut raw = [0u8; 20];
        raw[0] = lead;
        Arc::new(PeerInfo::new(Id::from_bytes(raw), "10.99.99.99", 1))
    }

    // ============================================================
    // PEER DESCRIPTORS
    // ============================================================

    #[test]
    fn test_peer_identity_is_derived_from_endpoint() {
        let peer = PeerInfo::from_endpoint("127.0.0.1", 20000);
        assert_eq!(peer.id, Id::hash(b"127.0.0.1:20000"));
        assert_eq!(peer.endpoint(), "127.0.0.1:20000");
    }

    #[test]
    fn test_peer_equality_is_by_identifier_only() {
        let a = PeerInfo::from_endpoint("127.0.0.1", 20000);
        let b = PeerInfo::parse("127.0.0.1:20000").unwrap();
        let c = PeerInfo::from_endpoint("127.0.0.1", 20001);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_peer_parse_rejects_garbage() {
        assert!(PeerInfo::parse("127.0.0.1:20000").is_some());
        assert!(PeerInfo::parse("no-port-here").is_none());
        assert!(PeerInfo::parse(":8080").is_none());
        assert!(PeerInfo::parse("host:notaport").is_none());
        assert!(PeerInfo::parse("host:99999").is_none());
    }

    // ============================================================
    // SINGLE-NODE RING
    // ============================================================

    #[tokio::test]
    async fn test_single_node_owns_everything() {
        let node = RingNode::new("127.0.0.1", 20000, ReplicationConfig::default());
        node.create();

        assert!(node.predecessor().is_none());
        assert_eq!(node.successor().id, node.id());
        assert_eq!(node.successor_list().len(), SUCCESSOR_LIST_SIZE);
        assert!(node.replica_set().is_empty());

        for sample in [b"a".as_slice(), b"key1", b"user:123", b""] {
            assert!(node.is_primary_for(&Id::hash(sample)));
        }
        assert!(node.is_primary_for(&node.id()));
    }

    #[tokio::test]
    async fn test_single_node_lookups_answer_self() {
        let node = RingNode::new("127.0.0.1", 20000, ReplicationConfig::default());
        node.create();

        let target = Id::hash(b"anything");
        assert_eq!(node.find_successor(&target).await.id, node.id());
        assert_eq!(node.find_predecessor(&target).await.id, node.id());
        assert_eq!(node.closest_preceding(&target).id, node.id());
    }

    #[tokio::test]
    async fn test_single_node_data_operations_stay_local() {
        let node = RingNode::new("127.0.0.1", 20000, ReplicationConfig::default());
        node.create();

        node.store_value(b"mykey", b"hello").await.unwrap();
        assert_eq!(node.retrieve_value(b"mykey").await.unwrap(), b"hello");

        node.remove_value(b"mykey").await.unwrap();
        assert!(matches!(
            node.retrieve_value(b"mykey").await,
            Err(KvError::KeyNotFound)
        ));
        assert!(matches!(
            node.remove_value(b"mykey").await,
            Err(KvError::KeyNotFound)
        ));
    }

    #[tokio::test]
    async fn test_put_is_idempotent() {
        let node = RingNode::new("127.0.0.1", 20000, ReplicationConfig::default());
        node.create();

        node.store_value(b"k", b"v").await.unwrap();
        let first = node.store().snapshot();
        node.store_value(b"k", b"v").await.unwrap();
        let second = node.store().snapshot();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_empty_key_and_value_are_storable() {
        let node = RingNode::new("127.0.0.1", 20000, ReplicationConfig::default());
        node.create();

        node.store_value(b"", b"").await.unwrap();
        assert_eq!(node.retrieve_value(b"").await.unwrap(), Vec::<u8>::new());
        node.remove_value(b"").await.unwrap();
    }

    // ============================================================
    // PREDECESSOR HANDLING
    // ============================================================

    #[tokio::test]
    async fn test_notify_adopts_and_supersedes_predecessor() {
        // node with a high identifier so crafted low peers precede it
        let (address, port) = endpoint_with_leading_byte(0x40, false);
        let node = RingNode::new(&address, port, ReplicationConfig::default());
        node.create();

        let far = peer_at(0x20);
        let near = peer_at(0x30);

        node.notify(far.clone()).await;
        assert_eq!(node.predecessor().unwrap().id, far.id);

        // a peer between the current predecessor and us supersedes it
        node.notify(near.clone()).await;
        assert_eq!(node.predecessor().unwrap().id, near.id);

        // but a more distant one does not
        node.notify(far.clone()).await;
        assert_eq!(node.predecessor().unwrap().id, near.id);

        // notify about ourselves is ignored
        node.notify(node.info()).await;
        assert_eq!(node.predecessor().unwrap().id, near.id);
    }

    #[tokio::test]
    async fn test_ownership_with_wrapped_interval() {
        // predecessor identifier far above ours: the ownership interval
        // wraps past zero
        let (address, port) = endpoint_with_leading_byte(0x10, true);
        let node = RingNode::new(&address, port, ReplicationConfig::default());
        node.create();

        let predecessor = peer_at(0xF0);
        node.notify(predecessor.clone()).await;
        assert_eq!(node.predecessor().unwrap().id, predecessor.id);

        // inside the wrapped interval (predecessor, 2^160) u [0, self]
        assert!(node.is_primary_for(&Id::from_bytes([0xFF; 20])));
        assert!(node.is_primary_for(&Id::from_bytes([0x00; 20]).add_pow2(0)));
        assert!(node.is_primary_for(&node.id()));

        // outside it
        assert!(!node.is_primary_for(&Id::from_bytes([0x80; 20])));
        assert!(!node.is_primary_for(&predecessor.id));
    }

    // ============================================================
    // RE-REPLICATION AFTER FAILURE
    // ============================================================

    #[tokio::test]
    async fn test_failure_with_full_replica_set_skips_re_replication() {
        // factor 2 wants one replica; losing the second successor leaves
        // the replica set at full strength
        let ([a, b, c], handles) = spawn_ring_of_three(2).await;

        let list = a.successor_list();
        let first = list[0].clone();
        let second = list
            .iter()
            .find(|peer| peer.id != a.id() && peer.id != first.id)
            .unwrap()
            .clone();

        // plant a key this node owns without replicating it anywhere
        let key = owned_key(&a);
        a.store().put(key.clone(), b"v".to_vec());

        a.handle_failure(&second).await;

        assert_eq!(a.replica_set().len(), 1);
        assert!(a.store().exists(&key));
        assert!(
            !b.store().exists(&key) && !c.store().exists(&key),
            "re-replication fired although the replica set was full"
        );

        for handle in handles {
            handle.abort();
        }
    }

    #[tokio::test]
    async fn test_failure_with_short_replica_set_re_replicates() {
        // factor 3 wants two replicas; losing one successor leaves the set
        // short, so owned keys are pushed to the survivor
        let ([a, b, c], handles) = spawn_ring_of_three(3).await;

        let list = a.successor_list();
        let first = list[0].clone();
        let second = list
            .iter()
            .find(|peer| peer.id != a.id() && peer.id != first.id)
            .unwrap()
            .clone();

        let key = owned_key(&a);
        a.store().put(key.clone(), b"v".to_vec());

        a.handle_failure(&second).await;

        assert_eq!(a.replica_set().len(), 1);
        let survivor = if b.id() == first.id { &b } else { &c };
        let removed = if b.id() == second.id { &b } else { &c };
        assert!(
            survivor.store().exists(&key),
            "surviving replica never received the key"
        );
        assert!(!removed.store().exists(&key));

        for handle in handles {
            handle.abort();
        }
    }

    // ============================================================
    // SHUTDOWN
    // ============================================================

    #[tokio::test]
    async fn test_leave_blocks_further_operations() {
        let node = RingNode::new("127.0.0.1", 20000, ReplicationConfig::default());
        node.create();
        node.store_value(b"k", b"v").await.unwrap();

        node.leave().await;
        assert!(!node.is_running());

        assert!(matches!(
            node.store_value(b"x", b"y").await,
            Err(KvError::ShuttingDown)
        ));
        assert!(matches!(
            node.retrieve_value(b"k").await,
            Err(KvError::ShuttingDown)
        ));
        assert!(matches!(
            node.remove_value(b"k").await,
            Err(KvError::ShuttingDown)
        ));

        // single-node leave keeps the data; there is nobody to hand it to
        assert!(node.store().exists(b"k"));

        // leaving twice is harmless
        node.leave().await;
    }

    #[tokio::test]
    async fn test_leave_resets_routing_state() {
        let (address, port) = endpoint_with_leading_byte(0x40, false);
        let node = RingNode::new(&address, port, ReplicationConfig::default());
        node.create();
        node.notify(peer_at(0x20)).await;
        assert!(node.predecessor().is_some());

        node.leave().await;
        assert!(node.predecessor().is_none());
        assert!(
            node.successor_list()
                .iter()
                .all(|peer| peer.id == node.id())
        );
    }
}
