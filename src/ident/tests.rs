#[cfg(test)]
mod tests {
    use crate::ident::{ID_BITS, Id, in_interval};

    // Identifier with all bytes zero except the least significant one.
    fn id_at(byte: u8) -> Id {
        let mut raw = [0u8; 20];
        raw[19] = byte;
        Id::from_bytes(raw)
    }

    // ============================================================
    // HASHING
    // ============================================================

    #[test]
    fn test_hash_matches_sha1_vectors() {
        assert_eq!(
            Id::hash(b"").to_string(),
            "da39a3ee5e6b4b0d3255bfef95601890afd80709"
        );
        assert_eq!(
            Id::hash(b"abc").to_string(),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
        assert_eq!(
            Id::hash(b"The quick brown fox jumps over the lazy dog").to_string(),
            "2fd4e1c67a2d28fced849ee1bb76e7391b93eb12"
        );
    }

    #[test]
    fn test_hash_is_deterministic() {
        assert_eq!(Id::hash(b"mykey"), Id::hash(b"mykey"));
        assert_ne!(Id::hash(b"mykey"), Id::hash(b"mykeys"));
    }

    #[test]
    fn test_endpoint_hash_matches_joined_string() {
        assert_eq!(
            Id::for_endpoint("127.0.0.1", 20000),
            Id::hash(b"127.0.0.1:20000")
        );
    }

    #[test]
    fn test_from_slice_requires_twenty_bytes() {
        assert!(Id::from_slice(&[0u8; 20]).is_some());
        assert!(Id::from_slice(&[0u8; 19]).is_none());
        assert!(Id::from_slice(&[0u8; 21]).is_none());
        assert!(Id::from_slice(&[]).is_none());
    }

    #[test]
    fn test_ordering_is_big_endian() {
        let mut high = [0u8; 20];
        high[0] = 1;
        assert!(Id::from_bytes(high) > id_at(0xFF));
    }

    // ============================================================
    // INTERVALS
    // ============================================================

    #[test]
    fn test_interval_plain_range() {
        let (a, b) = (id_at(10), id_at(20));
        assert!(in_interval(&id_at(15), &a, &b, true));
        assert!(in_interval(&id_at(20), &a, &b, true));
        assert!(!in_interval(&id_at(20), &a, &b, false));
        assert!(!in_interval(&id_at(10), &a, &b, true));
        assert!(!in_interval(&id_at(5), &a, &b, true));
        assert!(!in_interval(&id_at(25), &a, &b, true));
    }

    #[test]
    fn test_interval_wraps_past_zero() {
        let (a, b) = (id_at(200), id_at(10));
        assert!(in_interval(&id_at(250), &a, &b, true));
        assert!(in_interval(&id_at(0), &a, &b, true));
        assert!(in_interval(&id_at(10), &a, &b, true));
        assert!(!in_interval(&id_at(10), &a, &b, false));
        assert!(!in_interval(&id_at(100), &a, &b, true));
        assert!(!in_interval(&id_at(200), &a, &b, true));
    }

    #[test]
    fn test_interval_degenerate_endpoints() {
        let a = id_at(42);
        // start == end: empty unless inclusive and x == start
        assert!(in_interval(&a, &a, &a, true));
        assert!(!in_interval(&a, &a, &a, false));
        assert!(!in_interval(&id_at(43), &a, &a, true));
    }

    #[test]
    fn test_interval_boundary_equal_to_self() {
        // x equal to the interval start is never inside
        let (a, b) = (id_at(10), id_at(20));
        assert!(!in_interval(&a, &a, &b, true));
        // x equal to the wrap start is never inside either
        let (a, b) = (id_at(200), id_at(10));
        assert!(!in_interval(&a, &a, &b, true));
    }

    // ============================================================
    // MODULAR ARITHMETIC
    // ============================================================

    #[test]
    fn test_add_pow2_low_bits() {
        assert_eq!(id_at(0).add_pow2(0), id_at(1));
        assert_eq!(id_at(0).add_pow2(3), id_at(8));
        assert_eq!(id_at(1).add_pow2(0), id_at(2));
    }

    #[test]
    fn test_add_pow2_carries_across_bytes() {
        let sum = id_at(0xFF).add_pow2(0);
        let mut expected = [0u8; 20];
        expected[18] = 1;
        assert_eq!(sum, Id::from_bytes(expected));
    }

    #[test]
    fn test_add_pow2_highest_bit() {
        let sum = id_at(0).add_pow2(ID_BITS - 1);
        let mut expected = [0u8; 20];
        expected[0] = 0x80;
        assert_eq!(sum, Id::from_bytes(expected));
    }

    #[test]
    fn test_add_pow2_wraps_at_ring_end() {
        let all_ones = Id::from_bytes([0xFF; 20]);
        assert_eq!(all_ones.add_pow2(0), Id::from_bytes([0u8; 20]));
    }

    #[test]
    fn test_add_pow2_out_of_range_is_identity() {
        let id = Id::hash(b"anything");
        assert_eq!(id.add_pow2(ID_BITS), id);
    }

    #[test]
    fn test_finger_targets_are_distinct() {
        let base = Id::hash(b"some-node");
        let mut targets: Vec<Id> = (0..ID_BITS).map(|i| base.add_pow2(i)).collect();
        targets.sort();
        targets.dedup();
        assert_eq!(targets.len(), ID_BITS);
    }
}
