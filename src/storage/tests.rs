#[cfg(test)]
mod tests {
    use crate::storage::memory::LocalStore;

    #[test]
    fn test_put_get_round_trip() {
        let store = LocalStore::new();
        store.put(b"mykey".to_vec(), b"hello".to_vec());
        assert_eq!(store.get(b"mykey"), Some(b"hello".to_vec()));
        assert!(store.exists(b"mykey"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_get_missing_key() {
        let store = LocalStore::new();
        assert_eq!(store.get(b"nonexistent"), None);
        assert!(!store.exists(b"nonexistent"));
    }

    #[test]
    fn test_put_overwrites() {
        let store = LocalStore::new();
        store.put(b"k".to_vec(), b"first".to_vec());
        store.put(b"k".to_vec(), b"second".to_vec());
        assert_eq!(store.get(b"k"), Some(b"second".to_vec()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remove_reports_existence() {
        let store = LocalStore::new();
        store.put(b"k".to_vec(), b"v".to_vec());
        assert!(store.remove(b"k"));
        assert!(!store.remove(b"k"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_empty_key_and_empty_value() {
        let store = LocalStore::new();
        store.put(Vec::new(), Vec::new());
        assert_eq!(store.get(b""), Some(Vec::new()));
        assert!(store.remove(b""));
    }

    #[test]
    fn test_keys_and_snapshot() {
        let store = LocalStore::new();
        for i in 0..100u32 {
            store.put(format!("key{}", i).into_bytes(), i.to_be_bytes().to_vec());
        }

        let mut keys = store.keys();
        keys.sort();
        assert_eq!(keys.len(), 100);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 100);
        // the snapshot is detached: mutating the store afterwards must not
        // affect what was captured
        store.clear();
        assert_eq!(snapshot.len(), 100);
        assert!(store.is_empty());
    }

    #[test]
    fn test_filter_selects_by_key() {
        let store = LocalStore::new();
        store.put(b"user:1".to_vec(), b"a".to_vec());
        store.put(b"user:2".to_vec(), b"b".to_vec());
        store.put(b"config:timeout".to_vec(), b"c".to_vec());

        let users = store.filter(|key| key.starts_with(b"user:"));
        assert_eq!(users.len(), 2);
        assert!(users.iter().all(|(key, _)| key.starts_with(b"user:")));
    }

    #[tokio::test]
    async fn test_concurrent_writers_do_not_lose_entries() {
        use std::sync::Arc;

        let store = Arc::new(LocalStore::new());
        let mut handles = Vec::new();
        for writer in 0..8u32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..100u32 {
                    let key = format!("w{}-{}", writer, i).into_bytes();
                    store.put(key, vec![writer as u8]);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.len(), 800);
    }
}
