use dashmap::DashMap;

/// Thread-safe mapping from byte-string keys to byte-string values.
///
/// This is the only mutable shared container on the data hot path. Each call
/// holds an internal shard lock for the duration of that call alone, so no
/// caller ever performs network I/O with the store locked.
#[derive(Default)]
pub struct LocalStore {
    data: DashMap<Vec<u8>, Vec<u8>>,
}

impl LocalStore {
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    /// Stores `value` under `key`, replacing any prior value.
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) {
        self.data.insert(key, value);
    }

    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.data.get(key).map(|entry| entry.value().clone())
    }

    /// Removes `key`, reporting whether an entry existed.
    pub fn remove(&self, key: &[u8]) -> bool {
        self.data.remove(key).is_some()
    }

    pub fn exists(&self, key: &[u8]) -> bool {
        self.data.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Snapshot of the current key set.
    pub fn keys(&self) -> Vec<Vec<u8>> {
        self.data.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Snapshot of the full mapping.
    pub fn snapshot(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.data
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Snapshot of the entries whose key satisfies `pred`.
    pub fn filter(&self, pred: impl Fn(&[u8]) -> bool) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.data
            .iter()
            .filter(|entry| pred(entry.key()))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn clear(&self) {
        self.data.clear();
    }
}
