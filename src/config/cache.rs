//! Per-camera-partition caches for config schemas and key lists.
//!
//! Both caches are process-lifetime with no eviction: a camera's config
//! schema and key namespace are treated as immutable for its connected
//! session, only values change. Constructed once per client instance so
//! independent clients (and tests) are isolated.

use std::collections::HashMap;
use std::sync::Mutex;

use super::value::ConfigInfo;

#[derive(Default)]
pub(crate) struct ConfigCache {
    info: Mutex<HashMap<String, HashMap<String, ConfigInfo>>>,
    key_lists: Mutex<HashMap<String, Vec<String>>>,
}

impl ConfigCache {
    /// Record a parsed schema under its partition. Called by the config
    /// parser for every block it parses, which warms the cache consulted by
    /// `set` later.
    pub(crate) fn insert_info(&self, partition: &str, info: ConfigInfo) {
        let mut stores = self.info.lock().expect("config info cache lock poisoned");
        stores.entry(partition.to_string()).or_default().insert(info.key.clone(), info);
    }

    /// Look up cached schemas for a set of keys; absent keys are simply
    /// missing from the result.
    pub(crate) fn info_for_keys(
        &self,
        partition: &str,
        keys: &[String],
    ) -> HashMap<String, ConfigInfo> {
        let stores = self.info.lock().expect("config info cache lock poisoned");
        let Some(store) = stores.get(partition) else {
            return HashMap::new();
        };
        keys.iter()
            .filter_map(|key| store.get(key).map(|info| (key.clone(), info.clone())))
            .collect()
    }

    /// The cached ordered key list for a partition, if one was fetched.
    pub(crate) fn key_list(&self, partition: &str) -> Option<Vec<String>> {
        self.key_lists.lock().expect("key list cache lock poisoned").get(partition).cloned()
    }

    pub(crate) fn set_key_list(&self, partition: &str, keys: Vec<String>) {
        self.key_lists
            .lock()
            .expect("key list cache lock poisoned")
            .insert(partition.to_string(), keys);
    }
}
