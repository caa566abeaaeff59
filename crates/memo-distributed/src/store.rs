//! `ResultStore` over the shared cache

use crate::config::DistributedConfig;
use crate::error::DistributedError;
use crate::node::CacheNode;
use memo_core::{CallKey, FunctionId, Result, ResultStore};
use serde_json::Value;
use std::sync::Arc;

/// Maps a function identity to its key in the shared map. Every node of
/// one cache must use the same serializer.
pub type KeySerializer = Arc<dyn Fn(&FunctionId) -> String + Send + Sync>;

/// Default key: the function's qualified name
pub fn qualified_name(function: &FunctionId) -> String {
    function.name().to_string()
}

/// Store whose sub-caches live on the elected host
///
/// Every mutation fetches the whole sub-cache, changes it locally and writes
/// it back, so concurrent writers to one function race last-writer-wins.
pub struct DistributedStore {
    node: CacheNode,
    key_serializer: KeySerializer,
}

impl DistributedStore {
    pub fn new(node: CacheNode) -> Self {
        Self {
            node,
            key_serializer: Arc::new(qualified_name),
        }
    }

    /// Join the cache and wrap the resulting node
    pub fn connect(config: DistributedConfig) -> std::result::Result<Self, DistributedError> {
        Ok(Self::new(CacheNode::join(config)?))
    }

    pub fn with_key_serializer<F>(mut self, serializer: F) -> Self
    where
        F: Fn(&FunctionId) -> String + Send + Sync + 'static,
    {
        self.key_serializer = Arc::new(serializer);
        self
    }

    pub fn node(&self) -> &CacheNode {
        &self.node
    }

    pub fn node_mut(&mut self) -> &mut CacheNode {
        &mut self.node
    }

    /// Rendering of the whole shared map
    pub fn stringify(&mut self) -> Result<String> {
        Ok(self.node.stringify()?)
    }

    fn remote_key(&self, function: &FunctionId) -> String {
        (self.key_serializer)(function)
    }
}

impl ResultStore for DistributedStore {
    fn lookup(&mut self, function: &FunctionId, key: &CallKey) -> Result<Option<Value>> {
        let remote = self.remote_key(function);
        Ok(self.node.get(&remote)?.and_then(|mut sub| sub.remove(key)))
    }

    fn insert(&mut self, function: &FunctionId, key: CallKey, value: Value) -> Result<()> {
        let remote = self.remote_key(function);
        let mut snapshot = self.node.get(&remote)?.unwrap_or_default();
        snapshot.insert(key, value);
        self.node.set(&remote, snapshot)?;
        Ok(())
    }

    fn remove_entry(&mut self, function: &FunctionId, key: &CallKey) -> Result<bool> {
        let remote = self.remote_key(function);
        let Some(mut snapshot) = self.node.get(&remote)? else {
            return Ok(false);
        };
        if snapshot.remove(key).is_none() {
            return Ok(false);
        }
        self.node.set(&remote, snapshot)?;
        Ok(true)
    }

    fn remove_function(&mut self, function: &FunctionId) -> Result<bool> {
        match self.node.delete(&self.remote_key(function)) {
            Ok(()) => Ok(true),
            Err(DistributedError::KeyNotFound(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn entry_count(&mut self, function: &FunctionId) -> Result<usize> {
        let remote = self.remote_key(function);
        Ok(self.node.get(&remote)?.map(|sub| sub.len()).unwrap_or(0))
    }
}

impl std::fmt::Debug for DistributedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedStore")
            .field("node", &self.node)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> DistributedStore {
        let config = DistributedConfig::new("127.0.0.1", 0);
        DistributedStore::connect(config).unwrap()
    }

    fn key(n: i64) -> CallKey {
        CallKey::from_raw(format!("[{}]", n))
    }

    #[test]
    fn test_read_modify_write() {
        let mut store = store();
        let f = FunctionId::new("pkg::f");

        store.insert(&f, key(1), json!(3)).unwrap();
        store.insert(&f, key(2), json!(4)).unwrap();

        assert_eq!(store.lookup(&f, &key(1)).unwrap(), Some(json!(3)));
        assert_eq!(store.entry_count(&f).unwrap(), 2);
        assert_eq!(store.stringify().unwrap(), r#"{"pkg::f":{"[1]":3,"[2]":4}}"#);
    }

    #[test]
    fn test_identities_with_same_name_share_entries() {
        let mut store = store();
        let first = FunctionId::new("pkg::f");
        let second = FunctionId::new("pkg::f");

        store.insert(&first, key(1), json!("shared")).unwrap();
        assert_eq!(store.lookup(&second, &key(1)).unwrap(), Some(json!("shared")));
    }

    #[test]
    fn test_absent_removal_is_false() {
        let mut store = store();
        let f = FunctionId::new("pkg::f");

        assert!(!store.remove_entry(&f, &key(1)).unwrap());
        assert!(!store.remove_function(&f).unwrap());

        store.insert(&f, key(1), json!(1)).unwrap();
        assert!(!store.remove_entry(&f, &key(2)).unwrap());
        assert!(store.remove_entry(&f, &key(1)).unwrap());
        assert!(store.remove_function(&f).unwrap());
        assert!(!store.node_mut().contains("pkg::f").unwrap());
    }

    #[test]
    fn test_custom_key_serializer() {
        let mut store = store().with_key_serializer(|f| format!("v2/{}", f.name()));
        let f = FunctionId::new("pkg::f");

        store.insert(&f, key(1), json!(1)).unwrap();
        assert!(store.node_mut().contains("v2/pkg::f").unwrap());
        assert!(!store.node_mut().contains("pkg::f").unwrap());
    }
}
