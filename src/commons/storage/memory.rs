use std::collections::HashMap;
use std::fmt::Display;
use std::sync::{Mutex, MutexGuard};

use lazy_static::lazy_static;

use crate::commons::storage::{
    Key, KeyValueError, Namespace, Scope, StorageResult,
};

//------------ MemoryStore ---------------------------------------------------

/// The process-wide in-memory storage structure.
#[derive(Debug)]
struct MemoryStore(HashMap<Namespace, HashMap<Key, serde_json::Value>>);

impl MemoryStore {
    fn new() -> Self {
        MemoryStore(HashMap::new())
    }

    fn has(&self, namespace: &Namespace, key: &Key) -> bool {
        self.0
            .get(namespace)
            .map(|m| m.contains_key(key))
            .unwrap_or(false)
    }

    fn get(
        &self,
        namespace: &Namespace,
        key: &Key,
    ) -> Option<serde_json::Value> {
        self.0.get(namespace).and_then(|m| m.get(key).cloned())
    }

    fn insert(
        &mut self,
        namespace: &Namespace,
        key: &Key,
        value: serde_json::Value,
    ) {
        let map = self.0.entry(namespace.clone()).or_default();
        map.insert(key.clone(), value);
    }

    fn list_keys(&self, namespace: &Namespace, scope: &Scope) -> Vec<Key> {
        self.0
            .get(namespace)
            .map(|m| {
                m.keys()
                    .filter(|k| k.scope().starts_with(scope))
                    .cloned()
                    .collect::<Vec<Key>>()
            })
            .unwrap_or_default()
    }
}

lazy_static! {
    static ref STORE: Mutex<MemoryStore> = Mutex::new(MemoryStore::new());
}


//------------ Memory --------------------------------------------------------

/// In-memory storage, intended for testing.
///
/// All instances share one process-wide map. The URI's host part, if
/// any, is used as a namespace prefix so that stores created by
/// unrelated tests do not collide.
#[derive(Clone, Debug)]
pub struct Memory {
    effective_namespace: Namespace,
    inner: &'static Mutex<MemoryStore>,
}

impl Memory {
    pub(crate) fn new(
        namespace_prefix: Option<&str>,
        namespace: Namespace,
    ) -> StorageResult<Self> {
        let effective_namespace = match namespace_prefix {
            Some(prefix) => Namespace::parse(&format!("{prefix}_{namespace}"))
                .map_err(|e| {
                    KeyValueError::UnknownScheme(format!(
                        "cannot parse prefix '{prefix}' for memory store: {e}"
                    ))
                })?,
            None => namespace,
        };

        Ok(Memory {
            effective_namespace,
            inner: &STORE,
        })
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, MemoryStore>> {
        self.inner
            .lock()
            .map_err(|e| KeyValueError::Locking(format!("cannot lock memory store: {e}")))
    }
}

impl Memory {
    pub fn has(&self, key: &Key) -> StorageResult<bool> {
        Ok(self.lock()?.has(&self.effective_namespace, key))
    }

    pub fn get(&self, key: &Key) -> StorageResult<Option<serde_json::Value>> {
        Ok(self.lock()?.get(&self.effective_namespace, key))
    }

    pub fn list_keys(&self, scope: &Scope) -> StorageResult<Vec<Key>> {
        Ok(self.lock()?.list_keys(&self.effective_namespace, scope))
    }

    pub fn store(
        &self,
        key: &Key,
        value: serde_json::Value,
    ) -> StorageResult<()> {
        self.lock()?.insert(&self.effective_namespace, key, value);
        Ok(())
    }
}

impl Display for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "memory://{}", self.effective_namespace)
    }
}
