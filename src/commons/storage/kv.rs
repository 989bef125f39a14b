use std::collections::HashSet;
use std::sync::Mutex;
use std::{fmt, io};

use lazy_static::lazy_static;
use log::trace;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::commons::storage::{Disk, Key, Memory, Namespace, Scope};

//------------ KeyValueStore -------------------------------------------------

/// One namespace worth of key-value storage.
///
/// The backend is selected by the scheme of the storage URI: `memory:`
/// for a process-wide in-memory store (tests), `local://` for JSON
/// files on disk.
#[derive(Debug)]
pub enum KeyValueStore {
    Memory(Memory),
    Disk(Disk),
}

impl KeyValueStore {
    /// Creates a new `KeyValueStore`.
    pub fn create(
        storage_uri: &Url,
        namespace: &Namespace,
    ) -> Result<Self, KeyValueError> {
        match storage_uri.scheme() {
            "local" => {
                let path = format!(
                    "{}{}",
                    storage_uri.host_str().unwrap_or_default(),
                    storage_uri.path()
                );
                Ok(KeyValueStore::Disk(Disk::new(&path, namespace)?))
            }
            "memory" => Ok(KeyValueStore::Memory(Memory::new(
                storage_uri.host_str(),
                namespace.clone(),
            )?)),
            scheme => Err(KeyValueError::UnknownScheme(scheme.to_owned())),
        }
    }

    /// Execute one or more operations under this store's scope lock.
    ///
    /// Writes must go through here so that read-modify-write sequences
    /// (counter increments, uniqueness checks) are serialized against
    /// other writers of the same scope. The closure needs to return a
    /// `Result<T, KeyValueError>` so that the caller can use the `?`
    /// operator on any kv calls within.
    pub fn execute<F, T>(&self, scope: &Scope, op: F) -> Result<T, KeyValueError>
    where
        F: FnOnce(&KeyValueStoreDispatcher) -> Result<T, KeyValueError>,
    {
        let _lock = ScopeLockGuard::acquire(self, scope)?;
        let dispatcher = self.dispatcher();
        op(&dispatcher)
    }

    fn dispatcher(&self) -> KeyValueStoreDispatcher<'_> {
        match self {
            KeyValueStore::Memory(memory) => {
                KeyValueStoreDispatcher::Memory(memory)
            }
            KeyValueStore::Disk(disk) => KeyValueStoreDispatcher::Disk(disk),
        }
    }
}

// # Reading
//
// Plain reads do not take the scope lock. Values are written atomically
// by both backends, so a reader never observes a half-written value; it
// may simply observe the state from just before or just after another
// writer's transaction.
impl KeyValueStore {
    /// Gets a value for a key, returns an error if the value cannot be
    /// deserialized, returns `None` if it cannot be found.
    pub fn get<V: DeserializeOwned>(
        &self,
        key: &Key,
    ) -> Result<Option<V>, KeyValueError> {
        if let Some(value) = self.dispatcher().get(key)? {
            trace!("got value for key: {key}");
            Ok(Some(serde_json::from_value(value)?))
        } else {
            trace!("got nothing for key: {key}");
            Ok(None)
        }
    }

    /// Returns whether a key exists.
    pub fn has(&self, key: &Key) -> Result<bool, KeyValueError> {
        self.dispatcher().has(key)
    }

    /// Returns all keys under the given scope, unordered.
    pub fn list_keys(&self, scope: &Scope) -> Result<Vec<Key>, KeyValueError> {
        self.dispatcher().list_keys(scope)
    }
}

impl fmt::Display for KeyValueStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValueStore::Memory(memory) => memory.fmt(f),
            KeyValueStore::Disk(disk) => disk.fmt(f),
        }
    }
}


//------------ KeyValueStoreDispatcher ---------------------------------------

/// Gives a transaction closure access to the underlying store.
#[derive(Debug)]
pub enum KeyValueStoreDispatcher<'a> {
    Memory(&'a Memory),
    Disk(&'a Disk),
}

impl KeyValueStoreDispatcher<'_> {
    /// Returns whether a key exists.
    pub fn has(&self, key: &Key) -> StorageResult<bool> {
        match self {
            KeyValueStoreDispatcher::Memory(m) => m.has(key),
            KeyValueStoreDispatcher::Disk(d) => d.has(key),
        }
    }

    /// Get the value for a key, if any exists.
    pub fn get(&self, key: &Key) -> StorageResult<Option<Value>> {
        match self {
            KeyValueStoreDispatcher::Memory(m) => m.get(key),
            KeyValueStoreDispatcher::Disk(d) => d.get(key),
        }
    }

    /// Returns all keys under the given scope, unordered.
    pub fn list_keys(&self, scope: &Scope) -> StorageResult<Vec<Key>> {
        match self {
            KeyValueStoreDispatcher::Memory(m) => m.list_keys(scope),
            KeyValueStoreDispatcher::Disk(d) => d.list_keys(scope),
        }
    }

    /// Store a value, overwriting any existing value.
    pub fn store<V: Serialize>(
        &self,
        key: &Key,
        value: &V,
    ) -> StorageResult<()> {
        let value = serde_json::to_value(value)?;
        match self {
            KeyValueStoreDispatcher::Memory(m) => m.store(key, value),
            KeyValueStoreDispatcher::Disk(d) => d.store(key, value),
        }
    }

    /// Store a value, failing with [`KeyValueError::DuplicateKey`] if
    /// the key already exists.
    pub fn store_new<V: Serialize>(
        &self,
        key: &Key,
        value: &V,
    ) -> StorageResult<()> {
        if self.has(key)? {
            Err(KeyValueError::DuplicateKey(key.clone()))
        } else {
            self.store(key, value)
        }
    }
}


//------------ ScopeLockGuard ------------------------------------------------

lazy_static! {
    /// Process-wide table of scope locks held by running transactions.
    ///
    /// Shared by all stores and both backends; entries are keyed by the
    /// store's display form plus the scope, so stores with different
    /// namespaces or roots never contend.
    static ref SCOPE_LOCKS: Mutex<HashSet<String>> = Mutex::new(HashSet::new());
}

/// Holds a scope lock for the duration of one transaction.
struct ScopeLockGuard {
    entry: String,
}

impl ScopeLockGuard {
    const WAIT_MS: u64 = 10;
    const TRIES: usize = 1000;

    /// Try to get the lock for up to ten seconds.
    ///
    /// Transactions are short (a handful of key operations), so a lock
    /// held longer than that means something is stuck.
    fn acquire(
        store: &KeyValueStore,
        scope: &Scope,
    ) -> Result<Self, KeyValueError> {
        let entry = format!("{store}#{scope}");

        for _ in 0..Self::TRIES {
            let mut locks = SCOPE_LOCKS
                .lock()
                .map_err(|e| KeyValueError::Locking(format!("{e}")))?;

            if !locks.contains(&entry) {
                locks.insert(entry.clone());
                return Ok(ScopeLockGuard { entry });
            }

            drop(locks);
            std::thread::sleep(std::time::Duration::from_millis(Self::WAIT_MS));
        }

        Err(KeyValueError::Locking(format!(
            "scope '{scope}' locked by another transaction"
        )))
    }
}

impl Drop for ScopeLockGuard {
    fn drop(&mut self) {
        if let Ok(mut locks) = SCOPE_LOCKS.lock() {
            locks.remove(&self.entry);
        }
    }
}


//------------ StorageResult -------------------------------------------------

pub type StorageResult<T> = Result<T, KeyValueError>;


//------------ KeyValueError -------------------------------------------------

/// This type defines possible errors for the key-value store.
#[derive(Debug)]
pub enum KeyValueError {
    UnknownScheme(String),
    Io(String, io::Error),
    Json(serde_json::Error),
    UnknownKey(Key),
    DuplicateKey(Key),
    Locking(String),
}

impl KeyValueError {
    pub fn io(context: impl Into<String>, e: io::Error) -> Self {
        KeyValueError::Io(context.into(), e)
    }
}

impl From<serde_json::Error> for KeyValueError {
    fn from(e: serde_json::Error) -> Self {
        KeyValueError::Json(e)
    }
}

impl fmt::Display for KeyValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValueError::UnknownScheme(e) => {
                write!(f, "unknown storage scheme: {e}")
            }
            KeyValueError::Io(context, e) => write!(f, "{context}: {e}"),
            KeyValueError::Json(e) => write!(f, "JSON error: {e}"),
            KeyValueError::UnknownKey(key) => write!(f, "unknown key: {key}"),
            KeyValueError::DuplicateKey(key) => {
                write!(f, "duplicate key: {key}")
            }
            KeyValueError::Locking(msg) => write!(f, "locking issue: {msg}"),
        }
    }
}

impl std::error::Error for KeyValueError {}


//------------ Tests ---------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commons::storage::Segment;
    use crate::test;

    fn test_store(storage_uri: &Url) -> KeyValueStore {
        KeyValueStore::create(storage_uri, &test::random_namespace()).unwrap()
    }

    fn impl_store_and_get(store: KeyValueStore) {
        let content = "content".to_owned();
        let key = Key::new_global(Segment::make("id"));

        assert_eq!(store.get::<String>(&key).unwrap(), None);
        assert!(!store.has(&key).unwrap());

        store.execute(&Scope::global(), |kv| kv.store(&key, &content)).unwrap();
        assert!(store.has(&key).unwrap());
        assert_eq!(store.get(&key).unwrap(), Some(content));
    }

    fn impl_store_new(store: KeyValueStore) {
        let content = "content".to_owned();
        let key = Key::new_global(Segment::make("id"));

        store
            .execute(&Scope::global(), |kv| kv.store_new(&key, &content))
            .unwrap();
        assert!(
            store
                .execute(&Scope::global(), |kv| kv.store_new(&key, &content))
                .is_err()
        );
    }

    fn impl_list_keys(store: KeyValueStore) {
        let content = "content".to_owned();
        let scope: Scope = "appliance/1".parse().unwrap();
        let key = Key::new_scoped(scope.clone(), Segment::make("state-1"));
        let key2 = Key::new_scoped(scope.clone(), Segment::make("state-2"));
        let other = Key::new_scoped(
            "appliance/2".parse().unwrap(),
            Segment::make("state-1"),
        );

        store
            .execute(&Scope::global(), |kv| {
                kv.store(&key, &content)?;
                kv.store(&key2, &content)?;
                kv.store(&other, &content)
            })
            .unwrap();

        let mut keys = store.list_keys(&scope).unwrap();
        keys.sort();
        assert_eq!(keys, vec![key, key2]);
    }

    fn impl_execute_serializes_writers(store: KeyValueStore) {
        // Two threads increment the same counter key a number of times
        // each. With the scope lock in place no increment is lost.
        let key = Key::new_global(Segment::make("counter"));
        store.execute(&Scope::global(), |kv| kv.store(&key, &0u64)).unwrap();

        std::thread::scope(|s| {
            for _ in 0..2 {
                s.spawn(|| {
                    for _ in 0..50 {
                        store
                            .execute(&Scope::global(), |kv| {
                                let current: u64 = kv
                                    .get(&key)?
                                    .map(serde_json::from_value)
                                    .transpose()?
                                    .unwrap_or_default();
                                kv.store(&key, &(current + 1))
                            })
                            .unwrap();
                    }
                });
            }
        });

        assert_eq!(store.get::<u64>(&key).unwrap(), Some(100));
    }

    fn test_impl(storage_uri: &Url) {
        impl_store_and_get(test_store(storage_uri));
        impl_store_new(test_store(storage_uri));
        impl_list_keys(test_store(storage_uri));
        impl_execute_serializes_writers(test_store(storage_uri));
    }

    #[test]
    fn mem_store_tests() {
        let storage_uri = test::mem_storage();
        test_impl(&storage_uri);
    }

    #[test]
    fn disk_store_tests() {
        test::test_under_tmp(|storage_uri| {
            test_impl(&storage_uri);
        });
    }
}
