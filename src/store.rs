use bytes::Bytes;
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

type Key = String;
type Field = String;

/// The Store owns the two keyspace namespaces: plain string values and hashes of fields. Each
/// namespace sits behind its own read/write lock, so readers of a namespace run concurrently while
/// a writer excludes everyone else from that namespace only; a write to the strings never waits on
/// the hashes or vice versa.
///
/// The store is cheap to clone, all clones share the same data.
#[derive(Clone, Default)]
pub struct Store {
    inner: Arc<InnerStore>,
}

impl Store {
    pub fn new() -> Store {
        Store::default()
    }
}

impl Deref for Store {
    type Target = InnerStore;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[derive(Default)]
pub struct InnerStore {
    strings: RwLock<HashMap<Key, Bytes>>,
    hashes: RwLock<HashMap<Key, HashMap<Field, Bytes>>>,
}

// A panicking writer can't leave a map half-updated: every write is a single insert or remove.
// So a poisoned lock is still safe to use.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl InnerStore {
    pub fn get(&self, key: &str) -> Option<Bytes> {
        read(&self.strings).get(key).cloned()
    }

    pub fn set(&self, key: Key, value: Bytes) {
        write(&self.strings).insert(key, value);
    }

    pub fn remove(&self, key: &str) -> Option<Bytes> {
        write(&self.strings).remove(key)
    }

    pub fn hget(&self, key: &str, field: &str) -> Option<Bytes> {
        read(&self.hashes)
            .get(key)
            .and_then(|hash| hash.get(field))
            .cloned()
    }

    /// Sets `field` in the hash at `key`, creating the hash on its first field.
    pub fn hset(&self, key: Key, field: Field, value: Bytes) {
        write(&self.hashes)
            .entry(key)
            .or_default()
            .insert(field, value);
    }

    /// Snapshot of every field and value of the hash at `key`, in no particular order.
    pub fn hgetall(&self, key: &str) -> Option<Vec<(Field, Bytes)>> {
        read(&self.hashes).get(key).map(|hash| {
            hash.iter()
                .map(|(field, value)| (field.clone(), value.clone()))
                .collect()
        })
    }

    pub fn hremove(&self, key: &str) -> Option<HashMap<Field, Bytes>> {
        write(&self.hashes).remove(key)
    }

    pub fn size(&self) -> usize {
        read(&self.strings).len() + read(&self.hashes).len()
    }
}
