// LEDGERSTATE: UTXO ledger engine with conflict-aware branching
//
// SPDX-License-Identifier: Apache-2.0
//
// Designed in 2019-2025 by Dr Maxim Orlovsky <orlovsky@ubideco.org>
// Written in 2024-2025 by Dr Maxim Orlovsky <orlovsky@ubideco.org>
//
// Copyright (C) 2019-2024 LNP/BP Standards Association, Switzerland.
// Copyright (C) 2024-2025 Laboratories for Ubiquitous Deterministic Computing (UBIDECO),
//                         Institute for Distributed and Cognitive Systems (InDCS), Switzerland.
// Copyright (C) 2019-2025 Dr Maxim Orlovsky.
// All rights under the above copyrights are reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use this file except
// in compliance with the License. You may obtain a copy of the License at
//
//        http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software distributed under the License
// is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express
// or implied. See the License for the specific language governing permissions and limitations under
// the License.

//! A typed, content-addressed cache over an opaque key-value backend.
//!
//! Each cached entry is held behind an [`Arc`], so releasing a [`Handle`] is simply letting it
//! drop — Rust's ownership model gives us the "release on every exit path" discipline the
//! original object storage had to implement by hand with a scoped `Consume`/`Release` contract.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use parking_lot::{ArcRwLockWriteGuard, RawRwLock, RwLock};

use crate::codec::{Decode, Encode};
use crate::error::StoreError;

/// A reference-counted, lazily-shared cached entry. Cloning is cheap; the underlying value is
/// dropped once the last handle (cache included) goes out of scope.
pub type Handle<T> = Arc<T>;

/// An entity that can be placed in an [`ObjectStore`].
///
/// `storage_key` mirrors the original `ObjectStorageKey()` contract: for entities whose identity
/// is fully determined by their key (e.g. [`crate::AddressOutputMapping`]), `storage_value`
/// returns an empty vector and decoding reconstructs the object from the key alone.
pub trait StorableObject: Encode + Decode + Send + Sync + 'static {
    /// Disambiguates this entity kind's keys from every other kind sharing the same backend.
    const PREFIX: u8;

    fn storage_key(&self) -> Vec<u8>;

    fn storage_value(&self) -> Vec<u8> { self.encode() }

    /// Reconstructs the object from its key and value parts, as read back from the backend.
    fn from_storage(key: &[u8], value: &[u8]) -> Result<Self, StoreError>
    where Self: Sized;
}

/// The opaque persistent backend an [`ObjectStore`] is layered over. Keys are already prefixed by
/// the caller; the backend itself knows nothing about entity kinds.
pub trait Backend: Send + Sync {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;
    fn put(&self, key: Vec<u8>, value: Vec<u8>);
    fn contains(&self, key: &[u8]) -> bool;
    /// Iterates all entries whose key begins with `prefix`. Order is unspecified but stable for a
    /// given snapshot of the backend.
    fn scan_prefix(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)>;
}

/// A simple in-memory backend, suitable for tests and for embedding applications that do not
/// need cross-process persistence.
#[derive(Default)]
pub struct InMemoryBackend {
    map: DashMap<Vec<u8>, Vec<u8>>,
}

impl InMemoryBackend {
    pub fn new() -> Self { Self::default() }
}

impl Backend for InMemoryBackend {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> { self.map.get(key).map(|entry| entry.value().clone()) }

    fn put(&self, key: Vec<u8>, value: Vec<u8>) { self.map.insert(key, value); }

    fn contains(&self, key: &[u8]) -> bool { self.map.contains_key(key) }

    fn scan_prefix(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.map
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

/// A typed, reference-counted cache in front of a [`Backend`], scoped to a single entity kind by
/// [`StorableObject::PREFIX`].
///
/// # Blocking I/O
///
/// Every operation may perform backend I/O on a cache miss.
pub struct ObjectStore<T: StorableObject, B: Backend> {
    backend: Arc<B>,
    cache: DashMap<Vec<u8>, Handle<T>>,
}

impl<T: StorableObject, B: Backend> ObjectStore<T, B> {
    pub fn new(backend: Arc<B>) -> Self { Self { backend, cache: DashMap::new() } }

    fn prefixed(key: &[u8]) -> Vec<u8> {
        let mut full = Vec::with_capacity(key.len() + 1);
        full.push(T::PREFIX);
        full.extend_from_slice(key);
        full
    }

    /// Loads the entry for `key`, decoding from the backend on a cache miss.
    ///
    /// Returns `None` if the key is absent from both the cache and the backend.
    pub fn load(&self, key: &[u8]) -> Result<Option<Handle<T>>, StoreError> {
        let full = Self::prefixed(key);
        if let Some(handle) = self.cache.get(&full) {
            return Ok(Some(Arc::clone(&handle)));
        }
        let Some(value) = self.backend.get(&full) else {
            return Ok(None);
        };
        let object = T::from_storage(key, &value)?;
        let handle = Arc::new(object);
        self.cache.insert(full, Arc::clone(&handle));
        Ok(Some(handle))
    }

    /// Unconditionally inserts or replaces the entry for `obj`. There is deliberately no
    /// `update`/overwrite-in-place API: entities are immutable once stored except through the
    /// typed mutators each component exposes, and silently overwriting a live handle is a
    /// programming error the original object storage made fail loudly by panicking on `Update`.
    pub fn store(&self, obj: T) -> Handle<T> {
        let key = Self::prefixed(&obj.storage_key());
        self.backend.put(key.clone(), obj.storage_value());
        let handle = Arc::new(obj);
        self.cache.insert(key, Arc::clone(&handle));
        handle
    }

    /// Atomically inserts `obj` if its key is absent. Returns the handle that ended up stored
    /// (either `obj` itself, or whatever was already there) and whether this call was the one
    /// that stored it.
    pub fn store_if_absent(&self, obj: T) -> Result<(Handle<T>, bool), StoreError> {
        let full = Self::prefixed(&obj.storage_key());
        match self.cache.entry(full.clone()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => Ok((Arc::clone(entry.get()), false)),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                if let Some(value) = self.backend.get(&full) {
                    let existing = T::from_storage(&obj.storage_key(), &value)?;
                    let handle = Arc::new(existing);
                    entry.insert(Arc::clone(&handle));
                    return Ok((handle, false));
                }
                self.backend.put(full, obj.storage_value());
                let handle = Arc::new(obj);
                entry.insert(Arc::clone(&handle));
                Ok((handle, true))
            }
        }
    }

    /// Atomically inserts the factory's result if `key` is absent, returning either the freshly
    /// created or the pre-existing entry.
    pub fn compute_if_absent(&self, key: &[u8], factory: impl FnOnce() -> T) -> Result<Handle<T>, StoreError> {
        let full = Self::prefixed(key);
        match self.cache.entry(full.clone()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                if let Some(value) = self.backend.get(&full) {
                    let existing = T::from_storage(key, &value)?;
                    let handle = Arc::new(existing);
                    entry.insert(Arc::clone(&handle));
                    return Ok(handle);
                }
                let obj = factory();
                self.backend.put(full, obj.storage_value());
                let handle = Arc::new(obj);
                entry.insert(Arc::clone(&handle));
                Ok(handle)
            }
        }
    }

    /// Visits every entry whose key begins with `prefix` (relative to this store's own
    /// [`StorableObject::PREFIX`]). `visitor` returns `false` to stop iteration early.
    pub fn for_each(&self, prefix: &[u8], mut visitor: impl FnMut(Handle<T>) -> bool) -> Result<(), StoreError> {
        let full_prefix = Self::prefixed(prefix);
        for (key, value) in self.backend.scan_prefix(&full_prefix) {
            let handle = if let Some(cached) = self.cache.get(&key) {
                Arc::clone(&cached)
            } else {
                let entity_key = &key[1..];
                let object = T::from_storage(entity_key, &value)?;
                let handle = Arc::new(object);
                self.cache.insert(key, Arc::clone(&handle));
                handle
            };
            if !visitor(handle) {
                break;
            }
        }
        Ok(())
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        let full = Self::prefixed(key);
        self.cache.contains_key(&full) || self.backend.contains(&full)
    }
}

/// A table of per-key reader-writer locks, used to take the composite lock a booking needs over
/// every input and output `OutputID` of a transaction, acquired in canonical (bytewise-sorted)
/// order to avoid deadlock between concurrent bookers that share some but not all keys.
pub struct LockTable<K: Ord + Clone> {
    locks: Mutex<BTreeMap<K, Arc<RwLock<()>>>>,
}

impl<K: Ord + Clone> Default for LockTable<K> {
    fn default() -> Self { Self { locks: Mutex::new(BTreeMap::new()) } }
}

impl<K: Ord + Clone> LockTable<K> {
    pub fn new() -> Self { Self::default() }

    fn lock_for(&self, key: &K) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock().expect("lock table poisoned");
        Arc::clone(locks.entry(key.clone()).or_insert_with(|| Arc::new(RwLock::new(()))))
    }

    /// Acquires exclusive locks over `keys`, sorted and deduplicated first so that two bookers
    /// racing over an overlapping key set can never deadlock each other.
    pub fn lock_exclusive(&self, keys: &[K]) -> CompositeGuard {
        let mut sorted = keys.to_vec();
        sorted.sort();
        sorted.dedup();
        let guards = sorted.iter().map(|key| self.lock_for(key)).map(|lock| RwLock::write_arc(&lock)).collect();
        CompositeGuard { _guards: guards }
    }
}

/// RAII guard over a set of composite locks. Dropping it releases every lock in the set.
///
/// Each element owns its `Arc<RwLock<()>>` alongside the write guard (`parking_lot`'s `arc_lock`
/// feature), so the guard can outlive the borrow that produced it without the original's manual
/// reference-counted release.
pub struct CompositeGuard {
    _guards: Vec<ArcRwLockWriteGuard<RawRwLock, ()>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DecodeError;

    #[derive(Clone, Debug, PartialEq, Eq)]
    struct Dummy {
        key: Vec<u8>,
        value: u32,
    }

    impl Encode for Dummy {
        fn encode_to(&self, buf: &mut Vec<u8>) { self.value.encode_to(buf) }
    }
    impl Decode for Dummy {
        fn decode_from(buf: &mut &[u8]) -> Result<Self, DecodeError> {
            let _ = buf;
            unreachable!("Dummy is reconstructed via from_storage in these tests")
        }
    }
    impl StorableObject for Dummy {
        const PREFIX: u8 = 0xAA;

        fn storage_key(&self) -> Vec<u8> { self.key.clone() }

        fn from_storage(key: &[u8], value: &[u8]) -> Result<Self, StoreError> {
            let value = u32::decode(value).map_err(|e| StoreError::Fatal(e.to_string()))?;
            Ok(Dummy { key: key.to_vec(), value })
        }
    }

    #[test]
    fn store_then_load_roundtrips() {
        let backend = Arc::new(InMemoryBackend::new());
        let store: ObjectStore<Dummy, InMemoryBackend> = ObjectStore::new(backend);
        let handle = store.store(Dummy { key: vec![1, 2, 3], value: 7 });
        assert_eq!(handle.value, 7);
        let loaded = store.load(&[1, 2, 3]).unwrap().expect("present");
        assert_eq!(loaded.value, 7);
    }

    #[test]
    fn store_if_absent_keeps_first_writer() {
        let backend = Arc::new(InMemoryBackend::new());
        let store: ObjectStore<Dummy, InMemoryBackend> = ObjectStore::new(backend);
        let (first, stored) = store.store_if_absent(Dummy { key: vec![9], value: 1 }).unwrap();
        assert!(stored);
        let (second, stored_again) = store.store_if_absent(Dummy { key: vec![9], value: 2 }).unwrap();
        assert!(!stored_again);
        assert_eq!(first.value, second.value);
        assert_eq!(second.value, 1);
    }

    #[test]
    fn for_each_visits_matching_prefix() {
        let backend = Arc::new(InMemoryBackend::new());
        let store: ObjectStore<Dummy, InMemoryBackend> = ObjectStore::new(backend);
        store.store(Dummy { key: vec![1, 0], value: 10 });
        store.store(Dummy { key: vec![1, 1], value: 11 });
        store.store(Dummy { key: vec![2, 0], value: 20 });

        let mut seen = Vec::new();
        store
            .for_each(&[1], |handle| {
                seen.push(handle.value);
                true
            })
            .unwrap();
        seen.sort();
        assert_eq!(seen, vec![10, 11]);
    }

    #[test]
    fn lock_table_orders_keys_to_avoid_deadlock() {
        let table: LockTable<u32> = LockTable::new();
        let _guard = table.lock_exclusive(&[3, 1, 2]);
        // A disjoint key set must not block.
        let _other = table.lock_exclusive(&[4, 5]);
    }
}
