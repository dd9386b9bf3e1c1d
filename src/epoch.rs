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

//! Per-epoch mana accounting: a standalone component that receives identity/mana updates from an
//! external tracker and persists them by content-independent, sequentially assigned [`EpochID`].

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::codec::{decode_f64, encode_f64, Decode, DecodeError, Encode};
use crate::error::StoreError;
use crate::ids::{EpochID, NodeID};
use crate::store::{Backend, Handle, ObjectStore, StorableObject};

/// An immutable snapshot of node mana for a single epoch.
///
/// There is no `update` operation: epochs are append-only records keyed by [`EpochID`]; changing
/// mana means building and storing a new epoch under a new id.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Epoch {
    id: EpochID,
    mana: BTreeMap<NodeID, f64>,
}

impl Epoch {
    pub fn new(id: EpochID) -> Self { Self { id, mana: BTreeMap::new() } }

    pub fn id(&self) -> EpochID { self.id }

    /// Idempotently registers `node` with zero mana if it is not already present.
    pub fn add_node(&mut self, node: NodeID) { self.mana.entry(node).or_insert(0.0); }

    pub fn set_mana(&mut self, node: NodeID, mana: f64) { self.mana.insert(node, mana); }

    /// A copy-out snapshot of the current mana map.
    pub fn mana(&self) -> BTreeMap<NodeID, f64> { self.mana.clone() }

    pub fn total_mana(&self) -> f64 { self.mana.values().sum() }
}

impl Encode for Epoch {
    fn encode_to(&self, buf: &mut Vec<u8>) {
        (self.mana.len() as u32).encode_to(buf);
        for (node, mana) in &self.mana {
            node.encode_to(buf);
            encode_f64(*mana, buf);
        }
    }
}

impl Decode for Epoch {
    fn decode_from(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        let _ = buf;
        unreachable!("Epoch is reconstructed via StorableObject::from_storage")
    }
}

impl StorableObject for Epoch {
    const PREFIX: u8 = 0x40;

    fn storage_key(&self) -> Vec<u8> { self.id.encode() }

    fn from_storage(key: &[u8], value: &[u8]) -> Result<Self, StoreError> {
        let id = EpochID::decode(key).map_err(|e| StoreError::Fatal(e.to_string()))?;
        let mut slice = value;
        let count = u32::decode_from(&mut slice).map_err(|e| StoreError::Fatal(e.to_string()))? as usize;
        let mut mana = BTreeMap::new();
        for _ in 0..count {
            let node = NodeID::decode_from(&mut slice).map_err(|e| StoreError::Fatal(e.to_string()))?;
            let value = decode_f64(&mut slice).map_err(|e| StoreError::Fatal(e.to_string()))?;
            mana.insert(node, value);
        }
        Ok(Epoch { id, mana })
    }
}

/// The object store of [`Epoch`] records, keyed by [`EpochID`].
pub struct Epochs<B: Backend> {
    store: ObjectStore<Epoch, B>,
}

impl<B: Backend> Epochs<B> {
    pub fn new(backend: Arc<B>) -> Self { Self { store: ObjectStore::new(backend) } }

    pub fn store(&self, epoch: Epoch) -> Handle<Epoch> { self.store.store(epoch) }

    pub fn load(&self, id: EpochID) -> Result<Option<Handle<Epoch>>, StoreError> { self.store.load(&id.encode()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryBackend;

    #[test]
    fn epoch_round_trips_and_sums_mana() {
        let backend = Arc::new(InMemoryBackend::new());
        let epochs = Epochs::new(backend);

        let mut epoch = Epoch::new(EpochID(42));
        epoch.set_mana(NodeID::hash(&b"n1".to_vec()), 1.5);
        epoch.set_mana(NodeID::hash(&b"n2".to_vec()), 2.5);
        assert_eq!(epoch.total_mana(), 4.0);

        epochs.store(epoch.clone());
        let loaded = epochs.load(EpochID(42)).unwrap().expect("present");
        assert_eq!(loaded.total_mana(), 4.0);
        assert_eq!(loaded.mana(), epoch.mana());
    }

    #[test]
    fn epoch_key_is_big_endian_u64() {
        let epoch = Epoch::new(EpochID(42));
        assert_eq!(epoch.storage_key(), 42u64.to_be_bytes().to_vec());
    }

    #[test]
    fn add_node_is_idempotent() {
        let mut epoch = Epoch::new(EpochID(1));
        let node = NodeID::hash(&b"n".to_vec());
        epoch.add_node(node);
        epoch.set_mana(node, 3.0);
        epoch.add_node(node);
        assert_eq!(epoch.mana().get(&node), Some(&3.0));
    }
}
