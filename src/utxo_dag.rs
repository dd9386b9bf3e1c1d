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

//! Transaction validation and booking: the component that decides which [`Branch`] a new
//! transaction (and, transitively, its already-booked descendants) belongs to.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use log::{info, warn};

use crate::branch::{BranchDag, InclusionState};
use crate::codec::Encode;
use crate::error::{BookError, StoreError};
use crate::events::{EventBus, InclusionStateChanged, TransactionBooked, TransactionNotSolid};
use crate::ids::{BranchID, Color, OutputID, TransactionID};
use crate::metadata::{AddressOutputMapping, Consumer, OutputMetadata, TransactionMetadata, TriBool};
use crate::store::{Backend, LockTable, ObjectStore};
use crate::transaction::{Output, Transaction};

/// Owns transactions, outputs, and every piece of mutable metadata that tracks them, and drives
/// the branch DAG whenever booking discovers a new double-spend.
pub struct UtxoDag<B: Backend> {
    transactions: ObjectStore<Transaction, B>,
    outputs: ObjectStore<Output, B>,
    output_metadata: ObjectStore<OutputMetadata, B>,
    transaction_metadata: ObjectStore<TransactionMetadata, B>,
    consumers: ObjectStore<Consumer, B>,
    address_outputs: ObjectStore<AddressOutputMapping, B>,
    branches: Arc<BranchDag<B>>,
    locks: LockTable<OutputID>,
    events: Arc<EventBus>,
}

impl Output {
    fn storage_key_for(id: OutputID) -> Vec<u8> { id.encode() }
}

impl<B: Backend> UtxoDag<B> {
    pub fn new(backend: Arc<B>, branches: Arc<BranchDag<B>>, events: Arc<EventBus>) -> Self {
        Self {
            transactions: ObjectStore::new(Arc::clone(&backend)),
            outputs: ObjectStore::new(Arc::clone(&backend)),
            output_metadata: ObjectStore::new(Arc::clone(&backend)),
            transaction_metadata: ObjectStore::new(Arc::clone(&backend)),
            consumers: ObjectStore::new(Arc::clone(&backend)),
            address_outputs: ObjectStore::new(backend),
            branches,
            locks: LockTable::new(),
            events,
        }
    }

    /// Seeds a genesis output directly owned by the master branch, without going through booking.
    /// Used to establish the initial UTXO set a test or embedding application starts from.
    pub fn seed_output(&self, output_id: OutputID, output: Output) {
        let key = Output::storage_key_for(output_id);
        let address = output.address;
        self.outputs.compute_if_absent(&key, || output.clone()).expect("seeding into a fresh store cannot fail");
        self.output_metadata
            .compute_if_absent(&key, || OutputMetadata::new(output_id, BranchID::master()))
            .expect("seeding into a fresh store cannot fail");
        self.address_outputs
            .store_if_absent(AddressOutputMapping::new(address, output_id))
            .expect("seeding into a fresh store cannot fail");
    }

    pub fn transaction(&self, id: TransactionID) -> Result<Option<Arc<Transaction>>, StoreError> {
        self.transactions.load(&id.encode())
    }

    pub fn output(&self, id: OutputID) -> Result<Option<Arc<Output>>, StoreError> {
        self.outputs.load(&Output::storage_key_for(id))
    }

    pub fn output_metadata(&self, id: OutputID) -> Result<Option<Arc<OutputMetadata>>, StoreError> {
        self.output_metadata.load(&Output::storage_key_for(id))
    }

    pub fn transaction_metadata(&self, id: TransactionID) -> Result<Option<Arc<TransactionMetadata>>, StoreError> {
        self.transaction_metadata.load(&id.encode())
    }

    /// Every consumer record for `output_id`, via the consumer-prefix scan.
    pub fn consumers(&self, output_id: OutputID) -> Result<Vec<Arc<Consumer>>, StoreError> {
        let mut result = Vec::new();
        self.consumers.for_each(&output_id.encode(), |handle| {
            result.push(handle);
            true
        })?;
        Ok(result)
    }

    pub fn outputs_on_address(&self, address: crate::ids::Address) -> Result<Vec<OutputID>, StoreError> {
        let mut result = Vec::new();
        self.address_outputs.for_each(&address.encode(), |handle| {
            result.push(handle.output_id);
            true
        })?;
        Ok(result)
    }

    /// The effective [`InclusionState`] of a booked transaction: the branch's own state, except
    /// that a transaction in a `Confirmed` branch is only itself `Confirmed` once finalized —
    /// otherwise it is `Pending`.
    pub fn inclusion_state(&self, id: TransactionID) -> Result<InclusionState, BookError> {
        let metadata =
            self.transaction_metadata.load(&id.encode())?.ok_or_else(|| StoreError::NotFound(id.encode()))?;
        let branch = self.branches.branch(metadata.branch_id)?;
        Ok(match branch.inclusion_state() {
            InclusionState::Confirmed if !metadata.finalized => InclusionState::Pending,
            other => other,
        })
    }

    /// Validates and books `tx`. Idempotent: booking an already-booked transaction a second time
    /// is a no-op that returns `Ok(())`.
    pub fn book_transaction(&self, tx: Transaction) -> Result<(), BookError> {
        let tx_id = tx.id();
        if self.transaction_metadata.load(&tx_id.encode())?.is_some() {
            return Ok(());
        }

        let essence = tx.essence();
        let mut output_keys: Vec<OutputID> = essence.inputs.clone();
        output_keys.extend((0..essence.outputs.len() as u16).map(|i| tx.output_id(i)));
        let _guard = self.locks.lock_exclusive(&output_keys);

        let mut input_outputs = Vec::with_capacity(essence.inputs.len());
        let mut input_metadatas = Vec::with_capacity(essence.inputs.len());
        for &input in &essence.inputs {
            let Some(output) = self.outputs.load(&Output::storage_key_for(input))? else {
                self.events.publish_transaction_not_solid(&TransactionNotSolid { transaction_id: tx_id });
                return Err(BookError::NotSolid(tx_id));
            };
            let metadata = self
                .output_metadata
                .load(&Output::storage_key_for(input))?
                .ok_or(StoreError::NotFound(Output::storage_key_for(input)))?;
            input_outputs.push(output);
            input_metadatas.push(metadata);
        }

        let input_balances: Vec<BTreeMap<Color, u64>> = input_outputs.iter().map(|o| o.balances.clone()).collect();
        if !essence.balances_match(&input_balances) {
            return Err(BookError::Invalid(tx_id, "input and output balances do not match"));
        }
        if !essence.unlocks_valid() {
            return Err(BookError::Invalid(tx_id, "unlock blocks do not authorise their inputs"));
        }

        self.transactions.store(tx.clone());
        self.transaction_metadata.store(TransactionMetadata::new(tx_id, BranchID::invalid(), Utc::now()));

        let target_branch = self.classify_and_book(&tx, &input_metadatas)?;

        info!("booked transaction {tx_id} into branch {target_branch}");
        self.events.publish_transaction_booked(&TransactionBooked { transaction_id: tx_id, branch_id: target_branch });
        Ok(())
    }

    fn classify_and_book(&self, tx: &Transaction, input_metadatas: &[Arc<OutputMetadata>]) -> Result<BranchID, BookError> {
        let tx_id = tx.id();
        let essence = tx.essence();

        for metadata in input_metadatas {
            if metadata.branch_id == BranchID::invalid() {
                return self.book_invalid(tx_id, essence.inputs.iter().copied());
            }
        }

        for metadata in input_metadatas {
            let branch = self.branches.branch(metadata.branch_id)?;
            if branch.inclusion_state() == InclusionState::Rejected {
                return self.book_rejected(tx_id, essence.inputs.iter().copied(), metadata.branch_id);
            }
        }

        for (&input, metadata) in essence.inputs.iter().zip(input_metadatas) {
            for consumer in self.consumers(input)? {
                if consumer.valid.is_true() {
                    if let Some(consumer_meta) = self.transaction_metadata.load(&consumer.transaction_id.encode())? {
                        if consumer_meta.finalized && self.branches.branch(consumer_meta.branch_id)?.inclusion_state()
                            == InclusionState::Confirmed
                        {
                            return self.book_rejected_conflicting(tx_id, essence.inputs.iter().copied());
                        }
                    }
                }
            }
        }

        if self.past_cone_self_references(&essence.inputs)? {
            return self.book_invalid(tx_id, essence.inputs.iter().copied());
        }

        let input_branches: BTreeSet<BranchID> = input_metadatas.iter().map(|m| m.branch_id).collect();
        let normalized = match self.branches.normalize_branches(&input_branches) {
            Ok(normalized) => normalized,
            Err(_) => return self.book_invalid(tx_id, essence.inputs.iter().copied()),
        };

        let conflicting_inputs: Vec<OutputID> = essence
            .inputs
            .iter()
            .zip(input_metadatas)
            .filter(|(_, metadata)| metadata.consumer_count >= 1)
            .map(|(&input, _)| input)
            .collect();

        if conflicting_inputs.is_empty() {
            self.book_non_conflicting(tx, &normalized)
        } else {
            self.book_conflicting(tx, &normalized, &conflicting_inputs)
        }
    }

    fn book_invalid(&self, tx_id: TransactionID, inputs: impl Iterator<Item = OutputID>) -> Result<BranchID, BookError> {
        warn!("booking transaction {tx_id} as invalid");
        self.update_transaction_metadata(tx_id, BranchID::invalid(), true, false)?;
        for input in inputs {
            self.consumers.store(Consumer::new(input, tx_id, TriBool::False));
        }
        self.write_outputs(tx_id, BranchID::invalid())?;
        Ok(BranchID::invalid())
    }

    fn book_rejected(
        &self, tx_id: TransactionID, inputs: impl Iterator<Item = OutputID>, target: BranchID,
    ) -> Result<BranchID, BookError> {
        self.update_transaction_metadata(tx_id, target, false, true)?;
        for input in inputs {
            self.consumers.store(Consumer::new(input, tx_id, TriBool::Maybe));
        }
        self.write_outputs(tx_id, target)?;
        Ok(target)
    }

    fn book_rejected_conflicting(
        &self, tx_id: TransactionID, inputs: impl Iterator<Item = OutputID>,
    ) -> Result<BranchID, BookError> {
        let branch_id = BranchID::hash(&tx_id.encode());
        let (_handle, _created) = self.branches.create_conflict_branch(
            branch_id,
            BTreeSet::from([BranchID::lazy_booked_conflicts()]),
            BTreeSet::new(),
        )?;
        self.branches.set_branch_liked(branch_id, false)?;
        self.branches.set_branch_finalized(branch_id, true)?;
        self.book_rejected(tx_id, inputs, branch_id)
    }

    fn book_non_conflicting(&self, tx: &Transaction, normalized: &BTreeSet<BranchID>) -> Result<BranchID, BookError> {
        let tx_id = tx.id();
        let target = self.branches.aggregate_branches(normalized)?;
        self.update_transaction_metadata(tx_id, target, false, false)?;
        for &input in &tx.essence().inputs {
            self.consumers.store(Consumer::new(input, tx_id, TriBool::True));
            self.bump_consumer_count(input, tx_id)?;
        }
        self.write_outputs(tx_id, target)?;
        Ok(target)
    }

    fn book_conflicting(
        &self, tx: &Transaction, normalized: &BTreeSet<BranchID>, conflicting_inputs: &[OutputID],
    ) -> Result<BranchID, BookError> {
        let tx_id = tx.id();

        for &input in conflicting_inputs {
            self.fork_future_cone(input)?;
        }

        let conflict_ids: BTreeSet<_> = conflicting_inputs.iter().map(|&input| self.conflict_id_of(input)).collect();
        let branch_id = BranchID::hash(&tx_id.encode());
        self.branches.create_conflict_branch(branch_id, normalized.clone(), conflict_ids)?;

        self.update_transaction_metadata(tx_id, branch_id, false, false)?;
        for &input in &tx.essence().inputs {
            self.consumers.store(Consumer::new(input, tx_id, TriBool::True));
            self.bump_consumer_count(input, tx_id)?;
        }
        self.write_outputs(tx_id, branch_id)?;
        Ok(branch_id)
    }

    /// An `OutputID` doubles as its own conflict-set identifier once it has more than one
    /// consumer (see the data model's definition of a conflict set).
    fn conflict_id_of(&self, output: OutputID) -> crate::ids::ConflictID {
        crate::ids::ConflictID::hash(&output.encode())
    }

    /// Forks every still-valid consumer in the future cone of `input` into a fresh conflict
    /// branch, then keeps walking forward, recomputing aggregated branch ids for descendants
    /// until a recomputation leaves a descendant's branch unchanged.
    ///
    /// Tracks visited outputs explicitly: the transaction DAG is acyclic by construction, but a
    /// corrupt store should not be able to turn that invariant into an infinite walk.
    fn fork_future_cone(&self, input: OutputID) -> Result<(), BookError> {
        // Held for the whole walk: every branch created or recomputed below must become visible
        // atomically, or a concurrent booker could observe a descendant retagged to its new
        // branch while one of its own ancestors is still carrying the stale one.
        let writer = self.branches.lock_writer();

        let mut queue: VecDeque<OutputID> = VecDeque::new();
        let mut seen: BTreeSet<TransactionID> = BTreeSet::new();

        // First layer: every still-valid direct consumer of `input` is itself a party to the new
        // double-spend and gets its own fresh conflict branch.
        for consumer in self.consumers(input)? {
            if !consumer.valid.is_true() {
                continue;
            }
            let consumer_tx_id = consumer.transaction_id;
            if !seen.insert(consumer_tx_id) {
                continue;
            }
            let consumer_meta = self
                .transaction_metadata
                .load(&consumer_tx_id.encode())?
                .ok_or_else(|| StoreError::NotFound(consumer_tx_id.encode()))?;
            let previous_branch = consumer_meta.branch_id;
            let new_branch = BranchID::hash(&consumer_tx_id.encode());
            let conflicts = BTreeSet::from([self.conflict_id_of(input)]);
            writer.create_conflict_branch(new_branch, BTreeSet::from([previous_branch]), conflicts)?;
            self.retag_transaction(consumer_tx_id, new_branch, &mut queue)?;
        }

        // Further descendants D do not get a new conflict branch of their own: their branch is
        // recomputed as the aggregate of their own inputs' current branches, and the walk along a
        // given path stops as soon as a recomputation leaves the branch unchanged.
        while let Some(output_id) = queue.pop_front() {
            for consumer in self.consumers(output_id)? {
                if !consumer.valid.is_true() {
                    continue;
                }
                let descendant_id = consumer.transaction_id;
                if !seen.insert(descendant_id) {
                    continue;
                }
                let descendant_meta = self
                    .transaction_metadata
                    .load(&descendant_id.encode())?
                    .ok_or_else(|| StoreError::NotFound(descendant_id.encode()))?;
                let descendant_tx = self
                    .transactions
                    .load(&descendant_id.encode())?
                    .ok_or_else(|| StoreError::NotFound(descendant_id.encode()))?;

                let mut input_branches = BTreeSet::new();
                for &descendant_input in &descendant_tx.essence().inputs {
                    let input_meta = self
                        .output_metadata
                        .load(&Output::storage_key_for(descendant_input))?
                        .ok_or_else(|| StoreError::NotFound(Output::storage_key_for(descendant_input)))?;
                    input_branches.insert(input_meta.branch_id);
                }
                let new_branch = writer.aggregate_branches(&input_branches)?;
                if new_branch == descendant_meta.branch_id {
                    continue;
                }
                self.retag_transaction(descendant_id, new_branch, &mut queue)?;
            }
        }
        Ok(())
    }

    /// Moves `tx_id` and every one of its outputs to `new_branch`, then enqueues those outputs so
    /// the fork walk can continue into their own consumers.
    fn retag_transaction(
        &self, tx_id: TransactionID, new_branch: BranchID, queue: &mut VecDeque<OutputID>,
    ) -> Result<(), BookError> {
        let meta = self.transaction_metadata.load(&tx_id.encode())?.ok_or_else(|| StoreError::NotFound(tx_id.encode()))?;
        self.update_transaction_metadata(tx_id, new_branch, meta.finalized, meta.lazy_booked)?;

        let tx = self.transactions.load(&tx_id.encode())?.ok_or_else(|| StoreError::NotFound(tx_id.encode()))?;
        for index in 0..tx.essence().outputs.len() as u16 {
            let output_id = tx.output_id(index);
            self.retag_output(output_id, new_branch)?;
            queue.push_back(output_id);
        }
        Ok(())
    }

    /// Whether the future cone of `inputs` (over `valid=True` consumers) ever reaches back to one
    /// of `inputs` itself — i.e. whether booking this transaction would close a cycle.
    fn past_cone_self_references(&self, inputs: &[OutputID]) -> Result<bool, BookError> {
        let targets: BTreeSet<OutputID> = inputs.iter().copied().collect();
        let mut queue: VecDeque<OutputID> = inputs.iter().copied().collect();
        let mut seen: BTreeSet<OutputID> = targets.clone();

        while let Some(current) = queue.pop_front() {
            for consumer in self.consumers(current)? {
                if !consumer.valid.is_true() {
                    continue;
                }
                let Some(consumer_tx) = self.transactions.load(&consumer.transaction_id.encode())? else {
                    return Err(StoreError::NotFound(consumer.transaction_id.encode()).into());
                };
                for index in 0..consumer_tx.essence().outputs.len() as u16 {
                    let output_id = consumer_tx.output_id(index);
                    if targets.contains(&output_id) {
                        return Ok(true);
                    }
                    if seen.insert(output_id) {
                        queue.push_back(output_id);
                    }
                }
            }
        }
        Ok(false)
    }

    fn bump_consumer_count(&self, input: OutputID, consumer: TransactionID) -> Result<(), BookError> {
        let key = Output::storage_key_for(input);
        let metadata = self.output_metadata.load(&key)?.ok_or(StoreError::NotFound(key))?;
        let mut updated = (*metadata).clone();
        updated.register_valid_consumer(consumer);
        self.output_metadata.store(updated);
        Ok(())
    }

    fn retag_output(&self, output: OutputID, branch_id: BranchID) -> Result<(), BookError> {
        let key = Output::storage_key_for(output);
        let metadata = self.output_metadata.load(&key)?.ok_or(StoreError::NotFound(key))?;
        let mut updated = (*metadata).clone();
        updated.branch_id = branch_id;
        self.output_metadata.store(updated);
        Ok(())
    }

    fn update_transaction_metadata(
        &self, tx_id: TransactionID, branch_id: BranchID, finalized: bool, lazy_booked: bool,
    ) -> Result<(), BookError> {
        let key = tx_id.encode();
        let existing = self.transaction_metadata.load(&key)?.ok_or_else(|| StoreError::NotFound(key))?;
        let old_state = self.branches.branch(existing.branch_id)?.inclusion_state();
        let mut updated = (*existing).clone();
        updated.branch_id = branch_id;
        updated.finalized = finalized;
        updated.lazy_booked = lazy_booked;
        self.transaction_metadata.store(updated);

        let new_state = self.branches.branch(branch_id)?.inclusion_state();
        if old_state != new_state {
            self.events.publish_inclusion_state_changed(&InclusionStateChanged {
                transaction_id: tx_id,
                old: old_state,
                new: new_state,
            });
        }
        Ok(())
    }

    fn write_outputs(&self, tx_id: TransactionID, branch_id: BranchID) -> Result<(), BookError> {
        let tx = self.transactions.load(&tx_id.encode())?.ok_or(StoreError::NotFound(tx_id.encode()))?;
        for (index, output) in tx.essence().outputs.iter().enumerate() {
            let output_id = tx.output_id(index as u16);
            let key = Output::storage_key_for(output_id);
            self.outputs.compute_if_absent(&key, || output.clone())?;
            self.output_metadata.compute_if_absent(&key, || OutputMetadata::new(output_id, branch_id))?;
            self.address_outputs.store_if_absent(AddressOutputMapping::new(output.address, output_id))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::ids::Address;
    use crate::store::InMemoryBackend;
    use crate::transaction::{Essence, UnlockBlock};

    fn new_dag() -> UtxoDag<InMemoryBackend> {
        let backend = Arc::new(InMemoryBackend::new());
        let events = Arc::new(EventBus::new());
        let branches = Arc::new(BranchDag::new(Arc::clone(&backend), Arc::clone(&events)));
        UtxoDag::new(backend, branches, events)
    }

    fn genesis_output_id() -> OutputID { OutputID::new(TransactionID::hash(&b"genesis".to_vec()), 0) }

    fn setup_genesis(dag: &UtxoDag<InMemoryBackend>) -> OutputID {
        let output_id = genesis_output_id();
        let output = Output::new(Address::hash(&b"genesis".to_vec()), BTreeMap::from([(Color::Iota, 100)]));
        dag.seed_output(output_id, output);
        output_id
    }

    fn spend(input: OutputID, to: &[u8], amount: u64) -> Transaction {
        let essence = Essence::new(
            vec![input],
            vec![Output::new(Address::hash(to), BTreeMap::from([(Color::Iota, amount)]))],
            vec![UnlockBlock::Signature(b"sig".to_vec())],
        );
        Transaction::new(essence)
    }

    #[test]
    fn single_valid_spend_lands_in_master() {
        let dag = new_dag();
        let genesis = setup_genesis(&dag);
        let tx_a = spend(genesis, b"x", 100);
        dag.book_transaction(tx_a.clone()).unwrap();

        let meta = dag.transaction_metadata(tx_a.id()).unwrap().unwrap();
        assert_eq!(meta.branch_id, BranchID::master());
        let output_meta = dag.output_metadata(tx_a.output_id(0)).unwrap().unwrap();
        assert_eq!(output_meta.branch_id, BranchID::master());
        let genesis_meta = dag.output_metadata(genesis).unwrap().unwrap();
        assert_eq!(genesis_meta.consumer_count, 1);
        assert_eq!(dag.inclusion_state(tx_a.id()).unwrap(), InclusionState::Pending);
    }

    #[test]
    fn double_spend_forks_both_transactions() {
        let dag = new_dag();
        let genesis = setup_genesis(&dag);
        let tx_a = spend(genesis, b"x", 100);
        let tx_b = spend(genesis, b"y", 100);
        dag.book_transaction(tx_a.clone()).unwrap();
        dag.book_transaction(tx_b.clone()).unwrap();

        let meta_a = dag.transaction_metadata(tx_a.id()).unwrap().unwrap();
        let meta_b = dag.transaction_metadata(tx_b.id()).unwrap().unwrap();
        assert_ne!(meta_a.branch_id, meta_b.branch_id);
        assert_ne!(meta_a.branch_id, BranchID::master());
        assert_ne!(meta_b.branch_id, BranchID::master());

        let genesis_meta = dag.output_metadata(genesis).unwrap().unwrap();
        assert_eq!(genesis_meta.consumer_count, 2);
    }

    #[test]
    fn cascading_fork_moves_descendant_into_new_branch() {
        let dag = new_dag();
        let genesis = setup_genesis(&dag);
        let tx_a = spend(genesis, b"x", 100);
        dag.book_transaction(tx_a.clone()).unwrap();

        let tx_c = spend(tx_a.output_id(0), b"z", 100);
        dag.book_transaction(tx_c.clone()).unwrap();
        let meta_c_before = dag.transaction_metadata(tx_c.id()).unwrap().unwrap();
        assert_eq!(meta_c_before.branch_id, BranchID::master());

        let tx_b = spend(genesis, b"y", 100);
        dag.book_transaction(tx_b.clone()).unwrap();

        let meta_a = dag.transaction_metadata(tx_a.id()).unwrap().unwrap();
        let meta_c_after = dag.transaction_metadata(tx_c.id()).unwrap().unwrap();
        assert_eq!(meta_c_after.branch_id, meta_a.branch_id);
        assert_ne!(meta_c_after.branch_id, BranchID::master());
    }

    #[test]
    fn rebooking_same_transaction_is_idempotent() {
        let dag = new_dag();
        let genesis = setup_genesis(&dag);
        let tx_a = spend(genesis, b"x", 100);
        dag.book_transaction(tx_a.clone()).unwrap();
        let meta_before = dag.transaction_metadata(tx_a.id()).unwrap().unwrap();
        dag.book_transaction(tx_a.clone()).unwrap();
        let meta_after = dag.transaction_metadata(tx_a.id()).unwrap().unwrap();
        assert_eq!(*meta_before, *meta_after);
    }

    #[test]
    fn not_solid_transaction_is_rejected_without_mutation() {
        let dag = new_dag();
        let dangling = OutputID::new(TransactionID::hash(&b"nowhere".to_vec()), 0);
        let tx = spend(dangling, b"x", 1);
        let result = dag.book_transaction(tx.clone());
        assert!(matches!(result, Err(BookError::NotSolid(_))));
        assert!(dag.transaction_metadata(tx.id()).unwrap().is_none());
    }

    #[test]
    fn unbalanced_transaction_is_invalid() {
        let dag = new_dag();
        let genesis = setup_genesis(&dag);
        let tx = spend(genesis, b"x", 1);
        let result = dag.book_transaction(tx);
        assert!(matches!(result, Err(BookError::Invalid(_, _))));
    }
}
