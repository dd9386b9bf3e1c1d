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

//! End-to-end booking scenarios over a fresh in-memory ledger.

use std::collections::BTreeMap;
use std::sync::Arc;

use ledgerstate::{
    Address, BookError, BranchDag, BranchID, Color, Essence, EventBus, InMemoryBackend, InclusionState, Output,
    OutputID, Transaction, TransactionID, UnlockBlock, UtxoDag,
};

struct Ledger {
    dag: UtxoDag<InMemoryBackend>,
    branches: Arc<BranchDag<InMemoryBackend>>,
}

fn new_ledger() -> Ledger {
    let backend = Arc::new(InMemoryBackend::new());
    let events = Arc::new(EventBus::new());
    let branches = Arc::new(BranchDag::new(Arc::clone(&backend), Arc::clone(&events)));
    let dag = UtxoDag::new(backend, Arc::clone(&branches), events);
    Ledger { dag, branches }
}

fn genesis_output_id() -> OutputID { OutputID::new(TransactionID::hash(&b"genesis".to_vec()), 0) }

fn seed_genesis(ledger: &Ledger) -> OutputID {
    let output_id = genesis_output_id();
    let output = Output::new(Address::hash(&b"genesis".to_vec()), BTreeMap::from([(Color::Iota, 100)]));
    ledger.dag.seed_output(output_id, output);
    output_id
}

fn spend(input: OutputID, to: &[u8], amount: u64) -> Transaction {
    let essence = Essence::new(
        vec![input],
        vec![Output::new(Address::hash(&to.to_vec()), BTreeMap::from([(Color::Iota, amount)]))],
        vec![UnlockBlock::Signature(b"sig".to_vec())],
    );
    Transaction::new(essence)
}

#[test]
fn single_valid_spend() {
    let ledger = new_ledger();
    let o0 = seed_genesis(&ledger);

    let tx_a = spend(o0, b"x", 100);
    ledger.dag.book_transaction(tx_a.clone()).unwrap();

    let meta_a = ledger.dag.transaction_metadata(tx_a.id()).unwrap().unwrap();
    assert_eq!(meta_a.branch_id, BranchID::master());

    let o1_meta = ledger.dag.output_metadata(tx_a.output_id(0)).unwrap().unwrap();
    assert_eq!(o1_meta.branch_id, BranchID::master());

    let o0_meta = ledger.dag.output_metadata(o0).unwrap().unwrap();
    assert_eq!(o0_meta.consumer_count, 1);

    assert_eq!(ledger.dag.inclusion_state(tx_a.id()).unwrap(), InclusionState::Pending);
}

#[test]
fn double_spend_creates_two_conflict_branches() {
    let ledger = new_ledger();
    let o0 = seed_genesis(&ledger);

    let tx_a = spend(o0, b"x", 100);
    ledger.dag.book_transaction(tx_a.clone()).unwrap();
    let tx_b = spend(o0, b"y", 100);
    ledger.dag.book_transaction(tx_b.clone()).unwrap();

    let meta_a = ledger.dag.transaction_metadata(tx_a.id()).unwrap().unwrap();
    let meta_b = ledger.dag.transaction_metadata(tx_b.id()).unwrap().unwrap();
    assert_ne!(meta_a.branch_id, meta_b.branch_id);

    let branch_a = ledger.branches.branch(meta_a.branch_id).unwrap();
    let branch_b = ledger.branches.branch(meta_b.branch_id).unwrap();
    assert!(branch_a.parents().contains(&BranchID::master()));
    assert!(branch_b.parents().contains(&BranchID::master()));

    let o1_meta = ledger.dag.output_metadata(tx_a.output_id(0)).unwrap().unwrap();
    let o2_meta = ledger.dag.output_metadata(tx_b.output_id(0)).unwrap().unwrap();
    assert_eq!(o1_meta.branch_id, meta_a.branch_id);
    assert_eq!(o2_meta.branch_id, meta_b.branch_id);

    let o0_meta = ledger.dag.output_metadata(o0).unwrap().unwrap();
    assert_eq!(o0_meta.consumer_count, 2);
}

#[test]
fn cascading_fork_relabels_descendant() {
    let ledger = new_ledger();
    let o0 = seed_genesis(&ledger);

    let tx_a = spend(o0, b"x", 100);
    ledger.dag.book_transaction(tx_a.clone()).unwrap();

    let tx_c = spend(tx_a.output_id(0), b"z", 100);
    ledger.dag.book_transaction(tx_c.clone()).unwrap();
    assert_eq!(ledger.dag.transaction_metadata(tx_c.id()).unwrap().unwrap().branch_id, BranchID::master());

    let tx_b = spend(o0, b"y", 100);
    ledger.dag.book_transaction(tx_b.clone()).unwrap();

    let meta_a = ledger.dag.transaction_metadata(tx_a.id()).unwrap().unwrap();
    let meta_c = ledger.dag.transaction_metadata(tx_c.id()).unwrap().unwrap();
    assert_eq!(meta_c.branch_id, meta_a.branch_id);
    assert_ne!(meta_c.branch_id, BranchID::master());

    let o3_meta = ledger.dag.output_metadata(tx_c.output_id(0)).unwrap().unwrap();
    assert_eq!(o3_meta.branch_id, meta_a.branch_id);
}

#[test]
fn spending_an_output_owned_by_a_rejected_branch_is_rejected() {
    let ledger = new_ledger();
    let o0 = seed_genesis(&ledger);

    // Fork the genesis output so its two sides land in distinct conflict branches, then have the
    // external consensus layer reject one side the way it would once the other side confirms.
    let tx_a = spend(o0, b"x", 100);
    ledger.dag.book_transaction(tx_a.clone()).unwrap();
    let tx_b = spend(o0, b"y", 100);
    ledger.dag.book_transaction(tx_b.clone()).unwrap();

    let meta_a = ledger.dag.transaction_metadata(tx_a.id()).unwrap().unwrap();
    ledger.branches.set_inclusion_state(meta_a.branch_id, InclusionState::Rejected).unwrap();

    let tx_c = spend(tx_a.output_id(0), b"z", 100);
    ledger.dag.book_transaction(tx_c.clone()).unwrap();

    let meta_c = ledger.dag.transaction_metadata(tx_c.id()).unwrap().unwrap();
    assert_eq!(meta_c.branch_id, meta_a.branch_id);
    assert_eq!(ledger.dag.inclusion_state(tx_c.id()).unwrap(), InclusionState::Rejected);

    let consumers = ledger.dag.consumers(tx_a.output_id(0)).unwrap();
    assert_eq!(consumers.len(), 1);
    assert_eq!(consumers[0].transaction_id, tx_c.id());
}

#[test]
fn rebooking_is_idempotent() {
    let ledger = new_ledger();
    let o0 = seed_genesis(&ledger);
    let tx_a = spend(o0, b"x", 100);

    ledger.dag.book_transaction(tx_a.clone()).unwrap();
    let before = ledger.dag.transaction_metadata(tx_a.id()).unwrap().unwrap();
    ledger.dag.book_transaction(tx_a.clone()).unwrap();
    let after = ledger.dag.transaction_metadata(tx_a.id()).unwrap().unwrap();

    assert_eq!(*before, *after);
    let o0_meta = ledger.dag.output_metadata(o0).unwrap().unwrap();
    assert_eq!(o0_meta.consumer_count, 1);
}

#[test]
fn unresolved_input_is_not_solid() {
    let ledger = new_ledger();
    let dangling = OutputID::new(TransactionID::hash(&b"nowhere".to_vec()), 0);
    let tx = spend(dangling, b"x", 1);

    let result = ledger.dag.book_transaction(tx.clone());
    assert!(matches!(result, Err(BookError::NotSolid(id)) if id == tx.id()));
    assert!(ledger.dag.transaction_metadata(tx.id()).unwrap().is_none());
}

#[test]
fn unbalanced_spend_is_invalid() {
    let ledger = new_ledger();
    let o0 = seed_genesis(&ledger);
    let tx = spend(o0, b"x", 999);

    let result = ledger.dag.book_transaction(tx);
    assert!(matches!(result, Err(BookError::Invalid(_, _))));
}

#[test]
fn outputs_on_address_reflects_reverse_index() {
    let ledger = new_ledger();
    let o0 = seed_genesis(&ledger);
    let tx_a = spend(o0, b"x", 100);
    ledger.dag.book_transaction(tx_a.clone()).unwrap();

    let address = Address::hash(&b"x".to_vec());
    let outputs = ledger.dag.outputs_on_address(address).unwrap();
    assert_eq!(outputs, vec![tx_a.output_id(0)]);
}
