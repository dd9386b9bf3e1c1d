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

//! Synchronous in-process pub/sub. Each event name is its own typed [`Event`] rather than a
//! stringly-keyed dispatch table, so subscribers get a concrete struct instead of downcasting.
//! Handlers run on the publishing thread, in registration order, with no backpressure.

use std::sync::Mutex;

use crate::branch::InclusionState;
use crate::ids::{BranchID, TransactionID};

/// A transaction was successfully booked into `branch_id`.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct TransactionBooked {
    pub transaction_id: TransactionID,
    pub branch_id: BranchID,
}

/// A transaction could not be booked because an input does not yet resolve locally.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct TransactionNotSolid {
    pub transaction_id: TransactionID,
}

/// A new conflict branch was registered in the branch DAG.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct BranchCreated {
    pub branch_id: BranchID,
}

/// A transaction's effective inclusion state changed as its branch (or the transaction's own
/// finalization) moved.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct InclusionStateChanged {
    pub transaction_id: TransactionID,
    pub old: InclusionState,
    pub new: InclusionState,
}

/// A single named event: a list of handlers invoked, in order, on every publish.
struct Event<T> {
    handlers: Mutex<Vec<Box<dyn Fn(&T) + Send + Sync>>>,
}

impl<T> Event<T> {
    fn new() -> Self { Self { handlers: Mutex::new(Vec::new()) } }

    fn subscribe(&self, handler: impl Fn(&T) + Send + Sync + 'static) {
        self.handlers.lock().expect("event handler list poisoned").push(Box::new(handler));
    }

    fn publish(&self, payload: &T) {
        for handler in self.handlers.lock().expect("event handler list poisoned").iter() {
            handler(payload);
        }
    }
}

impl<T> Default for Event<T> {
    fn default() -> Self { Self::new() }
}

/// The engine's fixed set of named events. There is no dynamic registration of new event kinds —
/// every event this engine can emit is enumerated here.
#[derive(Default)]
pub struct EventBus {
    transaction_booked: Event<TransactionBooked>,
    transaction_not_solid: Event<TransactionNotSolid>,
    branch_created: Event<BranchCreated>,
    inclusion_state_changed: Event<InclusionStateChanged>,
}

impl EventBus {
    pub fn new() -> Self { Self::default() }

    pub fn on_transaction_booked(&self, handler: impl Fn(&TransactionBooked) + Send + Sync + 'static) {
        self.transaction_booked.subscribe(handler);
    }

    pub fn on_transaction_not_solid(&self, handler: impl Fn(&TransactionNotSolid) + Send + Sync + 'static) {
        self.transaction_not_solid.subscribe(handler);
    }

    pub fn on_branch_created(&self, handler: impl Fn(&BranchCreated) + Send + Sync + 'static) {
        self.branch_created.subscribe(handler);
    }

    pub fn on_inclusion_state_changed(&self, handler: impl Fn(&InclusionStateChanged) + Send + Sync + 'static) {
        self.inclusion_state_changed.subscribe(handler);
    }

    pub(crate) fn publish_transaction_booked(&self, event: &TransactionBooked) { self.transaction_booked.publish(event); }

    pub(crate) fn publish_transaction_not_solid(&self, event: &TransactionNotSolid) {
        self.transaction_not_solid.publish(event);
    }

    pub(crate) fn publish_branch_created(&self, event: &BranchCreated) { self.branch_created.publish(event); }

    pub(crate) fn publish_inclusion_state_changed(&self, event: &InclusionStateChanged) {
        self.inclusion_state_changed.publish(event);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn handlers_run_in_registration_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let first = Arc::clone(&order);
        bus.on_branch_created(move |_| first.lock().unwrap().push(1));
        let second = Arc::clone(&order);
        bus.on_branch_created(move |_| second.lock().unwrap().push(2));
        bus.publish_branch_created(&BranchCreated { branch_id: BranchID::master() });
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn publish_invokes_every_handler() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        bus.on_transaction_not_solid(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let txid = TransactionID::hash(&b"tx".to_vec());
        bus.publish_transaction_not_solid(&TransactionNotSolid { transaction_id: txid });
        bus.publish_transaction_not_solid(&TransactionNotSolid { transaction_id: txid });
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
