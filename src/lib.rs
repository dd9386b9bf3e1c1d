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

#![deny(
    dead_code,
    unused_variables,
    unused_mut,
    unused_imports,
    non_upper_case_globals,
    non_camel_case_types,
    non_snake_case
)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

#[macro_use]
extern crate amplify;

#[cfg(feature = "serde")]
#[macro_use]
extern crate serde;

mod branch;
mod codec;
mod epoch;
mod error;
mod events;
mod ids;
mod metadata;
mod store;
mod transaction;
mod utxo_dag;

pub use branch::{AggregatedBranch, Branch, BranchDag, ConflictBranch, InclusionState};
pub use codec::{Decode, DecodeError, Encode};
pub use epoch::{Epoch, Epochs};
pub use error::{BookError, BranchError, StoreError};
pub use events::{BranchCreated, Event, EventBus, InclusionStateChanged, TransactionBooked, TransactionNotSolid};
pub use ids::{Address, BranchID, Color, ConflictID, EpochID, NodeID, OutputID, TransactionID};
pub use metadata::{AddressOutputMapping, Consumer, OutputMetadata, TransactionMetadata, TriBool};
pub use store::{Handle, InMemoryBackend, ObjectStore};
pub use transaction::{Essence, Output, Transaction, UnlockBlock};
pub use utxo_dag::UtxoDag;
