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

use crate::ids::{BranchID, TransactionID};

/// Object-storage inconsistency: a referenced entity is missing, or was asked to be stored twice
/// through an API that forbids it. Always fatal — the engine halts booking rather than continue
/// on an inconsistent graph.
#[derive(Clone, Eq, PartialEq, Debug, Display, Error)]
#[display(doc_comments)]
pub enum StoreError {
    /// entity with key {0:#x?} was expected to exist but is absent from the store
    NotFound(Vec<u8>),

    /// entity with key {0:#x?} already exists and cannot be overwritten in place
    AlreadyExists(Vec<u8>),

    /// object storage is in an inconsistent state: {0}
    Fatal(String),
}

/// Errors raised while normalising or mutating the branch DAG.
#[derive(Clone, Eq, PartialEq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum BranchError {
    /// the provided branches are mutually incompatible and cannot be combined
    InvalidStateTransition,

    /// branch {0} is referenced but not known to the branch DAG
    UnknownBranch(BranchID),

    #[from]
    #[display(inner)]
    Store(StoreError),
}

/// The outcome of [`crate::UtxoDag::book_transaction`] when it does not succeed.
///
/// Only the first two variants are ever returned to a caller (see the error taxonomy): a
/// `Fatal`-class inconsistency is expressed as [`BookError::Store`] and is meant to halt further
/// bookings rather than be handled locally.
#[derive(Clone, Eq, PartialEq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum BookError {
    /// transaction {0} is not solid: not all of its inputs resolve to known outputs
    NotSolid(TransactionID),

    /// transaction {0} is invalid: {1}
    Invalid(TransactionID, &'static str),

    #[from]
    #[display(inner)]
    Store(StoreError),
}

impl From<BranchError> for StoreError {
    fn from(err: BranchError) -> Self {
        match err {
            BranchError::Store(e) => e,
            other => StoreError::Fatal(other.to_string()),
        }
    }
}

impl From<BranchError> for BookError {
    fn from(err: BranchError) -> Self { BookError::Store(err.into()) }
}
