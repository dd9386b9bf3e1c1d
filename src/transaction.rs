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

//! Immutable transaction bodies: [`Transaction`], its [`Essence`], [`Output`]s and
//! [`UnlockBlock`]s. None of these types carry mutable ledger state — that lives in
//! [`crate::metadata`] and is looked up by id.

use std::collections::BTreeMap;

use crate::codec::{decode_list, encode_list, Decode, DecodeError, Encode};
use crate::error::StoreError;
use crate::ids::{Address, Color, OutputID, TransactionID};
use crate::store::StorableObject;

/// A transaction output: an address it pays to, and a multi-colored balance.
///
/// The [`OutputID`] is not stored as part of the encoded value — it is derived from the owning
/// transaction's id and the output's index within the essence, and is only materialised once the
/// transaction has been assigned an id.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Output {
    pub address: Address,
    pub balances: BTreeMap<Color, u64>,
}

impl Output {
    pub fn new(address: Address, balances: BTreeMap<Color, u64>) -> Self { Self { address, balances } }

    pub fn balance_of(&self, color: Color) -> u64 { self.balances.get(&color).copied().unwrap_or(0) }
}

impl Encode for Output {
    fn encode_to(&self, buf: &mut Vec<u8>) {
        self.address.encode_to(buf);
        (self.balances.len() as u32).encode_to(buf);
        for (color, amount) in &self.balances {
            color.encode_to(buf);
            amount.encode_to(buf);
        }
    }
}

impl Decode for Output {
    fn decode_from(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        let address = Address::decode_from(buf)?;
        let len = u32::decode_from(buf)? as usize;
        let mut balances = BTreeMap::new();
        for _ in 0..len {
            let color = Color::decode_from(buf)?;
            let amount = u64::decode_from(buf)?;
            balances.insert(color, amount);
        }
        Ok(Output { address, balances })
    }
}

/// An output's own [`OutputID`] is assigned by the owning transaction (`transaction_id ‖ index`)
/// rather than carried inside its encoded content — the essence hashes the bare output, so the
/// output cannot also hash the id of the transaction that contains it. The object store is keyed
/// externally by that derived id wherever an output is persisted; `storage_key` here falls back
/// to the content hash so the trait remains total.
impl StorableObject for Output {
    const PREFIX: u8 = 0x11;

    fn storage_key(&self) -> Vec<u8> { self.encode() }

    fn from_storage(_key: &[u8], value: &[u8]) -> Result<Self, StoreError> {
        Output::decode(value).map_err(|e| StoreError::Fatal(e.to_string()))
    }
}

/// Proof that the creator of a transaction is authorised to consume the corresponding input.
///
/// This engine treats unlocking as a pluggable predicate rather than a fixed signature scheme: a
/// `Reference` unlock block defers to the unlock block at `index` (for inputs that share a single
/// signature, as in the original protocol's "same owner" optimisation), while a `Signature` block
/// carries opaque authorisation bytes checked by [`UnlockBlock::authorises`].
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum UnlockBlock {
    Signature(Vec<u8>),
    Reference(u16),
}

impl UnlockBlock {
    const TAG_SIGNATURE: u8 = 0;
    const TAG_REFERENCE: u8 = 1;

    /// Whether this unlock block authorises spending `input` as part of `essence`.
    ///
    /// A `Reference` is valid only if it points at an earlier input index carrying its own
    /// `Signature`; a `Signature` is valid as long as it is non-empty. Real signature
    /// verification against the input's address is intentionally out of scope: this engine
    /// models booking and branching, not cryptographic authorisation.
    pub fn authorises(&self, own_index: usize, essence: &Essence) -> bool {
        match self {
            UnlockBlock::Signature(bytes) => !bytes.is_empty(),
            UnlockBlock::Reference(index) => {
                let index = *index as usize;
                index < own_index
                    && matches!(essence.unlock_blocks.get(index), Some(UnlockBlock::Signature(bytes)) if !bytes.is_empty())
            }
        }
    }
}

impl Encode for UnlockBlock {
    fn encode_to(&self, buf: &mut Vec<u8>) {
        match self {
            UnlockBlock::Signature(bytes) => {
                buf.push(Self::TAG_SIGNATURE);
                bytes.encode_to(buf);
            }
            UnlockBlock::Reference(index) => {
                buf.push(Self::TAG_REFERENCE);
                index.encode_to(buf);
            }
        }
    }
}

impl Decode for UnlockBlock {
    fn decode_from(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        let tag = u8::decode_from(buf)?;
        Ok(match tag {
            Self::TAG_SIGNATURE => UnlockBlock::Signature(Vec::decode_from(buf)?),
            Self::TAG_REFERENCE => UnlockBlock::Reference(u16::decode_from(buf)?),
            _ => return Err(DecodeError::InvalidTag("UnlockBlock", tag)),
        })
    }
}

/// The transferable body of a transaction: an ordered list of consumed [`OutputID`]s (the
/// inputs), an ordered list of produced [`Output`]s, and one [`UnlockBlock`] per input.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Essence {
    pub inputs: Vec<OutputID>,
    pub outputs: Vec<Output>,
    pub unlock_blocks: Vec<UnlockBlock>,
}

impl Essence {
    pub fn new(inputs: Vec<OutputID>, outputs: Vec<Output>, unlock_blocks: Vec<UnlockBlock>) -> Self {
        Self { inputs, outputs, unlock_blocks }
    }

    /// Sums every input balance and every output balance per [`Color`]; the transaction is
    /// balanced iff the two maps are equal and every individual entry is non-zero.
    pub fn balances_match(&self, input_balances: &[BTreeMap<Color, u64>]) -> bool {
        let mut in_totals = BTreeMap::new();
        for balances in input_balances {
            for (&color, &amount) in balances {
                if amount == 0 {
                    return false;
                }
                *in_totals.entry(color).or_insert(0u64) += amount;
            }
        }
        let mut out_totals = BTreeMap::new();
        for output in &self.outputs {
            for (&color, &amount) in &output.balances {
                if amount == 0 {
                    return false;
                }
                *out_totals.entry(color).or_insert(0u64) += amount;
            }
        }
        !in_totals.is_empty() && in_totals == out_totals
    }

    /// Checks every unlock block against its corresponding input in order.
    pub fn unlocks_valid(&self) -> bool {
        if self.unlock_blocks.len() != self.inputs.len() {
            return false;
        }
        self.unlock_blocks.iter().enumerate().all(|(i, unlock)| unlock.authorises(i, self))
    }
}

impl Encode for Essence {
    fn encode_to(&self, buf: &mut Vec<u8>) {
        encode_list(&self.inputs, buf);
        encode_list(&self.outputs, buf);
        encode_list(&self.unlock_blocks, buf);
    }
}

impl Decode for Essence {
    fn decode_from(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        let inputs = decode_list(buf)?;
        let outputs = decode_list(buf)?;
        let unlock_blocks = decode_list(buf)?;
        Ok(Essence { inputs, outputs, unlock_blocks })
    }
}

/// An immutable, content-addressed transaction. Its id is the hash of its essence; two
/// transactions with identical essences are the same transaction.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Transaction {
    id: TransactionID,
    essence: Essence,
}

impl Transaction {
    pub fn new(essence: Essence) -> Self {
        let id = TransactionID::hash(&essence);
        Self { id, essence }
    }

    pub fn id(&self) -> TransactionID { self.id }

    pub fn essence(&self) -> &Essence { &self.essence }

    /// The [`OutputID`] of this transaction's output at `index`.
    pub fn output_id(&self, index: u16) -> OutputID { OutputID::new(self.id, index) }
}

impl Encode for Transaction {
    fn encode_to(&self, buf: &mut Vec<u8>) { self.essence.encode_to(buf) }
}

impl Decode for Transaction {
    fn decode_from(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        let _ = buf;
        unreachable!("Transaction is reconstructed via StorableObject::from_storage, which also needs its id")
    }
}

impl StorableObject for Transaction {
    const PREFIX: u8 = 0x10;

    fn storage_key(&self) -> Vec<u8> { self.id.encode() }

    fn from_storage(key: &[u8], value: &[u8]) -> Result<Self, StoreError> {
        let id = TransactionID::decode(key).map_err(|e| StoreError::Fatal(e.to_string()))?;
        let essence = Essence::decode(value).map_err(|e| StoreError::Fatal(e.to_string()))?;
        Ok(Transaction { id, essence })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(bytes: &[u8]) -> UnlockBlock { UnlockBlock::Signature(bytes.to_vec()) }

    #[test]
    fn essence_roundtrips_through_codec() {
        let txid = TransactionID::hash(&b"genesis".to_vec());
        let essence = Essence::new(
            vec![OutputID::new(txid, 0)],
            vec![Output::new(Address::hash(&b"alice".to_vec()), BTreeMap::from([(Color::Iota, 100)]))],
            vec![sig(b"proof")],
        );
        let decoded = Essence::decode(&essence.encode()).unwrap();
        assert_eq!(essence, decoded);
    }

    #[test]
    fn balanced_transaction_passes_balance_check() {
        let address = Address::hash(&b"bob".to_vec());
        let essence = Essence::new(
            vec![],
            vec![Output::new(address, BTreeMap::from([(Color::Iota, 100)]))],
            vec![],
        );
        let input_balances = vec![BTreeMap::from([(Color::Iota, 100u64)])];
        assert!(essence.balances_match(&input_balances));
    }

    #[test]
    fn mismatched_totals_fail_balance_check() {
        let address = Address::hash(&b"bob".to_vec());
        let essence = Essence::new(
            vec![],
            vec![Output::new(address, BTreeMap::from([(Color::Iota, 50)]))],
            vec![],
        );
        let input_balances = vec![BTreeMap::from([(Color::Iota, 100u64)])];
        assert!(!essence.balances_match(&input_balances));
    }

    #[test]
    fn reference_unlock_defers_to_earlier_signature() {
        let txid = TransactionID::hash(&b"tx".to_vec());
        let essence = Essence::new(
            vec![OutputID::new(txid, 0), OutputID::new(txid, 1)],
            vec![],
            vec![sig(b"proof"), UnlockBlock::Reference(0)],
        );
        assert!(essence.unlocks_valid());
    }

    #[test]
    fn transaction_id_is_deterministic() {
        let txid = TransactionID::hash(&b"seed".to_vec());
        let essence = Essence::new(vec![OutputID::new(txid, 0)], vec![], vec![sig(b"x")]);
        let a = Transaction::new(essence.clone());
        let b = Transaction::new(essence);
        assert_eq!(a.id(), b.id());
    }
}
