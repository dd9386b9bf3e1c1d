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

//! Mutable ledger state looked up by id: [`OutputMetadata`], [`TransactionMetadata`],
//! [`Consumer`] (the consumer index keyed by input, enabling future-cone walks) and
//! [`AddressOutputMapping`] (the reverse address index).

use chrono::{DateTime, Utc};

use crate::codec::{Decode, DecodeError, Encode};
use crate::error::StoreError;
use crate::ids::{Address, BranchID, OutputID, TransactionID};
use crate::store::StorableObject;

/// A three-valued flag recording how definite a [`Consumer`] relationship is.
///
/// `False` marks a consumer that was rejected outright (`book_invalid`); `Maybe` marks one booked
/// without deep validation into a known-rejected branch (`book_rejected`); `True` marks a fully
/// validated, branch-aggregating consumer.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub enum TriBool {
    #[default]
    False,
    Maybe,
    True,
}

impl TriBool {
    const TAG_FALSE: u8 = 0;
    const TAG_MAYBE: u8 = 1;
    const TAG_TRUE: u8 = 2;

    pub fn is_true(self) -> bool { matches!(self, TriBool::True) }
}

impl Encode for TriBool {
    fn encode_to(&self, buf: &mut Vec<u8>) {
        buf.push(match self {
            TriBool::False => Self::TAG_FALSE,
            TriBool::Maybe => Self::TAG_MAYBE,
            TriBool::True => Self::TAG_TRUE,
        });
    }
}

impl Decode for TriBool {
    fn decode_from(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        let tag = u8::decode_from(buf)?;
        Ok(match tag {
            Self::TAG_FALSE => TriBool::False,
            Self::TAG_MAYBE => TriBool::Maybe,
            Self::TAG_TRUE => TriBool::True,
            _ => return Err(DecodeError::InvalidTag("TriBool", tag)),
        })
    }
}

/// Mutable state attached to a stored [`crate::Output`].
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct OutputMetadata {
    pub output_id: OutputID,
    pub branch_id: BranchID,
    pub solid: bool,
    pub consumer_count: u32,
    pub first_consumer: Option<TransactionID>,
}

impl OutputMetadata {
    pub fn new(output_id: OutputID, branch_id: BranchID) -> Self {
        Self { output_id, branch_id, solid: true, consumer_count: 0, first_consumer: None }
    }

    /// Registers a fully-valid consumer, bumping the consumer count and recording the first
    /// consumer if this is the first.
    pub fn register_valid_consumer(&mut self, consumer: TransactionID) {
        self.consumer_count += 1;
        if self.first_consumer.is_none() {
            self.first_consumer = Some(consumer);
        }
    }
}

impl Encode for OutputMetadata {
    fn encode_to(&self, buf: &mut Vec<u8>) {
        self.branch_id.encode_to(buf);
        self.solid.encode_to(buf);
        self.consumer_count.encode_to(buf);
        match self.first_consumer {
            Some(id) => {
                true.encode_to(buf);
                id.encode_to(buf);
            }
            None => false.encode_to(buf),
        }
    }
}

impl Decode for OutputMetadata {
    fn decode_from(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        let _ = buf;
        unreachable!("OutputMetadata is reconstructed via StorableObject::from_storage")
    }
}

impl StorableObject for OutputMetadata {
    const PREFIX: u8 = 0x20;

    fn storage_key(&self) -> Vec<u8> { self.output_id.encode() }

    fn from_storage(key: &[u8], value: &[u8]) -> Result<Self, StoreError> {
        let output_id = OutputID::decode(key).map_err(|e| StoreError::Fatal(e.to_string()))?;
        let mut slice = value;
        let branch_id = BranchID::decode_from(&mut slice).map_err(|e| StoreError::Fatal(e.to_string()))?;
        let solid = bool::decode_from(&mut slice).map_err(|e| StoreError::Fatal(e.to_string()))?;
        let consumer_count = u32::decode_from(&mut slice).map_err(|e| StoreError::Fatal(e.to_string()))?;
        let has_first = bool::decode_from(&mut slice).map_err(|e| StoreError::Fatal(e.to_string()))?;
        let first_consumer = if has_first {
            Some(TransactionID::decode_from(&mut slice).map_err(|e| StoreError::Fatal(e.to_string()))?)
        } else {
            None
        };
        Ok(OutputMetadata { output_id, branch_id, solid, consumer_count, first_consumer })
    }
}

/// Mutable state attached to a stored [`crate::Transaction`].
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct TransactionMetadata {
    pub transaction_id: TransactionID,
    pub branch_id: BranchID,
    pub solid: bool,
    pub finalized: bool,
    pub lazy_booked: bool,
    pub booking_time: DateTime<Utc>,
}

impl TransactionMetadata {
    pub fn new(transaction_id: TransactionID, branch_id: BranchID, booking_time: DateTime<Utc>) -> Self {
        Self { transaction_id, branch_id, solid: true, finalized: false, lazy_booked: false, booking_time }
    }
}

impl Encode for TransactionMetadata {
    fn encode_to(&self, buf: &mut Vec<u8>) {
        self.branch_id.encode_to(buf);
        self.solid.encode_to(buf);
        self.finalized.encode_to(buf);
        self.lazy_booked.encode_to(buf);
        self.booking_time.timestamp_millis().encode_to(buf);
    }
}

impl Decode for TransactionMetadata {
    fn decode_from(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        let _ = buf;
        unreachable!("TransactionMetadata is reconstructed via StorableObject::from_storage")
    }
}

impl StorableObject for TransactionMetadata {
    const PREFIX: u8 = 0x21;

    fn storage_key(&self) -> Vec<u8> { self.transaction_id.encode() }

    fn from_storage(key: &[u8], value: &[u8]) -> Result<Self, StoreError> {
        let transaction_id = TransactionID::decode(key).map_err(|e| StoreError::Fatal(e.to_string()))?;
        let mut slice = value;
        let branch_id = BranchID::decode_from(&mut slice).map_err(|e| StoreError::Fatal(e.to_string()))?;
        let solid = bool::decode_from(&mut slice).map_err(|e| StoreError::Fatal(e.to_string()))?;
        let finalized = bool::decode_from(&mut slice).map_err(|e| StoreError::Fatal(e.to_string()))?;
        let lazy_booked = bool::decode_from(&mut slice).map_err(|e| StoreError::Fatal(e.to_string()))?;
        let millis = i64::decode_from(&mut slice).map_err(|e| StoreError::Fatal(e.to_string()))?;
        let booking_time = DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| StoreError::Fatal(format!("booking_time out of range: {millis}")))?;
        Ok(TransactionMetadata { transaction_id, branch_id, solid, finalized, lazy_booked, booking_time })
    }
}

/// A record of one transaction consuming one input, keyed so that a prefix scan on `consumed_input`
/// enumerates every spender of that output — this is the index the future-cone walk iterates.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Consumer {
    pub consumed_input: OutputID,
    pub transaction_id: TransactionID,
    pub valid: TriBool,
}

impl Consumer {
    pub fn new(consumed_input: OutputID, transaction_id: TransactionID, valid: TriBool) -> Self {
        Self { consumed_input, transaction_id, valid }
    }
}

impl Encode for Consumer {
    fn encode_to(&self, buf: &mut Vec<u8>) {
        self.consumed_input.encode_to(buf);
        self.transaction_id.encode_to(buf);
        self.valid.encode_to(buf);
    }
}

impl StorableObject for Consumer {
    const PREFIX: u8 = 0x22;

    fn storage_key(&self) -> Vec<u8> {
        let mut key = self.consumed_input.encode();
        key.extend_from_slice(&self.transaction_id.encode());
        key
    }

    fn storage_value(&self) -> Vec<u8> { self.valid.encode() }

    fn from_storage(key: &[u8], value: &[u8]) -> Result<Self, StoreError> {
        let mut slice = key;
        let consumed_input = OutputID::decode_from(&mut slice).map_err(|e| StoreError::Fatal(e.to_string()))?;
        let transaction_id = TransactionID::decode_from(&mut slice).map_err(|e| StoreError::Fatal(e.to_string()))?;
        let valid = TriBool::decode(value).map_err(|e| StoreError::Fatal(e.to_string()))?;
        Ok(Consumer { consumed_input, transaction_id, valid })
    }
}

impl Decode for Consumer {
    fn decode_from(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        let consumed_input = OutputID::decode_from(buf)?;
        let transaction_id = TransactionID::decode_from(buf)?;
        let valid = TriBool::decode_from(buf)?;
        Ok(Consumer { consumed_input, transaction_id, valid })
    }
}

/// A key-only reverse index entry: `address` received `output_id`. The value is always empty —
/// the key alone fully determines the record.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct AddressOutputMapping {
    pub address: Address,
    pub output_id: OutputID,
}

impl AddressOutputMapping {
    pub fn new(address: Address, output_id: OutputID) -> Self { Self { address, output_id } }
}

impl Encode for AddressOutputMapping {
    fn encode_to(&self, buf: &mut Vec<u8>) {
        self.address.encode_to(buf);
        self.output_id.encode_to(buf);
    }
}

impl Decode for AddressOutputMapping {
    fn decode_from(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        let address = Address::decode_from(buf)?;
        let output_id = OutputID::decode_from(buf)?;
        Ok(AddressOutputMapping { address, output_id })
    }
}

impl StorableObject for AddressOutputMapping {
    const PREFIX: u8 = 0x23;

    fn storage_key(&self) -> Vec<u8> { self.encode() }

    fn storage_value(&self) -> Vec<u8> { Vec::new() }

    fn from_storage(key: &[u8], _value: &[u8]) -> Result<Self, StoreError> {
        AddressOutputMapping::decode(key).map_err(|e| StoreError::Fatal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::TransactionID;

    #[test]
    fn tribool_roundtrips() {
        for value in [TriBool::False, TriBool::Maybe, TriBool::True] {
            let encoded = value.encode();
            assert_eq!(TriBool::decode(&encoded).unwrap(), value);
        }
    }

    #[test]
    fn output_metadata_roundtrips_through_storage() {
        let txid = TransactionID::hash(&b"tx".to_vec());
        let mut metadata = OutputMetadata::new(OutputID::new(txid, 0), BranchID::master());
        metadata.register_valid_consumer(txid);
        let key = metadata.storage_key();
        let value = metadata.storage_value();
        let decoded = OutputMetadata::from_storage(&key, &value).unwrap();
        assert_eq!(metadata, decoded);
    }

    #[test]
    fn consumer_key_allows_prefix_scan_by_input() {
        let txid_a = TransactionID::hash(&b"a".to_vec());
        let txid_b = TransactionID::hash(&b"b".to_vec());
        let input = OutputID::new(txid_a, 0);
        let consumer_a = Consumer::new(input, txid_a, TriBool::True);
        let consumer_b = Consumer::new(input, txid_b, TriBool::True);
        assert!(consumer_b.storage_key().starts_with(&input.encode()));
        assert!(consumer_a.storage_key().starts_with(&input.encode()));
    }
}
