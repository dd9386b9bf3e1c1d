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

//! Fixed-width, content-derived identifiers. Every id in this crate is a 32-byte digest of its
//! owner's canonical encoding, wrapped so that equality and ordering stay bytewise and so that
//! `Display`/`FromStr` round-trip through a Baid64 string instead of raw hex.

use core::fmt::{self, Display, Formatter};
use core::str::FromStr;

use amplify::{Bytes32, ByteArray};
use baid64::{Baid64ParseError, DisplayBaid64, FromBaid64Str};
use commit_verify::{CommitmentId, DigestExt, Sha256};

use crate::codec::{Decode, Encode};

macro_rules! content_id {
    ($name:ident, $hri:literal, $tag:literal) => {
        #[derive(Wrapper, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, From)]
        #[wrapper(Deref, BorrowSlice, Hex, Index, RangeOps)]
        pub struct $name(
            #[from]
            #[from([u8; 32])]
            Bytes32,
        );

        impl DisplayBaid64 for $name {
            const HRI: &'static str = $hri;
            const CHUNKING: bool = true;
            const PREFIX: bool = true;
            const EMBED_CHECKSUM: bool = false;
            const MNEMONIC: bool = false;
            fn to_baid64_payload(&self) -> [u8; 32] { self.to_byte_array() }
        }
        impl FromBaid64Str for $name {}
        impl FromStr for $name {
            type Err = Baid64ParseError;
            fn from_str(s: &str) -> Result<Self, Self::Err> { Self::from_baid64_str(s) }
        }
        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result { self.fmt_baid64(f) }
        }

        impl From<Sha256> for $name {
            fn from(hasher: Sha256) -> Self { hasher.finish().into() }
        }

        impl CommitmentId for $name {
            const TAG: &'static str = $tag;
        }

        impl $name {
            /// Derives the id by hashing the canonical encoding of `content`.
            pub fn hash(content: &impl Encode) -> Self {
                let mut hasher = Sha256::default();
                hasher.input_raw(&content.encode());
                hasher.into()
            }

            pub fn from_byte_array(bytes: [u8; 32]) -> Self { Self(Bytes32::from(bytes)) }
        }
    };
}

content_id!(TransactionID, "tx", "urn:ledgerstate:transaction#2024-01-01");
content_id!(BranchID, "branch", "urn:ledgerstate:branch#2024-01-01");
content_id!(ConflictID, "conflict", "urn:ledgerstate:conflict#2024-01-01");
content_id!(Address, "addr", "urn:ledgerstate:address#2024-01-01");
content_id!(NodeID, "node", "urn:ledgerstate:node#2024-01-01");

/// An output identifier: the transaction that created the output plus its index within that
/// transaction's essence.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub struct OutputID {
    pub transaction_id: TransactionID,
    pub index: u16,
}

impl OutputID {
    pub fn new(transaction_id: TransactionID, index: u16) -> Self { Self { transaction_id, index } }
}

impl Display for OutputID {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result { write!(f, "{}:{}", self.transaction_id, self.index) }
}

/// An epoch identifier. Unlike the other ids, this is not content-derived: epochs are numbered
/// sequentially by an external mana tracker.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Default, From)]
pub struct EpochID(pub u64);

impl Display for EpochID {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result { Display::fmt(&self.0, f) }
}

/// The color of a balance entry: the sentinel IOTA color, a sentinel used only while an output is
/// being constructed (before its minting transaction id is known), or the id of the transaction
/// that minted the colored supply.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub enum Color {
    Iota,
    NewMint,
    Minted(TransactionID),
}

impl Color {
    const TAG_IOTA: u8 = 0;
    const TAG_NEW_MINT: u8 = 1;
    const TAG_MINTED: u8 = 2;
}

/// Sentinel branch ids, fixed at genesis. Each is the all-zero id with a distinguishing final
/// byte, so they remain trivially recognisable and never collide with a content-derived id (whose
/// final byte is uniformly distributed).
impl BranchID {
    /// The root branch. Always confirmed and liked; every other branch descends from it.
    pub fn master() -> BranchID { Self::sentinel(0x01) }
    /// Terminal sink for permanently invalid transactions.
    pub fn invalid() -> BranchID { Self::sentinel(0x02) }
    /// Parent of all lazy-booked rejected-conflict branches.
    pub fn lazy_booked_conflicts() -> BranchID { Self::sentinel(0x03) }

    fn sentinel(tag: u8) -> Self {
        let mut bytes = [0u8; 32];
        bytes[31] = tag;
        BranchID(Bytes32::from_byte_array(bytes))
    }

    pub fn is_sentinel(&self) -> bool {
        *self == Self::master() || *self == Self::invalid() || *self == Self::lazy_booked_conflicts()
    }
}

impl Encode for Color {
    fn encode_to(&self, buf: &mut Vec<u8>) {
        match self {
            Color::Iota => buf.push(Self::TAG_IOTA),
            Color::NewMint => buf.push(Self::TAG_NEW_MINT),
            Color::Minted(txid) => {
                buf.push(Self::TAG_MINTED);
                txid.encode_to(buf);
            }
        }
    }
}

impl Decode for Color {
    fn decode_from(buf: &mut &[u8]) -> Result<Self, crate::codec::DecodeError> {
        let tag = u8::decode_from(buf)?;
        Ok(match tag {
            Self::TAG_IOTA => Color::Iota,
            Self::TAG_NEW_MINT => Color::NewMint,
            Self::TAG_MINTED => Color::Minted(TransactionID::decode_from(buf)?),
            _ => return Err(crate::codec::DecodeError::InvalidTag("Color", tag)),
        })
    }
}

impl Encode for TransactionID {
    fn encode_to(&self, buf: &mut Vec<u8>) { buf.extend_from_slice(self.as_slice()); }
}
impl Decode for TransactionID {
    fn decode_from(buf: &mut &[u8]) -> Result<Self, crate::codec::DecodeError> {
        let bytes: [u8; 32] = crate::codec::take_array(buf)?;
        Ok(TransactionID::from_byte_array(bytes))
    }
}

impl Encode for BranchID {
    fn encode_to(&self, buf: &mut Vec<u8>) { buf.extend_from_slice(self.as_slice()); }
}
impl Decode for BranchID {
    fn decode_from(buf: &mut &[u8]) -> Result<Self, crate::codec::DecodeError> {
        let bytes: [u8; 32] = crate::codec::take_array(buf)?;
        Ok(BranchID::from_byte_array(bytes))
    }
}

impl Encode for ConflictID {
    fn encode_to(&self, buf: &mut Vec<u8>) { buf.extend_from_slice(self.as_slice()); }
}
impl Decode for ConflictID {
    fn decode_from(buf: &mut &[u8]) -> Result<Self, crate::codec::DecodeError> {
        let bytes: [u8; 32] = crate::codec::take_array(buf)?;
        Ok(ConflictID::from_byte_array(bytes))
    }
}

impl Encode for Address {
    fn encode_to(&self, buf: &mut Vec<u8>) { buf.extend_from_slice(self.as_slice()); }
}
impl Decode for Address {
    fn decode_from(buf: &mut &[u8]) -> Result<Self, crate::codec::DecodeError> {
        let bytes: [u8; 32] = crate::codec::take_array(buf)?;
        Ok(Address::from_byte_array(bytes))
    }
}

impl Encode for NodeID {
    fn encode_to(&self, buf: &mut Vec<u8>) { buf.extend_from_slice(self.as_slice()); }
}
impl Decode for NodeID {
    fn decode_from(buf: &mut &[u8]) -> Result<Self, crate::codec::DecodeError> {
        let bytes: [u8; 32] = crate::codec::take_array(buf)?;
        Ok(NodeID::from_byte_array(bytes))
    }
}

impl Encode for OutputID {
    fn encode_to(&self, buf: &mut Vec<u8>) {
        self.transaction_id.encode_to(buf);
        self.index.encode_to(buf);
    }
}
impl Decode for OutputID {
    fn decode_from(buf: &mut &[u8]) -> Result<Self, crate::codec::DecodeError> {
        let transaction_id = TransactionID::decode_from(buf)?;
        let index = u16::decode_from(buf)?;
        Ok(OutputID::new(transaction_id, index))
    }
}

impl Encode for EpochID {
    fn encode_to(&self, buf: &mut Vec<u8>) { self.0.encode_to(buf); }
}
impl Decode for EpochID {
    fn decode_from(buf: &mut &[u8]) -> Result<Self, crate::codec::DecodeError> { Ok(EpochID(u64::decode_from(buf)?)) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_are_distinct() {
        assert_ne!(BranchID::master(), BranchID::invalid());
        assert_ne!(BranchID::master(), BranchID::lazy_booked_conflicts());
        assert_ne!(BranchID::invalid(), BranchID::lazy_booked_conflicts());
        assert!(BranchID::master().is_sentinel());
    }

    #[test]
    fn output_id_roundtrip() {
        let txid = TransactionID::hash(&b"hello".to_vec());
        let oid = OutputID::new(txid, 3);
        let bytes = oid.encode();
        let decoded = OutputID::decode(&bytes).unwrap();
        assert_eq!(oid, decoded);
    }
}
