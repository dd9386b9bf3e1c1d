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

//! Length-prefixed binary encoding for every persisted entity. The wire format is normative (see
//! the external interfaces): big-endian integers, `u32` element-count prefixes for variable-length
//! lists unless noted otherwise, explicit tag bytes for tagged unions. We hand-write the codec
//! instead of deriving it so the byte layout cannot silently drift from the spec.

use std::collections::BTreeSet;

/// Failure to parse a persisted entity back out of its bytes.
#[derive(Clone, Eq, PartialEq, Debug, Display, Error)]
#[display(doc_comments)]
pub enum DecodeError {
    /// unexpected end of input while decoding {0}
    UnexpectedEof(&'static str),

    /// invalid tag byte {1:#04x} while decoding {0}
    InvalidTag(&'static str, u8),

    /// trailing {0} unconsumed byte(s) after decoding
    TrailingData(usize),
}

/// Encodes a value into its canonical, length-prefixed byte representation.
pub trait Encode {
    fn encode_to(&self, buf: &mut Vec<u8>);

    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_to(&mut buf);
        buf
    }
}

/// Decodes a value from the front of a byte slice, advancing the slice past the bytes consumed.
pub trait Decode: Sized {
    fn decode_from(buf: &mut &[u8]) -> Result<Self, DecodeError>;

    /// Decodes a value that is expected to consume the entirety of `bytes`.
    fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut slice = bytes;
        let value = Self::decode_from(&mut slice)?;
        if !slice.is_empty() {
            return Err(DecodeError::TrailingData(slice.len()));
        }
        Ok(value)
    }
}

pub(crate) fn take_array<const N: usize>(buf: &mut &[u8]) -> Result<[u8; N], DecodeError> {
    if buf.len() < N {
        return Err(DecodeError::UnexpectedEof("fixed-size array"));
    }
    let (head, tail) = buf.split_at(N);
    let array: [u8; N] = head.try_into().expect("split_at guarantees the length");
    *buf = tail;
    Ok(array)
}

macro_rules! impl_int {
    ($ty:ty) => {
        impl Encode for $ty {
            fn encode_to(&self, buf: &mut Vec<u8>) { buf.extend_from_slice(&self.to_be_bytes()); }
        }
        impl Decode for $ty {
            fn decode_from(buf: &mut &[u8]) -> Result<Self, DecodeError> {
                let bytes = take_array::<{ core::mem::size_of::<$ty>() }>(buf)?;
                Ok(<$ty>::from_be_bytes(bytes))
            }
        }
    };
}

impl_int!(u16);
impl_int!(u32);
impl_int!(u64);

impl Encode for u8 {
    fn encode_to(&self, buf: &mut Vec<u8>) { buf.push(*self); }
}
impl Decode for u8 {
    fn decode_from(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        let [byte] = take_array::<1>(buf)?;
        Ok(byte)
    }
}

impl Encode for bool {
    fn encode_to(&self, buf: &mut Vec<u8>) { buf.push(u8::from(*self)); }
}
impl Decode for bool {
    fn decode_from(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        match u8::decode_from(buf)? {
            0 => Ok(false),
            _ => Ok(true),
        }
    }
}

/// `f64` is encoded via its IEEE-754 bit pattern, per the epoch mana encoding.
pub(crate) fn encode_f64(value: f64, buf: &mut Vec<u8>) { value.to_bits().encode_to(buf) }
pub(crate) fn decode_f64(buf: &mut &[u8]) -> Result<f64, DecodeError> { Ok(f64::from_bits(u64::decode_from(buf)?)) }

impl Encode for Vec<u8> {
    fn encode_to(&self, buf: &mut Vec<u8>) {
        (self.len() as u32).encode_to(buf);
        buf.extend_from_slice(self);
    }
}
impl Decode for Vec<u8> {
    fn decode_from(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        let len = u32::decode_from(buf)? as usize;
        if buf.len() < len {
            return Err(DecodeError::UnexpectedEof("byte blob"));
        }
        let (head, tail) = buf.split_at(len);
        *buf = tail;
        Ok(head.to_vec())
    }
}

/// Encodes a `u32`-prefixed list of items, the default for variable-length lists in this crate's
/// wire format.
pub fn encode_list<T: Encode>(items: &[T], buf: &mut Vec<u8>) {
    (items.len() as u32).encode_to(buf);
    for item in items {
        item.encode_to(buf);
    }
}

pub fn decode_list<T: Decode>(buf: &mut &[u8]) -> Result<Vec<T>, DecodeError> {
    let len = u32::decode_from(buf)? as usize;
    let mut items = Vec::with_capacity(len.min(1 << 16));
    for _ in 0..len {
        items.push(T::decode_from(buf)?);
    }
    Ok(items)
}

/// Encodes a `u32`-prefixed set of items in their natural (already sorted) order.
pub fn encode_set<T: Encode + Ord>(items: &BTreeSet<T>, buf: &mut Vec<u8>) {
    (items.len() as u32).encode_to(buf);
    for item in items {
        item.encode_to(buf);
    }
}

pub fn decode_set<T: Decode + Ord>(buf: &mut &[u8]) -> Result<BTreeSet<T>, DecodeError> {
    let len = u32::decode_from(buf)? as usize;
    let mut items = BTreeSet::new();
    for _ in 0..len {
        items.insert(T::decode_from(buf)?);
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_roundtrip() {
        let mut buf = Vec::new();
        42u32.encode_to(&mut buf);
        assert_eq!(buf, 42u32.to_be_bytes().to_vec());
        assert_eq!(u32::decode(&buf).unwrap(), 42);
    }

    #[test]
    fn f64_roundtrips_via_bits() {
        let mut buf = Vec::new();
        encode_f64(1.5, &mut buf);
        assert_eq!(decode_f64(&mut buf.as_slice()).unwrap(), 1.5);
    }

    #[test]
    fn list_roundtrips() {
        let items = vec![1u32, 2, 3];
        let mut buf = Vec::new();
        encode_list(&items, &mut buf);
        let decoded: Vec<u32> = decode_list(&mut buf.as_slice()).unwrap();
        assert_eq!(items, decoded);
    }
}
