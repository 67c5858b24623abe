//! Arbitrary-precision unsigned counter.
//!
//! A `Counter` is used three ways: as a monotonic ordinal index, as a
//! running total, and as a fragment of a store key.
//!
//! - [`Counter::to_bytes`] is the canonical value encoding: minimal
//!   big-endian bytes, zero encodes as the empty slice.
//! - [`Counter::to_key`] prefixes those bytes with their length so that
//!   byte-wise key order equals numeric order.

use std::fmt;
use std::ops::{Add, AddAssign};

use num_bigint::BigUint;
use num_traits::{CheckedSub, ToPrimitive, Zero};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::IndexerError;

/// Longest value, in bytes, that [`Counter::to_key`] can encode.
pub const MAX_KEY_BYTES: usize = u8::MAX as usize;

#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Counter(BigUint);

impl Counter {
    pub fn zero() -> Self {
        Self(BigUint::zero())
    }

    pub fn one() -> Self {
        Self(BigUint::from(1u8))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Decode the canonical big-endian value encoding.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(BigUint::from_bytes_be(bytes))
    }

    /// Canonical big-endian value encoding (zero is empty).
    pub fn to_bytes(&self) -> Vec<u8> {
        if self.is_zero() {
            return Vec::new();
        }
        self.0.to_bytes_be()
    }

    /// Length-prefixed big-endian encoding, sortable as a key fragment.
    ///
    /// The one-byte prefix bounds the value to [`MAX_KEY_BYTES`] bytes.
    pub fn to_key(&self) -> Vec<u8> {
        let bytes = self.to_bytes();
        debug_assert!(
            bytes.len() <= MAX_KEY_BYTES,
            "counter key overflows its length prefix ({} bytes)",
            bytes.len()
        );
        let mut key = Vec::with_capacity(bytes.len() + 1);
        key.push(bytes.len() as u8);
        key.extend_from_slice(&bytes);
        key
    }

    /// Decode a key fragment produced by [`Counter::to_key`].
    ///
    /// Returns the counter and the number of bytes consumed.
    pub fn from_key(key: &[u8]) -> Result<(Self, usize), IndexerError> {
        let len = *key
            .first()
            .ok_or_else(|| IndexerError::Codec("empty counter key".into()))? as usize;
        let body = key
            .get(1..1 + len)
            .ok_or_else(|| IndexerError::Codec(format!("truncated counter key ({len} bytes)")))?;
        Ok((Self::from_bytes(body), 1 + len))
    }

    pub fn checked_sub(&self, other: &Counter) -> Option<Counter> {
        self.0.checked_sub(&other.0).map(Self)
    }

    pub fn saturating_sub(&self, other: &Counter) -> Counter {
        self.checked_sub(other).unwrap_or_default()
    }

    pub fn to_u64(&self) -> Option<u64> {
        self.0.to_u64()
    }

    pub fn incr(&mut self) {
        self.0 += 1u8;
    }
}

impl From<u64> for Counter {
    fn from(v: u64) -> Self {
        Self(BigUint::from(v))
    }
}

impl Add for Counter {
    type Output = Counter;
    fn add(self, rhs: Counter) -> Counter {
        Counter(self.0 + rhs.0)
    }
}

impl<'a> Add<&'a Counter> for &'a Counter {
    type Output = Counter;
    fn add(self, rhs: &'a Counter) -> Counter {
        Counter(&self.0 + &rhs.0)
    }
}

impl AddAssign<&Counter> for Counter {
    fn add_assign(&mut self, rhs: &Counter) {
        self.0 += &rhs.0;
    }
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Counter({})", self.0)
    }
}

// Serialized as a decimal string so values beyond u64 survive JSON.
impl Serialize for Counter {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.0.to_str_radix(10))
    }
}

impl<'de> Deserialize<'de> for Counter {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        BigUint::parse_bytes(s.as_bytes(), 10)
            .map(Counter)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid counter: {s}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widest_key_round_trips() {
        let widest = Counter::from_bytes(&[0xff; MAX_KEY_BYTES]);
        let key = widest.to_key();
        assert_eq!(key[0], u8::MAX);
        assert_eq!(Counter::from_key(&key).unwrap(), (widest, MAX_KEY_BYTES + 1));
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "overflows its length prefix")]
    fn oversized_key_is_caught() {
        Counter::from_bytes(&[0xff; MAX_KEY_BYTES + 1]).to_key();
    }

    #[test]
    fn zero_encodes_as_empty() {
        assert!(Counter::zero().to_bytes().is_empty());
        assert_eq!(Counter::from_bytes(&[]), Counter::zero());
        assert_eq!(Counter::zero().to_key(), vec![0]);
    }

    #[test]
    fn value_encoding_is_minimal_big_endian() {
        assert_eq!(Counter::from(1).to_bytes(), vec![1]);
        assert_eq!(Counter::from(256).to_bytes(), vec![1, 0]);
        assert_eq!(Counter::from_bytes(&[0x01, 0x00]).to_u64(), Some(256));
    }

    #[test]
    fn key_order_matches_numeric_order() {
        let values = [0u64, 1, 9, 255, 256, 65_535, 1 << 40];
        for pair in values.windows(2) {
            let a = Counter::from(pair[0]).to_key();
            let b = Counter::from(pair[1]).to_key();
            assert!(a < b, "{} should sort before {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn key_fragment_decodes_with_length() {
        let mut key = Counter::from(1000).to_key();
        key.extend_from_slice(b"tail");
        let (c, used) = Counter::from_key(&key).unwrap();
        assert_eq!(c.to_u64(), Some(1000));
        assert_eq!(&key[used..], b"tail");
        assert!(Counter::from_key(&[3, 1]).is_err());
    }

    #[test]
    fn checked_sub_never_goes_negative() {
        let five = Counter::from(5);
        let seven = Counter::from(7);
        assert_eq!(seven.checked_sub(&five), Some(Counter::from(2)));
        assert_eq!(five.checked_sub(&seven), None);
        assert_eq!(five.saturating_sub(&seven), Counter::zero());
    }

    #[test]
    fn serde_survives_large_values() {
        let big = Counter::from(u64::MAX) + Counter::from(u64::MAX);
        let json = serde_json::to_string(&big).unwrap();
        assert_eq!(json, "\"36893488147419103230\"");
        let back: Counter = serde_json::from_str(&json).unwrap();
        assert_eq!(back, big);
    }
}
