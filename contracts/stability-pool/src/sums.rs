//! 256-bit per-unit reward sums
//!
//! `S` and `G` accumulate `gain_per_unit * P`, which outgrows `u128` after a
//! day of issuance into a small pool. They are held as `U256` and encoded as
//! four little-endian `u64` limbs.

use borsh::{
    io::{Error as IoError, Read, Write},
    BorshDeserialize, BorshSerialize,
};
use primitive_types::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use moneyp_common::errors::{MoneypError, MoneypResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct RewardSum(pub U256);

impl RewardSum {
    pub const ZERO: Self = Self(U256([0; 4]));

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn checked_add(self, other: U256) -> MoneypResult<Self> {
        self.0.checked_add(other).map(Self).ok_or(MoneypError::Overflow)
    }

    pub fn saturating_sub(self, other: Self) -> U256 {
        self.0.saturating_sub(other.0)
    }
}

impl From<u128> for RewardSum {
    fn from(value: u128) -> Self {
        Self(U256::from(value))
    }
}

impl Serialize for RewardSum {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Serialize::serialize(&self.0 .0, serializer)
    }
}

impl<'de> Deserialize<'de> for RewardSum {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        <[u64; 4] as Deserialize<'de>>::deserialize(deserializer).map(|limbs| Self(U256(limbs)))
    }
}

impl BorshSerialize for RewardSum {
    fn serialize<W: Write>(&self, writer: &mut W) -> Result<(), IoError> {
        BorshSerialize::serialize(&self.0 .0, writer)
    }
}

impl BorshDeserialize for RewardSum {
    fn deserialize_reader<R: Read>(reader: &mut R) -> Result<Self, IoError> {
        <[u64; 4]>::deserialize_reader(reader).map(|limbs| Self(U256(limbs)))
    }
}
