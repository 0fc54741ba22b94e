//! Member identities and records.

use core::fmt;
use core::str::FromStr;
use bitcoin::Amount;
use secp256k1::{Keypair, XOnlyPublicKey};

use super::deserialize::{self, KeyDeserError};

/// Identifies a member of the association.
///
/// Members are identified by their x-only public keys. Proving the possession of the matching
/// secret key is the job of the host, the ledger trusts the identity it is given.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub struct MemberId(XOnlyPublicKey);

impl MemberId {
    pub fn new(key: XOnlyPublicKey) -> Self {
        MemberId(key)
    }

    pub fn from_key_pair(key_pair: &Keypair) -> Self {
        MemberId(key_pair.x_only_public_key().0)
    }

    pub fn as_x_only(&self) -> &XOnlyPublicKey {
        &self.0
    }

    pub(crate) fn serialize_raw(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.0.serialize());
    }

    pub(crate) fn deserialize_raw(bytes: &mut &[u8]) -> Result<Self, KeyDeserError> {
        deserialize::x_only_key(bytes).map(MemberId)
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for MemberId {
    type Err = secp256k1::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(MemberId)
    }
}

#[cfg(test)]
impl quickcheck::Arbitrary for MemberId {
    fn arbitrary(gen: &mut quickcheck::Gen) -> Self {
        MemberId(crate::test_macros::arbitrary(gen))
    }
}

/// Generates a fresh random key pair for a new member.
pub fn generate_key_pair() -> Keypair {
    Keypair::new_global(&mut rand::thread_rng())
}

/// The ledger record of a single member.
///
/// Looking up someone who is not a member yields the default record, which has `is_member` unset
/// and all balances zero.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Member {
    pub is_member: bool,
    pub total_savings: Amount,
    /// Outstanding principal, zero if there's no loan.
    pub loan_amount: Amount,
    /// Unix time of the last loan issuance, zero if there's no loan.
    pub last_loan_timestamp: u64,
}

impl Member {
    pub(crate) fn new() -> Self {
        Member {
            is_member: true,
            ..Default::default()
        }
    }

    pub fn loan_status(&self) -> LoanStatus {
        if self.loan_amount == Amount::ZERO {
            LoanStatus::NoLoan
        } else {
            LoanStatus::Outstanding {
                principal: self.loan_amount,
                since: self.last_loan_timestamp,
            }
        }
    }
}

impl Default for Member {
    fn default() -> Self {
        Member {
            is_member: false,
            total_savings: Amount::ZERO,
            loan_amount: Amount::ZERO,
            last_loan_timestamp: 0,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LoanStatus {
    NoLoan,
    Outstanding { principal: Amount, since: u64 },
}
