//! Events published by the ledger.

use core::convert::TryFrom;
use core::fmt;
use bitcoin::Amount;

use super::constants::EventKind;
use super::deserialize::{self, KeyDeserError, UnexpectedEnd};
use super::member::MemberId;

/// An entry of the append-only event log.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Event {
    MemberAdded(MemberId),
    MemberRemoved(MemberId),
    SaveAdded { member: MemberId, amount: Amount },
    GivenLoan { member: MemberId, amount: Amount },
    LoanRepaid { member: MemberId, amount_paid: Amount },
    PayoutMade { member: MemberId, amount: Amount },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::MemberAdded(_) => EventKind::MemberAdded,
            Event::MemberRemoved(_) => EventKind::MemberRemoved,
            Event::SaveAdded { .. } => EventKind::SaveAdded,
            Event::GivenLoan { .. } => EventKind::GivenLoan,
            Event::LoanRepaid { .. } => EventKind::LoanRepaid,
            Event::PayoutMade { .. } => EventKind::PayoutMade,
        }
    }

    /// The member the event is about.
    pub fn member(&self) -> MemberId {
        match self {
            Event::MemberAdded(member) | Event::MemberRemoved(member) => *member,
            Event::SaveAdded { member, .. } |
            Event::GivenLoan { member, .. } |
            Event::LoanRepaid { member, .. } |
            Event::PayoutMade { member, .. } => *member,
        }
    }

    pub fn amount(&self) -> Option<Amount> {
        match self {
            Event::MemberAdded(_) | Event::MemberRemoved(_) => None,
            Event::SaveAdded { amount, .. } |
            Event::GivenLoan { amount, .. } |
            Event::LoanRepaid { amount_paid: amount, .. } |
            Event::PayoutMade { amount, .. } => Some(*amount),
        }
    }

    fn from_parts(kind: EventKind, member: MemberId, amount: Amount) -> Self {
        match kind {
            EventKind::MemberAdded => Event::MemberAdded(member),
            EventKind::MemberRemoved => Event::MemberRemoved(member),
            EventKind::SaveAdded => Event::SaveAdded { member, amount },
            EventKind::GivenLoan => Event::GivenLoan { member, amount },
            EventKind::LoanRepaid => Event::LoanRepaid { member, amount_paid: amount },
            EventKind::PayoutMade => Event::PayoutMade { member, amount },
        }
    }

    pub(crate) fn serialize(&self, out: &mut Vec<u8>) {
        out.push(self.kind() as u8);
        self.member().serialize_raw(out);
        if let Some(amount) = self.amount() {
            deserialize::serialize_amount(amount, out);
        }
    }

    pub(crate) fn deserialize(bytes: &mut &[u8]) -> Result<Self, EventDeserError> {
        let kind = deserialize::be::<u8>(bytes)?;
        let kind = EventKind::try_from(kind).map_err(|error| EventDeserError::InvalidKind(error.0))?;
        let member = MemberId::deserialize_raw(bytes)?;
        let amount = match kind {
            EventKind::MemberAdded | EventKind::MemberRemoved => Amount::ZERO,
            _ => deserialize::amount(bytes)?,
        };
        Ok(Event::from_parts(kind, member, amount))
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.amount() {
            Some(amount) => write!(f, "{}({}, {})", self.kind().name(), self.member(), amount),
            None => write!(f, "{}({})", self.kind().name(), self.member()),
        }
    }
}

#[cfg(test)]
impl quickcheck::Arbitrary for Event {
    fn arbitrary(gen: &mut quickcheck::Gen) -> Self {
        use quickcheck::Arbitrary;

        let kind = *gen.choose(&[
            EventKind::MemberAdded,
            EventKind::MemberRemoved,
            EventKind::SaveAdded,
            EventKind::GivenLoan,
            EventKind::LoanRepaid,
            EventKind::PayoutMade,
        ]).unwrap();
        let member = MemberId::arbitrary(gen);
        let amount = match kind {
            EventKind::MemberAdded | EventKind::MemberRemoved => Amount::ZERO,
            _ => crate::test_macros::arbitrary(gen),
        };
        Event::from_parts(kind, member, amount)
    }
}

#[derive(Debug)]
pub enum EventDeserError {
    UnexpectedEnd,
    InvalidKind(u8),
    InvalidMember(secp256k1::Error),
}

impl From<UnexpectedEnd> for EventDeserError {
    fn from(_: UnexpectedEnd) -> Self {
        EventDeserError::UnexpectedEnd
    }
}

impl From<KeyDeserError> for EventDeserError {
    fn from(error: KeyDeserError) -> Self {
        match error {
            KeyDeserError::UnexpectedEnd => EventDeserError::UnexpectedEnd,
            KeyDeserError::Invalid(error) => EventDeserError::InvalidMember(error),
        }
    }
}
