//! # Association
//!
//! This module contains the ledger of the savings and loan association.
//!
//! The ledger is a sequential state machine. Every command is checked completely before anything
//! is changed, so a rejected command leaves the ledger exactly as it was. Time never advances on
//! its own, commands that depend on it take the current Unix time as an argument.

pub mod constants;
pub mod deserialize;
pub mod error;
pub mod event;
pub mod member;
pub mod policy;
pub mod shared;

use core::fmt;
use std::collections::BTreeMap;
use bitcoin::Amount;
use slog::{debug, info, o, Logger};

pub use error::{Error, Role};
pub use event::Event;
pub use member::{Member, MemberId, LoanStatus};
pub use policy::{Policy, PolicyError, InterestBand, Rate};
pub use shared::SharedAssociation;

use deserialize::{KeyDeserError, StateVersion, StateVersionDeserError, UnexpectedEnd};

/// The amount a member has to pay to settle their loan at a given time.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Quote {
    pub principal: Amount,
    /// Seconds since the loan was issued.
    pub elapsed: u64,
    pub rate: Rate,
    pub interest: Amount,
    pub total: Amount,
}

/// The state of the association.
#[derive(Clone)]
pub struct Association {
    owner: MemberId,
    members: BTreeMap<MemberId, Member>,
    member_list: Vec<MemberId>,
    total_savings: Amount,
    total_loaned: Amount,
    interest_pool: Amount,
    contract_start_time: u64,
    last_distribution_time: u64,
    policy: Policy,
    events: Vec<Event>,
    logger: Logger,
}

impl Association {
    /// Creates an association with the default policy.
    ///
    /// The owner is not a member until they add themselves.
    pub fn new(owner: MemberId, now: u64, logger: Logger) -> Self {
        match Self::with_policy(owner, now, Policy::default(), logger) {
            Ok(association) => association,
            Err(_) => unreachable!("the default policy is valid"),
        }
    }

    pub fn with_policy(owner: MemberId, now: u64, policy: Policy, logger: Logger) -> Result<Self, PolicyError> {
        policy.validate()?;
        let logger = logger.new(o!("owner" => owner.to_string()));
        info!(logger, "association created"; "start_time" => now);
        Ok(Association {
            owner,
            members: BTreeMap::new(),
            member_list: Vec::new(),
            total_savings: Amount::ZERO,
            total_loaned: Amount::ZERO,
            interest_pool: Amount::ZERO,
            contract_start_time: now,
            last_distribution_time: now,
            policy,
            events: Vec::new(),
            logger,
        })
    }

    /// Registers a new member. Only the owner may do this.
    pub fn add_member(&mut self, caller: MemberId, member: MemberId) -> Result<(), Error> {
        if caller != self.owner {
            return self.reject("add_member", caller, Error::Unauthorized(Role::Owner));
        }
        if self.members.contains_key(&member) {
            return self.reject("add_member", caller, Error::DuplicateMember(member));
        }

        self.members.insert(member, Member::new());
        self.member_list.push(member);
        info!(self.logger, "member added"; "member" => %member);
        self.emit(Event::MemberAdded(member));
        Ok(())
    }

    /// Deposits `amount` into the caller's savings.
    pub fn save(&mut self, caller: MemberId, amount: Amount) -> Result<(), Error> {
        if amount == Amount::ZERO {
            return self.reject("save", caller, Error::InvalidAmount);
        }
        let member = match self.members.get(&caller) {
            Some(member) => *member,
            None => return self.reject("save", caller, Error::Unauthorized(Role::Member)),
        };
        let (member_savings, total_savings) = match (member.total_savings.checked_add(amount), self.total_savings.checked_add(amount)) {
            (Some(member_savings), Some(total_savings)) => (member_savings, total_savings),
            _ => return self.reject("save", caller, Error::Overflow),
        };

        self.record_mut(caller).total_savings = member_savings;
        self.total_savings = total_savings;
        info!(self.logger, "savings added"; "member" => %caller, "amount" => %amount, "savings" => %member_savings);
        self.emit(Event::SaveAdded { member: caller, amount });
        Ok(())
    }

    /// Lends `amount` to the caller.
    ///
    /// The loan is limited by the caller's savings and by the funds not currently lent out.
    pub fn request_loan(&mut self, caller: MemberId, amount: Amount, now: u64) -> Result<(), Error> {
        // non-members have no savings either
        let member = self.member(&caller);
        if member.total_savings == Amount::ZERO {
            return self.reject("request_loan", caller, Error::NoSavings);
        }
        if amount == Amount::ZERO {
            return self.reject("request_loan", caller, Error::InvalidAmount);
        }
        if member.loan_amount > Amount::ZERO {
            return self.reject("request_loan", caller, Error::LoanOutstanding { outstanding: member.loan_amount });
        }
        let limit = self.policy.loan_limit(member.total_savings);
        if amount > limit {
            return self.reject("request_loan", caller, Error::LoanLimitExceeded { requested: amount, limit });
        }
        let available = self.available_funds();
        if amount > available {
            return self.reject("request_loan", caller, Error::InsufficientLiquidity { requested: amount, available });
        }
        let total_loaned = match self.total_loaned.checked_add(amount) {
            Some(total_loaned) => total_loaned,
            None => return self.reject("request_loan", caller, Error::Overflow),
        };

        let record = self.record_mut(caller);
        record.loan_amount = amount;
        record.last_loan_timestamp = now;
        self.total_loaned = total_loaned;
        info!(self.logger, "loan given"; "member" => %caller, "amount" => %amount, "time" => now);
        self.emit(Event::GivenLoan { member: caller, amount });
        Ok(())
    }

    /// Settles the caller's loan with `paid`.
    ///
    /// Everything paid above the principal goes to the interest pool. A member repaying a
    /// delinquent loan is removed from the association and their savings are forfeited to the
    /// interest pool.
    pub fn repay_loan(&mut self, caller: MemberId, paid: Amount, now: u64) -> Result<(), Error> {
        let member = self.member(&caller);
        let quote = match self.quote(&member, now) {
            Ok(quote) => quote,
            Err(error) => return self.reject("repay_loan", caller, error),
        };
        if paid < quote.total {
            return self.reject("repay_loan", caller, Error::InsufficientRepayment { paid, required: quote.total });
        }

        let interest_paid = paid - quote.principal;
        let total_loaned = self.total_loaned.checked_sub(quote.principal);
        let (total_savings, forfeited) = if quote.rate.delinquent {
            (self.total_savings.checked_sub(member.total_savings), member.total_savings)
        } else {
            (Some(self.total_savings), Amount::ZERO)
        };
        let interest_pool = self.interest_pool
            .checked_add(interest_paid)
            .and_then(|pool| pool.checked_add(forfeited));
        let (total_loaned, total_savings, interest_pool) = match (total_loaned, total_savings, interest_pool) {
            (Some(loaned), Some(savings), Some(pool)) => (loaned, savings, pool),
            _ => return self.reject("repay_loan", caller, Error::Overflow),
        };

        let record = self.record_mut(caller);
        record.loan_amount = Amount::ZERO;
        record.last_loan_timestamp = 0;
        self.total_loaned = total_loaned;
        self.total_savings = total_savings;
        self.interest_pool = interest_pool;
        info!(self.logger, "loan repaid"; "member" => %caller, "paid" => %paid, "interest" => %interest_paid, "rate" => quote.rate.percent);
        self.emit(Event::LoanRepaid { member: caller, amount_paid: paid });

        if quote.rate.delinquent {
            self.members.remove(&caller);
            self.member_list.retain(|member| *member != caller);
            info!(self.logger, "delinquent member removed"; "member" => %caller, "forfeited" => %forfeited, "elapsed" => quote.elapsed);
            self.emit(Event::MemberRemoved(caller));
        }
        Ok(())
    }

    /// Pays the interest pool out to the members in proportion to their savings.
    ///
    /// Can be called by any member once per distribution period. Savings themselves are not paid
    /// out. Payouts are rounded down, the remainder stays in the pool for the next cycle.
    pub fn distribute_funds(&mut self, caller: MemberId, now: u64) -> Result<(), Error> {
        if !self.members.contains_key(&caller) {
            return self.reject("distribute_funds", caller, Error::Unauthorized(Role::Member));
        }
        let next_distribution = self.last_distribution_time.saturating_add(self.policy.distribution_period);
        if now < next_distribution {
            return self.reject("distribute_funds", caller, Error::DistributionTooEarly { next_distribution });
        }

        let budget = self.distributable();
        let mut payouts = Vec::new();
        if budget > Amount::ZERO && self.total_savings > Amount::ZERO {
            for id in &self.member_list {
                let savings = self.members[id].total_savings;
                let share = u128::from(budget.to_sat()) * u128::from(savings.to_sat()) / u128::from(self.total_savings.to_sat());
                // share <= budget because savings <= total savings
                let share = Amount::from_sat(share as u64);
                if share > Amount::ZERO {
                    payouts.push((*id, share));
                }
            }
        }
        let paid_out = payouts.iter().fold(Amount::ZERO, |sum, (_, share)| sum + *share);

        self.interest_pool = self.interest_pool - paid_out;
        self.last_distribution_time = now;
        info!(self.logger, "funds distributed"; "caller" => %caller, "paid_out" => %paid_out, "recipients" => payouts.len(), "remaining_pool" => %self.interest_pool);
        for (member, amount) in payouts {
            self.emit(Event::PayoutMade { member, amount });
        }
        Ok(())
    }

    /// Returns `(total_savings, total_loaned, available_funds)`.
    pub fn all_savings_and_loans(&self) -> (Amount, Amount, Amount) {
        (self.total_savings, self.total_loaned, self.available_funds())
    }

    /// Returns `(savings, loan_amount, last_loan_timestamp)` of the caller.
    pub fn my_savings_and_loan(&self, caller: &MemberId) -> (Amount, Amount, u64) {
        let member = self.member(caller);
        (member.total_savings, member.loan_amount, member.last_loan_timestamp)
    }

    /// The record of `id`, or the default record if `id` is not a member.
    pub fn member(&self, id: &MemberId) -> Member {
        self.members.get(id).copied().unwrap_or_default()
    }

    pub fn is_member(&self, id: &MemberId) -> bool {
        self.members.contains_key(id)
    }

    /// Members in the order they were added.
    pub fn member_list(&self) -> &[MemberId] {
        &self.member_list
    }

    pub fn member_at(&self, index: usize) -> Option<MemberId> {
        self.member_list.get(index).copied()
    }

    pub fn owner(&self) -> MemberId {
        self.owner
    }

    pub fn contract_start_time(&self) -> u64 {
        self.contract_start_time
    }

    /// The time the current distribution cycle started.
    pub fn last_distribution_time(&self) -> u64 {
        self.last_distribution_time
    }

    pub fn total_savings(&self) -> Amount {
        self.total_savings
    }

    pub fn total_loaned(&self) -> Amount {
        self.total_loaned
    }

    /// Savings not currently lent out.
    ///
    /// This is zero while savings forfeited by a removed member are still lent out to others.
    pub fn available_funds(&self) -> Amount {
        self.total_savings.checked_sub(self.total_loaned).unwrap_or(Amount::ZERO)
    }

    /// Collected interest and forfeited savings waiting for distribution.
    pub fn interest_pool(&self) -> Amount {
        self.interest_pool
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// All events emitted so far, oldest first.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Removes and returns the events emitted so far.
    pub fn take_events(&mut self) -> Vec<Event> {
        core::mem::take(&mut self.events)
    }

    /// What `member` would have to pay to settle their loan at `now`.
    pub fn repayment_quote(&self, member: &MemberId, now: u64) -> Result<Quote, Error> {
        self.quote(&self.member(member), now)
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    fn quote(&self, member: &Member, now: u64) -> Result<Quote, Error> {
        let (principal, since) = match member.loan_status() {
            LoanStatus::NoLoan => return Err(Error::NoActiveLoan),
            LoanStatus::Outstanding { principal, since } => (principal, since),
        };
        let elapsed = now.saturating_sub(since);
        let rate = self.policy.rate(elapsed);
        let interest = Policy::interest(principal, rate).ok_or(Error::Overflow)?;
        let total = principal.checked_add(interest).ok_or(Error::Overflow)?;
        Ok(Quote { principal, elapsed, rate, interest, total })
    }

    /// The part of the interest pool that is actually held by the association.
    ///
    /// If forfeited savings are lent out the pool is only partially backed.
    fn distributable(&self) -> Amount {
        let held = self.total_savings
            .checked_add(self.interest_pool)
            .and_then(|funds| funds.checked_sub(self.total_loaned))
            .unwrap_or(Amount::ZERO);
        held.min(self.interest_pool)
    }

    fn record_mut(&mut self, id: MemberId) -> &mut Member {
        self.members.get_mut(&id).expect("membership was checked by the caller")
    }

    fn emit(&mut self, event: Event) {
        debug!(self.logger, "event"; "event" => %event);
        self.events.push(event);
    }

    fn reject<T>(&self, command: &'static str, caller: MemberId, error: Error) -> Result<T, Error> {
        debug!(self.logger, "command rejected"; "command" => command, "caller" => %caller, "reason" => %error);
        Err(error)
    }

    /// Serializes the whole ledger including the event log.
    pub fn serialize(&self, out: &mut Vec<u8>) {
        StateVersion::CURRENT.serialize(out);
        out.push(constants::StateId::Association as u8);
        self.owner.serialize_raw(out);
        out.extend_from_slice(&self.contract_start_time.to_be_bytes());
        out.extend_from_slice(&self.last_distribution_time.to_be_bytes());
        deserialize::serialize_amount(self.total_savings, out);
        deserialize::serialize_amount(self.total_loaned, out);
        deserialize::serialize_amount(self.interest_pool, out);
        self.policy.serialize(out);

        out.extend_from_slice(&(self.member_list.len() as u32).to_be_bytes());
        for id in &self.member_list {
            let member = &self.members[id];
            id.serialize_raw(out);
            deserialize::serialize_amount(member.total_savings, out);
            deserialize::serialize_amount(member.loan_amount, out);
            out.extend_from_slice(&member.last_loan_timestamp.to_be_bytes());
        }

        out.extend_from_slice(&(self.events.len() as u32).to_be_bytes());
        for event in &self.events {
            event.serialize(out);
        }
    }

    /// Restores a ledger serialized by [`Self::serialize`].
    ///
    /// The records are checked against the stored totals so a damaged snapshot is rejected rather
    /// than producing a ledger that violates its invariants.
    pub fn deserialize(bytes: &mut &[u8], logger: Logger) -> Result<Self, SnapshotDeserError> {
        match StateVersion::deserialize(bytes)? {
            StateVersion::V1 => (),
        }
        let state_id = deserialize::be::<u8>(bytes)?;
        if state_id != constants::StateId::Association as u8 {
            return Err(SnapshotDeserError::InvalidState(state_id));
        }
        let owner = MemberId::deserialize_raw(bytes)?;
        let contract_start_time = deserialize::be::<u64>(bytes)?;
        let last_distribution_time = deserialize::be::<u64>(bytes)?;
        let total_savings = deserialize::amount(bytes)?;
        let total_loaned = deserialize::amount(bytes)?;
        let interest_pool = deserialize::amount(bytes)?;
        let policy = Policy::deserialize(bytes).map_err(|error| match error {
            policy::PolicyDeserError::UnexpectedEnd => SnapshotDeserError::UnexpectedEnd,
            policy::PolicyDeserError::Invalid(error) => SnapshotDeserError::InvalidPolicy(error),
        })?;

        let member_count = deserialize::be::<u32>(bytes)?;
        let mut members = BTreeMap::new();
        // each record takes 56 bytes, don't let a damaged count allocate a lot
        let mut member_list = Vec::with_capacity((member_count as usize).min(bytes.len() / 56));
        let mut savings_sum = Some(Amount::ZERO);
        let mut loaned_sum = Some(Amount::ZERO);
        for _ in 0..member_count {
            let id = MemberId::deserialize_raw(bytes)?;
            let member = Member {
                is_member: true,
                total_savings: deserialize::amount(bytes)?,
                loan_amount: deserialize::amount(bytes)?,
                last_loan_timestamp: deserialize::be::<u64>(bytes)?,
            };
            if member.loan_amount > Amount::ZERO && member.last_loan_timestamp == 0 {
                return Err(SnapshotDeserError::InvalidRecord(id));
            }
            if members.insert(id, member).is_some() {
                return Err(SnapshotDeserError::DuplicateMember(id));
            }
            member_list.push(id);
            savings_sum = savings_sum.and_then(|sum| sum.checked_add(member.total_savings));
            loaned_sum = loaned_sum.and_then(|sum| sum.checked_add(member.loan_amount));
        }
        if savings_sum != Some(total_savings) || loaned_sum != Some(total_loaned) {
            return Err(SnapshotDeserError::TotalsMismatch);
        }

        let event_count = deserialize::be::<u32>(bytes)?;
        // the shortest event takes 33 bytes
        let mut events = Vec::with_capacity((event_count as usize).min(bytes.len() / 33));
        for _ in 0..event_count {
            events.push(Event::deserialize(bytes)?);
        }

        let logger = logger.new(o!("owner" => owner.to_string()));
        debug!(logger, "association restored"; "members" => member_list.len(), "events" => events.len());
        Ok(Association {
            owner,
            members,
            member_list,
            total_savings,
            total_loaned,
            interest_pool,
            contract_start_time,
            last_distribution_time,
            policy,
            events,
            logger,
        })
    }
}

impl PartialEq for Association {
    fn eq(&self, other: &Self) -> bool {
        self.owner == other.owner
            && self.members == other.members
            && self.member_list == other.member_list
            && self.total_savings == other.total_savings
            && self.total_loaned == other.total_loaned
            && self.interest_pool == other.interest_pool
            && self.contract_start_time == other.contract_start_time
            && self.last_distribution_time == other.last_distribution_time
            && self.policy == other.policy
            && self.events == other.events
    }
}

impl Eq for Association {}

impl fmt::Debug for Association {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Association")
            .field("owner", &self.owner)
            .field("members", &self.members)
            .field("member_list", &self.member_list)
            .field("total_savings", &self.total_savings)
            .field("total_loaned", &self.total_loaned)
            .field("interest_pool", &self.interest_pool)
            .field("contract_start_time", &self.contract_start_time)
            .field("last_distribution_time", &self.last_distribution_time)
            .field("policy", &self.policy)
            .field("events", &self.events)
            .finish()
    }
}

#[derive(Debug)]
#[non_exhaustive]
pub enum SnapshotDeserError {
    UnexpectedEnd,
    MissingMarker(u8),
    UnsupportedVersion(u32),
    InvalidState(u8),
    InvalidKey(secp256k1::Error),
    InvalidPolicy(PolicyError),
    InvalidEvent(u8),
    /// A member has a loan without an issuance time.
    InvalidRecord(MemberId),
    DuplicateMember(MemberId),
    /// The stored totals don't match the member records.
    TotalsMismatch,
}

impl From<UnexpectedEnd> for SnapshotDeserError {
    fn from(_: UnexpectedEnd) -> Self {
        SnapshotDeserError::UnexpectedEnd
    }
}

impl From<StateVersionDeserError> for SnapshotDeserError {
    fn from(value: StateVersionDeserError) -> Self {
        match value {
            StateVersionDeserError::UnexpectedEnd => SnapshotDeserError::UnexpectedEnd,
            StateVersionDeserError::MissingMarker(byte) => SnapshotDeserError::MissingMarker(byte),
            StateVersionDeserError::UnsupportedVersion(version) => SnapshotDeserError::UnsupportedVersion(version),
        }
    }
}

impl From<KeyDeserError> for SnapshotDeserError {
    fn from(value: KeyDeserError) -> Self {
        match value {
            KeyDeserError::UnexpectedEnd => SnapshotDeserError::UnexpectedEnd,
            KeyDeserError::Invalid(error) => SnapshotDeserError::InvalidKey(error),
        }
    }
}

impl From<event::EventDeserError> for SnapshotDeserError {
    fn from(value: event::EventDeserError) -> Self {
        match value {
            event::EventDeserError::UnexpectedEnd => SnapshotDeserError::UnexpectedEnd,
            event::EventDeserError::InvalidKind(kind) => SnapshotDeserError::InvalidEvent(kind),
            event::EventDeserError::InvalidMember(error) => SnapshotDeserError::InvalidKey(error),
        }
    }
}

impl fmt::Display for SnapshotDeserError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SnapshotDeserError::UnexpectedEnd => write!(f, "the snapshot is truncated"),
            SnapshotDeserError::MissingMarker(byte) => write!(f, "not a snapshot (starts with byte {})", byte),
            SnapshotDeserError::UnsupportedVersion(version) => write!(f, "unsupported snapshot version {}", version),
            SnapshotDeserError::InvalidState(id) => write!(f, "unknown state identifier {}", id),
            SnapshotDeserError::InvalidKey(error) => write!(f, "invalid member key: {}", error),
            SnapshotDeserError::InvalidPolicy(error) => write!(f, "invalid policy: {}", error),
            SnapshotDeserError::InvalidEvent(kind) => write!(f, "unknown event kind {}", kind),
            SnapshotDeserError::InvalidRecord(id) => write!(f, "member {} has a loan without issuance time", id),
            SnapshotDeserError::DuplicateMember(id) => write!(f, "member {} is stored twice", id),
            SnapshotDeserError::TotalsMismatch => write!(f, "the totals don't match the member records"),
        }
    }
}

impl std::error::Error for SnapshotDeserError {}

#[cfg(test)]
mod tests;
