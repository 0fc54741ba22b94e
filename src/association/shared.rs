//! Access to one ledger from multiple threads.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use bitcoin::Amount;

use super::{Association, Error, Event, MemberId, Quote};

/// Cheaply clonable handle serializing all calls to the ledger through one lock.
///
/// Commands never panic halfway through a change, so a poisoned lock still guards a consistent
/// ledger and is simply taken over.
#[derive(Clone, Debug)]
pub struct SharedAssociation(Arc<Mutex<Association>>);

impl SharedAssociation {
    pub fn new(association: Association) -> Self {
        SharedAssociation(Arc::new(Mutex::new(association)))
    }

    fn lock(&self) -> MutexGuard<'_, Association> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_member(&self, caller: MemberId, member: MemberId) -> Result<(), Error> {
        self.lock().add_member(caller, member)
    }

    pub fn save(&self, caller: MemberId, amount: Amount) -> Result<(), Error> {
        self.lock().save(caller, amount)
    }

    pub fn request_loan(&self, caller: MemberId, amount: Amount, now: u64) -> Result<(), Error> {
        self.lock().request_loan(caller, amount, now)
    }

    pub fn repay_loan(&self, caller: MemberId, paid: Amount, now: u64) -> Result<(), Error> {
        self.lock().repay_loan(caller, paid, now)
    }

    pub fn distribute_funds(&self, caller: MemberId, now: u64) -> Result<(), Error> {
        self.lock().distribute_funds(caller, now)
    }

    pub fn all_savings_and_loans(&self) -> (Amount, Amount, Amount) {
        self.lock().all_savings_and_loans()
    }

    pub fn my_savings_and_loan(&self, caller: &MemberId) -> (Amount, Amount, u64) {
        self.lock().my_savings_and_loan(caller)
    }

    pub fn repayment_quote(&self, member: &MemberId, now: u64) -> Result<Quote, Error> {
        self.lock().repayment_quote(member, now)
    }

    pub fn take_events(&self) -> Vec<Event> {
        self.lock().take_events()
    }

    /// Runs `f` with the ledger locked, for queries not covered by the methods above.
    pub fn with<R, F: FnOnce(&Association) -> R>(&self, f: F) -> R {
        f(&self.lock())
    }

    /// Returns the ledger if this is the last handle.
    pub fn try_unwrap(self) -> Result<Association, Self> {
        Arc::try_unwrap(self.0)
            .map(|mutex| mutex.into_inner().unwrap_or_else(PoisonError::into_inner))
            .map_err(SharedAssociation)
    }
}
