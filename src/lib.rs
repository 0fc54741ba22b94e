//! The Marygoround association ledger.
//!
//! This crate contains the accounting state machine of a rotating savings and loan association
//! with no communication, signing or interaction with any chain. Callers are identified by their
//! public keys and time is always supplied by the caller, so the same sequence of commands always
//! produces the same state and the same events.
//!
//! [`Association::new`] is the entry point to the API.

mod test_macros;
pub mod association;

pub use association::{Association, Error, Event, Member, MemberId, Policy};
