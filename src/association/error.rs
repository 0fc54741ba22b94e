use core::fmt;
use bitcoin::Amount;

use super::member::MemberId;

/// The role a command requires from its caller.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Role {
    Owner,
    Member,
}

/// Reasons for rejecting a command.
///
/// A rejected command never changes the ledger. The `Display` implementation produces the reason
/// string reported to the caller.
#[non_exhaustive]
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Error {
    /// The caller doesn't have the required role.
    Unauthorized(Role),
    DuplicateMember(MemberId),
    /// Deposits and loans must be non-zero.
    InvalidAmount,
    NoSavings,
    /// Only one loan per member may be outstanding.
    LoanOutstanding { outstanding: Amount },
    LoanLimitExceeded { requested: Amount, limit: Amount },
    InsufficientLiquidity { requested: Amount, available: Amount },
    NoActiveLoan,
    InsufficientRepayment { paid: Amount, required: Amount },
    DistributionTooEarly { next_distribution: u64 },
    /// The result would not fit into `Amount`.
    Overflow,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Unauthorized(Role::Owner) => write!(f, "Only owner can perform this action"),
            Error::Unauthorized(Role::Member) => write!(f, "Only member can perform this action"),
            Error::DuplicateMember(_) => write!(f, "Member already exist"),
            Error::InvalidAmount => write!(f, "Must deposit some value"),
            Error::NoSavings => write!(f, "No savings available"),
            Error::LoanOutstanding { .. } => write!(f, "Active loan must be repaid first"),
            Error::LoanLimitExceeded { .. } => write!(f, "Loan exceeds allowed limit"),
            Error::InsufficientLiquidity { .. } => write!(f, "No sufficient amount in the account currently"),
            Error::NoActiveLoan => write!(f, "No active loan"),
            Error::InsufficientRepayment { .. } => write!(f, "Insufficient repayment amount"),
            Error::DistributionTooEarly { .. } => write!(f, "Year not completed"),
            Error::Overflow => write!(f, "Amount out of range"),
        }
    }
}

impl std::error::Error for Error {}
