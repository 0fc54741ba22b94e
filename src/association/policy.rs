//! Lending policy of the association.
//!
//! The policy is fixed when the association is created and stored in its snapshots. The defaults
//! reproduce the behavior of the deployed Marygoround contract.

use core::convert::TryFrom;
use core::fmt;
use bitcoin::Amount;

use super::deserialize::{self, UnexpectedEnd};

pub const DAY: u64 = 24 * 60 * 60;
pub const YEAR: u64 = 365 * DAY;

/// Interest charged on loans repaid before `below` seconds have elapsed since issuance.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct InterestBand {
    pub below: u64,
    pub rate_percent: u32,
}

impl InterestBand {
    pub const fn new(below: u64, rate_percent: u32) -> Self {
        InterestBand { below, rate_percent }
    }
}

crate::test_macros::impl_arbitrary!(InterestBand, below, rate_percent);

/// The interest rate applicable to a loan of a particular age.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Rate {
    pub percent: u32,
    /// The loan is older than the whole schedule.
    ///
    /// Members repaying delinquent loans are removed from the association.
    pub delinquent: bool,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Policy {
    /// Members may borrow at most this multiple of their savings.
    pub loan_to_savings_ratio: u64,
    /// Bands ordered by strictly increasing `below`.
    pub interest_schedule: Vec<InterestBand>,
    /// Rate charged once a loan outlived the last band.
    pub overdue_rate_percent: u32,
    /// Minimum number of seconds between two distributions.
    pub distribution_period: u64,
}

impl Policy {
    const MAX_BANDS: u32 = 256;

    /// Checks that the policy can be used by the ledger.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.loan_to_savings_ratio == 0 {
            return Err(PolicyError::ZeroRatio);
        }
        if self.interest_schedule.is_empty() {
            return Err(PolicyError::EmptySchedule);
        }
        if self.interest_schedule.len() > Self::MAX_BANDS as usize {
            return Err(PolicyError::TooManyBands(self.interest_schedule.len()));
        }
        let mut previous = 0;
        for (index, band) in self.interest_schedule.iter().enumerate() {
            if band.below <= previous {
                return Err(PolicyError::UnorderedBand { index });
            }
            previous = band.below;
        }
        Ok(())
    }

    /// Returns the rate applicable after `elapsed` seconds.
    pub fn rate(&self, elapsed: u64) -> Rate {
        self.interest_schedule
            .iter()
            .find(|band| elapsed < band.below)
            .map(|band| Rate { percent: band.rate_percent, delinquent: false })
            .unwrap_or(Rate { percent: self.overdue_rate_percent, delinquent: true })
    }

    /// Computes the interest on `principal`, rounded down.
    ///
    /// Returns `None` if the interest doesn't fit into `Amount`.
    pub fn interest(principal: Amount, rate: Rate) -> Option<Amount> {
        let interest = u128::from(principal.to_sat()) * u128::from(rate.percent) / 100;
        u64::try_from(interest).ok().map(Amount::from_sat)
    }

    /// The largest loan a member with `savings` may request.
    pub fn loan_limit(&self, savings: Amount) -> Amount {
        savings.checked_mul(self.loan_to_savings_ratio).unwrap_or(Amount::MAX)
    }

    pub(crate) fn serialize(&self, out: &mut Vec<u8>) {
        out.reserve(8 + 4 + 8 + 4 + self.interest_schedule.len() * 12);
        out.extend_from_slice(&self.loan_to_savings_ratio.to_be_bytes());
        out.extend_from_slice(&self.overdue_rate_percent.to_be_bytes());
        out.extend_from_slice(&self.distribution_period.to_be_bytes());
        out.extend_from_slice(&(self.interest_schedule.len() as u32).to_be_bytes());
        for band in &self.interest_schedule {
            out.extend_from_slice(&band.below.to_be_bytes());
            out.extend_from_slice(&band.rate_percent.to_be_bytes());
        }
    }

    pub(crate) fn deserialize(bytes: &mut &[u8]) -> Result<Self, PolicyDeserError> {
        let loan_to_savings_ratio = deserialize::be::<u64>(bytes)?;
        let overdue_rate_percent = deserialize::be::<u32>(bytes)?;
        let distribution_period = deserialize::be::<u64>(bytes)?;
        let band_count = deserialize::be::<u32>(bytes)?;
        if band_count > Self::MAX_BANDS {
            return Err(PolicyDeserError::Invalid(PolicyError::TooManyBands(band_count as usize)));
        }
        let mut interest_schedule = Vec::with_capacity(band_count as usize);
        for _ in 0..band_count {
            let below = deserialize::be::<u64>(bytes)?;
            let rate_percent = deserialize::be::<u32>(bytes)?;
            interest_schedule.push(InterestBand { below, rate_percent });
        }
        let policy = Policy {
            loan_to_savings_ratio,
            interest_schedule,
            overdue_rate_percent,
            distribution_period,
        };
        policy.validate()?;
        Ok(policy)
    }
}

impl Default for Policy {
    /// Ten percent per completed thirty day month, at least ten percent, ninety percent at most
    /// until the loan is one year old. From then on the whole principal is charged as interest and
    /// the loan counts as delinquent.
    fn default() -> Self {
        Policy {
            loan_to_savings_ratio: 2,
            interest_schedule: vec![
                InterestBand::new(60 * DAY, 10),
                InterestBand::new(90 * DAY, 20),
                InterestBand::new(120 * DAY, 30),
                InterestBand::new(150 * DAY, 40),
                InterestBand::new(180 * DAY, 50),
                InterestBand::new(210 * DAY, 60),
                InterestBand::new(240 * DAY, 70),
                InterestBand::new(270 * DAY, 80),
                InterestBand::new(YEAR, 90),
            ],
            overdue_rate_percent: 100,
            distribution_period: YEAR,
        }
    }
}

#[cfg(test)]
impl quickcheck::Arbitrary for Policy {
    fn arbitrary(gen: &mut quickcheck::Gen) -> Self {
        use quickcheck::Arbitrary;

        let bands = Vec::<InterestBand>::arbitrary(gen);
        let mut below = 0u64;
        let interest_schedule = bands
            .into_iter()
            .take(Self::MAX_BANDS as usize - 1)
            .map(|band| {
                below = below.saturating_add(band.below % (100 * DAY) + 1);
                InterestBand { below, rate_percent: band.rate_percent % 1000 }
            })
            .collect::<Vec<_>>();
        let interest_schedule = if interest_schedule.is_empty() {
            Policy::default().interest_schedule
        } else {
            interest_schedule
        };
        Policy {
            loan_to_savings_ratio: u64::arbitrary(gen) % 10 + 1,
            interest_schedule,
            overdue_rate_percent: u32::arbitrary(gen) % 1000,
            distribution_period: u64::arbitrary(gen),
        }
    }
}

/// The policy can't be used by the ledger.
#[derive(Debug, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub enum PolicyError {
    ZeroRatio,
    EmptySchedule,
    TooManyBands(usize),
    /// The band at `index` doesn't end after the previous one (or ends at zero).
    UnorderedBand { index: usize },
}

impl fmt::Display for PolicyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PolicyError::ZeroRatio => write!(f, "the loan to savings ratio must not be zero"),
            PolicyError::EmptySchedule => write!(f, "the interest schedule is empty"),
            PolicyError::TooManyBands(count) => write!(f, "the interest schedule has {} bands, at most {} are supported", count, Policy::MAX_BANDS),
            PolicyError::UnorderedBand { index } => write!(f, "interest band {} doesn't end after the previous band", index),
        }
    }
}

impl std::error::Error for PolicyError {}

#[derive(Debug)]
pub enum PolicyDeserError {
    UnexpectedEnd,
    Invalid(PolicyError),
}

impl From<UnexpectedEnd> for PolicyDeserError {
    fn from(_: UnexpectedEnd) -> Self {
        PolicyDeserError::UnexpectedEnd
    }
}

impl From<PolicyError> for PolicyDeserError {
    fn from(error: PolicyError) -> Self {
        PolicyDeserError::Invalid(error)
    }
}
