pub mod allocation;
pub mod overpayment;

use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::types::{OutstandingBalances, PaymentAllocation};

pub use allocation::AllocationStrategy;
pub use overpayment::{OverpaymentHandler, OverpaymentOutcome};

/// operator-supplied allocation override for a repayment. A split whose
/// total matches the payment amount bypasses the waterfall entirely.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ManualSplit {
    pub penalty: Money,
    pub fee: Money,
    pub interest: Money,
    pub principal: Money,
}

impl ManualSplit {
    pub fn total(&self) -> Money {
        self.penalty + self.fee + self.interest + self.principal
    }

    /// whether this split accounts for the full payment amount
    pub fn matches(&self, amount: Money) -> bool {
        self.total().approx_eq(amount)
    }

    /// whether every component is covered by its outstanding bucket; a
    /// split overshooting a bucket would drive it negative
    pub fn fits(&self, outstanding: &OutstandingBalances) -> bool {
        self.penalty <= outstanding.penalty
            && self.fee <= outstanding.fee
            && self.interest <= outstanding.interest
            && self.principal <= outstanding.principal
    }

    pub fn into_allocation(self) -> PaymentAllocation {
        PaymentAllocation {
            penalty: self.penalty,
            fee: self.fee,
            interest: self.interest,
            principal: self.principal,
            excess: Money::ZERO,
        }
    }
}
