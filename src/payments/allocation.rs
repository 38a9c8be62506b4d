use tracing::warn;

use crate::decimal::Money;
use crate::types::{AllocationOrder, OutstandingBalances, PaymentAllocation};

use super::ManualSplit;

/// waterfall allocation of a repayment across outstanding charge buckets.
/// The four outputs always sum to `min(amount, outstanding.total())`; any
/// remainder is reported as `excess` and routed by the caller.
pub struct AllocationStrategy;

impl AllocationStrategy {
    /// walk the bucket order, consuming `min(remaining, bucket)` per bucket
    /// until the payment or the buckets are exhausted
    pub fn allocate(
        amount: Money,
        outstanding: &OutstandingBalances,
        order: AllocationOrder,
    ) -> PaymentAllocation {
        let mut allocation = PaymentAllocation::default();
        let mut remaining = amount;

        for bucket in order.buckets() {
            if remaining.is_zero() {
                break;
            }
            let portion = remaining.min(outstanding.get(bucket).max(Money::ZERO));
            *allocation.get_mut(bucket) = portion;
            remaining -= portion;
        }

        allocation.excess = remaining;
        allocation
    }

    /// resolve the allocation for a repayment, honoring a manual split whose
    /// total matches the payment amount and whose components are covered by
    /// the outstanding buckets. A mismatched or overshooting split falls
    /// back to the waterfall; the fallback is logged so operators can spot
    /// it.
    pub fn resolve(
        amount: Money,
        outstanding: &OutstandingBalances,
        order: AllocationOrder,
        manual: Option<&ManualSplit>,
    ) -> PaymentAllocation {
        if let Some(split) = manual {
            if !split.matches(amount) {
                warn!(
                    split_total = %split.total(),
                    payment = %amount,
                    "manual split does not match payment amount, falling back to waterfall"
                );
            } else if !split.fits(outstanding) {
                warn!(
                    split_total = %split.total(),
                    outstanding = %outstanding.total(),
                    "manual split exceeds an outstanding bucket, falling back to waterfall"
                );
            } else {
                return split.into_allocation();
            }
        }
        Self::allocate(amount, outstanding, order)
    }
}
