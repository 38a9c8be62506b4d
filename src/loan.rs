use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ProductAccountingConfig;
use crate::decimal::{Money, Rate};
use crate::types::{
    AccountId, AllocationOrder, ClientId, EntryId, InterestMethod, LoanId, LoanStatus,
    OutstandingBalances, PaymentAllocation, PaymentChannel, PaymentId, ProductId,
    ReferenceType, RepaymentFrequency, TenantId,
};

/// terms a loan is created with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanTerms {
    pub principal: Money,
    /// normalized at the boundary via [`Rate::normalized`]
    pub interest_rate: Rate,
    pub term_periods: u32,
    pub frequency: RepaymentFrequency,
    pub interest_method: InterestMethod,
    pub allocation_order: AllocationOrder,
}

/// loan account aggregate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanAccount {
    pub id: LoanId,
    pub tenant_id: TenantId,
    pub client_id: ClientId,
    pub product_id: ProductId,
    /// product accounting config snapshotted at creation
    pub accounting: ProductAccountingConfig,
    pub terms: LoanTerms,
    pub status: LoanStatus,

    /// total owing across all buckets, mutated only by the processor
    pub outstanding_balance: Money,
    /// outstanding amounts bucketed for waterfall allocation
    pub buckets: OutstandingBalances,

    pub disbursed_on: Option<NaiveDate>,
    pub closed_on: Option<NaiveDate>,
    pub written_off_amount: Option<Money>,
    pub total_payments_received: Money,
    pub payment_count: u32,
}

impl LoanAccount {
    pub fn new(
        tenant_id: TenantId,
        client_id: ClientId,
        accounting: ProductAccountingConfig,
        terms: LoanTerms,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            client_id,
            product_id: accounting.product_id,
            accounting,
            terms,
            status: LoanStatus::PendingDisbursement,
            outstanding_balance: Money::ZERO,
            buckets: OutstandingBalances::default(),
            disbursed_on: None,
            closed_on: None,
            written_off_amount: None,
            total_payments_received: Money::ZERO,
            payment_count: 0,
        }
    }

    /// whether the loan can accept a repayment
    pub fn can_repay(&self) -> bool {
        matches!(self.status, LoanStatus::Active | LoanStatus::Overdue)
    }

    /// whether the loan can be disbursed
    pub fn can_disburse(&self) -> bool {
        self.status == LoanStatus::PendingDisbursement
    }

    /// whether a charge can be applied
    pub fn can_charge(&self) -> bool {
        matches!(self.status, LoanStatus::Active | LoanStatus::Overdue)
    }

    /// terminal states forbid reversal of their payments
    pub fn forbids_reversal(&self) -> bool {
        self.status == LoanStatus::WrittenOff
    }

    pub fn record_payment(&mut self, amount: Money) {
        self.total_payments_received += amount;
        self.payment_count += 1;
    }
}

/// derived settlement state of a schedule row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Unpaid,
    Partial,
    Paid,
}

/// one expected installment of a loan's amortization schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub loan_id: LoanId,
    /// unique per loan, ordered
    pub installment_number: u32,
    pub due_date: NaiveDate,
    pub principal_due: Money,
    pub interest_due: Money,
    pub fee_due: Money,
    pub total_due: Money,
    pub paid_amount: Money,
}

impl ScheduleEntry {
    /// unpaid remainder of this installment, never negative
    pub fn outstanding(&self) -> Money {
        (self.total_due - self.paid_amount).max(Money::ZERO)
    }

    /// settlement status derived from the outstanding amount
    pub fn payment_status(&self) -> PaymentStatus {
        if self.outstanding().is_zero() {
            PaymentStatus::Paid
        } else if self.paid_amount.is_zero() {
            PaymentStatus::Unpaid
        } else {
            PaymentStatus::Partial
        }
    }
}

/// record of an overpayment transfer to a holding account, kept so a
/// reversal can unwind it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverpaymentTransfer {
    pub holding_account_id: AccountId,
    pub amount: Money,
    pub entry_id: Option<EntryId>,
}

/// immutable record of one processed business transaction; reversed records
/// are flagged, never deleted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: PaymentId,
    pub loan_id: LoanId,
    pub tenant_id: TenantId,
    pub kind: ReferenceType,
    pub amount: Money,
    pub allocation: PaymentAllocation,
    pub date: NaiveDate,
    pub channel: Option<PaymentChannel>,
    pub reference: String,
    pub entry_id: Option<EntryId>,
    pub reversed: bool,
    pub reversal_entry_id: Option<EntryId>,
    pub overpayment: Option<OverpaymentTransfer>,
}

/// client savings account used to hold routed overpayments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldingAccount {
    pub id: AccountId,
    pub tenant_id: TenantId,
    pub client_id: ClientId,
    pub account_number: String,
    pub active: bool,
    pub opened_on: NaiveDate,
    pub balance: Money,
}
