use chrono::{Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;

/// unique identifier for a tenant
pub type TenantId = Uuid;
/// unique identifier for a loan account
pub type LoanId = Uuid;
/// unique identifier for a ledger account
pub type AccountId = Uuid;
/// unique identifier for a client
pub type ClientId = Uuid;
/// unique identifier for a payment record
pub type PaymentId = Uuid;
/// unique identifier for a journal entry
pub type EntryId = Uuid;
/// unique identifier for a loan product
pub type ProductId = Uuid;

/// ledger account classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountType {
    Asset,
    Liability,
    Equity,
    Income,
    Expense,
}

impl AccountType {
    /// whether a debit increases the running balance for this type
    pub fn debit_increases(&self) -> bool {
        matches!(self, AccountType::Asset | AccountType::Expense)
    }
}

/// loan account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoanStatus {
    /// approved but funds not yet released
    PendingDisbursement,
    /// disbursed and performing
    Active,
    /// past due but still repayable
    Overdue,
    /// fully repaid
    Closed,
    /// written off as loss, terminal
    WrittenOff,
}

/// journal entry lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryStatus {
    Draft,
    Posted,
    Reversed,
}

/// business event a journal entry documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferenceType {
    Disbursement,
    Payment,
    Charge,
    Reversal,
    WriteOff,
    OverpaymentTransfer,
}

/// kind of business transaction to process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    Disbursement,
    Repayment,
    Charge(ChargeKind),
    WriteOff,
}

/// kind of charge applied to a loan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChargeKind {
    Fee,
    Penalty,
    InterestAccrual,
}

/// payment channel used for disbursement or repayment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentChannel {
    Cash,
    BankTransfer,
    MobileMoney,
    Cheque,
}

/// schedule installment frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepaymentFrequency {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
}

impl RepaymentFrequency {
    /// number of installment periods per year
    pub fn periods_per_year(&self) -> u32 {
        match self {
            RepaymentFrequency::Daily => 365,
            RepaymentFrequency::Weekly => 52,
            RepaymentFrequency::Monthly => 12,
            RepaymentFrequency::Quarterly => 4,
        }
    }

    /// due date of installment `n` (1-based) counted from the start date
    pub fn due_date(&self, start: NaiveDate, n: u32) -> NaiveDate {
        match self {
            RepaymentFrequency::Daily => start
                .checked_add_days(Days::new(n as u64))
                .unwrap_or(start),
            RepaymentFrequency::Weekly => start
                .checked_add_days(Days::new(7 * n as u64))
                .unwrap_or(start),
            RepaymentFrequency::Monthly => start
                .checked_add_months(Months::new(n))
                .unwrap_or(start),
            RepaymentFrequency::Quarterly => start
                .checked_add_months(Months::new(3 * n))
                .unwrap_or(start),
        }
    }
}

/// principal/interest split method for schedule generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterestMethod {
    /// equal principal portions, interest on the remaining balance
    DecliningBalance,
    /// interest on the full principal for the whole term, split evenly
    FlatRate,
    /// equal total installments (EMI), interest on the remaining balance
    DecliningBalanceEqualInstallment,
}

/// outstanding charge category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bucket {
    Penalty,
    Fee,
    Interest,
    Principal,
}

/// waterfall consumption order for repayment allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AllocationOrder {
    /// penalties, fees, interest, principal (default)
    #[default]
    PenaltiesFirst,
    /// fees, penalties, interest, principal
    FeesFirst,
    /// interest, penalties, fees, principal
    InterestFirst,
    /// principal, interest, penalties, fees
    PrincipalFirst,
}

impl AllocationOrder {
    /// buckets in consumption order
    pub fn buckets(&self) -> [Bucket; 4] {
        match self {
            AllocationOrder::PenaltiesFirst => {
                [Bucket::Penalty, Bucket::Fee, Bucket::Interest, Bucket::Principal]
            }
            AllocationOrder::FeesFirst => {
                [Bucket::Fee, Bucket::Penalty, Bucket::Interest, Bucket::Principal]
            }
            AllocationOrder::InterestFirst => {
                [Bucket::Interest, Bucket::Penalty, Bucket::Fee, Bucket::Principal]
            }
            AllocationOrder::PrincipalFirst => {
                [Bucket::Principal, Bucket::Interest, Bucket::Penalty, Bucket::Fee]
            }
        }
    }
}

/// outstanding balances bucketed by charge category
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct OutstandingBalances {
    pub penalty: Money,
    pub fee: Money,
    pub interest: Money,
    pub principal: Money,
}

impl OutstandingBalances {
    pub fn total(&self) -> Money {
        self.penalty + self.fee + self.interest + self.principal
    }

    pub fn get(&self, bucket: Bucket) -> Money {
        match bucket {
            Bucket::Penalty => self.penalty,
            Bucket::Fee => self.fee,
            Bucket::Interest => self.interest,
            Bucket::Principal => self.principal,
        }
    }

    pub fn get_mut(&mut self, bucket: Bucket) -> &mut Money {
        match bucket {
            Bucket::Penalty => &mut self.penalty,
            Bucket::Fee => &mut self.fee,
            Bucket::Interest => &mut self.interest,
            Bucket::Principal => &mut self.principal,
        }
    }

    /// add a bucketed decomposition back (used when un-applying a payment)
    pub fn restore(&mut self, allocation: &PaymentAllocation) {
        self.penalty += allocation.penalty;
        self.fee += allocation.fee;
        self.interest += allocation.interest;
        self.principal += allocation.principal;
    }
}

/// result of running a payment through the allocation waterfall
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct PaymentAllocation {
    pub penalty: Money,
    pub fee: Money,
    pub interest: Money,
    pub principal: Money,
    /// portion exceeding all outstanding buckets, routed by the caller
    pub excess: Money,
}

impl PaymentAllocation {
    pub fn total_applied(&self) -> Money {
        self.penalty + self.fee + self.interest + self.principal
    }

    pub fn get_mut(&mut self, bucket: Bucket) -> &mut Money {
        match bucket {
            Bucket::Penalty => &mut self.penalty,
            Bucket::Fee => &mut self.fee,
            Bucket::Interest => &mut self.interest,
            Bucket::Principal => &mut self.principal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_debit_increases_by_account_type() {
        assert!(AccountType::Asset.debit_increases());
        assert!(AccountType::Expense.debit_increases());
        assert!(!AccountType::Liability.debit_increases());
        assert!(!AccountType::Income.debit_increases());
        assert!(!AccountType::Equity.debit_increases());
    }

    #[test]
    fn test_monthly_due_dates_land_on_same_day() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let freq = RepaymentFrequency::Monthly;
        // clamps to end of shorter months
        assert_eq!(freq.due_date(start, 1), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(freq.due_date(start, 2), NaiveDate::from_ymd_opt(2024, 3, 31).unwrap());
    }

    #[test]
    fn test_weekly_due_dates() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let freq = RepaymentFrequency::Weekly;
        assert_eq!(freq.due_date(start, 3), NaiveDate::from_ymd_opt(2024, 1, 22).unwrap());
    }

    #[test]
    fn test_default_order_is_penalties_first() {
        assert_eq!(
            AllocationOrder::default().buckets(),
            [Bucket::Penalty, Bucket::Fee, Bucket::Interest, Bucket::Principal]
        );
    }

    #[test]
    fn test_outstanding_total() {
        let out = OutstandingBalances {
            penalty: Money::from_major(10),
            fee: Money::from_major(20),
            interest: Money::from_major(30),
            principal: Money::from_major(1000),
        };
        assert_eq!(out.total(), Money::from_major(1060));
    }
}
