use thiserror::Error;
use uuid::Uuid;

use crate::config::AccountRole;
use crate::decimal::Money;
use crate::types::{LoanStatus, TransactionKind};

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("{role} account not configured for product {product_id}")]
    NotConfigured {
        role: AccountRole,
        product_id: Uuid,
    },

    #[error("unbalanced journal entry: debits {debits}, credits {credits}")]
    UnbalancedEntry {
        debits: Money,
        credits: Money,
    },

    #[error("journal line must have exactly one non-zero side: debit {debit}, credit {credit}")]
    MalformedLine {
        debit: Money,
        credit: Money,
    },

    #[error("operation {operation} not permitted for loan in status {status:?}")]
    InvalidLoanState {
        status: LoanStatus,
        operation: &'static str,
    },

    #[error("payment {payment_id} already reversed")]
    AlreadyReversed {
        payment_id: Uuid,
    },

    #[error("no schedule rows exist for loan {loan_id}")]
    InsufficientScheduleData {
        loan_id: Uuid,
    },

    #[error("invalid transaction amount: {amount}")]
    InvalidAmount {
        amount: Money,
    },

    #[error("loan not found: {loan_id}")]
    LoanNotFound {
        loan_id: Uuid,
    },

    #[error("loan {loan_id} does not belong to tenant {tenant_id}")]
    TenantMismatch {
        loan_id: Uuid,
        tenant_id: Uuid,
    },

    #[error("payment not found: {payment_id}")]
    PaymentNotFound {
        payment_id: Uuid,
    },

    #[error("ledger account not found: {account_id}")]
    AccountNotFound {
        account_id: Uuid,
    },

    #[error("journal entry not found: {entry_id}")]
    EntryNotFound {
        entry_id: Uuid,
    },

    #[error("reversal not supported for {kind:?} transactions")]
    ReversalNotSupported {
        kind: TransactionKind,
    },
}

pub type Result<T> = std::result::Result<T, LedgerError>;
