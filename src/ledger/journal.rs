use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::types::{AccountId, EntryId, EntryStatus, ReferenceType, TenantId};

/// single debit-or-credit posting within a journal entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntryLine {
    pub account_id: AccountId,
    pub debit: Money,
    pub credit: Money,
    pub description: String,
}

impl JournalEntryLine {
    pub fn debit(account_id: AccountId, amount: Money, description: impl Into<String>) -> Self {
        Self {
            account_id,
            debit: amount,
            credit: Money::ZERO,
            description: description.into(),
        }
    }

    pub fn credit(account_id: AccountId, amount: Money, description: impl Into<String>) -> Self {
        Self {
            account_id,
            debit: Money::ZERO,
            credit: amount,
            description: description.into(),
        }
    }

    /// exactly one side non-zero, both non-negative
    pub fn validate(&self) -> Result<()> {
        let one_sided = (self.debit.is_positive() && self.credit.is_zero())
            || (self.credit.is_positive() && self.debit.is_zero());
        if !one_sided || self.debit.is_negative() || self.credit.is_negative() {
            return Err(LedgerError::MalformedLine {
                debit: self.debit,
                credit: self.credit,
            });
        }
        Ok(())
    }

    /// mirrored line with debit and credit swapped, used for reversal entries
    pub fn mirrored(&self) -> Self {
        Self {
            account_id: self.account_id,
            debit: self.credit,
            credit: self.debit,
            description: format!("reversal of: {}", self.description),
        }
    }
}

/// balanced set of postings documenting one business event. Created
/// atomically with its lines and immutable once posted; corrections are new
/// reversing entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: EntryId,
    pub tenant_id: TenantId,
    /// human-readable sequential number, unique per tenant
    pub entry_number: String,
    pub date: NaiveDate,
    pub description: String,
    pub reference_type: ReferenceType,
    /// the business transaction this entry documents
    pub reference_id: Uuid,
    pub status: EntryStatus,
    pub total_amount: Money,
    pub lines: Vec<JournalEntryLine>,
    pub posted_at: DateTime<Utc>,
}

impl JournalEntry {
    pub fn debit_total(&self) -> Money {
        self.lines.iter().map(|l| l.debit).sum()
    }

    pub fn credit_total(&self) -> Money {
        self.lines.iter().map(|l| l.credit).sum()
    }

    /// mirrored lines for a compensating entry
    pub fn mirrored_lines(&self) -> Vec<JournalEntryLine> {
        self.lines.iter().map(JournalEntryLine::mirrored).collect()
    }
}
