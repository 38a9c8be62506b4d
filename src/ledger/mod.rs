pub mod accounts;
pub mod journal;
pub mod resolver;

use chrono::NaiveDate;
use hourglass_rs::SafeTimeProvider;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

pub use accounts::Account;
pub use journal::{JournalEntry, JournalEntryLine};
pub use resolver::AccountResolver;

use crate::errors::{LedgerError, Result};
use crate::events::{Event, EventStore};
use crate::store::MemoryStore;
use crate::types::{EntryStatus, ReferenceType, TenantId};

/// builds and persists balanced journal entries. Validation happens before
/// any write: a failed post leaves no partial state behind.
pub struct LedgerService {
    store: Arc<MemoryStore>,
}

impl LedgerService {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    /// validate and post a journal entry atomically with its lines.
    /// Debits must equal credits within the ledger tolerance; every line
    /// must reference an existing account. Assigns the tenant's next
    /// sequential entry number and applies running balances.
    pub fn post(
        &self,
        tenant_id: TenantId,
        date: NaiveDate,
        description: impl Into<String>,
        reference_type: ReferenceType,
        reference_id: Uuid,
        lines: Vec<JournalEntryLine>,
        time: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<JournalEntry> {
        let debits: crate::decimal::Money = lines.iter().map(|l| l.debit).sum();
        let credits: crate::decimal::Money = lines.iter().map(|l| l.credit).sum();

        if lines.is_empty() || !debits.approx_eq(credits) {
            return Err(LedgerError::UnbalancedEntry { debits, credits });
        }
        for line in &lines {
            line.validate()?;
            if !self.store.account_exists(line.account_id) {
                return Err(LedgerError::AccountNotFound {
                    account_id: line.account_id,
                });
            }
        }

        let entry = JournalEntry {
            id: Uuid::new_v4(),
            tenant_id,
            entry_number: self.store.next_entry_number(tenant_id),
            date,
            description: description.into(),
            reference_type,
            reference_id,
            status: EntryStatus::Posted,
            total_amount: debits,
            lines,
            posted_at: time.now(),
        };

        for line in &entry.lines {
            self.store.with_account_mut(line.account_id, |account| {
                if line.debit.is_positive() {
                    account.apply_debit(line.debit);
                } else {
                    account.apply_credit(line.credit);
                }
            })?;
        }

        debug!(
            entry_number = %entry.entry_number,
            total = %entry.total_amount,
            reference_type = ?entry.reference_type,
            "journal entry posted"
        );
        events.emit(Event::EntryPosted {
            entry_id: entry.id,
            entry_number: entry.entry_number.clone(),
            total_amount: entry.total_amount,
            timestamp: entry.posted_at,
        });

        self.store.insert_entry(entry.clone());
        Ok(entry)
    }
}
