use dashmap::DashMap;
use std::sync::{Arc, Mutex};

use crate::errors::{LedgerError, Result};
use crate::ledger::accounts::Account;
use crate::ledger::journal::JournalEntry;
use crate::loan::{HoldingAccount, LoanAccount, PaymentRecord, ScheduleEntry};
use crate::types::{
    AccountId, ClientId, EntryId, EntryStatus, LoanId, PaymentId, ReferenceType, TenantId,
};

/// shared persistent store. Tables are concurrent maps; operations on
/// different loans run in parallel, while callers serialize same-loan
/// read-modify-write sequences through [`MemoryStore::loan_lock`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    accounts: DashMap<AccountId, Account>,
    loans: DashMap<LoanId, LoanAccount>,
    schedules: DashMap<LoanId, Vec<ScheduleEntry>>,
    payments: DashMap<PaymentId, PaymentRecord>,
    entries: DashMap<EntryId, JournalEntry>,
    holding_accounts: DashMap<AccountId, HoldingAccount>,
    entry_sequences: DashMap<TenantId, u64>,
    loan_locks: DashMap<LoanId, Arc<Mutex<()>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // accounts

    pub fn insert_account(&self, account: Account) -> AccountId {
        let id = account.id;
        self.accounts.insert(id, account);
        id
    }

    pub fn account(&self, id: AccountId) -> Option<Account> {
        self.accounts.get(&id).map(|a| a.clone())
    }

    pub fn account_exists(&self, id: AccountId) -> bool {
        self.accounts.contains_key(&id)
    }

    /// mutate an account in place; fails if it does not exist
    pub fn with_account_mut<F>(&self, id: AccountId, f: F) -> Result<()>
    where
        F: FnOnce(&mut Account),
    {
        match self.accounts.get_mut(&id) {
            Some(mut account) => {
                f(&mut account);
                Ok(())
            }
            None => Err(LedgerError::AccountNotFound { account_id: id }),
        }
    }

    // loans

    pub fn insert_loan(&self, loan: LoanAccount) -> LoanId {
        let id = loan.id;
        self.loans.insert(id, loan);
        id
    }

    pub fn loan(&self, id: LoanId) -> Result<LoanAccount> {
        self.loans
            .get(&id)
            .map(|l| l.clone())
            .ok_or(LedgerError::LoanNotFound { loan_id: id })
    }

    pub fn put_loan(&self, loan: LoanAccount) {
        self.loans.insert(loan.id, loan);
    }

    /// exclusive lock serializing operations against one loan
    pub fn loan_lock(&self, id: LoanId) -> Arc<Mutex<()>> {
        self.loan_locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // schedules

    pub fn schedule(&self, loan_id: LoanId) -> Vec<ScheduleEntry> {
        self.schedules
            .get(&loan_id)
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub fn put_schedule(&self, loan_id: LoanId, rows: Vec<ScheduleEntry>) {
        self.schedules.insert(loan_id, rows);
    }

    pub fn delete_schedule(&self, loan_id: LoanId) {
        self.schedules.remove(&loan_id);
    }

    // payments

    pub fn insert_payment(&self, record: PaymentRecord) -> PaymentId {
        let id = record.id;
        self.payments.insert(id, record);
        id
    }

    pub fn payment(&self, id: PaymentId) -> Result<PaymentRecord> {
        self.payments
            .get(&id)
            .map(|p| p.clone())
            .ok_or(LedgerError::PaymentNotFound { payment_id: id })
    }

    pub fn put_payment(&self, record: PaymentRecord) {
        self.payments.insert(record.id, record);
    }

    /// all records for a loan, ordered by date then id for determinism
    pub fn payments_for_loan(&self, loan_id: LoanId) -> Vec<PaymentRecord> {
        let mut records: Vec<PaymentRecord> = self
            .payments
            .iter()
            .filter(|p| p.loan_id == loan_id)
            .map(|p| p.clone())
            .collect();
        records.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));
        records
    }

    /// total of non-reversed repayments, used by schedule regeneration
    pub fn repaid_total(&self, loan_id: LoanId) -> crate::decimal::Money {
        self.payments
            .iter()
            .filter(|p| p.loan_id == loan_id && p.kind == ReferenceType::Payment && !p.reversed)
            .map(|p| p.allocation.total_applied())
            .sum()
    }

    // journal entries

    pub fn insert_entry(&self, entry: JournalEntry) -> EntryId {
        let id = entry.id;
        self.entries.insert(id, entry);
        id
    }

    pub fn entry(&self, id: EntryId) -> Result<JournalEntry> {
        self.entries
            .get(&id)
            .map(|e| e.clone())
            .ok_or(LedgerError::EntryNotFound { entry_id: id })
    }

    pub fn mark_entry_reversed(&self, id: EntryId) -> Result<()> {
        match self.entries.get_mut(&id) {
            Some(mut entry) => {
                entry.status = EntryStatus::Reversed;
                Ok(())
            }
            None => Err(LedgerError::EntryNotFound { entry_id: id }),
        }
    }

    /// next per-tenant sequential entry number; unique and monotonic, not
    /// required to be gapless
    pub fn next_entry_number(&self, tenant_id: TenantId) -> String {
        let mut seq = self.entry_sequences.entry(tenant_id).or_insert(0);
        *seq += 1;
        format!("JE-{:06}", *seq)
    }

    // holding accounts

    pub fn insert_holding(&self, account: HoldingAccount) -> AccountId {
        let id = account.id;
        self.holding_accounts.insert(id, account);
        id
    }

    pub fn holding(&self, id: AccountId) -> Option<HoldingAccount> {
        self.holding_accounts.get(&id).map(|h| h.clone())
    }

    pub fn put_holding(&self, account: HoldingAccount) {
        self.holding_accounts.insert(account.id, account);
    }

    /// the client's oldest active holding account, if any
    pub fn oldest_active_holding(
        &self,
        tenant_id: TenantId,
        client_id: ClientId,
    ) -> Option<HoldingAccount> {
        self.holding_accounts
            .iter()
            .filter(|h| h.tenant_id == tenant_id && h.client_id == client_id && h.active)
            .map(|h| h.clone())
            .min_by(|a, b| a.opened_on.cmp(&b.opened_on).then(a.id.cmp(&b.id)))
    }
}
