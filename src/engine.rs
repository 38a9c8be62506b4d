use chrono::NaiveDate;
use hourglass_rs::SafeTimeProvider;
use std::sync::{Arc, PoisonError};

use crate::errors::{LedgerError, Result};
use crate::events::{Event, EventStore};
use crate::ledger::Account;
use crate::loan::{HoldingAccount, LoanAccount, LoanTerms, PaymentRecord, ScheduleEntry};
use crate::config::ProductAccountingConfig;
use crate::decimal::Rate;
use crate::ledger::JournalEntry;
use crate::processing::{
    ReversalEngine, ReversalResult, TransactionOutcome, TransactionProcessor, TransactionRequest,
};
use crate::schedule::ScheduleEngine;
use crate::store::MemoryStore;
use crate::sync::{CoreBankingSync, SyncDispatcher};
use crate::types::{AccountId, ClientId, EntryId, LoanId, LoanStatus, PaymentId, TenantId};

/// entry point tying the ledger, allocation, schedule, and reversal
/// machinery together over one shared store
pub struct LoanLedger {
    store: Arc<MemoryStore>,
    processor: TransactionProcessor,
    reversals: ReversalEngine,
    sync: Arc<SyncDispatcher>,
    time: SafeTimeProvider,
    events: EventStore,
}

impl LoanLedger {
    pub fn new(time: SafeTimeProvider) -> Self {
        Self::with_sync_dispatcher(time, Arc::new(SyncDispatcher::disabled()))
    }

    /// engine mirroring transactions to an external core-banking system
    pub fn with_sync(time: SafeTimeProvider, target: Arc<dyn CoreBankingSync>) -> Self {
        Self::with_sync_dispatcher(time, Arc::new(SyncDispatcher::new(Some(target))))
    }

    fn with_sync_dispatcher(time: SafeTimeProvider, sync: Arc<SyncDispatcher>) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            processor: TransactionProcessor::new(store.clone(), sync.clone()),
            reversals: ReversalEngine::new(store.clone(), sync.clone()),
            store,
            sync,
            time,
            events: EventStore::new(),
        }
    }

    pub fn store(&self) -> Arc<MemoryStore> {
        self.store.clone()
    }

    // setup

    pub fn register_account(&self, account: Account) -> AccountId {
        self.store.insert_account(account)
    }

    pub fn open_holding_account(&self, account: HoldingAccount) -> AccountId {
        self.store.insert_holding(account)
    }

    /// create a loan awaiting disbursement; the interest rate is normalized
    /// so percentage-style inputs become fractions exactly once
    pub fn create_loan(
        &self,
        tenant_id: TenantId,
        client_id: ClientId,
        accounting: ProductAccountingConfig,
        mut terms: LoanTerms,
    ) -> LoanId {
        terms.interest_rate = Rate::normalized(terms.interest_rate.as_decimal());
        self.store
            .insert_loan(LoanAccount::new(tenant_id, client_id, accounting, terms))
    }

    // transactions

    pub fn process_transaction(
        &mut self,
        request: TransactionRequest,
    ) -> Result<TransactionOutcome> {
        self.processor.process(request, &self.time, &mut self.events)
    }

    pub fn reverse_transaction(
        &mut self,
        tenant_id: TenantId,
        payment_id: PaymentId,
        reason: impl Into<String>,
    ) -> Result<ReversalResult> {
        self.reversals
            .reverse(tenant_id, payment_id, reason, &self.time, &mut self.events)
    }

    /// build and install the loan's amortization schedule from its current
    /// terms, reapplying any historical non-reversed repayments. Disbursement
    /// keeps a pre-built schedule instead of generating its own.
    pub fn generate_schedule(
        &mut self,
        tenant_id: TenantId,
        loan_id: LoanId,
        start_date: NaiveDate,
    ) -> Result<Vec<ScheduleEntry>> {
        let lock = self.store.loan_lock(loan_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let loan = self.store.loan(loan_id)?;
        if loan.tenant_id != tenant_id {
            return Err(LedgerError::TenantMismatch { loan_id, tenant_id });
        }
        let mut rows = ScheduleEngine::generate(loan_id, &loan.terms, start_date)?;
        let historical = self.store.repaid_total(loan_id);
        if historical.is_positive() {
            ScheduleEngine::apply_payment(&mut rows, historical);
        }
        self.events.emit(Event::ScheduleGenerated {
            loan_id,
            installments: rows.len() as u32,
            first_due: rows.first().map(|r| r.due_date),
            timestamp: self.time.now(),
        });
        self.store.put_schedule(loan_id, rows.clone());
        Ok(rows)
    }

    /// recompute the schedule when its spacing no longer matches the loan
    /// terms, or unconditionally when forced. Historical non-reversed
    /// repayments are reapplied oldest-first so settled installments stay
    /// settled. Returns whether a new schedule was installed.
    pub fn regenerate_schedule(&mut self, loan_id: LoanId, force: bool) -> Result<bool> {
        let lock = self.store.loan_lock(loan_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let loan = self.store.loan(loan_id)?;
        let existing = self.store.schedule(loan_id);
        let historical = self.store.repaid_total(loan_id);

        match ScheduleEngine::regenerate(&loan, &existing, historical, force)? {
            Some(rows) => {
                self.events.emit(Event::ScheduleRegenerated {
                    loan_id,
                    installments: rows.len() as u32,
                    reapplied_total: historical,
                    timestamp: self.time.now(),
                });
                self.store.put_schedule(loan_id, rows);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// flag a performing loan whose earliest unpaid installment is past the
    /// given date, and restore it once nothing is past due. Both `Active`
    /// and `Overdue` accept repayments, so this only affects reporting and
    /// downstream penalty policies.
    pub fn refresh_overdue_status(
        &mut self,
        loan_id: LoanId,
        as_of: NaiveDate,
    ) -> Result<LoanStatus> {
        let lock = self.store.loan_lock(loan_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut loan = self.store.loan(loan_id)?;
        if !matches!(loan.status, LoanStatus::Active | LoanStatus::Overdue) {
            return Ok(loan.status);
        }
        let past_due = self
            .store
            .schedule(loan_id)
            .iter()
            .any(|r| r.due_date < as_of && r.outstanding().is_positive());
        let target = if past_due {
            LoanStatus::Overdue
        } else {
            LoanStatus::Active
        };
        if target != loan.status {
            self.events.emit(Event::StatusChanged {
                loan_id,
                old_status: loan.status,
                new_status: target,
                timestamp: self.time.now(),
            });
            loan.status = target;
            self.store.put_loan(loan);
        }
        Ok(target)
    }

    // queries

    pub fn loan(&self, loan_id: LoanId) -> Result<LoanAccount> {
        self.store.loan(loan_id)
    }

    pub fn schedule(&self, loan_id: LoanId) -> Vec<ScheduleEntry> {
        self.store.schedule(loan_id)
    }

    pub fn payment(&self, payment_id: PaymentId) -> Result<PaymentRecord> {
        self.store.payment(payment_id)
    }

    pub fn entry(&self, entry_id: EntryId) -> Result<JournalEntry> {
        self.store.entry(entry_id)
    }

    pub fn payments_for_loan(&self, loan_id: LoanId) -> Vec<PaymentRecord> {
        self.store.payments_for_loan(loan_id)
    }

    // maintenance

    /// re-attempt failed core-banking notifications
    pub fn retry_sync(&self) -> usize {
        self.sync.retry_pending()
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        self.events.take_events()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AccountingMode;
    use crate::decimal::Money;
    use crate::errors::LedgerError;
    use crate::config::AccountRole;
    use crate::payments::OverpaymentOutcome;
    use crate::types::{
        AccountType, AllocationOrder, ChargeKind, InterestMethod, LoanStatus, RepaymentFrequency,
        TransactionKind,
    };
    use chrono::{NaiveDate, Utc};
    use hourglass_rs::TimeSource;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn engine() -> LoanLedger {
        LoanLedger::new(SafeTimeProvider::new(TimeSource::Test(Utc::now())))
    }

    fn full_chart(engine: &LoanLedger, tenant: TenantId) -> ProductAccountingConfig {
        let asset = |code: &str, name: &str| {
            engine.register_account(Account::new(tenant, code, name, AccountType::Asset, "gl"))
        };
        let income = |code: &str, name: &str| {
            engine.register_account(Account::new(tenant, code, name, AccountType::Income, "gl"))
        };
        ProductAccountingConfig {
            product_id: Uuid::new_v4(),
            mode: AccountingMode::Accrual,
            portfolio: Some(asset("1101", "Loan Portfolio")),
            interest_receivable: Some(asset("1201", "Interest Receivable")),
            interest_income: Some(income("4101", "Interest Income")),
            fee_income: Some(income("4201", "Fee Income")),
            penalty_income: Some(income("4301", "Penalty Income")),
            fund_source: Some(asset("1001", "Cash")),
            provision: None,
            write_off_expense: Some(engine.register_account(Account::new(
                tenant,
                "5101",
                "Write-off Expense",
                AccountType::Expense,
                "gl",
            ))),
            overpayment_liability: Some(engine.register_account(Account::new(
                tenant,
                "2301",
                "Client Overpayments",
                AccountType::Liability,
                "gl",
            ))),
            channel_mappings: HashMap::new(),
            fee_mappings: HashMap::new(),
        }
    }

    fn simple_terms(principal: i64, rate_pct: u32) -> LoanTerms {
        LoanTerms {
            principal: Money::from_major(principal),
            interest_rate: Rate::from_percentage(rate_pct),
            term_periods: 12,
            frequency: RepaymentFrequency::Monthly,
            interest_method: InterestMethod::DecliningBalance,
            allocation_order: AllocationOrder::default(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn disburse(
        engine: &mut LoanLedger,
        tenant: TenantId,
        loan_id: LoanId,
        amount: i64,
    ) -> TransactionOutcome {
        engine
            .process_transaction(TransactionRequest::new(
                tenant,
                loan_id,
                TransactionKind::Disbursement,
                Money::from_major(amount),
                date(2024, 1, 15),
            ))
            .unwrap()
    }

    #[test]
    fn test_disbursement_activates_loan_and_posts() {
        let mut engine = engine();
        let tenant = Uuid::new_v4();
        let config = full_chart(&engine, tenant);
        let portfolio = config.portfolio.unwrap();
        let cash = config.fund_source.unwrap();
        let loan_id = engine.create_loan(tenant, Uuid::new_v4(), config, simple_terms(10_000, 12));

        let outcome = disburse(&mut engine, tenant, loan_id, 10_000);

        let loan = engine.loan(loan_id).unwrap();
        assert_eq!(loan.status, LoanStatus::Active);
        assert_eq!(loan.outstanding_balance, Money::from_major(10_000));
        assert_eq!(loan.buckets.principal, Money::from_major(10_000));
        assert_eq!(engine.schedule(loan_id).len(), 12);

        let entry = engine.entry(outcome.entry_id.unwrap()).unwrap();
        assert_eq!(entry.debit_total(), Money::from_major(10_000));
        assert!(entry.debit_total().approx_eq(entry.credit_total()));

        let store = engine.store();
        assert_eq!(
            store.account(portfolio).unwrap().balance,
            Money::from_major(10_000)
        );
        assert_eq!(
            store.account(cash).unwrap().balance,
            -Money::from_major(10_000)
        );
    }

    #[test]
    fn test_reversal_restores_prior_state() {
        let mut engine = engine();
        let tenant = Uuid::new_v4();
        let config = full_chart(&engine, tenant);
        let cash = config.fund_source.unwrap();
        let loan_id = engine.create_loan(tenant, Uuid::new_v4(), config, simple_terms(10_000, 12));
        disburse(&mut engine, tenant, loan_id, 10_000);
        engine
            .process_transaction(TransactionRequest::new(
                tenant,
                loan_id,
                TransactionKind::Charge(ChargeKind::InterestAccrual),
                Money::from_major(500),
                date(2024, 2, 1),
            ))
            .unwrap();

        let before = engine.loan(loan_id).unwrap();
        let schedule_before = engine.schedule(loan_id);
        let cash_before = engine.store().account(cash).unwrap().balance;

        let outcome = engine
            .process_transaction(TransactionRequest::new(
                tenant,
                loan_id,
                TransactionKind::Repayment,
                Money::from_major(3_000),
                date(2024, 2, 15),
            ))
            .unwrap();
        assert_eq!(outcome.allocation.interest, Money::from_major(500));
        assert_eq!(outcome.allocation.principal, Money::from_major(2_500));

        let result = engine
            .reverse_transaction(tenant, outcome.payment_id, "teller error")
            .unwrap();
        assert_eq!(result.restored_amount, Money::from_major(3_000));
        assert!(result.reversal_entry_id.is_some());

        let after = engine.loan(loan_id).unwrap();
        assert_eq!(after.outstanding_balance, before.outstanding_balance);
        assert_eq!(after.buckets, before.buckets);
        assert_eq!(after.status, before.status);
        assert_eq!(engine.schedule(loan_id), schedule_before);
        assert_eq!(engine.store().account(cash).unwrap().balance, cash_before);

        let record = engine.payment(outcome.payment_id).unwrap();
        assert!(record.reversed);
    }

    #[test]
    fn test_second_reversal_is_rejected() {
        let mut engine = engine();
        let tenant = Uuid::new_v4();
        let config = full_chart(&engine, tenant);
        let loan_id = engine.create_loan(tenant, Uuid::new_v4(), config, simple_terms(10_000, 12));
        disburse(&mut engine, tenant, loan_id, 10_000);

        let outcome = engine
            .process_transaction(TransactionRequest::new(
                tenant,
                loan_id,
                TransactionKind::Repayment,
                Money::from_major(1_000),
                date(2024, 2, 15),
            ))
            .unwrap();

        engine
            .reverse_transaction(tenant, outcome.payment_id, "first")
            .unwrap();
        let err = engine
            .reverse_transaction(tenant, outcome.payment_id, "second")
            .unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyReversed { .. }));
    }

    #[test]
    fn test_exact_payoff_closes_loan() {
        let mut engine = engine();
        let tenant = Uuid::new_v4();
        let config = full_chart(&engine, tenant);
        let loan_id = engine.create_loan(tenant, Uuid::new_v4(), config, simple_terms(1_000, 0));
        disburse(&mut engine, tenant, loan_id, 1_000);

        let outcome = engine
            .process_transaction(TransactionRequest::new(
                tenant,
                loan_id,
                TransactionKind::Repayment,
                Money::from_major(1_000),
                date(2024, 6, 1),
            ))
            .unwrap();

        assert_eq!(outcome.new_outstanding, Money::ZERO);
        assert_eq!(outcome.status, LoanStatus::Closed);
        assert_eq!(outcome.overpayment, OverpaymentOutcome::None);

        let loan = engine.loan(loan_id).unwrap();
        assert_eq!(loan.closed_on, Some(date(2024, 6, 1)));
        assert!(engine
            .take_events()
            .iter()
            .any(|e| matches!(e, Event::LoanClosed { .. })));
    }

    #[test]
    fn test_reversing_closing_payment_reopens_loan() {
        let mut engine = engine();
        let tenant = Uuid::new_v4();
        let config = full_chart(&engine, tenant);
        let loan_id = engine.create_loan(tenant, Uuid::new_v4(), config, simple_terms(1_000, 0));
        disburse(&mut engine, tenant, loan_id, 1_000);

        let outcome = engine
            .process_transaction(TransactionRequest::new(
                tenant,
                loan_id,
                TransactionKind::Repayment,
                Money::from_major(1_000),
                date(2024, 6, 1),
            ))
            .unwrap();
        assert_eq!(outcome.status, LoanStatus::Closed);

        let result = engine
            .reverse_transaction(tenant, outcome.payment_id, "bounced cheque")
            .unwrap();
        assert!(result.reopened);
        assert_eq!(result.status, LoanStatus::Active);

        let loan = engine.loan(loan_id).unwrap();
        assert_eq!(loan.outstanding_balance, Money::from_major(1_000));
        assert_eq!(loan.closed_on, None);
    }

    #[test]
    fn test_overpayment_routed_to_holding_account() {
        let mut engine = engine();
        let tenant = Uuid::new_v4();
        let client = Uuid::new_v4();
        let config = full_chart(&engine, tenant);
        let loan_id = engine.create_loan(tenant, client, config, simple_terms(1_000, 0));
        disburse(&mut engine, tenant, loan_id, 1_000);

        let holding_id = engine.open_holding_account(HoldingAccount {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            client_id: client,
            account_number: "SV-1".to_string(),
            active: true,
            opened_on: date(2023, 1, 1),
            balance: Money::ZERO,
        });

        let outcome = engine
            .process_transaction(TransactionRequest::new(
                tenant,
                loan_id,
                TransactionKind::Repayment,
                Money::from_major(1_200),
                date(2024, 6, 1),
            ))
            .unwrap();

        assert_eq!(outcome.allocation.total_applied(), Money::from_major(1_000));
        assert_eq!(outcome.status, LoanStatus::Closed);
        match outcome.overpayment {
            OverpaymentOutcome::Routed {
                holding_account_id,
                amount,
                entry_id,
            } => {
                assert_eq!(holding_account_id, holding_id);
                assert_eq!(amount, Money::from_major(200));
                assert!(entry_id.is_some());
            }
            other => panic!("expected routed overpayment, got {other:?}"),
        }
        assert_eq!(
            engine.store().holding(holding_id).unwrap().balance,
            Money::from_major(200)
        );
    }

    #[test]
    fn test_unconfigured_overpayment_liability_aborts_before_posting() {
        let mut engine = engine();
        let tenant = Uuid::new_v4();
        let client = Uuid::new_v4();
        let mut config = full_chart(&engine, tenant);
        config.overpayment_liability = None;
        let cash = config.fund_source.unwrap();
        let loan_id = engine.create_loan(tenant, client, config, simple_terms(1_000, 0));
        disburse(&mut engine, tenant, loan_id, 1_000);
        engine.open_holding_account(HoldingAccount {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            client_id: client,
            account_number: "SV-1".to_string(),
            active: true,
            opened_on: date(2023, 1, 1),
            balance: Money::ZERO,
        });
        let cash_before = engine.store().account(cash).unwrap().balance;

        let err = engine
            .process_transaction(TransactionRequest::new(
                tenant,
                loan_id,
                TransactionKind::Repayment,
                Money::from_major(1_200),
                date(2024, 6, 1),
            ))
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::NotConfigured {
                role: AccountRole::OverpaymentLiability,
                ..
            }
        ));

        // the whole repayment was rejected before any write
        let loan = engine.loan(loan_id).unwrap();
        assert_eq!(loan.outstanding_balance, Money::from_major(1_000));
        assert_eq!(loan.status, LoanStatus::Active);
        let paid: Money = engine.schedule(loan_id).iter().map(|r| r.paid_amount).sum();
        assert_eq!(paid, Money::ZERO);
        // only the disbursement record exists
        assert_eq!(engine.payments_for_loan(loan_id).len(), 1);
        assert_eq!(engine.store().account(cash).unwrap().balance, cash_before);
    }

    #[test]
    fn test_excess_without_holding_account_is_unrouted_not_fatal() {
        let mut engine = engine();
        let tenant = Uuid::new_v4();
        let mut config = full_chart(&engine, tenant);
        // no liability mapping and no holding account: the repayment still
        // settles, with the excess surfaced as unrouted
        config.overpayment_liability = None;
        let loan_id = engine.create_loan(tenant, Uuid::new_v4(), config, simple_terms(1_000, 0));
        disburse(&mut engine, tenant, loan_id, 1_000);

        let outcome = engine
            .process_transaction(TransactionRequest::new(
                tenant,
                loan_id,
                TransactionKind::Repayment,
                Money::from_major(1_200),
                date(2024, 6, 1),
            ))
            .unwrap();
        assert_eq!(outcome.status, LoanStatus::Closed);
        assert_eq!(
            outcome.overpayment,
            OverpaymentOutcome::Unrouted {
                amount: Money::from_major(200)
            }
        );
    }

    #[test]
    fn test_reversal_pulls_overpayment_back_from_holding() {
        let mut engine = engine();
        let tenant = Uuid::new_v4();
        let client = Uuid::new_v4();
        let config = full_chart(&engine, tenant);
        let loan_id = engine.create_loan(tenant, client, config, simple_terms(1_000, 0));
        disburse(&mut engine, tenant, loan_id, 1_000);
        let holding_id = engine.open_holding_account(HoldingAccount {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            client_id: client,
            account_number: "SV-1".to_string(),
            active: true,
            opened_on: date(2023, 1, 1),
            balance: Money::ZERO,
        });

        let outcome = engine
            .process_transaction(TransactionRequest::new(
                tenant,
                loan_id,
                TransactionKind::Repayment,
                Money::from_major(1_200),
                date(2024, 6, 1),
            ))
            .unwrap();
        engine
            .reverse_transaction(tenant, outcome.payment_id, "wrong loan")
            .unwrap();

        assert_eq!(engine.store().holding(holding_id).unwrap().balance, Money::ZERO);
        let loan = engine.loan(loan_id).unwrap();
        assert_eq!(loan.outstanding_balance, Money::from_major(1_000));
        assert_eq!(loan.status, LoanStatus::Active);
    }

    #[test]
    fn test_missing_fund_source_blocks_disbursement_cleanly() {
        let mut engine = engine();
        let tenant = Uuid::new_v4();
        let mut config = full_chart(&engine, tenant);
        config.fund_source = None;
        let loan_id = engine.create_loan(tenant, Uuid::new_v4(), config, simple_terms(5_000, 10));

        let err = engine
            .process_transaction(TransactionRequest::new(
                tenant,
                loan_id,
                TransactionKind::Disbursement,
                Money::from_major(5_000),
                date(2024, 1, 15),
            ))
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::NotConfigured {
                role: AccountRole::FundSource,
                ..
            }
        ));

        // nothing moved
        let loan = engine.loan(loan_id).unwrap();
        assert_eq!(loan.status, LoanStatus::PendingDisbursement);
        assert_eq!(loan.outstanding_balance, Money::ZERO);
        assert!(engine.schedule(loan_id).is_empty());
        assert!(engine.payments_for_loan(loan_id).is_empty());
    }

    #[test]
    fn test_accounting_mode_none_skips_journal_only() {
        let mut engine = engine();
        let tenant = Uuid::new_v4();
        let config = ProductAccountingConfig::disabled(Uuid::new_v4());
        let loan_id = engine.create_loan(tenant, Uuid::new_v4(), config, simple_terms(1_000, 0));

        let outcome = disburse(&mut engine, tenant, loan_id, 1_000);
        assert_eq!(outcome.entry_id, None);
        assert_eq!(engine.schedule(loan_id).len(), 12);

        let repay = engine
            .process_transaction(TransactionRequest::new(
                tenant,
                loan_id,
                TransactionKind::Repayment,
                Money::from_major(400),
                date(2024, 3, 1),
            ))
            .unwrap();
        assert_eq!(repay.entry_id, None);
        assert_eq!(repay.new_outstanding, Money::from_major(600));
    }

    #[test]
    fn test_fee_charge_lands_on_next_unpaid_installment() {
        let mut engine = engine();
        let tenant = Uuid::new_v4();
        let config = full_chart(&engine, tenant);
        let loan_id = engine.create_loan(tenant, Uuid::new_v4(), config, simple_terms(1_200, 0));
        disburse(&mut engine, tenant, loan_id, 1_200);

        // settle the first installment so the fee targets the second
        engine
            .process_transaction(TransactionRequest::new(
                tenant,
                loan_id,
                TransactionKind::Repayment,
                Money::from_major(100),
                date(2024, 2, 15),
            ))
            .unwrap();
        engine
            .process_transaction(TransactionRequest::new(
                tenant,
                loan_id,
                TransactionKind::Charge(ChargeKind::Fee),
                Money::from_major(25),
                date(2024, 3, 1),
            ))
            .unwrap();

        let rows = engine.schedule(loan_id);
        assert_eq!(rows[0].fee_due, Money::ZERO);
        assert_eq!(rows[1].fee_due, Money::from_major(25));
        assert_eq!(rows[1].total_due, Money::from_major(125));

        let loan = engine.loan(loan_id).unwrap();
        assert_eq!(loan.buckets.fee, Money::from_major(25));
        assert_eq!(loan.outstanding_balance, Money::from_major(1_125));
    }

    #[test]
    fn test_write_off_is_terminal() {
        let mut engine = engine();
        let tenant = Uuid::new_v4();
        let config = full_chart(&engine, tenant);
        let loan_id = engine.create_loan(tenant, Uuid::new_v4(), config, simple_terms(2_000, 0));
        disburse(&mut engine, tenant, loan_id, 2_000);

        let repay = engine
            .process_transaction(TransactionRequest::new(
                tenant,
                loan_id,
                TransactionKind::Repayment,
                Money::from_major(500),
                date(2024, 3, 1),
            ))
            .unwrap();

        let outcome = engine
            .process_transaction(TransactionRequest::new(
                tenant,
                loan_id,
                TransactionKind::WriteOff,
                Money::ZERO,
                date(2024, 9, 1),
            ))
            .unwrap();
        assert_eq!(outcome.status, LoanStatus::WrittenOff);
        assert_eq!(outcome.new_outstanding, Money::ZERO);

        let loan = engine.loan(loan_id).unwrap();
        assert_eq!(loan.written_off_amount, Some(Money::from_major(1_500)));

        // payments on a written-off loan can no longer be reversed
        let err = engine
            .reverse_transaction(tenant, repay.payment_id, "too late")
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidLoanState { .. }));
    }

    #[test]
    fn test_disbursement_reversal_not_supported() {
        let mut engine = engine();
        let tenant = Uuid::new_v4();
        let config = full_chart(&engine, tenant);
        let loan_id = engine.create_loan(tenant, Uuid::new_v4(), config, simple_terms(1_000, 0));
        let outcome = disburse(&mut engine, tenant, loan_id, 1_000);

        let err = engine
            .reverse_transaction(tenant, outcome.payment_id, "nope")
            .unwrap_err();
        assert!(matches!(err, LedgerError::ReversalNotSupported { .. }));
    }

    #[test]
    fn test_tenant_mismatch_rejected() {
        let mut engine = engine();
        let tenant = Uuid::new_v4();
        let config = full_chart(&engine, tenant);
        let loan_id = engine.create_loan(tenant, Uuid::new_v4(), config, simple_terms(1_000, 0));

        let err = engine
            .process_transaction(TransactionRequest::new(
                Uuid::new_v4(),
                loan_id,
                TransactionKind::Disbursement,
                Money::from_major(1_000),
                date(2024, 1, 15),
            ))
            .unwrap_err();
        assert!(matches!(err, LedgerError::TenantMismatch { .. }));
    }

    #[test]
    fn test_generate_schedule_is_validated_and_installs_rows() {
        let mut engine = engine();
        let tenant = Uuid::new_v4();
        let config = full_chart(&engine, tenant);
        let loan_id = engine.create_loan(tenant, Uuid::new_v4(), config, simple_terms(1_200, 0));

        let err = engine
            .generate_schedule(Uuid::new_v4(), loan_id, date(2024, 1, 1))
            .unwrap_err();
        assert!(matches!(err, LedgerError::TenantMismatch { .. }));
        assert!(engine.schedule(loan_id).is_empty());

        let rows = engine
            .generate_schedule(tenant, loan_id, date(2024, 1, 1))
            .unwrap();
        assert_eq!(rows.len(), 12);
        assert_eq!(engine.schedule(loan_id), rows);

        // disbursement keeps the pre-built schedule
        disburse(&mut engine, tenant, loan_id, 1_200);
        assert_eq!(engine.schedule(loan_id)[0].due_date, date(2024, 2, 1));
    }

    #[test]
    fn test_disbursement_amount_must_match_principal() {
        let mut engine = engine();
        let tenant = Uuid::new_v4();
        let config = full_chart(&engine, tenant);
        let loan_id = engine.create_loan(tenant, Uuid::new_v4(), config, simple_terms(1_000, 0));

        let err = engine
            .process_transaction(TransactionRequest::new(
                tenant,
                loan_id,
                TransactionKind::Disbursement,
                Money::from_major(900),
                date(2024, 1, 15),
            ))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount { .. }));

        let loan = engine.loan(loan_id).unwrap();
        assert_eq!(loan.status, LoanStatus::PendingDisbursement);
        assert_eq!(loan.outstanding_balance, Money::ZERO);
        assert!(engine.schedule(loan_id).is_empty());
    }

    #[test]
    fn test_forced_regeneration_reapplies_payments() {
        let mut engine = engine();
        let tenant = Uuid::new_v4();
        let config = full_chart(&engine, tenant);
        let loan_id = engine.create_loan(tenant, Uuid::new_v4(), config, simple_terms(1_200, 0));
        disburse(&mut engine, tenant, loan_id, 1_200);
        engine
            .process_transaction(TransactionRequest::new(
                tenant,
                loan_id,
                TransactionKind::Repayment,
                Money::from_major(300),
                date(2024, 2, 15),
            ))
            .unwrap();

        // matching spacing: nothing to do without force
        assert!(!engine.regenerate_schedule(loan_id, false).unwrap());
        assert!(engine.regenerate_schedule(loan_id, true).unwrap());

        let rows = engine.schedule(loan_id);
        let paid: Money = rows.iter().map(|r| r.paid_amount).sum();
        assert_eq!(paid, Money::from_major(300));
        assert_eq!(rows[0].payment_status(), crate::loan::PaymentStatus::Paid);
    }

    #[test]
    fn test_overdue_status_follows_past_due_installments() {
        let mut engine = engine();
        let tenant = Uuid::new_v4();
        let config = full_chart(&engine, tenant);
        let loan_id = engine.create_loan(tenant, Uuid::new_v4(), config, simple_terms(1_200, 0));
        disburse(&mut engine, tenant, loan_id, 1_200);

        // first installment due 2024-02-15
        assert_eq!(
            engine.refresh_overdue_status(loan_id, date(2024, 2, 1)).unwrap(),
            LoanStatus::Active
        );
        assert_eq!(
            engine.refresh_overdue_status(loan_id, date(2024, 3, 1)).unwrap(),
            LoanStatus::Overdue
        );

        // overdue loans still accept repayments; settling the arrears
        // restores the active status
        engine
            .process_transaction(TransactionRequest::new(
                tenant,
                loan_id,
                TransactionKind::Repayment,
                Money::from_major(100),
                date(2024, 3, 1),
            ))
            .unwrap();
        assert_eq!(
            engine.refresh_overdue_status(loan_id, date(2024, 3, 1)).unwrap(),
            LoanStatus::Active
        );
    }

    #[test]
    fn test_loan_snapshot_serializes_round_trip() {
        let engine = engine();
        let tenant = Uuid::new_v4();
        let config = full_chart(&engine, tenant);
        let loan_id = engine.create_loan(tenant, Uuid::new_v4(), config, simple_terms(10_000, 12));
        let loan = engine.loan(loan_id).unwrap();

        let json = serde_json::to_string(&loan).unwrap();
        // amounts travel as strings so no precision is lost
        assert!(json.contains("\"10000\""));
        let restored: LoanAccount = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.id, loan.id);
        assert_eq!(restored.terms, loan.terms);
        assert_eq!(restored.outstanding_balance, loan.outstanding_balance);
    }
}
