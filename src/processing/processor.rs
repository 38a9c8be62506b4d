use chrono::NaiveDate;
use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError};
use tracing::debug;
use uuid::Uuid;

use crate::config::AccountRole;
use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::events::{Event, EventStore};
use crate::ledger::{AccountResolver, JournalEntryLine, LedgerService};
use crate::loan::{LoanAccount, OverpaymentTransfer, PaymentRecord};
use crate::payments::{ManualSplit, OverpaymentHandler, OverpaymentOutcome};
use crate::payments::allocation::AllocationStrategy;
use crate::schedule::ScheduleEngine;
use crate::store::MemoryStore;
use crate::sync::{SyncDispatcher, SyncNotification};
use crate::types::{
    ChargeKind, EntryId, LoanId, LoanStatus, PaymentAllocation, PaymentChannel, PaymentId,
    ReferenceType, TenantId, TransactionKind,
};

/// one inbound business transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub tenant_id: TenantId,
    pub loan_id: LoanId,
    pub kind: TransactionKind,
    pub amount: Money,
    pub date: NaiveDate,
    pub channel: Option<PaymentChannel>,
    pub manual_split: Option<ManualSplit>,
    /// fee definition for fee charges with a fee-specific income mapping
    pub fee_id: Option<Uuid>,
    pub reference: String,
}

impl TransactionRequest {
    pub fn new(
        tenant_id: TenantId,
        loan_id: LoanId,
        kind: TransactionKind,
        amount: Money,
        date: NaiveDate,
    ) -> Self {
        Self {
            tenant_id,
            loan_id,
            kind,
            amount,
            date,
            channel: None,
            manual_split: None,
            fee_id: None,
            reference: String::new(),
        }
    }
}

/// result of a processed transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionOutcome {
    pub payment_id: PaymentId,
    pub entry_id: Option<EntryId>,
    pub allocation: PaymentAllocation,
    pub new_outstanding: Money,
    pub status: LoanStatus,
    pub overpayment: OverpaymentOutcome,
}

/// orchestrates a single business transaction across account resolution,
/// allocation, ledger posting, schedule application, and loan state. The
/// ledger post always happens first: a failure there prevents any
/// schedule or loan mutation.
pub struct TransactionProcessor {
    store: Arc<MemoryStore>,
    ledger: LedgerService,
    overpayments: OverpaymentHandler,
    sync: Arc<SyncDispatcher>,
}

impl TransactionProcessor {
    pub fn new(store: Arc<MemoryStore>, sync: Arc<SyncDispatcher>) -> Self {
        Self {
            ledger: LedgerService::new(store.clone()),
            overpayments: OverpaymentHandler::new(store.clone()),
            store,
            sync,
        }
    }

    /// process one transaction under the loan's exclusive lock
    pub fn process(
        &self,
        request: TransactionRequest,
        time: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<TransactionOutcome> {
        if request.kind != TransactionKind::WriteOff && !request.amount.is_positive() {
            return Err(LedgerError::InvalidAmount {
                amount: request.amount,
            });
        }

        let lock = self.store.loan_lock(request.loan_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let loan = self.store.loan(request.loan_id)?;
        if loan.tenant_id != request.tenant_id {
            return Err(LedgerError::TenantMismatch {
                loan_id: request.loan_id,
                tenant_id: request.tenant_id,
            });
        }

        match request.kind {
            TransactionKind::Disbursement => self.disburse(loan, request, time, events),
            TransactionKind::Repayment => self.repay(loan, request, time, events),
            TransactionKind::Charge(kind) => self.charge(loan, kind, request, time, events),
            TransactionKind::WriteOff => self.write_off(loan, request, time, events),
        }
    }

    fn disburse(
        &self,
        mut loan: LoanAccount,
        request: TransactionRequest,
        time: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<TransactionOutcome> {
        if !loan.can_disburse() {
            return Err(LedgerError::InvalidLoanState {
                status: loan.status,
                operation: "disbursement",
            });
        }
        // the schedule is built from the terms, so the released amount must
        // match the agreed principal
        if !request.amount.approx_eq(loan.terms.principal) {
            return Err(LedgerError::InvalidAmount {
                amount: request.amount,
            });
        }

        let payment_id = Uuid::new_v4();
        let entry_id = if loan.accounting.is_enabled() {
            // resolve both legs before touching anything
            let portfolio = AccountResolver::resolve(&loan.accounting, AccountRole::Portfolio)?;
            let fund_source = AccountResolver::fund_source(&loan.accounting, request.channel)?;
            let entry = self.ledger.post(
                loan.tenant_id,
                request.date,
                format!("loan disbursement {}", loan.id),
                ReferenceType::Disbursement,
                payment_id,
                vec![
                    JournalEntryLine::debit(portfolio, request.amount, "principal disbursed"),
                    JournalEntryLine::credit(fund_source, request.amount, "funds released"),
                ],
                time,
                events,
            )?;
            Some(entry.id)
        } else {
            None
        };

        if self.store.schedule(loan.id).is_empty() {
            let rows = ScheduleEngine::generate(loan.id, &loan.terms, request.date)?;
            events.emit(Event::ScheduleGenerated {
                loan_id: loan.id,
                installments: rows.len() as u32,
                first_due: rows.first().map(|r| r.due_date),
                timestamp: time.now(),
            });
            self.store.put_schedule(loan.id, rows);
        }

        loan.buckets.principal = request.amount;
        loan.outstanding_balance = request.amount;
        loan.disbursed_on = Some(request.date);
        self.set_status(&mut loan, LoanStatus::Active, time, events);

        let record = PaymentRecord {
            id: payment_id,
            loan_id: loan.id,
            tenant_id: loan.tenant_id,
            kind: ReferenceType::Disbursement,
            amount: request.amount,
            allocation: PaymentAllocation {
                principal: request.amount,
                ..PaymentAllocation::default()
            },
            date: request.date,
            channel: request.channel,
            reference: request.reference,
            entry_id,
            reversed: false,
            reversal_entry_id: None,
            overpayment: None,
        };
        self.store.insert_payment(record);

        events.emit(Event::LoanDisbursed {
            loan_id: loan.id,
            amount: request.amount,
            entry_id,
            timestamp: time.now(),
        });
        let outcome = TransactionOutcome {
            payment_id,
            entry_id,
            allocation: PaymentAllocation::default(),
            new_outstanding: loan.outstanding_balance,
            status: loan.status,
            overpayment: OverpaymentOutcome::None,
        };
        self.store.put_loan(loan);

        self.sync.dispatch(
            SyncNotification::Disbursement {
                loan_id: request.loan_id,
                amount: request.amount,
                date: request.date,
            },
            time,
            events,
        );
        Ok(outcome)
    }

    fn repay(
        &self,
        mut loan: LoanAccount,
        request: TransactionRequest,
        time: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<TransactionOutcome> {
        if !loan.can_repay() {
            return Err(LedgerError::InvalidLoanState {
                status: loan.status,
                operation: "repayment",
            });
        }

        let allocation = AllocationStrategy::resolve(
            request.amount,
            &loan.buckets,
            loan.terms.allocation_order,
            request.manual_split.as_ref(),
        );
        let applied = allocation.total_applied();

        let payment_id = Uuid::new_v4();
        let mut payment_account = None;
        let entry_id = if loan.accounting.is_enabled() {
            // resolve every leg up front; any unconfigured account aborts
            // the whole transaction before a single write. That includes
            // the liability leg of an excess that will route to a holding
            // account, which posts as a second entry after this one.
            if allocation.excess.is_positive()
                && self
                    .store
                    .oldest_active_holding(loan.tenant_id, loan.client_id)
                    .is_some()
            {
                AccountResolver::resolve(&loan.accounting, AccountRole::OverpaymentLiability)?;
            }
            let debit_account = AccountResolver::fund_source(&loan.accounting, request.channel)?;
            let mut lines = vec![JournalEntryLine::debit(
                debit_account,
                applied,
                "repayment received",
            )];
            if allocation.penalty.is_positive() {
                let account =
                    AccountResolver::resolve(&loan.accounting, AccountRole::PenaltyIncome)?;
                lines.push(JournalEntryLine::credit(account, allocation.penalty, "penalty"));
            }
            if allocation.fee.is_positive() {
                let account = AccountResolver::fee_income(&loan.accounting, request.fee_id)?;
                lines.push(JournalEntryLine::credit(account, allocation.fee, "fees"));
            }
            if allocation.interest.is_positive() {
                let account =
                    AccountResolver::resolve(&loan.accounting, AccountRole::InterestIncome)?;
                lines.push(JournalEntryLine::credit(account, allocation.interest, "interest"));
            }
            if allocation.principal.is_positive() {
                let account = AccountResolver::resolve(&loan.accounting, AccountRole::Portfolio)?;
                lines.push(JournalEntryLine::credit(
                    account,
                    allocation.principal,
                    "principal",
                ));
            }
            payment_account = Some(debit_account);
            let entry = self.ledger.post(
                loan.tenant_id,
                request.date,
                format!("loan repayment {}", loan.id),
                ReferenceType::Payment,
                payment_id,
                lines,
                time,
                events,
            )?;
            Some(entry.id)
        } else {
            None
        };

        // ledger committed; now mutate schedule and loan state
        let mut rows = self.store.schedule(loan.id);
        ScheduleEngine::apply_payment(&mut rows, applied);
        self.store.put_schedule(loan.id, rows);

        loan.buckets.penalty -= allocation.penalty;
        loan.buckets.fee -= allocation.fee;
        loan.buckets.interest -= allocation.interest;
        loan.buckets.principal -= allocation.principal;
        loan.outstanding_balance = (loan.outstanding_balance - applied).max(Money::ZERO);
        loan.record_payment(applied);

        if loan.outstanding_balance.is_zero() {
            loan.closed_on = Some(request.date);
            self.set_status(&mut loan, LoanStatus::Closed, time, events);
            events.emit(Event::LoanClosed {
                loan_id: loan.id,
                final_payment: applied,
                timestamp: time.now(),
            });
        }

        let overpayment = if allocation.excess.is_positive() {
            self.overpayments.handle(
                &loan,
                allocation.excess,
                payment_account,
                request.date,
                &self.ledger,
                time,
                events,
            )?
        } else {
            OverpaymentOutcome::None
        };

        let transfer = match overpayment {
            OverpaymentOutcome::Routed {
                holding_account_id,
                amount,
                entry_id,
            } => Some(OverpaymentTransfer {
                holding_account_id,
                amount,
                entry_id,
            }),
            _ => None,
        };

        let record = PaymentRecord {
            id: payment_id,
            loan_id: loan.id,
            tenant_id: loan.tenant_id,
            kind: ReferenceType::Payment,
            amount: request.amount,
            allocation,
            date: request.date,
            channel: request.channel,
            reference: request.reference,
            entry_id,
            reversed: false,
            reversal_entry_id: None,
            overpayment: transfer,
        };
        self.store.insert_payment(record);

        debug!(
            loan_id = %loan.id,
            amount = %request.amount,
            applied = %applied,
            excess = %allocation.excess,
            "repayment processed"
        );
        events.emit(Event::RepaymentReceived {
            loan_id: loan.id,
            payment_id,
            amount: request.amount,
            allocation,
            timestamp: time.now(),
        });

        let outcome = TransactionOutcome {
            payment_id,
            entry_id,
            allocation,
            new_outstanding: loan.outstanding_balance,
            status: loan.status,
            overpayment,
        };
        self.store.put_loan(loan);

        self.sync.dispatch(
            SyncNotification::Repayment {
                loan_id: request.loan_id,
                payment_id,
                amount: request.amount,
                date: request.date,
            },
            time,
            events,
        );
        Ok(outcome)
    }

    fn charge(
        &self,
        mut loan: LoanAccount,
        kind: ChargeKind,
        request: TransactionRequest,
        time: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<TransactionOutcome> {
        if !loan.can_charge() {
            return Err(LedgerError::InvalidLoanState {
                status: loan.status,
                operation: "charge",
            });
        }

        let payment_id = Uuid::new_v4();
        let entry_id = if loan.accounting.is_enabled() {
            let (debit_account, credit_account, leg) = match kind {
                ChargeKind::Fee => (
                    AccountResolver::resolve(&loan.accounting, AccountRole::Portfolio)?,
                    AccountResolver::fee_income(&loan.accounting, request.fee_id)?,
                    "fee charged",
                ),
                ChargeKind::Penalty => (
                    AccountResolver::resolve(&loan.accounting, AccountRole::Portfolio)?,
                    AccountResolver::resolve(&loan.accounting, AccountRole::PenaltyIncome)?,
                    "penalty charged",
                ),
                ChargeKind::InterestAccrual => (
                    AccountResolver::resolve(&loan.accounting, AccountRole::InterestReceivable)?,
                    AccountResolver::resolve(&loan.accounting, AccountRole::InterestIncome)?,
                    "interest accrued",
                ),
            };
            let entry = self.ledger.post(
                loan.tenant_id,
                request.date,
                format!("charge on loan {}", loan.id),
                ReferenceType::Charge,
                payment_id,
                vec![
                    JournalEntryLine::debit(debit_account, request.amount, leg),
                    JournalEntryLine::credit(credit_account, request.amount, leg),
                ],
                time,
                events,
            )?;
            Some(entry.id)
        } else {
            None
        };

        let mut allocation = PaymentAllocation::default();
        match kind {
            ChargeKind::Fee => {
                loan.buckets.fee += request.amount;
                allocation.fee = request.amount;
                // fees land on the next unpaid installment when one exists
                let mut rows = self.store.schedule(loan.id);
                if let Some(row) = rows.iter_mut().find(|r| r.outstanding().is_positive()) {
                    row.fee_due += request.amount;
                    row.total_due += request.amount;
                }
                self.store.put_schedule(loan.id, rows);
            }
            ChargeKind::Penalty => {
                loan.buckets.penalty += request.amount;
                allocation.penalty = request.amount;
            }
            ChargeKind::InterestAccrual => {
                loan.buckets.interest += request.amount;
                allocation.interest = request.amount;
            }
        }
        loan.outstanding_balance += request.amount;

        let record = PaymentRecord {
            id: payment_id,
            loan_id: loan.id,
            tenant_id: loan.tenant_id,
            kind: ReferenceType::Charge,
            amount: request.amount,
            allocation,
            date: request.date,
            channel: None,
            reference: request.reference,
            entry_id,
            reversed: false,
            reversal_entry_id: None,
            overpayment: None,
        };
        self.store.insert_payment(record);

        events.emit(Event::ChargeApplied {
            loan_id: loan.id,
            amount: request.amount,
            description: format!("{kind:?}"),
            timestamp: time.now(),
        });
        let outcome = TransactionOutcome {
            payment_id,
            entry_id,
            allocation,
            new_outstanding: loan.outstanding_balance,
            status: loan.status,
            overpayment: OverpaymentOutcome::None,
        };
        self.store.put_loan(loan);
        Ok(outcome)
    }

    fn write_off(
        &self,
        mut loan: LoanAccount,
        request: TransactionRequest,
        time: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<TransactionOutcome> {
        if !matches!(loan.status, LoanStatus::Active | LoanStatus::Overdue) {
            return Err(LedgerError::InvalidLoanState {
                status: loan.status,
                operation: "write-off",
            });
        }
        let principal_lost = loan.buckets.principal;
        if !principal_lost.is_positive() {
            return Err(LedgerError::InvalidAmount {
                amount: principal_lost,
            });
        }

        let payment_id = Uuid::new_v4();
        let entry_id = if loan.accounting.is_enabled() {
            let expense =
                AccountResolver::resolve(&loan.accounting, AccountRole::WriteOffExpense)?;
            let portfolio = AccountResolver::resolve(&loan.accounting, AccountRole::Portfolio)?;
            let entry = self.ledger.post(
                loan.tenant_id,
                request.date,
                format!("write-off of loan {}", loan.id),
                ReferenceType::WriteOff,
                payment_id,
                vec![
                    JournalEntryLine::debit(expense, principal_lost, "principal written off"),
                    JournalEntryLine::credit(portfolio, principal_lost, "portfolio reduction"),
                ],
                time,
                events,
            )?;
            Some(entry.id)
        } else {
            None
        };

        let loss = loan.outstanding_balance;
        loan.written_off_amount = Some(loss);
        loan.outstanding_balance = Money::ZERO;
        self.set_status(&mut loan, LoanStatus::WrittenOff, time, events);

        let record = PaymentRecord {
            id: payment_id,
            loan_id: loan.id,
            tenant_id: loan.tenant_id,
            kind: ReferenceType::WriteOff,
            amount: principal_lost,
            allocation: PaymentAllocation {
                principal: principal_lost,
                ..PaymentAllocation::default()
            },
            date: request.date,
            channel: None,
            reference: request.reference,
            entry_id,
            reversed: false,
            reversal_entry_id: None,
            overpayment: None,
        };
        self.store.insert_payment(record);

        events.emit(Event::LoanWrittenOff {
            loan_id: loan.id,
            loss_amount: loss,
            timestamp: time.now(),
        });
        let outcome = TransactionOutcome {
            payment_id,
            entry_id,
            allocation: PaymentAllocation::default(),
            new_outstanding: Money::ZERO,
            status: loan.status,
            overpayment: OverpaymentOutcome::None,
        };
        self.store.put_loan(loan);
        Ok(outcome)
    }

    fn set_status(
        &self,
        loan: &mut LoanAccount,
        new_status: LoanStatus,
        time: &SafeTimeProvider,
        events: &mut EventStore,
    ) {
        if loan.status == new_status {
            return;
        }
        events.emit(Event::StatusChanged {
            loan_id: loan.id,
            old_status: loan.status,
            new_status,
            timestamp: time.now(),
        });
        loan.status = new_status;
    }
}
