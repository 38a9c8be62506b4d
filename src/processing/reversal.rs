use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError};
use tracing::{debug, warn};

use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::events::{Event, EventStore};
use crate::ledger::LedgerService;
use crate::loan::{LoanAccount, PaymentRecord};
use crate::schedule::ScheduleEngine;
use crate::store::MemoryStore;
use crate::sync::{SyncDispatcher, SyncNotification};
use crate::types::{
    EntryId, LoanStatus, PaymentId, ReferenceType, TenantId, TransactionKind,
};

/// what a completed reversal undid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReversalResult {
    pub payment_id: PaymentId,
    pub reversal_entry_id: Option<EntryId>,
    pub restored_amount: Money,
    pub status: LoanStatus,
    pub reopened: bool,
}

/// undoes a processed transaction by posting a compensating journal entry
/// and walking every side effect back: schedule rows release paid amounts
/// newest-first, charge buckets are restored, routed overpayments return
/// from the holding account, and a closed loan reopens. The original
/// record stays in place, flagged as reversed.
pub struct ReversalEngine {
    store: Arc<MemoryStore>,
    ledger: LedgerService,
    sync: Arc<SyncDispatcher>,
}

impl ReversalEngine {
    pub fn new(store: Arc<MemoryStore>, sync: Arc<SyncDispatcher>) -> Self {
        Self {
            ledger: LedgerService::new(store.clone()),
            store,
            sync,
        }
    }

    pub fn reverse(
        &self,
        tenant_id: TenantId,
        payment_id: PaymentId,
        reason: impl Into<String>,
        time: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<ReversalResult> {
        let loan_id = self.store.payment(payment_id)?.loan_id;
        let lock = self.store.loan_lock(loan_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        // reload under the lock
        let payment = self.store.payment(payment_id)?;
        let loan = self.store.loan(payment.loan_id)?;
        if loan.tenant_id != tenant_id {
            return Err(LedgerError::TenantMismatch {
                loan_id: loan.id,
                tenant_id,
            });
        }
        if payment.reversed {
            return Err(LedgerError::AlreadyReversed { payment_id });
        }
        if loan.forbids_reversal() {
            return Err(LedgerError::InvalidLoanState {
                status: loan.status,
                operation: "reversal",
            });
        }

        match payment.kind {
            ReferenceType::Payment => self.reverse_repayment(loan, payment, reason, time, events),
            ReferenceType::Charge => self.reverse_charge(loan, payment, reason, time, events),
            ReferenceType::Disbursement => Err(LedgerError::ReversalNotSupported {
                kind: TransactionKind::Disbursement,
            }),
            _ => Err(LedgerError::ReversalNotSupported {
                kind: TransactionKind::WriteOff,
            }),
        }
    }

    fn reverse_repayment(
        &self,
        mut loan: LoanAccount,
        mut payment: PaymentRecord,
        reason: impl Into<String>,
        time: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<ReversalResult> {
        let reason = reason.into();
        let reversal_entry_id = self.post_mirror(&payment, &reason, time, events)?;

        // unwind a routed overpayment before touching the loan
        if let Some(transfer) = &payment.overpayment {
            if let Some(entry_id) = transfer.entry_id {
                let original = self.store.entry(entry_id)?;
                self.ledger.post(
                    loan.tenant_id,
                    time.now().date_naive(),
                    format!("reversal of overpayment transfer for loan {}", loan.id),
                    ReferenceType::Reversal,
                    payment.id,
                    original.mirrored_lines(),
                    time,
                    events,
                )?;
                self.store.mark_entry_reversed(entry_id)?;
            }
            if let Some(mut holding) = self.store.holding(transfer.holding_account_id) {
                let restored = holding.balance - transfer.amount;
                if restored.is_negative() {
                    warn!(
                        holding_account_id = %holding.id,
                        balance = %holding.balance,
                        transfer = %transfer.amount,
                        "holding balance below reversed transfer, clamping to zero"
                    );
                }
                holding.balance = restored.max(Money::ZERO);
                self.store.put_holding(holding);
            }
        }

        let applied = payment.allocation.total_applied();
        let mut rows = self.store.schedule(loan.id);
        ScheduleEngine::unapply_payment(&mut rows, applied);
        self.store.put_schedule(loan.id, rows);

        loan.buckets.restore(&payment.allocation);
        loan.outstanding_balance += applied;
        loan.total_payments_received = (loan.total_payments_received - applied).max(Money::ZERO);
        loan.payment_count = loan.payment_count.saturating_sub(1);

        let mut reopened = false;
        if loan.status == LoanStatus::Closed && loan.outstanding_balance.is_positive() {
            reopened = true;
            loan.closed_on = None;
            events.emit(Event::StatusChanged {
                loan_id: loan.id,
                old_status: loan.status,
                new_status: LoanStatus::Active,
                timestamp: time.now(),
            });
            loan.status = LoanStatus::Active;
            events.emit(Event::LoanReopened {
                loan_id: loan.id,
                restored_balance: loan.outstanding_balance,
                timestamp: time.now(),
            });
        }

        payment.reversed = true;
        payment.reversal_entry_id = reversal_entry_id;
        let payment_id = payment.id;
        let loan_id = loan.id;
        let status = loan.status;
        self.store.put_payment(payment);
        self.store.put_loan(loan);

        debug!(
            loan_id = %loan_id,
            payment_id = %payment_id,
            restored = %applied,
            "repayment reversed"
        );
        events.emit(Event::PaymentReversed {
            loan_id,
            payment_id,
            reversal_entry_id,
            reason,
            timestamp: time.now(),
        });
        self.sync.dispatch(
            SyncNotification::Reversal {
                loan_id,
                payment_id,
                date: time.now().date_naive(),
            },
            time,
            events,
        );

        Ok(ReversalResult {
            payment_id,
            reversal_entry_id,
            restored_amount: applied,
            status,
            reopened,
        })
    }

    fn reverse_charge(
        &self,
        mut loan: LoanAccount,
        mut payment: PaymentRecord,
        reason: impl Into<String>,
        time: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<ReversalResult> {
        let reason = reason.into();
        let reversal_entry_id = self.post_mirror(&payment, &reason, time, events)?;

        let allocation = payment.allocation;
        loan.buckets.penalty = (loan.buckets.penalty - allocation.penalty).max(Money::ZERO);
        loan.buckets.fee = (loan.buckets.fee - allocation.fee).max(Money::ZERO);
        loan.buckets.interest = (loan.buckets.interest - allocation.interest).max(Money::ZERO);
        loan.outstanding_balance =
            (loan.outstanding_balance - payment.amount).max(Money::ZERO);

        // take a fee charge back off the installment it landed on
        if allocation.fee.is_positive() {
            let mut rows = self.store.schedule(loan.id);
            if let Some(row) = rows
                .iter_mut()
                .find(|r| r.outstanding().is_positive() && r.fee_due >= allocation.fee)
            {
                row.fee_due -= allocation.fee;
                row.total_due -= allocation.fee;
            }
            self.store.put_schedule(loan.id, rows);
        }

        payment.reversed = true;
        payment.reversal_entry_id = reversal_entry_id;
        let payment_id = payment.id;
        let loan_id = loan.id;
        let status = loan.status;
        let restored = payment.amount;
        self.store.put_payment(payment);
        self.store.put_loan(loan);

        events.emit(Event::PaymentReversed {
            loan_id,
            payment_id,
            reversal_entry_id,
            reason,
            timestamp: time.now(),
        });

        Ok(ReversalResult {
            payment_id,
            reversal_entry_id,
            restored_amount: restored,
            status,
            reopened: false,
        })
    }

    /// post the compensating entry for the payment's original entry and
    /// flag the original as reversed; transactions posted with accounting
    /// disabled have nothing to mirror
    fn post_mirror(
        &self,
        payment: &PaymentRecord,
        reason: &str,
        time: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<Option<EntryId>> {
        let Some(entry_id) = payment.entry_id else {
            return Ok(None);
        };
        let original = self.store.entry(entry_id)?;
        let reversal = self.ledger.post(
            original.tenant_id,
            time.now().date_naive(),
            format!("reversal: {reason}"),
            ReferenceType::Reversal,
            payment.id,
            original.mirrored_lines(),
            time,
            events,
        )?;
        self.store.mark_entry_reversed(entry_id)?;
        Ok(Some(reversal.id))
    }
}
