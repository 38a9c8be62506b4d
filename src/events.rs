use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::types::{AccountId, EntryId, LoanId, LoanStatus, PaymentAllocation, PaymentId};

/// all events emitted by the ledger engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // lifecycle events
    LoanDisbursed {
        loan_id: LoanId,
        amount: Money,
        entry_id: Option<EntryId>,
        timestamp: DateTime<Utc>,
    },
    LoanClosed {
        loan_id: LoanId,
        final_payment: Money,
        timestamp: DateTime<Utc>,
    },
    LoanReopened {
        loan_id: LoanId,
        restored_balance: Money,
        timestamp: DateTime<Utc>,
    },
    LoanWrittenOff {
        loan_id: LoanId,
        loss_amount: Money,
        timestamp: DateTime<Utc>,
    },
    StatusChanged {
        loan_id: LoanId,
        old_status: LoanStatus,
        new_status: LoanStatus,
        timestamp: DateTime<Utc>,
    },

    // payment events
    RepaymentReceived {
        loan_id: LoanId,
        payment_id: PaymentId,
        amount: Money,
        allocation: PaymentAllocation,
        timestamp: DateTime<Utc>,
    },
    ChargeApplied {
        loan_id: LoanId,
        amount: Money,
        description: String,
        timestamp: DateTime<Utc>,
    },
    PaymentReversed {
        loan_id: LoanId,
        payment_id: PaymentId,
        reversal_entry_id: Option<EntryId>,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    // overpayment events
    OverpaymentRouted {
        loan_id: LoanId,
        holding_account_id: AccountId,
        amount: Money,
        timestamp: DateTime<Utc>,
    },
    OverpaymentUnrouted {
        loan_id: LoanId,
        amount: Money,
        timestamp: DateTime<Utc>,
    },

    // ledger events
    EntryPosted {
        entry_id: EntryId,
        entry_number: String,
        total_amount: Money,
        timestamp: DateTime<Utc>,
    },

    // schedule events
    ScheduleGenerated {
        loan_id: LoanId,
        installments: u32,
        first_due: Option<NaiveDate>,
        timestamp: DateTime<Utc>,
    },
    ScheduleRegenerated {
        loan_id: LoanId,
        installments: u32,
        reapplied_total: Money,
        timestamp: DateTime<Utc>,
    },

    // external sync events
    ExternalSyncFailed {
        loan_id: LoanId,
        operation: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

/// event store for collecting events during operations
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
        }
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
