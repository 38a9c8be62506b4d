use chrono::NaiveDate;
use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::config::AccountRole;
use crate::decimal::Money;
use crate::errors::Result;
use crate::events::{Event, EventStore};
use crate::ledger::{AccountResolver, JournalEntryLine, LedgerService};
use crate::loan::LoanAccount;
use crate::store::MemoryStore;
use crate::types::{AccountId, EntryId, ReferenceType};

/// where a repayment's excess ended up
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum OverpaymentOutcome {
    /// no excess occurred
    #[default]
    None,
    /// excess deposited into the client's holding account
    Routed {
        holding_account_id: AccountId,
        amount: Money,
        entry_id: Option<EntryId>,
    },
    /// no active holding account existed; the excess could not be routed
    /// and must be handled by the operator
    Unrouted {
        amount: Money,
    },
}

/// routes a strictly positive repayment excess to the client's oldest
/// active holding account. A missing holding account is surfaced as an
/// explicit outcome, never dropped; the repayment's monetary legs have
/// already completed by the time this runs.
pub struct OverpaymentHandler {
    store: Arc<MemoryStore>,
}

impl OverpaymentHandler {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    pub fn handle(
        &self,
        loan: &LoanAccount,
        excess: Money,
        payment_account: Option<AccountId>,
        date: NaiveDate,
        ledger: &LedgerService,
        time: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<OverpaymentOutcome> {
        debug_assert!(excess.is_positive());

        let Some(mut holding) = self
            .store
            .oldest_active_holding(loan.tenant_id, loan.client_id)
        else {
            warn!(
                loan_id = %loan.id,
                client_id = %loan.client_id,
                amount = %excess,
                "no active holding account, overpayment left unrouted"
            );
            events.emit(Event::OverpaymentUnrouted {
                loan_id: loan.id,
                amount: excess,
                timestamp: time.now(),
            });
            return Ok(OverpaymentOutcome::Unrouted { amount: excess });
        };

        let entry_id = match payment_account {
            Some(account) if loan.accounting.is_enabled() => {
                let liability =
                    AccountResolver::resolve(&loan.accounting, AccountRole::OverpaymentLiability)?;
                let entry = ledger.post(
                    loan.tenant_id,
                    date,
                    format!("overpayment transfer for loan {}", loan.id),
                    ReferenceType::OverpaymentTransfer,
                    loan.id,
                    vec![
                        JournalEntryLine::debit(account, excess, "overpayment received"),
                        JournalEntryLine::credit(liability, excess, "client holding balance"),
                    ],
                    time,
                    events,
                )?;
                Some(entry.id)
            }
            _ => None,
        };

        holding.balance += excess;
        let holding_account_id = holding.id;
        self.store.put_holding(holding);

        events.emit(Event::OverpaymentRouted {
            loan_id: loan.id,
            holding_account_id,
            amount: excess,
            timestamp: time.now(),
        });

        Ok(OverpaymentOutcome::Routed {
            holding_account_id,
            amount: excess,
            entry_id,
        })
    }
}
