use chrono::NaiveDate;
use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::warn;

use crate::decimal::Money;
use crate::events::{Event, EventStore};
use crate::types::{LoanId, PaymentId};

/// failure reported by the external core-banking system
#[derive(Debug, Clone, Error)]
#[error("core banking sync failed: {0}")]
pub struct SyncError(pub String);

/// optional external core-banking system mirrored on a best-effort basis.
/// The engine never depends on it for correctness.
pub trait CoreBankingSync: Send + Sync {
    fn notify(&self, notification: &SyncNotification) -> Result<(), SyncError>;
}

/// one mirrored operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SyncNotification {
    Disbursement {
        loan_id: LoanId,
        amount: Money,
        date: NaiveDate,
    },
    Repayment {
        loan_id: LoanId,
        payment_id: PaymentId,
        amount: Money,
        date: NaiveDate,
    },
    Reversal {
        loan_id: LoanId,
        payment_id: PaymentId,
        date: NaiveDate,
    },
}

impl SyncNotification {
    fn loan_id(&self) -> LoanId {
        match self {
            SyncNotification::Disbursement { loan_id, .. }
            | SyncNotification::Repayment { loan_id, .. }
            | SyncNotification::Reversal { loan_id, .. } => *loan_id,
        }
    }

    fn operation(&self) -> &'static str {
        match self {
            SyncNotification::Disbursement { .. } => "disbursement",
            SyncNotification::Repayment { .. } => "repayment",
            SyncNotification::Reversal { .. } => "reversal",
        }
    }
}

/// fire-and-forget dispatch decoupled from the local transaction: failures
/// are logged and queued for caller-driven retry, never propagated.
pub struct SyncDispatcher {
    target: Option<Arc<dyn CoreBankingSync>>,
    pending: Mutex<Vec<SyncNotification>>,
}

impl SyncDispatcher {
    pub fn new(target: Option<Arc<dyn CoreBankingSync>>) -> Self {
        Self {
            target,
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    /// dispatch after the local transaction has committed
    pub fn dispatch(
        &self,
        notification: SyncNotification,
        time: &SafeTimeProvider,
        events: &mut EventStore,
    ) {
        let Some(target) = &self.target else {
            return;
        };
        if let Err(err) = target.notify(&notification) {
            warn!(
                loan_id = %notification.loan_id(),
                operation = notification.operation(),
                error = %err,
                "core banking sync failed, queued for retry"
            );
            events.emit(Event::ExternalSyncFailed {
                loan_id: notification.loan_id(),
                operation: notification.operation().to_string(),
                error: err.to_string(),
                timestamp: time.now(),
            });
            if let Ok(mut pending) = self.pending.lock() {
                pending.push(notification);
            }
        }
    }

    /// re-attempt queued notifications; anything that fails again stays
    /// queued
    pub fn retry_pending(&self) -> usize {
        let Some(target) = &self.target else {
            return 0;
        };
        let Ok(mut pending) = self.pending.lock() else {
            return 0;
        };
        let queued = std::mem::take(&mut *pending);
        let mut delivered = 0;
        for notification in queued {
            match target.notify(&notification) {
                Ok(()) => delivered += 1,
                Err(_) => pending.push(notification),
            }
        }
        delivered
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }
}
