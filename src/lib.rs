pub mod config;
pub mod decimal;
pub mod engine;
pub mod errors;
pub mod events;
pub mod ledger;
pub mod loan;
pub mod payments;
pub mod processing;
pub mod schedule;
pub mod store;
pub mod sync;
pub mod types;

// re-export key types
pub use decimal::{Money, Rate};
pub use engine::LoanLedger;
pub use errors::{LedgerError, Result};
pub use events::{Event, EventStore};
pub use config::{AccountRole, AccountingMode, ProductAccountingConfig};
pub use ledger::{Account, AccountResolver, JournalEntry, JournalEntryLine, LedgerService};
pub use loan::{
    HoldingAccount, LoanAccount, LoanTerms, OverpaymentTransfer, PaymentRecord, PaymentStatus,
    ScheduleEntry,
};
pub use payments::{AllocationStrategy, ManualSplit, OverpaymentHandler, OverpaymentOutcome};
pub use processing::{
    ReversalEngine, ReversalResult, TransactionOutcome, TransactionProcessor, TransactionRequest,
};
pub use schedule::ScheduleEngine;
pub use store::MemoryStore;
pub use sync::{CoreBankingSync, SyncDispatcher, SyncError, SyncNotification};
pub use types::{
    AccountType, AllocationOrder, Bucket, ChargeKind, EntryStatus, InterestMethod, LoanStatus,
    OutstandingBalances, PaymentAllocation, PaymentChannel, ReferenceType, RepaymentFrequency,
    TransactionKind,
};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
