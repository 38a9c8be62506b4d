pub mod processor;
pub mod reversal;

pub use processor::{TransactionOutcome, TransactionProcessor, TransactionRequest};
pub use reversal::{ReversalEngine, ReversalResult};
