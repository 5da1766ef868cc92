//! Portfolio valuation and the memoized summary over it.

pub mod summary;
pub mod transaction;
pub mod valuation;

pub use summary::{PortfolioSummary, SummaryCache};
pub use transaction::{
    InMemoryTransactionSource, LogFingerprint, Transaction, TransactionKind, TransactionSource,
};
pub use valuation::{TransactionMetrics, ValuationResult, value_portfolio};
