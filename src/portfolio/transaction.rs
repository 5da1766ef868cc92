//! Read-only transaction input and the transaction-store seam.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Buy,
    Sell,
}

/// A single recorded trade. Owned by the transaction-store collaborator;
/// this crate never mutates it. Input shape is validated upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub btc_amount: f64,
    pub price_per_unit: f64,
    pub currency: String,
    #[serde(default)]
    pub fee: f64,
    /// Defaults to the transaction currency when absent.
    #[serde(default)]
    pub fee_currency: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Transaction {
    pub fn fee_currency(&self) -> &str {
        self.fee_currency.as_deref().unwrap_or(&self.currency)
    }
}

/// Detects transaction-log mutation for cache invalidation: the summary
/// cache compares this against the fingerprint it was computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFingerprint {
    pub transaction_count: usize,
    pub latest_timestamp: Option<DateTime<Utc>>,
}

impl LogFingerprint {
    pub fn of(transactions: &[Transaction]) -> Self {
        LogFingerprint {
            transaction_count: transactions.len(),
            latest_timestamp: transactions.iter().map(|t| t.timestamp).max(),
        }
    }
}

/// The transaction-store collaborator. Storage and CRUD live outside this
/// crate; consumers only need the list and its fingerprint.
#[async_trait]
pub trait TransactionSource: Send + Sync {
    async fn transactions(&self) -> Result<Vec<Transaction>>;
    async fn fingerprint(&self) -> Result<LogFingerprint>;
}

/// In-memory source backing the CLI (transactions declared in config) and
/// tests. Mutations go through `replace`, mirroring how an external store
/// would swap the log under us.
pub struct InMemoryTransactionSource {
    transactions: RwLock<Vec<Transaction>>,
}

impl InMemoryTransactionSource {
    pub fn new(transactions: Vec<Transaction>) -> Self {
        InMemoryTransactionSource {
            transactions: RwLock::new(transactions),
        }
    }

    pub fn replace(&self, transactions: Vec<Transaction>) {
        *self.transactions.write().unwrap() = transactions;
    }

    pub fn push(&self, transaction: Transaction) {
        self.transactions.write().unwrap().push(transaction);
    }
}

#[async_trait]
impl TransactionSource for InMemoryTransactionSource {
    async fn transactions(&self) -> Result<Vec<Transaction>> {
        Ok(self.transactions.read().unwrap().clone())
    }

    async fn fingerprint(&self) -> Result<LogFingerprint> {
        Ok(LogFingerprint::of(&self.transactions.read().unwrap()))
    }
}
