//! Pure portfolio valuation: cost basis, P&L and returns.
//!
//! All currency conversion routes through the `RateResolver`; nothing here
//! reads raw snapshot fields.

use crate::portfolio::transaction::{Transaction, TransactionKind};
use crate::rates::resolver::RateResolver;
use crate::rates::snapshot::RateSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-transaction outcome in the main currency. For a BUY, `pnl` is the
/// unrealized gain of that lot at current prices; for a SELL it is the
/// realized gain against the average-cost basis at the time of sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionMetrics {
    pub id: String,
    pub kind: TransactionKind,
    /// BUY: acquisition cost including fee. SELL: attributed cost basis.
    pub cost_basis: f64,
    /// BUY: current market value of the lot. SELL: net proceeds.
    pub value: f64,
    pub pnl: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuationResult {
    /// Main currency all figures are expressed in.
    pub currency: String,
    pub btc_balance: f64,
    /// Cumulative acquisition cost across all BUYs (ROI denominator).
    pub total_cost_basis: f64,
    pub current_value: f64,
    pub unrealized_pnl: f64,
    pub realized_pnl: f64,
    pub total_pnl: f64,
    pub roi_pct: f64,
    /// Simple non-compounding scaling of ROI over the holding period.
    /// An approximation, not a true time-weighted return.
    pub annualized_return_pct: f64,
    pub transactions: Vec<TransactionMetrics>,
}

impl ValuationResult {
    fn empty(currency: &str) -> Self {
        ValuationResult {
            currency: currency.to_string(),
            btc_balance: 0.0,
            total_cost_basis: 0.0,
            current_value: 0.0,
            unrealized_pnl: 0.0,
            realized_pnl: 0.0,
            total_pnl: 0.0,
            roi_pct: 0.0,
            annualized_return_pct: 0.0,
            transactions: Vec::new(),
        }
    }
}

/// Values the transaction list at current rates. SELL cost basis uses the
/// average-cost method: the running weighted-average acquisition price per
/// BTC at the time of each sale. Transactions are processed in timestamp
/// order regardless of input order.
pub fn value_portfolio(
    transactions: &[Transaction],
    resolver: &RateResolver,
    snapshot: &RateSnapshot,
    main_currency: &str,
    now: DateTime<Utc>,
) -> ValuationResult {
    if transactions.is_empty() {
        return ValuationResult::empty(main_currency);
    }

    let mut ordered: Vec<&Transaction> = transactions.iter().collect();
    ordered.sort_by_key(|t| t.timestamp);

    let btc_price = resolver.btc_price(snapshot, main_currency).rate;

    let mut held_btc = 0.0_f64;
    let mut held_cost = 0.0_f64;
    let mut total_buy_cost = 0.0_f64;
    let mut realized_pnl = 0.0_f64;
    let mut metrics = Vec::with_capacity(ordered.len());

    for tx in &ordered {
        let to_main = resolver.resolve(snapshot, &tx.currency, main_currency).rate;
        let fee_main = tx.fee
            * resolver
                .resolve(snapshot, tx.fee_currency(), main_currency)
                .rate;
        let gross_main = tx.btc_amount * tx.price_per_unit * to_main;

        match tx.kind {
            TransactionKind::Buy => {
                let cost_basis = gross_main + fee_main;
                held_btc += tx.btc_amount;
                held_cost += cost_basis;
                total_buy_cost += cost_basis;

                let value = tx.btc_amount * btc_price;
                metrics.push(TransactionMetrics {
                    id: tx.id.clone(),
                    kind: tx.kind,
                    cost_basis,
                    value,
                    pnl: value - cost_basis,
                });
            }
            TransactionKind::Sell => {
                // Attribute cost only for what is actually held; an
                // oversell never drives the balance negative.
                let sold = tx.btc_amount.min(held_btc);
                let avg_cost = if held_btc > 0.0 {
                    held_cost / held_btc
                } else {
                    0.0
                };
                let attributed = avg_cost * sold;
                let proceeds = gross_main - fee_main;

                held_btc -= sold;
                held_cost -= attributed;
                realized_pnl += proceeds - attributed;

                metrics.push(TransactionMetrics {
                    id: tx.id.clone(),
                    kind: tx.kind,
                    cost_basis: attributed,
                    value: proceeds,
                    pnl: proceeds - attributed,
                });
            }
        }
    }

    let current_value = held_btc * btc_price;
    let unrealized_pnl = current_value - held_cost;
    let total_pnl = realized_pnl + unrealized_pnl;

    // Guard the zero-basis case so ROI never divides by zero.
    let roi_pct = if total_buy_cost > 0.0 {
        total_pnl / total_buy_cost * 100.0
    } else {
        0.0
    };

    let first_ts = ordered[0].timestamp;
    let holding_days = (now - first_ts).num_days().max(1) as f64;
    let annualized_return_pct = roi_pct / holding_days * 365.0;

    ValuationResult {
        currency: main_currency.to_string(),
        btc_balance: held_btc,
        total_cost_basis: total_buy_cost,
        current_value,
        unrealized_pnl,
        realized_pnl,
        total_pnl,
        roi_pct,
        annualized_return_pct,
        transactions: metrics,
    }
}
