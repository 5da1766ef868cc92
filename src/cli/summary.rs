//! Renders the portfolio summary for the terminal.

use crate::cli::ui;
use crate::portfolio::summary::PortfolioSummary;
use crate::portfolio::transaction::TransactionKind;
use comfy_table::Cell;

pub fn render(summary: &PortfolioSummary) -> String {
    let metrics = &summary.metrics;
    let currency = &metrics.currency;

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Id"),
        ui::header_cell("Type"),
        ui::header_cell(&format!("Cost Basis ({currency})")),
        ui::header_cell(&format!("Value ({currency})")),
        ui::header_cell(&format!("P&L ({currency})")),
    ]);

    for tx in &metrics.transactions {
        let kind = match tx.kind {
            TransactionKind::Buy => "BUY",
            TransactionKind::Sell => "SELL",
        };
        table.add_row(vec![
            Cell::new(&tx.id),
            Cell::new(kind),
            ui::amount_cell(format!("{:.2}", tx.cost_basis)),
            ui::amount_cell(format!("{:.2}", tx.value)),
            ui::pnl_cell(tx.pnl),
        ]);
    }

    let mut output = format!(
        "Portfolio: {}\n\n",
        ui::style_text(&format!("{:.8} BTC", metrics.btc_balance), ui::StyleType::Title)
    );
    output.push_str(&table.to_string());

    output.push_str(&format!(
        "\n\nCurrent Value ({}): {}",
        ui::style_text(currency, ui::StyleType::TotalLabel),
        ui::style_text(&format!("{:.2}", metrics.current_value), ui::StyleType::TotalValue),
    ));
    output.push_str(&format!(
        "\nTotal P&L: {}  (realized {:.2}, unrealized {:.2})",
        ui::style_text(&format!("{:+.2}", metrics.total_pnl), ui::StyleType::TotalValue),
        metrics.realized_pnl,
        metrics.unrealized_pnl,
    ));
    output.push_str(&format!(
        "\nROI: {:.2}%  Annualized (approx.): {:.2}%",
        metrics.roi_pct, metrics.annualized_return_pct,
    ));
    output.push_str(&format!(
        "\n{}",
        ui::style_text(
            &format!("Computed at {}", summary.computed_at.format("%Y-%m-%d %H:%M:%S UTC")),
            ui::StyleType::Subtle
        )
    ));

    output
}
