//! Renders the current rate snapshot for the terminal.

use crate::cli::ui;
use crate::rates::snapshot::RateSnapshot;
use chrono::Duration;
use comfy_table::Cell;

pub fn render(snapshot: &RateSnapshot, age: Duration) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Pair"),
        ui::header_cell("Rate"),
    ]);

    let mut btc: Vec<_> = snapshot.btc_price.iter().collect();
    btc.sort_by(|a, b| a.0.cmp(b.0));
    for (currency, price) in btc {
        table.add_row(vec![
            Cell::new(format!("BTC/{currency}")),
            ui::amount_cell(format!("{price:.2}")),
        ]);
    }

    let mut pairs: Vec<_> = snapshot
        .rate_matrix
        .iter()
        .flat_map(|(from, targets)| {
            targets.iter().map(move |(to, rate)| (from, to, *rate))
        })
        .collect();
    pairs.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
    for (from, to, rate) in pairs {
        table.add_row(vec![
            Cell::new(format!("{from}/{to}")),
            ui::amount_cell(format!("{rate:.4}")),
        ]);
    }

    let age_note = if age > Duration::days(365) {
        "no data fetched yet".to_string()
    } else {
        format!("snapshot age: {}s", age.num_seconds())
    };

    format!(
        "{}\n{}",
        table,
        ui::style_text(&age_note, ui::StyleType::Subtle)
    )
}
