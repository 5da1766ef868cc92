pub mod cli;
pub mod config;
pub mod log;
pub mod portfolio;
pub mod providers;
pub mod rates;
pub mod service;

use crate::portfolio::transaction::InMemoryTransactionSource;
use crate::providers::yahoo_finance::YahooFinanceProvider;
use crate::service::PortfolioService;
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy)]
pub enum AppCommand {
    Summary,
    Rates,
    Refresh,
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("Bitcoin portfolio tracker starting...");

    let config = match config_path {
        Some(path) => config::AppConfig::load_from_path(path)?,
        None => config::AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let base_url = config
        .providers
        .yahoo
        .as_ref()
        .map_or("https://query1.finance.yahoo.com", |p| &p.base_url);
    let provider = Arc::new(YahooFinanceProvider::new(base_url)?);
    let transactions = Arc::new(InMemoryTransactionSource::new(config.transactions.clone()));

    let data_dir = match config.data_path() {
        Ok(dir) => Some(dir),
        Err(e) => {
            warn!(error = %e, "No data directory available, running without persistence");
            None
        }
    };

    let service = PortfolioService::new(&config, provider, transactions, data_dir);

    match command {
        AppCommand::Summary => {
            // Best effort: a failed refresh still leaves the persisted or
            // fallback rates to value against.
            if let Err(e) = service.force_refresh_rates().await {
                warn!(error = %e, "Rate refresh failed, using last known rates");
            }
            let summary = service.get_portfolio_summary(false).await?;
            println!("{}", cli::summary::render(&summary));
        }
        AppCommand::Rates => {
            let (snapshot, age) = service.rates();
            println!("{}", cli::rates::render(&snapshot, age));
        }
        AppCommand::Refresh => {
            service.force_refresh_rates().await?;
            let (snapshot, age) = service.rates();
            println!("{}", cli::rates::render(&snapshot, age));
        }
    }

    Ok(())
}
