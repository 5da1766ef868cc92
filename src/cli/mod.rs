//! Thin terminal surface over the portfolio service.

pub mod rates;
pub mod summary;
pub mod ui;
