//! Realized and unrealized gains from trades and movements.

mod tax_lot_calculator;
mod tax_lot_model;
mod tax_report_service;

pub use tax_lot_calculator::*;
pub use tax_lot_model::*;
pub use tax_report_service::*;

#[cfg(test)]
mod tests;
