//! Trade and movement reads for the transaction tax report.

mod repository;

pub use repository::TaxEventRepository;
