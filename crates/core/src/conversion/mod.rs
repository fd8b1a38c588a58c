//! USD pricing of historical records from candle data.

mod candle_price;
mod conversion_model;
mod conversion_service;
mod symbols;

pub use candle_price::*;
pub use conversion_model::*;
pub use conversion_service::*;
pub use symbols::*;
