//! SQLite access for USD conversion: candle closes and the converted
//! collection columns.

mod candle_repository;
mod conversion_repository;

pub use candle_repository::CandleRepository;
pub use conversion_repository::ConversionRepository;
