//! Process-wide sync progress and time-remaining estimate.

mod eta_estimator;
mod progress_model;
mod progress_service;
mod progress_traits;

pub use eta_estimator::*;
pub use progress_model::*;
pub use progress_service::*;
pub use progress_traits::*;

#[cfg(test)]
mod tests;
