//! Users and their sub-account links.

mod user_model;

pub use user_model::*;
