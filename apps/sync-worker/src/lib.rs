//! Process entry points of the ledgersync sync unit.

pub mod config;
pub mod ipc;
pub mod main_lib;
pub mod scheduler;

pub use main_lib::{build_state, init_tracing, AppState};
