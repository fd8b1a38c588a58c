//! Cross-process message channel between the sync unit and its host.

mod message_sender;
mod process_message_manager;
mod process_message_model;

pub use message_sender::*;
pub use process_message_manager::*;
pub use process_message_model::*;

#[cfg(test)]
mod tests;
