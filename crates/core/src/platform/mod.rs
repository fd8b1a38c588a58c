//! Contract of the remote exchange API client.

mod api_client;

pub use api_client::*;

#[cfg(test)]
mod tests;
