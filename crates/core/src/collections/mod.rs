//! Registry of the synced collections and their column models.

mod collection_model;

pub use collection_model::*;

#[cfg(test)]
mod tests;
