//! SQLite storage implementation for users and their sub-account links.

mod model;
mod repository;

pub use model::{NewUserDB, SubAccountDB, UserDB};
pub use repository::UserRepository;

// Re-export trait from core for convenience
pub use ledgersync_core::users::Authenticator;
