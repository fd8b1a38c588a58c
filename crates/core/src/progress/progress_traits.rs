use async_trait::async_trait;

use super::StoredProgress;
use crate::errors::Result;

/// Storage of the single progress row.
#[async_trait]
pub trait ProgressRepositoryTrait: Send + Sync {
    fn load(&self) -> Result<StoredProgress>;

    async fn save(&self, progress: StoredProgress) -> Result<()>;
}
