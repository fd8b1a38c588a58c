use async_trait::async_trait;
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{Error, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformStatus {
    pub is_maintenance: bool,
}

/// Remote exchange API. Implementations report an unreachable platform as
/// [`Error::Network`] so callers can tell it apart from other failures.
#[async_trait]
pub trait ExchangeApiClient: Send + Sync {
    async fn pull(&self, method: &str, params: Value) -> Result<Value>;

    async fn platform_status(&self) -> Result<PlatformStatus>;
}

/// Whether the platform is up. In soft mode an unreachable or maintenance
/// platform yields `Ok(false)`; otherwise it is a `ServerUnavailable` error.
pub async fn check_platform_status(client: &dyn ExchangeApiClient, soft: bool) -> Result<bool> {
    match client.platform_status().await {
        Ok(status) if !status.is_maintenance => Ok(true),
        Ok(_) if soft => Ok(false),
        Ok(_) => Err(Error::ServerUnavailable(
            "Platform is in maintenance".to_string(),
        )),
        Err(e) if e.is_network_unavailable() => {
            warn!("Platform status check failed: {}", e);
            if soft {
                Ok(false)
            } else {
                Err(Error::ServerUnavailable(e.to_string()))
            }
        }
        Err(e) => Err(e),
    }
}
