use super::*;
use crate::errors::Error;
use async_trait::async_trait;
use serde_json::{json, Value};

enum Reply {
    Up,
    Maintenance,
    Offline,
    Broken,
}

struct StubClient(Reply);

#[async_trait]
impl ExchangeApiClient for StubClient {
    async fn pull(&self, method: &str, _params: Value) -> crate::Result<Value> {
        Ok(json!({ "method": method }))
    }

    async fn platform_status(&self) -> crate::Result<PlatformStatus> {
        match self.0 {
            Reply::Up => Ok(PlatformStatus::default()),
            Reply::Maintenance => Ok(PlatformStatus {
                is_maintenance: true,
            }),
            Reply::Offline => Err(Error::Network("ENOTFOUND api".into())),
            Reply::Broken => Err(Error::BadRequest("bad key".into())),
        }
    }
}

#[tokio::test]
async fn test_reachable_platform_is_up() {
    assert!(check_platform_status(&StubClient(Reply::Up), false).await.unwrap());
}

#[tokio::test]
async fn test_soft_mode_downgrades_outages() {
    assert!(!check_platform_status(&StubClient(Reply::Offline), true).await.unwrap());
    assert!(!check_platform_status(&StubClient(Reply::Maintenance), true).await.unwrap());
}

#[tokio::test]
async fn test_strict_mode_reports_server_unavailable() {
    for reply in [Reply::Offline, Reply::Maintenance] {
        let err = check_platform_status(&StubClient(reply), false).await.unwrap_err();
        assert!(matches!(err, Error::ServerUnavailable(_)));
    }
}

#[tokio::test]
async fn test_other_failures_propagate_even_in_soft_mode() {
    let err = check_platform_status(&StubClient(Reply::Broken), true).await.unwrap_err();
    assert!(matches!(err, Error::BadRequest(_)));
}
