use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{ensure_success, http_client, request_error};
use crate::util::errors::{Error, Result, StdError};

/// The subset of the etcd `StatusResponse` the meta pre-sync hook looks at.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EtcdStatus {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub errors: Vec<String>,
}

#[async_trait]
pub trait EtcdMaintenance: Send + Sync {
    async fn status(&self, endpoint: &str) -> Result<EtcdStatus>;
}

/// Talks to the etcd v3 JSON gateway.
pub struct EtcdMaintenanceClient {
    client: reqwest::Client,
}

impl EtcdMaintenanceClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
        })
    }
}

fn status_url(endpoint: &str) -> String {
    let endpoint = endpoint.trim_end_matches('/');
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        format!("{endpoint}/v3/maintenance/status")
    } else {
        format!("http://{endpoint}/v3/maintenance/status")
    }
}

#[async_trait]
impl EtcdMaintenance for EtcdMaintenanceClient {
    async fn status(&self, endpoint: &str) -> Result<EtcdStatus> {
        let url = status_url(endpoint);
        let response = self
            .client
            .post(&url)
            .json(&json!({}))
            .send()
            .await
            .map_err(|e| request_error(&url, e))?;
        let response = ensure_success(response).await?;
        response
            .json::<EtcdStatus>()
            .await
            .map_err(|e| Error::StdError(StdError::EtcdServiceError(format!("bad status response from {url}: {e}"))))
    }
}

/// Fails unless every endpoint answers with an empty `errors` list.
pub async fn check_etcd_service(etcd: &dyn EtcdMaintenance, endpoints: &[String]) -> Result<()> {
    if endpoints.is_empty() {
        return Err(Error::StdError(StdError::EtcdServiceError(
            "no etcd endpoints configured".to_string(),
        )));
    }
    for endpoint in endpoints {
        let status = etcd.status(endpoint).await?;
        if !status.errors.is_empty() {
            return Err(Error::StdError(StdError::EtcdServiceError(format!(
                "etcd service error: {:?}",
                status.errors
            ))));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::fakes::FakeEtcd;

    #[test]
    fn test_status_url() {
        assert_eq!(
            status_url("etcd.default:2379"),
            "http://etcd.default:2379/v3/maintenance/status"
        );
        assert_eq!(
            status_url("https://etcd:2379/"),
            "https://etcd:2379/v3/maintenance/status"
        );
    }

    #[test]
    fn test_status_response_deserializes() {
        let status: EtcdStatus = serde_json::from_value(json!({
            "header": { "cluster_id": "1" },
            "version": "3.5.9",
            "dbSize": "20480",
            "errors": ["NOSPACE"]
        }))
        .unwrap();
        assert_eq!(status.errors, vec!["NOSPACE"]);
    }

    #[tokio::test]
    async fn test_errors_fail_the_check() {
        let endpoints = vec!["etcd:2379".to_string()];
        assert!(check_etcd_service(&FakeEtcd::healthy(), &endpoints).await.is_ok());

        let err = check_etcd_service(&FakeEtcd::with_errors(&["NOSPACE"]), &endpoints)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("NOSPACE"));
        assert!(!err.is_transient());
    }
}
