use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use super::{ensure_success, http_client, request_error};
use crate::util::errors::Result;

/// Admin endpoints of a running metasrv.
#[async_trait]
pub trait MetaAdmin: Send + Sync {
    async fn set_maintenance_mode(&self, meta_url: &str, enable: bool) -> Result<()>;
}

pub struct MetaAdminClient {
    client: reqwest::Client,
}

impl MetaAdminClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
        })
    }
}

#[async_trait]
impl MetaAdmin for MetaAdminClient {
    async fn set_maintenance_mode(&self, meta_url: &str, enable: bool) -> Result<()> {
        let url = format!("{}/admin/maintenance?enable={}", meta_url.trim_end_matches('/'), enable);
        info!("Setting maintenance mode to {} via {}", enable, url);
        let response = self.client.get(&url).send().await.map_err(|e| request_error(&url, e))?;
        ensure_success(response).await?;
        Ok(())
    }
}
