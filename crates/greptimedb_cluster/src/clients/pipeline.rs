use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info};

use super::{http_client, request_error};
use crate::util::errors::{Error, Result, StdError};

/// Database holding the `pipelines` system table.
const PIPELINE_DB: &str = "greptime_private";
/// Status code GreptimeDB reports for a missing table.
const TABLE_NOT_FOUND_CODE: u32 = 4001;

/// Ingestion pipeline management on a running GreptimeDB instance.
#[async_trait]
pub trait PipelineClient: Send + Sync {
    /// The stored definition, or `None` if the pipeline (or the pipelines table) does not exist yet.
    async fn get_pipeline(&self, base_url: &str, name: &str) -> Result<Option<String>>;

    async fn create_pipeline(&self, base_url: &str, name: &str, data: &str) -> Result<()>;
}

pub struct PipelineHttpClient {
    client: reqwest::Client,
}

impl PipelineHttpClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
        })
    }
}

#[derive(Deserialize, Debug, Default)]
struct SqlResponse {
    #[serde(default)]
    output: Vec<SqlOutput>,
    code: Option<u32>,
    error: Option<String>,
}

#[derive(Deserialize, Debug)]
struct SqlOutput {
    records: Option<SqlRecords>,
}

#[derive(Deserialize, Debug)]
struct SqlRecords {
    #[serde(default)]
    rows: Vec<Vec<serde_json::Value>>,
}

fn is_table_not_found(response: &SqlResponse) -> bool {
    response.code == Some(TABLE_NOT_FOUND_CODE)
        || response
            .error
            .as_deref()
            .is_some_and(|e| e.contains("TableNotFound") || e.contains("Table not found"))
}

fn pipeline_query(name: &str) -> String {
    format!(
        "SELECT pipeline FROM pipelines WHERE name = '{}' LIMIT 1",
        name.replace('\'', "''")
    )
}

/// Reads the first column of the first row, if any.
fn first_pipeline(response: SqlResponse) -> Result<Option<String>> {
    if is_table_not_found(&response) {
        return Ok(None);
    }
    if let Some(error) = response.error {
        return Err(Error::StdError(StdError::HttpError(format!(
            "pipeline lookup failed: {error}"
        ))));
    }
    Ok(response
        .output
        .into_iter()
        .filter_map(|o| o.records)
        .flat_map(|r| r.rows)
        .next()
        .and_then(|row| row.into_iter().next())
        .and_then(|value| value.as_str().map(str::to_string)))
}

#[async_trait]
impl PipelineClient for PipelineHttpClient {
    async fn get_pipeline(&self, base_url: &str, name: &str) -> Result<Option<String>> {
        let url = format!("{}/v1/sql", base_url.trim_end_matches('/'));
        debug!("Looking up pipeline '{}' via {}", name, url);
        let response = self
            .client
            .post(&url)
            .query(&[("db", PIPELINE_DB)])
            .form(&[("sql", pipeline_query(name))])
            .send()
            .await
            .map_err(|e| request_error(&url, e))?;

        // Errors come back as JSON with a non-2xx status, so decode before checking it.
        let status = response.status();
        let body: SqlResponse = response
            .json()
            .await
            .map_err(|e| Error::StdError(StdError::HttpStatusError {
                status: status.as_u16(),
                body: e.to_string(),
            }))?;
        first_pipeline(body)
    }

    async fn create_pipeline(&self, base_url: &str, name: &str, data: &str) -> Result<()> {
        let url = format!("{}/v1/events/pipelines/{}", base_url.trim_end_matches('/'), name);
        let part = Part::text(data.to_string())
            .file_name("pipeline.yaml")
            .mime_str("application/x-yaml")
            .map_err(|e| request_error(&url, e))?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| request_error(&url, e))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::StdError(StdError::HttpStatusError {
                status: status.as_u16(),
                body: format!("failed to create pipeline '{name}': {body}"),
            }));
        }
        info!("Created pipeline '{}'", name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> SqlResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_table_not_found_is_absent() {
        let response = parse(json!({
            "code": 4001,
            "error": "Failed to plan SQL: Table not found: greptime.greptime_private.pipelines",
            "execution_time_ms": 1
        }));
        assert_eq!(first_pipeline(response).unwrap(), None);
    }

    #[test]
    fn test_existing_pipeline_is_returned() {
        let response = parse(json!({
            "output": [{ "records": {
                "schema": { "column_schemas": [{ "name": "pipeline", "data_type": "String" }] },
                "rows": [["processors: []"]],
                "total_rows": 1
            }}],
            "execution_time_ms": 3
        }));
        assert_eq!(first_pipeline(response).unwrap().as_deref(), Some("processors: []"));

        let empty = parse(json!({ "output": [{ "records": { "rows": [] } }] }));
        assert_eq!(first_pipeline(empty).unwrap(), None);
    }

    #[test]
    fn test_other_sql_errors_fail() {
        let response = parse(json!({ "code": 1003, "error": "Internal error" }));
        assert!(first_pipeline(response).is_err());
    }

    #[test]
    fn test_query_quotes_name() {
        assert_eq!(
            pipeline_query("a'b"),
            "SELECT pipeline FROM pipelines WHERE name = 'a''b' LIMIT 1"
        );
    }
}
