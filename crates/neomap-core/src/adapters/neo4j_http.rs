use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::config::BackendConfig;
use crate::data::{
    errors::{BackendError, CoreError},
    rows::{Row, RowSet},
    types::{DataPacket, Properties},
};
use crate::services::transactions::Statement;
use crate::traits::GraphBackend;

/// `GraphBackend` over the Neo4j transactional HTTP endpoint.
///
/// Each batch goes to `<endpoint>/commit` in a single request, so Neo4j opens,
/// runs and commits the transaction in one round trip and rolls it back as a
/// whole if any statement fails.
#[derive(Debug, Clone)]
pub struct Neo4jHttpBackend {
    config: BackendConfig,
    client: Client,
}

#[derive(Debug, Serialize)]
struct CommitRequest<'a> {
    statements: Vec<StatementPayload<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatementPayload<'a> {
    statement: &'a str,
    parameters: &'a Properties,
    result_data_contents: [&'static str; 1],
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    errors: Vec<Neo4jError>,
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    columns: Vec<String>,
    #[serde(default)]
    data: Vec<RowData>,
}

#[derive(Debug, Deserialize)]
struct RowData {
    row: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Neo4jError {
    code: String,
    message: String,
}

impl Neo4jHttpBackend {
    pub fn new(config: BackendConfig) -> Result<Self, CoreError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CoreError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    fn map_http_error(&self, error: reqwest::Error) -> BackendError {
        if error.is_timeout() {
            BackendError::Timeout(format!("Request timeout: {}", error))
        } else if error.is_connect() {
            BackendError::Connection(format!("Connection error: {}", error))
        } else {
            BackendError::Connection(format!("HTTP error: {}", error))
        }
    }

    /// Flattens every statement's result into one row-set, in statement order.
    fn into_rows(response: CommitResponse) -> Result<RowSet, BackendError> {
        if let Some(error) = response.errors.into_iter().next() {
            return Err(BackendError::Query {
                code: error.code,
                message: error.message,
            });
        }

        let mut rows = RowSet::new();
        for result in response.results {
            for data in result.data {
                if data.row.len() != result.columns.len() {
                    return Err(BackendError::Malformed(format!(
                        "row has {} values for {} columns",
                        data.row.len(),
                        result.columns.len()
                    )));
                }
                let row: Row = result
                    .columns
                    .iter()
                    .cloned()
                    .zip(data.row.into_iter().map(DataPacket::from))
                    .collect();
                rows.push(row);
            }
        }
        Ok(rows)
    }
}

#[async_trait]
impl GraphBackend for Neo4jHttpBackend {
    #[instrument(skip(self, statements), fields(statements = statements.len()))]
    async fn commit(&self, statements: &[Statement]) -> Result<RowSet, BackendError> {
        let url = self.config.commit_url();
        let request = CommitRequest {
            statements: statements
                .iter()
                .map(|s| StatementPayload {
                    statement: &s.cypher,
                    parameters: &s.parameters,
                    result_data_contents: ["row"],
                })
                .collect(),
        };
        debug!(url = %url, "Posting transaction batch");

        let mut builder = self.client.post(&url).json(&request);
        if let Some(username) = &self.config.username {
            builder = builder.basic_auth(username, self.config.password.as_ref());
        }

        let response = builder.send().await.map_err(|e| self.map_http_error(e))?;

        match response.status() {
            status if status.is_success() => {
                let body: CommitResponse = response
                    .json()
                    .await
                    .map_err(|e| BackendError::Malformed(format!("Failed to parse response: {}", e)))?;
                let rows = Self::into_rows(body)?;
                debug!(rows = rows.len(), "Transaction committed");
                Ok(rows)
            }
            status @ (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
                warn!(status = %status, "Neo4j rejected the credentials");
                Err(BackendError::Connection(format!("Authentication failed: {}", status)))
            }
            status if status.is_server_error() => {
                let body = response.text().await.unwrap_or_default();
                Err(BackendError::Connection(format!("Server error {}: {}", status, body)))
            }
            status => {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| format!("HTTP error: {}", status));
                Err(BackendError::Query {
                    code: status.as_u16().to_string(),
                    message: body,
                })
            }
        }
    }
}
