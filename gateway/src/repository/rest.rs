//! Hosted Store
//!
//! [`Gateway`] over a PostgREST-style HTTP endpoint (`{base}/rest/v1/{table}`),
//! the interface exposed by hosted Postgres services.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use tokio::sync::RwLock;

use super::traits::Gateway;
use crate::domain::{GatewayError, GatewayResult, Query, Row, Table};

/// HTTP client for a hosted relational store
pub struct RestGateway {
    client: Client,
    base_url: String,
    api_key: String,
    /// Bearer token of the signed-in user; the anon key is used when absent
    access_token: RwLock<Option<String>>,
}

impl RestGateway {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> GatewayResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| GatewayError::Transport(format!("Failed to build client: {}", e)))?;
        Ok(Self::with_client(client, base_url, api_key))
    }

    /// Use a preconfigured client (timeouts, proxies, TLS roots)
    pub fn with_client(
        client: Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            access_token: RwLock::new(None),
        }
    }

    /// Replace the bearer token sent with every request
    pub async fn set_access_token(&self, token: Option<String>) {
        *self.access_token.write().await = token;
    }

    fn table_url(&self, table: Table) -> String {
        format!("{}/rest/v1/{}", self.base_url, table.as_str())
    }

    async fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        let token = self.access_token.read().await;
        let bearer = token.as_deref().unwrap_or(&self.api_key);
        builder
            .header("apikey", &self.api_key)
            .bearer_auth(bearer)
            .header("Accept", "application/json")
    }

    async fn send(&self, builder: RequestBuilder) -> GatewayResult<Response> {
        let response = self.request(builder).await.send().await.map_err(map_reqwest_err)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(map_status(status, body))
    }
}

/// `select`, filters and ordering as PostgREST query parameters
pub fn query_params(query: &Query) -> Vec<(String, String)> {
    let mut params = vec![("select".to_string(), "*".to_string())];
    for filter in &query.filters {
        params.push((filter.column.clone(), format!("eq.{}", render_value(&filter.value))));
    }
    if let Some(order) = &query.order {
        params.push((
            "order".to_string(),
            format!("{}.{}", order.column, order.direction.as_rest()),
        ));
    }
    params
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn id_filter(id: &str) -> [(&'static str, String); 1] {
    [("id", format!("eq.{}", id))]
}

async fn decode_rows(response: Response) -> GatewayResult<Vec<Row>> {
    let body: Value = response
        .json()
        .await
        .map_err(|e| GatewayError::Decode(e.to_string()))?;
    match body {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(row) => Ok(row),
                other => Err(GatewayError::Decode(format!("expected object, got {}", other))),
            })
            .collect(),
        other => Err(GatewayError::Decode(format!("expected array, got {}", other))),
    }
}

#[async_trait]
impl Gateway for RestGateway {
    async fn select(&self, table: Table, query: &Query) -> GatewayResult<Vec<Row>> {
        let builder = self
            .client
            .get(self.table_url(table))
            .query(&query_params(query));
        let response = self.send(builder).await?;
        decode_rows(response).await
    }

    async fn insert(&self, table: Table, rows: Vec<Row>) -> GatewayResult<Vec<Row>> {
        let body = Value::Array(rows.into_iter().map(Value::Object).collect());
        let builder = self
            .client
            .post(self.table_url(table))
            .query(&[("select", "*")])
            .header("Prefer", "return=representation")
            .json(&body);
        let response = self.send(builder).await?;
        decode_rows(response).await
    }

    async fn update(&self, table: Table, id: &str, patch: Row) -> GatewayResult<Row> {
        let builder = self
            .client
            .patch(self.table_url(table))
            .query(&id_filter(id))
            .header("Prefer", "return=representation")
            .json(&Value::Object(patch));
        let response = self.send(builder).await?;
        decode_rows(response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::NotFound(format!("{}/{}", table, id)))
    }

    async fn delete(&self, table: Table, id: &str) -> GatewayResult<()> {
        let builder = self.client.delete(self.table_url(table)).query(&id_filter(id));
        self.send(builder).await?;
        Ok(())
    }
}

fn map_reqwest_err(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Transport(e.to_string())
    }
}

fn map_status(status: StatusCode, body: String) -> GatewayError {
    let detail = if body.is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, body)
    };
    match status {
        StatusCode::NOT_FOUND | StatusCode::NOT_ACCEPTABLE => GatewayError::NotFound(detail),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => GatewayError::Timeout,
        StatusCode::TOO_MANY_REQUESTS => GatewayError::Transport(detail),
        s if s.is_server_error() => GatewayError::Transport(detail),
        _ => GatewayError::Rejected(detail),
    }
}
