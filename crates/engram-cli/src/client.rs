//! Thin HTTP client for the engram daemon

use serde_json::Value;

use crate::error::{CliError, CliResult};

pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub async fn get(&self, path: &str) -> CliResult<Value> {
        let response = self.http.get(self.url(path)).send().await?;
        Self::into_json(response).await
    }

    pub async fn post(&self, path: &str, body: Option<Value>) -> CliResult<Value> {
        let mut request = self.http.post(self.url(path));
        if let Some(body) = body {
            request = request.json(&body);
        }
        Self::into_json(request.send().await?).await
    }

    pub async fn put(&self, path: &str, body: Value) -> CliResult<Value> {
        let response = self.http.put(self.url(path)).json(&body).send().await?;
        Self::into_json(response).await
    }

    pub async fn delete(&self, path: &str) -> CliResult<Value> {
        let response = self.http.delete(self.url(path)).send().await?;
        Self::into_json(response).await
    }

    async fn into_json(response: reqwest::Response) -> CliResult<Value> {
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);

        if status.is_success() {
            return Ok(body);
        }

        let message = body
            .pointer("/error/message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Server returned {status}"));
        Err(CliError(message))
    }
}
