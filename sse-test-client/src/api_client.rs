use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::Value;

/// Calls the non-streaming endpoints of the SSE server.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(client: Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    /// Push a message; returns the server's `Succeed!` / `Error!` answer.
    pub async fn send_message(&self, client_id: &str, message: &str) -> Result<String> {
        let url = format!("{}/sse/send", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("clientId", client_id), ("message", message)])
            .send()
            .await
            .context("Failed to call /sse/send")?;

        Self::text(response).await
    }

    /// Close a connection; returns the server's `Succeed!` / `Error!` answer.
    pub async fn close(&self, client_id: &str) -> Result<String> {
        let url = format!("{}/sse/end", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("clientId", client_id)])
            .send()
            .await
            .context("Failed to call /sse/end")?;

        Self::text(response).await
    }

    pub async fn live_sessions(&self) -> Result<u64> {
        let url = format!("{}/health", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to call /health")?;

        let body: Value = response
            .json()
            .await
            .context("Failed to parse health response")?;

        body["data"]["live_sessions"]
            .as_u64()
            .context("No live_sessions in health response")
    }

    async fn text(response: reqwest::Response) -> Result<String> {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read response body".to_string());

        if !status.is_success() {
            anyhow::bail!("Request failed: {} - Response: {}", status, body);
        }

        Ok(body)
    }
}
