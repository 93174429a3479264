use crate::domain::{DataSource, StatusResponse};
use anyhow::Context;

/// Plain HTTP client for the nodepool status endpoint.
pub struct NodepoolClient {
    client: reqwest::Client,
}

impl NodepoolClient {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("Failed to create the nodepool HTTP client")?;

        Ok(Self { client })
    }
}

impl DataSource for NodepoolClient {
    #[allow(clippy::manual_async_fn)]
    fn get(&self, uri: &str) -> impl Future<Output = anyhow::Result<StatusResponse>> + Send {
        async move {
            let response = self
                .client
                .get(uri)
                .send()
                .await
                .with_context(|| format!("Failed to GET [{}]", uri))?;

            let status = response.status();

            // Consuming the response releases the connection whether or not the read succeeds
            let body = response
                .bytes()
                .await
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                .map_err(|e| e.to_string());

            tracing::debug!(%uri, status = status.as_u16(), "Received nodepool response");

            Ok(StatusResponse {
                status: status.as_u16(),
                reason: status.canonical_reason().map(str::to_owned),
                body,
            })
        }
    }
}
