//! Sync processors
//!
//! The per-item effect behind the offline sync engine: either log the item
//! (no upstream configured) or forward it as JSON to an upstream endpoint.

use anyhow::{bail, Context};
use empire_common::Processor;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

/// HTTP client that POSTs sync payloads to an upstream endpoint
pub struct HttpForwarder {
    http_client: reqwest::Client,
    url: String,
}

impl HttpForwarder {
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("empire-sync/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http_client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// POST one payload; any non-2xx status is a failure
    pub async fn forward(&self, payload: &Value) -> anyhow::Result<()> {
        let response = self
            .http_client
            .post(&self.url)
            .json(payload)
            .send()
            .await
            .with_context(|| format!("POST {} failed", self.url))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            bail!("upstream returned {}: {}", status, error_text);
        }

        debug!(url = %self.url, status = %status, "Forwarded sync item");
        Ok(())
    }
}

/// Processor used by the sync service
pub enum SyncProcessor {
    /// Log each item and report success
    Logging,
    /// Forward each item to an upstream endpoint
    Forward(HttpForwarder),
}

impl SyncProcessor {
    /// Forwarding processor when an upstream is configured, logging otherwise
    pub fn from_upstream(upstream_url: Option<&str>, timeout: Duration) -> anyhow::Result<Self> {
        match upstream_url {
            Some(url) => Ok(SyncProcessor::Forward(HttpForwarder::new(url, timeout)?)),
            None => Ok(SyncProcessor::Logging),
        }
    }
}

impl Processor<Value> for SyncProcessor {
    async fn initialize(&self) -> anyhow::Result<()> {
        match self {
            SyncProcessor::Logging => info!("No upstream configured; sync items will be logged"),
            SyncProcessor::Forward(forwarder) => {
                info!("Sync items will be forwarded to {}", forwarder.url())
            }
        }
        Ok(())
    }

    async fn process(&self, payload: &Value) -> anyhow::Result<()> {
        match self {
            SyncProcessor::Logging => {
                info!("Syncing offline item: {}", payload);
                Ok(())
            }
            SyncProcessor::Forward(forwarder) => forwarder.forward(payload).await,
        }
    }
}
