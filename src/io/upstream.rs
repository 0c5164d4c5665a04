//! Upstream telemetry source
//!
//! The engine pulls three JSON documents per cycle: firefighters,
//! beacons, and alerts. The trait is the seam for tests and simulators;
//! the HTTP implementation wraps a pooled client with a per-request
//! timeout so a dead upstream can never hang a tick.

use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

#[async_trait]
pub trait TelemetrySource: Send + Sync {
    async fn fetch_firefighters(&self) -> anyhow::Result<Value>;
    async fn fetch_beacons(&self) -> anyhow::Result<Value>;
    async fn fetch_alerts(&self) -> anyhow::Result<Value>;
}

pub struct HttpTelemetrySource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTelemetrySource {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build upstream HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn fetch(&self, path: &str) -> anyhow::Result<Value> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("upstream returned {status} for {url}");
        }
        let body = response
            .text()
            .await
            .with_context(|| format!("reading body from {url} failed"))?;
        serde_json::from_str(&body).with_context(|| format!("invalid JSON from {url}"))
    }
}

#[async_trait]
impl TelemetrySource for HttpTelemetrySource {
    async fn fetch_firefighters(&self) -> anyhow::Result<Value> {
        self.fetch("firefighters").await
    }

    async fn fetch_beacons(&self) -> anyhow::Result<Value> {
        self.fetch("beacons").await
    }

    async fn fetch_alerts(&self) -> anyhow::Result<Value> {
        self.fetch("alerts").await
    }
}
