//! A thin REST client against a running `prime start` server, used by the
//! CLI verbs that don't need direct store access.

use anyhow::{Context, Result, bail};
use prime_core::config::AppConfig;
use serde_json::Value;

pub struct RestClient {
    base_url: String,
    client: reqwest::Client,
}

impl RestClient {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            base_url: format!("http://{}:{}", config.rest.host, config.rest.port),
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .expect("static reqwest client config is always valid"),
        }
    }

    pub fn gateway_ws_url(config: &AppConfig) -> String {
        format!("ws://{}:{}/ws/events", config.gateway.host, config.gateway.port)
    }

    pub async fn healthz(&self) -> Result<Value> {
        self.get("/healthz").await
    }

    pub async fn get(&self, path: &str) -> Result<Value> {
        let url = format!("{}{path}", self.base_url);
        let resp = self.client.get(&url).send().await.with_context(|| format!("GET {url}"))?;
        self.into_json(resp).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<Value> {
        let url = format!("{}{path}", self.base_url);
        let resp = self.client.post(&url).json(&body).send().await.with_context(|| format!("POST {url}"))?;
        self.into_json(resp).await
    }

    async fn into_json(&self, resp: reqwest::Response) -> Result<Value> {
        let status = resp.status();
        let body: Value = resp.json().await.context("failed to parse response body as JSON")?;
        if !status.is_success() {
            bail!("server responded {status}: {body}");
        }
        Ok(body)
    }
}
