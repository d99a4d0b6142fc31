//! reqwest implementation of [`PackBackend`].

use std::time::Duration;

use async_trait::async_trait;
use context_pack_types::{
    CancelAck, CreditCheck, PackDetail, StartAnalysisAck, StartAnalysisRequest,
};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;

use crate::backend::PackBackend;
use crate::config::ClientConfig;
use crate::error::ClientError;

pub struct HttpBackend {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpBackend {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("context-pack/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ClientError::Builder)?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn pack_url(&self, pack_id: &str, suffix: &str) -> String {
        format!(
            "{}/api/packs/{}{suffix}",
            self.config.base_url,
            urlencoding::encode(pack_id)
        )
    }

    fn source_url(&self, source_id: &str, suffix: &str) -> String {
        format!(
            "{}/api/sources/{}{suffix}",
            self.config.base_url,
            urlencoding::encode(source_id)
        )
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder.header("Accept", "application/json");
        match &self.config.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(
        &self,
        builder: RequestBuilder,
        url: &str,
        timeout: Duration,
    ) -> Result<reqwest::Response, ClientError> {
        let resp = self
            .authed(builder)
            .send()
            .await
            .map_err(|e| ClientError::network(url, timeout, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        url: &str,
    ) -> Result<T, ClientError> {
        let timeout = self.config.request_timeout;
        let resp = self.send(builder, url, timeout).await?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ClientError::network(url, timeout, e))?;
        serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl PackBackend for HttpBackend {
    async fn pack_detail(&self, pack_id: &str) -> Result<PackDetail, ClientError> {
        let url = self.pack_url(pack_id, "");
        self.send_json(self.client.get(&url), &url).await
    }

    async fn credit_check(&self, source_id: &str) -> Result<CreditCheck, ClientError> {
        let url = self.source_url(source_id, "/credit-check");
        self.send_json(self.client.get(&url), &url).await
    }

    async fn start_analysis(
        &self,
        source_id: &str,
        max_chunks: Option<u32>,
    ) -> Result<StartAnalysisAck, ClientError> {
        let url = self.source_url(source_id, "/start-analysis");
        let body = StartAnalysisRequest { max_chunks };
        let ack: StartAnalysisAck = self
            .send_json(self.client.post(&url).json(&body), &url)
            .await?;
        tracing::debug!(
            source_id,
            ?max_chunks,
            job_id = ack.job_id.as_deref().unwrap_or(""),
            "start-analysis acknowledged"
        );
        Ok(ack)
    }

    async fn cancel(&self, source_id: &str) -> Result<CancelAck, ClientError> {
        let url = self.source_url(source_id, "/cancel");
        self.send_json(self.client.post(&url), &url).await
    }

    async fn download_pack(&self, pack_id: &str) -> Result<String, ClientError> {
        let url = self.pack_url(pack_id, "/download");
        let timeout = self.config.download_timeout;
        let request = async {
            let resp = self
                .send(self.client.get(&url).timeout(timeout), &url, timeout)
                .await?;
            resp.text()
                .await
                .map_err(|e| ClientError::network(&url, timeout, e))
        };
        // Abort the whole transfer, body included, at the deadline.
        let outcome = tokio::time::timeout(timeout, request).await;
        match outcome {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(%url, timeout_secs = timeout.as_secs(), "pack download timed out");
                Err(ClientError::Timeout { url, timeout })
            }
        }
    }
}
