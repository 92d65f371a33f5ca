use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::CvAnalyzerConfig;

/// External CV analysis collaborator. `None` means the CV could not be
/// analyzed (unreachable, timed out, or rejected the document).
#[async_trait]
pub trait CvAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        body: Bytes,
        filename: &str,
        content_type: &str,
    ) -> Option<serde_json::Value>;
}

#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    data: Option<serde_json::Value>,
}

pub struct HttpCvAnalyzer {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpCvAnalyzer {
    pub fn new(cfg: &CvAnalyzerConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/analyze/", cfg.base_url.trim_end_matches('/')),
            api_key: cfg.api_key.clone(),
        })
    }
}

#[async_trait]
impl CvAnalyzer for HttpCvAnalyzer {
    async fn analyze(
        &self,
        body: Bytes,
        filename: &str,
        content_type: &str,
    ) -> Option<serde_json::Value> {
        let part = match Part::bytes(body.to_vec())
            .file_name(filename.to_string())
            .mime_str(content_type)
        {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, content_type, "cv analysis: bad content type");
                return None;
            }
        };
        let mut req = self
            .client
            .post(&self.endpoint)
            .multipart(Form::new().part("file", part));
        if let Some(key) = &self.api_key {
            req = req.header("X-API-Key", key);
        }

        let res = match req.send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, timeout = e.is_timeout(), "cv analyzer unreachable");
                return None;
            }
        };
        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            warn!(%status, body = %text, "cv analyzer rejected document");
            return None;
        }
        match res.json::<AnalyzeResponse>().await {
            Ok(parsed) => {
                debug!(filename, "cv analyzed");
                parsed.data
            }
            Err(e) => {
                warn!(error = %e, "cv analyzer returned malformed body");
                None
            }
        }
    }
}
