use anyhow::{Context, Result};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;

use crate::config::TransportConfig;

/// Status code and raw body of one HTTP exchange. The body is kept as text so
/// callers decide how to treat empty or malformed payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_blank(&self) -> bool {
        self.body.trim().is_empty()
    }
}

/// Errors returned here are transport failures (connect, timeout, body read);
/// non-success statuses come back as an `HttpReply`.
pub trait HttpTransport: Send + Sync {
    fn post_json(&self, url: &str, bearer: &str, body: &Value) -> Result<HttpReply>;
    fn get(&self, url: &str, bearer: &str) -> Result<HttpReply>;
}

pub struct ReqwestTransport {
    http: HttpClient,
}

impl ReqwestTransport {
    pub fn new(config: TransportConfig) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(config.request_timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { http })
    }
}

impl HttpTransport for ReqwestTransport {
    fn post_json(&self, url: &str, bearer: &str, body: &Value) -> Result<HttpReply> {
        let response = self
            .http
            .post(url)
            .bearer_auth(bearer)
            .header(CONTENT_TYPE, "application/json")
            .json(body)
            .send()
            .with_context(|| format!("POST request failed ({url})"))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .with_context(|| format!("response body read failed ({url})"))?;
        Ok(HttpReply { status, body })
    }

    fn get(&self, url: &str, bearer: &str) -> Result<HttpReply> {
        let response = self
            .http
            .get(url)
            .bearer_auth(bearer)
            .send()
            .with_context(|| format!("GET request failed ({url})"))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .with_context(|| format!("response body read failed ({url})"))?;
        Ok(HttpReply { status, body })
    }
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
