//! [`HttpClient`] backed by `reqwest`.

use crate::http::{HttpClient, HttpResponse};
use async_trait::async_trait;

/// A real network client.
#[derive(Debug, Clone, Default)]
pub struct ReqwestClient {
    inner: reqwest::Client,
}

impl ReqwestClient {
    /// Creates a client with reqwest's defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a preconfigured reqwest client (proxies, TLS roots, ...).
    pub fn with_client(inner: reqwest::Client) -> Self {
        Self { inner }
    }

    async fn finish(response: reqwest::Response) -> Result<HttpResponse, String> {
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| e.to_string())?;
        Ok(HttpResponse::new(status, body.to_vec()))
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(&self, url: &str, bearer: &str) -> Result<HttpResponse, String> {
        let response = self
            .inner
            .get(url)
            .bearer_auth(bearer)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        Self::finish(response).await
    }

    async fn post(&self, url: &str, bearer: &str, body: Vec<u8>) -> Result<HttpResponse, String> {
        let response = self
            .inner
            .post(url)
            .bearer_auth(bearer)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        Self::finish(response).await
    }
}
