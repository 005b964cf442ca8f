//! HTTP Collaborator
//!
//! The reseeder fetches archives through this trait so the transport
//! stack stays out of the parsing code (and out of the tests).

use async_trait::async_trait;
use std::time::Duration;

use crate::errors::ReseedResult;

/// Fetches a URL and returns the response body
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(&self, url: &str) -> ReseedResult<Vec<u8>>;
}

/// reqwest-backed client with a generous bootstrap timeout
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Build the underlying client
    pub fn new() -> ReseedResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(&self, url: &str) -> ReseedResult<Vec<u8>> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}
