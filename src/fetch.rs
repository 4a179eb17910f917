use std::time::Instant;

use tracing::debug;

use crate::error::{ReconError, Result};

const USER_AGENT: &str = concat!("recon_watch/", env!("CARGO_PKG_VERSION"));

/// Something that can hand back the HTML for a URL.
#[allow(async_fn_in_trait)]
pub trait PageSource {
    async fn get(&self, url: &str) -> Result<String>;
}

/// Plain HTTP GET, one request per call, no retry.
pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ReconError::Config(format!("http client: {}", e)))?;
        Ok(Self { client })
    }
}

impl PageSource for HttpSource {
    async fn get(&self, url: &str) -> Result<String> {
        let start = Instant::now();
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ReconError::network(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReconError::network(url, format!("HTTP {}", status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ReconError::network(url, e))?;
        debug!(
            "Fetched {} ({} bytes, {} ms)",
            url,
            body.len(),
            start.elapsed().as_millis()
        );
        Ok(body)
    }
}
