pub mod error;

pub use error::{RenderError, Result};

use std::time::Duration;

use tracing::debug;

/// Default end-to-end budget for one page render. SECOP detail pages sit
/// behind a WAF interstitial and can take well over a minute to settle.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Client for a Browserless-style rendering service: POST a URL to
/// `/content`, get back the fully rendered HTML once the page is idle.
pub struct RenderClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl RenderClient {
    pub fn new(base_url: &str, token: Option<&str>) -> Self {
        Self::with_timeout(base_url, token, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, token: Option<&str>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
        }
    }

    /// Fetch fully-rendered HTML for a URL via the /content endpoint.
    ///
    /// Waits for DOMContentLoaded rather than network-idle: the detail
    /// pages keep long-polling trackers open and would never go idle.
    pub async fn content(&self, url: &str) -> Result<String> {
        let mut endpoint = format!("{}/content", self.base_url);
        if let Some(ref token) = self.token {
            endpoint.push_str(&format!("?token={token}"));
        }

        let body = serde_json::json!({
            "url": url,
            "gotoOptions": { "waitUntil": "domcontentloaded" },
        });

        debug!(url, "Requesting rendered content");

        let resp = self
            .client
            .post(&endpoint)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(RenderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.text().await?)
    }
}
