//! Fetch-proxy transport.
//!
//! Pages are never fetched directly: every URL goes through the Jina reader
//! proxy, which renders it and returns markdown with a short metadata
//! header. The rest of the crate only depends on [`Transport`].

use crate::config::SiteConfig;
use crate::error::{NewsfeedError, Result};
use rand::{Rng, rng};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};

const JINA_READER_URL: &str = "https://r.jina.ai/";
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);
const RETRY_MAX_DELAY: Duration = Duration::from_secs(10);

/// Something that turns a page URL into rendered markdown.
///
/// Implementations return an error for non-2xx responses. Rate limiting is
/// the caller's job.
pub trait Transport {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String>> + Send;
}

/// URL of listing page `page`. Page 1 (or lower) is the bare listing URL;
/// later pages append the template with `{n}` replaced by the page number.
pub fn build_listing_url(listing_url: &str, page: u32, template: &str) -> String {
    if page <= 1 {
        return listing_url.to_string();
    }
    format!("{listing_url}{}", template.replace("{n}", &page.to_string()))
}

/// Proxy client for one source.
///
/// Connection-level failures (refused, reset, timed out) are retried up to
/// `max_retries` times with exponential backoff and jitter. HTTP error
/// statuses are returned immediately.
#[derive(Debug, Clone)]
pub struct JinaClient {
    http: reqwest::Client,
    api_key: Option<String>,
    proxy_url: String,
    max_retries: u32,
}

impl JinaClient {
    pub fn new(config: &SiteConfig, api_key: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("newsfeed/", env!("CARGO_PKG_VERSION")))
            .timeout(FETCH_TIMEOUT)
            .danger_accept_invalid_certs(!config.verify_ssl)
            .build()?;
        Ok(Self {
            http,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            proxy_url: JINA_READER_URL.to_string(),
            max_retries: config.max_retries,
        })
    }

    /// Route requests through a different proxy root.
    pub fn with_proxy_url(mut self, proxy_url: impl Into<String>) -> Self {
        self.proxy_url = proxy_url.into();
        self
    }

    fn proxied(&self, url: &str) -> String {
        format!("{}{url}", self.proxy_url)
    }

    async fn get_once(&self, proxied: &str) -> Result<String> {
        let mut req = self.http.get(proxied);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(NewsfeedError::Status {
                status: status.as_u16(),
                url: proxied.to_string(),
            });
        }
        Ok(resp.text().await?)
    }
}

fn is_connection_error(e: &NewsfeedError) -> bool {
    matches!(e, NewsfeedError::Http(inner) if inner.is_connect() || inner.is_timeout())
}

impl Transport for JinaClient {
    #[instrument(level = "info", skip_all, fields(%url))]
    async fn fetch(&self, url: &str) -> Result<String> {
        let proxied = self.proxied(url);
        let total_t0 = Instant::now();
        let mut attempt = 0u32;

        loop {
            match self.get_once(&proxied).await {
                Ok(body) => {
                    debug!(
                        chars = body.len(),
                        elapsed_ms = total_t0.elapsed().as_millis(),
                        "Fetched"
                    );
                    return Ok(body);
                }
                Err(e) if is_connection_error(&e) && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = RETRY_BASE_DELAY
                        .saturating_mul(2u32.saturating_pow(attempt - 1))
                        .min(RETRY_MAX_DELAY);
                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = delay + Duration::from_millis(jitter_ms);
                    warn!(
                        attempt,
                        max = self.max_retries,
                        ?delay,
                        error = %e,
                        "Proxy connection failed; backing off"
                    );
                    sleep(delay).await;
                }
                Err(e) => {
                    error!(
                        attempt,
                        elapsed_ms = total_t0.elapsed().as_millis(),
                        error = %e,
                        "Proxy fetch failed"
                    );
                    return Err(e);
                }
            }
        }
    }
}
