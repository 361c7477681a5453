use crate::http_client;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::StatusCode;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Why a page could not be fetched
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("blocked by site: {0}")]
    Blocked(String),

    #[error("fatal failure: {0}")]
    Fatal(String),
}

impl FetchError {
    /// Timeouts, stale sessions and rate limits are worth a retry on a fresh session
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::Fatal(_))
    }
}

/// Source of rendered listing pages. One instance is one browsing session.
#[async_trait]
pub trait PageFetcher: Send {
    /// Returns the page body for `url`
    async fn fetch(&mut self, url: &str) -> Result<String, FetchError>;

    /// Drops the current session (cookies, connections) and starts a fresh one
    async fn restart(&mut self) -> Result<()>;
}

/// Opens independent sessions, one per worker
pub trait FetcherFactory: Send + Sync {
    fn open(&self) -> Result<Box<dyn PageFetcher>>;
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub timeout: Duration,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            timeout: Duration::from_secs(30),
            backoff: Duration::from_millis(2000),
        }
    }
}

/// Fetch `url`, retrying retryable failures on a fresh session.
///
/// Every attempt is bounded by `policy.timeout`. `on_retry` is called with the
/// attempt number and the error that triggered it.
pub async fn fetch_with_retry<F>(
    fetcher: &mut dyn PageFetcher,
    url: &str,
    policy: &RetryPolicy,
    mut on_retry: F,
) -> Result<String, FetchError>
where
    F: FnMut(u32, &FetchError),
{
    let mut attempt = 0;
    loop {
        let result = match tokio::time::timeout(policy.timeout, fetcher.fetch(url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout),
        };

        match result {
            Ok(html) => return Ok(html),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                attempt += 1;
                tracing::warn!("Fetch of {} failed ({}), retry {}/{} on a fresh session",
                    url, e, attempt, policy.max_retries);
                on_retry(attempt, &e);

                if let Err(restart_err) = fetcher.restart().await {
                    tracing::warn!("Failed to restart session: {}", restart_err);
                }
                if !policy.backoff.is_zero() {
                    tokio::time::sleep(policy.backoff * attempt).await;
                }
            }
            Err(e) => return Err(e),
        }
    }
}

/// Politeness delay between two requests on one session: `base` plus a
/// uniformly random extra of up to `jitter`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Pacing {
    pub base: Duration,
    pub jitter: Duration,
}

impl Pacing {
    pub fn next_delay(&self) -> Duration {
        let jitter_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        self.base + Duration::from_millis(fastrand::u64(0..=jitter_ms))
    }
}

/// Markers only an anti-bot interstitial carries. Listing pages embed
/// reCAPTCHA for their contact form, so a bare "captcha" is not one.
const CHALLENGE_MARKERS: &[&str] = &[
    "cf-browser-verification",
    "cf_chl_opt",
    "/cdn-cgi/challenge-platform/",
    "<title>just a moment",
    "<title>attention required",
    "<title>access denied",
];

/// Detect anti-bot challenge pages served with a 200 status
pub fn is_challenge_page(html: &str) -> bool {
    let html_lower = html.to_lowercase();
    CHALLENGE_MARKERS.iter().any(|marker| html_lower.contains(marker))
}

/// Map an HTTP status to the fetch error taxonomy
pub fn classify_status(status: StatusCode) -> Option<FetchError> {
    if status.is_success() {
        return None;
    }
    let reason = status.to_string();
    Some(match status.as_u16() {
        403 | 429 | 503 => FetchError::Blocked(reason),
        408 | 500..=599 => FetchError::Transient(reason),
        _ => FetchError::Fatal(reason),
    })
}

#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub user_agent: String,
    pub timeout: Duration,
    pub cookies_file: Option<PathBuf>,
    pub site_url: String,
}

/// Plain-HTTP session: a reqwest client with its own cookie jar
pub struct HttpPageFetcher {
    client: reqwest::Client,
    settings: HttpSettings,
}

impl HttpPageFetcher {
    pub fn new(settings: HttpSettings) -> Result<Self> {
        let client = Self::open_session(&settings)?;
        Ok(Self { client, settings })
    }

    fn open_session(settings: &HttpSettings) -> Result<reqwest::Client> {
        let cookie_jar = Arc::new(Jar::default());

        if let Some(path) = &settings.cookies_file {
            if path.exists() {
                match http_client::load_cookies_from_file(&cookie_jar, path, &settings.site_url) {
                    Ok(count) => tracing::debug!("Session primed with {} cookies", count),
                    Err(e) => tracing::warn!("Failed to load cookies from {}: {}", path.display(), e),
                }
            }
        }

        http_client::create_http_client_with_cookies(
            &settings.user_agent,
            settings.timeout,
            Some(cookie_jar),
        )
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&mut self, url: &str) -> Result<String, FetchError> {
        if http_client::is_tracking_url(url) {
            return Err(FetchError::Fatal(format!("refusing to fetch tracking URL {}", url)));
        }

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else if e.is_builder() {
                FetchError::Fatal(e.to_string())
            } else {
                FetchError::Transient(e.to_string())
            }
        })?;

        if let Some(err) = classify_status(response.status()) {
            return Err(err);
        }

        let html = response
            .text()
            .await
            .map_err(|e| FetchError::Transient(e.to_string()))?;
        tracing::trace!("Fetched {} bytes from {}", html.len(), url);

        if is_challenge_page(&html) {
            return Err(FetchError::Blocked("challenge page served".to_string()));
        }
        Ok(html)
    }

    async fn restart(&mut self) -> Result<()> {
        tracing::debug!("Restarting HTTP session");
        self.client = Self::open_session(&self.settings)?;
        Ok(())
    }
}

pub struct HttpFetcherFactory {
    settings: HttpSettings,
}

impl HttpFetcherFactory {
    pub fn new(settings: HttpSettings) -> Self {
        Self { settings }
    }
}

impl FetcherFactory for HttpFetcherFactory {
    fn open(&self) -> Result<Box<dyn PageFetcher>> {
        Ok(Box::new(HttpPageFetcher::new(self.settings.clone())?))
    }
}
