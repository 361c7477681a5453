use anyhow::{Context, Result};
use reqwest::{cookie::Jar, header, Client};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Ad, analytics and tracking hosts; nothing on these is ever fetched or
/// counted as a listing.
pub const BLOCKED_DOMAINS: &[&str] = &[
    "doubleclick.net",
    "googletagmanager.com",
    "google-analytics.com",
    "smartadserver.com",
    "optimizely.com",
    "facebook.net",
    "adsafeprotected.com",
    "pubmatic.com",
    "adservice.google.com",
    "adservice.google.be",
    "pagead2.googlesyndication.com",
    "securepubads.g.doubleclick.net",
    "api-image.immovlan.be",
    "xiti.com",
    "privacy-center.com",
    "accounts.google.com",
];

/// Path segments used by redirect / click-through endpoints
const REDIRECT_SEGMENTS: &[&str] = &["redirect", "click", "track", "ads", "adclick"];

/// True if the URL points at a tracking host or a redirect/click endpoint.
/// Unparseable URLs are treated as tracking noise.
pub fn is_tracking_url(raw: &str) -> bool {
    let Ok(parsed) = url::Url::parse(raw) else {
        return true;
    };

    let host = parsed.host_str().unwrap_or("").to_lowercase();
    let blocked_host = BLOCKED_DOMAINS
        .iter()
        .any(|domain| host == *domain || host.ends_with(&format!(".{}", domain)));
    if blocked_host {
        return true;
    }

    parsed
        .path_segments()
        .map(|mut segments| {
            segments.any(|segment| REDIRECT_SEGMENTS.contains(&segment.to_lowercase().as_str()))
        })
        .unwrap_or(false)
}

/// Creates an HTTP client configured to look like a regular browser session
pub fn create_http_client(user_agent: &str, timeout: Duration) -> Result<Client> {
    create_http_client_with_cookies(user_agent, timeout, None)
}

/// Creates an HTTP client with optional cookie jar for cookie persistence
pub fn create_http_client_with_cookies(
    user_agent: &str,
    timeout: Duration,
    cookie_jar: Option<Arc<Jar>>,
) -> Result<Client> {
    let mut headers = header::HeaderMap::new();

    // Standard browser headers to look more like a real browser
    headers.insert(
        header::ACCEPT,
        header::HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8")
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        header::HeaderValue::from_static("en-US,en;q=0.9,nl;q=0.8,fr;q=0.7")
    );
    headers.insert(
        header::ACCEPT_ENCODING,
        header::HeaderValue::from_static("gzip, deflate, br")
    );
    headers.insert(header::DNT, header::HeaderValue::from_static("1"));
    headers.insert(
        "Upgrade-Insecure-Requests",
        header::HeaderValue::from_static("1")
    );
    headers.insert("Sec-Fetch-Dest", header::HeaderValue::from_static("document"));
    headers.insert("Sec-Fetch-Mode", header::HeaderValue::from_static("navigate"));
    headers.insert("Sec-Fetch-Site", header::HeaderValue::from_static("none"));

    let mut builder = Client::builder()
        .user_agent(user_agent)
        .default_headers(headers)
        .timeout(timeout);

    // Add cookie jar if provided, otherwise create a new one
    if let Some(jar) = cookie_jar {
        builder = builder.cookie_provider(jar);
    } else {
        builder = builder.cookie_store(true);
    }

    let client = builder.build().context("Failed to build HTTP client")?;

    Ok(client)
}

/// Load cookies from a JSON file exported from a browser into `jar`.
///
/// Expected format: array of objects with at least "name" and "value".
/// A pre-accepted consent cookie keeps the cookie banner from coming back.
pub fn load_cookies_from_file(jar: &Jar, path: &Path, site_url: &str) -> Result<usize> {
    let cookie_data = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read cookies file {}", path.display()))?;
    let cookies: Vec<serde_json::Value> = serde_json::from_str(&cookie_data)
        .with_context(|| format!("Failed to parse cookies file {}", path.display()))?;

    let parsed = url::Url::parse(site_url)
        .with_context(|| format!("Invalid site URL: {}", site_url))?;
    let base = format!("{}://{}", parsed.scheme(), parsed.host_str().unwrap_or(""));
    let cookie_url = base.parse::<reqwest::Url>()?;

    let mut loaded_count = 0;
    for cookie in &cookies {
        if let (Some(name), Some(value)) = (
            cookie.get("name").and_then(|v| v.as_str()),
            cookie.get("value").and_then(|v| v.as_str()),
        ) {
            jar.add_cookie_str(&format!("{}={}", name, value), &cookie_url);
            tracing::trace!("Loaded cookie: {}", name);
            loaded_count += 1;
        }
    }

    tracing::debug!("Loaded {} cookies from {}", loaded_count, path.display());
    Ok(loaded_count)
}
