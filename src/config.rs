use crate::crawler::CrawlSettings;
use crate::details::DetailSettings;
use crate::fetcher::{HttpSettings, Pacing, RetryPolicy};
use crate::models::Area;
use crate::scrapers::immovlan;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Result, Context};

pub const DEFAULT_CONFIG_PATH: &str = "data/config.yaml";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub areas: Vec<String>,
    #[serde(default)]
    pub areas_file: Option<PathBuf>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// -1 crawls every result page
    #[serde(default = "default_unbounded")]
    pub max_pages: i64,
    /// -1 visits every consolidated URL
    #[serde(default = "default_unbounded")]
    pub detail_limit: i64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    /// Random extra added to every politeness delay, up to this many ms
    #[serde(default = "default_request_jitter_ms")]
    pub request_jitter_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_workers")]
    pub area_workers: usize,
    #[serde(default = "default_workers")]
    pub detail_workers: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_cookies_file")]
    pub cookies_file: Option<PathBuf>,
    #[serde(default = "default_tracing_level")]
    pub tracing_level: String,
}

fn default_base_url() -> String {
    immovlan::DEFAULT_SEARCH_TEMPLATE.to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data/output")
}

fn default_unbounded() -> i64 {
    -1
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}

fn default_request_delay_ms() -> u64 {
    2000 // 2 seconds between requests
}

fn default_request_jitter_ms() -> u64 {
    1000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    2000
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_workers() -> usize {
    1
}

fn default_batch_size() -> usize {
    50
}

fn default_cookies_file() -> Option<PathBuf> {
    Some(PathBuf::from("data/cookies.json"))
}

fn default_tracing_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            areas: vec![],
            areas_file: None,
            base_url: default_base_url(),
            output_dir: default_output_dir(),
            max_pages: default_unbounded(),
            detail_limit: default_unbounded(),
            user_agent: default_user_agent(),
            request_delay_ms: default_request_delay_ms(),
            request_jitter_ms: default_request_jitter_ms(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            area_workers: default_workers(),
            detail_workers: default_workers(),
            batch_size: default_batch_size(),
            cookies_file: default_cookies_file(),
            tracing_level: default_tracing_level(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("Failed to parse {} environment variable", name))
}

impl Config {
    /// Load `path`, then apply environment overrides and validate
    pub fn load(path: &Path) -> Result<Self> {
        let config_str = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Config = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        config.apply_overrides(|name| env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Override file values with environment variables, as returned by `lookup`
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(areas) = lookup("AREAS") {
            self.areas = parse_area_list(&areas);
        }

        if let Some(areas_file) = lookup("AREAS_FILE") {
            self.areas_file = Some(PathBuf::from(areas_file));
        }

        if let Some(output_dir) = lookup("OUTPUT_DIR") {
            self.output_dir = PathBuf::from(output_dir);
        }

        if let Some(base_url) = lookup("BASE_URL") {
            self.base_url = base_url;
        }

        if let Some(max_pages) = lookup("MAX_PAGES") {
            self.max_pages = parse_env("MAX_PAGES", &max_pages)?;
        }

        if let Some(detail_limit) = lookup("DETAIL_LIMIT") {
            self.detail_limit = parse_env("DETAIL_LIMIT", &detail_limit)?;
        }

        if let Some(user_agent) = lookup("USER_AGENT") {
            self.user_agent = user_agent;
        }

        if let Some(request_delay) = lookup("REQUEST_DELAY_MS") {
            self.request_delay_ms = parse_env("REQUEST_DELAY_MS", &request_delay)?;
        }

        if let Some(jitter) = lookup("REQUEST_JITTER_MS") {
            self.request_jitter_ms = parse_env("REQUEST_JITTER_MS", &jitter)?;
        }

        if let Some(max_retries) = lookup("MAX_RETRIES") {
            self.max_retries = parse_env("MAX_RETRIES", &max_retries)?;
        }

        if let Some(timeout) = lookup("FETCH_TIMEOUT_SECS") {
            self.fetch_timeout_secs = parse_env("FETCH_TIMEOUT_SECS", &timeout)?;
        }

        if let Some(workers) = lookup("AREA_WORKERS") {
            self.area_workers = parse_env("AREA_WORKERS", &workers)?;
        }

        if let Some(workers) = lookup("DETAIL_WORKERS") {
            self.detail_workers = parse_env("DETAIL_WORKERS", &workers)?;
        }

        if let Some(batch_size) = lookup("BATCH_SIZE") {
            self.batch_size = parse_env("BATCH_SIZE", &batch_size)?;
        }

        if let Some(tracing_level) = lookup("TRACING_LEVEL") {
            self.tracing_level = tracing_level;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_pages == 0 {
            anyhow::bail!("max_pages must be positive, or -1 for no limit");
        }

        if self.area_workers == 0 || self.detail_workers == 0 {
            anyhow::bail!("area_workers and detail_workers must be at least 1");
        }

        if self.batch_size == 0 {
            anyhow::bail!("batch_size must be at least 1");
        }

        if self.fetch_timeout_secs == 0 {
            anyhow::bail!("fetch_timeout_secs must be at least 1");
        }

        Ok(())
    }

    /// Areas to crawl: the CLI list if given, else the areas file, else the inline list
    pub fn resolve_areas(&self, cli_areas: Option<&str>) -> Result<Vec<Area>> {
        let names = if let Some(list) = cli_areas {
            parse_area_list(list)
        } else if let Some(path) = &self.areas_file {
            load_areas(path)?
        } else {
            dedup_names(self.areas.iter().map(|a| a.trim().to_string()))
        };

        if names.is_empty() {
            anyhow::bail!("At least one area is required (set areas or areas_file in the config, AREAS env var, or --areas)");
        }
        Ok(names.into_iter().map(Area::new).collect())
    }

    pub fn page_limit(&self) -> Option<u32> {
        u32::try_from(self.max_pages).ok()
    }

    pub fn detail_limit(&self) -> Option<usize> {
        usize::try_from(self.detail_limit).ok()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            timeout: Duration::from_secs(self.fetch_timeout_secs),
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }

    pub fn pacing(&self) -> Pacing {
        Pacing {
            base: Duration::from_millis(self.request_delay_ms),
            jitter: Duration::from_millis(self.request_jitter_ms),
        }
    }

    pub fn http_settings(&self) -> HttpSettings {
        HttpSettings {
            user_agent: self.user_agent.clone(),
            timeout: Duration::from_secs(self.fetch_timeout_secs),
            cookies_file: self.cookies_file.clone(),
            site_url: immovlan::SITE_URL.to_string(),
        }
    }

    pub fn crawl_settings(&self) -> CrawlSettings {
        CrawlSettings {
            search_template: self.base_url.clone(),
            max_pages: self.page_limit(),
            retry: self.retry_policy(),
            pacing: self.pacing(),
        }
    }

    pub fn detail_settings(&self) -> DetailSettings {
        DetailSettings {
            retry: self.retry_policy(),
            pacing: self.pacing(),
            batch_size: self.batch_size,
            workers: self.detail_workers,
        }
    }

    pub fn create_default(path: &Path) -> Result<()> {
        // Ensure data directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let default_config = Config {
            areas: vec!["Aalst".to_string(), "Gent".to_string()],
            ..Config::default()
        };

        let config_str = serde_yaml::to_string(&default_config)?;
        fs::write(path, config_str)?;
        Ok(())
    }
}

fn dedup_names(names: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .into_iter()
        .filter(|name| !name.is_empty() && seen.insert(name.to_lowercase()))
        .collect()
}

/// Comma-separated area names, trimmed and deduplicated
pub fn parse_area_list(list: &str) -> Vec<String> {
    dedup_names(list.split(',').map(|s| s.trim().to_string()))
}

/// Read a one-column area list; blank lines, `#` comments and an
/// `area`/`town` header row are skipped.
pub fn load_areas(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open area list {}", path.display()))?;

    let mut names = Vec::new();
    for (i, row) in reader.records().enumerate() {
        let row = row.with_context(|| format!("Failed to read area list {}", path.display()))?;
        let Some(name) = row.get(0).map(str::trim) else {
            continue;
        };
        if i == 0 && matches!(name.to_lowercase().as_str(), "area" | "town") {
            continue;
        }
        names.push(name.to_string());
    }

    let names = dedup_names(names);
    tracing::debug!("Loaded {} areas from {}", names.len(), path.display());
    Ok(names)
}
