mod accumulator;
mod area_log;
mod config;
mod consolidator;
mod crawler;
mod details;
mod exporter;
mod fetcher;
mod http_client;
mod models;
mod pipeline;
mod scrapers;
mod tracker;

use anyhow::Result;
use clap::Parser;
use config::{Config, DEFAULT_CONFIG_PATH};
use fetcher::{classify_status, is_challenge_page, HttpFetcherFactory};
use models::RunContext;
use pipeline::{Pipeline, Stage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "immoharvest")]
#[command(about = "Crawls real-estate listings per area into a deduplicated dataset", long_about = None)]
struct Args {
    /// Path to the YAML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Pipeline stage(s) to run
    #[arg(long, value_enum, default_value = "all")]
    stage: Stage,

    /// Comma-separated areas, overriding the configured list
    #[arg(long)]
    areas: Option<String>,

    /// Resume an earlier run instead of starting a new one
    #[arg(long)]
    run_id: Option<String>,

    /// Maximum result pages per area (-1 for no limit)
    #[arg(long, allow_hyphen_values = true)]
    max_pages: Option<i64>,

    /// Maximum listings to extract (-1 for no limit)
    #[arg(long, allow_hyphen_values = true)]
    limit: Option<i64>,

    /// Test URL fetching - fetch and print HTML from a URL
    #[arg(long)]
    test_url: Option<String>,

    /// Save HTML to file when using --test-url
    #[arg(long)]
    save_html: Option<String>,
}

fn init_tracing(tracing_level: &str) {
    // Initialize logging - use RUST_LOG env var if set, otherwise use config
    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .init();
        tracing::info!("Logging level set from RUST_LOG environment variable");
    } else {
        let level = tracing_level.to_lowercase();
        let max_level = match level.as_str() {
            "trace" => tracing::Level::TRACE,
            "debug" => tracing::Level::DEBUG,
            "info" => tracing::Level::INFO,
            "warn" => tracing::Level::WARN,
            "error" => tracing::Level::ERROR,
            _ => {
                eprintln!("Invalid tracing level '{}', using 'info'", level);
                tracing::Level::INFO
            }
        };

        tracing_subscriber::fmt()
            .with_max_level(max_level)
            .init();

        tracing::info!("Logging level set to: {} (from config)", level);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    // Handle test-url command
    if let Some(url) = &args.test_url {
        return test_url_fetch(url, &config_path, args.save_html.as_deref()).await;
    }

    // Load or create config first (before logging is initialized)
    if !config_path.exists() {
        eprintln!("No config file found, creating default {}", config_path.display());
        Config::create_default(&config_path)?;
        anyhow::bail!("Please edit {} with your areas and run again", config_path.display());
    }
    let mut config = Config::load(&config_path)?;

    init_tracing(&config.tracing_level);

    if let Some(max_pages) = args.max_pages {
        config.max_pages = max_pages;
    }
    if let Some(limit) = args.limit {
        config.detail_limit = limit;
    }
    config.validate()?;

    let areas = if args.stage.crawls() {
        config.resolve_areas(args.areas.as_deref())?
    } else {
        vec![]
    };

    let run = match args.run_id {
        Some(run_id) => {
            tracing::info!("Resuming run {}", run_id);
            RunContext::with_run_id(&config.output_dir, run_id)
        }
        None => RunContext::new(&config.output_dir),
    };

    tracing::info!("Starting immoharvest run {} ({:?} stage)", run.run_id, args.stage);
    if !areas.is_empty() {
        tracing::info!("Areas: {}", areas.iter().map(|a| a.name.as_str()).collect::<Vec<_>>().join(", "));
    }

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current fetches");
            signal_cancel.cancel();
        }
    });

    let detail_limit = config.detail_limit();
    let factory = Arc::new(HttpFetcherFactory::new(config.http_settings()));
    let pipeline = Pipeline::new(config, factory, run, cancel);

    let report = pipeline.run(args.stage, &areas, detail_limit).await?;

    tracing::info!("Run finished\n{}", report);
    println!("{}", report);
    Ok(())
}

/// Test URL fetching - downloads and prints HTML response
async fn test_url_fetch(url: &str, config_path: &Path, save_path: Option<&str>) -> Result<()> {
    println!("Testing URL fetch: {}", url);
    println!("{}", "=".repeat(80));

    // Try to load config for user agent, otherwise use defaults
    let config = Config::load(config_path).unwrap_or_default();
    let settings = config.http_settings();

    println!("User-Agent: {}", settings.user_agent);

    if http_client::is_tracking_url(url) {
        println!("Refusing to fetch {}: tracking or ad URL", url);
        return Ok(());
    }

    // Same client setup as the crawler's sessions
    let client = match settings.cookies_file.as_deref().filter(|path| path.exists()) {
        Some(path) => {
            println!("Loading cookies from {}...", path.display());
            let cookie_jar = Arc::new(reqwest::cookie::Jar::default());
            let loaded_count = http_client::load_cookies_from_file(&cookie_jar, path, &settings.site_url)?;
            println!("Loaded {} cookies", loaded_count);
            http_client::create_http_client_with_cookies(&settings.user_agent, settings.timeout, Some(cookie_jar))?
        }
        None => {
            println!("No cookies file found - continuing without cookies");
            http_client::create_http_client(&settings.user_agent, settings.timeout)?
        }
    };

    println!("Sending request...");
    let response = client.get(url).send().await?;

    let status = response.status();
    println!("Status: {}", status);
    if let Some(err) = classify_status(status) {
        println!("Classified as: {}", err);
    }
    println!("\nResponse Headers:");
    for (name, value) in response.headers() {
        println!("  {}: {:?}", name, value);
    }

    println!("{}", "=".repeat(80));

    let body = response.text().await?;

    // Save to file if requested
    if let Some(path) = save_path {
        std::fs::write(path, &body)?;
        println!("HTML saved to: {}", path);
        println!("{}", "=".repeat(80));
    } else {
        println!("Response body:");
        println!("{}", "=".repeat(80));
        println!("{}", body);
        println!("{}", "=".repeat(80));
    }

    println!("Total length: {} bytes", body.len());

    let links = scrapers::immovlan::extract_listing_urls(&body);
    if !links.is_empty() {
        println!("Listing links on page: {}", links.len());
    }
    if scrapers::immovlan::looks_like_listing_page(&body) {
        let record = scrapers::immovlan::parse_listing_detail(&body, "test", 0, url);
        println!("Parsed listing: {:#?}", record);
    }

    if is_challenge_page(&body) {
        println!("\n⚠️  WARNING: Response may contain CAPTCHA or anti-bot protection!");
        println!("Consider:");
        println!("  - Increasing request_delay_ms in config");
        println!("  - Changing user_agent in config");
        println!("  - Exporting browser cookies to the cookies_file in config");
        println!("  - Checking if the site requires cookies/session");
    }

    Ok(())
}
