use crate::area_log::AreaLog;
use crate::exporter::{read_records, write_records};
use crate::fetcher::{fetch_with_retry, FetchError, Pacing, PageFetcher, RetryPolicy};
use crate::models::{AreaContext, ListingUrlRecord};
use crate::scrapers::immovlan;
use anyhow::{Context, Result};
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct CrawlSettings {
    /// Search URL with an `{area}` placeholder
    pub search_template: String,
    /// `None` crawls until the results run out
    pub max_pages: Option<u32>,
    pub retry: RetryPolicy,
    pub pacing: Pacing,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    /// A page produced no URL not already seen in this run
    Exhausted,
    PageLimit,
    Failed { page: u32, error: FetchError },
    Cancelled,
}

#[derive(Debug)]
pub struct CrawlOutcome {
    pub records: Vec<ListingUrlRecord>,
    pub pages_scraped: u32,
    pub stop: StopReason,
}

/// Walks one area's paginated search results, in page order.
///
/// Each page's URLs are persisted as an immutable partial file before the
/// next page is requested. A partial file already present for the same run is
/// reused instead of being fetched again.
pub struct ListingUrlCrawler {
    fetcher: Box<dyn PageFetcher>,
    settings: CrawlSettings,
    cancel: CancellationToken,
}

impl ListingUrlCrawler {
    pub fn new(fetcher: Box<dyn PageFetcher>, settings: CrawlSettings, cancel: CancellationToken) -> Self {
        Self { fetcher, settings, cancel }
    }

    pub async fn crawl(&mut self, ctx: &AreaContext) -> Result<CrawlOutcome> {
        std::fs::create_dir_all(ctx.dir())
            .with_context(|| format!("Failed to create area directory {}", ctx.dir().display()))?;
        let mut log = AreaLog::open(&ctx.log_path())?;
        log.event(format!("Crawl started for area '{}' (run {})", ctx.area, ctx.run.run_id));
        tracing::debug!("{}: logging to {}", ctx.area, log.path().display());
        tracing::info!("Crawling area: {}", ctx.area);

        let mut seen: HashSet<String> = HashSet::new();
        let mut records = Vec::new();
        let mut pages_scraped = 0;
        let mut page = 1;

        let stop = loop {
            if self.cancel.is_cancelled() {
                break StopReason::Cancelled;
            }
            if self.settings.max_pages.is_some_and(|max| page > max) {
                break StopReason::PageLimit;
            }

            let partial_path = ctx.partial_page_path(page);
            let checkpoint = if partial_path.exists() {
                match read_records::<ListingUrlRecord>(&partial_path) {
                    Ok(saved) => Some(saved),
                    Err(e) => {
                        tracing::warn!("Ignoring unreadable checkpoint {}: {}", partial_path.display(), e);
                        None
                    }
                }
            } else {
                None
            };

            let page_records = match checkpoint {
                Some(saved) => {
                    log.event(format!("=== Page {} === reusing checkpoint {}", page, partial_path.display()));
                    tracing::debug!("{}: page {} restored from checkpoint", ctx.area, page);
                    saved
                }
                None => {
                    let url = immovlan::build_search_url(&self.settings.search_template, &ctx.area, page);
                    log.event(format!("=== Page {} === Visiting: {}", page, url));
                    tracing::info!("{}: visiting page {}", ctx.area, page);

                    let fetched = fetch_with_retry(self.fetcher.as_mut(), &url, &self.settings.retry, |attempt, err| {
                        log.event(format!("[RETRY] page {} attempt {} after: {}", page, attempt, err));
                    })
                    .await;

                    let html = match fetched {
                        Ok(html) => html,
                        Err(error) => {
                            log.event(format!("[FAILED] page {}: {}", page, error));
                            tracing::warn!("{}: giving up on page {}: {}", ctx.area, page, error);
                            break StopReason::Failed { page, error };
                        }
                    };

                    immovlan::extract_listing_urls(&html)
                        .into_iter()
                        .map(|url| ListingUrlRecord::new(&ctx.area, page, url))
                        .collect()
                }
            };

            let new_urls = page_records.iter().filter(|r| !seen.contains(&r.url)).count();
            if new_urls == 0 {
                log.event(format!("[WARNING] No new property links on page {}", page));
                tracing::info!("{}: no new links on page {}, results exhausted", ctx.area, page);
                break StopReason::Exhausted;
            }

            if !partial_path.exists() {
                write_records(&page_records, &partial_path)
                    .with_context(|| format!("Failed to persist page {} for {}", page, ctx.area))?;
            }

            log.event(format!(
                "[INFO] Found {} property links on page {} ({} new)",
                page_records.len(),
                page,
                new_urls
            ));
            for (i, record) in page_records.iter().enumerate() {
                log.event(format!("[{:02}] {}", i + 1, record.url));
            }
            tracing::info!("{}: found {} property links on page {}", ctx.area, page_records.len(), page);

            seen.extend(page_records.iter().map(|r| r.url.clone()));
            records.extend(page_records);
            pages_scraped += 1;
            page += 1;

            let delay = self.settings.pacing.next_delay();
            if !delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = self.cancel.cancelled() => {}
                }
            }
        };

        log.event(format!(
            "Crawl stopped ({:?}) after {} pages, {} URLs collected",
            stop,
            pages_scraped,
            records.len()
        ));

        Ok(CrawlOutcome {
            records,
            pages_scraped,
            stop,
        })
    }
}
