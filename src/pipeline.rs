use crate::accumulator::accumulate;
use crate::config::Config;
use crate::consolidator::{self, ConsolidatedUrlSet};
use crate::crawler::{ListingUrlCrawler, StopReason};
use crate::details::DetailExtractor;
use crate::exporter::read_records;
use crate::fetcher::FetcherFactory;
use crate::models::{Area, AreaRunSummary, ListingUrlRecord, RunContext};
use anyhow::{Context, Result};
use chrono::Local;
use futures::stream::{self, StreamExt};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Stage {
    Crawl,
    Consolidate,
    Details,
    All,
}

impl Stage {
    pub fn crawls(self) -> bool {
        matches!(self, Stage::Crawl | Stage::All)
    }

    fn consolidates(self) -> bool {
        matches!(self, Stage::Consolidate | Stage::All)
    }

    fn extracts(self) -> bool {
        matches!(self, Stage::Details | Stage::All)
    }
}

/// What a run achieved, printed at the end of every non-fatal run
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub run_id: String,
    pub areas_completed: usize,
    pub areas_failed: Vec<String>,
    pub pages_scraped: u32,
    pub urls_found: usize,
    pub unique_urls: usize,
    pub listings_extracted: usize,
    pub failures_skipped: usize,
    pub cancelled: bool,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run {} summary", self.run_id)?;
        writeln!(f, "  Areas completed    : {}", self.areas_completed)?;
        if self.areas_failed.is_empty() {
            writeln!(f, "  Areas failed       : 0")?;
        } else {
            writeln!(f, "  Areas failed       : {} ({})", self.areas_failed.len(), self.areas_failed.join(", "))?;
        }
        writeln!(f, "  Pages scraped      : {}", self.pages_scraped)?;
        writeln!(f, "  URLs found         : {}", self.urls_found)?;
        writeln!(f, "  Unique URLs        : {}", self.unique_urls)?;
        writeln!(f, "  Listings extracted : {}", self.listings_extracted)?;
        write!(f, "  Failures skipped   : {}", self.failures_skipped)?;
        if self.cancelled {
            write!(f, "\n  Run was cancelled; rerun with --run-id {} to resume", self.run_id)?;
        }
        Ok(())
    }
}

pub struct Pipeline {
    config: Config,
    factory: Arc<dyn FetcherFactory>,
    run: RunContext,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(config: Config, factory: Arc<dyn FetcherFactory>, run: RunContext, cancel: CancellationToken) -> Self {
        Self { config, factory, run, cancel }
    }

    /// Crawl one area, then merge whatever pages it produced
    pub async fn crawl_area(&self, area: &Area) -> Result<(AreaRunSummary, StopReason)> {
        let ctx = self.run.for_area(area);
        let fetcher = self.factory.open().context("Failed to open fetch session")?;

        let mut crawler = ListingUrlCrawler::new(fetcher, self.config.crawl_settings(), self.cancel.clone());
        let outcome = crawler.crawl(&ctx).await?;
        let summary = accumulate(&ctx)?;
        Ok((summary, outcome.stop))
    }

    /// Crawl `areas` on up to `area_workers` concurrent sessions.
    /// One area's failure never stops the others.
    pub async fn crawl_areas(&self, areas: &[Area], report: &mut RunReport) {
        tracing::info!("Crawling {} areas with {} workers", areas.len(), self.config.area_workers);

        let results: Vec<(&Area, Result<(AreaRunSummary, StopReason)>)> = stream::iter(areas)
            .map(|area| async move { (area, self.crawl_area(area).await) })
            .buffer_unordered(self.config.area_workers.max(1))
            .collect()
            .await;

        for (area, result) in results {
            match result {
                Ok((summary, stop)) => {
                    report.pages_scraped += summary.pages_scraped;
                    report.urls_found += summary.total_urls;
                    match stop {
                        StopReason::Exhausted | StopReason::PageLimit => report.areas_completed += 1,
                        StopReason::Failed { page, error } => {
                            tracing::warn!("{}: stopped at page {}: {}", area, page, error);
                            report.areas_failed.push(area.name.clone());
                            report.failures_skipped += 1;
                        }
                        StopReason::Cancelled => report.cancelled = true,
                    }
                }
                Err(e) => {
                    tracing::error!("{}: crawl failed: {:#}", area, e);
                    report.areas_failed.push(area.name.clone());
                    report.failures_skipped += 1;
                }
            }
        }
        report.areas_failed.sort();
    }

    pub fn consolidate(&self, report: &mut RunReport) -> Result<ConsolidatedUrlSet> {
        let label = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let output = consolidator::consolidate(&self.run.output_root, &label)?;
        report.unique_urls = output.set.len();
        if output.set.is_empty() {
            tracing::warn!("Consolidated list is empty, nothing to extract");
        }
        Ok(output.set)
    }

    /// Master list for a details-only run: the newest consolidated file
    fn load_master_list(&self) -> Result<Vec<ListingUrlRecord>> {
        let path = consolidator::latest_consolidated(&self.run.output_root)?.with_context(|| {
            format!(
                "No consolidated URL list under {}; run the consolidate stage first",
                self.run.output_root.display()
            )
        })?;
        tracing::info!("Using master list {}", path.display());
        read_records(&path).with_context(|| format!("Failed to read master list {}", path.display()))
    }

    pub async fn extract_details(
        &self,
        master: &[ListingUrlRecord],
        limit: Option<usize>,
        report: &mut RunReport,
    ) -> Result<()> {
        let extractor = DetailExtractor::new(self.factory.clone(), self.config.detail_settings(), self.cancel.clone());
        let summary = extractor.extract(&self.run, master, limit).await?;

        report.listings_extracted += summary.extracted;
        report.failures_skipped += summary.failed;
        report.cancelled |= summary.cancelled;
        Ok(())
    }

    pub async fn run(&self, stage: Stage, areas: &[Area], detail_limit: Option<usize>) -> Result<RunReport> {
        std::fs::create_dir_all(&self.run.output_root).with_context(|| {
            format!("Cannot create output directory {}", self.run.output_root.display())
        })?;

        let mut report = RunReport {
            run_id: self.run.run_id.clone(),
            ..Default::default()
        };

        if stage.crawls() {
            self.crawl_areas(areas, &mut report).await;
        }

        let mut master = None;
        if stage.consolidates() && !self.cancel.is_cancelled() {
            master = Some(self.consolidate(&mut report)?.records);
        }

        if stage.extracts() && !self.cancel.is_cancelled() {
            let master = match master {
                Some(records) => records,
                None => self.load_master_list()?,
            };
            self.extract_details(&master, detail_limit, &mut report).await?;
        }

        report.cancelled |= self.cancel.is_cancelled();
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::testing::ScriptedFactory;
    use crate::models::ListingDetailRecord;
    use crate::scrapers::immovlan::build_search_url;
    use tempfile::TempDir;

    const TEMPLATE: &str = "https://immovlan.be/en/real-estate?municipals={area}";

    fn listing(id: &str) -> String {
        format!("https://immovlan.be/en/detail/house/for-sale/9000/gent/{}", id)
    }

    fn results_page(ids: &[&str]) -> String {
        let anchors: String = ids
            .iter()
            .map(|id| format!("<article><a href=\"{}\">{}</a></article>", listing(id), id))
            .collect();
        format!("<html><body>{}</body></html>", anchors)
    }

    fn listing_page() -> String {
        "<html><body><span class='detail__header_title_main'>House for sale</span>\
         <span class='detail__header_price_data'>€ 425.000</span></body></html>"
            .to_string()
    }

    fn config(dir: &TempDir) -> Config {
        Config {
            output_dir: dir.path().to_path_buf(),
            base_url: TEMPLATE.to_string(),
            request_delay_ms: 0,
            request_jitter_ms: 0,
            retry_backoff_ms: 0,
            max_retries: 1,
            area_workers: 2,
            detail_workers: 2,
            batch_size: 2,
            cookies_file: None,
            ..Config::default()
        }
    }

    fn page(area: &str, page: u32) -> String {
        build_search_url(TEMPLATE, &Area::new(area), page)
    }

    fn scripted_site() -> ScriptedFactory {
        let factory = ScriptedFactory::new();
        factory.always(&page("Aalst", 1), Ok(results_page(&["a", "b"])));
        factory.always(&page("Aalst", 2), Ok(results_page(&[])));
        factory.always(&page("Gent", 1), Ok(results_page(&["b", "c"])));
        factory.always(&page("Gent", 2), Ok(results_page(&["c", "d"])));
        factory.always(&page("Gent", 3), Ok(results_page(&["c", "d"])));
        for id in ["a", "b", "c", "d"] {
            factory.always(&listing(id), Ok(listing_page()));
        }
        factory
    }

    fn pipeline(dir: &TempDir, factory: &ScriptedFactory, run_id: &str) -> Pipeline {
        let config = config(dir);
        let run = RunContext::with_run_id(&config.output_dir, run_id);
        Pipeline::new(config, Arc::new(factory.clone()), run, CancellationToken::new())
    }

    #[tokio::test]
    async fn test_full_run_produces_dataset() {
        let dir = TempDir::new().unwrap();
        let factory = scripted_site();
        let areas = vec![Area::new("Aalst"), Area::new("Gent"), Area::new("Brugge")];

        let report = pipeline(&dir, &factory, "20250101_120000")
            .run(Stage::All, &areas, None)
            .await
            .unwrap();

        assert_eq!(report.areas_completed, 2);
        assert_eq!(report.areas_failed, vec!["Brugge".to_string()]);
        assert_eq!(report.pages_scraped, 3);
        // Aalst a,b + Gent b,c,c,d: found counts every row, unique is global
        assert_eq!(report.urls_found, 6);
        assert_eq!(report.unique_urls, 4);
        assert_eq!(report.listings_extracted, 4);
        assert_eq!(report.failures_skipped, 1);
        assert!(!report.cancelled);

        let run = RunContext::with_run_id(dir.path(), "20250101_120000");
        let rows: Vec<ListingDetailRecord> = read_records(&run.dataset_path()).unwrap();
        assert_eq!(rows.len(), 4);

        let text = report.to_string();
        assert!(text.contains("Areas failed       : 1 (Brugge)"));
        assert!(text.contains("URLs found         : 6"));
        assert!(text.contains("Unique URLs        : 4"));
        assert!(text.contains("Listings extracted : 4"));
    }

    #[tokio::test]
    async fn test_area_that_cannot_start_is_counted_as_failure() {
        let dir = TempDir::new().unwrap();
        let factory = scripted_site();
        let run = RunContext::with_run_id(dir.path(), "run");
        // A plain file where Gent's area directory should go
        std::fs::write(run.for_area(&Area::new("Gent")).dir(), "not a directory").unwrap();

        let mut report = RunReport::default();
        pipeline(&dir, &factory, "run")
            .crawl_areas(&[Area::new("Aalst"), Area::new("Gent")], &mut report)
            .await;

        assert_eq!(report.areas_completed, 1);
        assert_eq!(report.areas_failed, vec!["Gent".to_string()]);
        assert_eq!(report.failures_skipped, 1);
        assert_eq!(factory.calls_to(&page("Gent", 1)), 0);
    }

    #[tokio::test]
    async fn test_details_stage_reads_latest_consolidated_list() {
        let dir = TempDir::new().unwrap();
        let factory = scripted_site();
        let areas = vec![Area::new("Aalst")];

        let first = pipeline(&dir, &factory, "run1");
        let report = first.run(Stage::Crawl, &areas, None).await.unwrap();
        assert_eq!(report.listings_extracted, 0);
        let report = first.run(Stage::Consolidate, &areas, None).await.unwrap();
        assert_eq!(report.unique_urls, 2);

        let report = pipeline(&dir, &factory, "run2")
            .run(Stage::Details, &[], Some(1))
            .await
            .unwrap();
        assert_eq!(report.listings_extracted, 1);
    }

    #[tokio::test]
    async fn test_details_without_master_list_is_fatal() {
        let dir = TempDir::new().unwrap();
        let factory = ScriptedFactory::new();
        let result = pipeline(&dir, &factory, "run").run(Stage::Details, &[], None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_cancelled_run_skips_later_stages() {
        let dir = TempDir::new().unwrap();
        let factory = scripted_site();
        let config = config(&dir);
        let run = RunContext::with_run_id(&config.output_dir, "run");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = Pipeline::new(config, Arc::new(factory.clone()), run, cancel)
            .run(Stage::All, &[Area::new("Aalst")], None)
            .await
            .unwrap();

        assert!(report.cancelled);
        assert!(factory.calls().is_empty());
        assert!(consolidator::latest_consolidated(dir.path()).unwrap().is_none());
    }
}
