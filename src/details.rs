use crate::area_log::AreaLog;
use crate::exporter::{read_records, write_records, write_text};
use crate::fetcher::{fetch_with_retry, FetchError, FetcherFactory, Pacing, PageFetcher, RetryPolicy};
use crate::models::{ListingDetailRecord, ListingUrlRecord, RunContext};
use crate::scrapers::immovlan;
use crate::tracker::{batch_files, ProgressTracker};
use anyhow::{Context, Result};
use futures::future::join_all;
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct DetailSettings {
    pub retry: RetryPolicy,
    pub pacing: Pacing,
    /// Listings per batch file
    pub batch_size: usize,
    /// Concurrent sessions
    pub workers: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailRunSummary {
    pub run_id: String,
    pub urls_requested: usize,
    pub already_extracted: usize,
    pub extracted: usize,
    pub failed: usize,
    pub batches_written: usize,
    pub dataset_rows: usize,
    pub cancelled: bool,
}

impl fmt::Display for DetailRunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run ID             : {}", self.run_id)?;
        writeln!(f, "URLs requested     : {}", self.urls_requested)?;
        writeln!(f, "Already extracted  : {}", self.already_extracted)?;
        writeln!(f, "Extracted this run : {}", self.extracted)?;
        writeln!(f, "Failures skipped   : {}", self.failed)?;
        writeln!(f, "Batches written    : {}", self.batches_written)?;
        writeln!(f, "Dataset rows       : {}", self.dataset_rows)?;
        write!(f, "Cancelled          : {}", if self.cancelled { "yes" } else { "no" })
    }
}

/// Visits listing pages and turns them into dataset rows, batch by batch.
///
/// Every batch is written to its own file before the next one starts, so an
/// interrupted run resumes from the last completed batch.
pub struct DetailExtractor {
    factory: Arc<dyn FetcherFactory>,
    settings: DetailSettings,
    cancel: CancellationToken,
}

impl DetailExtractor {
    pub fn new(factory: Arc<dyn FetcherFactory>, settings: DetailSettings, cancel: CancellationToken) -> Self {
        Self { factory, settings, cancel }
    }

    /// Extract the first `limit` listings of `master` (all of them for `None`)
    /// and assemble the run's dataset file.
    pub async fn extract(
        &self,
        run: &RunContext,
        master: &[ListingUrlRecord],
        limit: Option<usize>,
    ) -> Result<DetailRunSummary> {
        let mut tracker = ProgressTracker::load(run)?;
        let log = Mutex::new(AreaLog::open(&run.extract_log_path())?);

        let mut seen = HashSet::new();
        let mut requested: Vec<ListingUrlRecord> = master
            .iter()
            .filter(|record| seen.insert(record.url.clone()))
            .cloned()
            .collect();
        if requested.len() < master.len() {
            tracing::warn!("Master list has {} repeated URLs, visiting each once", master.len() - requested.len());
        }
        if let Some(limit) = limit {
            requested.truncate(limit);
        }

        let mut summary = DetailRunSummary {
            run_id: run.run_id.clone(),
            urls_requested: requested.len(),
            ..Default::default()
        };

        let pending = tracker.filter_new(requested);
        summary.already_extracted = summary.urls_requested - pending.len();
        tracing::info!(
            "Extracting {} listings ({} already done in run {})",
            pending.len(),
            summary.already_extracted,
            run.run_id
        );
        log_event(&log, format!(
            "Extraction started: {} requested, {} already extracted",
            summary.urls_requested, summary.already_extracted
        ));

        if !pending.is_empty() {
            let worker_count = self.settings.workers.clamp(1, pending.len());
            let mut fetchers = (0..worker_count)
                .map(|_| self.factory.open())
                .collect::<Result<Vec<_>>>()
                .context("Failed to open fetch sessions")?;

            for batch in pending.chunks(self.settings.batch_size.max(1)) {
                if self.cancel.is_cancelled() {
                    break;
                }

                let per_worker = batch.len().div_ceil(fetchers.len());
                let outcomes: Vec<Result<ListingDetailRecord, FetchError>> = join_all(
                    fetchers
                        .iter_mut()
                        .zip(batch.chunks(per_worker))
                        .map(|(fetcher, urls)| self.visit_all(fetcher.as_mut(), urls, &log)),
                )
                .await
                .into_iter()
                .flatten()
                .collect();

                let mut records = Vec::with_capacity(outcomes.len());
                for outcome in outcomes {
                    match outcome {
                        Ok(record) => records.push(record),
                        Err(_) => summary.failed += 1,
                    }
                }

                if !records.is_empty() {
                    let path = run.batch_path(tracker.take_batch_index());
                    write_records(&records, &path)
                        .with_context(|| format!("Failed to write batch {}", path.display()))?;
                    tracing::info!("Saved {} listings to {}", records.len(), path.display());
                    log_event(&log, format!("[BATCH] {} listings saved to {}", records.len(), path.display()));

                    for record in &records {
                        tracker.mark_processed(&record.url);
                    }
                    summary.extracted += records.len();
                    summary.batches_written += 1;
                }
            }
        }

        summary.cancelled = self.cancel.is_cancelled();
        if summary.cancelled {
            tracing::warn!(
                "Detail extraction cancelled with {} listings saved, completed batches are kept",
                tracker.count()
            );
            log_event(&log, format!("[CANCELLED] {} listings saved so far", tracker.count()));
        }

        let (dataset_path, rows) = assemble_dataset(run)?;
        summary.dataset_rows = rows;
        write_text(&run.details_stats_path(), &format!("{}\n", summary))
            .with_context(|| format!("Failed to write {}", run.details_stats_path().display()))?;

        tracing::info!(
            "Extracted {} listings ({} failed), dataset has {} rows: {}",
            summary.extracted,
            summary.failed,
            summary.dataset_rows,
            dataset_path.display()
        );
        log_event(&log, format!(
            "Extraction finished: {} extracted, {} failed, {} dataset rows",
            summary.extracted, summary.failed, summary.dataset_rows
        ));
        Ok(summary)
    }

    /// One worker's share of a batch, visited in order on its own session.
    /// Stops early on cancellation; unvisited listings are simply absent.
    async fn visit_all(
        &self,
        fetcher: &mut dyn PageFetcher,
        urls: &[ListingUrlRecord],
        log: &Mutex<AreaLog>,
    ) -> Vec<Result<ListingDetailRecord, FetchError>> {
        let mut outcomes = Vec::with_capacity(urls.len());

        for (i, record) in urls.iter().enumerate() {
            if self.cancel.is_cancelled() {
                break;
            }
            let delay = self.settings.pacing.next_delay();
            if i > 0 && !delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = self.cancel.cancelled() => break,
                }
            }

            let outcome = self.visit(fetcher, record, log).await;
            if let Err(e) = &outcome {
                tracing::warn!("Skipping {}: {}", record.url, e);
                log_event(log, format!("[SKIPPED] {}: {}", record.url, e));
            }
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn visit(
        &self,
        fetcher: &mut dyn PageFetcher,
        record: &ListingUrlRecord,
        log: &Mutex<AreaLog>,
    ) -> Result<ListingDetailRecord, FetchError> {
        let mut session_renewed = false;
        loop {
            let html = fetch_with_retry(fetcher, &record.url, &self.settings.retry, |attempt, err| {
                log_event(log, format!("[RETRY] {} attempt {} after: {}", record.url, attempt, err));
            })
            .await?;

            if immovlan::looks_like_listing_page(&html) {
                tracing::debug!("Parsing listing {}", record.url);
                return Ok(immovlan::parse_listing_detail(&html, &record.area, record.page, &record.url));
            }
            if session_renewed {
                return Err(FetchError::Transient("listing content missing after session restart".to_string()));
            }

            tracing::warn!("Session looks lost on {}, restarting it once", record.url);
            log_event(log, format!("[RESTART] session lost on {}", record.url));
            if let Err(e) = fetcher.restart().await {
                tracing::warn!("Failed to restart session: {}", e);
            }
            session_renewed = true;
        }
    }
}

fn log_event(log: &Mutex<AreaLog>, message: String) {
    if let Ok(mut log) = log.lock() {
        log.event(message);
    }
}

/// Merge the run's batch files, in batch order, into the final dataset.
///
/// A URL present in more than one batch is kept once, from its first batch.
pub fn assemble_dataset(run: &RunContext) -> Result<(PathBuf, usize)> {
    let mut seen = HashSet::new();
    let mut rows = Vec::new();

    for (_, path) in batch_files(run)? {
        match read_records::<ListingDetailRecord>(&path) {
            Ok(records) => rows.extend(records.into_iter().filter(|r| seen.insert(r.url.clone()))),
            Err(e) => tracing::warn!("Leaving unreadable batch {} out of the dataset: {}", path.display(), e),
        }
    }

    let path = run.dataset_path();
    write_records(&rows, &path).with_context(|| format!("Failed to write dataset {}", path.display()))?;
    Ok((path, rows.len()))
}
