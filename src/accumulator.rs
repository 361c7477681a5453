use crate::exporter::{read_records, write_records};
use crate::models::{AreaContext, AreaRunSummary, ListingUrlRecord};
use crate::scrapers::immovlan::canonical_url;
use anyhow::{Context, Result};
use chrono::Local;
use std::collections::HashSet;
use std::path::PathBuf;

/// Keep the first record for each canonical URL, in input order.
///
/// Returned records carry the canonical URL. Records whose URL cannot be
/// canonicalized are dropped and counted as duplicates of nothing.
pub fn dedup_by_url(records: impl IntoIterator<Item = ListingUrlRecord>) -> (Vec<ListingUrlRecord>, usize) {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    let mut dropped = 0;

    for mut record in records {
        let Some(url) = canonical_url(&record.url) else {
            tracing::warn!("Dropping record with invalid URL: {}", record.url);
            dropped += 1;
            continue;
        };
        if seen.insert(url.clone()) {
            record.url = url;
            unique.push(record);
        } else {
            dropped += 1;
        }
    }
    (unique, dropped)
}

/// This run's partial page files for the area, sorted by page number
pub fn partial_files(ctx: &AreaContext) -> Result<Vec<(u32, PathBuf)>> {
    let dir = ctx.dir();
    let prefix = format!("partial_urls_{}_{}_page_", ctx.run.run_id, ctx.area.slug());

    let mut files = Vec::new();
    if !dir.exists() {
        return Ok(files);
    }
    for entry in std::fs::read_dir(&dir).with_context(|| format!("Failed to list {}", dir.display()))? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let page = name
            .strip_prefix(&prefix)
            .and_then(|rest| rest.strip_suffix(".csv"))
            .and_then(|number| number.parse::<u32>().ok());
        if let Some(page) = page {
            files.push((page, path));
        }
    }
    files.sort_by_key(|(page, _)| *page);
    Ok(files)
}

/// Merge the area's partial page files into its per-area URL file and summary.
///
/// Deduplicates within this run only; URLs seen by other runs are left to the
/// consolidator. Output order is first occurrence in page order.
pub fn accumulate(ctx: &AreaContext) -> Result<AreaRunSummary> {
    let mut records = Vec::new();
    let mut pages_scraped = 0;

    for (page, path) in partial_files(ctx)? {
        match read_records::<ListingUrlRecord>(&path) {
            Ok(mut page_records) => {
                records.append(&mut page_records);
                pages_scraped += 1;
            }
            Err(e) => tracing::warn!("{}: skipping unreadable page {} file: {}", ctx.area, page, e),
        }
    }

    let total_urls = records.len();
    let (unique, _) = dedup_by_url(records);

    write_records(&unique, &ctx.urls_path())
        .with_context(|| format!("Failed to write URL file for {}", ctx.area))?;

    let summary = AreaRunSummary {
        area: ctx.area.name.clone(),
        timestamp: Local::now(),
        pages_scraped,
        total_urls,
        unique_urls: unique.len(),
    };
    summary
        .write_to(&ctx.stats_path(), &ctx.run.run_id)
        .with_context(|| format!("Failed to write run summary for {}", ctx.area))?;

    tracing::info!(
        "{}: {} pages, {} URLs, {} unique -> {}",
        ctx.area,
        summary.pages_scraped,
        summary.total_urls,
        summary.unique_urls,
        ctx.urls_path().display()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Area, RunContext};
    use tempfile::TempDir;

    fn url(id: &str) -> String {
        format!("https://immovlan.be/en/detail/house/for-sale/9300/aalst/{}", id)
    }

    fn page_records(area: &Area, page: u32, ids: impl Iterator<Item = String>) -> Vec<ListingUrlRecord> {
        ids.map(|id| ListingUrlRecord::new(area, page, url(&id))).collect()
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let area = Area::new("Aalst");
        let records = vec![
            ListingUrlRecord::new(&area, 1, url("a")),
            ListingUrlRecord::new(&area, 1, url("b")),
            ListingUrlRecord::new(&area, 2, format!("{}/", url("a"))),
            ListingUrlRecord::new(&area, 2, url("a").replace("https", "http")),
            ListingUrlRecord::new(&area, 2, url("c")),
        ];

        let (unique, dropped) = dedup_by_url(records);
        let urls: Vec<&str> = unique.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec![url("a"), url("b"), url("c")]);
        assert_eq!(unique[0].page, 1);
        assert_eq!(dropped, 2);
    }

    #[test]
    fn test_two_pages_of_twenty_give_forty_unique() {
        let dir = TempDir::new().unwrap();
        let area = Area::new("Aalst");
        let ctx = RunContext::with_run_id(dir.path(), "20250101_000000").for_area(&area);

        for page in 1..=2u32 {
            let records = page_records(&area, page, (0..20).map(|i| format!("p{}-{}", page, i)));
            write_records(&records, &ctx.partial_page_path(page)).unwrap();
        }

        let summary = accumulate(&ctx).unwrap();
        assert_eq!(summary.pages_scraped, 2);
        assert_eq!(summary.total_urls, 40);
        assert_eq!(summary.unique_urls, 40);

        let written: Vec<ListingUrlRecord> = read_records(&ctx.urls_path()).unwrap();
        assert_eq!(written.len(), 40);
        assert_eq!(written[0].url, url("p1-0"));
        assert_eq!(written[20].page, 2);

        let stats = std::fs::read_to_string(ctx.stats_path()).unwrap();
        assert!(stats.contains("Pages scraped  : 2"));
        assert!(stats.contains("Unique URLs    : 40"));
    }

    #[test]
    fn test_overlapping_pages_are_deduplicated_in_page_order() {
        let dir = TempDir::new().unwrap();
        let area = Area::new("Gent");
        let ctx = RunContext::with_run_id(dir.path(), "run").for_area(&area);

        // Written out of order on purpose; page 10 must sort after page 2
        write_records(&page_records(&area, 10, ["z", "a"].map(String::from).into_iter()), &ctx.partial_page_path(10)).unwrap();
        write_records(&page_records(&area, 1, ["a", "b"].map(String::from).into_iter()), &ctx.partial_page_path(1)).unwrap();
        write_records(&page_records(&area, 2, ["b", "c"].map(String::from).into_iter()), &ctx.partial_page_path(2)).unwrap();

        let summary = accumulate(&ctx).unwrap();
        assert_eq!(summary.pages_scraped, 3);
        assert_eq!(summary.total_urls, 6);
        assert_eq!(summary.unique_urls, 4);

        let written: Vec<ListingUrlRecord> = read_records(&ctx.urls_path()).unwrap();
        let urls: Vec<String> = written.into_iter().map(|r| r.url).collect();
        assert_eq!(urls, vec![url("a"), url("b"), url("c"), url("z")]);
    }

    #[test]
    fn test_accumulate_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let area = Area::new("Aalst");
        let ctx = RunContext::with_run_id(dir.path(), "run").for_area(&area);
        write_records(&page_records(&area, 1, (0..5).map(|i| i.to_string())), &ctx.partial_page_path(1)).unwrap();

        accumulate(&ctx).unwrap();
        let first = std::fs::read_to_string(ctx.urls_path()).unwrap();
        accumulate(&ctx).unwrap();
        let second = std::fs::read_to_string(ctx.urls_path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_other_runs_partials_are_ignored() {
        let dir = TempDir::new().unwrap();
        let area = Area::new("Aalst");
        let ctx = RunContext::with_run_id(dir.path(), "run-b").for_area(&area);
        let other = RunContext::with_run_id(dir.path(), "run-a").for_area(&area);

        let foreign = page_records(&area, 1, ["x"].map(String::from).into_iter());
        std::fs::create_dir_all(ctx.dir()).unwrap();
        write_records(&foreign, &ctx.dir().join(other.partial_page_path(1).file_name().unwrap())).unwrap();

        let summary = accumulate(&ctx).unwrap();
        assert_eq!(summary.pages_scraped, 0);
        assert_eq!(summary.unique_urls, 0);
    }

    #[test]
    fn test_unreadable_partial_is_skipped() {
        let dir = TempDir::new().unwrap();
        let area = Area::new("Aalst");
        let ctx = RunContext::with_run_id(dir.path(), "run").for_area(&area);
        write_records(&page_records(&area, 1, ["a"].map(String::from).into_iter()), &ctx.partial_page_path(1)).unwrap();
        std::fs::write(ctx.partial_page_path(2), "garbage\n1,2,3\n").unwrap();

        let summary = accumulate(&ctx).unwrap();
        assert_eq!(summary.pages_scraped, 1);
        assert_eq!(summary.unique_urls, 1);
    }
}
