use crate::accumulator::dedup_by_url;
use crate::exporter::{read_records, write_records, write_text};
use crate::models::{ConsolidationSummary, ListingUrlRecord};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

const AREA_FILE_PREFIX: &str = "urls_";
const CONSOLIDATED_PREFIX: &str = "consolidated_urls_";

/// Every unique listing URL seen so far, in first-seen order
#[derive(Debug, Clone, Default)]
pub struct ConsolidatedUrlSet {
    pub records: Vec<ListingUrlRecord>,
}

impl ConsolidatedUrlSet {
    #[cfg(test)]
    fn contains(&self, canonical_url: &str) -> bool {
        self.records.iter().any(|r| r.url == canonical_url)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Where a consolidation wrote its output
#[derive(Debug, Clone)]
pub struct ConsolidationOutput {
    pub set: ConsolidatedUrlSet,
    pub summary: ConsolidationSummary,
    pub csv_path: PathBuf,
    pub stats_path: PathBuf,
}

fn walk(dir: &Path, found: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))? {
        let path = entry?.path();
        if path.is_dir() {
            walk(&path, found)?;
        } else if path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| name.starts_with(AREA_FILE_PREFIX) && name.ends_with(".csv"))
        {
            found.push(path);
        }
    }
    Ok(())
}

/// All per-area URL files under `output_root`, from every run so far.
///
/// Sorted by file name; names lead with the run id, so earlier runs come first.
pub fn discover_area_files(output_root: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    if output_root.exists() {
        walk(output_root, &mut found)?;
    }
    found.sort_by(|a, b| a.file_name().cmp(&b.file_name()).then_with(|| a.cmp(b)));
    Ok(found)
}

/// Merge `files` in the given order; the first record seen for a URL wins.
///
/// Unreadable or malformed files are skipped and counted, never fatal.
pub fn merge(files: &[PathBuf]) -> (ConsolidatedUrlSet, ConsolidationSummary) {
    let mut summary = ConsolidationSummary::default();
    let mut all_records = Vec::new();

    for path in files {
        tracing::info!("Reading file: {}", path.display());
        match read_records::<ListingUrlRecord>(path) {
            Ok(mut records) => {
                summary.files_processed += 1;
                summary.total_input_rows += records.len();
                all_records.append(&mut records);
            }
            Err(e) => {
                tracing::warn!("Could not read {}: {}", path.display(), e);
                summary.files_failed += 1;
            }
        }
    }

    let (unique, dropped) = dedup_by_url(all_records);
    summary.unique_output_rows = unique.len();
    summary.duplicates_dropped = dropped;
    (ConsolidatedUrlSet { records: unique }, summary)
}

/// Consolidate every per-area file under `output_root` into one master list.
///
/// Output goes to `consolidated_urls_<label>/` with a companion summary file.
pub fn consolidate(output_root: &Path, label: &str) -> Result<ConsolidationOutput> {
    tracing::info!("Consolidating all scraped results under {}", output_root.display());

    let files = discover_area_files(output_root)?;
    if files.is_empty() {
        tracing::warn!("No per-area URL files found to consolidate");
    }
    let (set, summary) = merge(&files);

    let dir = output_root.join(format!("{}{}", CONSOLIDATED_PREFIX, label));
    let csv_path = dir.join(format!("{}{}.csv", CONSOLIDATED_PREFIX, label));
    write_records(&set.records, &csv_path)
        .with_context(|| format!("Failed to write {}", csv_path.display()))?;

    let stats_path = dir.join(format!("stats_consolidation_{}.txt", label));
    write_text(&stats_path, &format!("{}\nGenerated          : {}\n", summary, label))
        .with_context(|| format!("Failed to write {}", stats_path.display()))?;

    tracing::info!(
        "Consolidated {} files into {} unique URLs ({} duplicates dropped, {} files skipped)",
        summary.files_processed,
        summary.unique_output_rows,
        summary.duplicates_dropped,
        summary.files_failed
    );

    Ok(ConsolidationOutput {
        set,
        summary,
        csv_path,
        stats_path,
    })
}

/// Most recent consolidated master list under `output_root`, if any
pub fn latest_consolidated(output_root: &Path) -> Result<Option<PathBuf>> {
    if !output_root.exists() {
        return Ok(None);
    }

    let mut latest: Option<(String, PathBuf)> = None;
    for entry in fs::read_dir(output_root).with_context(|| format!("Failed to list {}", output_root.display()))? {
        let dir = entry?.path();
        let Some(name) = dir.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        if !dir.is_dir() || !name.starts_with(CONSOLIDATED_PREFIX) {
            continue;
        }
        let csv_path = dir.join(format!("{}.csv", name));
        if csv_path.exists() && latest.as_ref().map_or(true, |(best, _)| name > *best) {
            latest = Some((name, csv_path));
        }
    }
    Ok(latest.map(|(_, path)| path))
}
