use crate::exporter::read_records;
use crate::models::{ListingDetailRecord, ListingUrlRecord, RunContext};
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::PathBuf;

/// This run's detail batch files, sorted by batch index
pub fn batch_files(run: &RunContext) -> Result<Vec<(usize, PathBuf)>> {
    let dir = run.details_dir();
    let prefix = format!("details_{}_batch_", run.run_id);

    let mut files = Vec::new();
    if !dir.exists() {
        return Ok(files);
    }
    for entry in std::fs::read_dir(&dir).with_context(|| format!("Failed to list {}", dir.display()))? {
        let path = entry?.path();
        let index = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|name| name.strip_prefix(&prefix))
            .and_then(|rest| rest.strip_suffix(".csv"))
            .and_then(|number| number.parse::<usize>().ok());
        if let Some(index) = index {
            files.push((index, path));
        }
    }
    files.sort_by_key(|(index, _)| *index);
    Ok(files)
}

/// Tracks listing URLs already extracted in a run so a rerun skips them
pub struct ProgressTracker {
    processed: HashSet<String>,
    next_batch: usize,
}

impl ProgressTracker {
    /// Rebuild progress from the batch files the run has written so far
    pub fn load(run: &RunContext) -> Result<Self> {
        let mut processed = HashSet::new();
        let mut next_batch = 1;

        for (index, path) in batch_files(run)? {
            next_batch = next_batch.max(index + 1);
            match read_records::<ListingDetailRecord>(&path) {
                Ok(records) => processed.extend(records.into_iter().map(|r| r.url)),
                Err(e) => tracing::warn!("Ignoring unreadable batch {}: {}", path.display(), e),
            }
        }

        if !processed.is_empty() {
            tracing::info!(
                "Resuming run {}: {} listings already extracted, next batch {}",
                run.run_id,
                processed.len(),
                next_batch
            );
        }
        Ok(Self { processed, next_batch })
    }

    /// Filters out listings that have already been extracted
    pub fn filter_new(&self, records: Vec<ListingUrlRecord>) -> Vec<ListingUrlRecord> {
        records
            .into_iter()
            .filter(|record| !self.processed.contains(&record.url))
            .collect()
    }

    pub fn mark_processed(&mut self, url: &str) {
        self.processed.insert(url.to_string());
    }

    /// Claim the next batch index; indices are never reused within a run
    pub fn take_batch_index(&mut self) -> usize {
        let index = self.next_batch;
        self.next_batch += 1;
        index
    }

    pub fn count(&self) -> usize {
        self.processed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporter::write_records;
    use crate::models::Area;
    use tempfile::TempDir;

    fn url(id: &str) -> String {
        format!("https://immovlan.be/en/detail/house/for-sale/9300/aalst/{}", id)
    }

    #[test]
    fn test_fresh_run_starts_at_batch_one() {
        let dir = TempDir::new().unwrap();
        let run = RunContext::with_run_id(dir.path(), "run");

        let mut tracker = ProgressTracker::load(&run).unwrap();
        assert_eq!(tracker.count(), 0);
        assert_eq!(tracker.take_batch_index(), 1);
        assert_eq!(tracker.take_batch_index(), 2);
    }

    #[test]
    fn test_load_resumes_from_existing_batches() {
        let dir = TempDir::new().unwrap();
        let run = RunContext::with_run_id(dir.path(), "run");
        write_records(&[ListingDetailRecord::empty("Aalst", 1, &url("a"))], &run.batch_path(1)).unwrap();
        write_records(&[ListingDetailRecord::empty("Aalst", 1, &url("b"))], &run.batch_path(3)).unwrap();

        let mut tracker = ProgressTracker::load(&run).unwrap();
        assert_eq!(tracker.count(), 2);
        assert_eq!(tracker.take_batch_index(), 4);

        let area = Area::new("Aalst");
        let pending = tracker.filter_new(vec![
            ListingUrlRecord::new(&area, 1, url("a")),
            ListingUrlRecord::new(&area, 1, url("c")),
            ListingUrlRecord::new(&area, 2, url("b")),
        ]);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].url, url("c"));
    }

    #[test]
    fn test_other_runs_batches_are_ignored() {
        let dir = TempDir::new().unwrap();
        let other = RunContext::with_run_id(dir.path(), "older");
        write_records(&[ListingDetailRecord::empty("Aalst", 1, &url("a"))], &other.batch_path(1)).unwrap();

        let tracker = ProgressTracker::load(&RunContext::with_run_id(dir.path(), "newer")).unwrap();
        assert_eq!(tracker.count(), 0);
    }

    #[test]
    fn test_unreadable_batch_keeps_its_index() {
        let dir = TempDir::new().unwrap();
        let run = RunContext::with_run_id(dir.path(), "run");
        std::fs::create_dir_all(run.details_dir()).unwrap();
        std::fs::write(run.batch_path(2), "not,a,detail,file\n").unwrap();

        let mut tracker = ProgressTracker::load(&run).unwrap();
        assert_eq!(tracker.count(), 0);
        assert_eq!(tracker.take_batch_index(), 3);
    }
}
