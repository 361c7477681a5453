use crate::models::{ListingDetailRecord, ListingUrlRecord};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// A row type with a fixed, canonical column list.
///
/// Every stage writes through [`write_records`], so any output file can be
/// loaded back on its own with [`read_records`].
pub trait Tabular: Serialize + DeserializeOwned {
    fn schema() -> &'static [&'static str];
}

impl Tabular for ListingUrlRecord {
    fn schema() -> &'static [&'static str] {
        &["area", "page", "url", "discovered_at"]
    }
}

impl Tabular for ListingDetailRecord {
    fn schema() -> &'static [&'static str] {
        &[
            "town",
            "page",
            "url",
            "property_type",
            "price",
            "address",
            "postal_code",
            "city",
            "bedrooms",
            "bedroom1_surface",
            "bedroom2_surface",
            "bathrooms",
            "toilets",
            "surface_livable",
            "terrace",
            "terrace_surface",
            "terrace_orientation",
            "floor",
            "year_built",
            "condition",
            "kitchen_equipment",
            "cellar",
            "glazing_type",
            "elevator",
            "entry_phone",
            "epc_score",
            "epc_total",
            "epc_valid_until",
        ]
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },

    #[error("unexpected columns in {path}: expected [{expected}], found [{found}]")]
    SchemaMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },
}

impl ExportError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        ExportError::Io { path: path.to_path_buf(), source }
    }

    fn csv(path: &Path, source: csv::Error) -> Self {
        ExportError::Csv { path: path.to_path_buf(), source }
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `records` to `path` with the schema header, replacing any previous file.
///
/// Data goes to a `.tmp` sibling first and is renamed into place, so readers
/// only ever see complete files.
pub fn write_records<T: Tabular>(records: &[T], path: &Path) -> Result<usize, ExportError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| ExportError::io(parent, e))?;
    }

    let tmp = tmp_path(path);
    {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&tmp)
            .map_err(|e| ExportError::csv(&tmp, e))?;

        writer
            .write_record(T::schema())
            .map_err(|e| ExportError::csv(&tmp, e))?;
        for record in records {
            writer.serialize(record).map_err(|e| ExportError::csv(&tmp, e))?;
        }
        writer.flush().map_err(|e| ExportError::io(&tmp, e))?;
    }

    fs::rename(&tmp, path).map_err(|e| ExportError::io(path, e))?;
    tracing::debug!("Wrote {} rows to {}", records.len(), path.display());
    Ok(records.len())
}

/// Load a file written by [`write_records`], rejecting it if its header is not `T`'s schema.
pub fn read_records<T: Tabular>(path: &Path) -> Result<Vec<T>, ExportError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| ExportError::csv(path, e))?;

    let headers = reader.headers().map_err(|e| ExportError::csv(path, e))?;
    let found: Vec<&str> = headers.iter().map(str::trim).collect();
    if found != T::schema() {
        return Err(ExportError::SchemaMismatch {
            path: path.to_path_buf(),
            expected: T::schema().join(","),
            found: found.join(","),
        });
    }

    reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(|e| ExportError::csv(path, e))
}

/// Write a human-readable companion file (run or merge summary) atomically.
pub fn write_text(path: &Path, text: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = tmp_path(path);
    let mut file = fs::File::create(&tmp)?;
    file.write_all(text.as_bytes())?;
    file.sync_all()?;
    fs::rename(&tmp, path)
}
