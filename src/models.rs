use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Placeholder written in place of any value that could not be extracted
pub const MISSING: &str = "unknown";

/// A town/locality whose search results are crawled as one unit
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Area {
    pub name: String,
}

impl Area {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into().trim().to_string() }
    }

    /// Filesystem-safe form of the name ("Sint-Niklaas (Centrum)" -> "sint-niklaas-centrum")
    pub fn slug(&self) -> String {
        let mut slug = String::with_capacity(self.name.len());
        let mut last_dash = true;
        for c in self.name.chars().flat_map(char::to_lowercase) {
            if c.is_alphanumeric() {
                slug.push(c);
                last_dash = false;
            } else if !last_dash {
                slug.push('-');
                last_dash = true;
            }
        }
        while slug.ends_with('-') {
            slug.pop();
        }
        slug
    }
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// One run of the pipeline: every file it produces carries `run_id` in its name.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub output_root: PathBuf,
}

impl RunContext {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self::with_run_id(output_root, Local::now().format("%Y%m%d_%H%M%S").to_string())
    }

    /// Re-attach to an earlier run so its checkpoints are reused
    pub fn with_run_id(output_root: impl Into<PathBuf>, run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            output_root: output_root.into(),
        }
    }

    pub fn for_area(&self, area: &Area) -> AreaContext {
        AreaContext {
            run: self.clone(),
            area: area.clone(),
        }
    }

    pub fn details_dir(&self) -> PathBuf {
        self.output_root.join(format!("details_{}", self.run_id))
    }

    pub fn batch_path(&self, index: usize) -> PathBuf {
        self.details_dir()
            .join(format!("details_{}_batch_{:05}.csv", self.run_id, index))
    }

    pub fn dataset_path(&self) -> PathBuf {
        self.details_dir()
            .join(format!("real_estate_details_{}.csv", self.run_id))
    }

    pub fn details_stats_path(&self) -> PathBuf {
        self.details_dir()
            .join(format!("stats_details_{}.txt", self.run_id))
    }

    pub fn extract_log_path(&self) -> PathBuf {
        self.details_dir()
            .join(format!("extract_{}.log", self.run_id))
    }
}

/// Run context narrowed to one area; owns the naming of that area's files.
#[derive(Debug, Clone)]
pub struct AreaContext {
    pub run: RunContext,
    pub area: Area,
}

impl AreaContext {
    fn stem(&self) -> String {
        format!("{}_{}", self.run.run_id, self.area.slug())
    }

    pub fn dir(&self) -> PathBuf {
        self.run
            .output_root
            .join(format!("{}_{}", self.area.slug(), self.run.run_id))
    }

    pub fn partial_page_path(&self, page: u32) -> PathBuf {
        self.dir()
            .join(format!("partial_urls_{}_page_{:04}.csv", self.stem(), page))
    }

    pub fn urls_path(&self) -> PathBuf {
        self.dir().join(format!("urls_{}.csv", self.stem()))
    }

    pub fn stats_path(&self) -> PathBuf {
        self.dir().join(format!("stats_{}.txt", self.stem()))
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir().join(format!("crawl_{}.log", self.stem()))
    }
}

/// A listing-detail URL seen on one page of an area's search results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingUrlRecord {
    pub area: String,
    pub page: u32,
    pub url: String,
    pub discovered_at: DateTime<Utc>,
}

impl ListingUrlRecord {
    pub fn new(area: &Area, page: u32, url: impl Into<String>) -> Self {
        Self {
            area: area.name.clone(),
            page,
            url: url.into(),
            discovered_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AreaRunSummary {
    pub area: String,
    pub timestamp: DateTime<Local>,
    pub pages_scraped: u32,
    pub total_urls: usize,
    pub unique_urls: usize,
}

impl AreaRunSummary {
    pub fn write_to(&self, path: &Path, run_id: &str) -> std::io::Result<()> {
        let text = format!(
            "Area           : {}\nRun ID         : {}\nPages scraped  : {}\nTotal URLs     : {}\nUnique URLs    : {}\nTimestamp      : {}\n",
            self.area,
            run_id,
            self.pages_scraped,
            self.total_urls,
            self.unique_urls,
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
        );
        crate::exporter::write_text(path, &text)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsolidationSummary {
    pub files_processed: usize,
    pub files_failed: usize,
    pub total_input_rows: usize,
    pub unique_output_rows: usize,
    pub duplicates_dropped: usize,
}

impl fmt::Display for ConsolidationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Files combined     : {}", self.files_processed)?;
        writeln!(f, "Files skipped      : {}", self.files_failed)?;
        writeln!(f, "Input rows         : {}", self.total_input_rows)?;
        writeln!(f, "Unique listings    : {}", self.unique_output_rows)?;
        write!(f, "Duplicates dropped : {}", self.duplicates_dropped)
    }
}

/// A value that is either known or explicitly missing.
///
/// Serialized as the plain value, or as [`MISSING`]; never as an empty cell.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Field<T> {
    Value(T),
    #[default]
    Missing,
}

impl<T> Field<T> {
    pub fn is_missing(&self) -> bool {
        matches!(self, Field::Missing)
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Field::Missing, Field::Value)
    }
}

impl<T: fmt::Display> Serialize for Field<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Field::Value(v) => serializer.collect_str(v),
            Field::Missing => serializer.serialize_str(MISSING),
        }
    }
}

impl<'de, T: FromStr> Deserialize<'de> for Field<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let raw = raw.trim();
        if raw.is_empty() || raw == MISSING {
            return Ok(Field::Missing);
        }
        raw.parse()
            .map(Field::Value)
            .map_err(|_| D::Error::custom(format!("invalid field value '{}'", raw)))
    }
}

/// Binary amenity signal, written as `1` / `0`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flag(pub bool);

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.0 { "1" } else { "0" })
    }
}

impl FromStr for Flag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1" | "yes" | "true" | "y" | "oui" | "ja" => Ok(Flag(true)),
            "0" | "no" | "false" | "n" | "non" | "nee" => Ok(Flag(false)),
            other => Err(format!("not a yes/no value: {}", other)),
        }
    }
}

/// Open-vocabulary category as the site words it, normalized for comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category(String);

impl Category {
    pub fn new(raw: &str) -> Self {
        Category(
            raw.split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase(),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Category {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Category::new(s))
    }
}

/// One row of the final dataset. Field order is the column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingDetailRecord {
    pub town: String,
    pub page: u32,
    pub url: String,
    pub property_type: Field<Category>,
    pub price: Field<u64>,
    pub address: Field<String>,
    pub postal_code: Field<String>,
    pub city: Field<String>,
    pub bedrooms: Field<u32>,
    pub bedroom1_surface: Field<f64>,
    pub bedroom2_surface: Field<f64>,
    pub bathrooms: Field<u32>,
    pub toilets: Field<u32>,
    pub surface_livable: Field<f64>,
    pub terrace: Field<Flag>,
    pub terrace_surface: Field<f64>,
    pub terrace_orientation: Field<Category>,
    pub floor: Field<i32>,
    pub year_built: Field<i32>,
    pub condition: Field<Category>,
    pub kitchen_equipment: Field<Category>,
    pub cellar: Field<Flag>,
    pub glazing_type: Field<Category>,
    pub elevator: Field<Flag>,
    pub entry_phone: Field<Flag>,
    pub epc_score: Field<f64>,
    pub epc_total: Field<f64>,
    pub epc_valid_until: Field<NaiveDate>,
}

impl ListingDetailRecord {
    /// A record for `url` with every extracted field set to missing
    pub fn empty(town: &str, page: u32, url: &str) -> Self {
        Self {
            town: town.to_string(),
            page,
            url: url.to_string(),
            property_type: Field::Missing,
            price: Field::Missing,
            address: Field::Missing,
            postal_code: Field::Missing,
            city: Field::Missing,
            bedrooms: Field::Missing,
            bedroom1_surface: Field::Missing,
            bedroom2_surface: Field::Missing,
            bathrooms: Field::Missing,
            toilets: Field::Missing,
            surface_livable: Field::Missing,
            terrace: Field::Missing,
            terrace_surface: Field::Missing,
            terrace_orientation: Field::Missing,
            floor: Field::Missing,
            year_built: Field::Missing,
            condition: Field::Missing,
            kitchen_equipment: Field::Missing,
            cellar: Field::Missing,
            glazing_type: Field::Missing,
            elevator: Field::Missing,
            entry_phone: Field::Missing,
            epc_score: Field::Missing,
            epc_total: Field::Missing,
            epc_valid_until: Field::Missing,
        }
    }
}
