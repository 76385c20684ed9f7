//!
//! src/presenter/load.rs  Andrew Belles  Oct 18th, 2026
//!
//! Loads every `<prefix>_<year>.csv` under the data directory into one
//! combined table. Nothing here is fatal: a missing or malformed file
//! becomes a warning and the dashboard works with what is left
//!

use std::{collections::{BTreeMap, BTreeSet, HashSet}, fs, path::{Path, PathBuf}};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::PresenterConfig;
use crate::errors::EtlError;
use crate::presenter::stats::GenreCategory;
use crate::sink::parse_year_file_name;
use crate::types::{POPULARITY_MAX, TrackRecord};

/// Columns without a serde default, a file lacking any of them is skipped
pub const REQUIRED_COLUMNS: [&str; 9] = [
    "year", "track_id", "name", "artist_name", "duration_ms",
    "popularity", "explicit", "genre", "followers"
];

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FileReport {
    pub year: i32,
    pub path: PathBuf,
    pub rows: usize,
    pub rejected: usize,
    pub cleaned: usize
}

/// Combined table, immutable for the rest of the session
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub records: Vec<TrackRecord>,
    pub files: Vec<FileReport>,
    pub warnings: Vec<String>
}

impl Dataset {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn years(&self) -> Vec<i32> {
        self.records.iter()
            .map(|r| r.year)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Genre categories present in the table, alphabetical
    pub fn genres(&self) -> Vec<&'static str> {
        self.records.iter()
            .map(|r| GenreCategory::of(&r.genre).label())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Year -> file for every matching name in `dir`
pub fn discover(dir: &Path, prefix: &str) -> Result<BTreeMap<i32, PathBuf>, EtlError> {
    let entries = fs::read_dir(dir)
        .map_err(|e| EtlError::DataFormat(format!("read data dir {}: {e}", dir.display())))?;

    let mut found = BTreeMap::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(year) = name.to_str().and_then(|n| parse_year_file_name(prefix, n)) else {
            continue;
        };
        if entry.file_type()?.is_file() {
            found.insert(year, entry.path());
        }
    }
    Ok(found)
}

/// Reads one yearly file. Rows that do not parse, or break the value
/// ranges, are counted and dropped; a bad header rejects the file
pub fn read_year_file(path: &Path) -> Result<(Vec<TrackRecord>, usize), EtlError> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| EtlError::DataFormat(format!("open {}: {e}", path.display())))?;

    let headers = reader.headers()
        .map_err(|e| EtlError::DataFormat(format!("header of {}: {e}", path.display())))?
        .clone();
    let missing: Vec<&str> = REQUIRED_COLUMNS.iter()
        .filter(|col| !headers.iter().any(|h| h.trim() == **col))
        .copied()
        .collect();
    if !missing.is_empty() {
        return Err(EtlError::DataFormat(
            format!("{} is missing columns {missing:?}", path.display())
        ));
    }

    let mut records = Vec::new();
    let mut rejected = 0;
    for (line, row) in reader.deserialize::<TrackRecord>().enumerate() {
        match row {
            Ok(r) if r.popularity <= POPULARITY_MAX => records.push(r),
            Ok(r) => {
                debug!(path = %path.display(), track = %r.track_id, "load.row.out_of_range");
                rejected += 1;
            }
            Err(e) => {
                debug!(path = %path.display(), line = line + 2, error = %e, "load.row.invalid");
                rejected += 1;
            }
        }
    }
    Ok((records, rejected))
}

/// Drops implausible rows (before `min_valid_year`, not longer than
/// `min_valid_duration_ms`) and repeated `(year, track_id)` pairs,
/// keeping the first. Returns how many rows were removed
pub fn clean(records: &mut Vec<TrackRecord>, cfg: &PresenterConfig) -> usize {
    let before = records.len();
    let mut seen = HashSet::new();
    records.retain(|r| {
        r.year >= cfg.min_valid_year
            && r.duration_ms > cfg.min_valid_duration_ms
            && seen.insert((r.year, r.track_id.clone()))
    });
    before - records.len()
}

/// Loads the requested years (every discovered year when `years` is
/// empty) into one table
pub fn load_dataset(dir: &Path, prefix: &str, years: &[i32], cfg: &PresenterConfig) -> Dataset {
    let mut dataset = Dataset::default();

    let found = match discover(dir, prefix) {
        Ok(found) => found,
        Err(e) => {
            warn!(error = %e, "load.dir.unreadable");
            dataset.warnings.push(e.to_string());
            return dataset;
        }
    };

    let wanted: Vec<i32> = if years.is_empty() {
        found.keys().copied().collect()
    } else {
        let mut years = years.to_vec();
        years.sort_unstable();
        years.dedup();
        years
    };

    for year in wanted {
        let Some(path) = found.get(&year) else {
            let msg = format!("no file for {year} in {}", dir.display());
            warn!(year, dir = %dir.display(), "load.year.missing");
            dataset.warnings.push(msg);
            continue;
        };

        let (mut records, rejected) = match read_year_file(path) {
            Ok(read) => read,
            Err(e) => {
                warn!(year, error = %e, "load.file.skipped");
                dataset.warnings.push(e.to_string());
                continue;
            }
        };
        let rows = records.len() + rejected;
        let cleaned = clean(&mut records, cfg);
        if rejected > 0 {
            dataset.warnings.push(
                format!("{}: {rejected} malformed rows ignored", path.display())
            );
        }

        info!(year, rows, rejected, cleaned, kept = records.len(), "load.file.done");
        dataset.files.push(FileReport { year, path: path.clone(), rows, rejected, cleaned });
        dataset.records.extend(records);
    }

    info!(files = dataset.files.len(), records = dataset.records.len(),
        warnings = dataset.warnings.len(), "load.done");
    dataset
}
