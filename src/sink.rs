//!
//! src/sink.rs  Andrew Belles  Oct 18th, 2026
//!
//! Writers for everything the collector puts on disk: the yearly CSV
//! tables and, optionally, a zstd compressed archive of raw responses.
//! Both write to a temp file in the target directory and rename over
//! the destination, so a crashed run never leaves half a file behind
//!

use std::{fs, io, path::{Path, PathBuf}};
use serde::Serialize;
use serde_json::Value;
use tempfile::NamedTempFile;

use crate::errors::EtlError;
use crate::types::{CSV_COLUMNS, TrackRecord};

/// `<prefix>_<year>.csv`
pub fn year_file_name(prefix: &str, year: i32) -> String {
    format!("{prefix}_{year}.csv")
}

/// Inverse of `year_file_name`, None for anything else in the directory
pub fn parse_year_file_name(prefix: &str, file_name: &str) -> Option<i32> {
    file_name
        .strip_prefix(prefix)?
        .strip_prefix('_')?
        .strip_suffix(".csv")?
        .parse::<i32>()
        .ok()
}

fn temp_in(dir: &Path) -> Result<NamedTempFile, EtlError> {
    fs::create_dir_all(dir)?;
    NamedTempFile::new_in(dir)
        .map_err(|e| EtlError::Io(std::io::Error::new(
            e.kind(), format!("tempfile in {}: {e}", dir.display())
        )))
}

fn persist(temp: NamedTempFile, path: &Path) -> Result<(), EtlError> {
    temp.persist(path)
        .map_err(|e| EtlError::Io(std::io::Error::new(
            e.error.kind(), format!("persist {}: {}", path.display(), e.error)
        )))?;
    Ok(())
}

/// Header then one serialized row per item. The header is written even
/// for an empty table so readers still see a valid schema
pub fn write_rows<W, T>(writer: W, columns: &[&str], rows: impl IntoIterator<Item = T>)
    -> Result<(), EtlError>
where
    W: io::Write,
    T: Serialize
{
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    writer.write_record(columns)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Replaces `path` with a csv of `rows`, through a temp file next to it
pub fn write_table<T: Serialize>(path: &Path, columns: &[&str], rows: &[T])
    -> Result<(), EtlError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new(".")
    };
    let temp = temp_in(dir)?;
    write_rows(temp.as_file(), columns, rows)?;
    persist(temp, path)
}

pub struct CsvSink {
    root: PathBuf,
    prefix: String
}

impl CsvSink {
    pub fn new(root: impl AsRef<Path>, prefix: &str) -> Self {
        Self { root: root.as_ref().to_path_buf(), prefix: prefix.to_string() }
    }

    pub fn path_for(&self, year: i32) -> PathBuf {
        self.root.join(year_file_name(&self.prefix, year))
    }

    /// Replaces the year's file with `records`
    pub fn write_year(&self, year: i32, records: &[TrackRecord]) -> Result<PathBuf, EtlError> {
        let path = self.path_for(year);
        write_table(&path, &CSV_COLUMNS, records)?;
        Ok(path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawType {
    PlaylistPage,
    SearchPage,
    AlbumTracksPage,
    Artists,
    Tracks
}

impl RawType {
    fn dir(self) -> &'static str {
        match self {
            RawType::PlaylistPage    => "playlist",
            RawType::SearchPage      => "search",
            RawType::AlbumTracksPage => "album",
            RawType::Artists         => "artists",
            RawType::Tracks          => "tracks"
        }
    }
}

pub struct RawArchive {
    root: PathBuf,
    level: i32
}

impl RawArchive {
    pub fn new(root: impl AsRef<Path>, level: i32) -> Self {
        Self { root: root.as_ref().to_path_buf(), level: level.clamp(0, 21) }
    }

    pub fn write_json(&self, kind: RawType, year: i32, key: &str, mut json: Value) ->
        Result<PathBuf, EtlError> {

        Self::prune(&mut json);

        let path = self.root
            .join(year.to_string())
            .join(kind.dir())
            .join(format!("{}.json.zst", Self::sanitize_key(key)));
        let parent = path.parent()
            .ok_or_else(|| EtlError::Config(format!("no parent for {}", path.display())))?;
        let temp = temp_in(parent)?;

        {
            let mut enc = zstd::stream::write::Encoder::new(temp.as_file(), self.level)?;
            serde_json::to_writer(&mut enc, &json)?;
            enc.finish()?;
        }

        persist(temp, &path)?;
        Ok(path)
    }

    fn sanitize_key(key: &str) -> String {
        key.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }

    /// Drops bulky keys we never read back
    fn prune(v: &mut Value) {
        Self::drop_keys_recursive(v, &[
            "available_markets", "images", "preview_url", "external_urls",
            "href", "uri", "is_playable", "video_thumbnail"
        ]);
    }

    fn drop_keys_recursive(v: &mut Value, keys: &[&str]) {
        match v {
            Value::Object(map) => {
                for key in keys {
                    map.remove(*key);
                }
                for val in map.values_mut() {
                    Self::drop_keys_recursive(val, keys);
                }
            }
            Value::Array(arr) => {
                for element in arr {
                    Self::drop_keys_recursive(element, keys);
                }
            }
            _ => {}
        }
    }
}
