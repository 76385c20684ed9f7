//!
//! src/explorer.rs  Andrew Belles  Oct 18th, 2026
//!
//! Artist explorer. Pages the artist search for a free form query,
//! keeps artists at or above a popularity floor and accumulates them
//! into one CSV, deduplicated by artist id. Stops early and reports
//! where to resume when a page fails
//!

use std::{collections::HashSet, path::Path};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::errors::EtlError;
use crate::fetch::CatalogApi;
use crate::sink::write_table;
use crate::types::{ArtistMeta, FOLLOWERS_UNKNOWN};

pub const ARTIST_COLUMNS: [&str; 6] = [
    "id", "name", "popularity", "followers", "genres", "link"
];

/// Largest page the search endpoint serves
pub const ARTIST_PAGE_MAX: u32 = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtistRow {
    pub id: String,
    pub name: String,
    pub popularity: u8,
    pub followers: i64,
    /// Every listed genre, comma separated
    pub genres: String,
    #[serde(default)]
    pub link: String
}

impl ArtistRow {
    pub fn new(artist: &Value) -> Option<Self> {
        let meta = ArtistMeta::new(artist)?;
        Some(Self {
            id: meta.id.0,
            name: meta.name.unwrap_or_default(),
            popularity: meta.popularity.unwrap_or(0),
            followers: meta.followers
                .and_then(|f| i64::try_from(f).ok())
                .unwrap_or(FOLLOWERS_UNKNOWN),
            genres: meta.genres.join(", "),
            link: artist.pointer("/external_urls/spotify")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string()
        })
    }
}

#[derive(Debug, Clone)]
pub struct ExploreOptions {
    pub query: String,
    pub limit: u32,
    pub pages: u32,
    pub min_popularity: u8,
    pub offset: u32
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Exploration {
    pub artists: Vec<ArtistRow>,
    pub pages_fetched: u32,
    /// Where a follow up search picks up, None once the results run out
    pub next_offset: Option<u32>
}

/// Walks up to `pages` result pages starting at `offset`
pub async fn explore<C: CatalogApi>(api: &C, opts: &ExploreOptions)
    -> Result<Exploration, EtlError> {
    let limit = opts.limit.clamp(1, ARTIST_PAGE_MAX);
    let mut offset = opts.offset;
    let mut out = Exploration::default();

    for _ in 0..opts.pages.max(1) {
        let page = match api.search_artists(&opts.query, limit, offset).await {
            Ok(page) => page,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(error = %e, query = %opts.query, offset, "explore.page.error");
                out.next_offset = Some(offset);
                break;
            }
        };
        out.pages_fetched += 1;

        let block = page.get("artists").unwrap_or(&Value::Null);
        let items = block.get("items").and_then(|v| v.as_array())
            .map(|a| a.as_slice())
            .unwrap_or(&[]);
        if items.is_empty() {
            out.next_offset = None;
            break;
        }
        out.artists.extend(
            items.iter()
                .filter_map(ArtistRow::new)
                .filter(|a| a.popularity >= opts.min_popularity)
        );

        if block.get("next").is_some_and(|v| !v.is_null()) {
            offset += limit;
            out.next_offset = Some(offset);
        } else {
            out.next_offset = None;
            break;
        }
    }

    info!(query = %opts.query, pages = out.pages_fetched, artists = out.artists.len(),
        next_offset = ?out.next_offset, "explore.done");
    Ok(out)
}

/// Appends `fresh` to `existing`, the first row seen for an id wins
pub fn merge(existing: Vec<ArtistRow>, fresh: Vec<ArtistRow>) -> Vec<ArtistRow> {
    let mut seen = HashSet::new();
    existing.into_iter()
        .chain(fresh)
        .filter(|a| seen.insert(a.id.clone()))
        .collect()
}

/// Rows of an earlier export, empty when the file does not exist yet
pub fn read_artists(path: &Path) -> Result<Vec<ArtistRow>, EtlError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = csv::Reader::from_path(path)?;
    let rows = reader.deserialize::<ArtistRow>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| EtlError::DataFormat(format!("{}: {e}", path.display())))?;
    Ok(rows)
}

pub fn write_artists(path: &Path, rows: &[ArtistRow]) -> Result<(), EtlError> {
    write_table(path, &ARTIST_COLUMNS, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use crate::types::{ArtistId, SpotifyTrackId};

    /// Serves `pages` in order, one per search call
    struct ArtistPages {
        pages: Vec<Result<Value, &'static str>>,
        offsets: Mutex<Vec<u32>>
    }

    fn artist(id: &str, popularity: i64) -> Value {
        json!({
            "id": id, "name": format!("Artist {id}"), "popularity": popularity,
            "genres": ["sertanejo", "agronejo"], "followers": { "total": 1200 },
            "external_urls": { "spotify": format!("https://open.spotify.com/artist/{id}") }
        })
    }

    fn page(items: Vec<Value>, more: bool) -> Result<Value, &'static str> {
        let next = if more { json!("n") } else { Value::Null };
        Ok(json!({ "artists": { "items": items, "next": next } }))
    }

    #[async_trait]
    impl CatalogApi for ArtistPages {
        async fn authenticate(&self) -> Result<(), EtlError> { Ok(()) }

        async fn playlist_tracks(&self, _: &str, _: u32, _: u32, _: &str)
            -> Result<Value, EtlError> { unreachable!() }

        async fn search_albums(&self, _: &str, _: u32, _: u32, _: &str)
            -> Result<Value, EtlError> { unreachable!() }

        async fn search_artists(&self, _query: &str, _limit: u32, offset: u32)
            -> Result<Value, EtlError> {
            let mut offsets = self.offsets.lock().unwrap();
            let idx = offsets.len();
            offsets.push(offset);
            match self.pages.get(idx) {
                Some(Ok(v)) => Ok(v.clone()),
                Some(Err(msg)) if *msg == "auth" => Err(EtlError::Auth("expired".into())),
                Some(Err(msg)) => Err(EtlError::Fetch(msg.to_string())),
                None => Ok(json!({ "artists": { "items": [], "next": null } }))
            }
        }

        async fn album_tracks(&self, _: &str, _: u32, _: u32, _: &str)
            -> Result<Value, EtlError> { unreachable!() }

        async fn artists(&self, _: &[ArtistId]) -> Result<Value, EtlError> { unreachable!() }

        async fn tracks(&self, _: &[SpotifyTrackId], _: &str) -> Result<Value, EtlError> {
            unreachable!()
        }
    }

    fn fake(pages: Vec<Result<Value, &'static str>>) -> ArtistPages {
        ArtistPages { pages, offsets: Mutex::new(Vec::new()) }
    }

    fn opts(pages: u32, min_popularity: u8) -> ExploreOptions {
        ExploreOptions {
            query: "genre:sertanejo".into(),
            limit: 20,
            pages,
            min_popularity,
            offset: 40
        }
    }

    #[test]
    fn row_joins_genres_and_defaults_followers() {
        let row = ArtistRow::new(&artist("a1", 70)).unwrap();
        assert_eq!(row.genres, "sertanejo, agronejo");
        assert_eq!(row.followers, 1200);
        assert_eq!(row.link, "https://open.spotify.com/artist/a1");

        let bare = ArtistRow::new(&json!({ "id": "a2" })).unwrap();
        assert_eq!(bare.followers, FOLLOWERS_UNKNOWN);
        assert_eq!(bare.popularity, 0);
        assert!(ArtistRow::new(&json!({ "name": "no id" })).is_none());
    }

    #[tokio::test]
    async fn pages_from_offset_and_filters_by_popularity() {
        let api = fake(vec![
            page(vec![artist("a1", 80), artist("a2", 10)], true),
            page(vec![artist("a3", 55)], true),
        ]);
        let out = explore(&api, &opts(2, 50)).await.unwrap();

        let ids: Vec<&str> = out.artists.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "a3"]);
        assert_eq!(*api.offsets.lock().unwrap(), vec![40, 60]);
        assert_eq!(out.pages_fetched, 2);
        assert_eq!(out.next_offset, Some(80));
    }

    #[tokio::test]
    async fn last_page_clears_the_resume_offset() {
        let api = fake(vec![page(vec![artist("a1", 80)], false)]);
        let out = explore(&api, &opts(5, 0)).await.unwrap();
        assert_eq!(out.artists.len(), 1);
        assert_eq!(out.next_offset, None);
        assert_eq!(api.offsets.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_page_keeps_earlier_rows_and_resumes_there() {
        let api = fake(vec![page(vec![artist("a1", 80)], true), Err("502")]);
        let out = explore(&api, &opts(3, 0)).await.unwrap();
        assert_eq!(out.artists.len(), 1);
        assert_eq!(out.next_offset, Some(60));

        let api = fake(vec![Err("auth")]);
        let err = explore(&api, &opts(3, 0)).await.unwrap_err();
        assert!(matches!(err, EtlError::Auth(_)));
    }

    #[test]
    fn accumulated_export_dedups_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artists.csv");
        assert!(read_artists(&path).unwrap().is_empty());

        let first: Vec<ArtistRow> = ["a1", "a2"].iter()
            .filter_map(|id| ArtistRow::new(&artist(id, 60)))
            .collect();
        write_artists(&path, &first).unwrap();

        let mut again = ArtistRow::new(&artist("a2", 99)).unwrap();
        again.name = "renamed".into();
        let fresh = vec![again, ArtistRow::new(&artist("a3", 60)).unwrap()];
        let merged = merge(read_artists(&path).unwrap(), fresh);
        write_artists(&path, &merged).unwrap();

        let rows = read_artists(&path).unwrap();
        let ids: Vec<&str> = rows.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "a2", "a3"]);
        assert_eq!(rows[1].name, "Artist a2");
        assert_eq!(rows[1].genres, "sertanejo, agronejo");
    }
}
