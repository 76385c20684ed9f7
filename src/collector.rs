//!
//! src/collector.rs  Andrew Belles  Oct 18th, 2026
//!
//! Defines the collector: for every target year walk the curated
//! playlists (or the album search) once per market, dedup by track id,
//! enrich with artist metadata and hand the cleaned table to the csv sink.
//!
//! Every call is awaited in order. A failed page, shard or batch only
//! loses that item; an auth failure ends the run
//!

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{CollectorConfig, PlaylistCatalog, PlaylistEntry};
use crate::errors::EtlError;
use crate::fetch::CatalogApi;
use crate::sink::{CsvSink, RawArchive, RawType};
use crate::types::{ArtistId, ArtistMeta, CandidateTrack, SpotifyTrackId, TrackRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ShardMode {
    Letters,
    Bigrams
}

impl ShardMode {
    /// letters => 0..9 + a..z (36), bigrams => 0..9 + aa..zz (686)
    pub fn shards(self) -> Vec<String> {
        let digits = (0..10).map(|d| d.to_string());
        let letters = || ('a'..='z').map(|c| c.to_string());
        match self {
            ShardMode::Letters => digits.chain(letters()).collect(),
            ShardMode::Bigrams => digits
                .chain(letters().flat_map(|a| letters().map(move |b| format!("{a}{b}"))))
                .collect()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Playlists,
    Search { shards: ShardMode, max_pages_per_shard: Option<u32> }
}

#[derive(Debug, Clone)]
pub struct CollectOptions {
    pub source: Source,
    pub max_tracks: usize,
    /// Walked in order into one table per year, the first market to
    /// see a track wins
    pub markets: Vec<String>,
    pub enrich_artists: bool,
    /// Search mode only, album track listings carry no popularity
    pub enrich_track_popularity: bool
}

impl CollectOptions {
    pub fn from_config(cfg: &CollectorConfig) -> Self {
        Self {
            source: Source::Playlists,
            max_tracks: cfg.max_tracks,
            markets: vec![cfg.market.clone()],
            enrich_artists: true,
            enrich_track_popularity: true
        }
    }

    /// Upper cased, repeats dropped. Falls back to `default` when empty
    pub fn set_markets<S: AsRef<str>>(&mut self, markets: &[S], default: &str) {
        let mut seen = HashSet::new();
        self.markets = markets.iter()
            .map(|m| m.as_ref().trim().to_uppercase())
            .filter(|m| !m.is_empty() && seen.insert(m.clone()))
            .collect();
        if self.markets.is_empty() {
            self.markets.push(default.to_uppercase());
        }
    }
}

/// What happened to one year, logged at the end of the run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct YearReport {
    pub year: i32,
    pub listings_walked: usize,
    pub listings_failed: usize,
    pub batches_failed: usize,
    pub tracks: usize,
    pub skipped: bool,
    pub cancelled: bool,
    pub path: Option<PathBuf>
}

/// First occurrence wins, capped at the year's budget
struct TrackSet {
    tracks: Vec<CandidateTrack>,
    seen: HashSet<SpotifyTrackId>,
    budget: usize
}

impl TrackSet {
    fn new(budget: usize) -> Self {
        Self { tracks: Vec::new(), seen: HashSet::new(), budget }
    }

    fn is_full(&self) -> bool {
        self.tracks.len() >= self.budget
    }

    fn insert(&mut self, track: CandidateTrack) -> bool {
        if self.is_full() || !self.seen.insert(track.track_id.clone()) {
            return false;
        }
        self.tracks.push(track);
        true
    }
}

/// Keeps fatal errors, logs and swallows the rest
fn absorb(e: EtlError, what: &'static str, key: &str) -> Result<(), EtlError> {
    if e.is_fatal() {
        return Err(e);
    }
    warn!(error = %e, key = %key, "{what}");
    Ok(())
}

fn paging_items(page: &Value) -> &[Value] {
    page.get("items").and_then(|v| v.as_array()).map(|a| a.as_slice()).unwrap_or(&[])
}

fn has_next(page: &Value) -> bool {
    page.get("next").map(|v| !v.is_null()).unwrap_or(false)
}

pub struct Collector<'a, C: CatalogApi> {
    api: &'a C,
    cfg: CollectorConfig,
    catalog: PlaylistCatalog,
    sink: CsvSink,
    archive: Option<RawArchive>,

    // stops the walk between pages, a cut year is never written
    shutdown: CancellationToken
}

impl<'a, C: CatalogApi> Collector<'a, C> {
    pub fn new(
        api: &'a C,
        cfg: &CollectorConfig,
        catalog: PlaylistCatalog,
        sink: CsvSink,
        archive: Option<RawArchive>
    ) -> Self {
        Self {
            api,
            cfg: cfg.clone(),
            catalog,
            sink,
            archive,
            shutdown: CancellationToken::new()
        }
    }

    pub fn shutdown(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    fn halted(&self, set: &TrackSet) -> bool {
        self.shutdown.is_cancelled() || set.is_full()
    }

    /// Authenticates once, then collects and writes each year in turn.
    /// Only an auth failure comes back as Err
    pub async fn run(&self, years: &[i32], opts: &CollectOptions) ->
        Result<Vec<YearReport>, EtlError> {
        self.api.authenticate().await?;
        info!(years = ?years, source = ?opts.source, markets = ?opts.markets,
            max_tracks = opts.max_tracks, "collect.start");

        let mut reports = Vec::with_capacity(years.len());
        for &year in years {
            if self.shutdown.is_cancelled() {
                warn!(year, "collect.year.cancelled");
                break;
            }
            let (records, mut report) = self.collect_year(year, opts).await?;
            if report.cancelled {
                warn!(year, tracks = records.len(), "collect.year.discarded");
            } else if !report.skipped {
                match self.sink.write_year(year, &records) {
                    Ok(path) => {
                        info!(year, tracks = records.len(), path = %path.display(),
                            "collect.year.written");
                        report.path = Some(path);
                    }
                    Err(e) => error!(year, error = %e, "collect.year.write_failed")
                }
            }
            reports.push(report);
        }

        info!(years = reports.len(),
            written = reports.iter().filter(|r| r.path.is_some()).count(),
            "collect.done");
        Ok(reports)
    }

    pub async fn collect_year(&self, year: i32, opts: &CollectOptions) ->
        Result<(Vec<TrackRecord>, YearReport), EtlError> {
        let mut report = YearReport { year, ..YearReport::default() };
        let mut set = TrackSet::new(opts.max_tracks);

        match &opts.source {
            Source::Playlists => {
                let playlists = self.catalog.for_year(year);
                if playlists.is_empty() {
                    warn!(year, "collect.year.no_playlists");
                    report.skipped = true;
                    return Ok((Vec::new(), report));
                }
                for market in &opts.markets {
                    if self.halted(&set) {
                        break;
                    }
                    info!(year, market = %market, playlists = playlists.len(),
                        "collect.year.start");
                    for entry in &playlists {
                        if self.halted(&set) {
                            break;
                        }
                        report.listings_walked += 1;
                        if !self.walk_playlist(year, entry, market, &mut set).await? {
                            report.listings_failed += 1;
                        }
                    }
                }
            }
            Source::Search { shards, max_pages_per_shard } => {
                // an album found under one market is not walked again
                let mut seen_albums = HashSet::new();
                for market in &opts.markets {
                    if self.halted(&set) {
                        break;
                    }
                    info!(year, market = %market, shards = ?shards, "collect.year.start");
                    let albums = self.search_albums(
                        year, *shards, *max_pages_per_shard, market, &mut seen_albums, &mut report
                    ).await?;
                    for album in &albums {
                        if self.halted(&set) {
                            break;
                        }
                        report.listings_walked += 1;
                        if !self.walk_album(year, album, market, &mut set).await? {
                            report.listings_failed += 1;
                        }
                    }
                    if opts.enrich_track_popularity && !self.shutdown.is_cancelled() {
                        report.batches_failed += self.fill_popularity(
                            year, &mut set.tracks, market
                        ).await?;
                    }
                }
            }
        }
        if set.is_full() {
            debug!(year, budget = opts.max_tracks, "collect.year.budget_reached");
        }

        if self.shutdown.is_cancelled() {
            report.cancelled = true;
            return Ok((Vec::new(), report));
        }

        let candidates = set.tracks;
        let artists = if opts.enrich_artists {
            let (artists, failed) = self.fetch_artists(year, &candidates).await?;
            report.batches_failed += failed;
            artists
        } else {
            HashMap::new()
        };

        let records: Vec<TrackRecord> = candidates.into_iter()
            .map(|c| {
                let meta = c.primary_artist().and_then(|id| artists.get(id));
                c.into_record(year, meta)
            })
            .collect();

        report.tracks = records.len();
        info!(year, tracks = report.tracks, failed = report.listings_failed,
            "collect.year.done");
        Ok((records, report))
    }

    fn archive(&self, kind: RawType, year: i32, key: &str, page: &Value) {
        if let Some(archive) = &self.archive {
            if let Err(e) = archive.write_json(kind, year, key, page.clone()) {
                warn!(error = %e, key = %key, "archive.write_failed");
            }
        }
    }

    /// Pages one playlist. Returns false when a page failed, rows from
    /// earlier pages stay in the set
    async fn walk_playlist(
        &self,
        year: i32,
        entry: &PlaylistEntry,
        market: &str,
        set: &mut TrackSet
    ) -> Result<bool, EtlError> {
        let limit = self.cfg.playlist_page_limit;
        let source = format!("playlist:{}", entry.id);
        let mut offset = 0_u32;
        let mut added = 0_usize;

        loop {
            let page = match self.api.playlist_tracks(&entry.id, limit, offset, market).await {
                Ok(page) => page,
                Err(e) => {
                    absorb(e, "playlist.page.error",
                        &format!("{}@{offset}/{market}", entry.id))?;
                    return Ok(false);
                }
            };
            self.archive(RawType::PlaylistPage, year,
                &format!("{}_{market}_{offset}", entry.id), &page);

            let items = paging_items(&page);
            for item in items {
                let Some(track) = item.get("track").filter(|t| !t.is_null()) else {
                    continue;
                };
                if let Some(candidate) = CandidateTrack::new(track, &source) {
                    if set.insert(candidate) {
                        added += 1;
                    }
                }
                if set.is_full() {
                    break;
                }
            }

            if set.is_full() || items.is_empty() || !has_next(&page)
                || self.shutdown.is_cancelled() {
                break;
            }
            offset += limit;
        }

        info!(year, playlist = %entry.id, label = ?entry.label, market, added, "playlist.done");
        Ok(true)
    }

    /// Album search sharded on the artist field, keeping albums released
    /// in the target year and not already in `seen`. Album order follows
    /// discovery order
    async fn search_albums(
        &self,
        year: i32,
        shards: ShardMode,
        max_pages: Option<u32>,
        market: &str,
        seen: &mut HashSet<String>,
        report: &mut YearReport
    ) -> Result<Vec<AlbumRef>, EtlError> {
        let limit = self.cfg.search_page_limit;
        let prefix = year.to_string();
        let mut albums = Vec::new();

        for shard in shards.shards() {
            if self.shutdown.is_cancelled() {
                break;
            }
            let query = format!("year:{year} artist:{shard}");
            let mut offset = 0_u32;
            let mut pages = 0_u32;
            loop {
                let page = match self.api.search_albums(&query, limit, offset, market).await {
                    Ok(page) => page,
                    Err(e) => {
                        absorb(e, "search.page.error", &format!("{shard}@{offset}/{market}"))?;
                        report.listings_failed += 1;
                        break;
                    }
                };
                self.archive(RawType::SearchPage, year,
                    &format!("{shard}_{market}_{offset}"), &page);

                let Some(block) = page.get("albums") else { break };
                for album in paging_items(block) {
                    let release = album.get("release_date").and_then(|v| v.as_str())
                        .unwrap_or("");
                    if !release.starts_with(&prefix) {
                        continue;
                    }
                    let Some(id) = album.get("id").and_then(|v| v.as_str()) else {
                        continue;
                    };
                    if seen.insert(id.to_string()) {
                        albums.push(AlbumRef {
                            id: id.to_string(),
                            name: album.get("name").and_then(|v| v.as_str())
                                .map(str::to_string),
                            release_date: release.to_string(),
                            shard: shard.clone()
                        });
                    }
                }

                pages += 1;
                if !has_next(block) || max_pages.is_some_and(|m| pages >= m) {
                    break;
                }
                offset += limit;
            }
        }

        info!(year, market, albums = albums.len(), "search.done");
        Ok(albums)
    }

    async fn walk_album(
        &self,
        year: i32,
        album: &AlbumRef,
        market: &str,
        set: &mut TrackSet
    ) -> Result<bool, EtlError> {
        let limit = self.cfg.album_tracks_limit;
        let source = format!("search:{}", album.shard);
        let mut offset = 0_u32;

        loop {
            let page = match self.api.album_tracks(&album.id, limit, offset, market).await {
                Ok(page) => page,
                Err(e) => {
                    absorb(e, "album.page.error", &format!("{}@{offset}", album.id))?;
                    return Ok(false);
                }
            };
            self.archive(RawType::AlbumTracksPage, year, &format!("{}_{offset}", album.id), &page);

            let items = paging_items(&page);
            for track in items {
                if let Some(mut candidate) = CandidateTrack::new(track, &source) {
                    // simplified track objects carry no album
                    candidate.album_name = candidate.album_name.or_else(|| album.name.clone());
                    candidate.release_date = candidate.release_date
                        .or_else(|| Some(album.release_date.clone()));
                    set.insert(candidate);
                }
                if set.is_full() {
                    return Ok(true);
                }
            }

            if items.is_empty() || !has_next(&page) || self.shutdown.is_cancelled() {
                return Ok(true);
            }
            offset += limit;
        }
    }

    /// Batch fills popularity for tracks that came without one. Returns
    /// the number of failed batches
    async fn fill_popularity(
        &self,
        year: i32,
        tracks: &mut [CandidateTrack],
        market: &str
    ) -> Result<usize, EtlError> {
        let missing: Vec<SpotifyTrackId> = tracks.iter()
            .filter(|t| t.popularity.is_none())
            .map(|t| t.track_id.clone())
            .collect();
        if missing.is_empty() {
            return Ok(0);
        }

        let mut popularity: HashMap<SpotifyTrackId, u8> = HashMap::new();
        let mut failed = 0;
        for batch in missing.chunks(self.cfg.batch_limit.max(1)) {
            if self.shutdown.is_cancelled() {
                break;
            }
            match self.api.tracks(batch, market).await {
                Ok(body) => {
                    self.archive(RawType::Tracks, year, &batch[0].0, &body);
                    let found = body.get("tracks").and_then(|v| v.as_array())
                        .map(|a| a.as_slice()).unwrap_or(&[]);
                    for full in found.iter().filter(|t| !t.is_null()) {
                        if let Some(c) = CandidateTrack::new(full, "") {
                            if let Some(p) = c.popularity {
                                popularity.insert(c.track_id, p);
                            }
                        }
                    }
                }
                Err(e) => {
                    absorb(e, "tracks.batch.error", &batch[0].0)?;
                    failed += 1;
                }
            }
        }

        for track in tracks.iter_mut() {
            if track.popularity.is_none() {
                track.popularity = popularity.get(&track.track_id).copied();
            }
        }
        Ok(failed)
    }

    /// Artist metadata for every distinct primary artist, fetched in
    /// batches. Returns the map and the number of failed batches
    async fn fetch_artists(&self, year: i32, tracks: &[CandidateTrack]) ->
        Result<(HashMap<ArtistId, ArtistMeta>, usize), EtlError> {
        let mut seen = HashSet::new();
        let ids: Vec<ArtistId> = tracks.iter()
            .filter_map(|t| t.primary_artist())
            .filter(|id| seen.insert((*id).clone()))
            .cloned()
            .collect();

        let mut artists = HashMap::with_capacity(ids.len());
        let mut failed = 0;
        for batch in ids.chunks(self.cfg.batch_limit.max(1)) {
            match self.api.artists(batch).await {
                Ok(body) => {
                    self.archive(RawType::Artists, year, &batch[0].0, &body);
                    let found = body.get("artists").and_then(|v| v.as_array())
                        .map(|a| a.as_slice()).unwrap_or(&[]);
                    for meta in found.iter().filter_map(ArtistMeta::new) {
                        artists.insert(meta.id.clone(), meta);
                    }
                }
                Err(e) => {
                    absorb(e, "artists.batch.error", &batch[0].0)?;
                    failed += 1;
                }
            }
        }

        debug!(year, requested = ids.len(), found = artists.len(), "artists.done");
        Ok((artists, failed))
    }
}

#[derive(Debug, Clone)]
struct AlbumRef {
    id: String,
    name: Option<String>,
    release_date: String,
    shard: String
}
