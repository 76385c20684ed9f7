//!
//! src/presenter/stats.rs  Andrew Belles  Oct 18th, 2026
//!
//! Pure aggregations over the filtered rows. Every view is built from
//! a slice of borrowed records and serialized straight to the dashboard
//!

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use crate::config::PresenterConfig;
use crate::types::{GENRE_UNKNOWN, TrackRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GenreCategory {
    Sertanejo,
    Funk,
    Pagode,
    Samba,
    Forro,
    TrapHipHop,
    Pop,
    Rock,
    Other,
    Unknown
}

/// First substring hit wins, so "trap" must come before "rap" and "pop"
const GENRE_KEYS: [(&str, GenreCategory); 12] = [
    ("sertanejo", GenreCategory::Sertanejo),
    ("funk",      GenreCategory::Funk),
    ("pagode",    GenreCategory::Pagode),
    ("samba",     GenreCategory::Samba),
    ("forro",     GenreCategory::Forro),
    ("forró",     GenreCategory::Forro),
    ("trap",      GenreCategory::TrapHipHop),
    ("rap",       GenreCategory::TrapHipHop),
    ("hip hop",   GenreCategory::TrapHipHop),
    ("hip-hop",   GenreCategory::TrapHipHop),
    ("pop",       GenreCategory::Pop),
    ("rock",      GenreCategory::Rock)
];

impl GenreCategory {
    pub fn of(genre: &str) -> Self {
        let genre = genre.trim().to_lowercase();
        if genre.is_empty() || genre == GENRE_UNKNOWN {
            return GenreCategory::Unknown;
        }
        GENRE_KEYS.iter()
            .find(|(key, _)| genre.contains(key))
            .map(|(_, category)| *category)
            .unwrap_or(GenreCategory::Other)
    }

    pub fn label(self) -> &'static str {
        match self {
            GenreCategory::Sertanejo  => "Sertanejo",
            GenreCategory::Funk       => "Funk",
            GenreCategory::Pagode     => "Pagode",
            GenreCategory::Samba      => "Samba",
            GenreCategory::Forro      => "Forró",
            GenreCategory::TrapHipHop => "Trap/Hip-Hop",
            GenreCategory::Pop        => "Pop",
            GenreCategory::Rock       => "Rock",
            GenreCategory::Other      => "Other",
            GenreCategory::Unknown    => "Unknown"
        }
    }

    /// Buckets that can never be the dominant genre
    fn is_catch_all(self) -> bool {
        matches!(self, GenreCategory::Other | GenreCategory::Unknown)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Niche,
    Moderate,
    Hit
}

impl Tier {
    pub fn of(popularity: u8, cfg: &PresenterConfig) -> Self {
        if popularity <= cfg.tier_niche_max {
            Tier::Niche
        } else if popularity <= cfg.tier_moderate_max {
            Tier::Moderate
        } else {
            Tier::Hit
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0_usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Pearson r, None when there are fewer than two points or either
/// side has no variance
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let mx = mean(xs.iter().copied())?;
    let my = mean(ys.iter().copied())?;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        let (dx, dy) = (x - mx, y - my);
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return None;
    }
    Some(sxy / (sxx.sqrt() * syy.sqrt()))
}

/// Least squares (slope, intercept)
pub fn linear_fit(points: &[(f64, f64)]) -> Option<(f64, f64)> {
    if points.len() < 2 {
        return None;
    }
    let mx = mean(points.iter().map(|p| p.0))?;
    let my = mean(points.iter().map(|p| p.1))?;
    let sxx: f64 = points.iter().map(|p| (p.0 - mx).powi(2)).sum();
    if sxx == 0.0 {
        return None;
    }
    let sxy: f64 = points.iter().map(|p| (p.0 - mx) * (p.1 - my)).sum();
    let slope = sxy / sxx;
    Some((slope, my - slope * mx))
}

fn group_years<'a>(rows: &[&'a TrackRecord]) -> BTreeMap<i32, Vec<&'a TrackRecord>> {
    let mut years: BTreeMap<i32, Vec<&TrackRecord>> = BTreeMap::new();
    for r in rows {
        years.entry(r.year).or_default().push(r);
    }
    years
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Kpis {
    pub tracks: usize,
    pub mean_popularity: f64,
    pub mean_duration_min: f64,
    pub unique_artists: usize,
    pub explicit_pct: f64,
    pub mean_followers: Option<f64>
}

pub fn kpis(rows: &[&TrackRecord]) -> Kpis {
    let artists: HashSet<&str> = rows.iter()
        .map(|r| if r.artist_id.is_empty() { r.artist_name.as_str() } else { r.artist_id.as_str() })
        .collect();
    let explicit = rows.iter().filter(|r| r.explicit).count();

    Kpis {
        tracks: rows.len(),
        mean_popularity: mean(rows.iter().map(|r| r.popularity as f64)).unwrap_or(0.0),
        mean_duration_min: mean(rows.iter().map(|r| r.duration_min())).unwrap_or(0.0),
        unique_artists: artists.len(),
        explicit_pct: if rows.is_empty() { 0.0 } else {
            explicit as f64 / rows.len() as f64 * 100.0
        },
        // sentinel rows carry no follower count
        mean_followers: mean(rows.iter().filter_map(|r| r.known_followers()).map(|f| f as f64))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearDuration {
    pub year: i32,
    pub tracks: usize,
    pub mean_duration_ms: f64,
    pub mean_duration_min: f64,
    pub fitted_duration_ms: Option<f64>
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DurationTrend {
    pub by_year: Vec<YearDuration>,
    pub slope_ms_per_year: Option<f64>,
    /// Change of the mean from the first to the last year, in percent
    pub change_pct: Option<f64>
}

pub fn duration_trend(rows: &[&TrackRecord]) -> DurationTrend {
    let mut by_year: Vec<YearDuration> = group_years(rows).into_iter()
        .filter_map(|(year, rows)| {
            let mean_ms = mean(rows.iter().map(|r| r.duration_ms as f64))?;
            Some(YearDuration {
                year,
                tracks: rows.len(),
                mean_duration_ms: mean_ms,
                mean_duration_min: mean_ms / 60_000.0,
                fitted_duration_ms: None
            })
        })
        .collect();

    let points: Vec<(f64, f64)> = by_year.iter()
        .map(|y| (y.year as f64, y.mean_duration_ms))
        .collect();
    let fit = linear_fit(&points);
    if let Some((slope, intercept)) = fit {
        for y in by_year.iter_mut() {
            y.fitted_duration_ms = Some(intercept + slope * y.year as f64);
        }
    }

    let change_pct = match (by_year.first(), by_year.last()) {
        (Some(first), Some(last)) if by_year.len() > 1 && first.mean_duration_ms > 0.0 => Some(
            (last.mean_duration_ms - first.mean_duration_ms) / first.mean_duration_ms * 100.0
        ),
        _ => None
    };

    DurationTrend { by_year, slope_ms_per_year: fit.map(|f| f.0), change_pct }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearExplicit {
    pub year: i32,
    pub explicit: usize,
    pub total: usize,
    pub proportion: f64
}

pub fn explicit_share(rows: &[&TrackRecord]) -> Vec<YearExplicit> {
    group_years(rows).into_iter()
        .map(|(year, rows)| {
            let explicit = rows.iter().filter(|r| r.explicit).count();
            YearExplicit {
                year,
                explicit,
                total: rows.len(),
                proportion: explicit as f64 / rows.len() as f64
            }
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroupStats {
    pub tracks: usize,
    pub mean_popularity: Option<f64>,
    pub median_popularity: Option<f64>,
    pub mean_duration_ms: Option<f64>
}

impl GroupStats {
    fn of<'a>(rows: impl Iterator<Item = &'a TrackRecord>) -> Self {
        let rows: Vec<&TrackRecord> = rows.collect();
        Self {
            tracks: rows.len(),
            mean_popularity: mean(rows.iter().map(|r| r.popularity as f64)),
            median_popularity: median(rows.iter().map(|r| r.popularity as f64).collect()),
            mean_duration_ms: mean(rows.iter().map(|r| r.duration_ms as f64))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScatterPoint {
    pub duration_min: f64,
    pub popularity: u8,
    pub explicit: bool
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DurationPopularity {
    pub tracks: usize,
    pub pearson_r: Option<f64>,
    pub hit_threshold: u8,
    pub hits: GroupStats,
    pub non_hits: GroupStats,
    pub explicit: GroupStats,
    pub clean: GroupStats,
    pub points: Vec<ScatterPoint>
}

/// Every `ceil(n / max)`-th row, so the page never draws more than
/// `max` points. The statistics still use every row
fn sample_points(rows: &[&TrackRecord], max: usize) -> Vec<ScatterPoint> {
    let stride = rows.len().div_ceil(max.max(1)).max(1);
    rows.iter()
        .step_by(stride)
        .map(|r| ScatterPoint {
            duration_min: r.duration_min(),
            popularity: r.popularity,
            explicit: r.explicit
        })
        .collect()
}

/// Hits are rows at or above `hit_threshold`
pub fn duration_popularity(rows: &[&TrackRecord], hit_threshold: u8, max_points: usize)
    -> DurationPopularity {
    let xs: Vec<f64> = rows.iter().map(|r| r.duration_ms as f64).collect();
    let ys: Vec<f64> = rows.iter().map(|r| r.popularity as f64).collect();

    DurationPopularity {
        tracks: rows.len(),
        pearson_r: pearson(&xs, &ys),
        hit_threshold,
        hits: GroupStats::of(rows.iter().copied().filter(|r| r.popularity >= hit_threshold)),
        non_hits: GroupStats::of(rows.iter().copied().filter(|r| r.popularity < hit_threshold)),
        explicit: GroupStats::of(rows.iter().copied().filter(|r| r.explicit)),
        clean: GroupStats::of(rows.iter().copied().filter(|r| !r.explicit)),
        points: sample_points(rows, max_points)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenreCount {
    #[serde(skip)]
    pub category: GenreCategory,
    pub genre: &'static str,
    pub tracks: usize,
    pub share: f64,
    pub mean_popularity: f64
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearGenre {
    pub year: i32,
    pub genre: &'static str,
    pub tracks: usize
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenreDistribution {
    /// Most frequent first, ties by label
    pub ranked: Vec<GenreCount>,
    pub dominant: Option<&'static str>,
    /// `ranked` without the dominant genre, shares recomputed over the rest
    pub without_dominant: Vec<GenreCount>,
    pub by_year: Vec<YearGenre>
}

fn rank_genres(rows: &[&TrackRecord], skip: Option<GenreCategory>) -> Vec<GenreCount> {
    let mut groups: HashMap<GenreCategory, (usize, u64)> = HashMap::new();
    for r in rows {
        let category = GenreCategory::of(&r.genre);
        if Some(category) == skip {
            continue;
        }
        let entry = groups.entry(category).or_default();
        entry.0 += 1;
        entry.1 += r.popularity as u64;
    }

    let total: usize = groups.values().map(|g| g.0).sum();
    let mut ranked: Vec<GenreCount> = groups.into_iter()
        .map(|(category, (tracks, popularity))| GenreCount {
            category,
            genre: category.label(),
            tracks,
            share: tracks as f64 / total as f64,
            mean_popularity: popularity as f64 / tracks as f64
        })
        .collect();
    ranked.sort_by(|a, b| b.tracks.cmp(&a.tracks).then_with(|| a.genre.cmp(b.genre)));
    ranked
}

pub fn genre_distribution(rows: &[&TrackRecord]) -> GenreDistribution {
    let ranked = rank_genres(rows, None);

    let dominant = ranked.iter()
        .map(|g| g.category)
        .find(|c| !c.is_catch_all());
    let without_dominant = match dominant {
        Some(category) => rank_genres(rows, Some(category)),
        None => ranked.clone()
    };

    let mut counts: BTreeMap<(i32, GenreCategory), usize> = BTreeMap::new();
    for r in rows {
        *counts.entry((r.year, GenreCategory::of(&r.genre))).or_default() += 1;
    }
    let by_year = counts.into_iter()
        .map(|((year, category), tracks)| YearGenre { year, genre: category.label(), tracks })
        .collect();

    GenreDistribution {
        ranked,
        dominant: dominant.map(GenreCategory::label),
        without_dominant,
        by_year
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearPopularity {
    pub year: i32,
    pub mean: f64,
    pub median: f64
}

pub fn popularity_trend(rows: &[&TrackRecord]) -> Vec<YearPopularity> {
    group_years(rows).into_iter()
        .filter_map(|(year, rows)| {
            let values: Vec<f64> = rows.iter().map(|r| r.popularity as f64).collect();
            Some(YearPopularity {
                year,
                mean: mean(values.iter().copied())?,
                median: median(values)?
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierCount {
    pub tier: Tier,
    pub tracks: usize
}

pub fn tiers(rows: &[&TrackRecord], cfg: &PresenterConfig) -> Vec<TierCount> {
    [Tier::Niche, Tier::Moderate, Tier::Hit].into_iter()
        .map(|tier| TierCount {
            tier,
            tracks: rows.iter().filter(|r| Tier::of(r.popularity, cfg) == tier).count()
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NameCount {
    pub name: String,
    pub tracks: usize
}

fn top_counts<'a>(names: impl Iterator<Item = &'a str>, n: usize) -> Vec<NameCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for name in names.map(str::trim).filter(|s| !s.is_empty()) {
        *counts.entry(name).or_default() += 1;
    }
    let mut ranked: Vec<NameCount> = counts.into_iter()
        .map(|(name, tracks)| NameCount { name: name.to_string(), tracks })
        .collect();
    ranked.sort_by(|a, b| b.tracks.cmp(&a.tracks).then_with(|| a.name.cmp(&b.name)));
    ranked.truncate(n);
    ranked
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackRank {
    pub track_id: String,
    pub name: String,
    pub artist_name: String,
    pub year: i32,
    pub popularity: u8,
    pub duration_min: f64
}

pub fn top_tracks(rows: &[&TrackRecord], n: usize) -> Vec<TrackRank> {
    let mut sorted: Vec<&TrackRecord> = rows.to_vec();
    sorted.sort_by(|a, b| b.popularity.cmp(&a.popularity).then_with(|| a.name.cmp(&b.name)));
    sorted.into_iter()
        .take(n)
        .map(|r| TrackRank {
            track_id: r.track_id.clone(),
            name: r.name.clone(),
            artist_name: r.artist_name.clone(),
            year: r.year,
            popularity: r.popularity,
            duration_min: r.duration_min()
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Views {
    pub kpis: Kpis,
    pub duration_trend: DurationTrend,
    pub explicit_share: Vec<YearExplicit>,
    pub duration_popularity: DurationPopularity,
    pub genres: GenreDistribution,
    pub popularity_trend: Vec<YearPopularity>,
    pub tiers: Vec<TierCount>,
    pub top_artists: Vec<NameCount>,
    pub top_albums: Vec<NameCount>,
    pub top_tracks: Vec<TrackRank>
}

/// What a request gets back. `Empty` is a normal answer, the page shows
/// the message instead of charts
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Dashboard {
    Empty { message: String },
    Ready(Box<Views>)
}

impl Dashboard {
    pub fn is_empty(&self) -> bool {
        matches!(self, Dashboard::Empty { .. })
    }
}

pub fn build_dashboard(rows: &[&TrackRecord], hit_threshold: u8, cfg: &PresenterConfig)
    -> Dashboard {
    if rows.is_empty() {
        return Dashboard::Empty { message: "no tracks match the current filters".to_string() };
    }

    Dashboard::Ready(Box::new(Views {
        kpis: kpis(rows),
        duration_trend: duration_trend(rows),
        explicit_share: explicit_share(rows),
        duration_popularity: duration_popularity(rows, hit_threshold, cfg.scatter_max_points),
        genres: genre_distribution(rows),
        popularity_trend: popularity_trend(rows),
        tiers: tiers(rows, cfg),
        top_artists: top_counts(rows.iter().map(|r| r.artist_name.as_str()), cfg.top_artists),
        top_albums: top_counts(rows.iter().map(|r| r.album_name.as_str()), cfg.top_albums),
        top_tracks: top_tracks(rows, cfg.top_tracks)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presenter::filter::Filter;
    use crate::types::FOLLOWERS_UNKNOWN;

    fn row(year: i32, id: &str, duration_ms: u64, popularity: u8, explicit: bool, genre: &str)
        -> TrackRecord {
        TrackRecord {
            year,
            track_id: id.into(),
            name: format!("song {id}"),
            artist_id: format!("artist-{id}"),
            artist_name: format!("Artist {id}"),
            album_name: "Album".into(),
            release_date: String::new(),
            duration_ms,
            popularity,
            explicit,
            genre: genre.into(),
            followers: FOLLOWERS_UNKNOWN,
            source: String::new()
        }
    }

    fn refs(rows: &[TrackRecord]) -> Vec<&TrackRecord> {
        rows.iter().collect()
    }

    #[test]
    fn genre_categories() {
        assert_eq!(GenreCategory::of("sertanejo universitario"), GenreCategory::Sertanejo);
        assert_eq!(GenreCategory::of("Funk Carioca"), GenreCategory::Funk);
        assert_eq!(GenreCategory::of("forro"), GenreCategory::Forro);
        assert_eq!(GenreCategory::of("trap brasileiro"), GenreCategory::TrapHipHop);
        assert_eq!(GenreCategory::of("brazilian hip hop"), GenreCategory::TrapHipHop);
        assert_eq!(GenreCategory::of("pop nacional"), GenreCategory::Pop);
        assert_eq!(GenreCategory::of("arrocha"), GenreCategory::Other);
        assert_eq!(GenreCategory::of("unknown"), GenreCategory::Unknown);
        assert_eq!(GenreCategory::of(""), GenreCategory::Unknown);
    }

    #[test]
    fn duration_trend_returns_exact_yearly_means() {
        let rows = vec![
            row(2020, "a", 200_000, 50, false, "pop"),
            row(2020, "b", 220_000, 50, false, "pop"),
            row(2024, "c", 170_000, 50, false, "pop"),
            row(2024, "d", 190_000, 50, false, "pop"),
        ];
        let trend = duration_trend(&refs(&rows));
        let means: Vec<(i32, f64)> = trend.by_year.iter()
            .map(|y| (y.year, y.mean_duration_ms))
            .collect();
        assert_eq!(means, vec![(2020, 210_000.0), (2024, 180_000.0)]);
        assert_eq!(trend.slope_ms_per_year, Some(-7_500.0));

        let change = trend.change_pct.unwrap();
        assert!((change - (-100.0 / 7.0)).abs() < 1e-9);
    }

    #[test]
    fn single_year_has_no_slope() {
        let rows = vec![row(2022, "a", 200_000, 50, false, "pop")];
        let trend = duration_trend(&refs(&rows));
        assert_eq!(trend.slope_ms_per_year, None);
        assert_eq!(trend.change_pct, None);
        assert_eq!(trend.by_year[0].fitted_duration_ms, None);
    }

    #[test]
    fn explicit_share_is_count_over_total() {
        let rows = vec![
            row(2021, "a", 1, 1, true, "pop"),
            row(2021, "b", 1, 1, false, "pop"),
            row(2021, "c", 1, 1, false, "pop"),
            row(2022, "d", 1, 1, true, "pop"),
        ];
        let share = explicit_share(&refs(&rows));
        assert_eq!(share[0], YearExplicit { year: 2021, explicit: 1, total: 3, proportion: 1.0 / 3.0 });
        assert_eq!(share[1], YearExplicit { year: 2022, explicit: 1, total: 1, proportion: 1.0 });
    }

    #[test]
    fn pearson_edges() {
        assert_eq!(pearson(&[1.0], &[2.0]), None);
        assert_eq!(pearson(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]), None);
        let r = pearson(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]).unwrap();
        assert!((r - 1.0).abs() < 1e-12);
        let r = pearson(&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]).unwrap();
        assert!((r + 1.0).abs() < 1e-12);
    }

    #[test]
    fn hit_split_uses_inclusive_threshold() {
        let rows = vec![
            row(2021, "a", 120_000, 59, false, "pop"),
            row(2021, "b", 150_000, 60, true, "pop"),
            row(2021, "c", 180_000, 90, true, "pop"),
        ];
        let view = duration_popularity(&refs(&rows), 60, 1000);
        assert_eq!(view.hits.tracks, 2);
        assert_eq!(view.non_hits.tracks, 1);
        assert_eq!(view.hits.median_popularity, Some(75.0));
        assert_eq!(view.explicit.tracks, 2);
        assert!(view.pearson_r.unwrap() > 0.8);
    }

    #[test]
    fn dominant_genre_and_view_without_it() {
        let rows = vec![
            row(2021, "a", 1, 80, false, "unknown"),
            row(2021, "b", 1, 80, false, "unknown"),
            row(2021, "c", 1, 80, false, "unknown"),
            row(2021, "d", 1, 70, false, "sertanejo"),
            row(2021, "e", 1, 50, false, "sertanejo universitario"),
            row(2022, "f", 1, 40, false, "funk carioca"),
        ];
        let genres = genre_distribution(&refs(&rows));
        assert_eq!(genres.ranked[0].genre, "Unknown");
        assert_eq!(genres.ranked[1].genre, "Sertanejo");
        assert_eq!(genres.ranked[1].mean_popularity, 60.0);
        assert_eq!(genres.dominant, Some("Sertanejo"));

        let rest: Vec<&str> = genres.without_dominant.iter().map(|g| g.genre).collect();
        assert_eq!(rest, vec!["Unknown", "Funk"]);
        assert_eq!(genres.without_dominant[1].share, 0.25);
        assert!(genres.by_year.contains(&YearGenre { year: 2022, genre: "Funk", tracks: 1 }));
    }

    #[test]
    fn tiers_follow_bounds() {
        let rows = vec![
            row(2021, "a", 1, 30, false, "pop"),
            row(2021, "b", 1, 31, false, "pop"),
            row(2021, "c", 1, 60, false, "pop"),
            row(2021, "d", 1, 61, false, "pop"),
        ];
        let counts: Vec<usize> = tiers(&refs(&rows), &PresenterConfig::default())
            .iter().map(|t| t.tracks).collect();
        assert_eq!(counts, vec![1, 2, 1]);
    }

    #[test]
    fn popularity_trend_median_of_even_group() {
        let rows = vec![
            row(2021, "a", 1, 10, false, "pop"),
            row(2021, "b", 1, 20, false, "pop"),
            row(2021, "c", 1, 40, false, "pop"),
            row(2021, "d", 1, 90, false, "pop"),
        ];
        let trend = popularity_trend(&refs(&rows));
        assert_eq!(trend, vec![YearPopularity { year: 2021, mean: 40.0, median: 30.0 }]);
    }

    #[test]
    fn kpis_skip_follower_sentinel() {
        let mut rows = vec![
            row(2021, "a", 120_000, 40, true, "pop"),
            row(2021, "b", 240_000, 60, false, "pop"),
        ];
        rows[1].followers = 500;
        let k = kpis(&refs(&rows));
        assert_eq!(k.tracks, 2);
        assert_eq!(k.mean_popularity, 50.0);
        assert_eq!(k.mean_duration_min, 3.0);
        assert_eq!(k.explicit_pct, 50.0);
        assert_eq!(k.unique_artists, 2);
        assert_eq!(k.mean_followers, Some(500.0));
    }

    #[test]
    fn rankings_are_ordered_and_truncated() {
        let mut rows: Vec<TrackRecord> = (0..30_u8)
            .map(|i| row(2021, &format!("t{i:02}"), 1, i * 3, false, "pop"))
            .collect();
        for r in rows.iter_mut().take(5) {
            r.artist_name = "Anitta".into();
        }
        let cfg = PresenterConfig::default();
        let Dashboard::Ready(views) = build_dashboard(&refs(&rows), 60, &cfg) else {
            panic!("expected charts");
        };
        assert_eq!(views.top_tracks.len(), 20);
        assert_eq!(views.top_tracks[0].popularity, 87);
        assert_eq!(views.top_artists.len(), 10);
        assert_eq!(views.top_artists[0], NameCount { name: "Anitta".into(), tracks: 5 });
    }

    #[test]
    fn scatter_is_thinned_but_stats_use_every_row() {
        let rows: Vec<TrackRecord> = (0..2500_u32)
            .map(|i| {
                let popularity = (i % 100) as u8;
                row(2021, &format!("t{i}"), 120_000 + u64::from(i), popularity, false, "pop")
            })
            .collect();
        let view = duration_popularity(&refs(&rows), 60, 1000);
        assert_eq!(view.tracks, 2500);
        assert_eq!(view.hits.tracks + view.non_hits.tracks, 2500);
        // stride 3 over 2500 rows
        assert_eq!(view.points.len(), 834);
        assert_eq!(view.points[1].popularity, 3);

        let small = duration_popularity(&refs(&rows[..10]), 60, 1000);
        assert_eq!(small.points.len(), 10);
    }

    #[test]
    fn top_albums_have_their_own_size() {
        let rows: Vec<TrackRecord> = (0..6_u8)
            .map(|i| {
                let mut r = row(2021, &format!("t{i}"), 1, i, false, "pop");
                r.album_name = format!("Album {}", i % 3);
                r
            })
            .collect();
        let cfg = PresenterConfig { top_albums: 2, ..PresenterConfig::default() };
        let Dashboard::Ready(views) = build_dashboard(&refs(&rows), 60, &cfg) else {
            panic!("expected charts");
        };
        assert_eq!(views.top_albums.len(), 2);
        assert_eq!(views.top_artists.len(), 6);
    }

    #[test]
    fn filter_that_excludes_everything_gives_empty_state() {
        let rows = vec![row(2021, "a", 200_000, 40, false, "pop")];
        let filter = Filter { min_popularity: Some(100), ..Filter::default() };
        let kept = filter.apply(&rows);
        let dashboard = build_dashboard(&kept, 60, &PresenterConfig::default());
        assert!(dashboard.is_empty());

        let json = serde_json::to_value(&dashboard).unwrap();
        assert_eq!(json["state"], "empty");
    }

    #[test]
    fn ready_state_serializes_with_tag() {
        let rows = vec![row(2021, "a", 200_000, 40, false, "pop")];
        let json = serde_json::to_value(
            build_dashboard(&refs(&rows), 60, &PresenterConfig::default())
        ).unwrap();
        assert_eq!(json["state"], "ready");
        assert_eq!(json["kpis"]["tracks"], 1);
        assert_eq!(json["tiers"][1]["tier"], "moderate");
    }
}
