//!
//! src/types.rs  Andrew Belles  Oct 18th, 2026
//!
//! Row schema shared by the collector (writer) and presenter (reader).
//! The CSV header is derived from `TrackRecord`, so both sides move together
//!

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Written when the primary artist has no genre listing
pub const GENRE_UNKNOWN: &str = "unknown";
/// Written when the primary artist's follower count could not be fetched
pub const FOLLOWERS_UNKNOWN: i64 = -1;

pub const POPULARITY_MAX: u8 = 100;

/// Column order of every yearly file
pub const CSV_COLUMNS: [&str; 13] = [
    "year", "track_id", "name", "artist_id", "artist_name", "album_name",
    "release_date", "duration_ms", "popularity", "explicit", "genre",
    "followers", "source"
];

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpotifyTrackId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtistId(pub String);

/// One cleaned row of a yearly file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
    pub year: i32,
    pub track_id: String,
    pub name: String,
    #[serde(default)]
    pub artist_id: String,
    pub artist_name: String,
    #[serde(default)]
    pub album_name: String,
    #[serde(default)]
    pub release_date: String,
    pub duration_ms: u64,
    pub popularity: u8,
    #[serde(deserialize_with = "flexible_bool")]
    pub explicit: bool,
    pub genre: String,
    pub followers: i64,
    #[serde(default)]
    pub source: String
}

impl TrackRecord {
    pub fn has_genre(&self) -> bool {
        !self.genre.trim().is_empty() && self.genre != GENRE_UNKNOWN
    }

    pub fn known_followers(&self) -> Option<u64> {
        u64::try_from(self.followers).ok()
    }

    pub fn duration_min(&self) -> f64 {
        self.duration_ms as f64 / 60_000.0
    }
}

/// Accepts what other dataframe tools write for booleans as well as our own
fn flexible_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>
{
    let raw = String::deserialize(deserializer)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        other => Err(serde::de::Error::custom(format!("invalid explicit flag {other:?}")))
    }
}

pub fn clamp_popularity(raw: i64) -> u8 {
    raw.clamp(0, POPULARITY_MAX as i64) as u8
}

/// Artist level metadata used to enrich tracks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtistMeta {
    pub id: ArtistId,
    pub name: Option<String>,
    pub genres: Vec<String>,
    pub followers: Option<u64>,
    pub popularity: Option<u8>
}

impl ArtistMeta {
    pub fn new(artist: &Value) -> Option<Self> {
        let id = artist.get("id").and_then(|v| v.as_str())?;
        Some(Self {
            id: ArtistId(id.to_string()),
            name: artist.get("name").and_then(|v| v.as_str()).map(str::to_string),
            genres: artist.get("genres").and_then(|v| v.as_array())
                .map(|arr| {
                    arr.iter().filter_map(|g| g.as_str())
                       .map(|g| g.trim().to_string())
                       .filter(|g| !g.is_empty())
                       .collect()
                }).unwrap_or_default(),
            followers: artist.pointer("/followers/total").and_then(|v| v.as_u64()),
            popularity: artist.get("popularity").and_then(|v| v.as_i64()).map(clamp_popularity)
        })
    }
}

/// A track as seen while walking listings, before artist enrichment
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateTrack {
    pub track_id: SpotifyTrackId,
    pub name: String,
    pub artist_ids: Vec<ArtistId>,
    pub artist_names: Vec<String>,
    pub album_name: Option<String>,
    pub release_date: Option<String>,
    pub duration_ms: u64,
    pub popularity: Option<u8>,
    pub explicit: bool,
    pub source: String
}

impl CandidateTrack {
    /// Parses a full or simplified track object. Returns None for local
    /// files, episodes and anything without a catalog id
    pub fn new(track: &Value, source: &str) -> Option<Self> {
        if track.get("is_local").and_then(|v| v.as_bool()).unwrap_or(false) {
            return None;
        }
        if let Some(kind) = track.get("type").and_then(|v| v.as_str()) {
            if kind != "track" {
                return None;
            }
        }
        let id = track.get("id").and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())?;

        let artists = track.get("artists").and_then(|v| v.as_array())
            .map(|arr| arr.as_slice())
            .unwrap_or(&[]);

        Some(Self {
            track_id: SpotifyTrackId(id.to_string()),
            name: track.get("name").and_then(|v| v.as_str()).unwrap_or("").to_string(),
            artist_ids: artists.iter()
                .filter_map(|a| a.get("id").and_then(|v| v.as_str()))
                .filter(|s| !s.is_empty())
                .map(|s| ArtistId(s.to_string()))
                .collect(),
            artist_names: artists.iter()
                .filter_map(|a| a.get("name").and_then(|v| v.as_str()))
                .map(str::to_string)
                .collect(),
            album_name: track.pointer("/album/name").and_then(|v| v.as_str()).map(str::to_string),
            release_date: track.pointer("/album/release_date").and_then(|v| v.as_str())
                .map(str::to_string),
            duration_ms: track.get("duration_ms").and_then(|v| v.as_i64())
                .map(|d| d.max(0) as u64)
                .unwrap_or(0),
            popularity: track.get("popularity").and_then(|v| v.as_i64()).map(clamp_popularity),
            explicit: track.get("explicit").and_then(|v| v.as_bool()).unwrap_or(false),
            source: source.to_string()
        })
    }

    pub fn primary_artist(&self) -> Option<&ArtistId> {
        self.artist_ids.first()
    }

    /// Joins artist metadata onto the candidate. Absent metadata becomes
    /// the explicit sentinels rather than an empty cell
    pub fn into_record(self, year: i32, artist: Option<&ArtistMeta>) -> TrackRecord {
        let genre = artist
            .and_then(|a| a.genres.first())
            .cloned()
            .unwrap_or_else(|| GENRE_UNKNOWN.to_string());
        let followers = artist
            .and_then(|a| a.followers)
            .and_then(|f| i64::try_from(f).ok())
            .unwrap_or(FOLLOWERS_UNKNOWN);

        TrackRecord {
            year,
            artist_id: self.primary_artist().map(|a| a.0.clone()).unwrap_or_default(),
            track_id: self.track_id.0,
            name: self.name,
            artist_name: self.artist_names.join(", "),
            album_name: self.album_name.unwrap_or_default(),
            release_date: self.release_date.unwrap_or_default(),
            duration_ms: self.duration_ms,
            popularity: self.popularity.unwrap_or(0),
            explicit: self.explicit,
            genre,
            followers,
            source: self.source
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn track_json() -> Value {
        json!({
            "id": "6GtOsEzNUhJghrIf6UTbRV",
            "name": "Breathe Deeper",
            "type": "track",
            "duration_ms": 372000,
            "popularity": 74,
            "explicit": true,
            "is_local": false,
            "album": { "name": "The Slow Rush", "release_date": "2020-02-14" },
            "artists": [
                { "id": "5INjqkS1o8h1imAzPqGZBb", "name": "Tame Impala" },
                { "id": "35l9BRT7MXmM8bv2WDQiyB", "name": "Lil Yachty" }
            ]
        })
    }

    #[test]
    fn candidate_parses_full_track_object() {
        let c = CandidateTrack::new(&track_json(), "playlist:abc").unwrap();
        assert_eq!(c.track_id.0, "6GtOsEzNUhJghrIf6UTbRV");
        assert_eq!(c.artist_names, vec!["Tame Impala", "Lil Yachty"]);
        assert_eq!(c.primary_artist().unwrap().0, "5INjqkS1o8h1imAzPqGZBb");
        assert_eq!(c.popularity, Some(74));
        assert_eq!(c.release_date.as_deref(), Some("2020-02-14"));
        assert!(c.explicit);
    }

    #[test]
    fn candidate_skips_local_files_and_episodes() {
        let mut local = track_json();
        local["is_local"] = json!(true);
        assert!(CandidateTrack::new(&local, "x").is_none());

        let mut episode = track_json();
        episode["type"] = json!("episode");
        assert!(CandidateTrack::new(&episode, "x").is_none());

        let mut no_id = track_json();
        no_id["id"] = Value::Null;
        assert!(CandidateTrack::new(&no_id, "x").is_none());
    }

    #[test]
    fn candidate_clamps_out_of_range_values() {
        let mut raw = track_json();
        raw["popularity"] = json!(140);
        raw["duration_ms"] = json!(-5);
        let c = CandidateTrack::new(&raw, "x").unwrap();
        assert_eq!(c.popularity, Some(100));
        assert_eq!(c.duration_ms, 0);
    }

    #[test]
    fn record_fills_sentinels_without_artist_meta() {
        let c = CandidateTrack::new(&track_json(), "playlist:abc").unwrap();
        let r = c.into_record(2020, None);
        assert_eq!(r.genre, GENRE_UNKNOWN);
        assert_eq!(r.followers, FOLLOWERS_UNKNOWN);
        assert!(!r.has_genre());
        assert_eq!(r.known_followers(), None);
        assert_eq!(r.artist_name, "Tame Impala, Lil Yachty");
    }

    #[test]
    fn record_takes_first_genre_and_followers() {
        let artist = ArtistMeta::new(&json!({
            "id": "5INjqkS1o8h1imAzPqGZBb",
            "name": "Tame Impala",
            "genres": ["australian psych", "neo-psychedelic"],
            "followers": { "total": 9000000 },
            "popularity": 80
        })).unwrap();

        let c = CandidateTrack::new(&track_json(), "playlist:abc").unwrap();
        let r = c.into_record(2020, Some(&artist));
        assert_eq!(r.genre, "australian psych");
        assert_eq!(r.known_followers(), Some(9_000_000));
        assert_eq!(r.source, "playlist:abc");
    }

    #[test]
    fn artist_without_genres_still_yields_sentinel_genre() {
        let artist = ArtistMeta::new(&json!({ "id": "a1", "genres": [] })).unwrap();
        let c = CandidateTrack::new(&track_json(), "x").unwrap();
        let r = c.into_record(2021, Some(&artist));
        assert_eq!(r.genre, GENRE_UNKNOWN);
        assert_eq!(r.followers, FOLLOWERS_UNKNOWN);
    }

    #[test]
    fn explicit_flag_accepts_dataframe_spellings() {
        let data = "year,track_id,name,artist_id,artist_name,album_name,release_date,\
                    duration_ms,popularity,explicit,genre,followers,source\n\
                    2020,t1,A,a1,Art,,,200000,50,True,pop,10,\n\
                    2020,t2,B,a1,Art,,,200000,50,0,pop,10,\n";
        let mut reader = csv::Reader::from_reader(data.as_bytes());
        let rows: Vec<TrackRecord> = reader.deserialize().collect::<Result<_, _>>().unwrap();
        assert!(rows[0].explicit);
        assert!(!rows[1].explicit);
    }
}
