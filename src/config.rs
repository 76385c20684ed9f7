//!
//! src/config.rs  Andrew Belles  Oct 18th, 2026
//!
//! Environment and file backed configuration for the collector
//! and the presenter. Every sub-config has sane defaults, only the
//! spotify credentials are required (and only by the collector)
//!

use serde::Deserialize;
use url::Url;
use std::{collections::BTreeSet, path::Path, time};
use crate::errors::EtlError;

/// Constants for HTTP Config
pub const HTTP_TIMEOUT: u64 = 8000;
pub const HTTP_CONNECT_TIMEOUT: u64 = 2000;
pub const HTTP_POOL_MAX_IDLE: usize = 4;
pub const HTTP_POOL_IDLE_TIMEOUT: u64 = 90000;
pub const HTTP_MAX_REDIRECTS: u8 = 4;

pub const RETRY_MAX_ATTEMPTS: u8 = 4;
pub const RETRY_BASE_BACKOFF: u64 = 250;
pub const RETRY_JITTER: bool = true;
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Constants for the collector walk
pub const PLAYLIST_PAGE_LIMIT: u32 = 100;
pub const SEARCH_PAGE_LIMIT: u32 = 50;
pub const ALBUM_TRACKS_LIMIT: u32 = 50;
pub const BATCH_LIMIT: usize = 50;
pub const DEFAULT_MARKET: &str = "BR";
pub const DEFAULT_MAX_TRACKS: usize = 1000;
pub const TOKEN_REFRESH_MARGIN: u64 = 60;

/// Constants for the presenter
pub const HIT_THRESHOLD: u8 = 60;
pub const TIER_NICHE_MAX: u8 = 30;
pub const TIER_MODERATE_MAX: u8 = 60;
pub const MIN_VALID_YEAR: i32 = 2001;
pub const MIN_VALID_DURATION_MS: u64 = 30_000;
pub const TOP_ARTISTS: usize = 10;
pub const TOP_ALBUMS: usize = 10;
pub const TOP_TRACKS: usize = 20;
pub const SCATTER_MAX_POINTS: usize = 1000;
pub const DEFAULT_BIND: &str = "127.0.0.1:8501";

/// Wrapper over a variable lookup to return an invalid enviroment var error
fn env_check<F>(lookup: &F, s: &str) -> Result<String, String>
where
    F: Fn(&str) -> Option<String>
{
    match lookup(s) {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(format!("{s} was not set")),
    }
}

/// Ensures that url is https
fn ensure_https(url: &Url) -> Result<(), String> {
    if url.scheme() == "https" {
        Ok(())
    } else {
        Err(format!("URL must be https: {url}"))
    }
}

fn ensure_host(url: &Url, expected_host: &str) -> Result<(), String> {
    match url.host_str() {
        Some(h) if h.eq_ignore_ascii_case(expected_host) => Ok(()),
        Some(h) => Err(
            format!("Unexpected host for {url} (got {h}, expected {expected_host})")
        ),
        None => Err(format!("URL missing host: {url}"))
    }
}

fn ensure_trailing_slash(url: &mut Url) {
    if !url.path().ends_with('/') {
        let mut path = url.path().to_string();
        path.push('/');
        url.set_path(&path);
    }
}

/// Configuration that Spotify expects when hitting endpoints
#[derive(Clone)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: Url,
    pub api_base: Url,
}

// never print the secret when configs are dumped at startup
impl std::fmt::Debug for SpotifyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpotifyConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("token_url", &self.token_url.as_str())
            .field("api_base", &self.api_base.as_str())
            .finish()
    }
}

/// Reads the two credential variables plus optional url overrides from
/// the process environment
pub fn build_spotify() -> Result<SpotifyConfig, EtlError> {
    build_spotify_with(|s| std::env::var(s).ok())
}

/// Missing credentials surface as `Auth`, malformed urls as `Config`
pub fn build_spotify_with<F>(lookup: F) -> Result<SpotifyConfig, EtlError>
where
    F: Fn(&str) -> Option<String>
{
    let client_id     = env_check(&lookup, "SPOTIFY_CLIENT_ID")
        .map_err(EtlError::Auth)?;
    let client_secret = env_check(&lookup, "SPOTIFY_CLIENT_SECRET")
        .map_err(EtlError::Auth)?;

    // form urls
    let token_url = lookup("SPOTIFY_TOKEN_URL")
        .unwrap_or_else(|| "https://accounts.spotify.com/api/token".to_string());

    let api_base  = lookup("SPOTIFY_API_BASE")
        .unwrap_or_else(|| "https://api.spotify.com/v1/".to_string());

    let token_url = Url::parse(&token_url)
        .map_err(|e| EtlError::Config(format!("SPOTIFY_TOKEN_URL invalid {e}")))?;

    let mut api_base  = Url::parse(&api_base)
        .map_err(|e| EtlError::Config(format!("SPOTIFY_API_BASE invalid {e}")))?;

    // ensure valid https and hostname for both urls
    ensure_https(&token_url).map_err(EtlError::Config)?;
    ensure_https(&api_base).map_err(EtlError::Config)?;
    ensure_host(&token_url, "accounts.spotify.com").map_err(EtlError::Config)?;
    ensure_host(&api_base, "api.spotify.com").map_err(EtlError::Config)?;

    ensure_trailing_slash(&mut api_base);

    Ok( SpotifyConfig { client_id, client_secret, token_url, api_base })
}

///
/// Configuration for Http timeouts, retries, etc.
///
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u8,
    pub base_backoff: time::Duration,
    pub jitter: bool,
    pub retryable_statuses: Vec<u16>
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: RETRY_MAX_ATTEMPTS,
            base_backoff: time::Duration::from_millis(RETRY_BASE_BACKOFF),
            jitter: RETRY_JITTER,
            retryable_statuses: RETRYABLE_STATUSES.to_vec()
        }
    }
}

impl RetryConfig {
    pub fn is_retryable(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout: time::Duration,
    pub connect_timeout: time::Duration,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: time::Duration,
    pub max_redirects: u8,
    pub retry: RetryConfig
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: time::Duration::from_millis(HTTP_TIMEOUT),
            connect_timeout: time::Duration::from_millis(HTTP_CONNECT_TIMEOUT),
            pool_max_idle_per_host: HTTP_POOL_MAX_IDLE,
            pool_idle_timeout: time::Duration::from_millis(HTTP_POOL_IDLE_TIMEOUT),
            max_redirects: HTTP_MAX_REDIRECTS,
            retry: RetryConfig::default()
        }
    }
}

///
/// Configuration for the collector walk
///
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub playlist_page_limit: u32,
    pub search_page_limit: u32,
    pub album_tracks_limit: u32,
    pub batch_limit: usize,        // ids per /artists or /tracks call
    pub market: String,
    pub max_tracks: usize,         // per year budget
    pub token_refresh_margin: time::Duration
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            playlist_page_limit: PLAYLIST_PAGE_LIMIT,
            search_page_limit: SEARCH_PAGE_LIMIT,
            album_tracks_limit: ALBUM_TRACKS_LIMIT,
            batch_limit: BATCH_LIMIT,
            market: DEFAULT_MARKET.to_string(),
            max_tracks: DEFAULT_MAX_TRACKS,
            token_refresh_margin: time::Duration::from_secs(TOKEN_REFRESH_MARGIN)
        }
    }
}

///
/// Configuration for the presenter's cleaning and aggregation
///
#[derive(Debug, Clone)]
pub struct PresenterConfig {
    pub hit_threshold: u8,
    pub tier_niche_max: u8,
    pub tier_moderate_max: u8,
    pub min_valid_year: i32,
    pub min_valid_duration_ms: u64,
    pub top_artists: usize,
    pub top_albums: usize,
    pub top_tracks: usize,
    pub scatter_max_points: usize,
    pub bind: String
}

impl Default for PresenterConfig {
    fn default() -> Self {
        Self {
            hit_threshold: HIT_THRESHOLD,
            tier_niche_max: TIER_NICHE_MAX,
            tier_moderate_max: TIER_MODERATE_MAX,
            min_valid_year: MIN_VALID_YEAR,
            min_valid_duration_ms: MIN_VALID_DURATION_MS,
            top_artists: TOP_ARTISTS,
            top_albums: TOP_ALBUMS,
            top_tracks: TOP_TRACKS,
            scatter_max_points: SCATTER_MAX_POINTS,
            bind: DEFAULT_BIND.to_string()
        }
    }
}

///
/// Configuration for Logger
///

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json
}

impl LogFormat {
    pub fn parse(s: &str) -> Option<LogFormat> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Some(LogFormat::Pretty),
            "json"   => Some(LogFormat::Json),
            _ => None
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub filter_directives: String,
    pub format: LogFormat,
    pub with_ansi: bool,
    pub include_file_line: bool,
    pub include_target: bool
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter_directives: "info,hits_panorama=debug,reqwest=warn".to_string(),
            format: LogFormat::Json,
            with_ansi: false,
            include_file_line: true,
            include_target: true
        }
    }
}

fn build_logging() -> LoggingConfig {
    let mut logging = LoggingConfig::default();
    if let Some(format) = std::env::var("HITS_LOG_FORMAT").ok()
        .as_deref()
        .and_then(LogFormat::parse) {
        logging.format = format;
        logging.with_ansi = format == LogFormat::Pretty;
    }
    logging
}

///
/// Curated playlist catalog. Which playlists stand for which year is
/// hand picked data, so it lives in a TOML file next to the binary
/// rather than in code. Every row written keeps its playlist as `source`
///
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PlaylistEntry {
    pub year: i32,
    pub id: String,
    #[serde(default)]
    pub label: Option<String>
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlaylistCatalog {
    #[serde(default, rename = "playlist")]
    pub playlists: Vec<PlaylistEntry>
}

impl PlaylistCatalog {
    pub fn parse(contents: &str) -> Result<Self, EtlError> {
        let catalog: PlaylistCatalog = toml::from_str(contents)?;
        if let Some(bad) = catalog.playlists.iter().find(|p| p.id.trim().is_empty()) {
            return Err(EtlError::Config(
                format!("playlist entry for {} has an empty id", bad.year)
            ));
        }
        Ok(catalog)
    }

    pub fn load(path: &Path) -> Result<Self, EtlError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| EtlError::Config(
                format!("read playlist catalog {}: {e}", path.display())
            ))?;
        Self::parse(&contents)
    }

    /// Playlist ids for a year in file order, duplicates removed
    pub fn for_year(&self, year: i32) -> Vec<&PlaylistEntry> {
        let mut seen = BTreeSet::new();
        self.playlists.iter()
            .filter(|p| p.year == year)
            .filter(|p| seen.insert(p.id.as_str()))
            .collect()
    }
}

///
/// AppConfig which holds everything but credentials
///
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub collector: CollectorConfig,
    pub presenter: PresenterConfig,
    pub logging: LoggingConfig
}

///
/// Return configuration to caller at program start.
///
pub fn load_config() -> Result<AppConfig, EtlError> {
    dotenvy::dotenv().ok();

    let http      = HttpConfig::default();
    let collector = CollectorConfig::default();
    let presenter = PresenterConfig::default();
    let logging   = build_logging();

    Ok( AppConfig { http, collector, presenter, logging } )
}
