//!
//! src/fetch.rs  Andrew Belles  Oct 18th, 2026
//!
//! Defines methods for hitting catalog endpoints and returning
//! unparsed json, handling the client credentials token and retries.
//! Calls are issued one at a time, nothing here fans out
//!

use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use reqwest::{Client, header, redirect, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use tokio::{sync::Mutex, time::sleep};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{CollectorConfig, HttpConfig, RetryConfig, SpotifyConfig};
use crate::errors::EtlError;
use crate::types::{ArtistId, SpotifyTrackId};

/// Longest Retry-After we are willing to sleep through before giving up
pub const RETRY_AFTER_CEILING: Duration = Duration::from_secs(120);

/// Catalog surface the collector walks. Implemented by the Spotify
/// client and by in-memory fakes in tests
#[async_trait]
pub trait CatalogApi {
    /// Acquire (or confirm) an access token. Only fails with `Auth`
    async fn authenticate(&self) -> Result<(), EtlError>;

    /// GET /v1/playlists/{id}/tracks paging object
    async fn playlist_tracks(&self, playlist_id: &str, limit: u32, offset: u32, market: &str)
        -> Result<Value, EtlError>;

    /// GET /v1/search?type=album response
    async fn search_albums(&self, query: &str, limit: u32, offset: u32, market: &str)
        -> Result<Value, EtlError>;

    /// GET /v1/search?type=artist response
    async fn search_artists(&self, query: &str, limit: u32, offset: u32)
        -> Result<Value, EtlError>;

    /// GET /v1/albums/{id}/tracks paging object
    async fn album_tracks(&self, album_id: &str, limit: u32, offset: u32, market: &str)
        -> Result<Value, EtlError>;

    /// GET /v1/artists?ids=... (at most 50 ids)
    async fn artists(&self, ids: &[ArtistId]) -> Result<Value, EtlError>;

    /// GET /v1/tracks?ids=... (at most 50 ids)
    async fn tracks(&self, ids: &[SpotifyTrackId], market: &str) -> Result<Value, EtlError>;
}

/// Client building functionality
fn client_helper(http: &HttpConfig) -> reqwest::ClientBuilder {
    Client::builder()
        .timeout(http.timeout)
        .connect_timeout(http.connect_timeout)
        .pool_max_idle_per_host(http.pool_max_idle_per_host)
        .pool_idle_timeout(Some(http.pool_idle_timeout))
        .redirect(redirect::Policy::limited(http.max_redirects as usize))
}

pub fn base_client(http: &HttpConfig) -> Result<Client, EtlError> {
    let mut h = header::HeaderMap::new();
    h.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
    client_helper(http)
        .default_headers(h)
        .build()
        .map_err(|e| EtlError::Config(format!("build client: {e}")))
}

/// Simple function to generate random wait for http_with_retry
fn generate_backoff(retry: &RetryConfig, attempt: u8, rng: &mut SmallRng) -> Duration {
    let exp = (1_u64 << attempt.min(6)) * retry.base_backoff.as_millis() as u64;
    let jitter = if retry.jitter { rng.gen_range(50..=200) } else { 0 };
    Duration::from_millis(exp + jitter)
}

/// Seconds form of Retry-After, which is what the catalog sends on 429
fn retry_after(resp: &Response) -> Option<Duration> {
    resp.headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Sends until success, a non retryable status, or attempts run out.
/// The final response is returned whatever its status
async fn http_with_retry(request: RequestBuilder, retry: &RetryConfig) ->
    Result<Response, EtlError> {
    let mut rng = SmallRng::from_entropy();
    let mut attempt = 0_u8;
    loop {
        let response = request.try_clone()
            .ok_or_else(|| EtlError::Fetch("non-cloneable request".to_string()))?
            .send()
            .await;
        let last = attempt + 1 >= retry.max_attempts.max(1);
        match response {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() || !retry.is_retryable(status.as_u16()) || last {
                    return Ok(resp);
                }
                let backoff = match retry_after(&resp) {
                    Some(wait) if wait > RETRY_AFTER_CEILING => return Ok(resp),
                    Some(wait) => wait,
                    None => generate_backoff(retry, attempt, &mut rng)
                };
                warn!(status = %status, backoff_ms = backoff.as_millis() as u64, attempt,
                    "http.retry");
                sleep(backoff).await;
                attempt += 1;
            },
            Err(e) => {
                if last {
                    return Err(e.into());
                }
                let backoff = generate_backoff(retry, attempt, &mut rng);
                warn!(error = %e, backoff_ms = backoff.as_millis() as u64, attempt,
                    "http.retry.error");
                sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}

fn join_ids<'a>(ids: impl Iterator<Item = &'a str>) -> String {
    ids.collect::<Vec<_>>().join(",")
}

#[derive(Debug, Clone)]
struct AccessToken {
    bearer: String,
    refresh_at: Instant
}

#[derive(Debug)]
pub struct SpotifyClient {
    http: Client,
    cfg: SpotifyConfig,
    retry: RetryConfig,
    refresh_margin: Duration,
    token: Mutex<Option<AccessToken>>
}

impl SpotifyClient {
    pub fn new(http_config: &HttpConfig, cfg: &SpotifyConfig, collector: &CollectorConfig) ->
        Result<Self, EtlError> {

        let http = base_client(http_config)?;
        Ok( Self {
            http,
            cfg: cfg.clone(),
            retry: http_config.retry.clone(),
            refresh_margin: collector.token_refresh_margin,
            token: Mutex::new(None)
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, EtlError> {
        self.cfg.api_base.join(path)
            .map_err(|e| EtlError::Config(format!("bad endpoint {path}: {e}")))
    }

    pub fn token_request(&self) -> RequestBuilder {
        self.http
            .post(self.cfg.token_url.clone())
            .basic_auth(&self.cfg.client_id, Some(&self.cfg.client_secret))
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body("grant_type=client_credentials")
    }

    /// POST the client credentials exchange. Anything short of a token is `Auth`
    async fn request_token(&self) -> Result<AccessToken, EtlError> {
        let resp = http_with_retry(self.token_request(), &self.retry).await
            .map_err(|e| EtlError::Auth(format!("token exchange failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EtlError::Auth(format!("token exchange rejected ({status}): {body}")));
        }

        let token: Value = resp.json().await
            .map_err(|e| EtlError::Auth(format!("token response unreadable: {e}")))?;
        let bearer = token["access_token"].as_str()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| EtlError::Auth("no access_token in response".into()))?
            .to_string();
        let expires_in = Duration::from_secs(token["expires_in"].as_u64().unwrap_or(3600));
        let lifetime = expires_in.saturating_sub(self.refresh_margin);

        info!(expires_in_s = expires_in.as_secs(), "auth.token.acquired");
        Ok( AccessToken { bearer, refresh_at: Instant::now() + lifetime } )
    }

    /// Cached bearer, re-acquired once the refresh point passes
    async fn bearer(&self) -> Result<String, EtlError> {
        let mut slot = self.token.lock().await;
        if let Some(token) = slot.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.bearer.clone());
            }
            debug!("auth.token.refresh");
        }
        let token = self.request_token().await?;
        let bearer = token.bearer.clone();
        *slot = Some(token);
        Ok(bearer)
    }

    async fn invalidate(&self) {
        *self.token.lock().await = None;
    }

    /// Authorized GET returning the json body of a 2xx
    async fn get_json(&self, url: Url, query: &[(&str, String)]) -> Result<Value, EtlError> {
        let bearer = self.bearer().await?;
        let request = self.http.get(url.clone()).bearer_auth(bearer).query(query);
        let resp = http_with_retry(request, &self.retry).await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json::<Value>().await?);
        }
        if status == StatusCode::UNAUTHORIZED {
            self.invalidate().await;
        }
        Err(EtlError::Fetch(format!("GET {} returned {status}", url.path())))
    }
}

#[async_trait]
impl CatalogApi for SpotifyClient {
    async fn authenticate(&self) -> Result<(), EtlError> {
        self.bearer().await.map(|_| ())
    }

    async fn playlist_tracks(&self, playlist_id: &str, limit: u32, offset: u32, market: &str)
        -> Result<Value, EtlError> {
        let url = self.endpoint(&format!("playlists/{playlist_id}/tracks"))?;
        self.get_json(url, &[
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
            ("market", market.to_string())
        ]).await
    }

    async fn search_albums(&self, query: &str, limit: u32, offset: u32, market: &str)
        -> Result<Value, EtlError> {
        let url = self.endpoint("search")?;
        self.get_json(url, &[
            ("type", "album".to_string()),
            ("q", query.to_string()),
            ("market", market.to_string()),
            ("limit", limit.to_string()),
            ("offset", offset.to_string())
        ]).await
    }

    async fn search_artists(&self, query: &str, limit: u32, offset: u32)
        -> Result<Value, EtlError> {
        let url = self.endpoint("search")?;
        self.get_json(url, &[
            ("type", "artist".to_string()),
            ("q", query.to_string()),
            ("limit", limit.to_string()),
            ("offset", offset.to_string())
        ]).await
    }

    async fn album_tracks(&self, album_id: &str, limit: u32, offset: u32, market: &str)
        -> Result<Value, EtlError> {
        let url = self.endpoint(&format!("albums/{album_id}/tracks"))?;
        self.get_json(url, &[
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
            ("market", market.to_string())
        ]).await
    }

    async fn artists(&self, ids: &[ArtistId]) -> Result<Value, EtlError> {
        let url = self.endpoint("artists")?;
        let ids = join_ids(ids.iter().map(|a| a.0.as_str()));
        self.get_json(url, &[("ids", ids)]).await
    }

    async fn tracks(&self, ids: &[SpotifyTrackId], market: &str) -> Result<Value, EtlError> {
        let url = self.endpoint("tracks")?;
        let ids = join_ids(ids.iter().map(|t| t.0.as_str()));
        self.get_json(url, &[("ids", ids), ("market", market.to_string())]).await
    }
}
