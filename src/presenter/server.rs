//!
//! src/presenter/server.rs  Andrew Belles  Oct 18th, 2026
//!
//! Local dashboard server. The page is compiled into the binary and
//! draws its charts from `/api/dashboard`, nothing is fetched from
//! outside the machine
//!

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get
};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::PresenterConfig;
use crate::errors::EtlError;
use crate::presenter::{Dashboard, DashboardParams, Dataset, dashboard, export_csv};
use crate::presenter::load::FileReport;

const INDEX_HTML: &str = include_str!("dashboard.html");

#[derive(Clone)]
pub struct AppState {
    pub dataset: Arc<Dataset>,
    pub cfg: Arc<PresenterConfig>
}

impl AppState {
    pub fn new(dataset: Dataset, cfg: PresenterConfig) -> Self {
        Self { dataset: Arc::new(dataset), cfg: Arc::new(cfg) }
    }
}

#[derive(Debug, Serialize)]
pub struct Meta {
    pub years: Vec<i32>,
    pub genres: Vec<&'static str>,
    pub hit_threshold: u8,
    pub tier_bounds: [u8; 2],
    pub files: Vec<FileReport>,
    pub warnings: Vec<String>
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub records: usize,
    pub version: &'static str
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn get_dashboard(State(state): State<AppState>, Query(params): Query<DashboardParams>)
    -> Json<Dashboard> {
    debug!(params = ?params, "http.dashboard");
    Json(dashboard(&state.dataset, &params, &state.cfg))
}

/// Filtered rows as a download, same columns as the yearly files
async fn get_export(State(state): State<AppState>, Query(params): Query<DashboardParams>)
    -> Response {
    let mut body = Vec::new();
    match export_csv(&state.dataset, &params.filter(), &mut body) {
        Ok(rows) => {
            debug!(rows, params = ?params, "http.export");
            (
                [
                    (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
                    (header::CONTENT_DISPOSITION, "attachment; filename=\"hits_filtered.csv\"")
                ],
                body
            ).into_response()
        }
        Err(e) => {
            error!(error = %e, "http.export.failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn get_meta(State(state): State<AppState>) -> Json<Meta> {
    Json(Meta {
        years: state.dataset.years(),
        genres: state.dataset.genres(),
        hit_threshold: state.cfg.hit_threshold,
        tier_bounds: [state.cfg.tier_niche_max, state.cfg.tier_moderate_max],
        files: state.dataset.files.clone(),
        warnings: state.dataset.warnings.clone()
    })
}

async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        records: state.dataset.records.len(),
        version: env!("CARGO_PKG_VERSION")
    })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/dashboard", get(get_dashboard))
        .route("/api/export.csv", get(get_export))
        .route("/api/meta", get(get_meta))
        .route("/health", get(health))
        .with_state(state)
}

pub async fn bind(addr: &str) -> Result<TcpListener, EtlError> {
    TcpListener::bind(addr).await
        .map_err(|e| EtlError::Server(format!("bind {addr}: {e}")))
}

/// Serves until `shutdown` is cancelled, then drains open requests
pub async fn serve(listener: TcpListener, state: AppState, shutdown: CancellationToken)
    -> Result<(), EtlError> {
    let addr = listener.local_addr()?;
    info!(addr = %addr, records = state.dataset.records.len(), "server.start");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| EtlError::Server(format!("serve {addr}: {e}")))?;

    info!("server.stop");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use crate::types::TrackRecord;

    fn row(year: i32, id: &str, duration_ms: u64, popularity: u8, explicit: bool) -> TrackRecord {
        TrackRecord {
            year,
            track_id: id.into(),
            name: id.into(),
            artist_id: "a".into(),
            artist_name: "A".into(),
            album_name: String::new(),
            release_date: String::new(),
            duration_ms,
            popularity,
            explicit,
            genre: "sertanejo".into(),
            followers: 10,
            source: String::new()
        }
    }

    async fn spawn(dataset: Dataset) -> (String, CancellationToken, tokio::task::JoinHandle<()>) {
        let listener = bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let token = CancellationToken::new();
        let state = AppState::new(dataset, PresenterConfig::default());
        let stop = token.clone();
        let handle = tokio::spawn(async move {
            serve(listener, state, stop).await.unwrap();
        });
        (base, token, handle)
    }

    #[tokio::test]
    async fn dashboard_endpoint_applies_filters() {
        let dataset = Dataset {
            records: vec![
                row(2020, "a", 200_000, 40, false),
                row(2020, "b", 220_000, 80, true),
                row(2024, "c", 180_000, 90, true),
            ],
            ..Dataset::default()
        };
        let (base, token, handle) = spawn(dataset).await;

        let body: Value = reqwest::get(format!("{base}/api/dashboard")).await.unwrap()
            .json().await.unwrap();
        assert_eq!(body["state"], "ready");
        assert_eq!(body["duration_trend"]["by_year"][0]["mean_duration_ms"], 210_000.0);

        let body: Value = reqwest::get(format!("{base}/api/dashboard?year_from=2024"))
            .await.unwrap().json().await.unwrap();
        assert_eq!(body["kpis"]["tracks"], 1);

        let body: Value = reqwest::get(format!("{base}/api/dashboard?min_popularity=95"))
            .await.unwrap().json().await.unwrap();
        assert_eq!(body["state"], "empty");

        let meta: Value = reqwest::get(format!("{base}/api/meta")).await.unwrap()
            .json().await.unwrap();
        assert_eq!(meta["years"], serde_json::json!([2020, 2024]));
        assert_eq!(meta["genres"], serde_json::json!(["Sertanejo"]));

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn export_returns_filtered_rows_as_csv() {
        let dataset = Dataset {
            records: vec![
                row(2020, "a", 200_000, 40, false),
                row(2020, "b", 220_000, 80, true),
                row(2024, "c", 180_000, 90, true),
            ],
            ..Dataset::default()
        };
        let (base, token, handle) = spawn(dataset).await;

        let resp = reqwest::get(format!("{base}/api/export.csv?min_popularity=80")).await.unwrap();
        assert!(resp.status().is_success());
        assert!(resp.headers()["content-type"].to_str().unwrap().starts_with("text/csv"));
        assert!(resp.headers()["content-disposition"].to_str().unwrap().contains("attachment"));

        let text = resp.text().await.unwrap();
        let mut reader = csv::Reader::from_reader(text.as_bytes());
        let header: Vec<String> = reader.headers().unwrap().iter().map(str::to_string).collect();
        assert_eq!(header, crate::types::CSV_COLUMNS.to_vec());
        let rows: Vec<TrackRecord> = reader.deserialize().collect::<Result<_, _>>().unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.track_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);

        // nothing matches, the header alone still comes back
        let text = reqwest::get(format!("{base}/api/export.csv?year_from=2030")).await.unwrap()
            .text().await.unwrap();
        assert_eq!(text.trim_end(), crate::types::CSV_COLUMNS.join(","));

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn empty_dataset_still_serves_page_and_state() {
        let (base, token, handle) = spawn(Dataset::default()).await;

        let page = reqwest::get(format!("{base}/")).await.unwrap();
        assert!(page.status().is_success());
        let html = page.text().await.unwrap();
        assert!(html.contains("/api/dashboard"));
        assert!(html.contains("/api/export.csv"));

        let body: Value = reqwest::get(format!("{base}/api/dashboard")).await.unwrap()
            .json().await.unwrap();
        assert_eq!(body["state"], "empty");

        let health: Value = reqwest::get(format!("{base}/health")).await.unwrap()
            .json().await.unwrap();
        assert_eq!(health["status"], "ok");
        assert_eq!(health["records"], 0);

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn malformed_query_is_rejected() {
        let (base, token, handle) = spawn(Dataset::default()).await;
        let resp = reqwest::get(format!("{base}/api/dashboard?min_popularity=lots")).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
        token.cancel();
        handle.await.unwrap();
    }
}
