//! Axum + Askama dashboard and JSON API over the article store.

use std::cmp::Reverse;
use std::collections::BTreeSet;
use std::sync::Arc;

use askama::Template;
use axum::{
    extract::{Path, Query, State},
    http::{header, Method, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use newswire_core::{Article, Snapshot};
use newswire_storage::{ArticleStore, StoreError};
use newswire_sync::SyncConfig;
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

pub const CRATE_NAME: &str = "newswire-web";

pub struct AppState {
    pub store: ArticleStore,
    /// Serializes read-modify-write updates coming through the API.
    write_lock: Mutex<()>,
}

impl AppState {
    pub fn new(store: ArticleStore) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SaveFlagRequest {
    #[serde(default)]
    saved: bool,
}

#[derive(Debug, Deserialize, Default)]
struct DashboardQuery {
    filter: Option<String>,
}

struct FilterOption {
    value: String,
    label: String,
    selected: bool,
}

struct ArticleRow {
    id: String,
    title: String,
    url: String,
    source: String,
    summary: String,
    category: String,
    published_at: String,
    saved: bool,
}

impl From<&Article> for ArticleRow {
    fn from(article: &Article) -> Self {
        Self {
            id: article.id.clone(),
            title: article.title.clone(),
            url: article.url.clone(),
            source: article.source.clone(),
            summary: article.summary.clone(),
            category: article.category.clone(),
            published_at: article
                .published_at_utc()
                .map(|ts| ts.format("%Y-%m-%d %H:%M UTC").to_string())
                .unwrap_or_else(|_| article.published_at.clone()),
            saved: article.saved,
        }
    }
}

#[derive(Template)]
#[template(path = "dashboard.html")]
struct DashboardTemplate {
    last_updated: String,
    total_articles: usize,
    saved_articles: usize,
    filters: Vec<FilterOption>,
    articles: Vec<ArticleRow>,
}

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(dashboard_handler))
        .route("/api/articles", get(list_articles_handler))
        .route("/api/articles/{id}/save", post(save_flag_handler))
        .layer(cors)
        .with_state(Arc::new(state))
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    let port: u16 = std::env::var("NEWSWIRE_WEB_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000);
    let config = SyncConfig::from_env();
    let state = AppState::new(ArticleStore::with_config(config.store_config()));
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, store = %config.store_path.display(), "dashboard listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn list_articles_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.store.load().await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(err) => json_error(StatusCode::INTERNAL_SERVER_ERROR, &err),
    }
}

async fn save_flag_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<SaveFlagRequest>,
) -> Response {
    let _guard = state.write_lock.lock().await;
    match state.store.update_saved_flag(&id, body.saved).await {
        Ok(()) => {
            info!(%id, saved = body.saved, "updated saved flag");
            Json(json!({ "success": true })).into_response()
        }
        Err(StoreError::NotFound(_)) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Article not found" })),
        )
            .into_response(),
        Err(err) => json_error(StatusCode::INTERNAL_SERVER_ERROR, &err),
    }
}

async fn dashboard_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DashboardQuery>,
) -> Response {
    match state.store.load().await {
        Ok(snapshot) => render_html(dashboard_template(&snapshot, query.filter.as_deref())),
        Err(err) => server_error(anyhow::Error::new(err)),
    }
}

fn dashboard_template(snapshot: &Snapshot, filter: Option<&str>) -> DashboardTemplate {
    let filter = filter.filter(|f| !f.is_empty()).unwrap_or("all");

    let sources: BTreeSet<&str> = snapshot
        .articles
        .iter()
        .map(|a| a.source.as_str())
        .filter(|s| !s.is_empty())
        .collect();
    let mut filters = vec![
        FilterOption {
            value: "all".into(),
            label: "All".into(),
            selected: filter == "all",
        },
        FilterOption {
            value: "saved".into(),
            label: "Saved".into(),
            selected: filter == "saved",
        },
    ];
    filters.extend(sources.into_iter().map(|source| FilterOption {
        value: source.to_string(),
        label: source.to_string(),
        selected: filter == source,
    }));

    DashboardTemplate {
        last_updated: snapshot
            .last_updated
            .format("%Y-%m-%d %H:%M:%S UTC")
            .to_string(),
        total_articles: snapshot.articles.len(),
        saved_articles: snapshot.articles.iter().filter(|a| a.saved).count(),
        filters,
        articles: newest_first(filter_articles(&snapshot.articles, filter))
            .into_iter()
            .map(ArticleRow::from)
            .collect(),
    }
}

fn filter_articles<'a>(articles: &'a [Article], filter: &str) -> Vec<&'a Article> {
    articles
        .iter()
        .filter(|a| match filter {
            "all" => true,
            "saved" => a.saved,
            source => a.source == source,
        })
        .collect()
}

/// Undated articles sort last; ties keep stored order.
fn newest_first(mut articles: Vec<&Article>) -> Vec<&Article> {
    articles.sort_by_key(|a| Reverse(a.published_at_utc().ok()));
    articles
}

fn render_html<T: Template>(tpl: T) -> Response {
    match tpl.render() {
        Ok(html) => Html(html).into_response(),
        Err(err) => server_error(anyhow::anyhow!(err.to_string())),
    }
}

fn server_error(err: anyhow::Error) -> Response {
    error!(%err, "dashboard render failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(format!("Server error: {}", err)),
    )
        .into_response()
}

fn json_error(status: StatusCode, err: &StoreError) -> Response {
    error!(%err, "article store request failed");
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}
