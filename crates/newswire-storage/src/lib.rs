//! Durable article store + HTTP fetch utilities for newswire.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use newswire_core::{Article, Snapshot};
use reqwest::header::USER_AGENT;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "newswire-storage";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serializing snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("article '{title}' is missing required fields: {}", .missing.join(", "))]
    Validation {
        title: String,
        missing: Vec<&'static str>,
    },
    #[error("article not found: {0}")]
    NotFound(String),
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// File locations owned by one [`ArticleStore`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub backup_path: PathBuf,
    pub temp_path: PathBuf,
    /// Copied into place when the live file does not exist yet.
    pub seed_path: Option<PathBuf>,
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            backup_path: with_suffix(&path, ".backup"),
            temp_path: with_suffix(&path, ".tmp"),
            path,
            seed_path: None,
        }
    }

    pub fn with_seed(mut self, seed_path: impl Into<PathBuf>) -> Self {
        self.seed_path = Some(seed_path.into());
        self
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_owned();
    raw.push(suffix);
    PathBuf::from(raw)
}

/// Where a loaded snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoadSource {
    Primary,
    Seeded,
    Missing,
    RestoredFromBackup,
    EmptyAfterCorruption,
}

#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub snapshot: Snapshot,
    pub source: LoadSource,
}

impl LoadOutcome {
    fn empty(source: LoadSource) -> Self {
        Self {
            snapshot: Snapshot::empty(Utc::now()),
            source,
        }
    }
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    last_updated: DateTime<Utc>,
    articles: &'a [Article],
}

#[derive(Deserialize)]
struct SnapshotHeader {
    last_updated: DateTime<Utc>,
}

/// Single-writer handle over the persisted snapshot file.
///
/// Every write is a full-file replace through a temp file and a rename, so a
/// reader sees either the previous or the new snapshot. Callers must not share
/// one file between uncoordinated writers.
#[derive(Debug, Clone)]
pub struct ArticleStore {
    config: StoreConfig,
}

impl ArticleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_config(StoreConfig::new(path))
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self { config }
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn backup_path(&self) -> &Path {
        &self.config.backup_path
    }

    pub fn temp_path(&self) -> &Path {
        &self.config.temp_path
    }

    pub async fn load(&self) -> Result<Snapshot, StoreError> {
        Ok(self.load_outcome().await?.snapshot)
    }

    /// Load the snapshot, falling back to the backup (then to empty) when the
    /// live file does not parse.
    pub async fn load_outcome(&self) -> Result<LoadOutcome, StoreError> {
        let path = &self.config.path;
        let seeded = if path_exists(path).await? {
            false
        } else {
            self.bootstrap_from_seed().await
        };

        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Ok(LoadOutcome::empty(LoadSource::Missing));
            }
            Err(err) => return Err(StoreError::io(path, err)),
        };

        match serde_json::from_slice::<Snapshot>(&bytes) {
            Ok(snapshot) => Ok(LoadOutcome {
                snapshot,
                source: if seeded {
                    LoadSource::Seeded
                } else {
                    LoadSource::Primary
                },
            }),
            Err(err) => {
                error!(path = %path.display(), %err, "article store failed to parse");
                self.restore_from_backup().await
            }
        }
    }

    async fn bootstrap_from_seed(&self) -> bool {
        let Some(seed) = &self.config.seed_path else {
            return false;
        };
        match fs::try_exists(seed).await {
            Ok(true) => {}
            _ => return false,
        }
        let copied = async {
            ensure_parent_dir(&self.config.path).await?;
            fs::copy(seed, &self.config.path).await
        }
        .await;
        match copied {
            Ok(_) => {
                info!(seed = %seed.display(), path = %self.config.path.display(), "initialized article store from seed");
                true
            }
            Err(err) => {
                warn!(seed = %seed.display(), %err, "could not copy seed articles into place");
                false
            }
        }
    }

    async fn restore_from_backup(&self) -> Result<LoadOutcome, StoreError> {
        let backup_path = &self.config.backup_path;
        let bytes = match fs::read(backup_path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                warn!("no backup available; previous articles are lost, starting empty");
                return Ok(LoadOutcome::empty(LoadSource::EmptyAfterCorruption));
            }
            Err(err) => return Err(StoreError::io(backup_path, err)),
        };

        let snapshot = match serde_json::from_slice::<Snapshot>(&bytes) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                error!(path = %backup_path.display(), %err, "backup is unreadable too; starting empty");
                return Ok(LoadOutcome::empty(LoadSource::EmptyAfterCorruption));
            }
        };

        match fs::copy(backup_path, &self.config.path).await {
            Ok(_) => info!(
                articles = snapshot.articles.len(),
                "restored article store from backup"
            ),
            Err(err) => warn!(%err, "backup parsed but could not be copied over the live file"),
        }
        Ok(LoadOutcome {
            snapshot,
            source: LoadSource::RestoredFromBackup,
        })
    }

    /// Validate and atomically persist the full article set.
    ///
    /// Returns the `last_updated` stamp written. On any error the previously
    /// persisted snapshot is left in place.
    pub async fn save(&self, articles: &[Article]) -> Result<DateTime<Utc>, StoreError> {
        validate_articles(articles)?;

        let path = &self.config.path;
        ensure_parent_dir(path)
            .await
            .map_err(|err| StoreError::io(path, err))?;

        let previous = self.read_last_updated().await;
        if path_exists(path).await? {
            fs::copy(path, &self.config.backup_path)
                .await
                .map_err(|err| StoreError::io(&self.config.backup_path, err))?;
        }

        let now = Utc::now();
        let last_updated = previous.map_or(now, |prev| prev.max(now));
        let bytes = serde_json::to_vec_pretty(&SnapshotRef {
            last_updated,
            articles,
        })?;

        let temp_path = &self.config.temp_path;
        if let Err(err) = write_and_rename(temp_path, path, &bytes).await {
            let _ = fs::remove_file(temp_path).await;
            error!(path = %path.display(), %err, "failed to write article store");
            return Err(StoreError::io(path, err));
        }

        info!(articles = articles.len(), %last_updated, "saved articles");
        Ok(last_updated)
    }

    /// Flip the `saved` flag of one article and persist the whole snapshot.
    pub async fn update_saved_flag(&self, id: &str, saved: bool) -> Result<(), StoreError> {
        let mut snapshot = self.load().await?;
        let Some(article) = snapshot.find_mut(id) else {
            warn!(id, "article not found");
            return Err(StoreError::NotFound(id.to_string()));
        };
        article.saved = saved;
        self.save(&snapshot.articles).await?;
        Ok(())
    }

    async fn read_last_updated(&self) -> Option<DateTime<Utc>> {
        let bytes = fs::read(&self.config.path).await.ok()?;
        serde_json::from_slice::<SnapshotHeader>(&bytes)
            .ok()
            .map(|header| header.last_updated)
    }
}

pub fn validate_articles(articles: &[Article]) -> Result<(), StoreError> {
    for article in articles {
        let missing = article.missing_required_fields();
        if !missing.is_empty() {
            warn!(title = article.display_title(), ?missing, "invalid article");
            return Err(StoreError::Validation {
                title: article.display_title().to_string(),
                missing,
            });
        }
    }
    Ok(())
}

async fn path_exists(path: &Path) -> Result<bool, StoreError> {
    fs::try_exists(path)
        .await
        .map_err(|err| StoreError::io(path, err))
}

async fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent).await,
        _ => Ok(()),
    }
}

async fn write_and_rename(temp_path: &Path, dest: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(temp_path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(temp_path, dest).await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

/// Bounded retries separated by a fixed delay.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, _attempt_index: usize) -> Duration {
        self.delay
    }

    pub fn should_retry(&self, attempt_index: usize, disposition: RetryDisposition) -> bool {
        disposition == RetryDisposition::Retryable && attempt_index < self.max_retries
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub backoff: BackoffPolicy,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            user_agent: None,
            backoff: BackoffPolicy::default(),
        }
    }
}

#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    backoff: BackoffPolicy,
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub final_url: String,
    pub body: Vec<u8>,
}

impl FetchedResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed after retries: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;

        Ok(Self {
            client,
            backoff: config.backoff,
        })
    }

    pub async fn fetch_bytes(
        &self,
        run_id: Uuid,
        source_id: &str,
        url: &str,
    ) -> Result<FetchedResponse, FetchError> {
        self.fetch_bytes_as(run_id, source_id, url, None).await
    }

    /// Fetch with an optional per-request user agent override.
    pub async fn fetch_bytes_as(
        &self,
        run_id: Uuid,
        source_id: &str,
        url: &str,
        user_agent: Option<&str>,
    ) -> Result<FetchedResponse, FetchError> {
        let span = info_span!("http_fetch", %run_id, source_id, url);
        self.fetch_with_retries(url, user_agent).instrument(span).await
    }

    async fn fetch_with_retries(
        &self,
        url: &str,
        user_agent: Option<&str>,
    ) -> Result<FetchedResponse, FetchError> {
        let mut attempt = 0usize;
        loop {
            let mut request = self.client.get(url);
            if let Some(user_agent) = user_agent {
                request = request.header(USER_AGENT, user_agent);
            }

            match request.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let final_url = resp.url().to_string();

                    if status.is_success() {
                        let body = resp.bytes().await?.to_vec();
                        return Ok(FetchedResponse {
                            status,
                            final_url,
                            body,
                        });
                    }

                    if self.backoff.should_retry(attempt, classify_status(status)) {
                        warn!(attempt = attempt + 1, %status, "retrying fetch");
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        attempt += 1;
                        continue;
                    }

                    return Err(FetchError::HttpStatus {
                        status: status.as_u16(),
                        url: final_url,
                    });
                }
                Err(err) => {
                    if self.backoff.should_retry(attempt, classify_reqwest_error(&err)) {
                        warn!(attempt = attempt + 1, %err, "retrying fetch");
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(FetchError::Request(err));
                }
            }
        }
    }
}
