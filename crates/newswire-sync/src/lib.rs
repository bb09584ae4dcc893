//! Ingestion pipeline: fetch every source, apply retention, reconcile with the
//! stored snapshot and persist the result.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use newswire_adapters::{
    adapter_for_spec, builtin_specs, AdapterContext, AdapterSpec, SourceAdapter,
};
use newswire_core::Article;
use newswire_storage::{
    ArticleStore, BackoffPolicy, HttpClientConfig, HttpFetcher, StoreConfig,
};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "newswire-sync";

pub const DEFAULT_RETENTION_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRegistry {
    pub sources: Vec<SourceConfig>,
}

impl SourceRegistry {
    pub fn builtin() -> Self {
        Self {
            sources: builtin_specs()
                .into_iter()
                .map(|adapter| SourceConfig {
                    enabled: true,
                    adapter,
                })
                .collect(),
        }
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("parsing source registry")
    }

    /// Read the registry at `path`, or the built-in one when the file is absent.
    pub async fn load_or_builtin(path: &Path) -> Result<Self> {
        match fs::read_to_string(path).await {
            Ok(text) => Self::from_yaml(&text).with_context(|| format!("parsing {}", path.display())),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no source registry file; using built-in sources");
                Ok(Self::builtin())
            }
            Err(err) => Err(err).with_context(|| format!("reading {}", path.display())),
        }
    }

    pub fn enabled(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|s| s.enabled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(flatten)]
    pub adapter: AdapterSpec,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub store_path: PathBuf,
    pub seed_path: Option<PathBuf>,
    pub sources_path: PathBuf,
    pub progress_log: Option<PathBuf>,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub http_retries: usize,
    pub retry_delay_secs: u64,
    pub retention_hours: i64,
    pub scheduler_enabled: bool,
    pub sync_cron: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from(".tmp/articles.json"),
            seed_path: Some(PathBuf::from("articles.json")),
            sources_path: PathBuf::from("sources.yaml"),
            progress_log: Some(PathBuf::from("progress.md")),
            user_agent: "AI-News-Dashboard/1.0".to_string(),
            http_timeout_secs: 10,
            http_retries: 1,
            retry_delay_secs: 5,
            retention_hours: DEFAULT_RETENTION_HOURS,
            scheduler_enabled: false,
            sync_cron: "0 * * * *".to_string(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key).ok().map(PathBuf::from)
}

/// Empty values disable an optional path.
fn env_optional_path(key: &str, default: Option<PathBuf>) -> Option<PathBuf> {
    match std::env::var(key) {
        Ok(v) if v.trim().is_empty() => None,
        Ok(v) => Some(PathBuf::from(v)),
        Err(_) => default,
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            store_path: env_path("NEWSWIRE_STORE_PATH").unwrap_or(defaults.store_path),
            seed_path: env_optional_path("NEWSWIRE_SEED_PATH", defaults.seed_path),
            sources_path: env_path("NEWSWIRE_SOURCES_PATH").unwrap_or(defaults.sources_path),
            progress_log: env_optional_path("NEWSWIRE_PROGRESS_LOG", defaults.progress_log),
            user_agent: std::env::var("NEWSWIRE_USER_AGENT").unwrap_or(defaults.user_agent),
            http_timeout_secs: env_parse("NEWSWIRE_HTTP_TIMEOUT_SECS")
                .unwrap_or(defaults.http_timeout_secs),
            http_retries: env_parse("NEWSWIRE_HTTP_RETRIES").unwrap_or(defaults.http_retries),
            retry_delay_secs: env_parse("NEWSWIRE_RETRY_DELAY_SECS")
                .unwrap_or(defaults.retry_delay_secs),
            retention_hours: env_parse("NEWSWIRE_RETENTION_HOURS")
                .unwrap_or(defaults.retention_hours),
            scheduler_enabled: std::env::var("NEWSWIRE_SCHEDULER_ENABLED")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(defaults.scheduler_enabled),
            sync_cron: std::env::var("NEWSWIRE_SYNC_CRON").unwrap_or(defaults.sync_cron),
        }
    }

    pub fn store_config(&self) -> StoreConfig {
        let config = StoreConfig::new(self.store_path.clone());
        match &self.seed_path {
            Some(seed) => config.with_seed(seed.clone()),
            None => config,
        }
    }

    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: Duration::from_secs(self.http_timeout_secs),
            user_agent: Some(self.user_agent.clone()),
            backoff: BackoffPolicy {
                max_retries: self.http_retries,
                delay: Duration::from_secs(self.retry_delay_secs),
            },
        }
    }
}

/// Rolling freshness window; saved articles are exempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub window: chrono::Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::hours(DEFAULT_RETENTION_HOURS)
    }
}

impl RetentionPolicy {
    pub fn hours(hours: i64) -> Self {
        Self {
            window: chrono::Duration::hours(hours),
        }
    }

    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.window
    }

    /// Keep saved articles, articles published at or after the cutoff, and
    /// articles whose timestamp cannot be parsed. Input order is preserved.
    pub fn apply(&self, articles: Vec<Article>, now: DateTime<Utc>) -> Vec<Article> {
        let cutoff = self.cutoff(now);
        articles
            .into_iter()
            .filter(|article| {
                if article.saved {
                    return true;
                }
                match article.published_at_utc() {
                    Ok(published_at) => published_at >= cutoff,
                    Err(err) => {
                        warn!(
                            title = article.display_title(),
                            published_at = %article.published_at,
                            %err,
                            "could not parse publish date; keeping article"
                        );
                        true
                    }
                }
            })
            .collect()
    }
}

/// Merge a freshly fetched batch into the stored articles.
///
/// Incoming articles come first in input order, one per id (first wins),
/// inheriting `saved` from a stored article with the same id. Saved stored
/// articles absent from the batch follow. Unsaved stored articles absent from
/// the batch are dropped.
pub fn reconcile(existing: &[Article], incoming: Vec<Article>) -> Vec<Article> {
    let existing_by_id: HashMap<&str, &Article> =
        existing.iter().map(|a| (a.id.as_str(), a)).collect();

    let mut merged = Vec::with_capacity(incoming.len());
    let mut emitted: HashSet<String> = HashSet::with_capacity(incoming.len());

    for mut article in incoming {
        if emitted.contains(&article.id) {
            continue;
        }
        if let Some(stored) = existing_by_id.get(article.id.as_str()) {
            article.saved = stored.saved;
        }
        emitted.insert(article.id.clone());
        merged.push(article);
    }

    for stored in existing {
        if stored.saved && emitted.insert(stored.id.clone()) {
            merged.push(stored.clone());
        }
    }

    merged
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFailure {
    pub source_id: String,
    pub display_name: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub enabled_sources: usize,
    pub fetched: usize,
    pub retained: usize,
    pub stored: usize,
    pub failures: Vec<SourceFailure>,
    /// Set when the final save was rejected; the previous snapshot stays authoritative.
    pub save_error: Option<String>,
}

impl IngestRunSummary {
    pub fn saved(&self) -> bool {
        self.save_error.is_none()
    }

    pub fn to_progress_markdown(&self) -> String {
        let mut entry = format!(
            "\n## [{}] Ingest Run `{}`\n- Fetched: {} articles\n- Retained (window): {} articles\n- Total in storage: {} articles\n",
            self.finished_at.format("%Y-%m-%d %H:%M:%S UTC"),
            self.run_id,
            self.fetched,
            self.retained,
            self.stored,
        );
        if self.failures.is_empty() {
            entry.push_str("- Status: all sources succeeded\n");
        } else {
            entry.push_str(&format!("- Errors: {}\n", self.failures.len()));
            for failure in &self.failures {
                entry.push_str(&format!(
                    "  - {} failed: {}\n",
                    failure.display_name, failure.message
                ));
            }
        }
        if let Some(err) = &self.save_error {
            entry.push_str(&format!("- Save failed: {err}\n"));
        }
        entry
    }
}

pub async fn append_progress_log(path: &Path, summary: &IngestRunSummary) -> Result<()> {
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("opening {}", path.display()))?;
    file.write_all(summary.to_progress_markdown().as_bytes())
        .await
        .with_context(|| format!("appending to {}", path.display()))?;
    file.flush().await.context("flushing progress log")?;
    Ok(())
}

pub struct IngestPipeline {
    store: ArticleStore,
    http: HttpFetcher,
    adapters: Vec<Box<dyn SourceAdapter>>,
    retention: RetentionPolicy,
    progress_log: Option<PathBuf>,
}

impl IngestPipeline {
    pub async fn new(config: &SyncConfig) -> Result<Self> {
        let registry = SourceRegistry::load_or_builtin(&config.sources_path).await?;
        let mut adapters = Vec::new();
        for source in registry.enabled() {
            let adapter = adapter_for_spec(&source.adapter)
                .with_context(|| format!("building adapter for {}", source.adapter.source_id))?;
            adapters.push(adapter);
        }
        let http = HttpFetcher::new(config.http_client_config())?;
        Ok(Self::from_parts(
            ArticleStore::with_config(config.store_config()),
            http,
            adapters,
        )
        .with_retention(RetentionPolicy::hours(config.retention_hours))
        .with_progress_log(config.progress_log.clone()))
    }

    /// Adapters run in the given order; that order decides duplicate-id ties.
    pub fn from_parts(
        store: ArticleStore,
        http: HttpFetcher,
        adapters: Vec<Box<dyn SourceAdapter>>,
    ) -> Self {
        Self {
            store,
            http,
            adapters,
            retention: RetentionPolicy::default(),
            progress_log: None,
        }
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_progress_log(mut self, path: Option<PathBuf>) -> Self {
        self.progress_log = path;
        self
    }

    /// Run every adapter, then retention, reconciliation and save.
    ///
    /// Adapter failures are recorded in the summary. A rejected save is
    /// reported through `save_error`; only a failure to read the current
    /// snapshot aborts the run with `Err`.
    pub async fn run_once(&self) -> Result<IngestRunSummary> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        let ctx = AdapterContext::new(run_id, started_at);

        let mut fetched = Vec::new();
        let mut failures = Vec::new();
        for adapter in &self.adapters {
            let span = info_span!("adapter_fetch", %run_id, source_id = adapter.source_id());
            match adapter.fetch(&self.http, &ctx).instrument(span).await {
                Ok(batch) => {
                    info!(source_id = adapter.source_id(), articles = batch.len(), "source fetched");
                    fetched.extend(batch);
                }
                Err(err) => {
                    error!(source_id = adapter.source_id(), %err, "source failed");
                    failures.push(SourceFailure {
                        source_id: adapter.source_id().to_string(),
                        display_name: adapter.display_name().to_string(),
                        message: err.to_string(),
                    });
                }
            }
        }

        let fetched_count = fetched.len();
        let retained = self.retention.apply(fetched, Utc::now());
        let retained_count = retained.len();
        info!(fetched = fetched_count, retained = retained_count, "applied retention window");

        let existing = self
            .store
            .load()
            .await
            .context("loading current article snapshot")?;
        let merged = reconcile(&existing.articles, retained);
        let stored = merged.len();

        let save_error = match self.store.save(&merged).await {
            Ok(_) => None,
            Err(err) => {
                error!(%err, "saving articles failed; previous snapshot kept");
                Some(err.to_string())
            }
        };

        let summary = IngestRunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            enabled_sources: self.adapters.len(),
            fetched: fetched_count,
            retained: retained_count,
            stored,
            failures,
            save_error,
        };

        if let Some(path) = &self.progress_log {
            if let Err(err) = append_progress_log(path, &summary).await {
                warn!(path = %path.display(), %err, "could not append to progress log");
            }
        }

        Ok(summary)
    }

    pub async fn maybe_build_scheduler(
        self: Arc<Self>,
        config: &SyncConfig,
    ) -> Result<Option<JobScheduler>> {
        if !config.scheduler_enabled {
            return Ok(None);
        }

        let sched = JobScheduler::new().await.context("creating scheduler")?;
        let pipeline = self;
        let job = Job::new_async(&config.sync_cron, move |_uuid, _lock| {
            let pipeline = pipeline.clone();
            Box::pin(async move {
                match pipeline.run_once().await {
                    Ok(summary) if summary.saved() => info!(
                        run_id = %summary.run_id,
                        stored = summary.stored,
                        "scheduled ingest completed"
                    ),
                    Ok(summary) => warn!(run_id = %summary.run_id, "scheduled ingest could not save"),
                    Err(err) => error!(%err, "scheduled ingest failed"),
                }
            })
        })
        .with_context(|| format!("creating scheduler job for cron {}", config.sync_cron))?;
        sched.add(job).await.context("adding scheduler job")?;
        Ok(Some(sched))
    }
}

pub async fn run_ingest_once_from_env() -> Result<IngestRunSummary> {
    let config = SyncConfig::from_env();
    let pipeline = IngestPipeline::new(&config).await?;
    pipeline.run_once().await
}

/// Start the cron scheduler and block until Ctrl-C.
pub async fn run_scheduler_from_env() -> Result<()> {
    let config = SyncConfig::from_env();
    let pipeline = Arc::new(IngestPipeline::new(&config).await?);
    let Some(mut sched) = pipeline.maybe_build_scheduler(&config).await? else {
        anyhow::bail!("scheduler disabled; set NEWSWIRE_SCHEDULER_ENABLED=1");
    };
    sched.start().await.context("starting scheduler")?;
    info!(cron = %config.sync_cron, "ingest scheduler running");
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    sched.shutdown().await.context("stopping scheduler")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{SecondsFormat, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 24, 12, 0, 0).single().unwrap()
    }

    fn at(ts: DateTime<Utc>) -> String {
        ts.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn article(url: &str, published_at: &str) -> Article {
        Article::new(url, format!("title {url}"), "Reddit", published_at)
    }

    fn saved(mut article: Article) -> Article {
        article.saved = true;
        article
    }

    fn ids(articles: &[Article]) -> Vec<&str> {
        articles.iter().map(|a| a.url.as_str()).collect()
    }

    #[test]
    fn retention_boundary_is_inclusive() {
        let policy = RetentionPolicy::default();
        let cutoff = now() - chrono::Duration::hours(24);
        let articles = vec![
            article("exact", &at(cutoff)),
            article("older", &at(cutoff - chrono::Duration::microseconds(1))),
            saved(article("older-saved", &at(cutoff - chrono::Duration::microseconds(1)))),
            article("fresh", &at(now())),
        ];
        let kept = policy.apply(articles, now());
        assert_eq!(ids(&kept), vec!["exact", "older-saved", "fresh"]);
    }

    #[test]
    fn retention_keeps_saved_regardless_of_age() {
        let kept = RetentionPolicy::default().apply(
            vec![saved(article("ancient", "2001-01-01T00:00:00Z"))],
            now(),
        );
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn retention_keeps_unparseable_dates_and_preserves_order() {
        let articles = vec![
            article("b", "not a date"),
            article("stale", "2026-02-20T00:00:00Z"),
            article("a", ""),
            article("naive", "2026-02-24T06:00:00"),
        ];
        let kept = RetentionPolicy::default().apply(articles, now());
        assert_eq!(ids(&kept), vec!["b", "a", "naive"]);
    }

    #[test]
    fn retention_window_is_configurable() {
        let articles = vec![article("six-hours", &at(now() - chrono::Duration::hours(6)))];
        assert!(RetentionPolicy::hours(1).apply(articles.clone(), now()).is_empty());
        assert_eq!(RetentionPolicy::hours(12).apply(articles, now()).len(), 1);
    }

    #[test]
    fn reconcile_inherits_saved_flag_from_store() {
        let existing = vec![saved(article("x", "2026-02-24T00:00:00Z"))];
        let incoming = vec![article("x", "2026-02-24T00:00:00Z")];
        let merged = reconcile(&existing, incoming);
        assert_eq!(merged.len(), 1);
        assert!(merged[0].saved);
    }

    #[test]
    fn reconcile_keeps_pinned_articles_missing_from_batch() {
        let existing = vec![
            saved(article("pinned", "2026-01-01T00:00:00Z")),
            article("stale-unsaved", "2026-02-23T00:00:00Z"),
        ];
        let incoming = vec![article("new", "2026-02-24T00:00:00Z")];
        let merged = reconcile(&existing, incoming);
        assert_eq!(ids(&merged), vec!["new", "pinned"]);
        assert!(merged[1].saved);
    }

    #[test]
    fn reconcile_collapses_duplicate_ids_first_wins() {
        let mut first = article("dup", "2026-02-24T00:00:00Z");
        first.source = "Ben's Bites".into();
        let mut second = article("dup", "2026-02-24T00:00:00Z");
        second.source = "Reddit".into();
        let merged = reconcile(&[], vec![first, second, article("other", "2026-02-24T00:00:00Z")]);
        assert_eq!(ids(&merged), vec!["dup", "other"]);
        assert_eq!(merged[0].source, "Ben's Bites");
    }

    #[test]
    fn reconcile_does_not_resurrect_saved_flag_on_unsaved_store_entry() {
        let existing = vec![article("x", "2026-02-24T00:00:00Z")];
        let mut incoming = article("x", "2026-02-24T00:00:00Z");
        incoming.saved = true;
        let merged = reconcile(&existing, vec![incoming]);
        assert!(!merged[0].saved);
    }

    #[test]
    fn reconcile_is_idempotent() {
        let existing = vec![
            saved(article("pinned", "2026-01-01T00:00:00Z")),
            saved(article("both", "2026-02-24T00:00:00Z")),
            article("gone", "2026-02-24T00:00:00Z"),
        ];
        let incoming = vec![
            article("both", "2026-02-24T00:00:00Z"),
            article("new", "2026-02-24T00:00:00Z"),
            article("new", "2026-02-24T00:00:00Z"),
        ];
        let once = reconcile(&existing, incoming.clone());
        let twice = reconcile(&once, incoming);
        assert_eq!(once, twice);
        assert_eq!(ids(&once), vec!["both", "new", "pinned"]);
    }

    #[test]
    fn registry_yaml_flattens_adapter_fields() {
        let yaml = r#"
sources:
  - source_id: bensbites
    display_name: "Ben's Bites"
    kind: newsletter_archive
    url: https://bensbites.com/archive
    default_author: Ben Tossell
  - source_id: reddit
    display_name: Reddit
    kind: reddit_top
    enabled: false
    subreddits: [artificial, LocalLLaMA]
    limit: 25
"#;
        let registry = SourceRegistry::from_yaml(yaml).unwrap();
        assert_eq!(registry.sources.len(), 2);
        assert!(registry.sources[0].enabled);
        assert_eq!(
            registry.sources[0].adapter.url.as_deref(),
            Some("https://bensbites.com/archive")
        );
        assert!(!registry.sources[1].enabled);
        assert_eq!(registry.sources[1].adapter.subreddits, vec!["artificial", "LocalLLaMA"]);
        assert_eq!(registry.enabled().count(), 1);
    }

    #[tokio::test]
    async fn missing_registry_falls_back_to_builtin_sources() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SourceRegistry::load_or_builtin(&dir.path().join("sources.yaml"))
            .await
            .unwrap();
        let ids = registry
            .enabled()
            .map(|s| s.adapter.source_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["bensbites", "rundown", "reddit"]);
    }

    #[test]
    fn progress_entry_lists_failures_and_save_errors() {
        let summary = IngestRunSummary {
            run_id: Uuid::nil(),
            started_at: now(),
            finished_at: now(),
            enabled_sources: 3,
            fetched: 12,
            retained: 9,
            stored: 11,
            failures: vec![SourceFailure {
                source_id: "rundown".into(),
                display_name: "The Rundown AI".into(),
                message: "http status 503".into(),
            }],
            save_error: Some("disk full".into()),
        };
        let entry = summary.to_progress_markdown();
        assert!(entry.contains("## [2026-02-24 12:00:00 UTC] Ingest Run"));
        assert!(entry.contains("- Fetched: 12 articles"));
        assert!(entry.contains("- Retained (window): 9 articles"));
        assert!(entry.contains("- Total in storage: 11 articles"));
        assert!(entry.contains("- Errors: 1"));
        assert!(entry.contains("  - The Rundown AI failed: http status 503"));
        assert!(entry.contains("- Save failed: disk full"));
        assert!(!summary.saved());
    }

    #[test]
    fn default_config_matches_documented_values() {
        let config = SyncConfig::default();
        assert_eq!(config.store_path, PathBuf::from(".tmp/articles.json"));
        assert_eq!(config.http_retries, 1);
        assert_eq!(config.retention_hours, 24);
        let http = config.http_client_config();
        assert_eq!(http.timeout, Duration::from_secs(10));
        assert_eq!(http.backoff.delay, Duration::from_secs(5));
        assert_eq!(
            config.store_config().seed_path,
            Some(PathBuf::from("articles.json"))
        );
    }
}
