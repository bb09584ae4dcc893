//! Source adapter contracts + newsletter archive and Reddit adapters.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use newswire_core::Article;
use newswire_storage::{FetchError, HttpFetcher};
use reqwest::Url;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "newswire-adapters";

pub const SUMMARY_MAX_CHARS: usize = 200;
pub const DEFAULT_ARCHIVE_LIMIT: usize = 10;
pub const DEFAULT_REDDIT_LIMIT: usize = 10;
pub const DEFAULT_POLITENESS_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    NewsletterArchive,
    RedditTop,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterContext {
    pub run_id: Uuid,
    pub fetched_at: DateTime<Utc>,
}

impl AdapterContext {
    pub fn new(run_id: Uuid, fetched_at: DateTime<Utc>) -> Self {
        Self { run_id, fetched_at }
    }
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("parsing {what}: {message}")]
    Parse { what: String, message: String },
    #[error("all {0} targets failed")]
    AllTargetsFailed(usize),
    #[error("{0}")]
    Message(String),
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source_id(&self) -> &str;
    fn display_name(&self) -> &str;
    fn kind(&self) -> SourceKind;

    /// Fetch the current batch of articles. Every returned article is unsaved.
    async fn fetch(
        &self,
        http: &HttpFetcher,
        ctx: &AdapterContext,
    ) -> Result<Vec<Article>, AdapterError>;
}

/// Declarative description of one adapter instance, as found in the source registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterSpec {
    pub source_id: String,
    pub display_name: String,
    pub kind: SourceKind,
    /// Archive page for newsletters, API origin for Reddit.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub subreddits: Vec<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub default_author: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub delay_ms: Option<u64>,
}

pub fn builtin_specs() -> Vec<AdapterSpec> {
    vec![
        AdapterSpec {
            source_id: "bensbites".into(),
            display_name: "Ben's Bites".into(),
            kind: SourceKind::NewsletterArchive,
            url: Some("https://bensbites.com/archive".into()),
            subreddits: vec![],
            limit: None,
            user_agent: None,
            default_author: Some("Ben Tossell".into()),
            category: None,
            delay_ms: None,
        },
        AdapterSpec {
            source_id: "rundown".into(),
            display_name: "The Rundown AI".into(),
            kind: SourceKind::NewsletterArchive,
            url: Some("https://therundown.ai/archive".into()),
            subreddits: vec![],
            limit: None,
            user_agent: Some(
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36".into(),
            ),
            default_author: Some("The Rundown AI".into()),
            category: None,
            delay_ms: None,
        },
        AdapterSpec {
            source_id: "reddit".into(),
            display_name: "Reddit".into(),
            kind: SourceKind::RedditTop,
            url: None,
            subreddits: vec![
                "artificial".into(),
                "MachineLearning".into(),
                "Singularity".into(),
            ],
            limit: None,
            user_agent: None,
            default_author: None,
            category: None,
            delay_ms: None,
        },
    ]
}

pub fn adapter_for_spec(spec: &AdapterSpec) -> Result<Box<dyn SourceAdapter>, AdapterError> {
    match spec.kind {
        SourceKind::NewsletterArchive => Ok(Box::new(NewsletterArchiveAdapter::from_spec(spec)?)),
        SourceKind::RedditTop => Ok(Box::new(RedditTopAdapter::from_spec(spec))),
    }
}

fn politeness_delay(spec: &AdapterSpec) -> Duration {
    spec.delay_ms
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_POLITENESS_DELAY)
}

/// Built-in adapter by source id.
pub fn adapter_for_source(source_id: &str) -> Option<Box<dyn SourceAdapter>> {
    builtin_specs()
        .into_iter()
        .find(|spec| spec.source_id == source_id)
        .and_then(|spec| adapter_for_spec(&spec).ok())
}

/// Cut `text` to [`SUMMARY_MAX_CHARS`], marking the cut with an ellipsis.
pub fn truncate_summary(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= SUMMARY_MAX_CHARS {
        return text.to_string();
    }
    let mut out = text.chars().take(SUMMARY_MAX_CHARS - 3).collect::<String>();
    out.push_str("...");
    out
}

/// Reddit self-text previews keep the first [`SUMMARY_MAX_CHARS`] characters
/// and append an ellipsis when anything was cut.
pub fn truncate_selftext(text: &str) -> String {
    let mut chars = text.chars();
    let mut out = chars.by_ref().take(SUMMARY_MAX_CHARS).collect::<String>();
    if chars.next().is_some() {
        out.push_str("...");
    }
    out
}

fn collapse_whitespace(value: &str) -> Option<String> {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

fn selector(css: &str) -> Result<Selector, AdapterError> {
    Selector::parse(css).map_err(|e| AdapterError::Parse {
        what: format!("selector {css}"),
        message: e.to_string(),
    })
}

fn select_first_attr(document: &Html, css: &str, attr: &str) -> Result<Option<String>, AdapterError> {
    let sel = selector(css)?;
    Ok(document
        .select(&sel)
        .next()
        .and_then(|n| n.value().attr(attr))
        .and_then(collapse_whitespace))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveLink {
    pub url: String,
    pub title: String,
}

/// Collect issue links (`/p/` hrefs) from an archive page, first occurrence of
/// each href wins, capped at `limit`.
pub fn parse_archive_links(
    html: &str,
    archive_url: &Url,
    limit: usize,
) -> Result<Vec<ArchiveLink>, AdapterError> {
    let document = Html::parse_document(html);
    let sel = selector("a[href*='/p/']")?;
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for node in document.select(&sel) {
        let Some(href) = node.value().attr("href") else {
            continue;
        };
        if !seen.insert(href.to_string()) {
            continue;
        }
        let Some(title) = collapse_whitespace(&node.text().collect::<String>()) else {
            debug!(href, "skipping archive link without text");
            continue;
        };
        let url = match archive_url.join(href) {
            Ok(url) => url.to_string(),
            Err(err) => {
                debug!(href, %err, "skipping unresolvable archive link");
                continue;
            }
        };
        links.push(ArchiveLink { url, title });
        if links.len() >= limit {
            break;
        }
    }

    Ok(links)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageMetadata {
    pub published_at: Option<String>,
    pub summary: String,
    pub author: Option<String>,
}

pub fn parse_article_page(html: &str) -> Result<PageMetadata, AdapterError> {
    let document = Html::parse_document(html);
    let published_at = select_first_attr(&document, "time", "datetime")?;
    let summary = match select_first_attr(&document, "meta[property='og:description']", "content")? {
        Some(s) => Some(s),
        None => select_first_attr(&document, "meta[name='description']", "content")?,
    };
    let author = select_first_attr(&document, "meta[property='article:author']", "content")?;
    Ok(PageMetadata {
        published_at,
        summary: summary.as_deref().map(truncate_summary).unwrap_or_default(),
        author,
    })
}

/// Substack-style newsletter archive: an index of `/p/<slug>` issue links,
/// each issue page carrying its own date and description.
#[derive(Debug, Clone)]
pub struct NewsletterArchiveAdapter {
    source_id: String,
    display_name: String,
    archive_url: Url,
    limit: usize,
    user_agent: Option<String>,
    default_author: String,
    category: String,
    delay: Duration,
}

impl NewsletterArchiveAdapter {
    pub fn from_spec(spec: &AdapterSpec) -> Result<Self, AdapterError> {
        let url = spec.url.as_deref().ok_or_else(|| {
            AdapterError::Message(format!("source {} has no archive url", spec.source_id))
        })?;
        let archive_url = Url::parse(url)
            .map_err(|e| AdapterError::Message(format!("invalid archive url {url}: {e}")))?;
        Ok(Self {
            source_id: spec.source_id.clone(),
            display_name: spec.display_name.clone(),
            archive_url,
            limit: spec.limit.unwrap_or(DEFAULT_ARCHIVE_LIMIT),
            user_agent: spec.user_agent.clone(),
            default_author: spec
                .default_author
                .clone()
                .unwrap_or_else(|| spec.display_name.clone()),
            category: spec.category.clone().unwrap_or_else(|| "AI News".into()),
            delay: politeness_delay(spec),
        })
    }

    fn to_article(&self, link: ArchiveLink, meta: PageMetadata, fetched_at: DateTime<Utc>) -> Article {
        let published_at = meta
            .published_at
            .unwrap_or_else(|| fetched_at.to_rfc3339());
        Article::new(link.url, link.title, self.display_name.clone(), published_at)
            .with_summary(meta.summary)
            .with_category(self.category.clone())
            .with_metadata(
                "author",
                meta.author.unwrap_or_else(|| self.default_author.clone()),
            )
            .with_metadata("newsletter_issue", "")
    }

    async fn fetch_page_metadata(&self, http: &HttpFetcher, ctx: &AdapterContext, url: &str) -> PageMetadata {
        let resp = match http
            .fetch_bytes_as(ctx.run_id, &self.source_id, url, self.user_agent.as_deref())
            .await
        {
            Ok(resp) => resp,
            Err(err) => {
                warn!(source_id = %self.source_id, url, %err, "could not fetch article metadata");
                return PageMetadata::default();
            }
        };
        parse_article_page(&resp.text()).unwrap_or_else(|err| {
            warn!(source_id = %self.source_id, url, %err, "could not parse article metadata");
            PageMetadata::default()
        })
    }
}

#[async_trait]
impl SourceAdapter for NewsletterArchiveAdapter {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::NewsletterArchive
    }

    async fn fetch(
        &self,
        http: &HttpFetcher,
        ctx: &AdapterContext,
    ) -> Result<Vec<Article>, AdapterError> {
        let archive = http
            .fetch_bytes_as(
                ctx.run_id,
                &self.source_id,
                self.archive_url.as_str(),
                self.user_agent.as_deref(),
            )
            .await?;
        // Relative issue links resolve against wherever the archive redirected to.
        let base = Url::parse(&archive.final_url).unwrap_or_else(|_| self.archive_url.clone());
        let links = parse_archive_links(&archive.text(), &base, self.limit)?;
        info!(
            source_id = %self.source_id,
            status = %archive.status,
            final_url = %archive.final_url,
            links = links.len(),
            "parsed newsletter archive"
        );

        let mut articles = Vec::with_capacity(links.len());
        for (idx, link) in links.into_iter().enumerate() {
            if idx > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let meta = self.fetch_page_metadata(http, ctx, &link.url).await;
            articles.push(self.to_article(link, meta, ctx.fetched_at));
        }
        Ok(articles)
    }
}

#[derive(Debug, Default, Deserialize)]
struct RedditListing {
    #[serde(default)]
    data: RedditListingData,
}

#[derive(Debug, Default, Deserialize)]
struct RedditListingData {
    #[serde(default)]
    children: Vec<RedditChild>,
}

#[derive(Debug, Default, Deserialize)]
struct RedditChild {
    #[serde(default)]
    data: RedditPost,
}

#[derive(Debug, Default, Deserialize)]
struct RedditPost {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    ups: i64,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    created_utc: Option<f64>,
    #[serde(default)]
    selftext: String,
}

fn timestamp_from_epoch(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.trunc();
    let nanos = ((secs - whole) * 1e9).round().clamp(0.0, 999_999_999.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
}

/// Map a `top.json` listing into articles. Posts without a title or url are dropped.
pub fn parse_reddit_listing(
    body: &[u8],
    subreddit: &str,
    source_name: &str,
    now: DateTime<Utc>,
) -> Result<Vec<Article>, AdapterError> {
    let listing: RedditListing = serde_json::from_slice(body).map_err(|e| AdapterError::Parse {
        what: format!("r/{subreddit} listing"),
        message: e.to_string(),
    })?;

    let mut articles = Vec::with_capacity(listing.data.children.len());
    for child in listing.data.children {
        let post = child.data;
        if post.title.trim().is_empty() || post.url.trim().is_empty() {
            warn!(subreddit, "skipping reddit post without title or url");
            continue;
        }
        let published_at = post
            .created_utc
            .and_then(timestamp_from_epoch)
            .unwrap_or(now)
            .to_rfc3339();
        articles.push(
            Article::new(post.url, post.title, source_name, published_at)
                .with_summary(truncate_selftext(&post.selftext))
                .with_category(format!("r/{subreddit}"))
                .with_metadata("author", post.author.unwrap_or_else(|| "Unknown".into()))
                .with_metadata("upvotes", post.ups)
                .with_metadata("subreddit", subreddit),
        );
    }
    Ok(articles)
}

/// Daily top posts from a fixed list of subreddits via the public JSON listing.
#[derive(Debug, Clone)]
pub struct RedditTopAdapter {
    source_id: String,
    display_name: String,
    api_origin: String,
    subreddits: Vec<String>,
    limit: usize,
    user_agent: Option<String>,
    delay: Duration,
}

impl RedditTopAdapter {
    pub fn from_spec(spec: &AdapterSpec) -> Self {
        let api_origin = spec.url.as_deref().unwrap_or("https://reddit.com");
        Self {
            source_id: spec.source_id.clone(),
            display_name: spec.display_name.clone(),
            api_origin: api_origin.trim_end_matches('/').to_string(),
            subreddits: spec.subreddits.clone(),
            limit: spec.limit.unwrap_or(DEFAULT_REDDIT_LIMIT),
            user_agent: spec.user_agent.clone(),
            delay: politeness_delay(spec),
        }
    }

    pub fn listing_url(&self, subreddit: &str) -> String {
        format!(
            "{}/r/{}/top.json?t=day&limit={}",
            self.api_origin, subreddit, self.limit
        )
    }
}

#[async_trait]
impl SourceAdapter for RedditTopAdapter {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::RedditTop
    }

    async fn fetch(
        &self,
        http: &HttpFetcher,
        ctx: &AdapterContext,
    ) -> Result<Vec<Article>, AdapterError> {
        let mut articles = Vec::new();
        let mut failures = 0usize;

        for (idx, subreddit) in self.subreddits.iter().enumerate() {
            if idx > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let url = self.listing_url(subreddit);
            let parsed = match http
                .fetch_bytes_as(ctx.run_id, &self.source_id, &url, self.user_agent.as_deref())
                .await
            {
                Ok(resp) => parse_reddit_listing(&resp.body, subreddit, &self.display_name, ctx.fetched_at),
                Err(err) => Err(err.into()),
            };
            match parsed {
                Ok(batch) => {
                    info!(subreddit = %subreddit, posts = batch.len(), "fetched subreddit");
                    articles.extend(batch);
                }
                Err(err) => {
                    warn!(subreddit = %subreddit, %err, "subreddit fetch failed");
                    failures += 1;
                }
            }
        }

        if failures > 0 && failures == self.subreddits.len() {
            return Err(AdapterError::AllTargetsFailed(failures));
        }
        Ok(articles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use newswire_core::identify;

    const ARCHIVE_HTML: &str = r#"
        <html><body>
          <a href="/about">About</a>
          <a href="/p/issue-3"> Issue   three </a>
          <a href="/p/issue-3"><img src="x.png"></a>
          <a href="https://bensbites.com/p/issue-2">Issue two</a>
          <a href="/p/image-only"><img src="y.png"></a>
          <a href="/p/issue-1">Issue one</a>
        </body></html>
    "#;

    const ISSUE_HTML: &str = r#"
        <html><head>
          <meta property="og:description" content="  Daily AI digest  ">
          <meta name="description" content="fallback">
          <meta property="article:author" content="Ben">
        </head><body><time datetime="2026-02-24T08:30:00.000Z">Feb 24</time></body></html>
    "#;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 24, 12, 0, 0).single().unwrap()
    }

    #[test]
    fn archive_links_are_deduplicated_resolved_and_capped() {
        let base = Url::parse("https://bensbites.com/archive").unwrap();
        let links = parse_archive_links(ARCHIVE_HTML, &base, 10).unwrap();
        assert_eq!(
            links,
            vec![
                ArchiveLink {
                    url: "https://bensbites.com/p/issue-3".into(),
                    title: "Issue three".into()
                },
                ArchiveLink {
                    url: "https://bensbites.com/p/issue-2".into(),
                    title: "Issue two".into()
                },
                ArchiveLink {
                    url: "https://bensbites.com/p/issue-1".into(),
                    title: "Issue one".into()
                },
            ]
        );

        let capped = parse_archive_links(ARCHIVE_HTML, &base, 2).unwrap();
        assert_eq!(capped.len(), 2);
    }

    #[test]
    fn article_page_metadata_prefers_open_graph() {
        let meta = parse_article_page(ISSUE_HTML).unwrap();
        assert_eq!(meta.published_at.as_deref(), Some("2026-02-24T08:30:00.000Z"));
        assert_eq!(meta.summary, "Daily AI digest");
        assert_eq!(meta.author.as_deref(), Some("Ben"));
    }

    #[test]
    fn article_page_falls_back_to_meta_description() {
        let html = r#"<html><head><meta name="description" content="plain"></head><body></body></html>"#;
        let meta = parse_article_page(html).unwrap();
        assert_eq!(meta.published_at, None);
        assert_eq!(meta.summary, "plain");
        assert_eq!(meta.author, None);
    }

    #[test]
    fn summaries_are_truncated_with_ellipsis() {
        let long = "x".repeat(250);
        let cut = truncate_summary(&long);
        assert_eq!(cut.chars().count(), SUMMARY_MAX_CHARS);
        assert!(cut.ends_with("..."));
        assert_eq!(truncate_summary("short"), "short");
        let exact = "é".repeat(SUMMARY_MAX_CHARS);
        assert_eq!(truncate_summary(&exact), exact);
    }

    #[test]
    fn selftext_keeps_full_width_before_ellipsis() {
        let long = "z".repeat(250);
        let cut = truncate_selftext(&long);
        assert_eq!(cut.chars().count(), SUMMARY_MAX_CHARS + 3);
        assert!(cut.starts_with(&"z".repeat(SUMMARY_MAX_CHARS)));
        assert!(cut.ends_with("..."));

        let exact = "é".repeat(SUMMARY_MAX_CHARS);
        assert_eq!(truncate_selftext(&exact), exact);
        assert_eq!(truncate_selftext(""), "");
    }

    fn builtin(source_id: &str) -> AdapterSpec {
        builtin_specs()
            .into_iter()
            .find(|s| s.source_id == source_id)
            .unwrap()
    }

    #[test]
    fn newsletter_article_uses_defaults_when_page_metadata_missing() {
        let adapter = NewsletterArchiveAdapter::from_spec(&builtin("bensbites")).unwrap();
        let link = ArchiveLink {
            url: "https://bensbites.com/p/issue-1".into(),
            title: "Issue one".into(),
        };
        let article = adapter.to_article(link, PageMetadata::default(), now());
        assert_eq!(article.id, identify("https://bensbites.com/p/issue-1"));
        assert_eq!(article.source, "Ben's Bites");
        assert_eq!(article.category, "AI News");
        assert_eq!(article.published_at, now().to_rfc3339());
        assert_eq!(article.metadata["author"], "Ben Tossell");
        assert_eq!(article.metadata["newsletter_issue"], "");
        assert!(!article.saved);
        assert!(article.missing_required_fields().is_empty());
    }

    #[test]
    fn reddit_listing_maps_posts_to_articles() {
        let body = serde_json::json!({
            "data": {"children": [
                {"data": {
                    "title": "New model released",
                    "url": "https://example.com/model",
                    "ups": 420,
                    "author": "alice",
                    "created_utc": 1771934400.0,
                    "selftext": "y".repeat(210)
                }},
                {"data": {"title": "", "url": "https://example.com/empty"}},
                {"data": {"title": "No author", "url": "https://example.com/anon"}}
            ]}
        });
        let bytes = serde_json::to_vec(&body).unwrap();
        let articles = parse_reddit_listing(&bytes, "artificial", "Reddit", now()).unwrap();

        assert_eq!(articles.len(), 2);
        let first = &articles[0];
        assert_eq!(first.id, identify("https://example.com/model"));
        assert_eq!(first.category, "r/artificial");
        assert_eq!(first.published_at, "2026-02-24T12:00:00+00:00");
        assert_eq!(first.summary, format!("{}...", "y".repeat(SUMMARY_MAX_CHARS)));
        assert_eq!(first.metadata["upvotes"], 420);
        assert_eq!(first.metadata["subreddit"], "artificial");
        let keys = first.metadata.keys().cloned().collect::<Vec<_>>();
        assert_eq!(keys, vec!["author", "upvotes", "subreddit"]);

        let anon = &articles[1];
        assert_eq!(anon.metadata["author"], "Unknown");
        assert_eq!(anon.published_at, now().to_rfc3339());
    }

    #[test]
    fn reddit_listing_rejects_non_json() {
        let err = parse_reddit_listing(b"<html>rate limited</html>", "artificial", "Reddit", now())
            .unwrap_err();
        assert!(matches!(err, AdapterError::Parse { .. }));
    }

    #[test]
    fn builtin_registry_builds_every_adapter() {
        for spec in builtin_specs() {
            let adapter = adapter_for_spec(&spec).unwrap();
            assert_eq!(adapter.source_id(), spec.source_id);
            assert_eq!(adapter.kind(), spec.kind);
        }
        assert!(adapter_for_source("reddit").is_some());
        assert!(adapter_for_source("unknown").is_none());
    }

    #[test]
    fn reddit_listing_url_uses_configured_origin() {
        let spec = AdapterSpec {
            url: Some("http://127.0.0.1:9999/".into()),
            limit: Some(5),
            ..builtin("reddit")
        };
        let adapter = RedditTopAdapter::from_spec(&spec);
        assert_eq!(
            adapter.listing_url("artificial"),
            "http://127.0.0.1:9999/r/artificial/top.json?t=day&limit=5"
        );
        assert_eq!(
            RedditTopAdapter::from_spec(&builtin("reddit")).listing_url("Singularity"),
            "https://reddit.com/r/Singularity/top.json?t=day&limit=10"
        );
    }

    #[test]
    fn newsletter_spec_without_url_is_rejected() {
        let spec = AdapterSpec {
            url: None,
            ..builtin("bensbites")
        };
        assert!(matches!(
            adapter_for_spec(&spec),
            Err(AdapterError::Message(_))
        ));
    }
}
