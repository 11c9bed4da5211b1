use std::time::Duration;

use atom_syndication::Feed;
use newswire_core::{Article, Timestamp, char_len};
use newswire_util_error::FmtCompact as _;
use reqwest::Client;
use scraper::{Html, Selector};
use snafu::{ResultExt as _, Snafu};
use tracing::{debug, info, warn};
use url::Url;

use crate::USER_AGENT;

const LOG_TARGET: &str = "newswire_bot::source";

pub const TECHCRUNCH_AI_URL: &str = "https://techcrunch.com/category/artificial-intelligence/";

/// Articles taken from the top of the listing page.
pub const LISTING_LIMIT: usize = 4;

/// Pages with less extracted text than this are not worth scoring.
pub const MIN_CONTENT_CHARS: usize = 100;

const LISTING_LINK_SELECTOR: &str = "a.loop-card__title-link";

/// Tried in order; the first one yielding enough text wins.
const CONTENT_SELECTORS: &[&str] = &[
    "div.article-content p",
    "div.entry-content p",
    "div.post-content p",
    "article p",
    "div.content p",
    ".article-body p",
];

/// Extraction from a selector stops once it yields more than this.
const ENOUGH_CONTENT_CHARS: usize = 200;

/// With no matching selector, only paragraphs longer than this are kept.
const LOOSE_PARAGRAPH_MIN_CHARS: usize = 50;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Snafu)]
pub enum SourceError {
    #[snafu(display("HTTP request failed"))]
    Http { source: reqwest::Error },
    #[snafu(display("Invalid CSS selector: {selector}"))]
    Selector { selector: &'static str },
    #[snafu(display("Invalid URL"))]
    Url { source: url::ParseError },
    #[snafu(display("Failed to parse feed"))]
    Feed { source: atom_syndication::Error },
    #[snafu(display("All {count} article sources failed"))]
    AllFailed { count: usize },
}

pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Produces candidate articles for a batch.
///
/// Every call fetches afresh; results are finite and not deduplicated.
#[async_trait::async_trait]
pub trait ArticleSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_candidates(&self) -> SourceResult<Vec<Article>>;
}

fn http_client() -> SourceResult<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(HTTP_TIMEOUT)
        .build()
        .context(HttpSnafu)
}

fn selector(selector: &'static str) -> SourceResult<Selector> {
    Selector::parse(selector).map_err(|_| SourceError::Selector { selector })
}

/// Whitespace-normalized text of an element-like node.
fn collapse_whitespace<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Scrapes the TechCrunch AI category.
pub struct TechCrunchSource {
    client: Client,
    listing_url: Url,
}

impl TechCrunchSource {
    pub fn new() -> SourceResult<Self> {
        Ok(Self {
            client: http_client()?,
            listing_url: Url::parse(TECHCRUNCH_AI_URL).context(UrlSnafu)?,
        })
    }

    /// `(title, absolute url)` of the newest articles on a listing page.
    pub fn parse_listing(html: &str, base: &Url) -> SourceResult<Vec<(String, String)>> {
        let document = Html::parse_document(html);
        let link_selector = selector(LISTING_LINK_SELECTOR)?;

        let mut links = vec![];
        for link in document.select(&link_selector) {
            if links.len() == LISTING_LIMIT {
                break;
            }
            let title = collapse_whitespace(link.text());
            let Some(href) = link.value().attr("href") else {
                debug!(target: LOG_TARGET, %title, "Listing link without href");
                continue;
            };
            let Ok(url) = base.join(href) else {
                debug!(target: LOG_TARGET, %href, "Unparseable listing link");
                continue;
            };
            if title.is_empty() {
                continue;
            }
            links.push((title, url.to_string()));
        }
        Ok(links)
    }

    /// Readable text of an article page, paragraphs separated by newlines.
    pub fn extract_content(html: &str) -> SourceResult<String> {
        let document = Html::parse_document(html);

        let mut content = String::new();
        for &css in CONTENT_SELECTORS {
            let paragraph_selector = selector(css)?;
            let paragraphs: Vec<String> = document
                .select(&paragraph_selector)
                .map(|p| collapse_whitespace(p.text()))
                .filter(|p| !p.is_empty())
                .collect();
            if paragraphs.is_empty() {
                continue;
            }
            content = paragraphs.join("\n");
            if ENOUGH_CONTENT_CHARS < char_len(&content) {
                break;
            }
        }

        if content.is_empty() {
            let any_paragraph = selector("p")?;
            content = document
                .select(&any_paragraph)
                .map(|p| collapse_whitespace(p.text()))
                .filter(|p| LOOSE_PARAGRAPH_MIN_CHARS < char_len(p))
                .collect::<Vec<_>>()
                .join("\n");
        }

        Ok(content)
    }

    async fn get_text(&self, url: &str) -> SourceResult<String> {
        self.client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .context(HttpSnafu)?
            .text()
            .await
            .context(HttpSnafu)
    }
}

#[async_trait::async_trait]
impl ArticleSource for TechCrunchSource {
    fn name(&self) -> &str {
        "techcrunch"
    }

    async fn fetch_candidates(&self) -> SourceResult<Vec<Article>> {
        info!(target: LOG_TARGET, url = %self.listing_url, "Fetching TechCrunch listing");
        let listing = self.get_text(self.listing_url.as_str()).await?;
        let links = Self::parse_listing(&listing, &self.listing_url)?;

        let fetched_at = Timestamp::now();
        let mut articles = vec![];
        for (title, url) in links {
            let page = match self.get_text(&url).await {
                Ok(page) => page,
                Err(err) => {
                    warn!(target: LOG_TARGET, %url, err = %err.fmt_compact(), "Failed to fetch article page");
                    continue;
                }
            };
            let content = Self::extract_content(&page)?;
            if char_len(&content) < MIN_CONTENT_CHARS {
                debug!(target: LOG_TARGET, %url, "Not enough article text, skipping");
                continue;
            }

            match Article::new(title, url, content, self.name(), fetched_at) {
                Ok(article) => articles.push(article),
                Err(err) => {
                    warn!(target: LOG_TARGET, err = %err, "Skipping malformed article");
                }
            }
        }

        info!(target: LOG_TARGET, count = articles.len(), "Fetched TechCrunch articles");
        Ok(articles)
    }
}

/// Reads articles from an Atom feed.
pub struct AtomFeedSource {
    client: Client,
    feed_url: Url,
    name: String,
}

impl AtomFeedSource {
    pub fn new(feed_url: Url) -> SourceResult<Self> {
        let name = format!("atom:{}", feed_url.host_str().unwrap_or("feed"));
        Ok(Self {
            client: http_client()?,
            feed_url,
            name,
        })
    }

    pub fn parse_feed(xml: &str, source: &str, fetched_at: Timestamp) -> SourceResult<Vec<Article>> {
        let feed: Feed = xml.parse().context(FeedSnafu)?;

        let mut articles = vec![];
        for entry in feed.entries() {
            let link = entry
                .links()
                .iter()
                .find(|l| l.rel() == "alternate")
                .or_else(|| entry.links().first());
            let Some(link) = link else {
                debug!(target: LOG_TARGET, title = %entry.title().as_str(), "Feed entry without link");
                continue;
            };

            let html = entry
                .content()
                .and_then(|c| c.value())
                .or_else(|| entry.summary().map(|s| s.as_str()))
                .unwrap_or_default();
            let content = html_to_text(html);

            match Article::new(entry.title().as_str(), link.href(), content, source, fetched_at) {
                Ok(article) => articles.push(article),
                Err(err) => {
                    warn!(target: LOG_TARGET, err = %err, "Skipping malformed feed entry");
                }
            }
        }
        Ok(articles)
    }
}

/// Plain text of an HTML fragment.
pub fn html_to_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    collapse_whitespace(fragment.root_element().text())
}

#[async_trait::async_trait]
impl ArticleSource for AtomFeedSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_candidates(&self) -> SourceResult<Vec<Article>> {
        info!(target: LOG_TARGET, url = %self.feed_url, "Fetching Atom feed");
        let xml = self
            .client
            .get(self.feed_url.clone())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .context(HttpSnafu)?
            .text()
            .await
            .context(HttpSnafu)?;

        let articles = Self::parse_feed(&xml, &self.name, Timestamp::now())?;
        info!(target: LOG_TARGET, count = articles.len(), source = %self.name, "Fetched feed articles");
        Ok(articles)
    }
}

/// Tries sources in order and returns the first non-empty result.
pub struct FallbackSource {
    sources: Vec<Box<dyn ArticleSource>>,
}

impl FallbackSource {
    pub fn new(sources: Vec<Box<dyn ArticleSource>>) -> Self {
        Self { sources }
    }
}

#[async_trait::async_trait]
impl ArticleSource for FallbackSource {
    fn name(&self) -> &str {
        "fallback"
    }

    /// Fails only if every source failed; an empty result from a source
    /// that worked is not a failure.
    async fn fetch_candidates(&self) -> SourceResult<Vec<Article>> {
        let mut failed = 0;
        for source in &self.sources {
            match source.fetch_candidates().await {
                Ok(articles) if !articles.is_empty() => return Ok(articles),
                Ok(_) => {
                    info!(target: LOG_TARGET, source = %source.name(), "Source returned no articles");
                }
                Err(err) => {
                    failed += 1;
                    warn!(target: LOG_TARGET, source = %source.name(), err = %err.fmt_compact(), "Source failed, trying next");
                }
            }
        }

        if failed != 0 && failed == self.sources.len() {
            return AllFailedSnafu { count: failed }.fail();
        }
        Ok(vec![])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <html><body>
          <div class="loop-card"><a class="loop-card__title-link" href="https://techcrunch.com/2025/01/01/one/">
            First   story</a></div>
          <div class="loop-card"><a class="loop-card__title-link" href="/2025/01/01/two/">Second story</a></div>
          <div class="loop-card"><a class="loop-card__title-link">No href</a></div>
          <div class="loop-card"><a class="loop-card__title-link" href="/3/">Third</a></div>
          <div class="loop-card"><a class="loop-card__title-link" href="/4/">Fourth</a></div>
          <div class="loop-card"><a class="loop-card__title-link" href="/5/">Fifth</a></div>
        </body></html>"#;

    #[test]
    fn listing_takes_newest_links_and_resolves_relative_urls() {
        let base = Url::parse(TECHCRUNCH_AI_URL).expect("valid");
        let links = TechCrunchSource::parse_listing(LISTING, &base).expect("parses");

        assert_eq!(links.len(), LISTING_LIMIT);
        assert_eq!(
            links[0],
            (
                "First story".to_owned(),
                "https://techcrunch.com/2025/01/01/one/".to_owned()
            )
        );
        assert_eq!(links[1].1, "https://techcrunch.com/2025/01/01/two/");
        assert_eq!(links[3].0, "Fourth");
    }

    #[test]
    fn content_prefers_first_selector_with_enough_text() {
        let long = "word ".repeat(60);
        let html = format!(
            r#"<div class="entry-content"><p>{long}</p><p>  </p><p>second</p></div>
               <article><p>other text</p></article>"#
        );
        let content = TechCrunchSource::extract_content(&html).expect("parses");
        assert!(content.starts_with("word word"));
        assert!(content.ends_with("\nsecond"));
        assert!(!content.contains("other text"));
    }

    #[test]
    fn content_falls_back_to_long_paragraphs() {
        let long = "x".repeat(LOOSE_PARAGRAPH_MIN_CHARS + 1);
        let html = format!("<div><p>short</p><p>{long}</p></div>");
        assert_eq!(TechCrunchSource::extract_content(&html).expect("parses"), long);
    }

    #[test]
    fn atom_entries_become_articles() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
            <feed xmlns="http://www.w3.org/2005/Atom">
              <title>Example</title>
              <id>urn:example</id>
              <updated>2025-01-01T00:00:00Z</updated>
              <entry>
                <title>Robots learn to fold laundry</title>
                <id>urn:1</id>
                <updated>2025-01-01T00:00:00Z</updated>
                <link rel="alternate" href="https://example.com/robots"/>
                <content type="html">&lt;p&gt;A &lt;b&gt;new&lt;/b&gt; robot.&lt;/p&gt;</content>
              </entry>
              <entry>
                <title>No link here</title>
                <id>urn:2</id>
                <updated>2025-01-01T00:00:00Z</updated>
              </entry>
            </feed>"#;

        let articles =
            AtomFeedSource::parse_feed(xml, "atom:example.com", Timestamp::ZERO).expect("parses");
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title(), "Robots learn to fold laundry");
        assert_eq!(articles[0].url(), "https://example.com/robots");
        assert_eq!(articles[0].content(), "A new robot.");
        assert_eq!(articles[0].source(), "atom:example.com");
    }
}
