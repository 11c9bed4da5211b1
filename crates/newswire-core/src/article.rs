use snafu::{Snafu, ensure};

use crate::{ContentHash, Timestamp, char_len};

/// Longest article body kept for scoring and composition.
pub const MAX_CONTENT_CHARS: usize = 2000;

/// Longest URL an article may carry.
///
/// The link is never shortened when composing a post, so it has to leave
/// room inside the platform limit for the rest of the text.
pub const MAX_URL_CHARS: usize = 200;

#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum ArticleError {
    #[snafu(display("Article title is empty"))]
    EmptyTitle,
    #[snafu(display("Article URL is empty"))]
    EmptyUrl,
    #[snafu(display("Article URL is too long ({len} chars, max {MAX_URL_CHARS})"))]
    UrlTooLong { len: usize },
}

/// A candidate news article, as produced by an article source.
///
/// Read-only once constructed.
#[cfg_attr(feature = "bincode", derive(::bincode::Encode, ::bincode::Decode))]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    title: String,
    url: String,
    content: String,
    content_hash: ContentHash,
    fetched_at: Timestamp,
    source: String,
}

impl Article {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        content: impl Into<String>,
        source: impl Into<String>,
        fetched_at: Timestamp,
    ) -> Result<Self, ArticleError> {
        let title = title.into().trim().to_owned();
        let url = url.into().trim().to_owned();
        ensure!(!title.is_empty(), EmptyTitleSnafu);
        ensure!(!url.is_empty(), EmptyUrlSnafu);
        let len = char_len(&url);
        ensure!(len <= MAX_URL_CHARS, UrlTooLongSnafu { len });

        let mut content = content.into();
        if MAX_CONTENT_CHARS < char_len(&content) {
            content = content.chars().take(MAX_CONTENT_CHARS).collect();
        }

        Ok(Self {
            content_hash: ContentHash::of_title(&title),
            title,
            url,
            content,
            fetched_at,
            source: source.into(),
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn content_hash(&self) -> ContentHash {
        self.content_hash
    }

    pub fn fetched_at(&self) -> Timestamp {
        self.fetched_at
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Title and content in one lowercase string, for keyword detection.
    pub fn searchable_text(&self) -> String {
        format!("{} {}", self.title, self.content).to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(title: &str, url: &str) -> Result<Article, ArticleError> {
        Article::new(title, url, "body", "test", Timestamp::from(1u64))
    }

    #[test]
    fn rejects_missing_fields() {
        assert_eq!(article("  ", "https://a.example"), Err(ArticleError::EmptyTitle));
        assert_eq!(article("Title", ""), Err(ArticleError::EmptyUrl));
    }

    #[test]
    fn rejects_overlong_url() {
        let url = format!("https://example.com/{}", "a".repeat(MAX_URL_CHARS));
        assert!(matches!(
            article("Title", &url),
            Err(ArticleError::UrlTooLong { .. })
        ));
    }

    #[test]
    fn hash_follows_title_not_url() {
        let a = article("Same Title", "https://example.com/Story").expect("valid");
        let b = article("Same Title", "https://EXAMPLE.com/story").expect("valid");
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn content_is_capped() {
        let a = Article::new(
            "Title",
            "https://example.com",
            "é".repeat(MAX_CONTENT_CHARS + 50),
            "test",
            Timestamp::ZERO,
        )
        .expect("valid");
        assert_eq!(char_len(a.content()), MAX_CONTENT_CHARS);
    }
}
