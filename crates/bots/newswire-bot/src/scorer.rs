use std::sync::Arc;
use std::time::Duration;

use newswire_core::{Article, Audience, Importance, ScoreResult, ScoreSource};
use newswire_util_error::FmtCompact as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use snafu::{OptionExt as _, ResultExt as _, Snafu};
use tracing::{debug, warn};

use crate::USER_AGENT;
use crate::composer::SUMMARY_MAX_CHARS;

const LOG_TARGET: &str = "newswire_bot::scorer";

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

const SCORE_PROMPT_CHARS: usize = 800;
const CATEGORIZE_PROMPT_CHARS: usize = 500;
const SUMMARIZE_PROMPT_CHARS: usize = 1500;

#[derive(Debug, Snafu)]
pub enum ScorerError {
    #[snafu(display("No model API key configured"))]
    MissingApiKey,
    #[snafu(display("Model API request failed"))]
    Http { source: reqwest::Error },
    #[snafu(display("Model reply had no content"))]
    EmptyReply,
    #[snafu(display("Unusable score reply: {reply}"))]
    InvalidScore { reply: String },
    #[snafu(display("Unusable audience reply"))]
    InvalidAudience {
        source: newswire_core::score::AudienceParseError,
    },
}

pub type ScorerResult<T> = std::result::Result<T, ScorerError>;

/// Model-backed judgement of an article.
///
/// Each call may fail independently; [`Evaluator`] turns failures into
/// neutral defaults.
#[async_trait::async_trait]
pub trait Scorer: Send + Sync {
    async fn score(&self, text: &str) -> ScorerResult<Importance>;

    async fn categorize(&self, text: &str) -> ScorerResult<Audience>;

    async fn summarize(&self, article: &Article, max_chars: usize) -> ScorerResult<String>;
}

/// The first `max` characters of `s`.
fn prefix(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Importance from a reply like "8", "8/10" or "Score: 7".
pub fn parse_score(reply: &str) -> ScorerResult<Importance> {
    reply
        .split_whitespace()
        .find_map(|token| {
            let digits: String = token
                .trim_start_matches(|c: char| !c.is_ascii_digit())
                .chars()
                .take_while(char::is_ascii_digit)
                .collect();
            digits.parse::<u8>().ok()
        })
        .and_then(Importance::new)
        .context(InvalidScoreSnafu { reply: reply.trim() })
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// [`Scorer`] talking to an OpenAI-compatible chat completions API.
pub struct LlmScorer {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

#[bon::bon]
impl LlmScorer {
    #[builder(finish_fn(name = "build"))]
    pub fn new(
        api_key: Option<String>,
        #[builder(into, default = DEFAULT_BASE_URL.to_owned())] base_url: String,
        #[builder(into, default = DEFAULT_MODEL.to_owned())] model: String,
        #[builder(default = Duration::from_secs(30))] timeout: Duration,
    ) -> ScorerResult<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .context(HttpSnafu)?;
        Ok(Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: base_url.trim_end_matches('/').to_owned(),
            model,
        })
    }

    async fn chat(&self, prompt: &str, max_tokens: u32) -> ScorerResult<String> {
        let api_key = self.api_key.as_deref().context(MissingApiKeySnafu)?;

        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens,
            temperature: 0.7,
        };

        let response: ChatResponse = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .context(HttpSnafu)?
            .json()
            .await
            .context(HttpSnafu)?;

        let reply = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_owned())
            .filter(|c| !c.is_empty())
            .context(EmptyReplySnafu)?;
        debug!(target: LOG_TARGET, model = %self.model, %reply, "Model replied");
        Ok(reply)
    }
}

#[async_trait::async_trait]
impl Scorer for LlmScorer {
    async fn score(&self, text: &str) -> ScorerResult<Importance> {
        let prompt = format!(
            "Rate how important this AI/tech news is on a scale from 1 to 10.\n\
             Consider novelty, industry impact, relevance to developers and general interest.\n\
             Reply with the number only.\n\n\
             {}\n\nScore:",
            prefix(text, SCORE_PROMPT_CHARS)
        );
        parse_score(&self.chat(&prompt, 10).await?)
    }

    async fn categorize(&self, text: &str) -> ScorerResult<Audience> {
        let prompt = format!(
            "Who is the main audience for this news?\n\
             Options: Developer, Investor, General.\n\
             Reply with one word.\n\n\
             {}\n\nAudience:",
            prefix(text, CATEGORIZE_PROMPT_CHARS)
        );
        self.chat(&prompt, 10)
            .await?
            .parse()
            .context(InvalidAudienceSnafu)
    }

    async fn summarize(&self, article: &Article, max_chars: usize) -> ScorerResult<String> {
        let prompt = format!(
            "Write a short, engaging social media post in English about this news.\n\
             At most {max_chars} characters. Mention the key company, product or figure.\n\
             No hashtags, no emojis, no links, no quotes around the text.\n\n\
             Title: {}\n\
             Content: {}\n\nPost:",
            article.title(),
            prefix(article.content(), SUMMARIZE_PROMPT_CHARS)
        );
        self.chat(&prompt, 150).await
    }
}

/// Runs the scorer calls for an article, never failing.
///
/// Each call is a separate method so callers can stop after the score, or
/// space the calls out.
#[derive(Clone)]
pub struct Evaluator {
    scorer: Arc<dyn Scorer>,
}

impl Evaluator {
    pub fn new(scorer: Arc<dyn Scorer>) -> Self {
        Self { scorer }
    }

    fn scoring_text(article: &Article) -> String {
        format!("{}\n\n{}", article.title(), article.content())
    }

    /// A failed score yields [`Importance::NEUTRAL`] tagged as a fallback.
    pub async fn importance(&self, article: &Article) -> (Importance, ScoreSource) {
        match self.scorer.score(&Self::scoring_text(article)).await {
            Ok(importance) => (importance, ScoreSource::Model),
            Err(err) => {
                warn!(
                    target: LOG_TARGET,
                    title = %article.title(),
                    err = %err.fmt_compact(),
                    "Scoring failed, using neutral score"
                );
                (Importance::NEUTRAL, ScoreSource::Fallback)
            }
        }
    }

    pub async fn audience(&self, article: &Article) -> Audience {
        self.scorer
            .categorize(&Self::scoring_text(article))
            .await
            .unwrap_or_else(|err| {
                debug!(target: LOG_TARGET, err = %err.fmt_compact(), "Categorization failed");
                Audience::General
            })
    }

    /// Model-written post body, or an empty one.
    pub async fn summary(&self, article: &Article) -> String {
        self.scorer
            .summarize(article, SUMMARY_MAX_CHARS)
            .await
            .unwrap_or_else(|err| {
                debug!(target: LOG_TARGET, err = %err.fmt_compact(), "Summarization failed");
                String::new()
            })
    }

    /// Score, audience and summary for `article`, back to back.
    pub async fn evaluate(&self, article: &Article) -> ScoreResult {
        let (importance, source) = self.importance(article).await;
        ScoreResult {
            importance,
            audience: self.audience(article).await,
            summary: self.summary(article).await,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use newswire_core::Timestamp;

    use super::*;

    #[test]
    fn score_replies_are_parsed_leniently() {
        let parse = |s: &str| parse_score(s).ok().map(Importance::get);
        assert_eq!(parse("8"), Some(8));
        assert_eq!(parse(" 7/10\n"), Some(7));
        assert_eq!(parse("Score: 10."), Some(10));
        assert_eq!(parse("0"), None);
        assert_eq!(parse("eleven"), None);
        assert_eq!(parse("42"), None);
    }

    struct BrokenScorer;

    #[async_trait::async_trait]
    impl Scorer for BrokenScorer {
        async fn score(&self, _text: &str) -> ScorerResult<Importance> {
            InvalidScoreSnafu { reply: "n/a" }.fail()
        }

        async fn categorize(&self, _text: &str) -> ScorerResult<Audience> {
            EmptyReplySnafu.fail()
        }

        async fn summarize(&self, _article: &Article, _max_chars: usize) -> ScorerResult<String> {
            MissingApiKeySnafu.fail()
        }
    }

    #[test_log::test(tokio::test)]
    async fn evaluator_falls_back_on_every_failure() {
        let article =
            Article::new("Title", "https://example.com", "Body", "test", Timestamp::ZERO)
                .expect("valid");
        let result = Evaluator::new(Arc::new(BrokenScorer)).evaluate(&article).await;
        assert_eq!(result, ScoreResult::fallback());
    }

    #[test_log::test(tokio::test)]
    async fn scorer_without_key_fails_fast() {
        let scorer = LlmScorer::builder().build().expect("client builds");
        assert!(matches!(
            scorer.score("anything").await,
            Err(ScorerError::MissingApiKey)
        ));
    }
}
