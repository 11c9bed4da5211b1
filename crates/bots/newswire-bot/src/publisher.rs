use std::time::Duration;

use newswire_core::{PLATFORM_LIMIT, PublishReceipt};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use snafu::{OptionExt as _, ResultExt as _, Snafu};
use tracing::info;

use crate::USER_AGENT;
use crate::composer::clamp_to_limit;

const LOG_TARGET: &str = "newswire_bot::publisher";

pub const X_API_BASE: &str = "https://api.twitter.com/2";

#[derive(Debug, Snafu)]
pub enum PublishError {
    #[snafu(display("No access token configured for publishing"))]
    MissingToken,
    #[snafu(display("Publish request failed"))]
    Http { source: reqwest::Error },
    #[snafu(display("Publish API returned {status}: {body}"))]
    Rejected { status: StatusCode, body: String },
}

pub type PublishResult<T> = std::result::Result<T, PublishError>;

/// Posts text to the social network.
///
/// Not idempotent: every successful call creates a new post.
#[async_trait::async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, text: &str) -> PublishResult<PublishReceipt>;
}

#[derive(Deserialize)]
struct CreatePostResponse {
    data: CreatedPost,
}

#[derive(Deserialize)]
struct CreatedPost {
    id: String,
}

/// Publishes through the X API v2 with a user-context bearer token.
pub struct XPublisher {
    client: Client,
    access_token: Option<String>,
    api_base: String,
}

impl XPublisher {
    pub fn new(access_token: Option<String>) -> PublishResult<Self> {
        Self::with_api_base(access_token, X_API_BASE)
    }

    pub fn with_api_base(
        access_token: Option<String>,
        api_base: impl Into<String>,
    ) -> PublishResult<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .context(HttpSnafu)?;
        Ok(Self {
            client,
            access_token: access_token.filter(|t| !t.trim().is_empty()),
            api_base: api_base.into().trim_end_matches('/').to_owned(),
        })
    }

    pub fn post_url(id: &str) -> String {
        format!("https://x.com/i/web/status/{id}")
    }
}

#[async_trait::async_trait]
impl Publisher for XPublisher {
    async fn publish(&self, text: &str) -> PublishResult<PublishReceipt> {
        let token = self.access_token.as_deref().context(MissingTokenSnafu)?;
        let text = clamp_to_limit(text, PLATFORM_LIMIT);

        let response = self
            .client
            .post(format!("{}/tweets", self.api_base))
            .bearer_auth(token)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .context(HttpSnafu)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return RejectedSnafu { status, body }.fail();
        }

        let created: CreatePostResponse = response.json().await.context(HttpSnafu)?;
        let receipt = PublishReceipt {
            url: Self::post_url(&created.data.id),
            id: created.data.id,
        };
        info!(target: LOG_TARGET, id = %receipt.id, url = %receipt.url, "Published post");
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test(tokio::test)]
    async fn publishing_without_token_fails_before_any_request() {
        let publisher = XPublisher::new(Some("  ".into())).expect("client builds");
        assert!(matches!(
            publisher.publish("hello").await,
            Err(PublishError::MissingToken)
        ));
    }

    #[test]
    fn post_url_points_at_status() {
        assert_eq!(XPublisher::post_url("123"), "https://x.com/i/web/status/123");
    }
}
