use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use snafu::{ResultExt as _, Snafu};
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{debug, info};

use crate::USER_AGENT;

const LOG_TARGET: &str = "newswire_bot::notifier";

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// How many of the latest bot updates are searched for chats.
const RECENT_UPDATES: usize = 10;

#[derive(Debug, Snafu)]
pub enum NotifyError {
    #[snafu(display("Notification request failed"))]
    Http { source: reqwest::Error },
    #[snafu(display("Failed to format notification time"))]
    TimeFormat { source: time::error::Format },
    #[snafu(display("Unexpected Telegram response"))]
    Json { source: serde_json::Error },
}

pub type NotifyResult<T> = std::result::Result<T, NotifyError>;

/// Tells a human that something was published.
///
/// Failures are never fatal to the caller.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, text: &str, link: &str, title: &str) -> NotifyResult<()>;
}

/// Drops every notification.
pub struct NoopNotifier;

#[async_trait::async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _text: &str, link: &str, _title: &str) -> NotifyResult<()> {
        debug!(target: LOG_TARGET, %link, "Notifications disabled");
        Ok(())
    }
}

/// A chat that recently messaged the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatInfo {
    pub chat_id: i64,
    pub kind: String,
    /// Group title, or the person's name for private chats.
    pub title: String,
}

#[derive(Deserialize)]
struct UpdatesResponse {
    #[serde(default)]
    result: Vec<Update>,
}

#[derive(Deserialize)]
struct Update {
    message: Option<UpdateMessage>,
}

#[derive(Deserialize)]
struct UpdateMessage {
    chat: Chat,
}

#[derive(Deserialize)]
struct Chat {
    id: i64,
    #[serde(rename = "type", default)]
    kind: String,
    title: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
}

impl From<Chat> for ChatInfo {
    fn from(chat: Chat) -> Self {
        let title = chat.title.unwrap_or_else(|| {
            [chat.first_name, chat.last_name]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" ")
        });
        Self {
            chat_id: chat.id,
            kind: chat.kind,
            title,
        }
    }
}

/// Distinct chats from the latest `getUpdates` entries, oldest first.
pub fn parse_updates(body: &str) -> NotifyResult<Vec<ChatInfo>> {
    let response: UpdatesResponse = serde_json::from_str(body).context(JsonSnafu)?;
    let skip = response.result.len().saturating_sub(RECENT_UPDATES);

    let mut chats: Vec<ChatInfo> = vec![];
    for update in response.result.into_iter().skip(skip) {
        let Some(message) = update.message else {
            continue;
        };
        let chat = ChatInfo::from(message.chat);
        if !chats.contains(&chat) {
            chats.push(chat);
        }
    }
    Ok(chats)
}

fn http_client() -> NotifyResult<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(10))
        .build()
        .context(HttpSnafu)
}

/// Sends a chat message through the Telegram Bot API.
pub struct TelegramNotifier {
    client: Client,
    bot_token: String,
    chat_id: String,
    api_base: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> NotifyResult<Self> {
        Ok(Self {
            client: http_client()?,
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            api_base: TELEGRAM_API_BASE.to_owned(),
        })
    }

    /// Chats that recently wrote to the bot, to find the id to notify.
    ///
    /// Telegram only reports chats that sent the bot a message.
    pub async fn recent_chat_ids(bot_token: &str) -> NotifyResult<Vec<ChatInfo>> {
        let body = http_client()?
            .get(format!("{TELEGRAM_API_BASE}/bot{bot_token}/getUpdates"))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .context(HttpSnafu)?
            .text()
            .await
            .context(HttpSnafu)?;
        let chats = parse_updates(&body)?;
        debug!(target: LOG_TARGET, count = chats.len(), "Found recent chats");
        Ok(chats)
    }

    pub fn message(text: &str, link: &str, title: &str, at: OffsetDateTime) -> NotifyResult<String> {
        let time = at
            .format(format_description!("[year]-[month]-[day] [hour]:[minute] UTC"))
            .context(TimeFormatSnafu)?;
        Ok(format!(
            "🤖 New post published\n\n📰 {title}\n\n💬 {text}\n\n🔗 {link}\n\n⏰ {time}"
        ))
    }
}

#[async_trait::async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, text: &str, link: &str, title: &str) -> NotifyResult<()> {
        let message = Self::message(text, link, title, OffsetDateTime::now_utc())?;

        self.client
            .post(format!("{}/bot{}/sendMessage", self.api_base, self.bot_token))
            .json(&serde_json::json!({
                "chat_id": self.chat_id,
                "text": message,
                "disable_web_page_preview": false,
            }))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .context(HttpSnafu)?;

        info!(target: LOG_TARGET, chat_id = %self.chat_id, "Sent notification");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn updates_yield_distinct_recent_chats() {
        let body = r#"{
            "ok": true,
            "result": [
                {"update_id": 1, "message": {"chat": {"id": 42, "type": "private", "first_name": "Ada", "last_name": "Lovelace"}}},
                {"update_id": 2, "edited_message": {"chat": {"id": 7, "type": "private"}}},
                {"update_id": 3, "message": {"chat": {"id": -100, "type": "group", "title": "Newsroom"}}},
                {"update_id": 4, "message": {"chat": {"id": 42, "type": "private", "first_name": "Ada", "last_name": "Lovelace"}}}
            ]
        }"#;
        assert_eq!(
            parse_updates(body).expect("parses"),
            [
                ChatInfo {
                    chat_id: 42,
                    kind: "private".into(),
                    title: "Ada Lovelace".into(),
                },
                ChatInfo {
                    chat_id: -100,
                    kind: "group".into(),
                    title: "Newsroom".into(),
                },
            ]
        );
    }

    #[test]
    fn only_latest_updates_are_considered() {
        let updates: Vec<_> = (0..15)
            .map(|id| serde_json::json!({ "message": { "chat": { "id": id, "type": "private", "first_name": "U" } } }))
            .collect();
        let body = serde_json::json!({ "ok": true, "result": updates }).to_string();
        let ids: Vec<_> = parse_updates(&body)
            .expect("parses")
            .into_iter()
            .map(|chat| chat.chat_id)
            .collect();
        assert_eq!(ids, (5..15).collect::<Vec<i64>>());
        assert!(parse_updates(r#"{"ok": true}"#).expect("parses").is_empty());
    }

    #[test]
    fn message_lists_title_text_link_and_time() {
        let message = TelegramNotifier::message(
            "Post text",
            "https://x.com/i/web/status/1",
            "Article title",
            datetime!(2025-03-04 05:06 UTC),
        )
        .expect("formats");
        assert_eq!(
            message,
            "🤖 New post published\n\n📰 Article title\n\n💬 Post text\n\n🔗 https://x.com/i/web/status/1\n\n⏰ 2025-03-04 05:06 UTC"
        );
    }
}
