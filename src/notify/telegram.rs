// =============================================================================
// Telegram Bot API — outbound messages
// =============================================================================
//
// SECURITY: The bot token is part of the request path and is never logged or
// included in error messages.
// =============================================================================

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::market_data::snippet;

const BASE_URL: &str = "https://api.telegram.org";

/// Telegram rejects messages longer than this many characters.
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// Formatting mode passed as `parse_mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParseMode {
    Markdown,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<ParseMode>,
}

/// Sends text to a single fixed chat.
#[derive(Clone)]
pub struct TelegramNotifier {
    token: String,
    chat_id: String,
    base_url: String,
    client: reqwest::Client,
}

impl TelegramNotifier {
    pub fn new(
        token: impl Into<String>,
        chat_id: impl Into<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            token: token.into(),
            chat_id: chat_id.into(),
            base_url: BASE_URL.to_string(),
            client,
        }
    }

    /// Point the notifier at another Bot API host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Build from `TELEGRAM_TOKEN` and `TELEGRAM_CHAT`. `TELEGRAM_API_URL`
    /// optionally points at a self-hosted Bot API server.
    pub fn from_env(client: reqwest::Client) -> Result<Self> {
        let token = std::env::var("TELEGRAM_TOKEN").context("TELEGRAM_TOKEN is not set")?;
        let chat = std::env::var("TELEGRAM_CHAT").context("TELEGRAM_CHAT is not set")?;
        let notifier = Self::new(token, chat, client);
        Ok(match std::env::var("TELEGRAM_API_URL") {
            Ok(url) if !url.trim().is_empty() => notifier.with_base_url(url.trim().trim_end_matches('/')),
            _ => notifier,
        })
    }

    /// POST sendMessage. Text longer than Telegram's limit is split on line
    /// boundaries and sent as consecutive messages.
    ///
    /// Any failure is returned to the caller: an undelivered report is
    /// worthless, so delivery errors are fatal for the run.
    #[instrument(skip(self, text), fields(chars = text.chars().count()), name = "telegram::send_message")]
    pub async fn send_message(&self, text: &str, parse_mode: Option<ParseMode>) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.token);

        for chunk in split_message(text, MAX_MESSAGE_CHARS) {
            let payload = SendMessage {
                chat_id: &self.chat_id,
                text: &chunk,
                parse_mode,
            };

            // reqwest errors embed the URL, which contains the token.
            let resp = self
                .client
                .post(&url)
                .json(&payload)
                .send()
                .await
                .map_err(|e| anyhow::anyhow!("telegram sendMessage request failed: {}", e.without_url()))?;

            let status = resp.status();
            let text = resp
                .text()
                .await
                .map_err(|e| anyhow::anyhow!("failed to read telegram response: {}", e.without_url()))?;

            if !status.is_success() {
                anyhow::bail!("telegram sendMessage returned {}: {}", status, snippet(&text));
            }

            let body: serde_json::Value = serde_json::from_str(&text)
                .context("failed to parse telegram response body")?;
            if body["ok"].as_bool() != Some(true) {
                anyhow::bail!(
                    "telegram sendMessage rejected: {}",
                    body["description"].as_str().unwrap_or("no description")
                );
            }
            debug!(chars = chunk.chars().count(), "telegram chunk delivered");
        }

        info!(chat = %self.chat_id, "telegram message delivered");
        Ok(())
    }
}

impl std::fmt::Debug for TelegramNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramNotifier")
            .field("token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Split `text` into chunks of at most `limit` characters, breaking after a
/// newline where possible. A single line longer than `limit` is hard-split.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    if limit == 0 || text.chars().count() <= limit {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();

        if current_len + line_len > limit && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if line_len > limit {
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(limit) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }

        current.push_str(line);
        current_len += line_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(split_message("hello\nworld", 100), vec!["hello\nworld"]);
    }

    #[test]
    fn splits_on_line_boundaries() {
        let text = "aaaa\nbbbb\ncccc\n";
        let chunks = split_message(text, 10);
        assert_eq!(chunks, vec!["aaaa\nbbbb\n", "cccc\n"]);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn hard_splits_overlong_line() {
        let text = "ab\n🔥🔥🔥🔥🔥";
        let chunks = split_message(text, 2);
        assert!(chunks.iter().all(|c| c.chars().count() <= 2));
        assert_eq!(chunks.concat(), text);
    }

    #[tokio::test]
    async fn non_json_error_page_keeps_status() {
        use axum::{http::StatusCode, routing::post, Router};

        let app = Router::new()
            .route(
                "/limited/:bot/sendMessage",
                post(|| async { (StatusCode::TOO_MANY_REQUESTS, "<html>slow down</html>") }),
            )
            .route(
                "/refused/:bot/sendMessage",
                post(|| async { r#"{"ok": false, "description": "Bad Request: chat not found"}"# }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let limited = TelegramNotifier::new("1:SECRET", "42", reqwest::Client::new())
            .with_base_url(format!("{base}/limited"));
        let err = limited.send_message("hi", None).await.unwrap_err().to_string();
        assert!(err.contains("429"), "{err}");
        assert!(err.contains("slow down"), "{err}");
        assert!(!err.contains("SECRET"));

        let refused = TelegramNotifier::new("1:SECRET", "42", reqwest::Client::new())
            .with_base_url(format!("{base}/refused"));
        let err = refused.send_message("hi", None).await.unwrap_err().to_string();
        assert!(err.contains("chat not found"), "{err}");
    }

    #[test]
    fn debug_redacts_token() {
        let n = TelegramNotifier::new("123:SECRET", "42", reqwest::Client::new());
        let dbg = format!("{n:?}");
        assert!(!dbg.contains("SECRET"));
        assert!(dbg.contains("42"));
    }

    #[test]
    fn payload_serialises_parse_mode() {
        let p = SendMessage {
            chat_id: "1",
            text: "x",
            parse_mode: Some(ParseMode::Markdown),
        };
        assert_eq!(
            serde_json::to_value(&p).unwrap(),
            serde_json::json!({ "chat_id": "1", "text": "x", "parse_mode": "Markdown" })
        );
        let p = SendMessage {
            chat_id: "1",
            text: "x",
            parse_mode: None,
        };
        assert!(serde_json::to_value(&p).unwrap().get("parse_mode").is_none());
    }
}
