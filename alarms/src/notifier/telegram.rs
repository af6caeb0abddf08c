use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{Notifier, format_notification};
use crate::error::NotificationError;

const API_BASE: &str = "https://api.telegram.org";

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Bot API sink posting to a single chat.
#[derive(Clone)]
pub struct TelegramNotifier {
    http: Client,
    url: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: &str, chat_id: impl Into<String>) -> Result<Self, NotificationError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            url: format!("{API_BASE}/bot{bot_token}/sendMessage"),
            chat_id: chat_id.into(),
        })
    }
}

/// Escapes the characters the Bot API's HTML parse mode treats as markup.
fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

#[async_trait]
impl Notifier for TelegramNotifier {
    #[instrument(skip(self, message), fields(%symbol), level = "debug")]
    async fn send(&self, symbol: &str, ts: NaiveDateTime, message: &str) -> Result<(), NotificationError> {
        let text = escape_html(&format_notification(symbol, ts, message));
        let body = SendMessage {
            chat_id: &self.chat_id,
            text: &text,
            parse_mode: "HTML",
        };

        // The API reports failures in the body, often with a non-2xx status.
        let resp: ApiResponse = self.http.post(&self.url).json(&body).send().await?.json().await?;

        if !resp.ok {
            return Err(NotificationError::Rejected(
                resp.description.unwrap_or_else(|| "ok=false".to_string()),
            ));
        }

        debug!("telegram message delivered");
        Ok(())
    }
}
